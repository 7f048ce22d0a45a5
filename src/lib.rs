//! Core logic of the quatlink wearable sensor mesh.
//!
//! Everything in here is hardware-independent and runs on the host:
//! the connection pool, the scan/connect controller, the relay client
//! workflow, the aggregator and the peripheral-mode relay.  The firmware
//! binary (`main.rs`, feature `embedded`) implements
//! [`ble::RadioControl`] on top of the Nordic SoftDevice and feeds
//! [`ble::LinkEvent`]s into [`ble::hub::Hub`].
//!
//! Usage: `cargo test --lib` / `cargo test --test integration`

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod buffer;
pub mod config;
pub mod error;
pub mod quaternion;
pub mod role;

pub use error::{BleError, Error};
