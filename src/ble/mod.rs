//! Bluetooth Low Energy subsystem.
//!
//! The hub drives the radio in **Central** role:
//!
//! 1. **Scanner** - discovers sensor nodes advertising the UART relay
//!    service and requests a connection for each.
//! 2. **Connection Pool** - fixed table of peer slots keyed by link handle.
//! 3. **UART Client** - discovery / subscribe workflow run after connect,
//!    and the data relay that captures incoming payloads.
//! 4. **Hub** - owns all of the above, dispatches [`LinkEvent`]s one at a
//!    time and republishes the captured data once the quorum is met.
//!
//! Sensor nodes instead run the [`peripheral`] relay.
//!
//! Nothing here talks to the SoftDevice directly: the firmware binary
//! implements [`RadioControl`] and feeds [`LinkEvent`]s from a single
//! ordered channel.

pub mod adv_parser;
pub mod hub;
pub mod peripheral;
pub mod pool;
pub mod scanner;
pub mod subscriptions;
pub mod uart_client;

use crate::config::{BLE_MAX_FRAGMENT_LEN, PEER_NAME_LEN};
use crate::error::Error;
use heapless::{String, Vec};

/// Nordic UART Service, used as the sensor-node relay service.
/// UUIDs are stored in display (big-endian) order.
pub const RELAY_SERVICE_UUID: [u8; 16] = [
    0x6e, 0x40, 0x00, 0x01, 0xb5, 0xa3, 0xf3, 0x93, 0xe0, 0xa9, 0xe5, 0x0e, 0x24, 0xdc, 0xca, 0x9e,
];

/// Hub's quaternion service (one notify characteristic per sensor).
pub const QUATERNION_SERVICE_UUID: [u8; 16] = [
    0xc6, 0xf1, 0xa0, 0x00, 0x8c, 0x4e, 0x4b, 0x35, 0x9f, 0x3a, 0x2d, 0x6b, 0x7e, 0x0e, 0x5a, 0x10,
];

/// Opaque connection identifier assigned by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHandle(pub u16);

impl LinkHandle {
    /// Handle value the stack never assigns to a live link.
    pub const INVALID: LinkHandle = LinkHandle(0xFFFF);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Best-effort peer name (may be empty).
pub type PeerName = String<PEER_NAME_LEN>;

/// One notification payload as delivered by the link layer.
pub type Fragment = Vec<u8, BLE_MAX_FRAGMENT_LEN>;

/// An advertisement that passed the relay-service filter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvReport {
    /// Peer address, little-endian as on air.
    pub address: [u8; 6],
    /// Raw GAP address type.
    pub address_type: u8,
    pub rssi: i8,
    pub name: PeerName,
}

/// Scan settings handed to the radio with every (re)start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanParams {
    /// 0.625 ms units.
    pub interval: u32,
    /// 0.625 ms units.
    pub window: u32,
    pub active: bool,
    /// Only advertisers listing this 128-bit service are reported.
    pub service: [u8; 16],
}

/// Events delivered by the radio stack, consumed in order by one dispatcher.
///
/// Link events carry the `generation` the radio layer gave the link when
/// it came up.  The stack reuses handles, so the pair `(handle,
/// generation)` is what identifies one link; events for an older
/// generation than the one bound in the pool are stale.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// A filtered advertisement was seen while scanning.
    AdvertisementSeen(AdvReport),
    /// A connect request completed.
    Connected {
        handle: LinkHandle,
        generation: u32,
        name: PeerName,
    },
    /// A connect request failed before a link existed.
    ConnectFailed,
    /// The link is gone; the handle may be reused afterwards.
    Disconnected {
        handle: LinkHandle,
        generation: u32,
        reason: u8,
    },
    /// Result of a `discover_service` request.
    DiscoveryComplete {
        handle: LinkHandle,
        generation: u32,
        found: bool,
    },
    /// Payload received on the relay characteristic.
    Data {
        handle: LinkHandle,
        generation: u32,
        fragment: Fragment,
    },
    /// An observer changed its CCCD for a sensor channel.
    SubscriptionChanged {
        channel: usize,
        handle: LinkHandle,
        enabled: bool,
    },
    /// The observer link (e.g. the paired app) went away.
    ObserverDisconnected { handle: LinkHandle, reason: u8 },
}

/// Control surface of the radio stack.
///
/// Every call must return immediately: long-running work (connecting,
/// GATT discovery) is started here and its outcome comes back later as a
/// [`LinkEvent`].
pub trait RadioControl {
    fn start_scan(&mut self, params: &ScanParams);
    fn stop_scan(&mut self);
    /// Fails when the request could not be handed to the stack; no
    /// `Connected`/`ConnectFailed` follows in that case.
    fn connect(&mut self, report: &AdvReport) -> Result<(), Error>;
    fn disconnect(&mut self, handle: LinkHandle);
    /// Answered by [`LinkEvent::DiscoveryComplete`].
    fn discover_service(&mut self, handle: LinkHandle);
    fn enable_notifications(&mut self, handle: LinkHandle);
    /// Push `data` on sensor `channel` to every subscribed observer.
    fn publish_notification(&mut self, channel: usize, data: &[u8]) -> Result<(), Error>;
}

/// Outbound side of the peripheral-mode UART relay.
pub trait RelaySink {
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;
}
