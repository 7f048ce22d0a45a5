//! Unified error type for quatlink.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // BLE
    /// The radio stack returned a BLE-level error.
    Ble(BleError),

    /// Every connection slot is occupied.
    PoolExhausted,

    /// The link handle is already bound to an occupied slot.
    HandleInUse,

    /// No occupied slot matches the link handle.
    UnknownHandle,

    /// The sensor channel index is outside the configured range.
    UnknownChannel,

    // Sensor
    /// The motion sensor did not answer on the I2C bus.
    SensorNotDetected,

    /// The motion sensor answered with a malformed packet.
    SensorProtocol,

    // Generic
    /// Device configuration is inconsistent (counts, name).
    InvalidConfig,

    /// Buffer too small for the requested operation.
    BufferOverflow,
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// GAP / GATT raw error code from the SoftDevice.
    Raw(u32),
    /// Scan was cancelled or could not start.
    ScanFailed,
    /// Connection attempt failed.
    ConnectFailed,
    /// The relay service is missing on the peer.
    DiscoveryFailed,
    /// Characteristic subscribe/notify failed.
    NotifyFailed,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}
