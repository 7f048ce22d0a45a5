//! Application-wide constants and compile-time configuration.
//!
//! Radio timing, buffer sizes and the IMU bus parameters live here so they
//! can be tuned in one place.  The per-device values (name, role, link
//! counts) are carried by [`DeviceConfig`] and fixed at construction.

use crate::error::Error;
use heapless::String;

// BLE - connection pool

/// Maximum concurrent central-role links (size of the connection pool).
pub const BLE_MAX_CONNECTIONS: usize = 4;

/// Size of each per-peer receive buffer and of every characteristic value.
pub const DATA_BUFFER_LEN: usize = 48;

/// Visible characters kept from a peer's name.
pub const PEER_NAME_LEN: usize = 19;

/// Number of sensor characteristics the quaternion service exposes.
pub const MAX_SENSOR_CHANNELS: usize = 5;

/// Capacity of the device display name.
pub const DEVICE_NAME_LEN: usize = 20;

// BLE - scanning (central)

/// Scan interval / window in 0.625 ms units (100 ms / 50 ms).
pub const BLE_SCAN_INTERVAL: u32 = 160;
pub const BLE_SCAN_WINDOW: u32 = 80;

/// Passive scanning; scan responses are not requested.
pub const BLE_SCAN_ACTIVE: bool = false;

// BLE - advertising (peripheral)

/// Fast / slow advertising interval in 0.625 ms units (20 ms / 152.5 ms).
pub const BLE_ADV_INTERVAL_FAST: u32 = 32;
pub const BLE_ADV_INTERVAL_SLOW: u32 = 244;

/// Seconds spent in fast advertising before falling back to slow.
pub const BLE_ADV_FAST_TIMEOUT_SECS: u64 = 30;

/// Radio TX power (dBm).
pub const BLE_TX_POWER_DBM: i8 = 4;

// BLE - link parameters

/// ATT MTU negotiated on every link.
pub const BLE_ATT_MTU: u16 = 128;

/// Largest notification fragment a link can deliver (ATT MTU - 3).
pub const BLE_MAX_FRAGMENT_LEN: usize = BLE_ATT_MTU as usize - 3;

/// BLE connection interval range (in 1.25 ms units).
pub const BLE_CONN_INTERVAL_MIN: u16 = 6;
pub const BLE_CONN_INTERVAL_MAX: u16 = 12;

/// BLE slave latency (number of connection events the peripheral can skip).
pub const BLE_SLAVE_LATENCY: u16 = 0;

/// BLE supervision timeout (in 10 ms units). 400 = 4 s.
pub const BLE_SUP_TIMEOUT: u16 = 400;

/// How long the stack looks for a chosen advertiser before reporting the
/// connect as failed (in 10 ms units). 300 = 3 s.
pub const BLE_CONNECT_TIMEOUT: u16 = 300;

// IMU (BNO080 rotation vector over I2C)

/// 7-bit I2C address of the motion sensor (SparkFun default).
pub const IMU_I2C_ADDRESS: u8 = 0x4B;

/// Rotation-vector report interval (ms).  Also the aggregation poll period.
pub const IMU_REPORT_INTERVAL_MS: u64 = 10;

/// Default identity values.
pub const HUB_NAME: &str = "QuatHub";
pub const NODE_NAME: &str = "QuatNode";

/// Which half of the mesh this firmware runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Hub: scans for sensor nodes and republishes their data.
    Central,
    /// Sensor node: streams its own orientation over the UART relay.
    Peripheral,
}

/// Construction-time device configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String<DEVICE_NAME_LEN>,
    /// Links where this device is the peripheral (observers, e.g. the app).
    pub peripheral_count: u8,
    /// Links where this device is the central (sensor nodes).
    pub central_count: u8,
    pub role: Role,
}

impl DeviceConfig {
    /// Build a configuration, truncating `name` to [`DEVICE_NAME_LEN`].
    pub fn new(name: &str, peripheral_count: u8, central_count: u8, role: Role) -> Self {
        let mut n = String::new();
        for c in name.chars() {
            if n.push(c).is_err() {
                break;
            }
        }
        Self {
            name: n,
            peripheral_count,
            central_count,
            role,
        }
    }

    /// Hub defaults: one observer link plus three sensor nodes.
    pub fn hub() -> Self {
        Self::new(HUB_NAME, 1, 3, Role::Central)
    }

    /// Sensor-node defaults: a single observer (the hub).
    pub fn node() -> Self {
        Self::new(NODE_NAME, 1, 0, Role::Peripheral)
    }

    /// Total number of sensor channels (the hub's own included).
    pub fn sensor_count(&self) -> usize {
        self.peripheral_count as usize + self.central_count as usize
    }

    /// Peer links that must be up before the hub publishes.
    pub fn required_peer_links(&self) -> usize {
        self.sensor_count().saturating_sub(1)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() || self.sensor_count() == 0 {
            return Err(Error::InvalidConfig);
        }
        if self.role == Role::Central {
            if self.sensor_count() > MAX_SENSOR_CHANNELS
                || self.central_count as usize > BLE_MAX_CONNECTIONS
            {
                return Err(Error::InvalidConfig);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_defaults_require_three_peers() {
        let cfg = DeviceConfig::hub();
        assert_eq!(cfg.sensor_count(), 4);
        assert_eq!(cfg.required_peer_links(), 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn node_defaults_are_valid() {
        let cfg = DeviceConfig::node();
        assert_eq!(cfg.role, Role::Peripheral);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_more_links_than_pool() {
        let cfg = DeviceConfig::new("hub", 1, BLE_MAX_CONNECTIONS as u8 + 1, Role::Central);
        assert_eq!(cfg.validate(), Err(Error::InvalidConfig));
    }

    #[test]
    fn rejects_empty_name_and_zero_sensors() {
        assert!(DeviceConfig::new("", 1, 1, Role::Central).validate().is_err());
        assert!(DeviceConfig::new("x", 0, 0, Role::Peripheral).validate().is_err());
    }

    #[test]
    fn long_name_is_truncated() {
        let cfg = DeviceConfig::new("a-very-long-device-name-indeed", 1, 0, Role::Peripheral);
        assert_eq!(cfg.name.len(), DEVICE_NAME_LEN);
    }
}
