//! Startup role selection.
//!
//! Decided once from [`DeviceConfig`]: the hub gets the full central
//! stack, a sensor node only the outbound relay.  The two never interact
//! at runtime.

use crate::ble::hub::Hub;
use crate::ble::peripheral::PeripheralRelay;
use crate::ble::{QUATERNION_SERVICE_UUID, RELAY_SERVICE_UUID};
use crate::config::{DeviceConfig, Role};
use crate::error::Error;

pub enum Firmware<const N: usize> {
    Central(Hub<N>),
    Peripheral(PeripheralRelay),
}

impl<const N: usize> Firmware<N> {
    pub fn new(config: &DeviceConfig) -> Result<Self, Error> {
        config.validate()?;
        let fw = match config.role {
            Role::Central => Firmware::Central(Hub::new(config)?),
            Role::Peripheral => Firmware::Peripheral(PeripheralRelay::new()),
        };
        info!("Role: {}, name: {}", config.role, config.name.as_str());
        Ok(fw)
    }

    pub fn role(&self) -> Role {
        match self {
            Firmware::Central(_) => Role::Central,
            Firmware::Peripheral(_) => Role::Peripheral,
        }
    }
}

/// Service advertised by a device in `role`.
pub fn advertised_service(role: Role) -> &'static [u8; 16] {
    match role {
        Role::Central => &QUATERNION_SERVICE_UUID,
        Role::Peripheral => &RELAY_SERVICE_UUID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_config_selects_central_wiring() {
        let fw = Firmware::<4>::new(&DeviceConfig::hub()).unwrap();
        assert_eq!(fw.role(), Role::Central);
        assert_eq!(advertised_service(fw.role()), &QUATERNION_SERVICE_UUID);
    }

    #[test]
    fn node_config_selects_peripheral_wiring() {
        let fw = Firmware::<4>::new(&DeviceConfig::node()).unwrap();
        assert!(matches!(fw, Firmware::Peripheral(_)));
        assert_eq!(advertised_service(Role::Peripheral), &RELAY_SERVICE_UUID);
    }

    #[test]
    fn hub_needing_more_links_than_pool_is_rejected() {
        let cfg = DeviceConfig::new("hub", 1, 3, Role::Central);
        assert!(matches!(Firmware::<2>::new(&cfg), Err(Error::InvalidConfig)));
    }
}
