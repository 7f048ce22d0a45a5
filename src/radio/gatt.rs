//! GATT layout.
//!
//! - Hub server: quaternion service, one notify-only characteristic per
//!   sensor channel (48 bytes max).
//! - Node server: Nordic UART Service.
//! - Hub client: Nordic UART Service on each sensor node.

use heapless::Vec;
use nrf_softdevice::ble::gatt_server::NotifyValueError;
use nrf_softdevice::ble::Connection;
use quatlink::ble::Fragment;
use quatlink::config::DATA_BUFFER_LEN;
use quatlink::{BleError, Error};

pub type SensorValue = Vec<u8, DATA_BUFFER_LEN>;

#[nrf_softdevice::gatt_service(uuid = "c6f1a000-8c4e-4b35-9f3a-2d6b7e0e5a10")]
pub struct QuaternionService {
    #[characteristic(uuid = "c6f1a001-8c4e-4b35-9f3a-2d6b7e0e5a10", notify)]
    pub sensor0: SensorValue,
    #[characteristic(uuid = "c6f1a002-8c4e-4b35-9f3a-2d6b7e0e5a10", notify)]
    pub sensor1: SensorValue,
    #[characteristic(uuid = "c6f1a003-8c4e-4b35-9f3a-2d6b7e0e5a10", notify)]
    pub sensor2: SensorValue,
    #[characteristic(uuid = "c6f1a004-8c4e-4b35-9f3a-2d6b7e0e5a10", notify)]
    pub sensor3: SensorValue,
    #[characteristic(uuid = "c6f1a005-8c4e-4b35-9f3a-2d6b7e0e5a10", notify)]
    pub sensor4: SensorValue,
}

#[nrf_softdevice::gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct UartService {
    // node -> hub
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    pub tx: SensorValue,
    // hub -> node, unused
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    pub rx: SensorValue,
}

#[nrf_softdevice::gatt_server]
pub struct HubServer {
    pub quat: QuaternionService,
}

#[nrf_softdevice::gatt_server]
pub struct NodeServer {
    pub uart: UartService,
}

/// nrf-softdevice GATT client for the relay service on a sensor node.
#[nrf_softdevice::gatt_client(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct UartClient {
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    pub tx: Fragment,
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    pub rx: SensorValue,
}

/// Sensor channel affected by a quaternion-service CCCD write.
pub fn cccd_update(event: QuaternionServiceEvent) -> (usize, bool) {
    match event {
        QuaternionServiceEvent::Sensor0CccdWrite { notifications } => (0, notifications),
        QuaternionServiceEvent::Sensor1CccdWrite { notifications } => (1, notifications),
        QuaternionServiceEvent::Sensor2CccdWrite { notifications } => (2, notifications),
        QuaternionServiceEvent::Sensor3CccdWrite { notifications } => (3, notifications),
        QuaternionServiceEvent::Sensor4CccdWrite { notifications } => (4, notifications),
    }
}

/// Notify `data` on sensor `channel` to the observer on `conn`.
pub fn notify_sensor(
    service: &QuaternionService,
    conn: &Connection,
    channel: usize,
    data: &[u8],
) -> Result<(), Error> {
    let value = SensorValue::from_slice(data).map_err(|_| Error::BufferOverflow)?;
    let result = match channel {
        0 => service.sensor0_notify(conn, &value),
        1 => service.sensor1_notify(conn, &value),
        2 => service.sensor2_notify(conn, &value),
        3 => service.sensor3_notify(conn, &value),
        4 => service.sensor4_notify(conn, &value),
        _ => return Err(Error::UnknownChannel),
    };
    result.map_err(notify_error)
}

pub fn notify_error(e: NotifyValueError) -> Error {
    match e {
        NotifyValueError::Disconnected => Error::Ble(BleError::NotifyFailed),
        NotifyValueError::Raw(raw) => Error::Ble(BleError::Raw(raw as u32)),
    }
}
