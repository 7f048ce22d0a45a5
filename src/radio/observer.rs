//! Peripheral-role tasks: the hub's quaternion service and the sensor
//! node's relay.

use defmt::{debug, info, warn};
use embassy_futures::select::select;
use embassy_time::{Duration, Ticker, Timer};
use nrf_softdevice::ble::peripheral::{self, AdvertiseError, ConnectableAdvertisement};
use nrf_softdevice::ble::{gatt_server, Connection, TxPower};
use nrf_softdevice::Softdevice;
use quatlink::ble::adv_parser::AdvertisingData;
use quatlink::ble::peripheral::PeripheralRelay;
use quatlink::ble::{LinkEvent, LinkHandle, RelaySink};
use quatlink::config::{
    BLE_ADV_FAST_TIMEOUT_SECS, BLE_ADV_INTERVAL_FAST, BLE_ADV_INTERVAL_SLOW,
    IMU_REPORT_INTERVAL_MS,
};
use quatlink::Error;

use super::gatt::{
    cccd_update, notify_error, HubServer, HubServerEvent, NodeServer, NodeServerEvent,
    SensorValue, UartServiceEvent,
};
use super::{EVENTS, OBSERVER, REASON_UNREPORTED};
use crate::imu::LATEST_QUATERNION;

const ADV_RETRY: Duration = Duration::from_secs(1);

/// Advertise fast for a while, then slow until someone connects.
async fn advertise(sd: &Softdevice, data: &AdvertisingData) -> Result<Connection, AdvertiseError> {
    let fast = peripheral::Config {
        interval: BLE_ADV_INTERVAL_FAST,
        timeout: Some((BLE_ADV_FAST_TIMEOUT_SECS * 100) as u16),
        tx_power: TxPower::Plus4dBm,
        ..Default::default()
    };
    let adv = ConnectableAdvertisement::ScannableUndirected {
        adv_data: &data.adv,
        scan_data: &data.scan_response,
    };
    match peripheral::advertise_connectable(sd, adv, &fast).await {
        Err(AdvertiseError::Timeout) => {
            debug!("advertising: fast window over, slowing down");
            let slow = peripheral::Config {
                interval: BLE_ADV_INTERVAL_SLOW,
                tx_power: TxPower::Plus4dBm,
                ..Default::default()
            };
            let adv = ConnectableAdvertisement::ScannableUndirected {
                adv_data: &data.adv,
                scan_data: &data.scan_response,
            };
            peripheral::advertise_connectable(sd, adv, &slow).await
        }
        other => other,
    }
}

async fn accept(sd: &Softdevice, data: &AdvertisingData) -> (Connection, LinkHandle) {
    loop {
        match advertise(sd, data).await {
            Ok(conn) => {
                let handle = LinkHandle(conn.handle().unwrap_or(LinkHandle::INVALID.0));
                return (conn, handle);
            }
            Err(e) => {
                warn!("advertising failed: {:?}", e);
                Timer::after(ADV_RETRY).await;
            }
        }
    }
}

/// Serves the hub's quaternion service to one observing app at a time.
#[embassy_executor::task]
pub async fn observer_task(
    sd: &'static Softdevice,
    server: &'static HubServer,
    data: AdvertisingData,
) -> ! {
    loop {
        let (conn, handle) = accept(sd, &data).await;
        info!("observer connected (handle {})", handle.0);
        OBSERVER.lock(|c| c.replace(Some(conn.clone())));

        gatt_server::run(&conn, server, |event| match event {
            HubServerEvent::Quat(e) => {
                let (channel, enabled) = cccd_update(e);
                let _ = EVENTS.try_send(LinkEvent::SubscriptionChanged {
                    channel,
                    handle,
                    enabled,
                });
            }
        })
        .await;

        OBSERVER.lock(|c| c.replace(None));
        EVENTS
            .send(LinkEvent::ObserverDisconnected {
                handle,
                reason: REASON_UNREPORTED,
            })
            .await;
    }
}

struct UartSink<'a> {
    server: &'a NodeServer,
    conn: &'a Connection,
}

impl RelaySink for UartSink<'_> {
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let value = SensorValue::from_slice(data).map_err(|_| Error::BufferOverflow)?;
        self.server
            .uart
            .tx_notify(self.conn, &value)
            .map_err(notify_error)
    }
}

/// Sensor-node mode: push the local orientation to the connected hub on
/// every sensor tick.
#[embassy_executor::task]
pub async fn node_task(
    sd: &'static Softdevice,
    server: &'static NodeServer,
    data: AdvertisingData,
    mut relay: PeripheralRelay,
) -> ! {
    loop {
        let (conn, handle) = accept(sd, &data).await;
        relay.on_connect(handle);

        let serve = gatt_server::run(&conn, server, |event| match event {
            NodeServerEvent::Uart(UartServiceEvent::TxCccdWrite { notifications }) => {
                info!("Relay: notifications {}", if notifications { "on" } else { "off" });
            }
            NodeServerEvent::Uart(UartServiceEvent::RxWrite(value)) => {
                debug!("Relay: ignoring {} bytes written to RX", value.len());
            }
        });
        let publish = async {
            let mut sink = UartSink {
                server,
                conn: &conn,
            };
            let mut ticker = Ticker::every(Duration::from_millis(IMU_REPORT_INTERVAL_MS));
            loop {
                ticker.next().await;
                if let Some(q) = LATEST_QUATERNION.lock(|c| c.get()) {
                    relay.update(&q);
                }
                relay.publish(&mut sink);
            }
        };
        select(serve, publish).await;

        relay.on_disconnect(handle, REASON_UNREPORTED);
    }
}
