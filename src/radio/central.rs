//! Central-role tasks of the hub.
//!
//! ```text
//!  scanner_task ──AdvertisementSeen──┐
//!  connector_task ──Connected/──────┤
//!                   ConnectFailed   ├──▶ EVENTS ──▶ hub_task ──▶ SoftdeviceRadio
//!  link_task (per link) ──Data/─────┤
//!      DiscoveryComplete/Disconnected│
//!  observer_task ──Subscription────┘
//! ```

use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Ticker, Timer};
use nrf_softdevice::ble::{central, gatt_client, Connection, TxPower};
use nrf_softdevice::{raw, Softdevice};
use quatlink::ble::adv_parser::{contains_service_uuid128, extract_device_name};
use quatlink::ble::hub::Hub;
use quatlink::ble::{AdvReport, LinkEvent, LinkHandle};
use quatlink::config::{
    BLE_CONN_INTERVAL_MAX, BLE_CONN_INTERVAL_MIN, BLE_CONNECT_TIMEOUT, BLE_MAX_CONNECTIONS,
    BLE_SLAVE_LATENCY, BLE_SUP_TIMEOUT, IMU_REPORT_INTERVAL_MS,
};

use super::gatt::{UartClient, UartClientEvent};
use super::{
    link_commands, link_owner, peer_address, report_address, LinkCommand, LinkCommandQueue,
    LinkOwnership, ScanRequest, SoftdeviceRadio, CONNECT_REQUESTS, EVENTS, REASON_LOCAL_HOST,
    REASON_UNREPORTED, SCAN_REQUESTS,
};
use crate::imu::LATEST_QUATERNION;

/// Back-off before retrying a scan the stack refused to start.
const SCAN_RETRY: Duration = Duration::from_secs(1);

/// How often an idle link task checks that its link is still up.
const LINK_POLL: Duration = Duration::from_millis(100);

#[embassy_executor::task]
pub async fn scanner_task(sd: &'static Softdevice) -> ! {
    loop {
        let params = match SCAN_REQUESTS.wait().await {
            ScanRequest::Start(params) => params,
            ScanRequest::Stop => continue,
        };

        let config = central::ScanConfig {
            active: params.active,
            interval: params.interval,
            window: params.window,
            tx_power: TxPower::Plus4dBm,
            ..Default::default()
        };
        let scan = central::scan(sd, &config, |adv| {
            let data = unsafe { core::slice::from_raw_parts(adv.data.p_data, adv.data.len as usize) };
            if !contains_service_uuid128(data, &params.service) {
                return None;
            }
            let (address, address_type) =
                report_address(&nrf_softdevice::ble::Address::from_raw(adv.peer_addr));
            Some(AdvReport {
                address,
                address_type,
                rssi: adv.rssi,
                name: extract_device_name(data),
            })
        });

        match select(scan, SCAN_REQUESTS.wait()).await {
            Either::First(Ok(report)) => {
                debug!("scan: match {} (RSSI {})", report.name.as_str(), report.rssi);
                EVENTS.send(LinkEvent::AdvertisementSeen(report)).await;
            }
            Either::First(Err(e)) => {
                warn!("scan failed: {:?}", e);
                Timer::after(SCAN_RETRY).await;
                SCAN_REQUESTS.signal(ScanRequest::Start(params));
            }
            // Scan cancelled; a fresh Start is handled by the next pass.
            Either::Second(req @ ScanRequest::Start(_)) => SCAN_REQUESTS.signal(req),
            Either::Second(ScanRequest::Stop) => debug!("scan: stopped"),
        }
    }
}

#[embassy_executor::task]
pub async fn connector_task(sd: &'static Softdevice) -> ! {
    let spawner = embassy_executor::Spawner::for_current_executor().await;
    let mut generation: u32 = 0;

    loop {
        let report = CONNECT_REQUESTS.receive().await;
        let address = peer_address(&report);
        let whitelist = [&address];
        let conn_cfg = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                timeout: BLE_CONNECT_TIMEOUT,
                tx_power: TxPower::Plus4dBm,
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: BLE_CONN_INTERVAL_MIN,
                max_conn_interval: BLE_CONN_INTERVAL_MAX,
                slave_latency: BLE_SLAVE_LATENCY,
                conn_sup_timeout: BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = match central::connect(sd, &conn_cfg).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("connect to {} failed: {:?}", report.name.as_str(), e);
                EVENTS.send(LinkEvent::ConnectFailed).await;
                continue;
            }
        };
        let Some(handle) = conn.handle().map(LinkHandle) else {
            EVENTS.send(LinkEvent::ConnectFailed).await;
            continue;
        };
        let (Some(commands), Some(owner)) = (link_commands(handle), link_owner(handle)) else {
            warn!("link {}: handle out of range, dropping link", handle.0);
            let _ = conn.disconnect();
            EVENTS.send(LinkEvent::ConnectFailed).await;
            continue;
        };

        // The previous link on this handle reports its disconnect first.
        let ownership = owner.lock().await;
        // Leftovers from the previous owner of this handle.
        commands.clear();
        generation = generation.wrapping_add(1);

        EVENTS
            .send(LinkEvent::Connected {
                handle,
                generation,
                name: report.name.clone(),
            })
            .await;
        if spawner
            .spawn(link_task(conn.clone(), handle, generation, ownership))
            .is_err()
        {
            warn!("link {}: no free link task, disconnecting", handle.0);
            let _ = conn.disconnect();
            EVENTS
                .send(LinkEvent::Disconnected {
                    handle,
                    generation,
                    reason: REASON_LOCAL_HOST,
                })
                .await;
        }
    }
}

#[embassy_executor::task(pool_size = BLE_MAX_CONNECTIONS)]
pub async fn link_task(
    conn: Connection,
    handle: LinkHandle,
    generation: u32,
    ownership: LinkOwnership,
) {
    let reason = match link_commands(handle) {
        Some(commands) => drive_link(&conn, handle, generation, commands).await,
        None => REASON_LOCAL_HOST,
    };
    let _ = conn.disconnect();
    EVENTS
        .send(LinkEvent::Disconnected {
            handle,
            generation,
            reason,
        })
        .await;
    drop(ownership);
}

/// Execute the hub's requests for one link until it goes away.
async fn drive_link(
    conn: &Connection,
    handle: LinkHandle,
    generation: u32,
    commands: &LinkCommandQueue,
) -> u8 {
    let mut client: Option<UartClient> = None;

    loop {
        let Some(command) = next_command(conn, commands).await else {
            return REASON_UNREPORTED;
        };
        match command {
            LinkCommand::Discover => {
                let found = match gatt_client::discover::<UartClient>(conn).await {
                    Ok(c) => {
                        client = Some(c);
                        true
                    }
                    Err(e) => {
                        warn!("link {}: discovery failed: {:?}", handle.0, e);
                        false
                    }
                };
                EVENTS
                    .send(LinkEvent::DiscoveryComplete {
                        handle,
                        generation,
                        found,
                    })
                    .await;
            }
            LinkCommand::EnableNotifications => {
                let Some(client) = client.as_ref() else {
                    warn!("link {}: notifications requested before discovery", handle.0);
                    continue;
                };
                if let Err(e) = client.tx_cccd_write(true).await {
                    warn!("link {}: CCCD write failed: {:?}", handle.0, e);
                    return REASON_LOCAL_HOST;
                }
                info!("link {}: relay subscribed", handle.0);

                let relay = gatt_client::run(conn, client, |event| match event {
                    UartClientEvent::TxNotification(fragment) => {
                        // Newer data follows shortly; a full queue just drops this one.
                        let _ = EVENTS.try_send(LinkEvent::Data {
                            handle,
                            generation,
                            fragment,
                        });
                    }
                });
                return match select(relay, disconnect_requested(commands)).await {
                    Either::First(_) => REASON_UNREPORTED,
                    Either::Second(()) => REASON_LOCAL_HOST,
                };
            }
            LinkCommand::Disconnect => return REASON_LOCAL_HOST,
        }
    }
}

/// Next request for this link, or `None` once the link is gone.
async fn next_command(conn: &Connection, commands: &LinkCommandQueue) -> Option<LinkCommand> {
    loop {
        match select(commands.receive(), Timer::after(LINK_POLL)).await {
            Either::First(command) => return Some(command),
            Either::Second(()) => {
                if conn.handle().is_none() {
                    return None;
                }
            }
        }
    }
}

async fn disconnect_requested(commands: &LinkCommandQueue) {
    loop {
        if let LinkCommand::Disconnect = commands.receive().await {
            return;
        }
    }
}

/// Owns the hub context: applies link events as they arrive and publishes
/// every channel on each sensor tick.
#[embassy_executor::task]
pub async fn hub_task(mut hub: Hub<BLE_MAX_CONNECTIONS>, mut radio: SoftdeviceRadio) -> ! {
    hub.start(&mut radio);
    let mut ticker = Ticker::every(Duration::from_millis(IMU_REPORT_INTERVAL_MS));

    loop {
        match select(EVENTS.receive(), ticker.next()).await {
            Either::First(event) => hub.handle_event(event, &mut radio),
            Either::Second(()) => {
                if let Some(q) = LATEST_QUATERNION.lock(|c| c.get()) {
                    q.write_ascii(hub.local_buffer_mut());
                }
                hub.notify_new_values(&mut radio);
            }
        }
    }
}
