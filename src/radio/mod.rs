//! SoftDevice adapter for the hub context.
//!
//! The hub runs in one task and only ever talks to the radio through
//! [`SoftdeviceRadio`], which turns each request into a message for the
//! task owning that piece of the stack.  Everything the stack reports back
//! arrives on [`EVENTS`] in order.

pub mod central;
pub mod gatt;
pub mod observer;

use core::cell::RefCell;
use core::mem;

use defmt::warn;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::{Mutex as AsyncMutex, MutexGuard};
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::{Address, AddressType, Connection};
use nrf_softdevice::raw;
use quatlink::ble::{AdvReport, LinkEvent, LinkHandle, RadioControl, ScanParams};
use quatlink::config::{DeviceConfig, Role, BLE_ATT_MTU, BLE_MAX_CONNECTIONS};
use quatlink::{BleError, Error};

use self::gatt::HubServer;

pub const EVENT_QUEUE_LEN: usize = 16;

/// Highest connection handle (exclusive) the stack hands out: every
/// central link plus the observer.
pub const LINK_HANDLE_LIMIT: usize = BLE_MAX_CONNECTIONS + 1;

/// HCI reason for a link we tore down ourselves.
pub const REASON_LOCAL_HOST: u8 = raw::BLE_HCI_LOCAL_HOST_TERMINATED_CONNECTION as u8;
/// nrf-softdevice does not surface the remote reason.
pub const REASON_UNREPORTED: u8 = 0;

/// Everything the stack reports to the hub, in arrival order.
pub static EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, EVENT_QUEUE_LEN> = Channel::new();

#[derive(Clone, Copy, defmt::Format)]
pub enum ScanRequest {
    Start(ScanParams),
    Stop,
}

pub static SCAN_REQUESTS: Signal<CriticalSectionRawMutex, ScanRequest> = Signal::new();

pub static CONNECT_REQUESTS: Channel<CriticalSectionRawMutex, AdvReport, 2> = Channel::new();

/// Requests for the task driving one central link.
#[derive(Clone, Copy, defmt::Format)]
pub enum LinkCommand {
    Discover,
    EnableNotifications,
    Disconnect,
}

pub type LinkCommandQueue = Channel<CriticalSectionRawMutex, LinkCommand, 4>;

pub static LINK_COMMANDS: [LinkCommandQueue; LINK_HANDLE_LIMIT] =
    [const { Channel::new() }; LINK_HANDLE_LIMIT];

/// Held by the task driving a link for as long as it may still report
/// events for it, so a reused handle is not reported up before the
/// previous link on it has been reported down.
pub type LinkOwner = AsyncMutex<CriticalSectionRawMutex, ()>;
pub type LinkOwnership = MutexGuard<'static, CriticalSectionRawMutex, ()>;

pub static LINK_OWNERS: [LinkOwner; LINK_HANDLE_LIMIT] =
    [const { AsyncMutex::new(()) }; LINK_HANDLE_LIMIT];

/// The app currently connected to the hub's quaternion service.
pub static OBSERVER: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

pub fn link_commands(handle: LinkHandle) -> Option<&'static LinkCommandQueue> {
    LINK_COMMANDS.get(handle.0 as usize)
}

pub fn link_owner(handle: LinkHandle) -> Option<&'static LinkOwner> {
    LINK_OWNERS.get(handle.0 as usize)
}

pub struct SoftdeviceRadio {
    server: &'static HubServer,
}

impl SoftdeviceRadio {
    pub fn new(server: &'static HubServer) -> Self {
        Self { server }
    }

    fn command(&self, handle: LinkHandle, cmd: LinkCommand) {
        match link_commands(handle) {
            Some(queue) => {
                if queue.try_send(cmd).is_err() {
                    warn!("link {}: command queue full, dropping {}", handle.0, cmd);
                }
            }
            None => warn!("link {}: handle out of range", handle.0),
        }
    }
}

impl RadioControl for SoftdeviceRadio {
    fn start_scan(&mut self, params: &ScanParams) {
        SCAN_REQUESTS.signal(ScanRequest::Start(*params));
    }

    fn stop_scan(&mut self) {
        SCAN_REQUESTS.signal(ScanRequest::Stop);
    }

    fn connect(&mut self, report: &AdvReport) -> Result<(), Error> {
        CONNECT_REQUESTS.try_send(report.clone()).map_err(|_| {
            warn!("connect request dropped, connector busy");
            Error::Ble(BleError::ConnectFailed)
        })
    }

    fn disconnect(&mut self, handle: LinkHandle) {
        self.command(handle, LinkCommand::Disconnect);
    }

    fn discover_service(&mut self, handle: LinkHandle) {
        self.command(handle, LinkCommand::Discover);
    }

    fn enable_notifications(&mut self, handle: LinkHandle) {
        self.command(handle, LinkCommand::EnableNotifications);
    }

    fn publish_notification(&mut self, channel: usize, data: &[u8]) -> Result<(), Error> {
        let conn = OBSERVER
            .lock(|c| c.borrow().clone())
            .ok_or(Error::Ble(BleError::NotifyFailed))?;
        gatt::notify_sensor(&self.server.quat, &conn, channel, data)
    }
}

/// Peer address as carried in an [`AdvReport`].
pub fn report_address(address: &Address) -> ([u8; 6], u8) {
    let kind = match address.address_type() {
        AddressType::Public => 0,
        AddressType::RandomStatic => 1,
        AddressType::RandomPrivateResolvable => 2,
        AddressType::RandomPrivateNonResolvable => 3,
        AddressType::Anonymous => 4,
    };
    (address.bytes(), kind)
}

pub fn peer_address(report: &AdvReport) -> Address {
    let kind = match report.address_type {
        0 => AddressType::Public,
        2 => AddressType::RandomPrivateResolvable,
        3 => AddressType::RandomPrivateNonResolvable,
        4 => AddressType::Anonymous,
        _ => AddressType::RandomStatic,
    };
    Address::new(kind, report.address)
}

/// SoftDevice configuration for `device`.
///
/// The device name is copied into the stack (`VLOC_STACK`), so it only has
/// to outlive `Softdevice::enable`.
pub fn softdevice_config(device: &DeviceConfig) -> nrf_softdevice::Config {
    let central_links = match device.role {
        Role::Central => BLE_MAX_CONNECTIONS as u8,
        Role::Peripheral => 0,
    };
    let periph_links = device.peripheral_count.max(1);
    let name_len = device.name.len() as u16;

    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: central_links + periph_links,
            event_length: 6,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: BLE_ATT_MTU }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: periph_links,
            central_role_count: central_links,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: device.name.as_ptr() as _,
            current_len: name_len,
            max_len: name_len,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}
