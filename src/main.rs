//! quatlink firmware - nRF52840 + SoftDevice S140 + BNO080.
//!
//! Default build is the hub: it collects the orientation of up to
//! `BLE_MAX_CONNECTIONS` sensor nodes and republishes it next to its own
//! on the quaternion service.  Building with `--features node` produces a
//! sensor node that relays its orientation over the Nordic UART Service.
//!
//! ```text
//! cargo run --release --features embedded            # hub
//! cargo run --release --features embedded,node       # sensor node
//! ```

#![no_std]
#![no_main]

mod imu;
mod radio;

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::interrupt::{self, InterruptExt, Priority};
use embassy_nrf::{bind_interrupts, peripherals, twim};
use nrf_softdevice::Softdevice;
use quatlink::ble::adv_parser::build_advertising_data;
use quatlink::config::{DeviceConfig, BLE_MAX_CONNECTIONS, BLE_TX_POWER_DBM, IMU_I2C_ADDRESS};
use quatlink::quaternion::OrientationSensor;
use quatlink::role::{advertised_service, Firmware};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::imu::Bno080;
use crate::radio::gatt::{HubServer, NodeServer};
use crate::radio::{central, observer, softdevice_config, SoftdeviceRadio};

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

fn device_config() -> DeviceConfig {
    #[cfg(feature = "node")]
    {
        DeviceConfig::node()
    }
    #[cfg(not(feature = "node"))]
    {
        DeviceConfig::hub()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("quatlink starting");

    // SoftDevice reserves priorities 0, 1 and 4.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    interrupt::TWISPI0.set_priority(Priority::P3);

    let device = device_config();
    let firmware: Firmware<BLE_MAX_CONNECTIONS> = unwrap!(Firmware::new(&device));
    info!(
        "{} as {} ({} peripheral / {} central links)",
        device.name.as_str(),
        firmware.role(),
        device.peripheral_count,
        device.central_count
    );

    // Motion sensor
    let mut i2c_config = twim::Config::default();
    i2c_config.frequency = twim::Frequency::K400;
    let i2c = twim::Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, i2c_config);
    let mut sensor = Bno080::new(i2c, IMU_I2C_ADDRESS);
    if let Err(e) = sensor.init().await {
        defmt::panic!(
            "BNO080 not detected at {=u8:#x} ({}). Check wiring. Freezing...",
            IMU_I2C_ADDRESS,
            e
        );
    }
    info!("BNO080 rotation vector enabled");
    spawner.must_spawn(imu::imu_task(sensor));

    // Radio
    let sd = Softdevice::enable(&softdevice_config(&device));
    let adv = build_advertising_data(
        device.name.as_str(),
        advertised_service(device.role),
        BLE_TX_POWER_DBM,
    );

    match firmware {
        Firmware::Central(hub) => {
            static SERVER: StaticCell<HubServer> = StaticCell::new();
            let server: &'static HubServer = SERVER.init(unwrap!(HubServer::new(sd)));
            let sd: &'static Softdevice = sd;
            spawner.must_spawn(softdevice_task(sd));
            spawner.must_spawn(central::scanner_task(sd));
            spawner.must_spawn(central::connector_task(sd));
            spawner.must_spawn(observer::observer_task(sd, server, adv));
            spawner.must_spawn(central::hub_task(hub, SoftdeviceRadio::new(server)));
        }
        Firmware::Peripheral(relay) => {
            static SERVER: StaticCell<NodeServer> = StaticCell::new();
            let server: &'static NodeServer = SERVER.init(unwrap!(NodeServer::new(sd)));
            let sd: &'static Softdevice = sd;
            spawner.must_spawn(softdevice_task(sd));
            spawner.must_spawn(observer::node_task(sd, server, adv, relay));
        }
    }
}
