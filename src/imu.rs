//! BNO080 motion sensor over I2C (SHTP transport).
//!
//! Only the rotation-vector report is enabled; each report is turned into
//! a [`Quaternion`] and published in [`LATEST_QUATERNION`] for whichever
//! role is running.

use core::cell::Cell;

use defmt::{debug, warn};
use embassy_nrf::peripherals::TWISPI0;
use embassy_nrf::twim::Twim;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal::i2c::SevenBitAddress;
use embedded_hal_async::i2c::I2c;
use quatlink::config::IMU_REPORT_INTERVAL_MS;
use quatlink::quaternion::{parse_rotation_vector, OrientationSensor, Quaternion, REPORT_ROTATION_VECTOR};
use quatlink::Error;

pub type ImuBus = Twim<'static, TWISPI0>;

/// Most recent orientation, shared with the radio side.
pub static LATEST_QUATERNION: Mutex<CriticalSectionRawMutex, Cell<Option<Quaternion>>> =
    Mutex::new(Cell::new(None));

const CHANNEL_CONTROL: u8 = 2;
const CHANNEL_REPORTS: u8 = 3;
const CHANNEL_COUNT: usize = 6;

const PRODUCT_ID_REQUEST: u8 = 0xF9;
const PRODUCT_ID_RESPONSE: u8 = 0xF8;
const SET_FEATURE_COMMAND: u8 = 0xFD;

const HEADER_LEN: usize = 4;
const MAX_PACKET_LEN: usize = 128;
/// Continuation bit in the SHTP length field.
const LENGTH_MASK: u16 = 0x7FFF;

/// Boot advertisement packets drained before talking to the hub.
const BOOT_PACKETS: usize = 8;
const PROBE_ATTEMPTS: usize = 20;
const PROBE_DELAY: Duration = Duration::from_millis(10);

pub struct Bno080<I> {
    i2c: I,
    address: SevenBitAddress,
    sequence: [u8; CHANNEL_COUNT],
    packet: [u8; MAX_PACKET_LEN],
}

impl<I: I2c> Bno080<I> {
    pub fn new(i2c: I, address: SevenBitAddress) -> Self {
        Self {
            i2c,
            address,
            sequence: [0; CHANNEL_COUNT],
            packet: [0; MAX_PACKET_LEN],
        }
    }

    async fn send(&mut self, channel: u8, payload: &[u8]) -> Result<(), Error> {
        let mut out = [0u8; HEADER_LEN + 17];
        let len = HEADER_LEN + payload.len();
        if len > out.len() {
            return Err(Error::BufferOverflow);
        }
        let seq = &mut self.sequence[channel as usize % CHANNEL_COUNT];
        out[..HEADER_LEN].copy_from_slice(&[len as u8, (len >> 8) as u8, channel, *seq]);
        *seq = seq.wrapping_add(1);
        out[HEADER_LEN..len].copy_from_slice(payload);
        self.i2c
            .write(self.address, &out[..len])
            .await
            .map_err(|_| Error::SensorNotDetected)
    }

    /// Read one packet into `self.packet`; `None` when the sensor has
    /// nothing queued.  Returns the channel and total length.
    async fn receive(&mut self) -> Result<Option<(u8, usize)>, Error> {
        let mut header = [0u8; HEADER_LEN];
        self.i2c
            .read(self.address, &mut header)
            .await
            .map_err(|_| Error::SensorNotDetected)?;
        let len = (u16::from_le_bytes([header[0], header[1]]) & LENGTH_MASK) as usize;
        if len <= HEADER_LEN {
            return Ok(None);
        }
        // Each read restarts with the header, so fetch the whole packet again.
        let len = len.min(MAX_PACKET_LEN);
        self.i2c
            .read(self.address, &mut self.packet[..len])
            .await
            .map_err(|_| Error::SensorProtocol)?;
        Ok(Some((self.packet[2], len)))
    }

    async fn detect(&mut self) -> Result<(), Error> {
        for _ in 0..BOOT_PACKETS {
            if self.receive().await?.is_none() {
                break;
            }
        }
        self.send(CHANNEL_CONTROL, &[PRODUCT_ID_REQUEST, 0]).await?;
        for _ in 0..PROBE_ATTEMPTS {
            Timer::after(PROBE_DELAY).await;
            if let Some((CHANNEL_CONTROL, len)) = self.receive().await? {
                if len > HEADER_LEN && self.packet[HEADER_LEN] == PRODUCT_ID_RESPONSE {
                    debug!(
                        "BNO080 product id: SW {}.{}",
                        self.packet[HEADER_LEN + 2],
                        self.packet[HEADER_LEN + 3]
                    );
                    return Ok(());
                }
            }
        }
        Err(Error::SensorNotDetected)
    }

    async fn enable_rotation_vector(&mut self, interval_ms: u32) -> Result<(), Error> {
        let us = (interval_ms * 1000).to_le_bytes();
        let mut cmd = [0u8; 17];
        cmd[0] = SET_FEATURE_COMMAND;
        cmd[1] = REPORT_ROTATION_VECTOR;
        cmd[5..9].copy_from_slice(&us);
        self.send(CHANNEL_CONTROL, &cmd).await
    }
}

impl<I: I2c> OrientationSensor for Bno080<I> {
    async fn init(&mut self) -> Result<(), Error> {
        self.detect().await?;
        self.enable_rotation_vector(IMU_REPORT_INTERVAL_MS as u32).await
    }

    async fn read_quaternion(&mut self) -> Result<Option<Quaternion>, Error> {
        match self.receive().await? {
            Some((CHANNEL_REPORTS, len)) => Ok(parse_rotation_vector(&self.packet[HEADER_LEN..len])),
            _ => Ok(None),
        }
    }
}

#[embassy_executor::task]
pub async fn imu_task(mut sensor: Bno080<ImuBus>) -> ! {
    // Poll at twice the report rate.
    let mut ticker = Ticker::every(Duration::from_millis(IMU_REPORT_INTERVAL_MS / 2));
    loop {
        match sensor.read_quaternion().await {
            Ok(Some(q)) => LATEST_QUATERNION.lock(|c| c.set(Some(q))),
            Ok(None) => {}
            Err(e) => warn!("IMU read failed: {}", e),
        }
        ticker.next().await;
    }
}
