//! Orientation sample and its ASCII wire form.
//!
//! Sensor nodes send `real,i,j,k,` with eight fractional digits per
//! component.  The hub relays whatever bytes it receives without parsing
//! them.

use crate::buffer::DataBuffer;
use crate::error::Error;
use core::fmt::Write;

/// Fixed-point scale of the rotation-vector report (Q14).
const Q14_SCALE: f32 = (1u32 << 14) as f32;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quaternion {
    pub real: f32,
    pub i: f32,
    pub j: f32,
    pub k: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        real: 1.0,
        i: 0.0,
        j: 0.0,
        k: 0.0,
    };

    /// Decode raw Q14 components in report order (i, j, k, real).
    pub fn from_q14(i: i16, j: i16, k: i16, real: i16) -> Self {
        Self {
            real: real as f32 / Q14_SCALE,
            i: i as f32 / Q14_SCALE,
            j: j as f32 / Q14_SCALE,
            k: k as f32 / Q14_SCALE,
        }
    }

    /// Overwrite `buf` with `real,i,j,k,` (8 fractional digits each).
    /// Output that does not fit the usable length is cut off.
    pub fn write_ascii(&self, buf: &mut DataBuffer) {
        buf.clear();
        let _ = write!(
            buf,
            "{:.8},{:.8},{:.8},{:.8},",
            self.real, self.i, self.j, self.k
        );
    }
}

/// SHTP input-report ids.
pub const REPORT_BASE_TIMESTAMP: u8 = 0xFB;
pub const REPORT_ROTATION_VECTOR: u8 = 0x05;

/// Rotation-vector report: id, seq, status, delay, i, j, k, real, accuracy.
const ROTATION_VECTOR_LEN: usize = 14;

/// Decode a rotation vector from an SHTP input-report payload, skipping
/// a leading base-timestamp record when present.
pub fn parse_rotation_vector(payload: &[u8]) -> Option<Quaternion> {
    let report = match payload.first() {
        Some(&REPORT_BASE_TIMESTAMP) => payload.get(5..)?,
        _ => payload,
    };
    if report.len() < ROTATION_VECTOR_LEN || report[0] != REPORT_ROTATION_VECTOR {
        return None;
    }
    let word = |at: usize| i16::from_le_bytes([report[at], report[at + 1]]);
    Some(Quaternion::from_q14(word(4), word(6), word(8), word(10)))
}

/// Source of orientation samples (the motion sensor driver).
#[allow(async_fn_in_trait)]
pub trait OrientationSensor {
    /// Probe and configure the sensor.  Failure is fatal for the firmware.
    async fn init(&mut self) -> Result<(), Error>;

    /// Latest sample, or `None` when nothing new arrived.
    async fn read_quaternion(&mut self) -> Result<Option<Quaternion>, Error>;
}
