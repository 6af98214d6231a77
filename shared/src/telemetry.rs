//! Telemetry packet encodings
//!
//! Fixed-size packed structures whose binary layout is part of the
//! ground contract. All multi-byte fields are little-endian; analog
//! quantities use saturating fixed-point scales noted per field.

use serde::{Deserialize, Serialize};

use crate::error::{FswError, Result};
use crate::math::round;

/// Convert to fixed point with the given scale, saturating to `i16`
///
/// `scale` is counts per unit: 10.0 encodes 0.1-unit resolution.
#[must_use]
pub fn to_fixed_i16(value: f64, scale: f64) -> i16 {
    let scaled = round(value * scale);
    if scaled >= f64::from(i16::MAX) {
        i16::MAX
    } else if scaled <= f64::from(i16::MIN) {
        i16::MIN
    } else {
        scaled as i16
    }
}

/// Convert to fixed point with the given scale, saturating to `i8`
#[must_use]
pub fn to_fixed_i8(value: f64, scale: f64) -> i8 {
    let scaled = round(value * scale);
    if scaled >= f64::from(i8::MAX) {
        i8::MAX
    } else if scaled <= f64::from(i8::MIN) {
        i8::MIN
    } else {
        scaled as i8
    }
}

/// ADCS telemetry packet
///
/// 24-byte wire image: mode, magnetic field (0.1 µT), sun vector
/// (0.01 unit), angular rate (0.01 °/s), magnetorquer duty (signed
/// percent), visibility and detumble flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdcsTelemetry {
    /// Current operating mode
    pub mode: u8,
    /// Magnetic field X (0.1 µT)
    pub mag_x: i16,
    /// Magnetic field Y (0.1 µT)
    pub mag_y: i16,
    /// Magnetic field Z (0.1 µT)
    pub mag_z: i16,
    /// Sun vector X (0.01 unit)
    pub sun_x: i16,
    /// Sun vector Y (0.01 unit)
    pub sun_y: i16,
    /// Sun vector Z (0.01 unit)
    pub sun_z: i16,
    /// Angular rate X (0.01 °/s)
    pub rate_x: i16,
    /// Angular rate Y (0.01 °/s)
    pub rate_y: i16,
    /// Angular rate Z (0.01 °/s)
    pub rate_z: i16,
    /// Magnetorquer X duty cycle (percent)
    pub mtq_x: i8,
    /// Magnetorquer Y duty cycle (percent)
    pub mtq_y: i8,
    /// Magnetorquer Z duty cycle (percent)
    pub mtq_z: i8,
    /// Sun visibility flag
    pub sun_visible: u8,
    /// Detumble completion flag
    pub detumble_done: u8,
}

impl AdcsTelemetry {
    /// Encoded packet size in bytes
    pub const SIZE: usize = 24;

    /// Encode to the wire image
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.mode;
        put_i16(&mut buf[1..3], self.mag_x);
        put_i16(&mut buf[3..5], self.mag_y);
        put_i16(&mut buf[5..7], self.mag_z);
        put_i16(&mut buf[7..9], self.sun_x);
        put_i16(&mut buf[9..11], self.sun_y);
        put_i16(&mut buf[11..13], self.sun_z);
        put_i16(&mut buf[13..15], self.rate_x);
        put_i16(&mut buf[15..17], self.rate_y);
        put_i16(&mut buf[17..19], self.rate_z);
        buf[19] = self.mtq_x as u8;
        buf[20] = self.mtq_y as u8;
        buf[21] = self.mtq_z as u8;
        buf[22] = self.sun_visible;
        buf[23] = self.detumble_done;
        buf
    }

    /// Decode from a wire image
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(FswError::invalid_parameter("adcs telemetry length"));
        }
        Ok(Self {
            mode: buf[0],
            mag_x: get_i16(&buf[1..3]),
            mag_y: get_i16(&buf[3..5]),
            mag_z: get_i16(&buf[5..7]),
            sun_x: get_i16(&buf[7..9]),
            sun_y: get_i16(&buf[9..11]),
            sun_z: get_i16(&buf[11..13]),
            rate_x: get_i16(&buf[13..15]),
            rate_y: get_i16(&buf[15..17]),
            rate_z: get_i16(&buf[17..19]),
            mtq_x: buf[19] as i8,
            mtq_y: buf[20] as i8,
            mtq_z: buf[21] as i8,
            sun_visible: buf[22],
            detumble_done: buf[23],
        })
    }
}

/// Deployment telemetry packet
///
/// 10-byte wire image summarising the deployment sequencer for ground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTelemetry {
    /// Current state machine state
    pub state: u8,
    /// Antenna deployment confirmed
    pub antenna_deployed: u8,
    /// Antenna deployment attempts
    pub antenna_attempts: u8,
    /// Solar panel deployment confirmed
    pub solar_deployed: u8,
    /// Solar panel deployment attempts
    pub solar_attempts: u8,
    /// Seconds since separation (0 while mated)
    pub time_since_sep_s: u32,
    /// Deployment inhibited by ground command
    pub inhibit_active: u8,
}

impl DeploymentTelemetry {
    /// Encoded packet size in bytes
    pub const SIZE: usize = 10;

    /// Encode to the wire image
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.state;
        buf[1] = self.antenna_deployed;
        buf[2] = self.antenna_attempts;
        buf[3] = self.solar_deployed;
        buf[4] = self.solar_attempts;
        buf[5..9].copy_from_slice(&self.time_since_sep_s.to_le_bytes());
        buf[9] = self.inhibit_active;
        buf
    }

    /// Decode from a wire image
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(FswError::invalid_parameter("deployment telemetry length"));
        }
        let mut sep = [0u8; 4];
        sep.copy_from_slice(&buf[5..9]);
        Ok(Self {
            state: buf[0],
            antenna_deployed: buf[1],
            antenna_attempts: buf[2],
            solar_deployed: buf[3],
            solar_attempts: buf[4],
            time_since_sep_s: u32::from_le_bytes(sep),
            inhibit_active: buf[9],
        })
    }
}

fn put_i16(buf: &mut [u8], value: i16) {
    buf.copy_from_slice(&value.to_le_bytes());
}

fn get_i16(buf: &[u8]) -> i16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(buf);
    i16::from_le_bytes(b)
}
