//! ADC capability and channel map

use serde::{Deserialize, Serialize};

use crate::Result;

/// ADC full-scale count (12-bit converter)
pub const ADC_FULL_SCALE: u16 = 4095;

/// ADC channel identifiers
///
/// The six sun-sensor photodiodes occupy one channel per face; the
/// remaining channels carry housekeeping voltages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AdcChannel {
    /// Sun sensor, +X face
    SunPosX = 0,
    /// Sun sensor, -X face
    SunNegX = 1,
    /// Sun sensor, +Y face
    SunPosY = 2,
    /// Sun sensor, -Y face
    SunNegY = 3,
    /// Sun sensor, +Z face
    SunPosZ = 4,
    /// Sun sensor, -Z face
    SunNegZ = 5,
    /// Battery bus voltage
    BatteryVoltage = 6,
    /// Board temperature sensor
    BoardTemp = 7,
}

impl AdcChannel {
    /// Number of channels
    pub const COUNT: usize = 8;

    /// The six sun-sensor channels, face order +X -X +Y -Y +Z -Z
    pub const SUN_SENSORS: [Self; 6] = [
        Self::SunPosX,
        Self::SunNegX,
        Self::SunPosY,
        Self::SunNegY,
        Self::SunPosZ,
        Self::SunNegZ,
    ];

    /// Table index for driver state arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// ADC capability
pub trait Adc {
    /// Read raw converter counts for a channel
    fn read_raw(&mut self, channel: AdcChannel) -> Result<u16>;

    /// Read a channel converted to volts
    fn read_voltage(&mut self, channel: AdcChannel) -> Result<f64>;
}
