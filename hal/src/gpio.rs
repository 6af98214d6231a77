//! GPIO capability and the board pin map

use serde::{Deserialize, Serialize};

use crate::Result;

/// Logical GPIO pins
///
/// Logical names mapped to physical pins by the board driver so the
/// core never sees numeric pin literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pin {
    /// Separation switch input (normally closed while mated)
    SeparationSense = 0,
    /// Antenna deployment confirmation switch input
    AntennaSense = 1,
    /// Solar panel deployment confirmation switch input
    SolarSense = 2,
    /// Burn-wire current enable output
    DeployEnable = 3,
    /// ADCS sensor/actuator power enable
    AdcsPower = 4,
    /// Radio power enable
    RadioPower = 5,
    /// Battery heater enable
    HeaterEnable = 6,
    /// Status LED
    StatusLed = 7,
    /// RF transmitter enable
    RfTxEnable = 8,
    /// EPS alert input
    EpsAlert = 9,
}

impl Pin {
    /// Number of logical pins
    pub const COUNT: usize = 10;

    /// Table index for driver state arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// GPIO direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    /// Input pin
    Input,
    /// Output pin
    Output,
}

/// GPIO pull configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinPull {
    /// No pull resistor
    None,
    /// Pull-up resistor
    Up,
    /// Pull-down resistor
    Down,
}

/// GPIO capability
pub trait Gpio {
    /// Configure a pin's direction and pull
    fn config(&mut self, pin: Pin, direction: PinDirection, pull: PinPull) -> Result<()>;

    /// Drive an output pin
    fn set(&mut self, pin: Pin, state: bool) -> Result<()>;

    /// Read a pin's level
    fn get(&self, pin: Pin) -> Result<bool>;

    /// Toggle an output pin
    fn toggle(&mut self, pin: Pin) -> Result<()>;
}
