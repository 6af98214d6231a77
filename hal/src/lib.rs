//! # MicroSat Bus Hardware Abstraction Layer
//!
//! The contract the flight core consumes: capability traits for the
//! clock, GPIO, I²C, ADC, UART, flash storage, and the hardware
//! watchdog, plus the enumerated pin, bus, channel, and region
//! identifiers that keep the core portable across boards.
//!
//! Per-target drivers live out of tree; this crate ships only the
//! interfaces and a host-side simulation implementation ([`sim`],
//! `std` builds only) used by tests and the mission simulation binary.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(unused_qualifications)]

use core::fmt;

pub mod adc;
pub mod clock;
pub mod flash;
pub mod gpio;
pub mod i2c;
#[cfg(feature = "std")]
pub mod sim;
pub mod uart;
pub mod wdt;

pub use adc::{Adc, AdcChannel, ADC_FULL_SCALE};
pub use clock::Clock;
pub use flash::{FlashRegion, FlashStore};
pub use gpio::{Gpio, Pin, PinDirection, PinPull};
pub use i2c::{I2cBus, I2cBusId, I2cSpeed, MAGNETOMETER_ADDR};
pub use uart::{Uart, UartPort};
pub use wdt::{HwWatchdog, WdtMode};

/// Standard result type for HAL operations
pub type Result<T> = core::result::Result<T, HalError>;

/// Errors reported by HAL drivers
///
/// The flight core maps these into its own taxonomy at each subsystem
/// boundary; drivers must not panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HalError {
    /// Pin identifier not present on this board
    InvalidPin,
    /// Pin used before configuration
    NotConfigured,
    /// I²C/SPI transport fault
    BusError,
    /// Device did not acknowledge
    Nak,
    /// Bus or read deadline elapsed
    Timeout,
    /// ADC channel identifier not present
    InvalidChannel,
    /// Peripheral used before its init
    NotInitialised,
    /// Flash region identifier not present
    InvalidRegion,
    /// Access past the end of a flash region
    OutOfBounds,
    /// Flash controller busy with a previous operation
    Busy,
    /// Watchdog timeout outside the supported range
    InvalidTimeout,
    /// Capability absent on this target
    Unsupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            HalError::InvalidPin => "invalid pin",
            HalError::NotConfigured => "pin not configured",
            HalError::BusError => "bus error",
            HalError::Nak => "device NAK",
            HalError::Timeout => "timeout",
            HalError::InvalidChannel => "invalid ADC channel",
            HalError::NotInitialised => "peripheral not initialised",
            HalError::InvalidRegion => "invalid flash region",
            HalError::OutOfBounds => "flash access out of bounds",
            HalError::Busy => "flash busy",
            HalError::InvalidTimeout => "invalid watchdog timeout",
            HalError::Unsupported => "capability not supported",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Full board capability bundle
///
/// Implemented automatically for any type providing every capability;
/// the supervisor is generic over this, while individual subsystems
/// bound only the traits they consume.
pub trait Hal: Clock + Gpio + I2cBus + Adc + Uart + FlashStore + HwWatchdog {}

impl<T> Hal for T where T: Clock + Gpio + I2cBus + Adc + Uart + FlashStore + HwWatchdog {}
