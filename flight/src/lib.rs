//! # MicroSat Bus Controller Core
//!
//! Flight software core for a CubeSat-class bus: the subsystems that
//! decide whether the spacecraft survives its first orbit and stays
//! operable.
//!
//! - [`deployment`] — hard-timed sequencer that inhibits deployables
//!   until the post-separation hold-off expires, then releases antennas
//!   and solar panels with verification and bounded retry.
//! - [`adcs`] — periodic attitude control loop: B-dot detumble and
//!   sun pointing on magnetorquers, with gyroless rate estimation.
//! - [`watchdog`] — two-tier watchdog: hardware timer plus a per-task
//!   liveness supervisor with a pre-reset persistence hook.
//! - [`flightlog`] — fixed-capacity severity-filtered ring buffer, the
//!   only permitted diagnostic sink at runtime.
//! - [`supervisor`] — single-threaded cooperative loop that ticks the
//!   subsystems in a fixed order against the HAL.
//!
//! No dynamic allocation, no standard I/O at runtime; all hardware
//! access goes through the `microsat-hal` capability traits.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(unused_qualifications)]

pub mod adcs;
pub mod deployment;
pub mod flightlog;
pub mod supervisor;
pub mod watchdog;

pub use adcs::{AdcsCore, AdcsMode};
pub use deployment::{DeployElement, DeployState, Deployment};
pub use flightlog::{FlightLog, LogLevel};
pub use supervisor::Supervisor;
pub use watchdog::{TaskId, WatchdogManager};

use microsat_hal::HalError;
use microsat_shared::FswError;

/// Map a HAL driver error into the flight-software taxonomy
///
/// Applied at every subsystem boundary so callers above the HAL only
/// ever see `FswError` kinds.
#[must_use]
pub fn map_hal_error(err: HalError, operation: &'static str) -> FswError {
    match err {
        HalError::Timeout => FswError::Timeout { deadline_ms: 0, operation },
        HalError::BusError | HalError::Nak => FswError::BusError { bus: operation },
        HalError::InvalidPin
        | HalError::InvalidChannel
        | HalError::InvalidRegion
        | HalError::OutOfBounds
        | HalError::InvalidTimeout => FswError::InvalidParameter { parameter: operation },
        HalError::NotConfigured | HalError::NotInitialised => {
            FswError::NotInitialised { subsystem: operation }
        }
        HalError::Busy => FswError::Timeout { deadline_ms: 0, operation },
        HalError::Unsupported => FswError::Unsupported { capability: operation },
        _ => FswError::Internal { module: operation },
    }
}
