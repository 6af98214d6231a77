//! Error types for the bus flight software
//!
//! All subsystems report failures through the [`FswError`] taxonomy. The
//! core never unwinds: errors are returned as values, counted where they
//! are non-fatal, and mapped from foreign error types at each subsystem
//! boundary.

use core::fmt;

#[cfg(feature = "std")]
use std::error::Error as StdError;

use serde::{Deserialize, Serialize};

/// Standard result type for flight-software operations
pub type Result<T> = core::result::Result<T, FswError>;

/// Flight-software error taxonomy
///
/// Variants are error *kinds*, not per-subsystem types: each subsystem
/// maps the errors of its collaborators into this taxonomy at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FswError {
    /// A caller-supplied parameter was out of range
    InvalidParameter {
        /// Name of the offending parameter
        parameter: &'static str,
    },

    /// Operation on a subsystem before its init
    NotInitialised {
        /// Subsystem that was not initialised
        subsystem: &'static str,
    },

    /// A bus transaction or read deadline elapsed
    Timeout {
        /// Deadline that elapsed, in milliseconds
        deadline_ms: u32,
        /// Operation that timed out
        operation: &'static str,
    },

    /// Transport fault on a peripheral bus
    BusError {
        /// Bus on which the fault occurred
        bus: &'static str,
    },

    /// Persistent state failed integrity validation
    CrcMismatch {
        /// CRC stored with the data
        stored: u32,
        /// CRC calculated over the data
        calculated: u32,
    },

    /// HAL capability absent on this target
    Unsupported {
        /// Capability that is unavailable
        capability: &'static str,
    },

    /// A fixed-capacity table is full
    ///
    /// Part of the error contract for collaborators that allocate
    /// slots dynamically. The core's own tables (watchdog tasks, log
    /// ring) are keyed by enumerated IDs or overwrite by design, so
    /// nothing in-tree produces this kind today.
    OutOfResources {
        /// Resource that is exhausted
        resource: &'static str,
        /// Capacity of the resource
        capacity: u32,
    },

    /// Invariant violation inside the flight software
    Internal {
        /// Module that detected the violation
        module: &'static str,
    },
}

impl fmt::Display for FswError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FswError::InvalidParameter { parameter } => {
                write!(f, "Invalid parameter: {}", parameter)
            }
            FswError::NotInitialised { subsystem } => {
                write!(f, "Subsystem not initialised: {}", subsystem)
            }
            FswError::Timeout { deadline_ms, operation } => {
                write!(f, "Timeout after {}ms during {}", deadline_ms, operation)
            }
            FswError::BusError { bus } => {
                write!(f, "Bus error on {}", bus)
            }
            FswError::CrcMismatch { stored, calculated } => {
                write!(
                    f,
                    "CRC mismatch: stored {:#010x}, calculated {:#010x}",
                    stored, calculated
                )
            }
            FswError::Unsupported { capability } => {
                write!(f, "Capability not supported: {}", capability)
            }
            FswError::OutOfResources { resource, capacity } => {
                write!(f, "Resource exhausted: {} (capacity {})", resource, capacity)
            }
            FswError::Internal { module } => {
                write!(f, "Internal invariant violation in {}", module)
            }
        }
    }
}

#[cfg(feature = "std")]
impl StdError for FswError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        None
    }
}

impl FswError {
    /// Create an invalid-parameter error
    pub const fn invalid_parameter(parameter: &'static str) -> Self {
        Self::InvalidParameter { parameter }
    }

    /// Create a not-initialised error
    pub const fn not_initialised(subsystem: &'static str) -> Self {
        Self::NotInitialised { subsystem }
    }

    /// Create a timeout error
    pub const fn timeout(deadline_ms: u32, operation: &'static str) -> Self {
        Self::Timeout { deadline_ms, operation }
    }

    /// Check if the error is worth retrying on the next tick
    ///
    /// Non-fatal errors (a bus hiccup, a full table) are counted and
    /// retried; fatal ones require intervention or a state reset.
    pub const fn is_recoverable(&self) -> bool {
        match self {
            FswError::Timeout { .. } => true,
            FswError::BusError { .. } => true,
            FswError::OutOfResources { .. } => true,
            FswError::InvalidParameter { .. } => false,
            FswError::NotInitialised { .. } => false,
            FswError::CrcMismatch { .. } => false,
            FswError::Unsupported { .. } => false,
            FswError::Internal { .. } => false,
        }
    }

    /// Get error severity level (0=info, 1=warning, 2=error, 3=critical)
    pub const fn severity(&self) -> u8 {
        match self {
            FswError::Timeout { .. } => 1,
            FswError::BusError { .. } => 1,
            FswError::InvalidParameter { .. } => 2,
            FswError::NotInitialised { .. } => 2,
            FswError::OutOfResources { .. } => 2,
            FswError::Unsupported { .. } => 2,
            FswError::CrcMismatch { .. } => 2,
            FswError::Internal { .. } => 3,
        }
    }
}
