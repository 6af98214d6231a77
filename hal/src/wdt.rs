//! Hardware watchdog capability

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default hardware watchdog timeout (ms)
pub const WDT_DEFAULT_TIMEOUT_MS: u32 = 30_000;

/// Minimum supported watchdog timeout (ms)
pub const WDT_MIN_TIMEOUT_MS: u32 = 1_000;

/// Maximum supported watchdog timeout (ms)
pub const WDT_MAX_TIMEOUT_MS: u32 = 60_000;

/// Watchdog expiry behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WdtMode {
    /// Reset the system on timeout
    Reset,
    /// Raise an interrupt on timeout, where the silicon supports it
    Interrupt,
}

/// Hardware watchdog capability
///
/// Mirrors flight silicon: once started the watchdog cannot be
/// stopped, only kicked.
pub trait HwWatchdog {
    /// Initialise with the given timeout and mode
    ///
    /// Timeouts outside `[WDT_MIN_TIMEOUT_MS, WDT_MAX_TIMEOUT_MS]` are
    /// rejected with `InvalidTimeout`.
    fn init(&mut self, timeout_ms: u32, mode: WdtMode) -> Result<()>;

    /// Start the countdown; irreversible
    fn start(&mut self) -> Result<()>;

    /// Refresh the countdown
    fn kick(&mut self);

    /// Milliseconds until expiry (0 when unavailable)
    fn remaining_ms(&self) -> u32;

    /// Whether the previous reset was caused by the watchdog
    fn caused_reset(&self) -> bool;

    /// Clear the watchdog-reset cause flag
    fn clear_reset_flag(&mut self);

    /// Install an early-warning callback, where supported
    ///
    /// The callback runs in interrupt context shortly before expiry;
    /// targets without early warning return `Unsupported`.
    fn set_warning_callback(&mut self, callback: Option<fn()>) -> Result<()>;

    /// Poll and clear any latched early-warning event
    ///
    /// Drivers latch the warning interrupt so task-context code can
    /// service it on its next pass; targets without early warning
    /// always return `false`.
    fn warning_pending(&mut self) -> bool {
        false
    }
}
