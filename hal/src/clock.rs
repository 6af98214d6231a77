//! Monotonic clock capability

/// Monotonic board clock
///
/// Time starts at zero at power-on and never goes backwards within a
/// power cycle.
pub trait Clock {
    /// Milliseconds since power-on
    fn now_ms(&self) -> u64;

    /// Microseconds since power-on
    fn now_us(&self) -> u64;

    /// Busy-wait for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32);
}
