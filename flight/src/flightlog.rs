//! Flight-safe logging subsystem
//!
//! Zero-allocation, severity-filtered diagnostic sink usable from any
//! subsystem including fault paths. Entries live in a fixed 64-entry
//! ring; on overflow the oldest entry is overwritten and counted as
//! dropped. Messages are bounded-length formatted text; truncation is
//! marked with a trailing `...`.
//!
//! Single-threaded cooperative: the log is called from the same context
//! as all other core code, so no locking is required.

use core::fmt::{self, Write as _};

use heapless::String;
use microsat_hal::{Uart, UartPort};
use microsat_shared::error::{FswError, Result};
use microsat_shared::time::truncate_ms;

use crate::map_hal_error;

/// Number of entries in the ring buffer
pub const LOG_BUFFER_SIZE: usize = 64;

/// Maximum message length in bytes
pub const LOG_MAX_MESSAGE_LEN: usize = 127;

/// Maximum module-name length in bytes
pub const LOG_MAX_MODULE_LEN: usize = 15;

/// Compile-time log floor; writes below this level never reach the
/// library (the [`fsw_log!`](crate::fsw_log) macro checks it at the
/// call site before formatting).
pub const MIN_LEVEL: LogLevel = LogLevel::Trace;

/// Log severity levels, least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Very detailed tracing
    Trace = 0,
    /// Debug information
    Debug = 1,
    /// Informational messages
    Info = 2,
    /// Warning conditions
    Warning = 3,
    /// Error conditions
    Error = 4,
    /// Critical errors
    Critical = 5,
    /// Logging disabled
    Off = 6,
}

impl LogLevel {
    /// Fixed-width level tag for sink output
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warning => "WARN ",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRIT ",
            LogLevel::Off => "OFF  ",
        }
    }
}

/// Output destinations, combined as a bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOutputs(u8);

impl LogOutputs {
    /// Discard accepted entries
    pub const NONE: Self = Self(0x00);
    /// Store in the ring buffer
    pub const BUFFER: Self = Self(0x01);
    /// Emit on the debug UART; drains from the ring, so the buffer
    /// sink must also be selected
    pub const UART: Self = Self(0x02);
    /// Surface through telemetry reads
    pub const TELEMETRY: Self = Self(0x04);

    /// Combine destinations
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every destination in `other` is selected
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// A log entry stored in the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Timestamp, low 32 bits of monotonic milliseconds
    pub timestamp_ms: u32,
    /// Severity
    pub level: LogLevel,
    /// Module name, at most [`LOG_MAX_MODULE_LEN`] bytes
    pub module: String<LOG_MAX_MODULE_LEN>,
    /// Message text, at most [`LOG_MAX_MESSAGE_LEN`] bytes
    pub message: String<LOG_MAX_MESSAGE_LEN>,
    /// Monotone sequence number
    pub sequence: u16,
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            level: LogLevel::Trace,
            module: String::new(),
            message: String::new(),
            sequence: 0,
        }
    }
}

/// Logging statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogStats {
    /// Total write calls
    pub total_logs: u32,
    /// Writes rejected by the level floors
    pub filtered_logs: u32,
    /// Entries lost to ring overflow
    pub dropped_logs: u32,
    /// Accepted writes per level, Trace..Critical
    pub level_counts: [u32; 6],
    /// Entries currently buffered
    pub buffer_entries: u16,
    /// Maximum buffer occupancy seen
    pub buffer_high_water: u16,
}

/// Fixed-capacity severity-filtered ring logger
pub struct FlightLog {
    buffer: [LogEntry; LOG_BUFFER_SIZE],
    write_index: usize,
    read_index: usize,
    count: usize,
    sequence: u16,
    level: LogLevel,
    outputs: LogOutputs,
    callback: Option<fn(&LogEntry)>,
    in_callback: bool,
    uart_pending: usize,
    stats: LogStats,
}

impl fmt::Debug for FlightLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightLog")
            .field("count", &self.count)
            .field("sequence", &self.sequence)
            .field("level", &self.level)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for FlightLog {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightLog {
    /// Create an empty log buffering at `Debug` and above
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: core::array::from_fn(|_| LogEntry::default()),
            write_index: 0,
            read_index: 0,
            count: 0,
            sequence: 0,
            level: LogLevel::Debug,
            outputs: LogOutputs::BUFFER,
            callback: None,
            in_callback: false,
            uart_pending: 0,
            stats: LogStats::default(),
        }
    }

    /// Set the runtime level floor
    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// Current runtime level floor
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Select output destinations
    pub fn set_outputs(&mut self, outputs: LogOutputs) {
        self.outputs = outputs;
    }

    /// Install or remove the output callback
    ///
    /// The callback fires synchronously on every accepted write. It is
    /// never re-entered: writes issued while a callback is running skip
    /// the dispatch.
    pub fn register_callback(&mut self, callback: Option<fn(&LogEntry)>) {
        self.callback = callback;
    }

    /// Record a formatted entry
    ///
    /// Applies both level floors, stores the entry in the ring when the
    /// buffer sink is selected, and dispatches the callback. `Off` is
    /// not a writable level.
    pub fn write(
        &mut self,
        now_ms: u64,
        level: LogLevel,
        module: &str,
        args: fmt::Arguments<'_>,
    ) -> Result<()> {
        if level == LogLevel::Off {
            return Err(FswError::invalid_parameter("log level"));
        }

        self.stats.total_logs = self.stats.total_logs.wrapping_add(1);

        if level < MIN_LEVEL || level < self.level {
            self.stats.filtered_logs = self.stats.filtered_logs.wrapping_add(1);
            return Ok(());
        }

        self.stats.level_counts[level as usize] =
            self.stats.level_counts[level as usize].wrapping_add(1);

        let mut entry = LogEntry {
            timestamp_ms: truncate_ms(now_ms),
            level,
            module: String::new(),
            message: String::new(),
            sequence: self.sequence,
        };
        self.sequence = self.sequence.wrapping_add(1);

        copy_bounded(&mut entry.module, module);
        let mut writer = TruncatingWriter { dst: &mut entry.message };
        if writer.write_fmt(args).is_err() {
            mark_truncated(&mut entry.message);
        }

        if self.outputs.contains(LogOutputs::BUFFER) {
            self.store(entry.clone());
        }

        if let Some(callback) = self.callback {
            if !self.in_callback {
                self.in_callback = true;
                callback(&entry);
                self.in_callback = false;
            }
        }

        Ok(())
    }

    fn store(&mut self, entry: LogEntry) {
        self.buffer[self.write_index] = entry;
        self.write_index = (self.write_index + 1) % LOG_BUFFER_SIZE;

        if self.count < LOG_BUFFER_SIZE {
            self.count += 1;
        } else {
            // Full: the slot just written replaced the oldest entry
            self.read_index = (self.read_index + 1) % LOG_BUFFER_SIZE;
            self.stats.dropped_logs = self.stats.dropped_logs.wrapping_add(1);
        }

        if self.outputs.contains(LogOutputs::UART) && self.uart_pending < LOG_BUFFER_SIZE {
            self.uart_pending += 1;
        }

        self.stats.buffer_entries = self.count as u16;
        if self.count as u16 > self.stats.buffer_high_water {
            self.stats.buffer_high_water = self.count as u16;
        }
    }

    /// Copy out the entry at `index`, where index 0 is the oldest
    pub fn get_entry(&self, index: usize) -> Result<LogEntry> {
        if index >= self.count {
            return Err(FswError::invalid_parameter("log index"));
        }
        let slot = (self.read_index + index) % LOG_BUFFER_SIZE;
        Ok(self.buffer[slot].clone())
    }

    /// Number of buffered entries
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Discard all buffered entries; statistics other than occupancy
    /// are preserved
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.count = 0;
        self.uart_pending = 0;
        self.stats.buffer_entries = 0;
    }

    /// Current statistics snapshot
    #[must_use]
    pub fn stats(&self) -> LogStats {
        self.stats
    }

    /// Emit entries accepted since the last pump on the debug UART
    ///
    /// Called from the supervisor at the end of each tick while the
    /// UART sink is selected; a transport error leaves the remaining
    /// entries pending for the next pump.
    pub fn pump_uart<U: Uart>(&mut self, uart: &mut U) -> Result<()> {
        while self.uart_pending > 0 {
            let index = self.count - self.uart_pending;
            let slot = (self.read_index + index) % LOG_BUFFER_SIZE;
            let line = format_line(&self.buffer[slot]);
            uart.write(UartPort::Debug, line.as_bytes())
                .map_err(|e| map_hal_error(e, "log uart"))?;
            self.uart_pending -= 1;
        }
        Ok(())
    }

    /// Re-emit every buffered entry on the debug UART
    pub fn flush<U: Uart>(&mut self, uart: &mut U) -> Result<()> {
        for index in 0..self.count {
            let slot = (self.read_index + index) % LOG_BUFFER_SIZE;
            let line = format_line(&self.buffer[slot]);
            uart.write(UartPort::Debug, line.as_bytes())
                .map_err(|e| map_hal_error(e, "log uart"))?;
        }
        self.uart_pending = 0;
        Ok(())
    }
}

fn copy_bounded<const N: usize>(dst: &mut String<N>, src: &str) {
    for ch in src.chars() {
        if dst.push(ch).is_err() {
            break;
        }
    }
}

/// Keeps as much of the formatted output as fits, so truncation
/// preserves the message prefix instead of dropping a whole chunk
struct TruncatingWriter<'a, const N: usize> {
    dst: &'a mut String<N>,
}

impl<const N: usize> fmt::Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.dst.push(ch).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

fn mark_truncated<const N: usize>(message: &mut String<N>) {
    while message.len() > N - 3 {
        let _ = message.pop();
    }
    let _ = message.push_str("...");
}

fn format_line(entry: &LogEntry) -> String<176> {
    let mut line: String<176> = String::new();
    let _ = writeln!(
        line,
        "[{:010}][{}][{}] {}",
        entry.timestamp_ms,
        entry.level.tag(),
        entry.module,
        entry.message
    );
    line
}

/// Log with call-site compile-time level filtering
///
/// Arguments: log handle, current monotonic ms, level, module name,
/// then `format!`-style message arguments. Below [`MIN_LEVEL`] the
/// arguments are never evaluated.
#[macro_export]
macro_rules! fsw_log {
    ($log:expr, $now:expr, $level:expr, $module:expr, $($arg:tt)*) => {{
        if ($level as u8) >= ($crate::flightlog::MIN_LEVEL as u8) {
            let _ = $log.write($now, $level, $module, ::core::format_args!($($arg)*));
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use microsat_hal::sim::SimHal;

    fn info(log: &mut FlightLog, now: u64, msg: &str) {
        let _ = log.write(now, LogLevel::Info, "TEST", format_args!("{}", msg));
    }

    #[test]
    fn test_write_and_read_back() {
        let mut log = FlightLog::new();
        let _ = log.write(1234, LogLevel::Info, "DEPLOY", format_args!("attempt {}", 2));

        assert_eq!(log.count(), 1);
        let entry = log.get_entry(0).unwrap();
        assert_eq!(entry.timestamp_ms, 1234);
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.module.as_str(), "DEPLOY");
        assert_eq!(entry.message.as_str(), "attempt 2");
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut log = FlightLog::new();
        for i in 0..74u32 {
            let _ = log.write(u64::from(i), LogLevel::Info, "OVF", format_args!("entry {}", i));
        }

        assert_eq!(log.count(), LOG_BUFFER_SIZE);
        let stats = log.stats();
        assert_eq!(stats.dropped_logs, 10);
        // Index 0 is now the 11th write
        let oldest = log.get_entry(0).unwrap();
        assert_eq!(oldest.message.as_str(), "entry 10");
        let newest = log.get_entry(LOG_BUFFER_SIZE - 1).unwrap();
        assert_eq!(newest.message.as_str(), "entry 73");
    }

    #[test]
    fn test_runtime_level_filter() {
        let mut log = FlightLog::new();
        log.set_level(LogLevel::Warning);
        info(&mut log, 0, "below floor");
        let _ = log.write(0, LogLevel::Error, "TEST", format_args!("above floor"));

        assert_eq!(log.count(), 1);
        assert_eq!(log.stats().filtered_logs, 1);
        assert_eq!(log.get_entry(0).unwrap().message.as_str(), "above floor");
    }

    #[test]
    fn test_off_is_not_writable() {
        let mut log = FlightLog::new();
        assert!(log
            .write(0, LogLevel::Off, "TEST", format_args!("nope"))
            .is_err());
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn test_long_message_truncated_with_ellipsis() {
        let mut log = FlightLog::new();
        let long = "x".repeat(300);
        info(&mut log, 0, &long);

        let entry = log.get_entry(0).unwrap();
        assert!(entry.message.len() <= LOG_MAX_MESSAGE_LEN);
        assert!(entry.message.as_str().ends_with("..."));
    }

    #[test]
    fn test_module_name_bounded() {
        let mut log = FlightLog::new();
        let _ = log.write(
            0,
            LogLevel::Info,
            "A_VERY_LONG_MODULE_NAME",
            format_args!("m"),
        );
        let entry = log.get_entry(0).unwrap();
        assert_eq!(entry.module.len(), LOG_MAX_MODULE_LEN);
    }

    #[test]
    fn test_sequence_strictly_ordered() {
        let mut log = FlightLog::new();
        for i in 0..5 {
            info(&mut log, i, "seq");
        }
        for i in 0..5 {
            assert_eq!(log.get_entry(i).unwrap().sequence, i as u16);
        }
    }

    #[test]
    fn test_callback_dispatch() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        fn on_entry(_entry: &LogEntry) {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let mut log = FlightLog::new();
        log.register_callback(Some(on_entry));
        info(&mut log, 0, "one");
        info(&mut log, 0, "two");
        log.register_callback(None);
        info(&mut log, 0, "three");

        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_uart_pump_emits_formatted_lines() {
        let mut log = FlightLog::new();
        log.set_outputs(LogOutputs::BUFFER.with(LogOutputs::UART));
        info(&mut log, 42, "hello uart");

        let mut hal = SimHal::new();
        log.pump_uart(&mut hal).unwrap();
        let text = core::str::from_utf8(hal.uart_tx_data()).unwrap();
        assert!(text.contains("[INFO ]"));
        assert!(text.contains("hello uart"));

        // Pumping again emits nothing new
        let len = hal.uart_tx_data().len();
        log.pump_uart(&mut hal).unwrap();
        assert_eq!(hal.uart_tx_data().len(), len);
    }

    #[test]
    fn test_clear_preserves_drop_stats() {
        let mut log = FlightLog::new();
        for i in 0..70u64 {
            info(&mut log, i, "fill");
        }
        let dropped = log.stats().dropped_logs;
        log.clear();
        assert_eq!(log.count(), 0);
        assert_eq!(log.stats().dropped_logs, dropped);
        assert!(log.get_entry(0).is_err());
    }
}
