//! Two-tier watchdog manager
//!
//! Coordinates the hardware watchdog with a software task-liveness
//! supervisor. The main loop kicks the hardware timer through
//! [`WatchdogManager::kick`]; registered tasks check in at their own
//! cadence and are flagged as stalled after three missed periods. A
//! stalled task is advisory for ground — only a missed hardware kick
//! resets the MCU.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::String;
use microsat_hal::{Clock, HwWatchdog, WdtMode};
use microsat_shared::error::{FswError, Result};
use microsat_shared::time::elapsed_ms;

use crate::flightlog::{FlightLog, LogLevel};
use crate::{fsw_log, map_hal_error};

/// Number of task table slots
pub const WDT_MAX_TASKS: usize = 8;

/// Maximum task name length in bytes
pub const WDT_TASK_NAME_LEN: usize = 15;

/// Default hardware watchdog timeout (ms)
pub const WDT_HW_TIMEOUT_MS: u32 = 30_000;

/// Task liveness check interval (ms)
pub const WDT_CHECK_INTERVAL_MS: u64 = 1_000;

/// Missed check-ins before a task is considered stalled
pub const WDT_MISS_THRESHOLD: u32 = 3;

/// Early-warning flag set by the HAL callback on targets whose
/// early-warning interrupt bypasses the driver latch
///
/// The callback runs in interrupt context and may only set a flag; the
/// manager services it from the next `kick()` in task context.
static WARNING_PENDING: AtomicBool = AtomicBool::new(false);

fn hw_warning_callback() {
    WARNING_PENDING.store(true, Ordering::SeqCst);
}

/// Predefined task identifiers for the liveness table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskId {
    /// Main processing loop
    MainLoop = 0,
    /// EPS monitoring task
    Eps = 1,
    /// ADCS control task
    Adcs = 2,
    /// Communication task
    Comm = 3,
    /// Telemetry generation task
    Telemetry = 4,
    /// Beacon transmission task
    Beacon = 5,
    /// Payload management task
    Payload = 6,
    /// Health monitoring task
    Health = 7,
}

impl TaskId {
    /// Table index for the slot array
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Task liveness table entry
#[derive(Debug, Clone, Default)]
pub struct TaskEntry {
    /// Task name
    pub name: String<WDT_TASK_NAME_LEN>,
    /// Expected check-in period (ms)
    pub expected_period_ms: u32,
    /// Last check-in timestamp (ms)
    pub last_checkin_ms: u64,
    /// Consecutive missed check-ins
    pub miss_count: u32,
    /// Total check-ins since registration
    pub total_checkins: u32,
    /// Slot is registered and monitored
    pub active: bool,
    /// Task is considered stalled
    pub stalled: bool,
}

/// Watchdog manager statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WdtStats {
    /// Hardware watchdog kicks
    pub hw_kicks: u32,
    /// Task liveness check runs
    pub task_check_runs: u32,
    /// Stalls detected since boot
    pub task_stalls_detected: u32,
    /// Resets attributed to the watchdog; survives re-init
    pub resets_caused: u32,
    /// Mission time of the last stall detection (s)
    pub last_reset_time_s: u32,
    /// Slot index of the most recent stalled task
    pub last_stalled_task: u8,
    /// Hardware watchdog is running
    pub hw_wdt_running: bool,
}

/// Hook invoked when a reset is imminent, giving the application a
/// chance to persist state
///
/// Owned by the manager as a capability object; cleared on uninstall.
/// The manager never re-enters a running hook.
pub trait PreResetHook {
    /// Called once per imminent-reset event
    fn on_imminent_reset(&mut self);
}

impl<F: FnMut()> PreResetHook for F {
    fn on_imminent_reset(&mut self) {
        self();
    }
}

/// Two-tier watchdog manager
pub struct WatchdogManager<P: PreResetHook = fn()> {
    tasks: [TaskEntry; WDT_MAX_TASKS],
    stats: WdtStats,
    hook: Option<P>,
    hook_running: bool,
    last_task_check_ms: u64,
    initialised: bool,
}

impl<P: PreResetHook> core::fmt::Debug for WatchdogManager<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WatchdogManager")
            .field("stats", &self.stats)
            .field("hook_installed", &self.hook.is_some())
            .field("initialised", &self.initialised)
            .finish()
    }
}

impl<P: PreResetHook> Default for WatchdogManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PreResetHook> WatchdogManager<P> {
    /// Create an uninitialised manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: core::array::from_fn(|_| TaskEntry::default()),
            stats: WdtStats::default(),
            hook: None,
            hook_running: false,
            last_task_check_ms: 0,
            initialised: false,
        }
    }

    /// Initialise the hardware watchdog and clear the task table
    ///
    /// Does not start the countdown; call [`start`](Self::start).
    /// `resets_caused` survives re-initialisation.
    pub fn init<H: HwWatchdog>(&mut self, hal: &mut H, timeout_ms: u32) -> Result<()> {
        let saved_resets = self.stats.resets_caused;
        self.tasks = core::array::from_fn(|_| TaskEntry::default());
        self.stats = WdtStats::default();
        self.stats.resets_caused = saved_resets;
        self.hook = None;
        self.hook_running = false;
        self.last_task_check_ms = 0;

        hal.init(timeout_ms, WdtMode::Reset)
            .map_err(|e| map_hal_error(e, "wdt init"))?;

        // Early warning is optional on flight silicon
        let _ = hal.set_warning_callback(Some(hw_warning_callback));

        self.initialised = true;
        Ok(())
    }

    /// Start the hardware countdown; irreversible once running
    pub fn start<H: HwWatchdog + Clock>(&mut self, hal: &mut H) -> Result<()> {
        if !self.initialised {
            return Err(FswError::not_initialised("watchdog"));
        }
        hal.start().map_err(|e| map_hal_error(e, "wdt start"))?;
        self.stats.hw_wdt_running = true;
        self.last_task_check_ms = hal.now_ms();
        Ok(())
    }

    /// Refresh the hardware watchdog and run liveness checks
    ///
    /// Must be called at least every [`WDT_CHECK_INTERVAL_MS`] by the
    /// main loop. Returns `true` when the early-warning path fired, so
    /// the caller can persist state before the reset lands.
    pub fn kick<H: HwWatchdog + Clock>(&mut self, hal: &mut H, log: &mut FlightLog) -> bool {
        if !self.initialised {
            return false;
        }

        hal.kick();
        self.stats.hw_kicks = self.stats.hw_kicks.wrapping_add(1);

        let now = hal.now_ms();
        let mut warning_fired = false;

        if WARNING_PENDING.swap(false, Ordering::SeqCst) || hal.warning_pending() {
            fsw_log!(
                log,
                now,
                LogLevel::Critical,
                "WDT",
                "Hardware watchdog timeout imminent"
            );
            self.invoke_hook();
            self.stats.resets_caused = self.stats.resets_caused.wrapping_add(1);
            warning_fired = true;
        }

        if elapsed_ms(now, self.last_task_check_ms) >= WDT_CHECK_INTERVAL_MS {
            self.check_tasks(now, log);
            self.last_task_check_ms = now;
        }

        warning_fired
    }

    fn check_tasks(&mut self, now: u64, log: &mut FlightLog) {
        for (index, task) in self.tasks.iter_mut().enumerate() {
            if !task.active {
                continue;
            }

            let elapsed = elapsed_ms(now, task.last_checkin_ms);
            if elapsed > u64::from(task.expected_period_ms) {
                task.miss_count += 1;
                if task.miss_count >= WDT_MISS_THRESHOLD && !task.stalled {
                    task.stalled = true;
                    self.stats.task_stalls_detected += 1;
                    self.stats.last_stalled_task = index as u8;
                    self.stats.last_reset_time_s = (now / 1_000) as u32;
                    fsw_log!(
                        log,
                        now,
                        LogLevel::Warning,
                        "WDT",
                        "Task {} stalled",
                        task.name
                    );
                }
            } else {
                task.miss_count = 0;
                task.stalled = false;
            }
        }

        self.stats.task_check_runs += 1;
    }

    /// Register a task for liveness monitoring
    pub fn register_task(
        &mut self,
        now_ms: u64,
        id: TaskId,
        name: &str,
        expected_period_ms: u32,
    ) -> Result<()> {
        if expected_period_ms == 0 {
            return Err(FswError::invalid_parameter("expected_period_ms"));
        }

        let entry = &mut self.tasks[id.index()];
        entry.name.clear();
        for ch in name.chars() {
            if entry.name.push(ch).is_err() {
                break;
            }
        }
        entry.expected_period_ms = expected_period_ms;
        entry.last_checkin_ms = now_ms;
        entry.miss_count = 0;
        entry.total_checkins = 0;
        entry.active = true;
        entry.stalled = false;
        Ok(())
    }

    /// Remove a task from monitoring
    pub fn unregister_task(&mut self, id: TaskId) {
        self.tasks[id.index()].active = false;
    }

    /// Record a task check-in
    ///
    /// Clears the miss counter and any stalled flag.
    pub fn checkin(&mut self, now_ms: u64, id: TaskId) -> Result<()> {
        let entry = &mut self.tasks[id.index()];
        if !entry.active {
            return Err(FswError::not_initialised("watchdog task"));
        }
        entry.last_checkin_ms = now_ms;
        entry.miss_count = 0;
        entry.stalled = false;
        entry.total_checkins = entry.total_checkins.wrapping_add(1);
        Ok(())
    }

    /// Whether a task is currently flagged as stalled
    #[must_use]
    pub fn is_task_stalled(&self, id: TaskId) -> bool {
        self.tasks[id.index()].stalled
    }

    /// Whether any monitored task is stalled
    #[must_use]
    pub fn any_task_stalled(&self) -> bool {
        self.tasks.iter().any(|t| t.active && t.stalled)
    }

    /// Copy out a task table entry
    #[must_use]
    pub fn task_info(&self, id: TaskId) -> TaskEntry {
        self.tasks[id.index()].clone()
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> WdtStats {
        self.stats
    }

    /// Install the pre-reset hook, replacing any previous one
    pub fn register_prereset_hook(&mut self, hook: P) {
        self.hook = Some(hook);
    }

    /// Remove the pre-reset hook
    pub fn clear_prereset_hook(&mut self) {
        self.hook = None;
    }

    fn invoke_hook(&mut self) {
        if self.hook_running {
            return;
        }
        if let Some(hook) = self.hook.as_mut() {
            self.hook_running = true;
            hook.on_imminent_reset();
            self.hook_running = false;
        }
    }

    /// Whether the previous reset was caused by the watchdog
    pub fn was_watchdog_reset<H: HwWatchdog>(&self, hal: &H) -> bool {
        hal.caused_reset()
    }

    /// Clear the watchdog reset cause flag
    pub fn clear_reset_status<H: HwWatchdog>(&self, hal: &mut H) {
        hal.clear_reset_flag();
    }

    /// Milliseconds until the hardware watchdog expires
    pub fn time_remaining<H: HwWatchdog>(&self, hal: &H) -> u32 {
        hal.remaining_ms()
    }

    /// Force a watchdog reset
    ///
    /// Logs the event, invokes the pre-reset hook, then stops kicking
    /// and parks until the hardware resets the MCU. Never returns.
    pub fn force_reset(&mut self, now_ms: u64, log: &mut FlightLog) -> ! {
        fsw_log!(log, now_ms, LogLevel::Critical, "WDT", "Forced watchdog reset");
        self.invoke_hook();
        self.stats.resets_caused = self.stats.resets_caused.wrapping_add(1);

        loop {
            core::hint::spin_loop();
        }
    }
}
