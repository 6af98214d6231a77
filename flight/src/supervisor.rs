//! Cooperative supervisor loop
//!
//! Owns the four subsystems and the HAL, and runs them in the fixed
//! per-tick order: hardware watchdog kick, deployment state machine,
//! ADCS control (at its own cadence), then the log UART pump. There is
//! no pre-emption; every entry point runs to completion, so external
//! collaborators always observe a consistent snapshot between ticks.

use microsat_hal::Hal;
use microsat_shared::error::Result;
use microsat_shared::time::elapsed_ms;

use crate::adcs::{AdcsCore, ADCS_CONTROL_PERIOD_MS};
use crate::deployment::Deployment;
use crate::flightlog::{FlightLog, LogLevel};
use crate::fsw_log;
use crate::watchdog::{PreResetHook, TaskId, WatchdogManager, WDT_HW_TIMEOUT_MS};

/// Nominal supervisor tick period (ms)
pub const SUPERVISOR_TICK_PERIOD_MS: u64 = 100;

/// Expected main-loop check-in period for liveness tracking (ms)
pub const MAIN_TASK_PERIOD_MS: u32 = 1_000;

/// Bus controller supervisor
pub struct Supervisor<H: Hal, P: PreResetHook = fn()> {
    hal: H,
    log: FlightLog,
    deployment: Deployment,
    adcs: AdcsCore,
    watchdog: WatchdogManager<P>,
    last_adcs_tick_ms: u64,
    booted: bool,
}

impl<H: Hal, P: PreResetHook> core::fmt::Debug for Supervisor<H, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Supervisor")
            .field("booted", &self.booted)
            .field("deployment", &self.deployment.state())
            .field("adcs_mode", &self.adcs.mode())
            .finish()
    }
}

impl<H: Hal, P: PreResetHook> Supervisor<H, P> {
    /// Wrap a board; nothing runs until [`boot`](Self::boot)
    #[must_use]
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            log: FlightLog::new(),
            deployment: Deployment::new(),
            adcs: AdcsCore::new(),
            watchdog: WatchdogManager::new(),
            last_adcs_tick_ms: 0,
            booted: false,
        }
    }

    /// Bring up the subsystems
    ///
    /// Starts the hardware watchdog (irreversible), registers the main
    /// loop and ADCS for liveness tracking, and initialises deployment
    /// and ADCS. A watchdog-caused previous reset is logged as a
    /// critical fault and the cause flag cleared.
    pub fn boot(&mut self) -> Result<()> {
        let now = self.hal.now_ms();
        fsw_log!(&mut self.log, now, LogLevel::Info, "SUPER", "Bus controller starting");

        self.watchdog.init(&mut self.hal, WDT_HW_TIMEOUT_MS)?;
        if self.watchdog.was_watchdog_reset(&self.hal) {
            fsw_log!(
                &mut self.log,
                now,
                LogLevel::Critical,
                "SUPER",
                "Recovered from watchdog reset"
            );
            self.watchdog.clear_reset_status(&mut self.hal);
        }
        self.watchdog.start(&mut self.hal)?;
        self.watchdog
            .register_task(now, TaskId::MainLoop, "main", MAIN_TASK_PERIOD_MS)?;
        self.watchdog.register_task(
            now,
            TaskId::Adcs,
            "adcs",
            ADCS_CONTROL_PERIOD_MS as u32,
        )?;

        self.adcs.init(&mut self.log, now);
        self.deployment.init(&mut self.hal, &mut self.log, now)?;

        self.booted = true;
        fsw_log!(
            &mut self.log,
            self.hal.now_ms(),
            LogLevel::Info,
            "SUPER",
            "Boot complete"
        );
        Ok(())
    }

    /// Run one supervisor tick
    ///
    /// Call at [`SUPERVISOR_TICK_PERIOD_MS`] or faster.
    pub fn tick(&mut self) {
        if !self.booted {
            return;
        }

        let now = self.hal.now_ms();

        // Watchdog first: a wedged tick body must not cost the kick
        let warning = self.watchdog.kick(&mut self.hal, &mut self.log);
        let _ = self.watchdog.checkin(now, TaskId::MainLoop);

        if warning {
            // Reset imminent: persist deployment progress while we can
            if let Err(err) = self.deployment.save_state(&mut self.hal) {
                fsw_log!(
                    &mut self.log,
                    now,
                    LogLevel::Error,
                    "SUPER",
                    "Pre-reset save failed: {}",
                    err
                );
            }
        }

        self.deployment.process(&mut self.hal, &mut self.log, now);

        if elapsed_ms(now, self.last_adcs_tick_ms) >= ADCS_CONTROL_PERIOD_MS
            || self.last_adcs_tick_ms == 0
        {
            if self.adcs.update(&mut self.hal, &mut self.log, now).is_ok() {
                let _ = self.watchdog.checkin(now, TaskId::Adcs);
            }
            self.last_adcs_tick_ms = now;
        }

        let _ = self.log.pump_uart(&mut self.hal);
    }

    /// Install the watchdog pre-reset hook
    pub fn register_prereset_hook(&mut self, hook: P) {
        self.watchdog.register_prereset_hook(hook);
    }

    /// Shared access to the flight log
    #[must_use]
    pub fn log(&self) -> &FlightLog {
        &self.log
    }

    /// Mutable access to the flight log
    pub fn log_mut(&mut self) -> &mut FlightLog {
        &mut self.log
    }

    /// Shared access to the deployment sequencer
    #[must_use]
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Mutable access to the deployment sequencer, with the HAL and
    /// log it needs for ground commands
    pub fn deployment_mut(&mut self) -> (&mut Deployment, &mut H, &mut FlightLog) {
        (&mut self.deployment, &mut self.hal, &mut self.log)
    }

    /// Shared access to the ADCS core
    #[must_use]
    pub fn adcs(&self) -> &AdcsCore {
        &self.adcs
    }

    /// Mutable access to the ADCS core and the log it needs for
    /// ground commands
    pub fn adcs_mut(&mut self) -> (&mut AdcsCore, &mut FlightLog) {
        (&mut self.adcs, &mut self.log)
    }

    /// Shared access to the watchdog manager
    #[must_use]
    pub fn watchdog(&self) -> &WatchdogManager<P> {
        &self.watchdog
    }

    /// Mutable access to the watchdog manager
    pub fn watchdog_mut(&mut self) -> &mut WatchdogManager<P> {
        &mut self.watchdog
    }

    /// Shared access to the board
    #[must_use]
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Mutable access to the board
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microsat_hal::sim::SimHal;
    use microsat_hal::{HwWatchdog, Pin};

    fn booted() -> Supervisor<SimHal> {
        let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
        sup.boot().unwrap();
        sup
    }

    #[test]
    fn test_boot_initialises_subsystems() {
        let sup = booted();
        assert_eq!(sup.adcs().mode(), crate::adcs::AdcsMode::Idle);
        assert_eq!(
            sup.deployment().state(),
            crate::deployment::DeployState::Inhibited
        );
        assert!(sup.watchdog().stats().hw_wdt_running);
    }

    #[test]
    fn test_tick_kicks_watchdog_every_time() {
        let mut sup = booted();
        for expected in 1..=10u32 {
            sup.hal_mut().advance_ms(100);
            sup.tick();
            assert_eq!(sup.watchdog().stats().hw_kicks, expected);
        }
    }

    #[test]
    fn test_adcs_runs_at_control_period() {
        let mut sup = booted();
        // Eleven 100 ms ticks: the control loop runs on the first tick
        // and again once a full period has elapsed since
        for _ in 0..11 {
            sup.hal_mut().advance_ms(100);
            sup.tick();
        }
        assert_eq!(sup.adcs().status().control_cycles, 2);
    }

    #[test]
    fn test_watchdog_reset_recovery_logged() {
        let mut hal = SimHal::new();
        hal.set_watchdog_reset_cause(true);
        let mut sup: Supervisor<SimHal> = Supervisor::new(hal);
        sup.boot().unwrap();

        assert!(!sup.hal().caused_reset());
        let criticals = (0..sup.log().count())
            .filter(|&i| sup.log().get_entry(i).unwrap().level == LogLevel::Critical)
            .count();
        assert_eq!(criticals, 1);
    }

    #[test]
    fn test_warning_persists_deployment_state() {
        let mut sup = booted();
        sup.hal_mut().set_input_level(Pin::SeparationSense, true);
        sup.hal_mut().advance_ms(100);
        sup.tick();
        assert!(sup.deployment().is_separated());

        // Imminent-reset warning on the next tick
        sup.hal_mut().trigger_watchdog_warning();
        sup.hal_mut().advance_ms(100);
        sup.tick();

        let mut restored = crate::deployment::Deployment::new();
        assert!(restored.load_state(sup.hal_mut()));
        assert!(restored.is_separated());
    }
}
