//! Deployment sequencer
//!
//! Hard-timed state machine enforcing the launch-provider inhibit rule:
//! no actuation while mated to the dispenser and for a 30-minute
//! hold-off after separation, then antenna and solar-panel release by
//! burn wire with verification and bounded retry. Progress persists
//! across resets in a dedicated flash region guarded by a CRC.
//!
//! The deploy-enable line is the single output that can draw burn-wire
//! current. It is asserted only inside the `AntennaActive` and
//! `SolarActive` states and always deasserted on entry to the matching
//! verify state; processing any other state never touches it high.

use microsat_hal::{FlashRegion, FlashStore, Gpio, Pin, PinDirection, PinPull};
use microsat_shared::error::{FswError, Result};
use microsat_shared::telemetry::DeploymentTelemetry;
use microsat_shared::time::elapsed_ms;

use crate::flightlog::{FlightLog, LogLevel};
use crate::{fsw_log, map_hal_error};

/// Post-separation hold-off before any deployment (ms), per the
/// CubeSat Design Specification
pub const DEPLOYMENT_WAIT_TIME_MS: u64 = 30 * 60 * 1_000;

/// Antenna burn-wire actuation time (ms)
pub const ANTENNA_BURN_TIME_MS: u64 = 3_000;

/// Solar panel burn-wire actuation time (ms)
pub const SOLAR_BURN_TIME_MS: u64 = 5_000;

/// Maximum deployment attempts per element
pub const DEPLOYMENT_MAX_RETRIES: u8 = 3;

/// Delay between failed verification and the next attempt (ms)
pub const DEPLOYMENT_RETRY_DELAY_MS: u64 = 60_000;

/// Persisted-image schema version
const DEPLOY_SCHEMA_VERSION: u16 = 1;

/// Persisted-image length including the trailing CRC
const DEPLOY_IMAGE_LEN: usize = 57;

/// Deployment state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeployState {
    /// Mated to the dispenser, waiting for switch release
    Inhibited = 0,
    /// Separation detected, hold-off timer running
    Waiting = 1,
    /// Ready to attempt antenna deployment
    AntennaPending = 2,
    /// Antenna burn wire energised
    AntennaActive = 3,
    /// Verifying antenna release
    AntennaVerify = 4,
    /// Ready to attempt solar panel deployment
    SolarPending = 5,
    /// Solar panel burn wire energised
    SolarActive = 6,
    /// Verifying solar panel release
    SolarVerify = 7,
    /// All deployments confirmed
    Complete = 8,
    /// Retries exhausted; awaiting ground command
    Failed = 9,
}

impl DeployState {
    /// Human-readable state name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DeployState::Inhibited => "INHIBITED",
            DeployState::Waiting => "WAITING",
            DeployState::AntennaPending => "ANTENNA_PENDING",
            DeployState::AntennaActive => "ANTENNA_ACTIVE",
            DeployState::AntennaVerify => "ANTENNA_VERIFY",
            DeployState::SolarPending => "SOLAR_PENDING",
            DeployState::SolarActive => "SOLAR_ACTIVE",
            DeployState::SolarVerify => "SOLAR_VERIFY",
            DeployState::Complete => "COMPLETE",
            DeployState::Failed => "FAILED",
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Inhibited),
            1 => Some(Self::Waiting),
            2 => Some(Self::AntennaPending),
            3 => Some(Self::AntennaActive),
            4 => Some(Self::AntennaVerify),
            5 => Some(Self::SolarPending),
            6 => Some(Self::SolarActive),
            7 => Some(Self::SolarVerify),
            8 => Some(Self::Complete),
            9 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Deployable elements, in deployment order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeployElement {
    /// UHF antenna
    Antenna = 0,
    /// Solar panel wings
    SolarPanel = 1,
}

impl DeployElement {
    const fn index(self) -> usize {
        self as usize
    }

    const fn sense_pin(self) -> Pin {
        match self {
            DeployElement::Antenna => Pin::AntennaSense,
            DeployElement::SolarPanel => Pin::SolarSense,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            DeployElement::Antenna => "ANTENNA",
            DeployElement::SolarPanel => "SOLAR",
        }
    }
}

/// Per-element deployment status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementStatus {
    /// Deployment confirmed by the sense switch
    pub deployed: bool,
    /// At least one actuation attempt made
    pub deploy_attempted: bool,
    /// Actuation attempts so far
    pub attempt_count: u8,
    /// Time of confirmed deployment (ms)
    pub deploy_time_ms: u64,
    /// Sense switch state at the last process call
    pub switch_state: bool,
}

/// Deployment sequencer
#[derive(Debug)]
pub struct Deployment {
    state: DeployState,
    separation_time_ms: u64,
    state_entry_time_ms: u64,
    deploy_start_time_ms: u64,
    elements: [ElementStatus; 2],
    separation_detected: bool,
    enabled: bool,
    initialised: bool,
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}

impl Deployment {
    /// Create the sequencer in its inhibited power-on state
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DeployState::Inhibited,
            separation_time_ms: 0,
            state_entry_time_ms: 0,
            deploy_start_time_ms: 0,
            elements: [ElementStatus::default(); 2],
            separation_detected: false,
            enabled: true,
            initialised: false,
        }
    }

    /// Initialise pins and restore persisted progress
    ///
    /// Sense inputs are pulled up; the deploy-enable output is driven
    /// low before anything else happens. A missing or corrupt saved
    /// image demotes to a fresh inhibited start.
    pub fn init<H: Gpio + FlashStore>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
    ) -> Result<()> {
        hal.config(Pin::SeparationSense, PinDirection::Input, PinPull::Up)
            .map_err(|e| map_hal_error(e, "deploy sense"))?;
        hal.config(Pin::AntennaSense, PinDirection::Input, PinPull::Up)
            .map_err(|e| map_hal_error(e, "antenna sense"))?;
        hal.config(Pin::SolarSense, PinDirection::Input, PinPull::Up)
            .map_err(|e| map_hal_error(e, "solar sense"))?;
        hal.config(Pin::DeployEnable, PinDirection::Output, PinPull::None)
            .map_err(|e| map_hal_error(e, "deploy enable"))?;
        hal.set(Pin::DeployEnable, false)
            .map_err(|e| map_hal_error(e, "deploy enable"))?;

        if self.load_state(hal) {
            fsw_log!(
                log,
                now_ms,
                LogLevel::Info,
                "DEPLOY",
                "Restored saved state: {}",
                self.state.name()
            );
        } else {
            fsw_log!(log, now_ms, LogLevel::Info, "DEPLOY", "No saved state, starting fresh");
        }

        self.initialised = true;
        fsw_log!(log, now_ms, LogLevel::Info, "DEPLOY", "Deployment module initialised");
        Ok(())
    }

    /// Advance the state machine; at most one transition per call
    ///
    /// Call at 10 Hz or faster. All timing is against the supplied
    /// monotonic timestamp.
    pub fn process<H: Gpio + FlashStore>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
    ) {
        if !self.initialised {
            return;
        }

        let time_in_state = elapsed_ms(now_ms, self.state_entry_time_ms);

        match self.state {
            DeployState::Inhibited => {
                if self.switch_released(hal) {
                    self.separation_detected = true;
                    self.separation_time_ms = now_ms;
                    self.enter_state(DeployState::Waiting, now_ms, log);
                    fsw_log!(log, now_ms, LogLevel::Info, "DEPLOY", "Separation detected");
                    self.try_save(hal, log, now_ms);
                }
            }

            DeployState::Waiting => {
                if time_in_state >= DEPLOYMENT_WAIT_TIME_MS && self.enabled {
                    self.enter_state(DeployState::AntennaPending, now_ms, log);
                    fsw_log!(
                        log,
                        now_ms,
                        LogLevel::Info,
                        "DEPLOY",
                        "Hold-off complete, starting antenna deploy"
                    );
                }
            }

            DeployState::AntennaPending => {
                self.run_pending(hal, log, now_ms, DeployElement::Antenna);
            }

            DeployState::AntennaActive => {
                if time_in_state >= ANTENNA_BURN_TIME_MS {
                    self.actuate(hal, log, DeployElement::Antenna, false, now_ms);
                    self.enter_state(DeployState::AntennaVerify, now_ms, log);
                }
            }

            DeployState::AntennaVerify => {
                self.run_verify(hal, log, now_ms, time_in_state, DeployElement::Antenna);
            }

            DeployState::SolarPending => {
                self.run_pending(hal, log, now_ms, DeployElement::SolarPanel);
            }

            DeployState::SolarActive => {
                if time_in_state >= SOLAR_BURN_TIME_MS {
                    self.actuate(hal, log, DeployElement::SolarPanel, false, now_ms);
                    self.enter_state(DeployState::SolarVerify, now_ms, log);
                }
            }

            DeployState::SolarVerify => {
                self.run_verify(hal, log, now_ms, time_in_state, DeployElement::SolarPanel);
            }

            DeployState::Complete | DeployState::Failed => {
                // Terminal until ground commands a retry
            }
        }

        // Refresh switch states for telemetry
        for element in [DeployElement::Antenna, DeployElement::SolarPanel] {
            let sensed = self.element_deployed(hal, element);
            self.elements[element.index()].switch_state = sensed;
        }
    }

    fn run_pending<H: Gpio + FlashStore>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
        element: DeployElement,
    ) {
        let next_on_success = match element {
            DeployElement::Antenna => DeployState::SolarPending,
            DeployElement::SolarPanel => DeployState::Complete,
        };
        let active_state = match element {
            DeployElement::Antenna => DeployState::AntennaActive,
            DeployElement::SolarPanel => DeployState::SolarActive,
        };

        if self.element_deployed(hal, element) {
            // A mechanism found already released counts as a
            // zero-cost successful attempt
            let status = &mut self.elements[element.index()];
            status.deployed = true;
            status.deploy_attempted = true;
            status.attempt_count = status.attempt_count.max(1);
            status.deploy_time_ms = now_ms;
            self.enter_state(next_on_success, now_ms, log);
            fsw_log!(
                log,
                now_ms,
                LogLevel::Info,
                "DEPLOY",
                "{} already deployed",
                element.name()
            );
            self.try_save(hal, log, now_ms);
        } else if self.elements[element.index()].attempt_count < DEPLOYMENT_MAX_RETRIES {
            self.actuate(hal, log, element, true, now_ms);
            let status = &mut self.elements[element.index()];
            status.deploy_attempted = true;
            status.attempt_count += 1;
            let attempt = status.attempt_count;
            self.deploy_start_time_ms = now_ms;
            self.enter_state(active_state, now_ms, log);
            fsw_log!(
                log,
                now_ms,
                LogLevel::Info,
                "DEPLOY",
                "{} deploy attempt {}",
                element.name(),
                attempt
            );
            self.try_save(hal, log, now_ms);
        } else {
            self.enter_state(DeployState::Failed, now_ms, log);
            fsw_log!(
                log,
                now_ms,
                LogLevel::Error,
                "DEPLOY",
                "{} deploy failed after {} attempts",
                element.name(),
                DEPLOYMENT_MAX_RETRIES
            );
            self.try_save(hal, log, now_ms);
        }
    }

    fn run_verify<H: Gpio + FlashStore>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
        time_in_state: u64,
        element: DeployElement,
    ) {
        let next_on_success = match element {
            DeployElement::Antenna => DeployState::SolarPending,
            DeployElement::SolarPanel => DeployState::Complete,
        };
        let pending_state = match element {
            DeployElement::Antenna => DeployState::AntennaPending,
            DeployElement::SolarPanel => DeployState::SolarPending,
        };

        if self.element_deployed(hal, element) {
            let status = &mut self.elements[element.index()];
            status.deployed = true;
            status.deploy_time_ms = now_ms;
            self.enter_state(next_on_success, now_ms, log);
            fsw_log!(
                log,
                now_ms,
                LogLevel::Info,
                "DEPLOY",
                "{} deployment confirmed",
                element.name()
            );
            self.try_save(hal, log, now_ms);
        } else if time_in_state >= DEPLOYMENT_RETRY_DELAY_MS {
            self.enter_state(pending_state, now_ms, log);
        }
    }

    /// Whether the separation switch has released
    #[must_use]
    pub fn is_separated(&self) -> bool {
        self.separation_detected
    }

    /// Current state machine state
    #[must_use]
    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Copy out one element's status
    #[must_use]
    pub fn element_status(&self, element: DeployElement) -> ElementStatus {
        self.elements[element.index()]
    }

    /// Whether every element has deployed
    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.elements.iter().all(|e| e.deployed)
    }

    /// Build the deployment telemetry packet
    #[must_use]
    pub fn telemetry(&self, now_ms: u64) -> DeploymentTelemetry {
        let antenna = &self.elements[DeployElement::Antenna.index()];
        let solar = &self.elements[DeployElement::SolarPanel.index()];
        let time_since_sep_s = if self.separation_detected {
            (elapsed_ms(now_ms, self.separation_time_ms) / 1_000) as u32
        } else {
            0
        };

        DeploymentTelemetry {
            state: self.state as u8,
            antenna_deployed: u8::from(antenna.deployed),
            antenna_attempts: antenna.attempt_count,
            solar_deployed: u8::from(solar.deployed),
            solar_attempts: solar.attempt_count,
            time_since_sep_s,
            inhibit_active: u8::from(!self.enabled),
        }
    }

    /// Enable or inhibit deployment (ground command)
    ///
    /// Gates only the transition out of `Waiting`; a sequence already
    /// past the hold-off continues.
    pub fn set_enabled(&mut self, log: &mut FlightLog, now_ms: u64, enable: bool) {
        self.enabled = enable;
        fsw_log!(
            log,
            now_ms,
            LogLevel::Info,
            "DEPLOY",
            "Deployment {} by command",
            if enable { "enabled" } else { "inhibited" }
        );
    }

    /// Reset an element's attempts and jump to its pending state
    /// (ground command); allowed in any state
    pub fn force_retry<H: Gpio + FlashStore>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
        element: DeployElement,
    ) {
        let status = &mut self.elements[element.index()];
        status.attempt_count = 0;
        status.deployed = false;

        // Never leave the burn wire energised behind a state jump
        self.actuate(hal, log, element, false, now_ms);

        let pending = match element {
            DeployElement::Antenna => DeployState::AntennaPending,
            DeployElement::SolarPanel => DeployState::SolarPending,
        };
        self.enter_state(pending, now_ms, log);
        fsw_log!(
            log,
            now_ms,
            LogLevel::Info,
            "DEPLOY",
            "Forced retry for {}",
            element.name()
        );
        self.try_save(hal, log, now_ms);
    }

    /// Serialise the sequencer state and write it to its flash region
    ///
    /// The image leads with a schema version and trails with a CRC-32
    /// over everything before it, computed on the serialised bytes so
    /// in-memory layout can never affect the stored checksum.
    pub fn save_state<H: FlashStore>(&self, hal: &mut H) -> Result<()> {
        let image = self.encode();
        hal.write(FlashRegion::DeployState, 0, &image)
            .map_err(|e| map_hal_error(e, "deploy save"))
    }

    /// Restore state from flash; `false` means fresh init
    pub fn load_state<H: FlashStore>(&mut self, hal: &mut H) -> bool {
        let mut image = [0u8; DEPLOY_IMAGE_LEN];
        if hal.read(FlashRegion::DeployState, 0, &mut image).is_err() {
            return false;
        }
        match Self::decode(&image) {
            Ok(loaded) => {
                *self = Self { initialised: self.initialised, ..loaded };
                // A burn interrupted by a reset restarts from pending
                if self.state == DeployState::AntennaActive {
                    self.state = DeployState::AntennaPending;
                }
                if self.state == DeployState::SolarActive {
                    self.state = DeployState::SolarPending;
                }
                true
            }
            Err(_) => false,
        }
    }

    fn encode(&self) -> [u8; DEPLOY_IMAGE_LEN] {
        let mut image = [0u8; DEPLOY_IMAGE_LEN];
        image[0..2].copy_from_slice(&DEPLOY_SCHEMA_VERSION.to_le_bytes());
        image[2] = self.state as u8;
        image[3] = u8::from(self.separation_detected);
        image[4] = u8::from(self.enabled);
        image[5..13].copy_from_slice(&self.separation_time_ms.to_le_bytes());
        image[13..21].copy_from_slice(&self.state_entry_time_ms.to_le_bytes());
        image[21..29].copy_from_slice(&self.deploy_start_time_ms.to_le_bytes());

        let mut offset = 29;
        for status in &self.elements {
            image[offset] = u8::from(status.deployed);
            image[offset + 1] = u8::from(status.deploy_attempted);
            image[offset + 2] = status.attempt_count;
            image[offset + 3] = u8::from(status.switch_state);
            image[offset + 4..offset + 12].copy_from_slice(&status.deploy_time_ms.to_le_bytes());
            offset += 12;
        }

        let crc = crc32fast::hash(&image[..DEPLOY_IMAGE_LEN - 4]);
        image[DEPLOY_IMAGE_LEN - 4..].copy_from_slice(&crc.to_le_bytes());
        image
    }

    fn decode(image: &[u8; DEPLOY_IMAGE_LEN]) -> Result<Self> {
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&image[DEPLOY_IMAGE_LEN - 4..]);
        let stored = u32::from_le_bytes(crc_bytes);
        let calculated = crc32fast::hash(&image[..DEPLOY_IMAGE_LEN - 4]);
        if stored != calculated {
            return Err(FswError::CrcMismatch { stored, calculated });
        }

        let version = u16::from_le_bytes([image[0], image[1]]);
        if version != DEPLOY_SCHEMA_VERSION {
            return Err(FswError::invalid_parameter("deploy schema version"));
        }

        let state = DeployState::from_u8(image[2])
            .ok_or(FswError::invalid_parameter("deploy state"))?;

        let mut elements = [ElementStatus::default(); 2];
        let mut offset = 29;
        for status in &mut elements {
            let mut time_bytes = [0u8; 8];
            time_bytes.copy_from_slice(&image[offset + 4..offset + 12]);
            *status = ElementStatus {
                deployed: image[offset] != 0,
                deploy_attempted: image[offset + 1] != 0,
                attempt_count: image[offset + 2],
                switch_state: image[offset + 3] != 0,
                deploy_time_ms: u64::from_le_bytes(time_bytes),
            };
            offset += 12;
        }

        let mut field = [0u8; 8];
        field.copy_from_slice(&image[5..13]);
        let separation_time_ms = u64::from_le_bytes(field);
        field.copy_from_slice(&image[13..21]);
        let state_entry_time_ms = u64::from_le_bytes(field);
        field.copy_from_slice(&image[21..29]);
        let deploy_start_time_ms = u64::from_le_bytes(field);

        Ok(Self {
            state,
            separation_time_ms,
            state_entry_time_ms,
            deploy_start_time_ms,
            elements,
            separation_detected: image[3] != 0,
            enabled: image[4] != 0,
            initialised: false,
        })
    }

    fn enter_state(&mut self, new_state: DeployState, now_ms: u64, log: &mut FlightLog) {
        let old_state = self.state;
        self.state = new_state;
        self.state_entry_time_ms = now_ms;
        fsw_log!(
            log,
            now_ms,
            LogLevel::Debug,
            "DEPLOY",
            "State: {} -> {}",
            old_state.name(),
            new_state.name()
        );
    }

    /// Separation switch is pulled low by the closed switch while
    /// mated; the pull-up raises the line once the switch releases.
    fn switch_released<H: Gpio>(&self, hal: &H) -> bool {
        hal.get(Pin::SeparationSense).unwrap_or(false)
    }

    fn element_deployed<H: Gpio>(&self, hal: &H, element: DeployElement) -> bool {
        hal.get(element.sense_pin()).unwrap_or(false)
    }

    fn actuate<H: Gpio>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        element: DeployElement,
        activate: bool,
        now_ms: u64,
    ) {
        if hal.set(Pin::DeployEnable, activate).is_err() {
            fsw_log!(
                log,
                now_ms,
                LogLevel::Error,
                "DEPLOY",
                "Burn wire drive fault for {}",
                element.name()
            );
            return;
        }
        fsw_log!(
            log,
            now_ms,
            LogLevel::Debug,
            "DEPLOY",
            "Burn wire {}: {}",
            element.name(),
            if activate { "ON" } else { "OFF" }
        );
    }

    fn try_save<H: FlashStore>(&self, hal: &mut H, log: &mut FlightLog, now_ms: u64) {
        if let Err(err) = self.save_state(hal) {
            fsw_log!(
                log,
                now_ms,
                LogLevel::Error,
                "DEPLOY",
                "State save failed: {}",
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microsat_hal::sim::SimHal;
    use microsat_hal::Clock;

    fn setup() -> (SimHal, FlightLog, Deployment) {
        let mut hal = SimHal::new();
        let mut log = FlightLog::new();
        let mut deploy = Deployment::new();
        deploy.init(&mut hal, &mut log, 0).unwrap();
        (hal, log, deploy)
    }

    #[test]
    fn test_initial_state_inhibited() {
        let (hal, _log, deploy) = setup();
        assert_eq!(deploy.state(), DeployState::Inhibited);
        assert!(!deploy.is_separated());
        assert!(!deploy.all_complete());
        assert!(!hal.pin_level(Pin::DeployEnable));
    }

    #[test]
    fn test_stays_inhibited_while_mated() {
        let (mut hal, mut log, mut deploy) = setup();
        for _ in 0..100 {
            hal.advance_ms(100);
            let now = hal.now_ms();
            deploy.process(&mut hal, &mut log, now);
        }
        assert_eq!(deploy.state(), DeployState::Inhibited);
    }

    #[test]
    fn test_separation_starts_holdoff() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        hal.advance_ms(1_000);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);

        assert_eq!(deploy.state(), DeployState::Waiting);
        assert!(deploy.is_separated());

        // One millisecond short of the hold-off
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS - 1);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::Waiting);

        hal.advance_ms(1);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaPending);
    }

    #[test]
    fn test_disabled_holds_in_waiting() {
        let (mut hal, mut log, mut deploy) = setup();
        deploy.set_enabled(&mut log, 0, false);
        hal.set_input_level(Pin::SeparationSense, true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS + 1_000);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::Waiting);

        deploy.set_enabled(&mut log, hal.now_ms(), true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaPending);
    }

    #[test]
    fn test_burn_wire_asserted_only_while_active() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaPending);
        assert!(!hal.pin_level(Pin::DeployEnable));

        // Pending actuates and enters active
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaActive);
        assert!(hal.pin_level(Pin::DeployEnable));

        // Still burning mid-way
        hal.advance_ms(ANTENNA_BURN_TIME_MS / 2);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert!(hal.pin_level(Pin::DeployEnable));

        // Deasserted on verify entry and idempotent afterwards
        hal.advance_ms(ANTENNA_BURN_TIME_MS);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaVerify);
        assert!(!hal.pin_level(Pin::DeployEnable));
        for _ in 0..10 {
            hal.advance_ms(100);
            let now = hal.now_ms();
            deploy.process(&mut hal, &mut log, now);
            assert!(!hal.pin_level(Pin::DeployEnable));
        }
    }

    #[test]
    fn test_already_deployed_skips_actuation() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        hal.set_input_level(Pin::AntennaSense, true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);

        assert_eq!(deploy.state(), DeployState::SolarPending);
        let antenna = deploy.element_status(DeployElement::Antenna);
        assert!(antenna.deployed);
        assert!(antenna.deploy_attempted);
        assert!(antenna.attempt_count >= 1);
        assert!(!hal.pin_level(Pin::DeployEnable));
    }

    #[test]
    fn test_force_retry_resets_element() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaActive);

        let now = hal.now_ms();
        deploy.force_retry(&mut hal, &mut log, now, DeployElement::Antenna);
        assert_eq!(deploy.state(), DeployState::AntennaPending);
        assert_eq!(deploy.element_status(DeployElement::Antenna).attempt_count, 0);
        assert!(!hal.pin_level(Pin::DeployEnable));
    }

    #[test]
    fn test_save_load_round_trip() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        deploy.process(&mut hal, &mut log, 5_000);
        deploy.save_state(&mut hal).unwrap();

        let mut restored = Deployment::new();
        assert!(restored.load_state(&mut hal));
        assert_eq!(restored.state(), DeployState::Waiting);
        assert!(restored.is_separated());
        assert_eq!(restored.encode(), deploy.encode());
    }

    #[test]
    fn test_corrupt_image_demotes_to_fresh() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        deploy.process(&mut hal, &mut log, 5_000);
        deploy.save_state(&mut hal).unwrap();

        // Flip a byte inside the image
        let mut image = [0u8; DEPLOY_IMAGE_LEN];
        hal.read(FlashRegion::DeployState, 0, &mut image).unwrap();
        image[7] ^= 0xFF;
        hal.write(FlashRegion::DeployState, 0, &image).unwrap();

        let mut restored = Deployment::new();
        assert!(!restored.load_state(&mut hal));
        assert_eq!(restored.state(), DeployState::Inhibited);
    }

    #[test]
    fn test_blank_flash_is_fresh_init() {
        let mut hal = SimHal::new();
        let mut restored = Deployment::new();
        assert!(!restored.load_state(&mut hal));
        assert_eq!(restored.state(), DeployState::Inhibited);
        assert!(!restored.is_separated());
    }

    #[test]
    fn test_interrupted_burn_resumes_from_pending() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        hal.advance_ms(DEPLOYMENT_WAIT_TIME_MS);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        let now = hal.now_ms();
        deploy.process(&mut hal, &mut log, now);
        assert_eq!(deploy.state(), DeployState::AntennaActive);

        // The save made at burn start is what a reset would find
        let mut restored = Deployment::new();
        assert!(restored.load_state(&mut hal));
        assert_eq!(restored.state(), DeployState::AntennaPending);
        assert_eq!(restored.element_status(DeployElement::Antenna).attempt_count, 1);
    }

    #[test]
    fn test_telemetry_reflects_state() {
        let (mut hal, mut log, mut deploy) = setup();
        hal.set_input_level(Pin::SeparationSense, true);
        deploy.process(&mut hal, &mut log, 2_000);

        let telemetry = deploy.telemetry(12_000);
        assert_eq!(telemetry.state, DeployState::Waiting as u8);
        assert_eq!(telemetry.time_since_sep_s, 10);
        assert_eq!(telemetry.inhibit_active, 0);
        assert_eq!(telemetry.antenna_attempts, 0);
    }
}
