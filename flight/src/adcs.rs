//! Attitude determination and control core
//!
//! Periodic control loop that estimates body rate from magnetometer
//! history, bleeds off tip-off rotation with the B-dot law, and points
//! the +X face at the Sun when detumbled and illuminated.
//!
//! Internally everything runs in canonical SI units: magnetic field in
//! tesla, dipole in A·m². Sensor ingestion converts from instrument
//! units once; telemetry encoding converts back to wire scales.

use core::f64::consts::PI;

use microsat_hal::{Adc, AdcChannel, I2cBus, I2cBusId, ADC_FULL_SCALE, MAGNETOMETER_ADDR};
use microsat_shared::error::{FswError, Result};
use microsat_shared::math::Vec3;
use microsat_shared::telemetry::{to_fixed_i16, to_fixed_i8, AdcsTelemetry};

use crate::flightlog::{FlightLog, LogLevel};
use crate::{fsw_log, map_hal_error};

/// Maximum magnetic dipole moment per axis (A·m²)
pub const ADCS_MAX_DIPOLE: f64 = 0.2;

/// B-dot control gain (A·m² per T/s)
pub const ADCS_BDOT_GAIN: f64 = 5.0e6;

/// Sun-pointing proportional gain
pub const ADCS_SUNPOINT_KP: f64 = 0.001;

/// Detumble convergence threshold (rad/s), about 0.5 °/s
pub const ADCS_DETUMBLE_RATE_THRESHOLD: f64 = 0.0087;

/// Sustained sub-threshold time before detumble completes (ms)
pub const ADCS_DETUMBLE_SETTLING_MS: u64 = 300_000;

/// Maximum detumble duration, one orbit (ms)
pub const ADCS_DETUMBLE_TIMEOUT_MS: u64 = 5_400_000;

/// Control loop period (ms)
pub const ADCS_CONTROL_PERIOD_MS: u64 = 1_000;

/// Magnetometer sample period (ms); the estimator tolerates anything
/// down to [`ADCS_MIN_RATE_DT_MS`]
pub const ADCS_MAG_SAMPLE_PERIOD_MS: u64 = 100;

/// Number of sun-sensor photodiodes
pub const ADCS_SUN_SENSOR_COUNT: usize = 6;

/// Sun intensity fraction below which the Sun is considered eclipsed
pub const ADCS_ECLIPSE_THRESHOLD: f64 = 0.1;

/// Minimum sample spacing for a rate update (ms)
pub const ADCS_MIN_RATE_DT_MS: u64 = 10;

/// Minimum usable field magnitude (T); below this the estimator and
/// the torque inversion are singular
const MIN_FIELD_T: f64 = 1.0e-6;

/// Magnetometer LSB in µT
const MAG_LSB_UT: f64 = 0.1;

const UT_TO_T: f64 = 1.0e-6;
const T_TO_UT: f64 = 1.0e6;
const RAD_TO_DEG: f64 = 180.0 / PI;

/// ADCS operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcsMode {
    /// Sensors on, actuators off
    Idle = 0,
    /// B-dot detumble active
    Detumble = 1,
    /// Sun-pointing active
    Sunpoint = 2,
    /// Eclipse drift, actuators off
    Eclipse = 3,
    /// Safe mode, actuators off until commanded out
    Safe = 4,
}

/// Magnetometer sample
///
/// Field and field rate are in canonical units (T, T/s); `field_rate`
/// is populated by the rate estimator, not the sensor driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagSample {
    /// Magnetic field (T)
    pub field: Vec3,
    /// Field rate of change (T/s)
    pub field_rate: Vec3,
    /// Measurement timestamp (ms)
    pub timestamp_ms: u64,
    /// Data validity flag
    pub valid: bool,
}

/// Sun-sensor sample
#[derive(Debug, Clone, Copy, Default)]
pub struct SunSample {
    /// Raw converter counts, one per face
    pub raw: [u16; ADCS_SUN_SENSOR_COUNT],
    /// Unit sun vector in body frame; undefined unless visible
    pub sun_vector: Vec3,
    /// Total intensity as a fraction of full scale
    pub intensity: f64,
    /// Sun visibility flag
    pub sun_visible: bool,
    /// Measurement timestamp (ms)
    pub timestamp_ms: u64,
}

/// Magnetorquer command
#[derive(Debug, Clone, Copy, Default)]
pub struct MtqCommand {
    /// Commanded dipole moment (A·m²)
    pub dipole: Vec3,
    /// PWM duty cycle per axis (-100 to +100)
    pub pwm: [i8; 3],
    /// Actuators enabled flag
    pub enabled: bool,
}

/// Where sensor samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorSource {
    /// HAL I²C magnetometer and ADC sun sensors
    Hardware,
    /// Caller-supplied values via
    /// [`set_sim_sensors`](AdcsCore::set_sim_sensors)
    Simulated,
}

/// Consolidated ADCS status snapshot
#[derive(Debug, Clone, Copy)]
pub struct AdcsStatus {
    /// Current mode
    pub mode: AdcsMode,
    /// Estimated rate magnitude (rad/s)
    pub rate_magnitude: f64,
    /// Detumble completion flag
    pub detumble_complete: bool,
    /// Sun visibility
    pub sun_visible: bool,
    /// Control loop iterations since init
    pub control_cycles: u32,
    /// Sensor faults since init
    pub fault_count: u32,
    /// Magnetorquers currently enabled
    pub mtq_enabled: bool,
}

/// ADCS core state and control laws
#[derive(Debug)]
pub struct AdcsCore {
    mode: AdcsMode,
    mag: MagSample,
    mag_prev: MagSample,
    sun: SunSample,
    mtq: MtqCommand,
    angular_rate_est: Vec3,
    rate_magnitude: f64,
    detumble_start_ms: u64,
    settling_start_ms: u64,
    detumble_complete: bool,
    control_cycles: u32,
    fault_count: u32,
    source: SensorSource,
    sim_mag_ut: Vec3,
    sim_sun: Vec3,
    initialised: bool,
}

impl Default for AdcsCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcsCore {
    /// Create the core with hardware sensor sources
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: AdcsMode::Idle,
            mag: MagSample::default(),
            mag_prev: MagSample::default(),
            sun: SunSample::default(),
            mtq: MtqCommand::default(),
            angular_rate_est: Vec3::ZERO,
            rate_magnitude: 0.0,
            detumble_start_ms: 0,
            settling_start_ms: 0,
            detumble_complete: false,
            control_cycles: 0,
            fault_count: 0,
            source: SensorSource::Hardware,
            sim_mag_ut: Vec3::new(30.0, 0.0, 40.0),
            sim_sun: Vec3::UNIT_X,
            initialised: false,
        }
    }

    /// Initialise in `Idle` with actuators off
    pub fn init(&mut self, log: &mut FlightLog, now_ms: u64) {
        self.mode = AdcsMode::Idle;
        self.mag = MagSample::default();
        self.mag_prev = MagSample::default();
        self.sun = SunSample::default();
        self.mtq = MtqCommand::default();
        self.angular_rate_est = Vec3::ZERO;
        self.rate_magnitude = 0.0;
        self.detumble_start_ms = 0;
        self.settling_start_ms = 0;
        self.detumble_complete = false;
        self.control_cycles = 0;
        self.fault_count = 0;
        self.initialised = true;
        fsw_log!(log, now_ms, LogLevel::Info, "ADCS", "Initialised in IDLE mode");
    }

    /// Run one control loop iteration
    ///
    /// Nominal cadence is [`ADCS_CONTROL_PERIOD_MS`]; the estimator
    /// tolerates irregular spacing down to [`ADCS_MIN_RATE_DT_MS`].
    /// Sensor faults are non-fatal: counted, flagged once, retried on
    /// the next tick.
    pub fn update<H: I2cBus + Adc>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
    ) -> Result<()> {
        if !self.initialised {
            return Err(FswError::not_initialised("adcs"));
        }

        self.read_magnetometer(hal, log, now_ms);
        self.read_sun_sensors(hal, now_ms);
        self.estimate_rate(now_ms);

        let mut dipole = Vec3::ZERO;

        match self.mode {
            AdcsMode::Detumble => {
                if self.detumble_start_ms > 0
                    && now_ms.wrapping_sub(self.detumble_start_ms) > ADCS_DETUMBLE_TIMEOUT_MS
                {
                    // Best-effort completion after one orbit of trying
                    fsw_log!(log, now_ms, LogLevel::Warning, "ADCS", "Detumble timeout");
                    self.detumble_complete = true;
                    self.mode = AdcsMode::Idle;
                } else {
                    dipole = compute_bdot(&self.mag);

                    if self.rate_magnitude < ADCS_DETUMBLE_RATE_THRESHOLD {
                        if self.settling_start_ms == 0 {
                            self.settling_start_ms = now_ms;
                        } else if now_ms.wrapping_sub(self.settling_start_ms)
                            >= ADCS_DETUMBLE_SETTLING_MS
                        {
                            self.detumble_complete = true;
                            self.mode = AdcsMode::Idle;
                            fsw_log!(log, now_ms, LogLevel::Info, "ADCS", "Detumble complete");
                        }
                    } else {
                        self.settling_start_ms = 0;
                    }
                }
            }

            AdcsMode::Sunpoint => {
                if self.sun.sun_visible {
                    dipole = compute_sunpoint(&self.sun, &self.mag);
                } else {
                    self.mode = AdcsMode::Eclipse;
                    fsw_log!(log, now_ms, LogLevel::Debug, "ADCS", "Sun lost, entering eclipse");
                }
            }

            AdcsMode::Eclipse => {
                if self.sun.sun_visible {
                    self.mode = AdcsMode::Sunpoint;
                    fsw_log!(log, now_ms, LogLevel::Debug, "ADCS", "Sun acquired, sun pointing");
                }
            }

            AdcsMode::Idle | AdcsMode::Safe => {}
        }

        if matches!(self.mode, AdcsMode::Detumble | AdcsMode::Sunpoint) {
            self.apply_dipole(dipole);
        } else {
            self.disable_mtq();
        }

        self.control_cycles = self.control_cycles.wrapping_add(1);
        Ok(())
    }

    fn read_magnetometer<H: I2cBus>(
        &mut self,
        hal: &mut H,
        log: &mut FlightLog,
        now_ms: u64,
    ) {
        match self.source {
            SensorSource::Simulated => {
                self.mag.field = self.sim_mag_ut * UT_TO_T;
                self.mag.timestamp_ms = now_ms;
                self.mag.valid = true;
            }
            SensorSource::Hardware => {
                let mut raw = [0u8; 6];
                match hal.write_then_read(I2cBusId::Sensor, MAGNETOMETER_ADDR, &[0x00], &mut raw) {
                    Ok(()) => {
                        let x = i16::from_le_bytes([raw[0], raw[1]]);
                        let y = i16::from_le_bytes([raw[2], raw[3]]);
                        let z = i16::from_le_bytes([raw[4], raw[5]]);
                        self.mag.field = Vec3::new(
                            f64::from(x) * MAG_LSB_UT * UT_TO_T,
                            f64::from(y) * MAG_LSB_UT * UT_TO_T,
                            f64::from(z) * MAG_LSB_UT * UT_TO_T,
                        );
                        self.mag.timestamp_ms = now_ms;
                        self.mag.valid = true;
                    }
                    Err(err) => {
                        self.fault_count = self.fault_count.wrapping_add(1);
                        if self.mag.valid {
                            let mapped = map_hal_error(err, "magnetometer");
                            fsw_log!(
                                log,
                                now_ms,
                                LogLevel::Warning,
                                "ADCS",
                                "Magnetometer read failed: {}",
                                mapped
                            );
                        }
                        self.mag.valid = false;
                    }
                }
            }
        }
    }

    fn read_sun_sensors<H: Adc>(&mut self, hal: &mut H, now_ms: u64) {
        match self.source {
            SensorSource::Simulated => {
                self.sun.intensity = self.sim_sun.magnitude();
                self.sun.sun_vector = self.sim_sun.normalized();
                self.sun.sun_visible = self.sun.intensity > ADCS_ECLIPSE_THRESHOLD;
                self.sun.timestamp_ms = now_ms;
                let counts = (1_000.0 * self.sun.intensity) as u16;
                self.sun.raw = [counts; ADCS_SUN_SENSOR_COUNT];
            }
            SensorSource::Hardware => {
                let mut raw = [0u16; ADCS_SUN_SENSOR_COUNT];
                let mut failed = false;
                for (slot, channel) in raw.iter_mut().zip(AdcChannel::SUN_SENSORS) {
                    match hal.read_raw(channel) {
                        Ok(counts) => *slot = counts,
                        Err(_) => {
                            failed = true;
                            break;
                        }
                    }
                }
                if failed {
                    self.fault_count = self.fault_count.wrapping_add(1);
                    self.sun.sun_visible = false;
                    return;
                }

                let full = f64::from(ADC_FULL_SCALE);
                let peak = raw.iter().copied().max().unwrap_or(0);
                self.sun.raw = raw;
                self.sun.intensity = f64::from(peak) / full;
                self.sun.sun_visible = self.sun.intensity > ADCS_ECLIPSE_THRESHOLD;
                self.sun.timestamp_ms = now_ms;

                if self.sun.sun_visible {
                    // Opposing-face differences give the body-frame
                    // direction; only the direction matters
                    let mut vector = Vec3::new(
                        (f64::from(raw[0]) - f64::from(raw[1])) / full,
                        (f64::from(raw[2]) - f64::from(raw[3])) / full,
                        (f64::from(raw[4]) - f64::from(raw[5])) / full,
                    );
                    vector.normalize();
                    self.sun.sun_vector = vector;
                }
            }
        }
    }

    /// Gyroless rate estimate: for slow rotation in a near-constant
    /// field, |dB/dt| ≈ |ω × B|, so the component-wise quotient Ḃ/|B|
    /// serves as a proxy rate vector. Used only as the detumble
    /// convergence metric, never as a pointing-grade rate.
    fn estimate_rate(&mut self, now_ms: u64) {
        if self.mag_prev.valid && self.mag.valid {
            let dt_ms = now_ms.wrapping_sub(self.mag_prev.timestamp_ms);
            if dt_ms >= ADCS_MIN_RATE_DT_MS {
                let dt = dt_ms as f64 / 1_000.0;
                let field_mag = self.mag.field.magnitude();
                if field_mag > MIN_FIELD_T {
                    let b_dot = (self.mag.field - self.mag_prev.field) * (1.0 / dt);
                    self.mag.field_rate = b_dot;
                    self.angular_rate_est = b_dot * (1.0 / field_mag);
                }
            }
        }

        self.mag_prev = self.mag;
        self.rate_magnitude = self.angular_rate_est.magnitude();
    }

    /// Command a mode change (ground command)
    ///
    /// Entering `Detumble` from any other mode records the start time
    /// and clears the settling window; re-commanding the current mode
    /// leaves the counters untouched.
    pub fn set_mode(&mut self, log: &mut FlightLog, now_ms: u64, mode: AdcsMode) -> Result<()> {
        if !self.initialised {
            return Err(FswError::not_initialised("adcs"));
        }

        let prev_mode = self.mode;
        self.mode = mode;

        if mode == AdcsMode::Detumble && prev_mode != AdcsMode::Detumble {
            self.detumble_start_ms = now_ms;
            self.settling_start_ms = 0;
            self.detumble_complete = false;
            fsw_log!(log, now_ms, LogLevel::Info, "ADCS", "Starting detumble sequence");
        }

        fsw_log!(
            log,
            now_ms,
            LogLevel::Debug,
            "ADCS",
            "Mode changed: {:?} -> {:?}",
            prev_mode,
            mode
        );
        Ok(())
    }

    /// Current operating mode
    #[must_use]
    pub fn mode(&self) -> AdcsMode {
        self.mode
    }

    /// Consolidated status snapshot
    #[must_use]
    pub fn status(&self) -> AdcsStatus {
        AdcsStatus {
            mode: self.mode,
            rate_magnitude: self.rate_magnitude,
            detumble_complete: self.detumble_complete,
            sun_visible: self.sun.sun_visible,
            control_cycles: self.control_cycles,
            fault_count: self.fault_count,
            mtq_enabled: self.mtq.enabled,
        }
    }

    /// Latest magnetometer sample
    #[must_use]
    pub fn mag(&self) -> MagSample {
        self.mag
    }

    /// Latest sun-sensor sample
    #[must_use]
    pub fn sun(&self) -> SunSample {
        self.sun
    }

    /// Latest magnetorquer command
    #[must_use]
    pub fn mtq(&self) -> MtqCommand {
        self.mtq
    }

    /// Whether detumble has completed
    #[must_use]
    pub fn is_detumbled(&self) -> bool {
        self.detumble_complete
    }

    /// Whether the Sun is currently visible
    #[must_use]
    pub fn sun_visible(&self) -> bool {
        self.sun.sun_visible
    }

    /// Estimated rate magnitude (rad/s)
    #[must_use]
    pub fn rate_magnitude(&self) -> f64 {
        self.rate_magnitude
    }

    /// Build the ADCS telemetry packet
    #[must_use]
    pub fn telemetry(&self) -> AdcsTelemetry {
        AdcsTelemetry {
            mode: self.mode as u8,
            mag_x: to_fixed_i16(self.mag.field.x * T_TO_UT, 10.0),
            mag_y: to_fixed_i16(self.mag.field.y * T_TO_UT, 10.0),
            mag_z: to_fixed_i16(self.mag.field.z * T_TO_UT, 10.0),
            sun_x: to_fixed_i16(self.sun.sun_vector.x, 100.0),
            sun_y: to_fixed_i16(self.sun.sun_vector.y, 100.0),
            sun_z: to_fixed_i16(self.sun.sun_vector.z, 100.0),
            rate_x: to_fixed_i16(self.angular_rate_est.x * RAD_TO_DEG, 100.0),
            rate_y: to_fixed_i16(self.angular_rate_est.y * RAD_TO_DEG, 100.0),
            rate_z: to_fixed_i16(self.angular_rate_est.z * RAD_TO_DEG, 100.0),
            mtq_x: self.mtq.pwm[0],
            mtq_y: self.mtq.pwm[1],
            mtq_z: self.mtq.pwm[2],
            sun_visible: u8::from(self.sun.sun_visible),
            detumble_done: u8::from(self.detumble_complete),
        }
    }

    /// Select the sensor source (test/simulation seam)
    pub fn set_sensor_source(&mut self, source: SensorSource) {
        self.source = source;
    }

    /// Override the simulated sensor values
    ///
    /// `mag` is in µT; `sun` is a direction whose magnitude encodes
    /// intensity; `rate` seeds the estimated angular rate (rad/s).
    /// Only takes effect while the source is
    /// [`SensorSource::Simulated`].
    pub fn set_sim_sensors(
        &mut self,
        mag: Option<Vec3>,
        sun: Option<Vec3>,
        rate: Option<Vec3>,
    ) {
        if let Some(mag) = mag {
            self.sim_mag_ut = mag;
        }
        if let Some(sun) = sun {
            self.sim_sun = sun;
        }
        if let Some(rate) = rate {
            self.angular_rate_est = rate;
            self.rate_magnitude = rate.magnitude();
        }
    }

    fn apply_dipole(&mut self, dipole: Vec3) {
        let mut dipole = dipole;
        dipole.saturate(ADCS_MAX_DIPOLE);

        self.mtq.dipole = dipole;
        self.mtq.enabled = true;
        self.mtq.pwm = [
            pwm_percent(dipole.x / ADCS_MAX_DIPOLE),
            pwm_percent(dipole.y / ADCS_MAX_DIPOLE),
            pwm_percent(dipole.z / ADCS_MAX_DIPOLE),
        ];
    }

    fn disable_mtq(&mut self) {
        self.mtq.dipole = Vec3::ZERO;
        self.mtq.pwm = [0; 3];
        self.mtq.enabled = false;
    }
}

fn pwm_percent(ratio: f64) -> i8 {
    to_fixed_i8(ratio, 100.0).clamp(-100, 100)
}

/// B-dot detumble law: `m = -k · Ḃ`
///
/// Dissipative by construction: the commanded dipole opposes the field
/// rate, drawing rotational kinetic energy into the torquer coils.
/// Returns zero for an invalid sample; saturated per axis.
#[must_use]
pub fn compute_bdot(mag: &MagSample) -> Vec3 {
    if !mag.valid {
        return Vec3::ZERO;
    }

    let mut dipole = mag.field_rate * (-ADCS_BDOT_GAIN);
    dipole.saturate(ADCS_MAX_DIPOLE);
    dipole
}

/// Sun-pointing law
///
/// Error axis `e = ŝ × x̂`, desired torque `τ = Kₚ·e`, inverted through
/// the field with the least-norm dipole `m = (τ × B)/|B|²`; any dipole
/// component parallel to B produces no torque, so this recovers the
/// component of τ perpendicular to B. Returns zero when the Sun is not
/// visible or the field is too weak to invert.
#[must_use]
pub fn compute_sunpoint(sun: &SunSample, mag: &MagSample) -> Vec3 {
    if !sun.sun_visible || !mag.valid {
        return Vec3::ZERO;
    }

    let error = sun.sun_vector.cross(&Vec3::UNIT_X);
    let torque = error * ADCS_SUNPOINT_KP;

    let field = mag.field;
    let field_mag_sq = field.dot(&field);
    if field_mag_sq <= MIN_FIELD_T * MIN_FIELD_T {
        return Vec3::ZERO;
    }

    let mut dipole = torque.cross(&field) * (1.0 / field_mag_sq);
    dipole.saturate(ADCS_MAX_DIPOLE);
    dipole
}
