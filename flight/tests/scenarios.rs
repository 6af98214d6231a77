//! End-to-end mission scenarios on the simulated board
//!
//! Each test drives the core through the supervisor or a single
//! subsystem with scripted sensor inputs and checks the published
//! state, matching the sequences flown during bench checkout.

use microsat_flight::adcs::{
    AdcsCore, AdcsMode, SensorSource, ADCS_DETUMBLE_RATE_THRESHOLD, ADCS_DETUMBLE_SETTLING_MS,
    ADCS_DETUMBLE_TIMEOUT_MS,
};
use microsat_flight::deployment::{
    DeployElement, DeployState, ANTENNA_BURN_TIME_MS, DEPLOYMENT_MAX_RETRIES,
    DEPLOYMENT_WAIT_TIME_MS, SOLAR_BURN_TIME_MS,
};
use microsat_flight::flightlog::{FlightLog, LogLevel};
use microsat_flight::supervisor::Supervisor;
use microsat_flight::watchdog::TaskId;
use microsat_hal::sim::SimHal;
use microsat_hal::Pin;
use microsat_shared::Vec3;

/// Advance the supervisor in 100 ms steps for the given duration
fn run_for(sup: &mut Supervisor<SimHal>, duration_ms: u64) {
    let steps = duration_ms / 100;
    for _ in 0..steps {
        sup.hal_mut().advance_ms(100);
        sup.tick();
    }
}

fn log_has(log: &FlightLog, level: LogLevel, module: &str, fragment: &str) -> bool {
    (0..log.count()).any(|i| {
        let entry = log.get_entry(i).unwrap();
        entry.level == level
            && entry.module.as_str() == module
            && entry.message.as_str().contains(fragment)
    })
}

#[test]
fn deployment_happy_path() {
    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().unwrap();

    // Dispenser release at t = 1 s
    run_for(&mut sup, 900);
    sup.hal_mut().set_input_level(Pin::SeparationSense, true);
    run_for(&mut sup, 200);
    assert_eq!(sup.deployment().state(), DeployState::Waiting);

    // Hold-off expires; antenna burn starts
    run_for(&mut sup, DEPLOYMENT_WAIT_TIME_MS);
    assert_eq!(sup.deployment().state(), DeployState::AntennaActive);
    assert!(sup.hal().pin_level(Pin::DeployEnable));

    // Burn completes, the antenna switch confirms release
    run_for(&mut sup, ANTENNA_BURN_TIME_MS);
    assert_eq!(sup.deployment().state(), DeployState::AntennaVerify);
    assert!(!sup.hal().pin_level(Pin::DeployEnable));
    sup.hal_mut().set_input_level(Pin::AntennaSense, true);
    run_for(&mut sup, 200);

    // Solar burn runs its longer cycle, then confirms
    assert_eq!(sup.deployment().state(), DeployState::SolarActive);
    run_for(&mut sup, SOLAR_BURN_TIME_MS);
    assert_eq!(sup.deployment().state(), DeployState::SolarVerify);
    sup.hal_mut().set_input_level(Pin::SolarSense, true);
    run_for(&mut sup, 200);

    assert_eq!(sup.deployment().state(), DeployState::Complete);
    assert!(sup.deployment().all_complete());
    assert_eq!(
        sup.deployment().element_status(DeployElement::Antenna).attempt_count,
        1
    );
    assert_eq!(
        sup.deployment()
            .element_status(DeployElement::SolarPanel)
            .attempt_count,
        1
    );
}

#[test]
fn deployment_retry_exhaustion() {
    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().unwrap();

    sup.hal_mut().set_input_level(Pin::SeparationSense, true);
    run_for(&mut sup, 1_000);
    run_for(&mut sup, DEPLOYMENT_WAIT_TIME_MS);

    // The antenna switch never closes: burn, wait out the retry
    // delay, twice more, then give up
    run_for(&mut sup, 3 * (ANTENNA_BURN_TIME_MS + 61_000));

    assert_eq!(sup.deployment().state(), DeployState::Failed);
    let antenna = sup.deployment().element_status(DeployElement::Antenna);
    assert_eq!(antenna.attempt_count, DEPLOYMENT_MAX_RETRIES);
    assert!(!antenna.deployed);
    assert!(log_has(sup.log(), LogLevel::Error, "DEPLOY", "failed after 3 attempts"));

    // Terminal until ground intervenes
    run_for(&mut sup, 10_000);
    assert_eq!(sup.deployment().state(), DeployState::Failed);
}

#[test]
fn deployment_force_retry_recovers_from_failed() {
    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().unwrap();

    sup.hal_mut().set_input_level(Pin::SeparationSense, true);
    run_for(&mut sup, 1_000);
    run_for(&mut sup, DEPLOYMENT_WAIT_TIME_MS);
    run_for(&mut sup, 3 * (ANTENNA_BURN_TIME_MS + 61_000));
    assert_eq!(sup.deployment().state(), DeployState::Failed);

    // Ground commands a retry; this time the mechanism releases
    let now = {
        use microsat_hal::Clock;
        sup.hal().now_ms()
    };
    let (deploy, hal, log) = sup.deployment_mut();
    deploy.force_retry(hal, log, now, DeployElement::Antenna);
    assert_eq!(deploy.state(), DeployState::AntennaPending);

    run_for(&mut sup, 200);
    assert_eq!(sup.deployment().state(), DeployState::AntennaActive);
    run_for(&mut sup, ANTENNA_BURN_TIME_MS);
    sup.hal_mut().set_input_level(Pin::AntennaSense, true);
    run_for(&mut sup, 200);
    assert_eq!(sup.deployment().state(), DeployState::SolarActive);
}

#[test]
fn deployment_state_survives_reset() {
    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().unwrap();

    sup.hal_mut().set_input_level(Pin::SeparationSense, true);
    run_for(&mut sup, 1_000);
    run_for(&mut sup, DEPLOYMENT_WAIT_TIME_MS);
    run_for(&mut sup, ANTENNA_BURN_TIME_MS);
    sup.hal_mut().set_input_level(Pin::AntennaSense, true);
    run_for(&mut sup, 200);
    assert!(sup
        .deployment()
        .element_status(DeployElement::Antenna)
        .deployed);

    // Power cycle: same flash, new software state. The sequencer
    // resumes past the antenna instead of re-burning it.
    let mut hal = SimHal::new();
    let mut saved = [0u8; 64];
    {
        use microsat_hal::FlashStore;
        sup.hal_mut()
            .read(microsat_hal::FlashRegion::DeployState, 0, &mut saved)
            .unwrap();
        hal.write(microsat_hal::FlashRegion::DeployState, 0, &saved)
            .unwrap();
    }
    hal.set_input_level(Pin::SeparationSense, true);
    hal.set_input_level(Pin::AntennaSense, true);

    let mut sup2: Supervisor<SimHal> = Supervisor::new(hal);
    sup2.boot().unwrap();
    let antenna = sup2.deployment().element_status(DeployElement::Antenna);
    assert!(antenna.deployed);
    assert_eq!(antenna.attempt_count, 1);
    assert!(sup2.deployment().is_separated());
}

#[test]
fn detumble_convergence() {
    let mut hal = SimHal::new();
    let mut log = FlightLog::new();
    let mut adcs = AdcsCore::new();
    adcs.init(&mut log, 0);
    adcs.set_sensor_source(SensorSource::Simulated);

    // Tip-off rate well above the threshold
    adcs.set_sim_sensors(
        Some(Vec3::new(30.0, 0.0, 40.0)),
        None,
        Some(Vec3::new(0.03, 0.03, 0.03)),
    );
    adcs.set_mode(&mut log, 0, AdcsMode::Detumble).unwrap();

    // Field rotation decays as the torquers bleed off energy
    let mut now = 0u64;
    let mut wobble: f64 = 25.0;
    while now < 120_000 {
        now += 1_000;
        wobble *= 0.9;
        adcs.set_sim_sensors(Some(Vec3::new(30.0, wobble, 40.0)), None, None);
        adcs.update(&mut hal, &mut log, now).unwrap();
        if adcs.rate_magnitude() < ADCS_DETUMBLE_RATE_THRESHOLD {
            break;
        }
    }
    assert!(adcs.rate_magnitude() < ADCS_DETUMBLE_RATE_THRESHOLD);
    assert!(!adcs.is_detumbled());

    // Sustained quiet for the settling window completes detumble
    let quiet_until = now + ADCS_DETUMBLE_SETTLING_MS + 2_000;
    while now < quiet_until {
        now += 1_000;
        adcs.update(&mut hal, &mut log, now).unwrap();
    }

    assert!(adcs.is_detumbled());
    assert_eq!(adcs.mode(), AdcsMode::Idle);
    assert!(!adcs.mtq().enabled);
}

#[test]
fn detumble_timeout_is_best_effort_complete() {
    let mut hal = SimHal::new();
    let mut log = FlightLog::new();
    let mut adcs = AdcsCore::new();
    adcs.init(&mut log, 0);
    adcs.set_sensor_source(SensorSource::Simulated);
    adcs.set_mode(&mut log, 1_000, AdcsMode::Detumble).unwrap();

    // Field keeps swinging: the rate never settles
    let mut now = 1_000u64;
    let mut flip = 5.0;
    while now <= 1_000 + ADCS_DETUMBLE_TIMEOUT_MS + 2_000 {
        now += 1_000;
        flip = -flip;
        adcs.set_sim_sensors(Some(Vec3::new(30.0, flip, 40.0)), None, None);
        adcs.update(&mut hal, &mut log, now).unwrap();
    }

    assert!(adcs.is_detumbled());
    assert_eq!(adcs.mode(), AdcsMode::Idle);
    assert!(log_has(&log, LogLevel::Warning, "ADCS", "Detumble timeout"));
}

#[test]
fn sunpoint_falls_back_to_eclipse_and_returns() {
    let mut hal = SimHal::new();
    let mut log = FlightLog::new();
    let mut adcs = AdcsCore::new();
    adcs.init(&mut log, 0);
    adcs.set_sensor_source(SensorSource::Simulated);

    adcs.set_sim_sensors(Some(Vec3::new(30.0, 0.0, 40.0)), Some(Vec3::new(0.2, 0.9, 0.1)), None);
    adcs.set_mode(&mut log, 0, AdcsMode::Sunpoint).unwrap();
    adcs.update(&mut hal, &mut log, 1_000).unwrap();
    assert_eq!(adcs.mode(), AdcsMode::Sunpoint);
    assert!(adcs.mtq().enabled);

    // Umbra entry
    adcs.set_sim_sensors(None, Some(Vec3::ZERO), None);
    adcs.update(&mut hal, &mut log, 2_000).unwrap();
    assert_eq!(adcs.mode(), AdcsMode::Eclipse);
    assert!(!adcs.mtq().enabled);

    // Umbra exit
    adcs.set_sim_sensors(None, Some(Vec3::new(0.2, 0.9, 0.1)), None);
    adcs.update(&mut hal, &mut log, 3_000).unwrap();
    assert_eq!(adcs.mode(), AdcsMode::Sunpoint);
}

#[test]
fn silent_subsystem_flagged_by_watchdog() {
    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().unwrap();

    // A comm task registers, checks in once, then goes silent
    {
        use microsat_hal::Clock;
        let now = sup.hal().now_ms();
        sup.watchdog_mut()
            .register_task(now, TaskId::Comm, "comm", 1_000)
            .unwrap();
        sup.watchdog_mut().checkin(now, TaskId::Comm).unwrap();
    }

    run_for(&mut sup, 4_100);

    assert!(sup.watchdog().is_task_stalled(TaskId::Comm));
    assert!(sup.watchdog().any_task_stalled());
    // The main loop and ADCS keep checking in and stay healthy
    assert!(!sup.watchdog().is_task_stalled(TaskId::MainLoop));
    assert!(!sup.watchdog().is_task_stalled(TaskId::Adcs));
    assert!(log_has(sup.log(), LogLevel::Warning, "WDT", "comm stalled"));

    // Advisory only: the machine is still running and kicking
    let kicks_before = sup.watchdog().stats().hw_kicks;
    run_for(&mut sup, 1_000);
    assert!(sup.watchdog().stats().hw_kicks > kicks_before);
}

#[test]
fn log_overflow_keeps_newest_64() {
    let mut log = FlightLog::new();
    for i in 0..74u32 {
        let _ = log.write(
            u64::from(i),
            LogLevel::Info,
            "TLM",
            format_args!("frame {}", i),
        );
    }

    assert_eq!(log.count(), 64);
    assert_eq!(log.stats().dropped_logs, 10);
    assert_eq!(log.get_entry(0).unwrap().message.as_str(), "frame 10");
}
