//! Mission timeline simulation
//!
//! Runs the flight core against the simulated board through a full
//! early-orbit sequence: power-on, dispenser separation, deployment
//! hold-off and burns, detumble, sun acquisition, and one eclipse
//! pass. Host diagnostics go through `tracing`; the flight log and
//! telemetry snapshots are dumped at the end.

use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

use microsat_flight::adcs::{AdcsMode, SensorSource};
use microsat_flight::deployment::{DeployState, DEPLOYMENT_WAIT_TIME_MS};
use microsat_flight::supervisor::Supervisor;
use microsat_hal::sim::SimHal;
use microsat_hal::{Clock, Pin};
use microsat_shared::telemetry::{AdcsTelemetry, DeploymentTelemetry};
use microsat_shared::Vec3;

/// Supervisor step size (ms of simulated time per tick)
const STEP_MS: u64 = 100;

/// Scripted dispenser release time (ms after power-on)
const SEPARATION_AT_MS: u64 = 5_000;

#[derive(Debug, Error)]
enum ScriptError {
    #[error("deployment did not complete within {0} ms of simulated time")]
    DeploymentTimeout(u64),
    #[error("deployment parked in FAILED awaiting ground command")]
    DeploymentFailed,
    #[error("detumble did not converge before the one-orbit timeout")]
    DetumbleStalled,
}

#[derive(Debug, serde::Serialize)]
struct MissionSummary {
    sim_time_ms: u64,
    deployment: DeploymentTelemetry,
    adcs: AdcsTelemetry,
    watchdog: microsat_flight::watchdog::WdtStats,
    log: microsat_flight::flightlog::LogStats,
}

fn step(sup: &mut Supervisor<SimHal>) {
    sup.hal_mut().advance_ms(STEP_MS);
    sup.tick();
}

fn run_deployment(sup: &mut Supervisor<SimHal>) -> Result<(), ScriptError> {
    let deadline = SEPARATION_AT_MS + 2 * DEPLOYMENT_WAIT_TIME_MS;
    let mut released = false;
    let mut last_state = sup.deployment().state();

    while sup.deployment().state() != DeployState::Complete {
        step(sup);
        let now = sup.hal().now_ms();

        if !released && now >= SEPARATION_AT_MS {
            sup.hal_mut().set_input_level(Pin::SeparationSense, true);
            released = true;
            info!(t_ms = now, "dispenser separation");
        }

        // The bench harness closes each confirmation switch once the
        // corresponding burn has run
        match sup.deployment().state() {
            DeployState::AntennaVerify => {
                sup.hal_mut().set_input_level(Pin::AntennaSense, true);
            }
            DeployState::SolarVerify => {
                sup.hal_mut().set_input_level(Pin::SolarSense, true);
            }
            DeployState::Failed => return Err(ScriptError::DeploymentFailed),
            _ => {}
        }

        let state = sup.deployment().state();
        if state != last_state {
            info!(t_ms = now, state = state.name(), "deployment");
            last_state = state;
        }

        if now > deadline {
            return Err(ScriptError::DeploymentTimeout(now));
        }
    }

    info!(t_ms = sup.hal().now_ms(), "all deployments confirmed");
    Ok(())
}

fn run_detumble(sup: &mut Supervisor<SimHal>) -> Result<(), ScriptError> {
    let now = sup.hal().now_ms();
    {
        let (adcs, log) = sup.adcs_mut();
        adcs.set_sensor_source(SensorSource::Simulated);
        adcs.set_sim_sensors(
            Some(Vec3::new(30.0, 0.0, 40.0)),
            Some(Vec3::ZERO),
            Some(Vec3::new(0.04, 0.03, 0.02)),
        );
        let _ = adcs.set_mode(log, now, AdcsMode::Detumble);
    }
    info!(t_ms = now, "detumble commanded");

    // Field wobble decays as the torquers bleed off tip-off energy
    let mut wobble = 20.0_f64;
    let deadline = now + 6_000_000;
    while !sup.adcs().is_detumbled() {
        for _ in 0..10 {
            step(sup);
        }
        wobble *= 0.97;
        let (adcs, _log) = sup.adcs_mut();
        adcs.set_sim_sensors(Some(Vec3::new(30.0, wobble, 40.0)), None, None);

        if sup.hal().now_ms() > deadline {
            return Err(ScriptError::DetumbleStalled);
        }
    }

    info!(
        t_ms = sup.hal().now_ms(),
        rate_rad_s = sup.adcs().rate_magnitude(),
        "detumble complete"
    );
    Ok(())
}

fn run_sun_acquisition(sup: &mut Supervisor<SimHal>) {
    let now = sup.hal().now_ms();
    {
        let (adcs, log) = sup.adcs_mut();
        adcs.set_sim_sensors(None, Some(Vec3::new(0.4, 0.8, 0.2)), None);
        let _ = adcs.set_mode(log, now, AdcsMode::Sunpoint);
    }
    info!(t_ms = now, "sun pointing commanded");

    for _ in 0..300 {
        step(sup);
    }
    info!(
        t_ms = sup.hal().now_ms(),
        mode = ?sup.adcs().mode(),
        mtq = ?sup.adcs().mtq().pwm,
        "sun pointing active"
    );

    // One umbra pass
    {
        let (adcs, _log) = sup.adcs_mut();
        adcs.set_sim_sensors(None, Some(Vec3::ZERO), None);
    }
    for _ in 0..100 {
        step(sup);
    }
    if sup.adcs().mode() == AdcsMode::Eclipse {
        info!(t_ms = sup.hal().now_ms(), "eclipse entry, torquers off");
    } else {
        warn!(t_ms = sup.hal().now_ms(), mode = ?sup.adcs().mode(), "unexpected mode in umbra");
    }

    {
        let (adcs, _log) = sup.adcs_mut();
        adcs.set_sim_sensors(None, Some(Vec3::new(0.4, 0.8, 0.2)), None);
    }
    for _ in 0..100 {
        step(sup);
    }
    info!(t_ms = sup.hal().now_ms(), mode = ?sup.adcs().mode(), "eclipse exit");
}

fn dump_flight_log(sup: &Supervisor<SimHal>) {
    for index in 0..sup.log().count() {
        if let Ok(entry) = sup.log().get_entry(index) {
            info!(
                seq = entry.sequence,
                t_ms = entry.timestamp_ms,
                level = entry.level.tag().trim_end(),
                module = entry.module.as_str(),
                "{}",
                entry.message.as_str()
            );
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    info!("MicroSat bus mission simulation starting");

    let mut sup: Supervisor<SimHal> = Supervisor::new(SimHal::new());
    sup.boot().context("bus controller boot")?;

    run_deployment(&mut sup)?;
    run_detumble(&mut sup)?;
    run_sun_acquisition(&mut sup);

    info!("--- flight log ---");
    dump_flight_log(&sup);

    let summary = MissionSummary {
        sim_time_ms: sup.hal().now_ms(),
        deployment: sup.deployment().telemetry(sup.hal().now_ms()),
        adcs: sup.adcs().telemetry(),
        watchdog: sup.watchdog().stats(),
        log: sup.log().stats(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
