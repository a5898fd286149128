//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use appliance_sim::devices::profiles::{self, SET_HIGH, SET_LOW, SWITCH_OFF, SWITCH_ON};
use appliance_sim::devices::{ApplianceModel, RelayModel};
use appliance_sim::sim::{
    Architecture, CouplingTables, CreationMode, Event, RunParameters, SimulationRun, Time,
    TimeUnit,
};

pub const S: TimeUnit = TimeUnit::Seconds;

pub fn secs(v: f64) -> Time {
    Time::new(v, S)
}

/// A root `home` holding a single fan appliance.
pub fn fan_architecture() -> Architecture {
    fan_architecture_in(CreationMode::Simulated)
}

/// The single-fan tree, created for wall-clock pacing.
pub fn realtime_fan_architecture() -> Architecture {
    fan_architecture_in(CreationMode::RealTime)
}

fn fan_architecture_in(mode: CreationMode) -> Architecture {
    Architecture::builder("home")
        .mode(mode)
        .atomic("fan", S, || Box::new(ApplianceModel::new(profiles::fan_profile())))
        .coupled("home", S, ["fan"], CouplingTables::new())
        .build()
        .expect("fan architecture should be valid")
}

/// A root `home` whose `switchboard` relay forwards every fan command to
/// the `fan` appliance.
pub fn relayed_fan_architecture() -> Architecture {
    let kinds = vec![SWITCH_ON, SET_HIGH, SET_LOW, SWITCH_OFF];
    let mut tables = CouplingTables::new();
    for k in &kinds {
        tables = tables.couple("switchboard", k.name(), "fan");
    }
    Architecture::builder("home")
        .atomic("switchboard", S, move || Box::new(RelayModel::new(kinds.clone())))
        .atomic("fan", S, || Box::new(ApplianceModel::new(profiles::fan_profile())))
        .coupled("home", S, ["switchboard", "fan"], tables)
        .build()
        .expect("relayed fan architecture should be valid")
}

/// Initialised run over `[0, end]` seconds with `events` queued for `target`.
pub fn run_with(arch: &Architecture, end: f64, target: &str, events: Vec<Event>) -> SimulationRun {
    let mut run = SimulationRun::new(arch, RunParameters::new(), secs(0.0), secs(end))
        .expect("run should be created");
    run.initialise().expect("run should initialise");
    for e in events {
        run.schedule_external(target, e)
            .expect("event should be accepted");
    }
    run
}

pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}
