//! Turns a [`ScenarioConfig`] into a model tree, run parameters and
//! scheduled injections.
//!
//! Every scenario has a coupled root `home`. Appliances listed in the
//! configuration sit directly under it; the optional water heater and wind
//! systems are coupled models of their own:
//!
//! ```text
//! home
//! ├── <appliances...>
//! ├── water-heater
//! │   ├── heater-control   relay for SwitchOn / SwitchOff
//! │   ├── heater           water_heater profile
//! │   ├── tank             heater.power_w → tank.heating_power
//! │   └── thermostat       tank.temperature_c → thermostat.sensor
//! └── wind
//!     ├── wind-speed
//!     ├── cut-in           wind-speed.wind_speed_ms → cut-in.sensor
//!     ├── turbine          wind_turbine profile
//!     └── battery          turbine.power_w → battery.net_power_w
//! ```
//!
//! With `control.external` the thermostat and cut-in models are left out
//! and [`ControlLoop`]s drive the same actuators through the scheduler.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use thiserror::Error;

use crate::config::{
    ConfigError, ParameterConfig, ProfileConfig, RunMode, ScenarioConfig, WaterHeaterConfig,
    WindConfig,
};
use crate::control::{ControlLoop, HysteresisController, HysteresisMode};
use crate::devices::profiles::{self, SET_HIGH, SET_LOW, SET_POWER, SWITCH_OFF, SWITCH_ON};
use crate::devices::{
    ApplianceModel, ApplianceProfile, BatteryModel, RelayModel, ThermalModel,
    ThresholdControllerModel, WindSpeedModel,
};
use crate::sim::architecture::{Architecture, ArchitectureBuilder, CreationMode};
use crate::sim::coupled::CouplingTables;
use crate::sim::error::SimError;
use crate::sim::event::{Event, EventContent, EventKind};
use crate::sim::params::{ParamValue, RunParameters};
use crate::sim::realtime::RealTimeConfig;
use crate::sim::time::{Time, TimeUnit};
use crate::sim::variable::VariableKey;

pub const ROOT: &str = "home";
pub const WATER_HEATER: &str = "water-heater";
pub const WIND: &str = "wind";

/// Failure to turn a configuration into a runnable scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("{}", join_errors(.0))]
    Invalid(Vec<ConfigError>),
    #[error("injections[{index}]: unknown event \"{event}\"")]
    UnknownEvent { index: usize, event: String },
    #[error(transparent)]
    Sim(#[from] SimError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Everything needed to start one run of a scenario.
pub struct Scenario {
    pub architecture: Architecture,
    pub params: RunParameters,
    pub start: Time,
    pub end: Time,
    /// Pacing used when the run is real-time.
    pub pacing: RealTimeConfig,
    /// External events delivered at their timestamps, in declaration order.
    pub injections: Vec<(String, Event)>,
    /// Host-side control loops, only populated with `control.external`.
    pub loops: Vec<ControlLoop>,
}

impl Scenario {
    /// Validates `config` and builds its model tree.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Invalid`] with every validation error, a
    /// [`SimError`] if a profile or the architecture is malformed, or
    /// [`ScenarioError::UnknownEvent`] for an injection naming an event no
    /// profile declares.
    pub fn build(config: &ScenarioConfig) -> Result<Self, ScenarioError> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ScenarioError::Invalid(errors));
        }
        let sim = &config.simulation;
        let unit = sim.time_unit;
        let external = config.control.external;

        let custom = config
            .profiles
            .iter()
            .map(custom_profile)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = Architecture::builder(ROOT).mode(match sim.mode {
            RunMode::Simulated => CreationMode::Simulated,
            RunMode::Realtime => CreationMode::RealTime,
        });
        let mut params = RunParameters::new();
        let mut root_children = Vec::new();
        let mut root_tables = CouplingTables::new();
        let mut loops = Vec::new();
        let poll = StdDuration::from_millis(config.control.poll_ms);

        for a in &config.appliances {
            let profile = match profiles::builtin(&a.profile) {
                Some(p) => Arc::new(p),
                None => custom
                    .iter()
                    .find(|p| p.name() == a.profile)
                    .cloned()
                    .ok_or_else(|| SimError::InvalidParameter {
                        name: format!("{}:profile", a.uri),
                        message: format!("unknown profile \"{}\"", a.profile),
                    })?,
            };
            builder = builder.atomic(a.uri.clone(), unit, move || {
                Box::new(ApplianceModel::new(Arc::clone(&profile)))
            });
            root_children.push(a.uri.clone());
        }

        if let Some(wh) = &config.water_heater {
            builder = water_heater(builder, unit, wh, external, &mut params);
            root_children.push(WATER_HEATER.to_string());
            root_tables = root_tables
                .reexport(WATER_HEATER, SWITCH_ON.name())
                .reexport(WATER_HEATER, SWITCH_OFF.name());
            if external {
                loops.push(ControlLoop {
                    sensor: VariableKey::new("tank", "temperature_c"),
                    actuator: WATER_HEATER.to_string(),
                    on_event: SWITCH_ON,
                    off_event: SWITCH_OFF,
                    controller: HysteresisController::new(
                        wh.low_c,
                        wh.high_c,
                        HysteresisMode::OnBelow,
                        false,
                    ),
                    period: poll,
                });
            }
        }

        if let Some(w) = &config.wind {
            builder = wind(builder, unit, w, sim.seed, external, &mut params);
            root_children.push(WIND.to_string());
            root_tables = root_tables
                .reexport(WIND, SWITCH_ON.name())
                .reexport(WIND, SWITCH_OFF.name());
            if external {
                loops.push(ControlLoop {
                    sensor: VariableKey::new("wind-speed", "wind_speed_ms"),
                    actuator: WIND.to_string(),
                    on_event: SWITCH_ON,
                    off_event: SWITCH_OFF,
                    controller: HysteresisController::new(
                        w.cut_out_ms,
                        w.cut_in_ms,
                        HysteresisMode::OnAbove,
                        false,
                    ),
                    period: poll,
                });
            }
        }

        let architecture = builder
            .coupled(ROOT, unit, root_children, root_tables)
            .build()?;

        // Explicit overrides win over values derived from the sections.
        for (key, value) in &config.parameters {
            let value = match value {
                ParameterConfig::Real(v) => ParamValue::Real(*v),
                ParameterConfig::Text(s) => ParamValue::Text(s.clone()),
            };
            params.insert(key.clone(), value);
        }

        let kinds = known_kinds(&custom);
        let mut injections = Vec::with_capacity(config.injections.len());
        for (index, inj) in config.injections.iter().enumerate() {
            let kind = kinds
                .iter()
                .find(|k| k.name() == inj.event)
                .cloned()
                .ok_or_else(|| ScenarioError::UnknownEvent {
                    index,
                    event: inj.event.clone(),
                })?;
            let at = Time::new(inj.at, unit);
            let event = match inj.value {
                Some(v) => Event::with_content(kind, at, EventContent::Real(v)),
                None => Event::new(kind, at),
            };
            injections.push((inj.target.clone(), event));
        }

        Ok(Self {
            architecture,
            params,
            start: Time::new(sim.start, unit),
            end: Time::new(sim.end, unit),
            pacing: RealTimeConfig {
                acceleration: sim.acceleration,
                lag_tolerance: StdDuration::from_millis(sim.lag_tolerance_ms),
            },
            injections,
            loops,
        })
    }
}

fn custom_profile(cfg: &ProfileConfig) -> Result<Arc<ApplianceProfile>, SimError> {
    let mut builder = ApplianceProfile::builder(cfg.name.clone());
    for m in &cfg.modes {
        builder = builder.mode(&m.name, m.power_w);
    }
    if let Some(initial) = &cfg.initial {
        builder = builder.initial(initial);
    }
    for t in &cfg.transitions {
        let from: Vec<&str> = t.from.iter().map(String::as_str).collect();
        builder = builder.transition(EventKind::named(t.event.clone(), t.priority), &from, &t.to);
    }
    if let Some(max) = cfg.max_inputs {
        builder = builder.max_inputs(max);
    }
    builder.build().map(Arc::new)
}

/// Event kinds an injection may name: the built-in ones plus those of
/// custom profiles.
fn known_kinds(custom: &[Arc<ApplianceProfile>]) -> Vec<EventKind> {
    let mut kinds = vec![SWITCH_ON, SET_HIGH, SET_LOW, SET_POWER, SWITCH_OFF];
    for p in custom {
        for k in p.event_kinds() {
            if !kinds.iter().any(|known| known.name() == k.name()) {
                kinds.push(k);
            }
        }
    }
    kinds
}

fn water_heater(
    builder: ArchitectureBuilder,
    unit: TimeUnit,
    cfg: &WaterHeaterConfig,
    external: bool,
    params: &mut RunParameters,
) -> ArchitectureBuilder {
    params
        .set_real("tank", "volume_l", cfg.volume_l)
        .set_real("tank", "initial_c", cfg.initial_c)
        .set_real("tank", "ambient_c", cfg.ambient_c);

    let mut children = vec!["heater-control", "heater", "tank"];
    let mut tables = CouplingTables::new()
        .import(SWITCH_ON.name(), "heater-control")
        .import(SWITCH_OFF.name(), "heater-control")
        .couple("heater-control", SWITCH_ON.name(), "heater")
        .couple("heater-control", SWITCH_OFF.name(), "heater")
        .reexport("heater-control", SWITCH_ON.name())
        .reexport("heater-control", SWITCH_OFF.name())
        .bind("heater", "power_w", "tank", "heating_power");

    let heater = Arc::new(profiles::water_heater_profile());
    let mut builder = builder
        .atomic("heater-control", unit, || {
            Box::new(RelayModel::new(vec![SWITCH_ON, SWITCH_OFF]))
        })
        .atomic("heater", unit, move || {
            Box::new(ApplianceModel::new(Arc::clone(&heater)))
        })
        .atomic("tank", unit, || Box::new(ThermalModel::new()));

    if !external {
        params
            .set_real("thermostat", "low", cfg.low_c)
            .set_real("thermostat", "high", cfg.high_c)
            .set_real("thermostat", "period_s", cfg.period_s);
        children.push("thermostat");
        tables = tables
            .couple("thermostat", SWITCH_ON.name(), "heater-control")
            .couple("thermostat", SWITCH_OFF.name(), "heater-control")
            .bind("tank", "temperature_c", "thermostat", "sensor");
        builder = builder.atomic("thermostat", unit, || {
            Box::new(ThresholdControllerModel::new(
                HysteresisMode::OnBelow,
                SWITCH_ON,
                SWITCH_OFF,
            ))
        });
    }

    builder.coupled(WATER_HEATER, unit, children, tables)
}

fn wind(
    builder: ArchitectureBuilder,
    unit: TimeUnit,
    cfg: &WindConfig,
    seed: u64,
    external: bool,
    params: &mut RunParameters,
) -> ArchitectureBuilder {
    params
        .set_real("wind-speed", "mean_ms", cfg.mean_ms)
        .set_real("wind-speed", "step_s", cfg.period_s)
        .set_real("wind-speed", "seed", seed as f64)
        .set_real("battery", "capacity_kwh", cfg.battery_capacity_kwh)
        .set_real("battery", "initial_soc", cfg.battery_initial_soc)
        .set_real("battery", "step_s", cfg.period_s);

    let mut children = vec!["wind-speed", "turbine", "battery"];
    let mut tables = CouplingTables::new()
        .import(SWITCH_ON.name(), "turbine")
        .import(SWITCH_OFF.name(), "turbine")
        .bind("turbine", "power_w", "battery", "net_power_w");

    let turbine = Arc::new(profiles::wind_turbine_profile());
    let mut builder = builder
        .atomic("wind-speed", unit, || Box::new(WindSpeedModel::new()))
        .atomic("turbine", unit, move || {
            Box::new(ApplianceModel::new(Arc::clone(&turbine)))
        })
        .atomic("battery", unit, || Box::new(BatteryModel::new()));

    if !external {
        params
            .set_real("cut-in", "low", cfg.cut_out_ms)
            .set_real("cut-in", "high", cfg.cut_in_ms)
            .set_real("cut-in", "period_s", cfg.period_s);
        children.insert(1, "cut-in");
        tables = tables
            .couple("cut-in", SWITCH_ON.name(), "turbine")
            .couple("cut-in", SWITCH_OFF.name(), "turbine")
            .reexport("cut-in", SWITCH_ON.name())
            .reexport("cut-in", SWITCH_OFF.name())
            .bind("wind-speed", "wind_speed_ms", "cut-in", "sensor");
        builder = builder.atomic("cut-in", unit, || {
            Box::new(ThresholdControllerModel::new(
                HysteresisMode::OnAbove,
                SWITCH_ON,
                SWITCH_OFF,
            ))
        });
    }

    builder.coupled(WIND, unit, children, tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApplianceConfig, InjectionConfig};

    #[test]
    fn fan_preset_builds() {
        let scenario = Scenario::build(&ScenarioConfig::fan()).expect("scenario");
        assert_eq!(scenario.architecture.root(), ROOT);
        assert!(scenario.architecture.contains("fan"));
        assert_eq!(scenario.injections.len(), 4);
        assert_eq!(scenario.injections[0].1.kind(), &SWITCH_ON);
        assert!(scenario.loops.is_empty());
    }

    #[test]
    fn water_heater_preset_has_thermostat() {
        let scenario = Scenario::build(&ScenarioConfig::water_heater()).expect("scenario");
        for uri in [WATER_HEATER, "heater", "tank", "thermostat", "heater-control"] {
            assert!(scenario.architecture.contains(uri), "missing {uri}");
        }
        assert_eq!(scenario.params.real("thermostat", "low").ok().flatten(), Some(50.0));
    }

    #[test]
    fn external_control_replaces_in_model_controllers() {
        let mut cfg = ScenarioConfig::wind();
        cfg.simulation.mode = RunMode::Realtime;
        cfg.control.external = true;
        let scenario = Scenario::build(&cfg).expect("scenario");
        assert!(!scenario.architecture.contains("cut-in"));
        assert_eq!(scenario.loops.len(), 1);
        assert_eq!(scenario.loops[0].actuator, WIND);
        assert_eq!(scenario.architecture.mode(), CreationMode::RealTime);
    }

    #[test]
    fn seed_reaches_wind_model_unless_overridden() {
        let mut cfg = ScenarioConfig::wind();
        cfg.simulation.seed = 9;
        let scenario = Scenario::build(&cfg).expect("scenario");
        assert_eq!(scenario.params.real("wind-speed", "seed").ok().flatten(), Some(9.0));

        cfg.parameters.insert("wind-speed:seed".into(), ParameterConfig::Real(3.0));
        let scenario = Scenario::build(&cfg).expect("scenario");
        assert_eq!(scenario.params.real("wind-speed", "seed").ok().flatten(), Some(3.0));
    }

    #[test]
    fn unknown_injection_event_is_rejected() {
        let mut cfg = ScenarioConfig::fan();
        cfg.injections.push(InjectionConfig {
            at: 10.0,
            target: "fan".into(),
            event: "Explode".into(),
            value: None,
        });
        assert!(matches!(
            Scenario::build(&cfg),
            Err(ScenarioError::UnknownEvent { index: 4, .. })
        ));
    }

    #[test]
    fn invalid_config_reports_every_error() {
        let mut cfg = ScenarioConfig::fan();
        cfg.simulation.acceleration = -1.0;
        cfg.appliances.push(ApplianceConfig {
            uri: "toaster".into(),
            profile: "toaster".into(),
        });
        match Scenario::build(&cfg) {
            Err(ScenarioError::Invalid(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation errors, got {:?}", other.err()),
        }
    }

    #[test]
    fn duplicate_appliance_uri_is_malformed() {
        let mut cfg = ScenarioConfig::fan();
        cfg.appliances.push(ApplianceConfig {
            uri: "fan".into(),
            profile: "vacuum_cleaner".into(),
        });
        assert!(matches!(
            Scenario::build(&cfg),
            Err(ScenarioError::Sim(SimError::MalformedArchitecture(_)))
        ));
    }
}
