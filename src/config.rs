//! Scenario configuration loaded from TOML files or built-in presets.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::devices::profiles;
use crate::sim::time::TimeUnit;

/// Top-level scenario configuration.
///
/// Every section has defaults, so a scenario file only lists what it
/// changes. Unknown fields are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Run parameter overrides keyed `"<model-uri>:<name>"`.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterConfig>,
    /// Custom appliance profiles, usable by name in `appliances`.
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
    #[serde(default)]
    pub appliances: Vec<ApplianceConfig>,
    #[serde(default)]
    pub injections: Vec<InjectionConfig>,
    #[serde(default)]
    pub water_heater: Option<WaterHeaterConfig>,
    #[serde(default)]
    pub wind: Option<WindConfig>,
    #[serde(default)]
    pub control: ControlConfig,
}

/// Run mode of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// As fast as possible.
    #[default]
    Simulated,
    /// Paced against the wall clock.
    Realtime,
}

/// Simulation clock and pacing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Unit of `start`, `end` and injection times.
    pub time_unit: TimeUnit,
    pub start: f64,
    pub end: f64,
    pub mode: RunMode,
    /// Simulated time per wall-clock time in real-time mode.
    pub acceleration: f64,
    /// Lateness tolerated before a real-time step counts as lagging (ms).
    pub lag_tolerance_ms: u64,
    /// Random seed for stochastic models.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::Seconds,
            start: 0.0,
            end: 3600.0,
            mode: RunMode::Simulated,
            acceleration: 1.0,
            lag_tolerance_ms: 50,
            seed: 42,
        }
    }
}

/// A run parameter value as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterConfig {
    Real(f64),
    Text(String),
}

/// One appliance instance at the top level of the scenario.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplianceConfig {
    pub uri: String,
    /// Built-in profile name or the name of a custom `[[profiles]]` entry.
    pub profile: String,
}

/// A custom appliance profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    pub modes: Vec<ModeConfig>,
    /// Starting mode (defaults to the first one).
    #[serde(default)]
    pub initial: Option<String>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
    /// Largest bag of coincident events accepted (unbounded when absent).
    #[serde(default)]
    pub max_inputs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    pub name: String,
    pub power_w: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionConfig {
    pub event: String,
    /// Lower values are applied first among coincident events.
    #[serde(default)]
    pub priority: u8,
    pub from: Vec<String>,
    pub to: String,
}

/// An external event scheduled before the run starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionConfig {
    /// Delivery time, in `simulation.time_unit`.
    pub at: f64,
    pub target: String,
    pub event: String,
    /// Real payload, e.g. watts for `SetPower`.
    #[serde(default)]
    pub value: Option<f64>,
}

/// Thermostat-controlled water heater: element, tank and thermostat.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaterHeaterConfig {
    /// Thermostat switches the element on below this temperature (°C).
    pub low_c: f64,
    /// Thermostat switches the element off above this temperature (°C).
    pub high_c: f64,
    /// Thermostat sampling period in seconds.
    pub period_s: f64,
    pub volume_l: f64,
    pub initial_c: f64,
    pub ambient_c: f64,
}

impl Default for WaterHeaterConfig {
    fn default() -> Self {
        Self {
            low_c: 50.0,
            high_c: 60.0,
            period_s: 60.0,
            volume_l: 150.0,
            initial_c: 45.0,
            ambient_c: 20.0,
        }
    }
}

/// Wind turbine with a cut-in controller charging a battery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindConfig {
    /// Turbine parks below this wind speed (m/s).
    pub cut_out_ms: f64,
    /// Turbine starts generating above this wind speed (m/s).
    pub cut_in_ms: f64,
    pub mean_ms: f64,
    pub period_s: f64,
    pub battery_capacity_kwh: f64,
    pub battery_initial_soc: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            cut_out_ms: 3.0,
            cut_in_ms: 4.0,
            mean_ms: 7.0,
            period_s: 60.0,
            battery_capacity_kwh: 10.0,
            battery_initial_soc: 0.5,
        }
    }
}

/// Controllers running outside the model tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    /// Drive the thermostat and cut-in control from host threads through
    /// the scheduler handle instead of in-model controllers. Real-time only.
    pub external: bool,
    /// Wall-clock polling period of external loops (ms).
    pub poll_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            external: false,
            poll_ms: 100,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.end"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ScenarioConfig {
    /// A fan switched on, turned up, and switched off within an hour.
    pub fn fan() -> Self {
        Self {
            appliances: vec![ApplianceConfig {
                uri: "fan".into(),
                profile: "fan".into(),
            }],
            injections: vec![
                injection(0.0, "fan", "SwitchOn"),
                injection(600.0, "fan", "SetHigh"),
                injection(1200.0, "fan", "SetLow"),
                injection(1800.0, "fan", "SwitchOff"),
            ],
            ..Self::default()
        }
    }

    /// A thermostat holding a water tank between 50 and 60 °C for a day,
    /// next to a hair dryer used in the morning.
    pub fn water_heater() -> Self {
        Self {
            simulation: SimulationConfig {
                end: 86_400.0,
                ..SimulationConfig::default()
            },
            appliances: vec![ApplianceConfig {
                uri: "hair-dryer".into(),
                profile: "hair_dryer".into(),
            }],
            injections: vec![
                injection(25_200.0, "hair-dryer", "SwitchOn"),
                injection(25_500.0, "hair-dryer", "SwitchOff"),
            ],
            water_heater: Some(WaterHeaterConfig::default()),
            ..Self::default()
        }
    }

    /// A wind turbine with cut-in control charging a battery for a day.
    pub fn wind() -> Self {
        Self {
            simulation: SimulationConfig {
                end: 86_400.0,
                ..SimulationConfig::default()
            },
            wind: Some(WindConfig::default()),
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["fan", "water_heater", "wind"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "fan" => Ok(Self::fan()),
            "water_heater" => Ok(Self::water_heater()),
            "wind" => Ok(Self::wind()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Whether `name` names a built-in or custom profile.
    pub fn has_profile(&self, name: &str) -> bool {
        profiles::BUILTIN.contains(&name) || self.profiles.iter().any(|p| p.name == name)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Structural checks
    /// of the model tree (URIs, couplings) happen when the architecture is
    /// built.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut error = |field: String, message: String| {
            errors.push(ConfigError { field, message });
        };
        let s = &self.simulation;

        if !s.start.is_finite() {
            error("simulation.start".into(), "must be finite".into());
        }
        if !s.end.is_finite() || s.end < s.start {
            error(
                "simulation.end".into(),
                "must be finite and >= simulation.start".into(),
            );
        }
        if !(s.acceleration.is_finite() && s.acceleration > 0.0) {
            error("simulation.acceleration".into(), "must be > 0".into());
        }
        if self.control.external && s.mode != RunMode::Realtime {
            error(
                "control.external".into(),
                "requires simulation.mode = \"realtime\"".into(),
            );
        }
        if self.control.poll_ms == 0 {
            error("control.poll_ms".into(), "must be > 0".into());
        }

        for (i, p) in self.profiles.iter().enumerate() {
            if profiles::BUILTIN.contains(&p.name.as_str()) {
                error(
                    format!("profiles[{i}].name"),
                    format!("\"{}\" shadows a built-in profile", p.name),
                );
            }
            if p.modes.is_empty() {
                error(format!("profiles[{i}].modes"), "must not be empty".into());
            }
        }
        for (i, a) in self.appliances.iter().enumerate() {
            if !self.has_profile(&a.profile) {
                error(
                    format!("appliances[{i}].profile"),
                    format!("unknown profile \"{}\"", a.profile),
                );
            }
        }
        for (i, inj) in self.injections.iter().enumerate() {
            if !inj.at.is_finite() || inj.at < s.start {
                error(
                    format!("injections[{i}].at"),
                    "must be finite and >= simulation.start".into(),
                );
            }
        }

        if let Some(wh) = &self.water_heater {
            if wh.low_c > wh.high_c {
                error("water_heater.low_c".into(), "must be <= water_heater.high_c".into());
            }
            if wh.period_s <= 0.0 {
                error("water_heater.period_s".into(), "must be > 0".into());
            }
            if wh.volume_l <= 0.0 {
                error("water_heater.volume_l".into(), "must be > 0".into());
            }
        }
        if let Some(w) = &self.wind {
            if w.cut_out_ms > w.cut_in_ms {
                error("wind.cut_out_ms".into(), "must be <= wind.cut_in_ms".into());
            }
            if w.period_s <= 0.0 {
                error("wind.period_s".into(), "must be > 0".into());
            }
            if w.battery_capacity_kwh <= 0.0 {
                error("wind.battery_capacity_kwh".into(), "must be > 0".into());
            }
            if !(0.0..=1.0).contains(&w.battery_initial_soc) {
                error("wind.battery_initial_soc".into(), "must be in [0.0, 1.0]".into());
            }
        }

        errors
    }
}

fn injection(at: f64, target: &str, event: &str) -> InjectionConfig {
    InjectionConfig {
        at,
        target: target.into(),
        event: event.into(),
        value: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let errors = ScenarioConfig::default().validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let e = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
time_unit = "minutes"
start = 0.0
end = 120.0
mode = "realtime"
acceleration = 600.0
seed = 7

[parameters]
"fan:power.LOW" = 25.0
"tank:label" = "attic"

[[profiles]]
name = "kettle"
initial = "IDLE"
max_inputs = 1
modes = [{ name = "IDLE", power_w = 0.0 }, { name = "BOILING", power_w = 2200.0 }]
transitions = [
    { event = "Boil", priority = 0, from = ["IDLE"], to = "BOILING" },
    { event = "Done", priority = 1, from = ["BOILING"], to = "IDLE" },
]

[[appliances]]
uri = "fan"
profile = "fan"

[[appliances]]
uri = "kettle"
profile = "kettle"

[[injections]]
at = 5.0
target = "kettle"
event = "Boil"

[water_heater]
low_c = 55.0

[control]
external = true
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.ok();
        assert_eq!(
            cfg.as_ref().map(|c| c.simulation.time_unit),
            Some(TimeUnit::Minutes)
        );
        assert_eq!(
            cfg.as_ref().map(|c| c.simulation.mode),
            Some(RunMode::Realtime)
        );
        assert_eq!(
            cfg.as_ref().and_then(|c| c.parameters.get("fan:power.LOW").cloned()),
            Some(ParameterConfig::Real(25.0))
        );
        assert_eq!(
            cfg.as_ref().and_then(|c| c.parameters.get("tank:label").cloned()),
            Some(ParameterConfig::Text("attic".into()))
        );
        assert_eq!(
            cfg.as_ref().and_then(|c| c.water_heater.as_ref().map(|w| w.low_c)),
            Some(55.0)
        );
        // unspecified water heater fields keep their defaults
        assert_eq!(
            cfg.as_ref().and_then(|c| c.water_heater.as_ref().map(|w| w.high_c)),
            Some(60.0)
        );
        let errors = cfg.map(|c| c.validate()).unwrap_or_default();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
end = 10.0
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_time_unit_is_rejected() {
        let toml = r#"
[simulation]
time_unit = "fortnights"
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_end_before_start() {
        let mut cfg = ScenarioConfig::fan();
        cfg.simulation.start = 100.0;
        cfg.simulation.end = 10.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.end"));
    }

    #[test]
    fn validation_catches_zero_acceleration() {
        let mut cfg = ScenarioConfig::fan();
        cfg.simulation.acceleration = 0.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.acceleration"));
    }

    #[test]
    fn validation_catches_unknown_profile() {
        let mut cfg = ScenarioConfig::fan();
        cfg.appliances[0].profile = "toaster".into();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "appliances[0].profile"));
    }

    #[test]
    fn validation_catches_injection_before_start() {
        let mut cfg = ScenarioConfig::fan();
        cfg.simulation.start = 10.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "injections[0].at"));
    }

    #[test]
    fn validation_catches_inverted_thermostat_band() {
        let mut cfg = ScenarioConfig::water_heater();
        if let Some(wh) = cfg.water_heater.as_mut() {
            wh.low_c = 70.0;
        }
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "water_heater.low_c"));
    }

    #[test]
    fn external_control_requires_realtime() {
        let mut cfg = ScenarioConfig::wind();
        cfg.control.external = true;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "control.external"));
        cfg.simulation.mode = RunMode::Realtime;
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
[simulation]
seed = 99
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok());
        let cfg = cfg.ok();
        // seed overridden
        assert_eq!(cfg.as_ref().map(|c| c.simulation.seed), Some(99));
        // end kept default
        assert_eq!(cfg.as_ref().map(|c| c.simulation.end), Some(3600.0));
        assert!(cfg.as_ref().is_some_and(|c| c.wind.is_none()));
    }
}
