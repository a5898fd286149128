//! Appliance profiles: the mode state machine and power draw of an
//! appliance type.
//!
//! Power follows the feeder convention used throughout the crate: positive
//! values are consumption, negative values are generation.

use crate::sim::error::{SimError, SimResult};
use crate::sim::event::EventKind;

pub const SWITCH_ON: EventKind = EventKind::new("SwitchOn", 0);
pub const SET_HIGH: EventKind = EventKind::new("SetHigh", 1);
pub const SET_LOW: EventKind = EventKind::new("SetLow", 1);
/// Carries the requested power in watts as real content.
pub const SET_POWER: EventKind = EventKind::new("SetPower", 1);
/// Applied last, so a coincident switch-off always wins.
pub const SWITCH_OFF: EventKind = EventKind::new("SwitchOff", 2);

pub const FAN_OFF: usize = 0;
pub const FAN_LOW: usize = 1;
pub const FAN_HIGH: usize = 2;
pub const FAN_LOW_POWER_W: f64 = 30.0;
pub const FAN_HIGH_POWER_W: f64 = 60.0;

pub const HEATER_OFF: usize = 0;
pub const HEATER_HEATING: usize = 1;
pub const HEATER_POWER_W: f64 = 2000.0;

pub const TURBINE_PARKED: usize = 0;
pub const TURBINE_GENERATING: usize = 1;
pub const TURBINE_POWER_W: f64 = -1500.0;

/// Names of the built-in profiles, as accepted by [`builtin`].
pub const BUILTIN: [&str; 5] = ["fan", "hair_dryer", "vacuum_cleaner", "water_heater", "wind_turbine"];

#[derive(Debug, Clone, PartialEq)]
pub struct ModeSpec {
    pub name: String,
    /// Nominal power in this mode, watts.
    pub power_w: f64,
}

/// An event that moves the appliance from any of `from` to `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRule {
    pub event: EventKind,
    pub from: Vec<usize>,
    pub to: usize,
}

/// An event that sets the power drawn in the listed modes.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerRule {
    pub event: EventKind,
    pub modes: Vec<usize>,
    pub max_w: f64,
}

/// Describes one appliance type.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceProfile {
    name: String,
    modes: Vec<ModeSpec>,
    initial: usize,
    transitions: Vec<TransitionRule>,
    power_rule: Option<PowerRule>,
    max_inputs: usize,
}

impl ApplianceProfile {
    pub fn builder(name: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder {
            name: name.into(),
            modes: Vec::new(),
            initial: None,
            transitions: Vec::new(),
            power_rule: None,
            max_inputs: usize::MAX,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modes(&self) -> &[ModeSpec] {
        &self.modes
    }

    pub fn initial_mode(&self) -> usize {
        self.initial
    }

    pub fn mode_name(&self, mode: usize) -> &str {
        self.modes.get(mode).map_or("?", |m| m.name.as_str())
    }

    pub fn mode_index(&self, name: &str) -> Option<usize> {
        self.modes.iter().position(|m| m.name == name)
    }

    /// Rule triggered by an event kind, matched by name.
    pub fn rule_for(&self, kind: &EventKind) -> Option<&TransitionRule> {
        self.transitions
            .iter()
            .find(|r| r.event.name() == kind.name())
    }

    pub fn power_rule(&self) -> Option<&PowerRule> {
        self.power_rule.as_ref()
    }

    pub fn max_inputs(&self) -> usize {
        self.max_inputs
    }

    /// Every event kind the appliance accepts.
    pub fn event_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.transitions.iter().map(|r| r.event.clone()).collect();
        if let Some(p) = &self.power_rule {
            kinds.push(p.event.clone());
        }
        kinds.dedup_by(|a, b| a.name() == b.name());
        kinds
    }
}

/// Builds a profile from mode names, checking every reference.
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    name: String,
    modes: Vec<ModeSpec>,
    initial: Option<String>,
    transitions: Vec<(EventKind, Vec<String>, String)>,
    power_rule: Option<(EventKind, Vec<String>, f64)>,
    max_inputs: usize,
}

impl ProfileBuilder {
    pub fn mode(mut self, name: &str, power_w: f64) -> Self {
        self.modes.push(ModeSpec {
            name: name.to_string(),
            power_w,
        });
        self
    }

    /// Starting mode; defaults to the first declared mode.
    pub fn initial(mut self, name: &str) -> Self {
        self.initial = Some(name.to_string());
        self
    }

    pub fn transition(mut self, event: EventKind, from: &[&str], to: &str) -> Self {
        self.transitions.push((
            event,
            from.iter().map(|s| s.to_string()).collect(),
            to.to_string(),
        ));
        self
    }

    pub fn power_rule(mut self, event: EventKind, modes: &[&str], max_w: f64) -> Self {
        self.power_rule = Some((event, modes.iter().map(|s| s.to_string()).collect(), max_w));
        self
    }

    /// Largest bag of coincident events the appliance accepts.
    pub fn max_inputs(mut self, max: usize) -> Self {
        self.max_inputs = max;
        self
    }

    pub fn build(self) -> SimResult<ApplianceProfile> {
        let invalid = |message: String| SimError::InvalidParameter {
            name: format!("profile {}", self.name),
            message,
        };
        if self.modes.is_empty() {
            return Err(invalid("at least one mode is required".into()));
        }
        for (i, m) in self.modes.iter().enumerate() {
            if !m.power_w.is_finite() {
                return Err(invalid(format!("mode {} has non-finite power", m.name)));
            }
            if self.modes[..i].iter().any(|o| o.name == m.name) {
                return Err(invalid(format!("duplicate mode {}", m.name)));
            }
        }
        let index = |name: &str| {
            self.modes
                .iter()
                .position(|m| m.name == name)
                .ok_or_else(|| invalid(format!("unknown mode {name}")))
        };

        let initial = match &self.initial {
            Some(name) => index(name.as_str())?,
            None => 0,
        };
        let mut transitions = Vec::with_capacity(self.transitions.len());
        for (event, from, to) in &self.transitions {
            if transitions
                .iter()
                .any(|r: &TransitionRule| r.event.name() == event.name())
            {
                return Err(invalid(format!("event {event} has more than one rule")));
            }
            transitions.push(TransitionRule {
                event: event.clone(),
                from: from.iter().map(|f| index(f.as_str())).collect::<SimResult<_>>()?,
                to: index(to.as_str())?,
            });
        }
        let power_rule = match &self.power_rule {
            Some((event, modes, max_w)) => {
                if transitions.iter().any(|r| r.event.name() == event.name()) {
                    return Err(invalid(format!("event {event} has more than one rule")));
                }
                if !(max_w.is_finite() && *max_w > 0.0) {
                    return Err(invalid(format!("power limit must be positive, got {max_w}")));
                }
                Some(PowerRule {
                    event: event.clone(),
                    modes: modes.iter().map(|m| index(m.as_str())).collect::<SimResult<_>>()?,
                    max_w: *max_w,
                })
            }
            None => None,
        };
        if self.max_inputs == 0 {
            return Err(invalid("max_inputs must be at least 1".into()));
        }

        Ok(ApplianceProfile {
            name: self.name.clone(),
            modes: self.modes.clone(),
            initial,
            transitions,
            power_rule,
            max_inputs: self.max_inputs,
        })
    }
}

fn three_speed(name: &str, low_w: f64, high_w: f64) -> ProfileBuilder {
    ApplianceProfile::builder(name)
        .mode("OFF", 0.0)
        .mode("LOW", low_w)
        .mode("HIGH", high_w)
        .transition(SWITCH_ON, &["OFF"], "LOW")
        .transition(SET_HIGH, &["LOW"], "HIGH")
        .transition(SET_LOW, &["HIGH"], "LOW")
        .transition(SWITCH_OFF, &["LOW", "HIGH"], "OFF")
}

/// Looks up a built-in profile by name.
pub fn builtin(name: &str) -> Option<ApplianceProfile> {
    let builder = match name {
        "fan" => three_speed("Fan", FAN_LOW_POWER_W, FAN_HIGH_POWER_W),
        "hair_dryer" => three_speed("HairDryer", 660.0, 1100.0).max_inputs(1),
        "vacuum_cleaner" => three_speed("VacuumCleaner", 650.0, 1200.0),
        "water_heater" => ApplianceProfile::builder("WaterHeater")
            .mode("OFF", 0.0)
            .mode("HEATING", HEATER_POWER_W)
            .transition(SWITCH_ON, &["OFF"], "HEATING")
            .transition(SWITCH_OFF, &["HEATING"], "OFF")
            .power_rule(SET_POWER, &["HEATING"], 3000.0),
        "wind_turbine" => ApplianceProfile::builder("WindTurbine")
            .mode("PARKED", 0.0)
            .mode("GENERATING", TURBINE_POWER_W)
            .transition(SWITCH_ON, &["PARKED"], "GENERATING")
            .transition(SWITCH_OFF, &["GENERATING"], "PARKED"),
        _ => return None,
    };
    builder.build().ok()
}

fn builtin_or_empty(name: &str) -> ApplianceProfile {
    builtin(name).unwrap_or_else(|| ApplianceProfile {
        name: name.to_string(),
        modes: vec![ModeSpec {
            name: "OFF".into(),
            power_w: 0.0,
        }],
        initial: 0,
        transitions: Vec::new(),
        power_rule: None,
        max_inputs: usize::MAX,
    })
}

/// OFF, LOW (30 W) and HIGH (60 W).
pub fn fan_profile() -> ApplianceProfile {
    builtin_or_empty("fan")
}

/// A single heating element: OFF or HEATING, with a settable power.
pub fn water_heater_profile() -> ApplianceProfile {
    builtin_or_empty("water_heater")
}

pub fn wind_turbine_profile() -> ApplianceProfile {
    builtin_or_empty("wind_turbine")
}
