//! Mode-driven appliance model.

use std::sync::Arc;

use crate::devices::profiles::ApplianceProfile;
use crate::devices::types::Integrator;
use crate::sim::error::{SimError, SimResult};
use crate::sim::event::Event;
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};
use crate::sim::variable::Variable;

/// An appliance whose behaviour is a finite state machine over modes.
///
/// Commands arrive as external events and change the mode. The power drawn
/// is derived from the mode, and is recomputed by an internal transition
/// scheduled with zero delay right after every mode change, so that the
/// derived value is always re-evaluated at the instant the command takes
/// effect.
///
/// # Parameters
///
/// * `<uri>:power.<MODE>` - Overrides the nominal power of `MODE`, in watts
///
/// # Exported variables
///
/// * `power_w` - Current power in feeder convention
/// * `mode` - Index of the current mode in the profile
#[derive(Debug, Clone)]
pub struct ApplianceModel {
    profile: Arc<ApplianceProfile>,
    uri: String,
    unit: TimeUnit,
    mode: usize,
    mode_power_w: Vec<f64>,
    /// Power set by the profile's power rule, replacing the nominal power
    /// in the modes that rule lists.
    setpoint_w: Option<f64>,
    power_w: f64,
    mode_changed: bool,
    updated_at: Time,
    energy_wh: Integrator,
    mode_changes: usize,
}

impl ApplianceModel {
    pub fn new(profile: impl Into<Arc<ApplianceProfile>>) -> Self {
        let profile = profile.into();
        let unit = TimeUnit::Seconds;
        Self {
            mode: profile.initial_mode(),
            mode_power_w: profile.modes().iter().map(|m| m.power_w).collect(),
            profile,
            uri: String::new(),
            unit,
            setpoint_w: None,
            power_w: 0.0,
            mode_changed: false,
            updated_at: Time::zero(unit),
            energy_wh: Integrator::new(Time::zero(unit), 0.0),
            mode_changes: 0,
        }
    }

    pub fn profile(&self) -> &ApplianceProfile {
        &self.profile
    }

    pub fn mode(&self) -> usize {
        self.mode
    }

    pub fn mode_name(&self) -> &str {
        self.profile.mode_name(self.mode)
    }

    pub fn power_w(&self) -> f64 {
        self.power_w
    }

    /// Energy used so far, in kWh. Negative for net generation.
    pub fn energy_kwh(&self) -> f64 {
        self.energy_wh.total() / 1000.0
    }

    fn power_for(&self, mode: usize) -> f64 {
        match (self.setpoint_w, self.profile.power_rule()) {
            (Some(w), Some(rule)) if rule.modes.contains(&mode) => w,
            _ => self.mode_power_w[mode],
        }
    }

    fn illegal(&self, event: &Event, mode: usize) -> SimError {
        SimError::IllegalTransition {
            model: self.uri.clone(),
            event: event.kind().name().to_string(),
            mode: self.profile.mode_name(mode).to_string(),
        }
    }
}

impl AtomicModel for ApplianceModel {
    fn kind(&self) -> &'static str {
        "Appliance"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        self.uri = ctx.uri.to_string();
        self.unit = ctx.start.unit();
        for (i, spec) in self.profile.modes().iter().enumerate() {
            self.mode_power_w[i] = ctx.real_or(&format!("power.{}", spec.name), spec.power_w)?;
        }
        self.mode = self.profile.initial_mode();
        self.setpoint_w = None;
        self.power_w = self.power_for(self.mode);
        self.mode_changed = false;
        self.updated_at = ctx.start;
        self.energy_wh = Integrator::new(ctx.start, self.power_w);
        self.mode_changes = 0;
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        if self.mode_changed {
            Duration::zero(self.unit)
        } else {
            Duration::infinite(self.unit)
        }
    }

    fn output(&mut self, _ctx: &TransitionContext<'_>) -> Vec<Event> {
        Vec::new()
    }

    fn internal_transition(
        &mut self,
        _elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        self.energy_wh.advance(ctx.now());
        self.power_w = self.power_for(self.mode);
        self.energy_wh.set(self.power_w);
        self.updated_at = ctx.now();
        self.mode_changed = false;
        Ok(())
    }

    /// Applies the whole bag or nothing: the events are checked against a
    /// scratch copy of the mode first.
    fn external_transition(
        &mut self,
        _elapsed: Duration,
        events: &[Event],
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        let mut mode = self.mode;
        let mut setpoint = self.setpoint_w;
        let mut changes = 0;
        for event in events {
            if let Some(rule) = self
                .profile
                .power_rule()
                .filter(|r| r.event.name() == event.kind().name())
            {
                if !rule.modes.contains(&mode) {
                    return Err(self.illegal(event, mode));
                }
                let watts = event
                    .content()
                    .and_then(|c| c.as_real())
                    .filter(|w| (0.0..=rule.max_w).contains(w))
                    .ok_or_else(|| SimError::InvalidParameter {
                        name: format!("{}:{}", self.uri, event.kind()),
                        message: format!("expected a power within [0, {}] W", rule.max_w),
                    })?;
                setpoint = Some(watts);
                continue;
            }
            let rule = self.profile.rule_for(event.kind()).ok_or_else(|| {
                SimError::UnexpectedEvent {
                    model: self.uri.clone(),
                    event: event.kind().name().to_string(),
                }
            })?;
            if !rule.from.contains(&mode) {
                return Err(self.illegal(event, mode));
            }
            if rule.to != mode {
                changes += 1;
            }
            mode = rule.to;
        }

        self.energy_wh.advance(ctx.now());
        self.mode = mode;
        self.setpoint_w = setpoint;
        self.mode_changes += changes;
        self.updated_at = ctx.now();
        self.mode_changed = true;
        Ok(())
    }

    fn max_inputs_per_transition(&self) -> usize {
        self.profile.max_inputs()
    }

    fn variables(&self) -> Vec<Variable> {
        vec![
            Variable::new("power_w", self.power_w, self.updated_at),
            Variable::new("mode", self.mode as f64, self.updated_at),
        ]
    }

    fn end_simulation(&mut self, end: Time) -> ModelReport {
        self.energy_wh.advance(end);
        ModelReport::new(&self.uri, self.profile.name())
            .metric("energy_kwh", self.energy_kwh())
            .metric("mode_changes", self.mode_changes as f64)
            .metric("mean_power_w", self.energy_wh.mean())
            .label("final_mode", self.mode_name())
    }
}
