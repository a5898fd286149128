//! Sampling hysteresis controller living inside the model tree.

use crate::control::{ControlAction, HysteresisController, HysteresisMode};
use crate::devices::types::positive;
use crate::sim::error::{SimError, SimResult};
use crate::sim::event::{Event, EventKind};
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};
use crate::sim::variable::Variable;

/// Samples the variable bound under `sensor` every period and emits
/// `on_event` / `off_event` when the hysteresis decision changes.
///
/// The decision is computed in `output` and committed by the following
/// internal transition.
///
/// # Parameters
///
/// * `<uri>:low` / `<uri>:high` - Hysteresis band (required)
/// * `<uri>:period_s` - Sampling period in seconds (default 60)
/// * `<uri>:initially_on` - 1 if the actuator starts on (default 0)
#[derive(Debug, Clone)]
pub struct ThresholdControllerModel {
    uri: String,
    mode: HysteresisMode,
    on_event: EventKind,
    off_event: EventKind,
    controller: HysteresisController,
    period: Duration,
    decided: ControlAction,
    commands: usize,
    updated_at: Time,
}

impl ThresholdControllerModel {
    pub fn new(mode: HysteresisMode, on_event: EventKind, off_event: EventKind) -> Self {
        Self {
            uri: String::new(),
            mode,
            on_event,
            off_event,
            controller: HysteresisController::new(0.0, 0.0, mode, false),
            period: Duration::new(60.0, TimeUnit::Seconds),
            decided: ControlAction::Hold,
            commands: 0,
            updated_at: Time::zero(TimeUnit::Seconds),
        }
    }
}

impl AtomicModel for ThresholdControllerModel {
    fn kind(&self) -> &'static str {
        "ThresholdController"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        self.uri = ctx.uri.to_string();
        let low = ctx.required_real("low")?;
        let high = ctx.required_real("high")?;
        if low.is_nan() || high.is_nan() || low > high {
            return Err(SimError::InvalidParameter {
                name: format!("{}:low", ctx.uri),
                message: format!("band must satisfy low <= high, got [{low}, {high}]"),
            });
        }
        let initially_on = ctx.real_or("initially_on", 0.0)? != 0.0;
        self.controller = HysteresisController::new(low, high, self.mode, initially_on);
        let period_s = positive(ctx.uri, "period_s", ctx.real_or("period_s", 60.0)?)?;
        self.period = Duration::new(period_s, TimeUnit::Seconds).to_unit(ctx.start.unit());
        self.decided = ControlAction::Hold;
        self.commands = 0;
        self.updated_at = ctx.start;
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        self.period
    }

    fn output(&mut self, ctx: &TransitionContext<'_>) -> Vec<Event> {
        // An unbound or unpublished sensor reads as no decision.
        self.decided = match ctx.import_value("sensor") {
            Ok(value) => self.controller.decide(value),
            Err(_) => ControlAction::Hold,
        };
        match self.decided {
            ControlAction::TurnOn => vec![Event::new(self.on_event.clone(), ctx.now())],
            ControlAction::TurnOff => vec![Event::new(self.off_event.clone(), ctx.now())],
            ControlAction::Hold => Vec::new(),
        }
    }

    fn internal_transition(
        &mut self,
        _elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        if self.decided != ControlAction::Hold {
            self.commands += 1;
        }
        self.controller.commit(self.decided);
        self.decided = ControlAction::Hold;
        self.updated_at = ctx.now();
        Ok(())
    }

    fn external_transition(
        &mut self,
        _elapsed: Duration,
        events: &[Event],
        _ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        Err(SimError::UnexpectedEvent {
            model: self.uri.clone(),
            event: events
                .first()
                .map(|e| e.kind().name().to_string())
                .unwrap_or_default(),
        })
    }

    fn variables(&self) -> Vec<Variable> {
        let on = if self.controller.is_on() { 1.0 } else { 0.0 };
        vec![Variable::new("actuator_on", on, self.updated_at)]
    }

    fn end_simulation(&mut self, _end: Time) -> ModelReport {
        ModelReport::new(&self.uri, self.kind()).metric("commands", self.commands as f64)
    }
}
