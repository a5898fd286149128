//! Wind speed with temporally correlated gusts (AR(1) process).

use rand::{SeedableRng, rngs::StdRng};

use crate::devices::types::{Integrator, gaussian_noise, positive};
use crate::sim::error::{SimError, SimResult};
use crate::sim::event::Event;
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};
use crate::sim::variable::Variable;

/// Wind speed sensor signal evolving as a seeded AR(1) process.
///
/// The speed evolves every step as:
/// ```text
/// v(t) = alpha * v(t-1) + (1 - alpha) * (mean + epsilon(t))
/// ```
/// where `epsilon` is Gaussian noise and `alpha` controls temporal
/// correlation. The speed is clamped to `[0, max]`.
///
/// # Parameters
///
/// * `<uri>:mean_ms` - Long-run mean speed (default 7 m/s)
/// * `<uri>:alpha` - Correlation coefficient (default 0.9)
/// * `<uri>:noise_std` - Innovation noise standard deviation (default 6 m/s)
/// * `<uri>:max_ms` - Upper clamp (default 30 m/s)
/// * `<uri>:step_s` - Sampling step in seconds (default 60)
/// * `<uri>:seed` - Random seed (default 0)
#[derive(Debug, Clone)]
pub struct WindSpeedModel {
    uri: String,
    mean_ms: f64,
    alpha: f64,
    noise_std: f64,
    max_ms: f64,
    step: Duration,
    speed_ms: f64,
    peak_ms: f64,
    history: Integrator,
    updated_at: Time,
    rng: StdRng,
}

impl Default for WindSpeedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WindSpeedModel {
    pub fn new() -> Self {
        let start = Time::zero(TimeUnit::Seconds);
        Self {
            uri: String::new(),
            mean_ms: 7.0,
            alpha: 0.9,
            noise_std: 6.0,
            max_ms: 30.0,
            step: Duration::new(60.0, TimeUnit::Seconds),
            speed_ms: 7.0,
            peak_ms: 7.0,
            history: Integrator::new(start, 7.0),
            updated_at: start,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn speed_ms(&self) -> f64 {
        self.speed_ms
    }

    /// Advances the AR(1) speed by one step and returns the new value.
    fn advance_speed(&mut self) -> f64 {
        let epsilon = gaussian_noise(&mut self.rng, self.noise_std);
        self.speed_ms = self.alpha * self.speed_ms + (1.0 - self.alpha) * (self.mean_ms + epsilon);
        self.speed_ms = self.speed_ms.clamp(0.0, self.max_ms);
        self.speed_ms
    }
}

impl AtomicModel for WindSpeedModel {
    fn kind(&self) -> &'static str {
        "WindSpeed"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        self.uri = ctx.uri.to_string();
        self.mean_ms = ctx.real_or("mean_ms", 7.0)?.max(0.0);
        self.alpha = ctx.real_or("alpha", 0.9)?.clamp(0.0, 1.0);
        self.noise_std = ctx.real_or("noise_std", 6.0)?.max(0.0);
        self.max_ms = positive(ctx.uri, "max_ms", ctx.real_or("max_ms", 30.0)?)?;
        let step_s = positive(ctx.uri, "step_s", ctx.real_or("step_s", 60.0)?)?;
        self.step = Duration::new(step_s, TimeUnit::Seconds).to_unit(ctx.start.unit());
        let seed = ctx.real_or("seed", 0.0)?;
        if !(seed.is_finite() && seed >= 0.0) {
            return Err(SimError::InvalidParameter {
                name: format!("{}:seed", ctx.uri),
                message: format!("must be a non-negative integer, got {seed}"),
            });
        }
        self.rng = StdRng::seed_from_u64(seed as u64);
        self.speed_ms = self.mean_ms.min(self.max_ms);
        self.peak_ms = self.speed_ms;
        self.history = Integrator::new(ctx.start, self.speed_ms);
        self.updated_at = ctx.start;
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        self.step
    }

    fn output(&mut self, _ctx: &TransitionContext<'_>) -> Vec<Event> {
        Vec::new()
    }

    fn internal_transition(
        &mut self,
        _elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        self.history.advance(ctx.now());
        let v = self.advance_speed();
        self.peak_ms = self.peak_ms.max(v);
        self.history.set(v);
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
        vec![Variable::new("wind_speed_ms", self.speed_ms, self.updated_at)]
    }

    fn end_simulation(&mut self, end: Time) -> ModelReport {
        self.history.advance(end);
        ModelReport::new(&self.uri, self.kind())
            .metric("mean_wind_speed_ms", self.history.mean())
            .metric("max_wind_speed_ms", self.peak_ms)
    }
}
