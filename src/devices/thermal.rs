//! Hot-water tank temperature integrated with an explicit Euler scheme.

use crate::devices::types::{Integrator, positive};
use crate::sim::error::{SimError, SimResult};
use crate::sim::event::Event;
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};
use crate::sim::variable::Variable;

/// Specific heat of water, J/(kg·K).
const WATER_HEAT_CAPACITY: f64 = 4186.0;

/// Temperature of a water tank heated by a bound power source and losing
/// heat to its surroundings.
///
/// The temperature evolves as:
/// ```text
/// C dT/dt = P_heat - k (T - T_ambient)
/// ```
/// where `C` is the heat capacity of the water and `k` the loss
/// coefficient. Each internal transition advances one fixed integration
/// step with the heating power sampled at the start of that step, then
/// samples `heating_power` for the next one. Before the first sample the
/// tank is unheated.
///
/// # Parameters
///
/// * `<uri>:volume_l` - Tank volume in litres (default 150)
/// * `<uri>:ambient_c` - Surrounding temperature (default 20 °C)
/// * `<uri>:initial_c` - Starting water temperature (default 15 °C)
/// * `<uri>:loss_w_per_k` - Heat loss coefficient (default 2 W/K)
/// * `<uri>:step_s` - Integration step in seconds (default 60)
#[derive(Debug, Clone)]
pub struct ThermalModel {
    uri: String,
    heat_capacity_j_per_k: f64,
    ambient_c: f64,
    loss_w_per_k: f64,
    step: Duration,
    /// Heating power held over the current step.
    heating_w: f64,
    temperature_c: f64,
    max_temperature_c: f64,
    updated_at: Time,
    history: Integrator,
}

impl Default for ThermalModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalModel {
    pub fn new() -> Self {
        let start = Time::zero(TimeUnit::Seconds);
        Self {
            uri: String::new(),
            heat_capacity_j_per_k: 150.0 * WATER_HEAT_CAPACITY,
            ambient_c: 20.0,
            loss_w_per_k: 2.0,
            step: Duration::new(60.0, TimeUnit::Seconds),
            heating_w: 0.0,
            temperature_c: 15.0,
            max_temperature_c: 15.0,
            updated_at: start,
            history: Integrator::new(start, 15.0),
        }
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    /// Temperature change rate in K/s for a given heating power.
    fn rate(&self, heating_w: f64) -> f64 {
        (heating_w - self.loss_w_per_k * (self.temperature_c - self.ambient_c))
            / self.heat_capacity_j_per_k
    }
}

impl AtomicModel for ThermalModel {
    fn kind(&self) -> &'static str {
        "Thermal"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        self.uri = ctx.uri.to_string();
        let volume = positive(ctx.uri, "volume_l", ctx.real_or("volume_l", 150.0)?)?;
        self.heat_capacity_j_per_k = volume * WATER_HEAT_CAPACITY;
        self.ambient_c = ctx.real_or("ambient_c", 20.0)?;
        self.loss_w_per_k = ctx.real_or("loss_w_per_k", 2.0)?;
        if self.loss_w_per_k < 0.0 {
            return Err(SimError::InvalidParameter {
                name: format!("{}:loss_w_per_k", ctx.uri),
                message: "must not be negative".into(),
            });
        }
        let step_s = positive(ctx.uri, "step_s", ctx.real_or("step_s", 60.0)?)?;
        self.step = Duration::new(step_s, TimeUnit::Seconds).to_unit(ctx.start.unit());
        self.heating_w = 0.0;
        self.temperature_c = ctx.real_or("initial_c", 15.0)?;
        self.max_temperature_c = self.temperature_c;
        self.updated_at = ctx.start;
        self.history = Integrator::new(ctx.start, self.temperature_c);
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
        elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        let sampled_w = if ctx.is_bound("heating_power") {
            ctx.import_value("heating_power")?
        } else {
            0.0
        };
        self.history.advance(ctx.now());
        self.temperature_c += elapsed.as_seconds() * self.rate(self.heating_w);
        self.heating_w = sampled_w;
        self.max_temperature_c = self.max_temperature_c.max(self.temperature_c);
        self.history.set(self.temperature_c);
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
        vec![Variable::new("temperature_c", self.temperature_c, self.updated_at)]
    }

    fn end_simulation(&mut self, end: Time) -> ModelReport {
        self.history.advance(end);
        ModelReport::new(&self.uri, self.kind())
            .metric("final_temperature_c", self.temperature_c)
            .metric("mean_temperature_c", self.history.mean())
            .metric("max_temperature_c", self.max_temperature_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::params::RunParameters;
    use crate::sim::variable::{StateBoard, VariableKey};

    fn secs(v: f64) -> Time {
        Time::new(v, TimeUnit::Seconds)
    }

    fn tank(params: &RunParameters) -> SimResult<ThermalModel> {
        let mut t = ThermalModel::new();
        t.initialise(&InitContext {
            uri: "tank",
            start: secs(0.0),
            params,
        })?;
        Ok(t)
    }

    fn heater_imports() -> Vec<(String, VariableKey)> {
        vec![(
            "heating_power".to_string(),
            VariableKey::new("heater", "power_w"),
        )]
    }

    fn lossless_tank() -> ThermalModel {
        let mut params = RunParameters::new();
        params
            .set_real("tank", "volume_l", 100.0)
            .set_real("tank", "loss_w_per_k", 0.0)
            .set_real("tank", "initial_c", 20.0);
        tank(&params).expect("tank")
    }

    fn step_at(t: &mut ThermalModel, board: &StateBoard, at: f64, elapsed: f64) {
        let imports = heater_imports();
        let ctx = TransitionContext::new("tank", secs(at), board, &imports);
        t.internal_transition(Duration::new(elapsed, TimeUnit::Seconds), &ctx)
            .expect("step");
    }

    #[test]
    fn heats_with_bound_power() {
        let mut t = lossless_tank();
        let mut board = StateBoard::new(["heater".to_string()]);
        board.publish("heater", vec![Variable::new("power_w", 4186.0, secs(0.0))]);

        // The first step started before any power was sampled.
        step_at(&mut t, &board, 100.0, 100.0);
        assert!((t.temperature_c() - 20.0).abs() < 1e-9);
        // 4186 W into 100 kg of water for 100 s raises it by 1 K.
        step_at(&mut t, &board, 200.0, 100.0);
        assert!((t.temperature_c() - 21.0).abs() < 1e-9);
    }

    #[test]
    fn switch_on_mid_step_counts_from_the_next_step() {
        let mut t = lossless_tank();
        let mut board = StateBoard::new(["heater".to_string()]);
        board.publish("heater", vec![Variable::new("power_w", 0.0, secs(0.0))]);
        step_at(&mut t, &board, 100.0, 100.0);

        board.publish("heater", vec![Variable::new("power_w", 4186.0, secs(150.0))]);
        step_at(&mut t, &board, 200.0, 100.0);
        assert!((t.temperature_c() - 20.0).abs() < 1e-9);

        board.publish("heater", vec![Variable::new("power_w", 0.0, secs(250.0))]);
        step_at(&mut t, &board, 300.0, 100.0);
        assert!((t.temperature_c() - 21.0).abs() < 1e-9);
        step_at(&mut t, &board, 400.0, 100.0);
        assert!((t.temperature_c() - 21.0).abs() < 1e-9);
    }

    #[test]
    fn cools_towards_ambient_when_unbound() {
        let mut params = RunParameters::new();
        params.set_real("tank", "initial_c", 60.0);
        let mut t = tank(&params).expect("tank");
        let board = StateBoard::default();
        let ctx = TransitionContext::new("tank", secs(60.0), &board, &[]);
        t.internal_transition(Duration::new(60.0, TimeUnit::Seconds), &ctx)
            .expect("step");
        assert!(t.temperature_c() < 60.0);
        assert!(t.temperature_c() > 20.0);
        let report = t.end_simulation(secs(60.0));
        assert_eq!(report.metrics["max_temperature_c"], 60.0);
    }

    #[test]
    fn invalid_volume_is_rejected() {
        let mut params = RunParameters::new();
        params.set_real("tank", "volume_l", -1.0);
        assert!(matches!(
            tank(&params),
            Err(SimError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn step_follows_parameter() {
        let mut params = RunParameters::new();
        params.set_real("tank", "step_s", 10.0);
        let t = tank(&params).expect("tank");
        assert_eq!(t.time_advance(), Duration::new(10.0, TimeUnit::Seconds));
    }
}
