use crate::devices::types::{fraction, positive};
use crate::sim::error::{SimError, SimResult};
use crate::sim::event::Event;
use crate::sim::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use crate::sim::time::{Duration, Time, TimeUnit};
use crate::sim::variable::Variable;

/// A battery energy storage system that absorbs surplus generation and
/// covers residual load.
///
/// `BatteryModel` integrates its state of charge (SOC) at a fixed step,
/// reading the net feeder power bound under `net_power_w`. A negative net
/// power (surplus) charges the battery, a positive one (load) discharges it,
/// subject to the power limits, the remaining capacity and the
/// charge/discharge efficiencies.
///
/// # Power Flow Convention (Feeder)
/// - Positive power: Charging (consuming power from the grid / load)
/// - Negative power: Discharging (supplying power to the grid / generation)
///
/// # Parameters
///
/// * `<uri>:capacity_kwh` - Battery capacity (default 10 kWh)
/// * `<uri>:initial_soc` - Starting SOC as a fraction (default 0.5)
/// * `<uri>:max_charge_kw` / `<uri>:max_discharge_kw` - Power limits (default 5 kW)
/// * `<uri>:eta_charge` / `<uri>:eta_discharge` - Efficiencies (default 0.95)
/// * `<uri>:step_s` - Integration step in seconds (default 60)
#[derive(Debug, Clone)]
pub struct BatteryModel {
    uri: String,
    /// Battery capacity in kilowatt-hours.
    capacity_kwh: f64,
    /// State of charge as a fraction (0.0 to 1.0).
    soc: f64,
    max_charge_kw: f64,
    max_discharge_kw: f64,
    eta_c: f64,
    eta_d: f64,
    step: Duration,
    /// Power applied over the last step, feeder convention.
    power_kw: f64,
    charged_kwh: f64,
    discharged_kwh: f64,
    updated_at: Time,
}

impl Default for BatteryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryModel {
    pub fn new() -> Self {
        Self {
            uri: String::new(),
            capacity_kwh: 10.0,
            soc: 0.5,
            max_charge_kw: 5.0,
            max_discharge_kw: 5.0,
            eta_c: 0.95,
            eta_d: 0.95,
            step: Duration::new(60.0, TimeUnit::Seconds),
            power_kw: 0.0,
            charged_kwh: 0.0,
            discharged_kwh: 0.0,
            updated_at: Time::zero(TimeUnit::Seconds),
        }
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Applies a power setpoint for `dt_hours` and returns the power actually
    /// achieved, in feeder convention.
    ///
    /// Enforces charge/discharge power limits, SOC bounds, and efficiency losses.
    fn apply(&mut self, setpoint_kw: f64, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }

        // Enforce kW limits
        let cmd_kw = if setpoint_kw >= 0.0 {
            setpoint_kw.min(self.max_charge_kw)
        } else {
            setpoint_kw.max(-self.max_discharge_kw)
        };

        if cmd_kw > 0.0 {
            // Limited by the remaining capacity.
            let max_kwh_this_step = (1.0 - self.soc) * self.capacity_kwh / self.eta_c;
            let actual_kw = cmd_kw.min((max_kwh_this_step / dt_hours).max(0.0));

            self.soc += (actual_kw * dt_hours * self.eta_c) / self.capacity_kwh;
            self.soc = self.soc.clamp(0.0, 1.0);
            self.charged_kwh += actual_kw * dt_hours;
            actual_kw
        } else if cmd_kw < 0.0 {
            // Limited by the stored energy.
            let max_kwh_this_step = self.soc * self.capacity_kwh * self.eta_d;
            let actual_abs_kw = (-cmd_kw).min((max_kwh_this_step / dt_hours).max(0.0));

            self.soc -= (actual_abs_kw * dt_hours) / (self.capacity_kwh * self.eta_d);
            self.soc = self.soc.clamp(0.0, 1.0);
            self.discharged_kwh += actual_abs_kw * dt_hours;
            -actual_abs_kw
        } else {
            0.0
        }
    }
}

impl AtomicModel for BatteryModel {
    fn kind(&self) -> &'static str {
        "Battery"
    }

    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()> {
        let uri = ctx.uri;
        self.uri = uri.to_string();
        self.capacity_kwh = positive(uri, "capacity_kwh", ctx.real_or("capacity_kwh", 10.0)?)?;
        self.soc = fraction(uri, "initial_soc", ctx.real_or("initial_soc", 0.5)?)?;
        self.max_charge_kw = ctx.real_or("max_charge_kw", 5.0)?.max(0.0);
        self.max_discharge_kw = ctx.real_or("max_discharge_kw", 5.0)?.max(0.0);
        self.eta_c = fraction(uri, "eta_charge", ctx.real_or("eta_charge", 0.95)?)?;
        self.eta_d = fraction(uri, "eta_discharge", ctx.real_or("eta_discharge", 0.95)?)?;
        positive(uri, "eta_charge", self.eta_c)?;
        positive(uri, "eta_discharge", self.eta_d)?;
        let step_s = positive(uri, "step_s", ctx.real_or("step_s", 60.0)?)?;
        self.step = Duration::new(step_s, TimeUnit::Seconds).to_unit(ctx.start.unit());
        self.power_kw = 0.0;
        self.charged_kwh = 0.0;
        self.discharged_kwh = 0.0;
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
        elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        let net_w = if ctx.is_bound("net_power_w") {
            ctx.import_value("net_power_w")?
        } else {
            0.0
        };
        // Surplus (negative net) becomes a charge setpoint.
        self.power_kw = self.apply(-net_w / 1000.0, elapsed.as_hours());
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
        vec![
            Variable::new("soc", self.soc, self.updated_at),
            Variable::new("power_w", self.power_kw * 1000.0, self.updated_at),
        ]
    }

    fn end_simulation(&mut self, _end: Time) -> ModelReport {
        ModelReport::new(&self.uri, self.kind())
            .metric("final_soc", self.soc)
            .metric("charged_kwh", self.charged_kwh)
            .metric("discharged_kwh", self.discharged_kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::params::RunParameters;

    fn battery(soc: f64) -> BatteryModel {
        let mut params = RunParameters::new();
        params.set_real("bat", "initial_soc", soc);
        let mut b = BatteryModel::new();
        b.initialise(&InitContext {
            uri: "bat",
            start: Time::zero(TimeUnit::Seconds),
            params: &params,
        })
        .expect("initialise");
        b
    }

    #[test]
    fn test_charge_respects_power_limit() {
        let mut b = battery(0.5);
        let p = b.apply(10.0, 0.25);
        assert!((p - 5.0).abs() < 1e-9);
        let expected_soc = 0.5 + (5.0 * 0.25 * 0.95) / 10.0;
        assert!((b.soc() - expected_soc).abs() < 1e-9);
    }

    #[test]
    fn test_discharge_respects_power_limit() {
        let mut b = battery(0.5);
        let p = b.apply(-10.0, 0.25);
        assert!((p + 5.0).abs() < 1e-9);
        let expected_soc = 0.5 - (5.0 * 0.25) / (10.0 * 0.95);
        assert!((b.soc() - expected_soc).abs() < 1e-9);
    }

    #[test]
    fn test_charge_limited_by_capacity() {
        let mut b = battery(0.99);
        let p = b.apply(5.0, 1.0);
        assert!(p < 5.0);
        assert!(b.soc() <= 1.0);
        assert!((b.soc() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_discharge_limited_by_energy() {
        let mut b = battery(0.01);
        let p = b.apply(-5.0, 1.0);
        assert!(p > -5.0);
        assert!(b.soc() >= 0.0);
    }

    #[test]
    fn test_zero_step_is_noop() {
        let mut b = battery(0.5);
        assert_eq!(b.apply(3.0, 0.0), 0.0);
        assert_eq!(b.soc(), 0.5);
    }

    #[test]
    fn test_invalid_soc_is_rejected() {
        let mut params = RunParameters::new();
        params.set_real("bat", "initial_soc", 1.5);
        let mut b = BatteryModel::new();
        let err = b
            .initialise(&InitContext {
                uri: "bat",
                start: Time::zero(TimeUnit::Seconds),
                params: &params,
            })
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidParameter { .. }));
    }
}
