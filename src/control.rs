//! Threshold control of appliances from outside the model tree.
//!
//! [`HysteresisController`] is the decision rule. [`ControlLoop`] runs it on
//! its own thread against a real-time run: it samples a sensor variable
//! through a [`SchedulerHandle`] and injects switch commands into an
//! actuator model.

use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::sim::error::{SimError, SimResult};
use crate::sim::event::{Event, EventKind};
use crate::sim::realtime::SchedulerHandle;
use crate::sim::variable::VariableKey;

/// Which side of the band turns the actuator on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HysteresisMode {
    /// On below `low`, off above `high` (heating).
    OnBelow,
    /// On above `high`, off below `low` (generation above a cut-in speed).
    OnAbove,
}

/// Outcome of one control decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    TurnOn,
    TurnOff,
    Hold,
}

/// Two-threshold on/off controller.
///
/// Within the band `[low, high]` the controller holds its last decision, so
/// the actuator never chatters around a single threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisController {
    low: f64,
    high: f64,
    mode: HysteresisMode,
    is_on: bool,
}

impl HysteresisController {
    /// # Panics
    ///
    /// Panics if `low > high` or either bound is NaN.
    pub fn new(low: f64, high: f64, mode: HysteresisMode, initially_on: bool) -> Self {
        assert!(low <= high, "hysteresis band must satisfy low <= high");
        Self {
            low,
            high,
            mode,
            is_on: initially_on,
        }
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    /// Decision for a sensor reading, without committing it.
    pub fn decide(&self, value: f64) -> ControlAction {
        let (turn_on, turn_off) = match self.mode {
            HysteresisMode::OnBelow => (value < self.low, value > self.high),
            HysteresisMode::OnAbove => (value > self.high, value < self.low),
        };
        if !self.is_on && turn_on {
            ControlAction::TurnOn
        } else if self.is_on && turn_off {
            ControlAction::TurnOff
        } else {
            ControlAction::Hold
        }
    }

    pub fn commit(&mut self, action: ControlAction) {
        match action {
            ControlAction::TurnOn => self.is_on = true,
            ControlAction::TurnOff => self.is_on = false,
            ControlAction::Hold => {}
        }
    }

    /// Decides and commits in one go.
    pub fn update(&mut self, value: f64) -> ControlAction {
        let action = self.decide(value);
        self.commit(action);
        action
    }
}

/// A hysteresis controller polling a real-time run.
#[derive(Debug, Clone)]
pub struct ControlLoop {
    pub sensor: VariableKey,
    pub actuator: String,
    pub on_event: EventKind,
    pub off_event: EventKind,
    pub controller: HysteresisController,
    /// Wall-clock polling period.
    pub period: StdDuration,
}

impl ControlLoop {
    /// Starts polling on a new thread until the run ends. The thread
    /// returns the number of commands it issued.
    pub fn spawn(self, handle: SchedulerHandle) -> JoinHandle<SimResult<usize>> {
        thread::spawn(move || self.run(&handle))
    }

    fn run(mut self, handle: &SchedulerHandle) -> SimResult<usize> {
        info!(sensor = %self.sensor, actuator = %self.actuator, "control loop started");
        let mut issued = 0;
        while !handle.is_finished() {
            let value = match handle.model_state_value(&self.sensor.model, &self.sensor.name) {
                Ok(v) => v,
                Err(SimError::SchedulerStopped) => break,
                Err(e) => return Err(e),
            };
            let action = self.controller.decide(value);
            let kind = match action {
                ControlAction::TurnOn => Some(self.on_event.clone()),
                ControlAction::TurnOff => Some(self.off_event.clone()),
                ControlAction::Hold => None,
            };
            if let Some(kind) = kind {
                let inject = move |t| Event::new(kind, t);
                // Committed only once the kernel has accepted the command.
                match handle.trigger_external_event(&self.actuator, inject) {
                    Ok(()) => {
                        self.controller.commit(action);
                        issued += 1;
                        debug!(value, ?action, actuator = %self.actuator, "control command");
                    }
                    Err(SimError::SchedulerStopped) => break,
                    Err(e) => {
                        warn!(actuator = %self.actuator, error = %e, "control command refused");
                        return Err(e);
                    }
                }
            }
            thread::sleep(self.period);
        }
        info!(issued, actuator = %self.actuator, "control loop finished");
        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::devices::appliance::ApplianceModel;
    use crate::devices::profiles::{self, SWITCH_OFF, SWITCH_ON};
    use crate::sim::architecture::{Architecture, CreationMode};
    use crate::sim::coupled::CouplingTables;
    use crate::sim::params::RunParameters;
    use crate::sim::realtime::{RealTimeConfig, RealTimeScheduler};
    use crate::sim::run::{SimulationRun, StopReason};
    use crate::sim::time::{Time, TimeUnit};

    fn fan_loop(actuator: &str) -> ControlLoop {
        ControlLoop {
            sensor: VariableKey::new("fan", "power_w"),
            actuator: actuator.to_string(),
            on_event: SWITCH_ON,
            off_event: SWITCH_OFF,
            // Switch on while idle, off again once it draws power.
            controller: HysteresisController::new(10.0, 20.0, HysteresisMode::OnBelow, false),
            period: StdDuration::from_millis(5),
        }
    }

    fn start_fan(end: f64) -> SchedulerHandle {
        let arch = Architecture::builder("home")
            .mode(CreationMode::RealTime)
            .atomic("fan", TimeUnit::Seconds, || {
                Box::new(ApplianceModel::new(profiles::fan_profile()))
            })
            .coupled("home", TimeUnit::Seconds, ["fan"], CouplingTables::new())
            .build()
            .expect("architecture");
        let run = SimulationRun::new(
            &arch,
            RunParameters::new(),
            Time::zero(TimeUnit::Seconds),
            Time::new(end, TimeUnit::Seconds),
        )
        .expect("run");
        let config = RealTimeConfig {
            acceleration: 100.0,
            ..RealTimeConfig::default()
        };
        RealTimeScheduler::start(run, Instant::now(), config).expect("start")
    }

    #[test]
    fn heating_band() {
        let mut c = HysteresisController::new(50.0, 60.0, HysteresisMode::OnBelow, false);
        assert_eq!(c.update(55.0), ControlAction::Hold);
        assert_eq!(c.update(45.0), ControlAction::TurnOn);
        assert_eq!(c.update(55.0), ControlAction::Hold);
        assert!(c.is_on());
        assert_eq!(c.update(61.0), ControlAction::TurnOff);
        assert_eq!(c.update(58.0), ControlAction::Hold);
        assert!(!c.is_on());
    }

    #[test]
    fn generation_band() {
        let mut c = HysteresisController::new(3.0, 4.0, HysteresisMode::OnAbove, false);
        assert_eq!(c.update(3.5), ControlAction::Hold);
        assert_eq!(c.update(4.5), ControlAction::TurnOn);
        assert_eq!(c.update(3.5), ControlAction::Hold);
        assert_eq!(c.update(2.0), ControlAction::TurnOff);
    }

    #[test]
    fn decide_does_not_commit() {
        let c = HysteresisController::new(50.0, 60.0, HysteresisMode::OnBelow, false);
        assert_eq!(c.decide(10.0), ControlAction::TurnOn);
        assert!(!c.is_on());
    }

    #[test]
    #[should_panic]
    fn inverted_band_panics() {
        HysteresisController::new(60.0, 50.0, HysteresisMode::OnBelow, false);
    }

    #[test]
    fn loop_keeps_polling_while_the_run_is_joined() {
        let handle = start_fan(60.0);
        let control = fan_loop("fan").spawn(handle.clone());
        let report = handle.join().expect("report");
        let issued = control.join().expect("loop thread").expect("loop");

        assert_eq!(report.stop_reason, StopReason::EndReached);
        assert!(issued >= 2, "issued {issued}");
        // Every accepted command reached the fan.
        assert_eq!(report.metric("fan", "mode_changes"), Some(issued as f64));
    }

    #[test]
    fn refused_command_ends_the_loop() {
        let handle = start_fan(3600.0);
        let control = fan_loop("toaster").spawn(handle.clone());
        let outcome = control.join().expect("loop thread");
        assert!(matches!(outcome, Err(SimError::UnknownModel(_))));
        handle.stop();
        let report = handle.join().expect("report");
        assert_eq!(report.metric("fan", "mode_changes"), Some(0.0));
    }
}
