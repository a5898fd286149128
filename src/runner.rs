use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration as StdDuration, Instant};

use tracing::{info, warn};

use crate::control::ControlLoop;
use crate::scenario::Scenario;
use crate::sim::architecture::CreationMode;
use crate::sim::error::{SimError, SimResult};
use crate::sim::params::HostTracer;
use crate::sim::realtime::{RealTimeConfig, RealTimeScheduler, SchedulerHandle};
use crate::sim::run::{RunReport, SimulationRun};
use crate::sim::variable::StateBoard;

/// Options that are not part of the scenario file.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Overrides the architecture's creation mode.
    pub realtime: Option<bool>,
    /// Overrides `simulation.acceleration`.
    pub acceleration: Option<f64>,
    pub lag_tolerance: Option<StdDuration>,
    pub host: Option<Arc<dyn HostTracer>>,
}

/// Outcome of one scenario run.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub report: RunReport,
    /// Commands issued by host-side control loops.
    pub control_commands: usize,
}

/// A scenario ready to run, exposing its live state board beforehand so
/// observers can attach.
pub struct PreparedRun {
    run: SimulationRun,
    loops: Vec<ControlLoop>,
    pacing: RealTimeConfig,
}

impl PreparedRun {
    /// Instantiates the scenario and queues its injections.
    ///
    /// # Errors
    ///
    /// Returns a [`SimError`] if the run cannot be created, a model fails to
    /// initialise, or an injection targets an unknown model.
    pub fn new(scenario: Scenario, options: RunOptions) -> SimResult<Self> {
        let mut architecture = scenario.architecture;
        match options.realtime {
            Some(true) => architecture.set_mode(CreationMode::RealTime),
            Some(false) => architecture.set_mode(CreationMode::Simulated),
            None => {}
        }
        if architecture.mode() == CreationMode::Simulated && !scenario.loops.is_empty() {
            return Err(SimError::InvalidParameter {
                name: "control.external".into(),
                message: "host-side control loops need a real-time run".into(),
            });
        }
        let mut params = scenario.params;
        if let Some(host) = options.host {
            params = params.with_host(host);
        }
        let mut run = SimulationRun::new(&architecture, params, scenario.start, scenario.end)?;
        run.initialise()?;
        for (target, event) in scenario.injections {
            run.schedule_external(&target, event)?;
        }
        Ok(Self {
            run,
            loops: scenario.loops,
            pacing: RealTimeConfig {
                acceleration: options
                    .acceleration
                    .unwrap_or(scenario.pacing.acceleration),
                lag_tolerance: options
                    .lag_tolerance
                    .unwrap_or(scenario.pacing.lag_tolerance),
            },
        })
    }

    pub fn mode(&self) -> CreationMode {
        self.run.mode()
    }

    /// The board the kernel publishes variables to.
    pub fn board(&self) -> Arc<RwLock<StateBoard>> {
        self.run.board()
    }

    /// Runs to the end time. Real-time runs block the calling thread until
    /// the kernel finishes; `on_start` receives the handle first.
    ///
    /// # Errors
    ///
    /// Returns the first kernel or control-loop error.
    pub fn execute<F>(self, on_start: F) -> SimResult<ScenarioOutcome>
    where
        F: FnOnce(&SchedulerHandle),
    {
        match self.run.mode() {
            CreationMode::Simulated => {
                let mut run = self.run;
                let report = run.run_to_end()?;
                info!(
                    transitions = report.transitions,
                    outputs = report.outputs.len(),
                    "simulated run finished"
                );
                Ok(ScenarioOutcome {
                    report,
                    control_commands: 0,
                })
            }
            CreationMode::RealTime => {
                let handle = RealTimeScheduler::start(self.run, Instant::now(), self.pacing)?;
                let loops: Vec<JoinHandle<SimResult<usize>>> = self
                    .loops
                    .into_iter()
                    .map(|l| l.spawn(handle.clone()))
                    .collect();
                on_start(&handle);
                let report = handle.join();

                let mut control_commands = 0;
                for joined in loops {
                    match joined.join() {
                        Ok(Ok(n)) => control_commands += n,
                        Ok(Err(e)) => return Err(e),
                        Err(_) => warn!("control loop panicked"),
                    }
                }
                let report = report?;
                info!(
                    transitions = report.transitions,
                    late_steps = report.late_steps,
                    control_commands,
                    "real-time run finished"
                );
                Ok(ScenarioOutcome {
                    report,
                    control_commands,
                })
            }
        }
    }
}

/// Builds, initialises and runs `scenario` in one call.
///
/// # Errors
///
/// See [`PreparedRun::new`] and [`PreparedRun::execute`].
pub fn run_scenario(scenario: Scenario, options: RunOptions) -> SimResult<ScenarioOutcome> {
    PreparedRun::new(scenario, options)?.execute(|_| {})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunMode, ScenarioConfig};

    #[test]
    fn fan_preset_runs_to_end() {
        let scenario = Scenario::build(&ScenarioConfig::fan()).expect("scenario");
        let outcome = run_scenario(scenario, RunOptions::default()).expect("run");
        let report = outcome.report;
        assert_eq!(report.metric("fan", "mode_changes"), Some(4.0));
        // 600 s at 30 W, 600 s at 60 W, 600 s at 30 W.
        let expected_kwh = (600.0 * 30.0 + 600.0 * 60.0 + 600.0 * 30.0) / 3.6e6;
        let kwh = report.metric("fan", "energy_kwh").expect("energy");
        assert!((kwh - expected_kwh).abs() < 1e-9, "{kwh} vs {expected_kwh}");
    }

    #[test]
    fn realtime_override_sets_the_creation_mode() {
        let scenario = Scenario::build(&ScenarioConfig::fan()).expect("scenario");
        assert_eq!(scenario.architecture.mode(), CreationMode::Simulated);
        let options = RunOptions {
            realtime: Some(true),
            ..RunOptions::default()
        };
        let prepared = PreparedRun::new(scenario, options).expect("prepared run");
        assert_eq!(prepared.mode(), CreationMode::RealTime);
    }

    #[test]
    fn external_loops_need_realtime() {
        let mut cfg = ScenarioConfig::wind();
        cfg.simulation.mode = RunMode::Realtime;
        cfg.control.external = true;
        let scenario = Scenario::build(&cfg).expect("scenario");
        let options = RunOptions {
            realtime: Some(false),
            ..RunOptions::default()
        };
        assert!(matches!(
            PreparedRun::new(scenario, options),
            Err(SimError::InvalidParameter { .. })
        ));
    }
}
