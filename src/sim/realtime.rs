//! Wall-clock pacing of a simulation run.
//!
//! The scheduler owns the [`SimulationRun`] on a dedicated kernel thread.
//! Simulated time `t` is mapped to the wall-clock instant
//! `wall_start + (t - start) / acceleration`; the thread sleeps on its
//! command channel until the next deadline, so injected events wake it
//! immediately. Other threads talk to the run only through a
//! [`SchedulerHandle`].
//!
//! Injected events are stamped on the kernel thread, never earlier than the
//! last executed instant, and the caller is told whether the run accepted
//! them. A stop executes every instant the wall clock has already passed
//! before models are finalised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::architecture::CreationMode;
use super::error::{SimError, SimResult};
use super::event::Event;
use super::run::{RunReport, SimulationRun, StopReason};
use super::time::{Duration, Time};
use super::variable::{StateBoard, Variable};

/// Pacing settings for a real-time run.
#[derive(Debug, Clone, Copy)]
pub struct RealTimeConfig {
    /// Simulated seconds per wall-clock second.
    pub acceleration: f64,
    /// How late a step may start before it is reported as lagging.
    pub lag_tolerance: StdDuration,
}

impl Default for RealTimeConfig {
    fn default() -> Self {
        Self {
            acceleration: 1.0,
            lag_tolerance: StdDuration::from_millis(50),
        }
    }
}

type EventFactory = Box<dyn FnOnce(Time) -> Event + Send>;

enum Command {
    Inject {
        target: String,
        factory: EventFactory,
        reply: Sender<SimResult<()>>,
    },
    Stop,
}

/// Raises the shared finished flag when the kernel thread exits, panics
/// included.
struct FinishedOnExit(Arc<AtomicBool>);

impl Drop for FinishedOnExit {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Time mapping shared between the kernel thread and handles.
#[derive(Debug)]
struct Clock {
    wall_start: Instant,
    sim_start: Time,
    sim_end: Time,
    acceleration: f64,
}

impl Clock {
    fn simulated_at(&self, instant: Instant) -> Time {
        let wall = instant.saturating_duration_since(self.wall_start).as_secs_f64();
        let sim = Duration::new(
            wall * self.acceleration / self.sim_start.unit().seconds_per_unit(),
            self.sim_start.unit(),
        );
        (self.sim_start + sim).min(self.sim_end)
    }

    fn deadline(&self, t: Time) -> Instant {
        let offset = t.since(self.sim_start).as_seconds() / self.acceleration;
        StdDuration::try_from_secs_f64(offset)
            .ok()
            .and_then(|d| self.wall_start.checked_add(d))
            .unwrap_or_else(|| Instant::now() + StdDuration::from_secs(86_400))
    }
}

/// Runs a [`SimulationRun`] against the wall clock.
pub struct RealTimeScheduler;

impl RealTimeScheduler {
    /// Initialises `run` on the calling thread, so configuration errors
    /// surface before anything is paced, then hands it to the kernel thread.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] for a non-positive
    /// acceleration or a run whose architecture was not created for
    /// real-time execution.
    pub fn start(
        mut run: SimulationRun,
        wall_start: Instant,
        config: RealTimeConfig,
    ) -> SimResult<SchedulerHandle> {
        if !(config.acceleration.is_finite() && config.acceleration > 0.0) {
            return Err(SimError::InvalidParameter {
                name: "acceleration".into(),
                message: format!("must be a positive number, got {}", config.acceleration),
            });
        }
        if run.mode() != CreationMode::RealTime {
            return Err(SimError::InvalidParameter {
                name: "mode".into(),
                message: format!(
                    "the architecture was created for {:?} execution, not real time",
                    run.mode()
                ),
            });
        }
        if run.is_finished() {
            return Err(SimError::RunFinished);
        }
        match run.initialise() {
            Ok(()) | Err(SimError::AlreadyInitialised(_)) => {}
            Err(e) => return Err(e),
        }

        let clock = Arc::new(Clock {
            wall_start,
            sim_start: run.start_time(),
            sim_end: run.end_time(),
            acceleration: config.acceleration,
        });
        let board = run.board();
        let (tx, rx) = crossbeam_channel::unbounded();

        info!(
            start = %clock.sim_start,
            end = %clock.sim_end,
            acceleration = config.acceleration,
            "real-time scheduler starting"
        );
        let kernel_clock = Arc::clone(&clock);
        let finished = Arc::new(AtomicBool::new(false));
        let on_exit = FinishedOnExit(Arc::clone(&finished));
        let thread = thread::Builder::new()
            .name("sim-kernel".into())
            .spawn(move || {
                let _on_exit = on_exit;
                kernel_loop(run, &kernel_clock, &rx, config.lag_tolerance)
            })
            .map_err(|_| SimError::SchedulerStopped)?;

        Ok(SchedulerHandle {
            clock,
            board,
            commands: tx,
            finished,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }
}

fn kernel_loop(
    mut run: SimulationRun,
    clock: &Clock,
    commands: &Receiver<Command>,
    tolerance: StdDuration,
) -> SimResult<RunReport> {
    let mut late_steps = 0;
    let outcome = loop {
        let next = run.next_event_time();
        let end_reached = next.is_infinite() || next > run.end_time();
        let deadline = clock.deadline(if end_reached { run.end_time() } else { next });

        match commands.recv_deadline(deadline) {
            Ok(Command::Inject {
                target,
                factory,
                reply,
            }) => {
                let at = clock.simulated_at(Instant::now()).max(run.current_time());
                let accepted = run.schedule_external(&target, factory(at));
                if let Err(e) = &accepted {
                    warn!(target, error = %e, "injected event rejected");
                }
                let _ = reply.send(accepted);
            }
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                let at = clock.simulated_at(Instant::now());
                info!(%at, "real-time run stopped");
                break match run.run_until(at) {
                    Ok(()) => run.finish(StopReason::Stopped),
                    Err(e) => {
                        let _ = run.finish(StopReason::Stopped);
                        Err(e)
                    }
                };
            }
            Err(RecvTimeoutError::Timeout) => {
                if end_reached {
                    break run
                        .run_until(run.end_time())
                        .and_then(|()| run.finish(StopReason::EndReached));
                }
                let lag = Instant::now().saturating_duration_since(deadline);
                if lag > tolerance {
                    late_steps += 1;
                    warn!(at = %next, lag_ms = lag.as_millis() as u64, "real-time step is late");
                }
                if let Err(e) = run.step() {
                    let _ = run.finish(StopReason::Stopped);
                    break Err(e);
                }
                debug!(at = %next, "real-time step");
            }
        }
    };
    outcome.map(|mut report| {
        report.late_steps = late_steps;
        report
    })
}

/// Cloneable, thread-safe access to a running real-time simulation.
#[derive(Clone)]
pub struct SchedulerHandle {
    clock: Arc<Clock>,
    board: Arc<RwLock<StateBoard>>,
    commands: Sender<Command>,
    finished: Arc<AtomicBool>,
    thread: Arc<Mutex<Option<JoinHandle<SimResult<RunReport>>>>>,
}

impl SchedulerHandle {
    /// Current simulated time: the wall clock mapped through the
    /// acceleration, never earlier than the last executed instant.
    pub fn current_time(&self) -> Time {
        let mapped = self.clock.simulated_at(Instant::now());
        let board = self.board.read().unwrap_or_else(PoisonError::into_inner);
        match board.current_time() {
            Some(done) if done > mapped => done,
            _ => mapped,
        }
    }

    pub fn start_time(&self) -> Time {
        self.clock.sim_start
    }

    pub fn end_time(&self) -> Time {
        self.clock.sim_end
    }

    /// Injects an event into `target` at the current simulated time.
    ///
    /// `factory` runs on the kernel thread with the time the event is
    /// accepted at. The call blocks until the kernel has queued the event
    /// or refused it, so `Ok` means the run will deliver it.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownModel`] for a target that is not in the tree,
    /// [`SimError::NonMonotonicTime`] when the factory stamps a time the
    /// run has already passed, and [`SimError::SchedulerStopped`] once the
    /// run has ended.
    pub fn trigger_external_event<F>(&self, target: &str, factory: F) -> SimResult<()>
    where
        F: FnOnce(Time) -> Event + Send + 'static,
    {
        let known = self
            .board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_model(target);
        if !known {
            return Err(SimError::UnknownModel(target.to_string()));
        }
        let (reply, accepted) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::Inject {
                target: target.to_string(),
                factory: Box::new(factory),
                reply,
            })
            .map_err(|_| SimError::SchedulerStopped)?;
        accepted.recv().map_err(|_| SimError::SchedulerStopped)?
    }

    pub fn model_state_value(&self, model: &str, name: &str) -> SimResult<f64> {
        self.variable(model, name).map(|v| v.value)
    }

    pub fn variable(&self, model: &str, name: &str) -> SimResult<Variable> {
        let board = self.board.read().unwrap_or_else(PoisonError::into_inner);
        board.lookup(model, name).cloned()
    }

    /// Copy of the whole state board.
    pub fn snapshot(&self) -> StateBoard {
        self.board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Asks the kernel thread to stop. Models are still finalised.
    pub fn stop(&self) {
        // A closed channel means the run already ended.
        let _ = self.commands.send(Command::Stop);
    }

    /// Whether the kernel thread has exited. Unaffected by which clone
    /// joins.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Waits for the run to end and returns its report. Only the first
    /// caller across all clones receives it.
    pub fn join(&self) -> SimResult<RunReport> {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SimError::SchedulerStopped)?;
        handle.join().map_err(|_| SimError::SchedulerStopped)?
    }
}
