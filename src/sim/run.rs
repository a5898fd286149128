//! A single execution of an instantiated model tree.
//!
//! [`SimulationRun`] owns the tree, the state board and the queue of
//! externally injected events. It can be driven to completion as fast as
//! possible with [`SimulationRun::run_to_end`], or stepped one instant at a
//! time by the real-time scheduler.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

use super::architecture::{Architecture, CreationMode};
use super::coupled::ModelNode;
use super::error::{SimError, SimResult};
use super::event::Event;
use super::model::ModelReport;
use super::params::{HostTracer, RunParameters};
use super::simulator::TraceRecord;
use super::time::{Time, TimeUnit};
use super::variable::StateBoard;

/// Upper bound on consecutive micro-steps at a single instant.
pub const DEFAULT_MAX_ZERO_DELAY_ITERATIONS: usize = 10_000;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The simulated end time was reached.
    EndReached,
    /// The run was stopped early.
    Stopped,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub start: Time,
    pub end: Time,
    pub stop_reason: StopReason,
    pub reports: Vec<ModelReport>,
    pub transitions: usize,
    /// Events emitted by the root coupled model.
    pub outputs: Vec<Event>,
    pub trace: Vec<TraceRecord>,
    /// Real-time steps that started later than the pacing tolerance.
    pub late_steps: usize,
    /// Injected events that arrived after their timestamp had passed.
    pub rejected_events: usize,
}

impl RunReport {
    pub fn report(&self, model: &str) -> Option<&ModelReport> {
        self.reports.iter().find(|r| r.model == model)
    }

    pub fn metric(&self, model: &str, name: &str) -> Option<f64> {
        self.report(model)
            .and_then(|r| r.metrics.get(name))
            .copied()
    }
}

#[derive(Debug)]
struct Pending {
    /// Timestamp in the run's unit, for a total order.
    at: f64,
    seq: u64,
    target: String,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Reversed for a min-heap on (time, insertion order).
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Created,
    Running,
    Finished,
}

/// One execution of a model tree over `[start, end]`.
pub struct SimulationRun {
    root: ModelNode,
    mode: CreationMode,
    unit: TimeUnit,
    start: Time,
    end: Time,
    current: Time,
    params: RunParameters,
    host: Option<Arc<dyn HostTracer>>,
    board: Arc<RwLock<StateBoard>>,
    pending: BinaryHeap<Pending>,
    seq: u64,
    trace: Vec<TraceRecord>,
    outputs: Vec<Event>,
    transitions: usize,
    rejected: usize,
    state: RunState,
    max_zero_delay: usize,
    zero_delay_steps: usize,
}

impl fmt::Debug for SimulationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationRun")
            .field("root", &self.root.uri())
            .field("mode", &self.mode)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("current", &self.current)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SimulationRun {
    /// Instantiates `architecture` for a run over `[start, end]`.
    ///
    /// A host tracer attached to `params` is removed from the mapping here,
    /// before any model can see it.
    pub fn new(
        architecture: &Architecture,
        mut params: RunParameters,
        start: Time,
        end: Time,
    ) -> SimResult<Self> {
        if end.is_infinite() || end < start {
            return Err(SimError::InvalidParameter {
                name: "end".into(),
                message: format!("end {end} must be finite and not before start {start}"),
            });
        }
        let root = architecture.instantiate()?;
        let unit = architecture.unit();
        let board = StateBoard::new(root.uris());
        let host = params.take_host();
        Ok(Self {
            root,
            mode: architecture.mode(),
            unit,
            start: start.to_unit(unit),
            end: end.to_unit(unit),
            current: start.to_unit(unit),
            params,
            host,
            board: Arc::new(RwLock::new(board)),
            pending: BinaryHeap::new(),
            seq: 0,
            trace: Vec::new(),
            outputs: Vec::new(),
            transitions: 0,
            rejected: 0,
            state: RunState::Created,
            max_zero_delay: DEFAULT_MAX_ZERO_DELAY_ITERATIONS,
            zero_delay_steps: 0,
        })
    }

    pub fn with_max_zero_delay_iterations(mut self, limit: usize) -> Self {
        self.max_zero_delay = limit;
        self
    }

    pub fn start_time(&self) -> Time {
        self.start
    }

    pub fn end_time(&self) -> Time {
        self.end
    }

    pub fn current_time(&self) -> Time {
        self.current
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Creation mode of the architecture this run was built from.
    pub fn mode(&self) -> CreationMode {
        self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// Shared handle to the state board, for readers on other threads.
    pub fn board(&self) -> Arc<RwLock<StateBoard>> {
        Arc::clone(&self.board)
    }

    /// Reads a variable's current value.
    pub fn variable_value(&self, model: &str, name: &str) -> SimResult<f64> {
        let board = self.board.read().unwrap_or_else(PoisonError::into_inner);
        board.lookup(model, name).map(|v| v.value)
    }

    /// Initialises every model and checks that all variable bindings point
    /// at published variables.
    pub fn initialise(&mut self) -> SimResult<()> {
        if self.state != RunState::Created {
            return Err(SimError::AlreadyInitialised(self.root.uri().to_string()));
        }
        {
            let mut board = self.board.write().unwrap_or_else(PoisonError::into_inner);
            self.root.initialise(self.start, &self.params, &mut board)?;
            for sim in self.root.atomics() {
                for (local, key) in sim.imports() {
                    if board.get(key).is_none() {
                        return Err(SimError::MalformedArchitecture(format!(
                            "{} binds {local} to {key}, which is never published",
                            sim.uri()
                        )));
                    }
                }
            }
            board.set_current_time(self.start);
        }
        self.state = RunState::Running;
        info!(
            root = %self.root.uri(),
            start = %self.start,
            end = %self.end,
            params = self.params.len(),
            "run initialised"
        );
        Ok(())
    }

    /// Queues an event for delivery to `target` at the event's timestamp.
    pub fn schedule_external(&mut self, target: &str, event: Event) -> SimResult<()> {
        if self.state == RunState::Finished {
            return Err(SimError::RunFinished);
        }
        if self.root.find(target).is_none() {
            return Err(SimError::UnknownModel(target.to_string()));
        }
        if event.time() < self.current {
            self.rejected += 1;
            return Err(SimError::NonMonotonicTime {
                requested: event.time(),
                current: self.current,
            });
        }
        debug!(target, event = %event, "external event scheduled");
        self.seq += 1;
        self.pending.push(Pending {
            at: event.time().to_unit(self.unit).value(),
            seq: self.seq,
            target: target.to_string(),
            event,
        });
        Ok(())
    }

    /// Earliest instant at which something happens: a model deadline, an
    /// injected event, or the current time when inputs are waiting.
    pub fn next_event_time(&self) -> Time {
        if self.root.has_inputs() {
            return self.current;
        }
        let mut next = self.root.time_next().to_unit(self.unit);
        if let Some(p) = self.pending.peek() {
            next = next.min(Time::new(p.at, self.unit));
        }
        next
    }

    /// Executes one micro-step at the next event time. Returns the instant
    /// executed, or `None` when nothing is left before the end time.
    pub fn step(&mut self) -> SimResult<Option<Time>> {
        if self.state != RunState::Running {
            return Err(match self.state {
                RunState::Created => SimError::NotInitialised(self.root.uri().to_string()),
                _ => SimError::RunFinished,
            });
        }
        let t = self.next_event_time();
        if t.is_infinite() || t > self.end {
            return Ok(None);
        }
        if t < self.current {
            return Err(SimError::NonMonotonicTime {
                requested: t,
                current: self.current,
            });
        }
        if t == self.current && self.transitions > 0 {
            self.zero_delay_steps += 1;
            if self.zero_delay_steps > self.max_zero_delay {
                return Err(SimError::ZeroDelayLivelock {
                    at: t,
                    iterations: self.zero_delay_steps,
                });
            }
        } else {
            self.zero_delay_steps = 0;
        }
        self.current = t;
        self.execute_instant(t)?;
        Ok(Some(t))
    }

    fn execute_instant(&mut self, t: Time) -> SimResult<()> {
        while self
            .pending
            .peek()
            .is_some_and(|p| Time::new(p.at, self.unit) <= t)
        {
            let Some(p) = self.pending.pop() else { break };
            let node = self
                .root
                .find_mut(&p.target)
                .ok_or_else(|| SimError::UnknownModel(p.target.clone()))?;
            node.receive(p.event)?;
        }

        let mut board = self.board.write().unwrap_or_else(PoisonError::into_inner);
        board.set_current_time(t);
        let emitted = self.root.output(t, &board)?;
        let before = self.trace.len();
        self.root.transition(t, &mut board, &mut self.trace)?;
        drop(board);

        self.transitions += self.trace.len() - before;
        if let Some(host) = &self.host {
            for record in &self.trace[before..] {
                host.trace(
                    &record.model,
                    &format!("{} {} {:?}", record.time, record.transition, record.events),
                );
            }
        }
        for event in &emitted {
            debug!(event = %event, "run output");
        }
        self.outputs.extend(emitted);
        Ok(())
    }

    /// Executes every instant up to and including `limit` (capped at the end
    /// time), then advances the clock to it.
    pub fn run_until(&mut self, limit: Time) -> SimResult<()> {
        let limit = limit.min(self.end);
        loop {
            let next = self.next_event_time();
            if next > limit || next.is_infinite() {
                break;
            }
            if self.step()?.is_none() {
                break;
            }
        }
        if limit > self.current {
            self.current = limit;
            let mut board = self.board.write().unwrap_or_else(PoisonError::into_inner);
            board.set_current_time(limit);
        }
        Ok(())
    }

    /// Runs as fast as possible to the end time and finalises every model.
    pub fn run_to_end(&mut self) -> SimResult<RunReport> {
        if self.state == RunState::Created {
            self.initialise()?;
        }
        if let Err(e) = self.run_until(self.end) {
            // Models are finalised even when the run aborts.
            let _ = self.finish(StopReason::Stopped);
            return Err(e);
        }
        self.finish(StopReason::EndReached)
    }

    /// Calls `end_simulation` on every model exactly once and assembles the
    /// run report.
    pub fn finish(&mut self, reason: StopReason) -> SimResult<RunReport> {
        if self.state == RunState::Finished {
            return Err(SimError::RunFinished);
        }
        self.state = RunState::Finished;
        let at = match reason {
            StopReason::EndReached => self.end,
            StopReason::Stopped => self.current,
        };
        let mut reports = Vec::new();
        self.root.end_simulation(at, &mut reports);
        info!(
            end = %at,
            ?reason,
            transitions = self.transitions,
            models = reports.len(),
            "run finished"
        );
        Ok(RunReport {
            start: self.start,
            end: at,
            stop_reason: reason,
            reports,
            transitions: self.transitions,
            outputs: std::mem::take(&mut self.outputs),
            trace: std::mem::take(&mut self.trace),
            late_steps: 0,
            rejected_events: self.rejected,
        })
    }
}
