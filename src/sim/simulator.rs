//! Kernel-side wrapper that drives one atomic model.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::error::{SimError, SimResult};
use super::event::Event;
use super::model::{AtomicModel, InitContext, ModelReport, TransitionContext};
use super::params::RunParameters;
use super::time::{Time, TimeUnit};
use super::variable::{StateBoard, VariableKey};

/// Which transition function fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    Internal,
    External,
    Confluent,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionKind::Internal => "internal",
            TransitionKind::External => "external",
            TransitionKind::Confluent => "confluent",
        };
        f.write_str(s)
    }
}

/// One executed transition, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub time: Time,
    pub model: String,
    pub transition: TransitionKind,
    /// Kinds of the delivered events, in the order they were applied.
    pub events: Vec<String>,
}

/// Drives an [`AtomicModel`]: keeps its last/next event times, its pending
/// inputs and its resolved variable imports.
pub struct AtomicSimulator {
    uri: String,
    model: Box<dyn AtomicModel>,
    imports: Vec<(String, VariableKey)>,
    inbox: Vec<Event>,
    time_last: Time,
    time_next: Time,
    initialised: bool,
    finished: bool,
}

impl fmt::Debug for AtomicSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicSimulator")
            .field("uri", &self.uri)
            .field("kind", &self.model.kind())
            .field("time_last", &self.time_last)
            .field("time_next", &self.time_next)
            .field("pending", &self.inbox.len())
            .finish()
    }
}

impl AtomicSimulator {
    pub fn new(uri: impl Into<String>, model: Box<dyn AtomicModel>, unit: TimeUnit) -> Self {
        Self {
            uri: uri.into(),
            model,
            imports: Vec::new(),
            inbox: Vec::new(),
            time_last: Time::zero(unit),
            time_next: Time::infinite(unit),
            initialised: false,
            finished: false,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> &'static str {
        self.model.kind()
    }

    pub fn time_last(&self) -> Time {
        self.time_last
    }

    pub fn time_next(&self) -> Time {
        self.time_next
    }

    pub fn has_inputs(&self) -> bool {
        !self.inbox.is_empty()
    }

    pub fn imports(&self) -> &[(String, VariableKey)] {
        &self.imports
    }

    pub(crate) fn add_import(&mut self, local_name: impl Into<String>, source: VariableKey) {
        self.imports.push((local_name.into(), source));
    }

    pub(crate) fn receive(&mut self, event: Event) {
        self.inbox.push(event);
    }

    pub fn initialise(
        &mut self,
        start: Time,
        params: &RunParameters,
        board: &mut StateBoard,
    ) -> SimResult<()> {
        if self.initialised {
            return Err(SimError::AlreadyInitialised(self.uri.clone()));
        }
        let ctx = InitContext {
            uri: &self.uri,
            start,
            params,
        };
        self.model.initialise(&ctx)?;
        self.initialised = true;
        self.time_last = start;
        self.time_next = start + self.model.time_advance();
        board.publish(&self.uri, self.model.variables());
        Ok(())
    }

    /// Phase one of an instant: collects the model's output if it is
    /// imminent at `now`.
    pub fn output(&mut self, now: Time, board: &StateBoard) -> SimResult<Vec<Event>> {
        if !self.initialised {
            return Err(SimError::NotInitialised(self.uri.clone()));
        }
        if self.time_next != now {
            return Ok(Vec::new());
        }
        let ctx = TransitionContext::new(&self.uri, now, board, &self.imports);
        Ok(self.model.output(&ctx))
    }

    /// Phase two of an instant: runs the internal, external or confluent
    /// transition as appropriate. Returns `None` when the model had nothing
    /// to do at `now`.
    pub fn transition(
        &mut self,
        now: Time,
        board: &mut StateBoard,
    ) -> SimResult<Option<TraceRecord>> {
        if !self.initialised {
            return Err(SimError::NotInitialised(self.uri.clone()));
        }
        let imminent = self.time_next == now;
        if !imminent && self.inbox.is_empty() {
            return Ok(None);
        }

        let mut inputs = std::mem::take(&mut self.inbox);
        let max = self.model.max_inputs_per_transition();
        if inputs.len() > max {
            return Err(SimError::TooManyInputs {
                model: self.uri.clone(),
                received: inputs.len(),
                max,
            });
        }
        if let Some(stale) = inputs.iter().find(|e| e.time() < self.time_last) {
            return Err(SimError::NonMonotonicTime {
                requested: stale.time(),
                current: self.time_last,
            });
        }
        self.model.order_inputs(&mut inputs);

        let elapsed = now.since(self.time_last);
        let transition = {
            let ctx = TransitionContext::new(&self.uri, now, board, &self.imports);
            if inputs.is_empty() {
                self.model.internal_transition(elapsed, &ctx)?;
                TransitionKind::Internal
            } else if imminent {
                self.model.confluent_transition(elapsed, &inputs, &ctx)?;
                TransitionKind::Confluent
            } else {
                self.model.external_transition(elapsed, &inputs, &ctx)?;
                TransitionKind::External
            }
        };

        self.time_last = now;
        self.time_next = now + self.model.time_advance();
        board.publish(&self.uri, self.model.variables());

        let events: Vec<String> = inputs.iter().map(|e| e.kind().name().to_string()).collect();
        debug!(
            model = %self.uri,
            %transition,
            time = %now,
            next = %self.time_next,
            events = ?events,
            "transition"
        );
        Ok(Some(TraceRecord {
            time: now,
            model: self.uri.clone(),
            transition,
            events,
        }))
    }

    /// Finalises the model. Returns `None` if it was already finalised.
    pub fn end_simulation(&mut self, end: Time) -> Option<ModelReport> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.model.end_simulation(end))
    }
}
