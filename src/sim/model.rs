//! The atomic model contract.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::error::{SimError, SimResult};
use super::event::Event;
use super::params::RunParameters;
use super::time::{Duration, Time};
use super::variable::{StateBoard, Variable, VariableKey};

/// What a model sees while initialising.
pub struct InitContext<'a> {
    pub uri: &'a str,
    pub start: Time,
    pub params: &'a RunParameters,
}

impl InitContext<'_> {
    pub fn real_or(&self, name: &str, default: f64) -> SimResult<f64> {
        self.params.real_or(self.uri, name, default)
    }

    pub fn required_real(&self, name: &str) -> SimResult<f64> {
        self.params.required_real(self.uri, name)
    }
}

/// What a model sees during `output` and its transitions: the current
/// instant and read access to the variables bound into it.
pub struct TransitionContext<'a> {
    pub(crate) uri: &'a str,
    pub(crate) now: Time,
    pub(crate) board: &'a StateBoard,
    pub(crate) imports: &'a [(String, VariableKey)],
}

impl<'a> TransitionContext<'a> {
    pub fn new(
        uri: &'a str,
        now: Time,
        board: &'a StateBoard,
        imports: &'a [(String, VariableKey)],
    ) -> Self {
        Self {
            uri,
            now,
            board,
            imports,
        }
    }

    pub fn uri(&self) -> &str {
        self.uri
    }

    pub fn now(&self) -> Time {
        self.now
    }

    /// Reads the current value of the variable bound under `local_name`.
    pub fn import(&self, local_name: &str) -> SimResult<&'a Variable> {
        let unknown = || SimError::UnknownVariable {
            model: self.uri.to_string(),
            name: local_name.to_string(),
        };
        let (_, key) = self
            .imports
            .iter()
            .find(|(name, _)| name == local_name)
            .ok_or_else(unknown)?;
        self.board.get(key).ok_or_else(unknown)
    }

    pub fn import_value(&self, local_name: &str) -> SimResult<f64> {
        self.import(local_name).map(|v| v.value)
    }

    pub fn is_bound(&self, local_name: &str) -> bool {
        self.imports.iter().any(|(name, _)| name == local_name)
    }
}

/// Immutable end-of-run summary of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    pub model: String,
    pub kind: String,
    pub metrics: BTreeMap<String, f64>,
    pub labels: BTreeMap<String, String>,
}

impl ModelReport {
    pub fn new(model: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            kind: kind.into(),
            metrics: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn label(mut self, name: &str, value: impl Into<String>) -> Self {
        self.labels.insert(name.to_string(), value.into());
        self
    }
}

impl fmt::Display for ModelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.kind)?;
        for (name, value) in &self.metrics {
            write!(f, " {name}={value:.6}")?;
        }
        for (name, value) in &self.labels {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// A leaf simulation entity with its own state and transition functions.
///
/// The kernel drives an atomic model through the classic protocol:
/// `initialise` once, then at every instant where the model is imminent
/// `output` followed by `internal_transition`, and whenever events are
/// delivered `external_transition`. `end_simulation` is called exactly once.
pub trait AtomicModel: Send {
    /// Short type name used in reports and traces.
    fn kind(&self) -> &'static str;

    /// Resets private state and variables; called once before any transition.
    fn initialise(&mut self, ctx: &InitContext<'_>) -> SimResult<()>;

    /// Delay until the next self-driven event, or an infinite duration.
    fn time_advance(&self) -> Duration;

    /// Events emitted when the model's deadline is reached.
    fn output(&mut self, ctx: &TransitionContext<'_>) -> Vec<Event>;

    fn internal_transition(
        &mut self,
        elapsed: Duration,
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()>;

    /// Applies a bag of coincident events, already ordered by
    /// [`AtomicModel::order_inputs`].
    fn external_transition(
        &mut self,
        elapsed: Duration,
        events: &[Event],
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()>;

    /// Model is imminent and has inputs at the same instant.
    fn confluent_transition(
        &mut self,
        elapsed: Duration,
        events: &[Event],
        ctx: &TransitionContext<'_>,
    ) -> SimResult<()> {
        self.internal_transition(elapsed, ctx)?;
        self.external_transition(Duration::zero(elapsed.unit()), events, ctx)
    }

    /// Largest bag of coincident events the model accepts in one
    /// external transition.
    fn max_inputs_per_transition(&self) -> usize {
        usize::MAX
    }

    fn order_inputs(&self, events: &mut [Event]) {
        events.sort_by(Event::priority_cmp);
    }

    /// Exported variables with their current values.
    fn variables(&self) -> Vec<Variable> {
        Vec::new()
    }

    fn end_simulation(&mut self, end: Time) -> ModelReport;
}
