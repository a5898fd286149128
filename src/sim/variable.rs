//! Continuous model variables and the run-wide board they are published to.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use super::error::{SimError, SimResult};
use super::time::Time;

/// A timestamped value owned by exactly one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: f64,
    /// Simulated time at which `value` became valid.
    pub time: Time,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: f64, time: Time) -> Self {
        Self {
            name: name.into(),
            value,
            time,
        }
    }
}

/// Fully qualified variable name: owning model URI plus variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableKey {
    pub model: String,
    pub name: String,
}

impl VariableKey {
    pub fn new(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.name)
    }
}

/// Latest published value of every model variable in a run.
///
/// Only the kernel writes the board, and only with values taken from the
/// owning model right after one of its transitions. Binding sinks and
/// external sensors read it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateBoard {
    current_time: Option<Time>,
    models: BTreeSet<String>,
    values: BTreeMap<VariableKey, Variable>,
}

impl StateBoard {
    pub fn new(models: impl IntoIterator<Item = String>) -> Self {
        Self {
            current_time: None,
            models: models.into_iter().collect(),
            values: BTreeMap::new(),
        }
    }

    pub fn current_time(&self) -> Option<Time> {
        self.current_time
    }

    pub(crate) fn set_current_time(&mut self, t: Time) {
        self.current_time = Some(t);
    }

    pub fn has_model(&self, uri: &str) -> bool {
        self.models.contains(uri)
    }

    pub(crate) fn publish(&mut self, model: &str, variables: Vec<Variable>) {
        for v in variables {
            self.values.insert(VariableKey::new(model, v.name.clone()), v);
        }
    }

    pub fn get(&self, key: &VariableKey) -> Option<&Variable> {
        self.values.get(key)
    }

    /// Looks up a variable, distinguishing unknown models from unknown
    /// variables.
    pub fn lookup(&self, model: &str, name: &str) -> SimResult<&Variable> {
        if !self.has_model(model) {
            return Err(SimError::UnknownModel(model.to_string()));
        }
        self.values
            .get(&VariableKey::new(model, name))
            .ok_or_else(|| SimError::UnknownVariable {
                model: model.to_string(),
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VariableKey, &Variable)> {
        self.values.iter()
    }
}
