//! Run parameters: per-run overrides of model constants.
//!
//! Keys are `"<model-uri>:<name>"`. Physical constants live here rather than
//! in process-wide state, so parallel runs stay isolated.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::error::{SimError, SimResult};

/// A single run parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Real(f64),
    Text(String),
}

/// Receiver of kernel traces in the hosting application.
///
/// The host hands itself to the run through [`RunParameters::with_host`];
/// the run removes it from the mapping before any model sees the
/// parameters.
pub trait HostTracer: Send + Sync {
    fn trace(&self, model: &str, message: &str);
}

/// Flat name→value mapping consulted by models at initialise time.
#[derive(Clone, Default)]
pub struct RunParameters {
    values: BTreeMap<String, ParamValue>,
    host: Option<Arc<dyn HostTracer>>,
}

impl fmt::Debug for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunParameters")
            .field("values", &self.values)
            .field("host", &self.host.is_some())
            .finish()
    }
}

impl RunParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the key under which a model looks up `name`.
    pub fn key(model: &str, name: &str) -> String {
        format!("{model}:{name}")
    }

    pub fn set_real(&mut self, model: &str, name: &str, value: f64) -> &mut Self {
        self.values.insert(Self::key(model, name), ParamValue::Real(value));
        self
    }

    pub fn set_text(&mut self, model: &str, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(Self::key(model, name), ParamValue::Text(value.into()));
        self
    }

    /// Inserts a pre-qualified key, as read from a scenario file.
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.values.insert(key.into(), value);
    }

    pub fn with_host(mut self, host: Arc<dyn HostTracer>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Removes the host back-reference from the mapping.
    pub fn take_host(&mut self) -> Option<Arc<dyn HostTracer>> {
        self.host.take()
    }

    pub fn get(&self, model: &str, name: &str) -> Option<&ParamValue> {
        self.values.get(&Self::key(model, name))
    }

    /// Returns a real-valued parameter if present.
    ///
    /// A parameter present with a non-real value is an error.
    pub fn real(&self, model: &str, name: &str) -> SimResult<Option<f64>> {
        match self.get(model, name) {
            None => Ok(None),
            Some(ParamValue::Real(v)) => Ok(Some(*v)),
            Some(ParamValue::Text(t)) => Err(SimError::InvalidParameter {
                name: Self::key(model, name),
                message: format!("expected a number, got \"{t}\""),
            }),
        }
    }

    pub fn real_or(&self, model: &str, name: &str, default: f64) -> SimResult<f64> {
        Ok(self.real(model, name)?.unwrap_or(default))
    }

    pub fn required_real(&self, model: &str, name: &str) -> SimResult<f64> {
        self.real(model, name)?
            .ok_or_else(|| SimError::MissingParameter(Self::key(model, name)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
