//! API response types.

use serde::Serialize;

use crate::sim::time::Time;
use crate::sim::variable::{Variable, VariableKey};

/// Current simulated time and every published variable.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// Latest instant the kernel has executed, absent before the first
    /// publication.
    pub time: Option<Time>,
    /// Whether the final report is available.
    pub finished: bool,
    /// Published variables, sorted by model then name.
    pub variables: Vec<VariableRecord>,
}

/// One published variable.
#[derive(Debug, Serialize)]
pub struct VariableRecord {
    pub model: String,
    pub name: String,
    pub value: f64,
    /// Instant at which the owning model last published it.
    pub time: Time,
}

impl From<(&VariableKey, &Variable)> for VariableRecord {
    fn from((key, var): (&VariableKey, &Variable)) -> Self {
        Self {
            model: key.model.clone(),
            name: key.name.clone(),
            value: var.value,
            time: var.time,
        }
    }
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
