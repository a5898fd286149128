//! Kernel error taxonomy.
//!
//! Contract violations (wiring bugs, illegal state transitions, unknown
//! names) and configuration errors are both surfaced as [`SimError`]. There
//! is no retryable class: the kernel is deterministic, so a failure is a
//! bug in the architecture or in the calling code.

use thiserror::Error;

use super::time::Time;

/// Result type for kernel operations.
pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    // ── Contract violations ───────────────────────────────

    /// An event arrived while the model was in a state it is not valid from.
    #[error("model {model}: event {event} is not valid in mode {mode}")]
    IllegalTransition {
        model: String,
        event: String,
        mode: String,
    },

    /// An event kind the model does not import was delivered to it.
    #[error("model {model} does not accept events of kind {event}")]
    UnexpectedEvent { model: String, event: String },

    #[error("unknown model {0}")]
    UnknownModel(String),

    #[error("model {model} has no variable {name}")]
    UnknownVariable { model: String, name: String },

    #[error("malformed architecture: {0}")]
    MalformedArchitecture(String),

    /// A model received more coincident events than it declares support for.
    #[error("model {model} received {received} events in one transition, supports at most {max}")]
    TooManyInputs {
        model: String,
        received: usize,
        max: usize,
    },

    /// An event timestamp lies before the current simulated time.
    #[error("event at {requested} is earlier than current time {current}")]
    NonMonotonicTime { requested: Time, current: Time },

    #[error("model {0} was already initialised")]
    AlreadyInitialised(String),

    #[error("model {0} was not initialised")]
    NotInitialised(String),

    /// Zero-delay transitions kept firing at one instant without settling.
    #[error("zero-delay livelock at {at} after {iterations} iterations")]
    ZeroDelayLivelock { at: Time, iterations: usize },

    // ── Configuration errors ──────────────────────────────

    #[error("missing required run parameter {0}")]
    MissingParameter(String),

    #[error("invalid run parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    // ── Scheduler lifecycle ───────────────────────────────

    /// The real-time scheduler thread is no longer running.
    #[error("scheduler has stopped")]
    SchedulerStopped,

    #[error("run has already finished")]
    RunFinished,
}
