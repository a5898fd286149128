//! Hybrid discrete-event simulator for household appliances.

pub mod config;
pub mod control;
pub mod devices;
pub mod runner;
pub mod scenario;
/// Simulation kernel: time, events, models, runs and the real-time scheduler.
pub mod sim;

/// Output of finished runs.
pub mod io {
    pub mod export;
}

#[cfg(feature = "api")]
pub mod api;
