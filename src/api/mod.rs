//! Read-only REST API over a run's published state.
//!
//! Provides three GET endpoints:
//! - `/state`: current simulated time and every published variable
//! - `/models/{uri}/variables/{name}`: one variable
//! - `/report`: the final run report, once the run has finished

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::sim::run::RunReport;
use crate::sim::variable::StateBoard;

pub use types::{ErrorResponse, StateResponse, VariableRecord};

/// Application state shared across all request handlers.
///
/// The board is the one the kernel publishes to, so a real-time run can be
/// observed while it progresses. The report slot is filled by the host once
/// the run finishes.
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<RwLock<StateBoard>>,
    pub report: Arc<RwLock<Option<RunReport>>>,
}

impl AppState {
    pub fn new(board: Arc<RwLock<StateBoard>>) -> Self {
        Self {
            board,
            report: Arc::new(RwLock::new(None)),
        }
    }

    /// Stores the final report for `/report`.
    pub fn set_report(&self, report: RunReport) {
        *self.report.write().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route(
            "/models/{uri}/variables/{name}",
            get(handlers::get_variable),
        )
        .route("/report", get(handlers::get_report))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
