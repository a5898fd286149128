//! Request handlers for the API endpoints.

use std::sync::{Arc, PoisonError};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, StateResponse, VariableRecord};
use crate::sim::error::SimError;

/// Returns the current simulated time and every published variable.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let finished = state
        .report
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some();
    let board = state.board.read().unwrap_or_else(PoisonError::into_inner);

    Json(StateResponse {
        time: board.current_time(),
        finished,
        variables: board.iter().map(VariableRecord::from).collect(),
    })
}

/// Returns one published variable.
///
/// `GET /models/{uri}/variables/{name}` → 200 + `VariableRecord` JSON
/// `GET /models/nope/variables/x` → 404 + `ErrorResponse`
pub async fn get_variable(
    State(state): State<Arc<AppState>>,
    Path((uri, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let board = state.board.read().unwrap_or_else(PoisonError::into_inner);
    match board.lookup(&uri, &name) {
        Ok(var) => Ok(Json(VariableRecord {
            model: uri,
            name,
            value: var.value,
            time: var.time,
        })),
        Err(e @ (SimError::UnknownModel(_) | SimError::UnknownVariable { .. })) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

/// Returns the final run report.
///
/// `GET /report` → 200 + `RunReport` JSON once the run has finished,
/// 404 + `ErrorResponse` before that.
pub async fn get_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.report.read().unwrap_or_else(PoisonError::into_inner);
    match report.as_ref() {
        Some(r) => Ok(Json(r.clone())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "run has not finished".into(),
            }),
        )),
    }
}
