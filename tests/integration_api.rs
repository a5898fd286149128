//! Integration tests for the REST API feature.

#![cfg(feature = "api")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use appliance_sim::api::{AppState, router};
use appliance_sim::config::ScenarioConfig;
use appliance_sim::runner::{PreparedRun, RunOptions};
use appliance_sim::scenario::Scenario;

/// Runs the water heater preset and returns API state over its board.
fn finished_water_heater() -> Arc<AppState> {
    let scenario = Scenario::build(&ScenarioConfig::water_heater()).expect("scenario");
    let prepared = PreparedRun::new(scenario, RunOptions::default()).expect("prepared run");
    let state = Arc::new(AppState::new(prepared.board()));
    let outcome = prepared.execute(|_| {}).expect("run");
    state.set_report(outcome.report);
    state
}

async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let app = router(state);
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn state_reflects_the_finished_run() {
    let (status, json) = get_json(finished_water_heater(), "/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finished"], true);
    assert_eq!(json["time"]["value"], 86_400.0);

    let vars = json["variables"].as_array().unwrap();
    assert!(
        vars.iter()
            .any(|v| v["model"] == "tank" && v["name"] == "temperature_c")
    );
    assert!(
        vars.iter()
            .any(|v| v["model"] == "hair-dryer" && v["name"] == "power_w")
    );
}

#[tokio::test]
async fn tank_temperature_stays_in_band() {
    let (status, json) =
        get_json(finished_water_heater(), "/models/tank/variables/temperature_c").await;
    assert_eq!(status, StatusCode::OK);
    let t = json["value"].as_f64().unwrap();
    assert!((45.0..61.0).contains(&t), "tank at {t}");
}

#[tokio::test]
async fn report_lists_every_model() {
    let (status, json) = get_json(finished_water_heater(), "/report").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stop_reason"], "EndReached");
    let models: Vec<&str> = json["reports"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["model"].as_str())
        .collect();
    for uri in ["hair-dryer", "heater-control", "heater", "tank", "thermostat"] {
        assert!(models.contains(&uri), "missing {uri} in {models:?}");
    }
}

#[tokio::test]
async fn board_is_live_before_the_run() {
    let scenario = Scenario::build(&ScenarioConfig::fan()).expect("scenario");
    let prepared = PreparedRun::new(scenario, RunOptions::default()).expect("prepared run");
    let state = Arc::new(AppState::new(prepared.board()));

    let (status, json) = get_json(Arc::clone(&state), "/models/fan/variables/mode").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], 0.0);

    let (status, _) = get_json(state, "/report").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
