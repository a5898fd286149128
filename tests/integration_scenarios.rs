//! End-to-end tests for presets, scenario files and the CLI binary.

mod common;

use std::path::Path;
use std::process::Command;

use appliance_sim::config::ScenarioConfig;
use appliance_sim::runner::{RunOptions, ScenarioOutcome, run_scenario};
use appliance_sim::scenario::{Scenario, ScenarioError};
use appliance_sim::sim::StopReason;

use common::approx_eq;

fn run_config(cfg: &ScenarioConfig) -> ScenarioOutcome {
    let scenario = Scenario::build(cfg).expect("scenario should build");
    run_scenario(scenario, RunOptions::default()).expect("scenario should run")
}

fn wind_with_seed(seed: u64) -> ScenarioOutcome {
    let mut cfg = ScenarioConfig::wind();
    cfg.simulation.seed = seed;
    run_config(&cfg)
}

#[test]
fn fan_preset_energy() {
    let report = run_config(&ScenarioConfig::fan()).report;
    assert_eq!(report.stop_reason, StopReason::EndReached);
    let expected = (600.0 * 30.0 + 600.0 * 60.0 + 600.0 * 30.0) / 3.6e6;
    let energy = report.metric("fan", "energy_kwh").expect("energy");
    assert!(approx_eq(energy, expected, 1e-12), "{energy} vs {expected}");
}

#[test]
fn water_heater_preset_holds_band_next_to_hair_dryer() {
    let report = run_config(&ScenarioConfig::water_heater()).report;

    // Five minutes on LOW.
    let dryer = report.metric("hair-dryer", "energy_kwh").expect("dryer");
    assert!(approx_eq(dryer, 660.0 * 300.0 / 3.6e6, 1e-12), "dryer {dryer}");

    let max_c = report.metric("tank", "max_temperature_c").expect("tank");
    assert!(max_c < 61.0, "tank overshot: {max_c}");
    assert!(report.metric("heater", "energy_kwh").unwrap_or(0.0) > 0.0);
    assert!(report.metric("heater-control", "forwarded").unwrap_or(0.0) >= 2.0);
}

#[test]
fn wind_preset_is_deterministic_per_seed() {
    let a = wind_with_seed(42).report;
    let b = wind_with_seed(42).report;
    assert_eq!(a.trace, b.trace);
    assert_eq!(a.reports, b.reports);

    let c = wind_with_seed(43).report;
    assert_ne!(
        a.metric("wind-speed", "mean_wind_speed_ms"),
        c.metric("wind-speed", "mean_wind_speed_ms")
    );
}

#[test]
fn wind_preset_charges_the_battery() {
    let report = wind_with_seed(42).report;
    // Mean wind well above cut-in keeps the turbine generating most of the day.
    assert!(report.metric("turbine", "mode_changes").unwrap_or(0.0) >= 1.0);
    assert!(report.metric("battery", "charged_kwh").unwrap_or(0.0) > 0.0);
    let soc = report.metric("battery", "final_soc").expect("soc");
    assert!((0.0..=1.0).contains(&soc));
}

#[test]
fn home_scenario_file_runs_with_a_custom_profile() {
    let cfg = ScenarioConfig::from_toml_file(Path::new("scenarios/home.toml"))
        .expect("scenario file should parse");
    assert!(cfg.validate().is_empty());
    let report = run_config(&cfg).report;

    let fan = report.metric("fan", "energy_kwh").expect("fan");
    assert!(approx_eq(fan, 3000.0 * 30.0 / 3.6e6, 1e-12), "fan {fan}");
    let kettle = report.metric("kettle", "energy_kwh").expect("kettle");
    assert!(approx_eq(kettle, 180.0 * 2200.0 / 3.6e6, 1e-12), "kettle {kettle}");
    assert_eq!(
        report
            .report("kettle")
            .and_then(|r| r.labels.get("final_mode").cloned()),
        Some("IDLE".to_string())
    );
    assert!(report.metric("tank", "max_temperature_c").unwrap_or(f64::MAX) < 61.0);
}

#[test]
fn injection_with_unknown_event_is_rejected() {
    let cfg = ScenarioConfig::from_toml_str(
        r#"
[[appliances]]
uri = "fan"
profile = "fan"

[[injections]]
at = 10.0
target = "fan"
event = "Dance"
"#,
    )
    .expect("config should parse");
    assert!(matches!(
        Scenario::build(&cfg),
        Err(ScenarioError::UnknownEvent { index: 0, .. })
    ));
}

#[test]
fn cli_runs_preset_and_writes_outputs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let trace_path = dir.path().join("trace.csv");
    let report_path = dir.path().join("report.csv");

    let output = Command::new(env!("CARGO_BIN_EXE_appliance-sim"))
        .args(["--preset", "fan", "--trace-out"])
        .arg(&trace_path)
        .arg("--report-out")
        .arg(&report_path)
        .output()
        .expect("appliance-sim process should run");
    assert!(
        output.status.success(),
        "run failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    assert!(stdout.contains("fan (Fan)"), "stdout: {stdout}");
    assert!(stdout.contains("energy_kwh=0.020000"), "stdout: {stdout}");

    let trace = std::fs::read_to_string(&trace_path).expect("trace file");
    let mut lines = trace.lines();
    assert_eq!(lines.next(), Some("time,unit,model,transition,events"));
    assert_eq!(lines.next(), Some("0.000000,seconds,fan,external,SwitchOn"));

    let reports = std::fs::read_to_string(&report_path).expect("report file");
    assert!(reports.lines().any(|l| l == "fan,Fan,final_mode,OFF"));
}

#[test]
fn cli_rejects_unknown_preset() {
    let output = Command::new(env!("CARGO_BIN_EXE_appliance-sim"))
        .args(["--preset", "sauna"])
        .output()
        .expect("appliance-sim process should run");
    assert!(!output.status.success());
}
