//! appliance-sim entry point: CLI wiring, scenario loading and output.
//!
//! # Example
//!
//! ```bash
//! # Run the fan preset as fast as possible
//! appliance-sim --preset fan
//!
//! # Pace the water heater against the wall clock, 600x faster than real time
//! appliance-sim --preset water_heater --realtime --acceleration 600
//!
//! # Export the transition trace and final reports
//! appliance-sim --scenario home.toml --trace-out trace.csv --report-out report.csv
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use appliance_sim::config::ScenarioConfig;
use appliance_sim::io::export::{export_reports_csv, export_trace_csv};
use appliance_sim::runner::{PreparedRun, RunOptions};
use appliance_sim::scenario::Scenario;

/// Hybrid discrete-event simulator for household appliances.
///
/// Given the same scenario and seed, simulated runs produce identical
/// traces and reports.
#[derive(Parser, Debug)]
#[command(name = "appliance-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Load scenario from TOML config file
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (fan, water_heater, wind)
    #[arg(long, default_value = "fan")]
    preset: String,

    /// Override random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Pace the run against the wall clock
    #[arg(long)]
    realtime: bool,

    /// Simulated seconds per wall-clock second in real-time mode
    #[arg(long)]
    acceleration: Option<f64>,

    /// Export the transition trace to CSV
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Export the final model reports to CSV
    #[arg(long)]
    report_out: Option<PathBuf>,

    /// Start the read-only REST API
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value = "3000")]
    port: u16,
}

fn load_config(args: &Args) -> Result<ScenarioConfig> {
    // --scenario takes priority over --preset
    let mut cfg = match &args.scenario {
        Some(path) => ScenarioConfig::from_toml_file(path)?,
        None => ScenarioConfig::from_preset(&args.preset)?,
    };
    if let Some(seed) = args.seed {
        cfg.simulation.seed = seed;
    }
    let errors = cfg.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("scenario has {} configuration error(s)", errors.len());
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    let scenario = Scenario::build(&cfg).context("failed to build scenario")?;

    let options = RunOptions {
        realtime: args.realtime.then_some(true),
        acceleration: args.acceleration,
        ..RunOptions::default()
    };
    let prepared = PreparedRun::new(scenario, options).context("failed to prepare run")?;
    info!(mode = ?prepared.mode(), "starting run");

    #[cfg(feature = "api")]
    let api = args.serve.then(|| {
        let state = std::sync::Arc::new(appliance_sim::api::AppState::new(prepared.board()));
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
        let server_state = std::sync::Arc::clone(&state);
        let server = std::thread::spawn(move || -> Result<()> {
            let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
            rt.block_on(appliance_sim::api::serve(server_state, addr))
                .with_context(|| format!("API server on {addr} failed"))
        });
        (state, server)
    });

    let outcome = prepared.execute(|handle| {
        info!(start = %handle.start_time(), end = %handle.end_time(), "real-time run started");
    })?;
    let report = &outcome.report;

    for r in &report.reports {
        println!("{r}");
    }
    println!(
        "\n{} transitions, {} root outputs, stop reason {:?}",
        report.transitions,
        report.outputs.len(),
        report.stop_reason
    );
    if report.late_steps > 0 || report.rejected_events > 0 {
        println!(
            "{} late steps, {} rejected events",
            report.late_steps, report.rejected_events
        );
    }
    if outcome.control_commands > 0 {
        println!("{} host control commands", outcome.control_commands);
    }

    if let Some(path) = &args.trace_out {
        write_out(path, "trace", |p| export_trace_csv(&report.trace, p))?;
    }
    if let Some(path) = &args.report_out {
        write_out(path, "reports", |p| export_reports_csv(&report.reports, p))?;
    }

    #[cfg(feature = "api")]
    if let Some((state, server)) = api {
        state.set_report(outcome.report);
        info!("run finished, API keeps serving until interrupted");
        match server.join() {
            Ok(result) => result?,
            Err(_) => bail!("API server thread panicked"),
        }
    }

    Ok(())
}

fn write_out(
    path: &Path,
    what: &str,
    export: impl FnOnce(&Path) -> std::io::Result<()>,
) -> Result<()> {
    export(path).with_context(|| format!("failed to write {what} to {}", path.display()))?;
    eprintln!("{what} written to {}", path.display());
    Ok(())
}
