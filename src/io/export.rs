//! CSV export for transition traces and end-of-run reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::model::ModelReport;
use crate::sim::simulator::TraceRecord;

/// Column header for trace export.
const TRACE_HEADER: &[&str] = &["time", "unit", "model", "transition", "events"];

/// Column header for report export: one row per metric or label.
const REPORT_HEADER: &[&str] = &["model", "kind", "name", "value"];

/// Exports a transition trace to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_csv(trace: &[TraceRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_trace_csv(trace, io::BufWriter::new(file))
}

/// Writes a transition trace as CSV to any writer.
///
/// One row per executed transition, in execution order. Delivered event
/// kinds are joined with `|` in the order they were applied. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_trace_csv(trace: &[TraceRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(TRACE_HEADER)?;

    for r in trace {
        wtr.write_record(&[
            format!("{:.6}", r.time.value()),
            format!("{:?}", r.time.unit()).to_lowercase(),
            r.model.clone(),
            r.transition.to_string(),
            r.events.join("|"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports final model reports to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_reports_csv(reports: &[ModelReport], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_reports_csv(reports, io::BufWriter::new(file))
}

/// Writes final model reports as CSV to any writer.
///
/// Metrics come first for each model, then labels, both sorted by name.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_reports_csv(reports: &[ModelReport], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(REPORT_HEADER)?;

    for report in reports {
        for (name, value) in &report.metrics {
            wtr.write_record([
                report.model.as_str(),
                report.kind.as_str(),
                name.as_str(),
                format!("{value:.6}").as_str(),
            ])?;
        }
        for (name, value) in &report.labels {
            wtr.write_record([
                report.model.as_str(),
                report.kind.as_str(),
                name.as_str(),
                value.as_str(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::simulator::TransitionKind;
    use crate::sim::time::{Time, TimeUnit};

    fn make_record(t: f64) -> TraceRecord {
        TraceRecord {
            time: Time::new(t, TimeUnit::Seconds),
            model: "fan".into(),
            transition: TransitionKind::External,
            events: vec!["SwitchOn".into(), "SetHigh".into()],
        }
    }

    fn make_report() -> ModelReport {
        ModelReport::new("fan", "Fan")
            .metric("energy_kwh", 0.025)
            .metric("mode_changes", 2.0)
            .label("final_mode", "OFF")
    }

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap_or_default()
    }

    #[test]
    fn trace_header_and_row() {
        let mut buf = Vec::new();
        write_trace_csv(&[make_record(5.0)], &mut buf).ok();
        let output = to_string(buf);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "time,unit,model,transition,events");
        assert_eq!(lines[1], "5.000000,seconds,fan,external,SwitchOn|SetHigh");
    }

    #[test]
    fn trace_row_count_matches_transitions() {
        let trace: Vec<TraceRecord> = (0..10).map(|i| make_record(i as f64)).collect();
        let mut buf = Vec::new();
        write_trace_csv(&trace, &mut buf).ok();
        // 1 header + 10 data rows
        assert_eq!(to_string(buf).lines().count(), 11);
    }

    #[test]
    fn reports_list_metrics_then_labels() {
        let mut buf = Vec::new();
        write_reports_csv(&[make_report()], &mut buf).ok();
        let output = to_string(buf);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "model,kind,name,value",
                "fan,Fan,energy_kwh,0.025000",
                "fan,Fan,mode_changes,2.000000",
                "fan,Fan,final_mode,OFF",
            ]
        );
    }

    #[test]
    fn deterministic_output() {
        let trace: Vec<TraceRecord> = (0..5).map(|i| make_record(i as f64)).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_trace_csv(&trace, &mut buf1).ok();
        write_trace_csv(&trace, &mut buf2).ok();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn reports_are_parseable() {
        let mut buf = Vec::new();
        write_reports_csv(&[make_report()], &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().ok();
        assert_eq!(headers.as_ref().map(csv::StringRecord::len), Some(4));
        let rows: Vec<csv::StringRecord> = rdr.records().filter_map(Result::ok).collect();
        assert_eq!(rows.len(), 3);
        let energy: Result<f64, _> = rows[0][3].parse();
        assert_eq!(energy.ok(), Some(0.025));
    }
}
