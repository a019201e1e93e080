//! Output naming, series persistence and report composition.
//!
//! Layout under the output root:
//!
//! ```text
//! <root>/<cal_serial>/<test_serial>-calibration.csv
//! <root>/<cal_serial>/<test_serial>-light.csv
//! <root>/<cal_serial>/<test_serial>-pressure-<profile>.csv
//! <root>/<cal_serial>/<test_serial>-report.txt
//! <root>/<cal_serial>/<test_serial>-summary.json
//! ```
//!
//! Every file is written whole, once, when its phase completes.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use chrono::NaiveDateTime;
use log::debug;
use pat_core::{Phase, ProfileReport, SampleSeries};
use serde::{Deserialize, Serialize};

use crate::session::{
    LogEntry, RunId, SCHEMA_VERSION, SessionMetadata, UnitResults, VisualResult,
};
use crate::stand::EnvironmentReading;

const REPORT_HEADER: &str = "PPE Analysis Test-stand (PAT)";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything the report needs about one unit.
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub run: RunId,
    pub tested_at: NaiveDateTime,
    /// Raw pressure reading at report time (hPa).
    pub raw_pressure: Option<f64>,
    pub baseline: Option<f64>,
    pub environment: Option<EnvironmentReading>,
    pub visible_limit: f64,
    pub unit: &'a UnitResults,
}

/// Machine-readable counterpart of the text report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Station, schema version and session timestamps.
    pub session: SessionMetadata,
    pub run: RunId,
    pub tested_at: String,
    pub passed: bool,
    pub raw_pressure: Option<f64>,
    pub baseline: Option<f64>,
    pub environment: Option<EnvironmentReading>,
    pub visible_limit: f64,
    pub visual: VisualResult,
    pub pressure: Vec<ProfileReport>,
    /// Audit entries recorded for this unit.
    pub log: Vec<LogEntry>,
}

impl TestSummary {
    pub fn new(ctx: &ReportContext<'_>, session: &SessionMetadata, log: &[LogEntry]) -> Self {
        Self {
            session: session.clone(),
            run: ctx.run,
            tested_at: ctx.tested_at.format(TIMESTAMP_FORMAT).to_string(),
            passed: ctx.unit.passed(),
            raw_pressure: ctx.raw_pressure,
            baseline: ctx.baseline,
            environment: ctx.environment,
            visible_limit: ctx.visible_limit,
            visual: ctx.unit.visual,
            pressure: ctx.unit.pressure.clone(),
            log: log.to_vec(),
        }
    }
}

/// Compose the plain-text report.
///
/// Sections in order: header and serial, timestamp, environment snapshot
/// (lines only for available values), visible light test, pressure test.
pub fn compose_report(ctx: &ReportContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{REPORT_HEADER}\n");
    let _ = writeln!(out, "Test Serial #: {}", ctx.run);
    let _ = writeln!(out, "Tested At: {}", ctx.tested_at.format(TIMESTAMP_FORMAT));
    if let Some(p) = ctx.raw_pressure {
        let _ = writeln!(out, "Raw Barometric Pressure: {p:.6} hPa");
    }
    if let Some(b) = ctx.baseline {
        let _ = writeln!(out, "Barometric Calibration Value: {b:.6} hPa");
    }
    if let Some(env) = ctx.environment {
        let _ = writeln!(out, "Temperature: {:.6} Degrees C", env.temperature_c);
        let _ = writeln!(out, "Relative Humidity: {:.6} %", env.humidity_pct);
    }
    out.push_str("\n\n");

    out.push_str(" ################## Visible Light Test ##################\n");
    let visual = &ctx.unit.visual;
    let _ = writeln!(out, "Test Status: {}", visual.verdict);
    if let Some(peak) = visual.peak_lux {
        let _ = writeln!(
            out,
            "Maximum Light Level: {peak:.6} (limit {:.6})",
            ctx.visible_limit
        );
    }
    out.push_str("\n\n");

    out.push_str(" ##################### Pressure Test ####################\n");
    out.push_str(" Profile:\n");
    if ctx.unit.pressure.is_empty() {
        out.push_str("  not run\n");
    }
    for report in &ctx.unit.pressure {
        if report.passed {
            let _ = writeln!(out, "  {}   PASSED", report.name);
        } else {
            let _ = writeln!(out, "  {}   FAILED", report.name);
            let _ = writeln!(
                out,
                "\t\t missed {} out of {} ({:.6} %)",
                report.failed_points,
                report.points_evaluated,
                report.failed_percent()
            );
        }
    }
    out
}

/// Writes and reads the per-run files under one output root.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    root: PathBuf,
}

impl RunRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every file of one calibration serial.
    pub fn session_dir(&self, calibration_serial: u64) -> PathBuf {
        self.root.join(calibration_serial.to_string())
    }

    /// Create the session directory.
    pub fn prepare(&self, calibration_serial: u64) -> Result<PathBuf> {
        let dir = self.session_dir(calibration_serial);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(dir)
    }

    pub fn series_path(&self, run: RunId, phase: Phase) -> PathBuf {
        self.run_file(run, &format!("{}.csv", phase.file_stem()))
    }

    pub fn report_path(&self, run: RunId) -> PathBuf {
        self.run_file(run, "report.txt")
    }

    pub fn summary_path(&self, run: RunId) -> PathBuf {
        self.run_file(run, "summary.json")
    }

    fn run_file(&self, run: RunId, suffix: &str) -> PathBuf {
        self.session_dir(run.calibration_serial)
            .join(format!("{}-{suffix}", run.test_serial))
    }

    /// Write a whole series as CSV, header first.
    pub fn persist_series(&self, run: RunId, series: &SampleSeries) -> Result<PathBuf> {
        let path = self.series_path(run, series.phase());
        let file = create_file(&path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "{}", series.phase().columns().join(","))?;
        for record in series.records() {
            write!(w, "{}", record.time_index)?;
            for value in &record.fields {
                write!(w, ",{value}")?;
            }
            writeln!(w)?;
        }
        w.flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!("wrote {} samples to {}", series.len(), path.display());
        Ok(path)
    }

    /// Read a CSV written by [`persist_series`](Self::persist_series).
    pub fn load_series(path: &Path, phase: Phase) -> Result<SampleSeries> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut lines = text.lines();

        let expected = phase.columns().join(",");
        match lines.next() {
            Some(header) if header.trim() == expected => {}
            Some(header) => bail!(
                "{}: header {header:?} does not match {phase} columns {expected:?}",
                path.display()
            ),
            None => bail!("{}: empty file", path.display()),
        }

        let mut series = SampleSeries::new(phase);
        for (n, line) in lines.enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let row = n + 2;
            let mut cells = line.split(',').map(str::trim);
            let time_index = cells
                .next()
                .unwrap_or_default()
                .parse::<u64>()
                .with_context(|| format!("{}:{row}: bad time index", path.display()))?;
            let fields = cells
                .map(|c| c.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("{}:{row}: bad value", path.display()))?;
            series
                .push(time_index, &fields)
                .with_context(|| format!("{}:{row}", path.display()))?;
        }
        Ok(series)
    }

    pub fn persist_report(&self, run: RunId, report: &str) -> Result<PathBuf> {
        let path = self.report_path(run);
        ensure!(!report.is_empty(), "refusing to write an empty report for {run}");
        let mut file = create_file(&path)?;
        file.write_all(report.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn persist_summary(&self, summary: &TestSummary) -> Result<PathBuf> {
        let path = self.summary_path(summary.run);
        let mut w = BufWriter::new(create_file(&path)?);
        serde_json::to_writer_pretty(&mut w, summary)
            .with_context(|| format!("failed to write {}", path.display()))?;
        w.flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Read a summary back; rejects summaries written by a newer schema.
    pub fn load_summary(path: &Path) -> Result<TestSummary> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let summary: TestSummary = serde_json::from_str(&data)
            .with_context(|| format!("invalid summary {}", path.display()))?;
        if summary.session.schema_version > SCHEMA_VERSION {
            bail!(
                "{}: summary schema version {} is newer than supported version {}",
                path.display(),
                summary.session.schema_version,
                SCHEMA_VERSION
            );
        }
        Ok(summary)
    }
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::VisualVerdict;
    use chrono::NaiveDate;
    use pat_core::ProfileKind;

    fn run(test_serial: u64) -> RunId {
        RunId {
            calibration_serial: 7,
            test_serial,
        }
    }

    fn tested_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 30)
            .unwrap()
    }

    fn unit() -> UnitResults {
        UnitResults {
            visual: VisualResult {
                verdict: VisualVerdict::Passed,
                peak_lux: Some(12.5),
            },
            pressure: vec![
                ProfileReport {
                    name: "normal".into(),
                    passed: true,
                    failed_points: 0,
                    points_evaluated: 100,
                },
                ProfileReport {
                    name: "high".into(),
                    passed: false,
                    failed_points: 36,
                    points_evaluated: 100,
                },
            ],
        }
    }

    #[test]
    fn paths_follow_layout() {
        let rec = RunRecorder::new("/data/out");
        assert_eq!(
            rec.series_path(run(3), Phase::Pressure(ProfileKind::High)),
            PathBuf::from("/data/out/7/3-pressure-high.csv")
        );
        assert_eq!(
            rec.series_path(run(3), Phase::Calibration),
            PathBuf::from("/data/out/7/3-calibration.csv")
        );
        assert_eq!(rec.report_path(run(1)), PathBuf::from("/data/out/7/1-report.txt"));
        assert_eq!(rec.summary_path(run(1)), PathBuf::from("/data/out/7/1-summary.json"));
    }

    #[test]
    fn series_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let rec = RunRecorder::new(dir.path());
        assert!(rec.prepare(7).unwrap().is_dir());

        let mut series = SampleSeries::new(Phase::Light);
        series.push(0, &[150.0, 0.1, 0.1]).unwrap();
        series.push(1, &[150.0, 12.345678901, 12.345678901]).unwrap();
        series.push(2, &[150.0, 1e-9, 12.345678901]).unwrap();

        let path = rec.persist_series(run(2), &series).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time,limit,reading,high_water_mark\n0,150,0.1,0.1\n"));

        let loaded = RunRecorder::load_series(&path, Phase::Light).unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn load_rejects_wrong_header() {
        let dir = tempfile::tempdir().unwrap();
        let rec = RunRecorder::new(dir.path());
        let mut series = SampleSeries::new(Phase::Calibration);
        series.push(500, &[0.0, 1013.0, 1.0]).unwrap();
        let path = rec.persist_series(run(1), &series).unwrap();

        let err = RunRecorder::load_series(&path, Phase::Light).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn report_sections_in_order() {
        let unit = unit();
        let ctx = ReportContext {
            run: run(4),
            tested_at: tested_at(),
            raw_pressure: Some(1013.25),
            baseline: Some(1013.0),
            environment: Some(EnvironmentReading {
                temperature_c: 21.5,
                humidity_pct: 40.0,
            }),
            visible_limit: 150.0,
            unit: &unit,
        };
        let text = compose_report(&ctx);

        let order = [
            "PPE Analysis Test-stand (PAT)",
            "Test Serial #: 7-4",
            "Tested At: 2024-03-09 14:05:30",
            "Raw Barometric Pressure: 1013.250000 hPa",
            "Barometric Calibration Value: 1013.000000 hPa",
            "Temperature: 21.500000 Degrees C",
            "Relative Humidity: 40.000000 %",
            "Visible Light Test",
            "Test Status: Passed",
            "Maximum Light Level: 12.500000 (limit 150.000000)",
            "Pressure Test",
            "  normal   PASSED",
            "  high   FAILED",
            "missed 36 out of 100 (36.000000 %)",
        ];
        let mut at = 0;
        for needle in order {
            let found = text[at..]
                .find(needle)
                .unwrap_or_else(|| panic!("{needle:?} missing or out of order in\n{text}"));
            at += found + needle.len();
        }
    }

    #[test]
    fn report_omits_unavailable_values() {
        let mut unit = unit();
        unit.visual = VisualResult {
            verdict: VisualVerdict::Skipped,
            peak_lux: None,
        };
        let ctx = ReportContext {
            run: run(1),
            tested_at: tested_at(),
            raw_pressure: Some(1000.0),
            baseline: None,
            environment: None,
            visible_limit: 150.0,
            unit: &unit,
        };
        let text = compose_report(&ctx);
        assert!(text.contains("Raw Barometric Pressure"));
        assert!(!text.contains("Calibration Value"));
        assert!(!text.contains("Temperature"));
        assert!(!text.contains("Maximum Light Level"));
        assert!(text.contains("Test Status: Skipped (translucent mask)"));
    }

    #[test]
    fn report_and_summary_written() {
        let dir = tempfile::tempdir().unwrap();
        let rec = RunRecorder::new(dir.path());
        let unit = unit();
        let ctx = ReportContext {
            run: run(5),
            tested_at: tested_at(),
            raw_pressure: None,
            baseline: Some(1012.0),
            environment: None,
            visible_limit: 150.0,
            unit: &unit,
        };

        let report_path = rec.persist_report(ctx.run, &compose_report(&ctx)).unwrap();
        assert!(fs::read_to_string(report_path).unwrap().contains("7-5"));

        let meta = SessionMetadata::with_description("pat", SCHEMA_VERSION, "bench 2");
        let summary = TestSummary::new(&ctx, &meta, &[LogEntry::success("pressure_test")]);
        assert!(!summary.passed);
        let path = rec.persist_summary(&summary).unwrap();
        assert_eq!(path, dir.path().join("7").join("5-summary.json"));

        let loaded = RunRecorder::load_summary(&path).unwrap();
        assert_eq!(loaded, summary);
        assert_eq!(loaded.session.station, "pat");
        assert_eq!(loaded.session.description.as_deref(), Some("bench 2"));
    }

    #[test]
    fn newer_summary_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rec = RunRecorder::new(dir.path());
        let unit = unit();
        let ctx = ReportContext {
            run: run(6),
            tested_at: tested_at(),
            raw_pressure: None,
            baseline: None,
            environment: None,
            visible_limit: 150.0,
            unit: &unit,
        };
        let meta = SessionMetadata::new("pat", SCHEMA_VERSION + 1);
        let path = rec.persist_summary(&TestSummary::new(&ctx, &meta, &[])).unwrap();

        let err = RunRecorder::load_summary(&path).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }
}
