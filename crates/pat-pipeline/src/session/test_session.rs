//! Station session container.

use std::fmt;

use anyhow::{Result, anyhow};
use pat_core::{ProfileReport, RunningAverage};
use serde::{Deserialize, Serialize};

use super::types::{LogEntry, SessionMetadata};

const STATION_NAME: &str = "pat";
/// Version of the per-unit summary layout.
pub const SCHEMA_VERSION: u32 = 1;

/// `<calibration_serial>-<test_serial>`, the key of every output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub calibration_serial: u64,
    pub test_serial: u64,
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.calibration_serial, self.test_serial)
    }
}

/// Pressure baseline state for this session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    /// Smoothed pressure at which calibration completed.
    pub baseline: Option<f64>,
    /// Calibration phases entered, including cancelled and timed-out ones.
    pub attempts: u32,
}

/// Outcome of the visual light-leak test for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualVerdict {
    #[default]
    NotRun,
    /// Translucent mask; the test does not apply.
    Skipped,
    Passed,
    Failed,
}

impl fmt::Display for VisualVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VisualVerdict::NotRun => "Not run",
            VisualVerdict::Skipped => "Skipped (translucent mask)",
            VisualVerdict::Passed => "Passed",
            VisualVerdict::Failed => "Failed",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualResult {
    pub verdict: VisualVerdict,
    /// Highest lux seen during the last light-test attempt.
    pub peak_lux: Option<f64>,
}

/// Results gathered for the unit currently on the stand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitResults {
    pub visual: VisualResult,
    /// One report per configured profile; empty until the waveform finished.
    pub pressure: Vec<ProfileReport>,
}

impl UnitResults {
    /// Overall verdict: visual not failed and every profile passed.
    pub fn passed(&self) -> bool {
        self.visual.verdict != VisualVerdict::Failed
            && !self.pressure.is_empty()
            && self.pressure.iter().all(|r| r.passed)
    }
}

/// Mutable state of one station session.
///
/// A session starts once per process with a freshly incremented calibration
/// serial. `test_serial` advances each time a new unit is loaded; the shared
/// pressure average runs for the whole session regardless of phase.
#[derive(Debug, Clone)]
pub struct TestSession {
    /// Session metadata (station, schema version, timestamps, description).
    pub metadata: SessionMetadata,

    calibration_serial: u64,
    test_serial: u64,

    pub calibration: CalibrationSession,

    /// Box-filtered pressure, updated every tick.
    pub average: RunningAverage,

    pub unit: UnitResults,

    units_completed: u64,

    /// Audit trail for the whole session.
    pub log: Vec<LogEntry>,

    /// Index of the first log entry of the current unit.
    unit_log_start: usize,
}

impl TestSession {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new(calibration_serial: u64) -> Self {
        Self {
            metadata: SessionMetadata::new(STATION_NAME, SCHEMA_VERSION),
            calibration_serial,
            test_serial: 0,
            calibration: CalibrationSession::default(),
            average: RunningAverage::new(),
            unit: UnitResults::default(),
            units_completed: 0,
            log: Vec::new(),
            unit_log_start: 0,
        }
    }

    pub fn with_description(calibration_serial: u64, description: impl Into<String>) -> Self {
        let mut session = Self::new(calibration_serial);
        session.metadata =
            SessionMetadata::with_description(STATION_NAME, SCHEMA_VERSION, description);
        session
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serials
    // ─────────────────────────────────────────────────────────────────────────

    pub fn calibration_serial(&self) -> u64 {
        self.calibration_serial
    }

    pub fn test_serial(&self) -> u64 {
        self.test_serial
    }

    pub fn run_id(&self) -> RunId {
        RunId {
            calibration_serial: self.calibration_serial,
            test_serial: self.test_serial,
        }
    }

    /// Load the next unit: bump `test_serial` and clear per-unit results.
    pub fn begin_unit(&mut self) -> RunId {
        self.test_serial += 1;
        self.unit = UnitResults::default();
        self.unit_log_start = self.log.len();
        let id = self.run_id();
        self.log_success_with_notes("load_unit", format!("unit {id}"));
        id
    }

    /// Mark the current unit as reported.
    pub fn finish_unit(&mut self) {
        self.units_completed += 1;
        self.metadata.touch();
    }

    pub fn units_completed(&self) -> u64 {
        self.units_completed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calibration
    // ─────────────────────────────────────────────────────────────────────────

    pub fn baseline(&self) -> Option<f64> {
        self.calibration.baseline
    }

    /// Baseline, or error if calibration never completed.
    pub fn require_baseline(&self) -> Result<f64> {
        self.calibration
            .baseline
            .ok_or_else(|| anyhow!("pressure baseline not calibrated"))
    }

    pub fn set_baseline(&mut self, baseline: f64) {
        self.calibration.baseline = Some(baseline);
        self.metadata.touch();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    pub fn log_success(&mut self, operation: impl Into<String>) {
        self.log.push(LogEntry::success(operation));
        self.metadata.touch();
    }

    pub fn log_success_with_notes(
        &mut self,
        operation: impl Into<String>,
        notes: impl Into<String>,
    ) {
        self.log.push(LogEntry::success_with_notes(operation, notes));
        self.metadata.touch();
    }

    pub fn log_failure(&mut self, operation: impl Into<String>, reason: impl Into<String>) {
        self.log.push(LogEntry::failure(operation, reason));
        self.metadata.touch();
    }

    /// Entries recorded since the current unit was loaded.
    pub fn unit_log(&self) -> &[LogEntry] {
        &self.log[self.unit_log_start.min(self.log.len())..]
    }
}
