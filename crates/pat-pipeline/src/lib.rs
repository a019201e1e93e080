//! Test-run orchestration for the PPE analysis test stand (PAT).
//!
//! This crate wires the primitives of `pat-core` into a station:
//!
//! - [`TestStateMachine`] sequences the visual light test, pressure
//!   calibration and pressure waveform test for each unit,
//! - [`RunRecorder`] names and writes the per-run CSV, report and summary
//!   files,
//! - [`TestSession`] carries serials, the shared pressure average, per-unit
//!   results and an audit log,
//! - [`StationRunner`] polls a [`TestStand`] and drives the machine.
//!
//! # Example
//!
//! ```no_run
//! use pat_pipeline::{RunRecorder, SerialStore, StationConfig, TestSession, TestStateMachine};
//! # fn main() -> anyhow::Result<()> {
//! let config = StationConfig::default();
//! let serial = SerialStore::new(&config.serial_file).next_calibration_serial()?;
//! let recorder = RunRecorder::new(&config.output_dir);
//! recorder.prepare(serial)?;
//!
//! let machine = TestStateMachine::new(config, TestSession::new(serial), recorder)?;
//! # let _ = machine;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod machine;
pub mod recorder;
pub mod runner;
pub mod serial;
pub mod session;
pub mod stand;

pub use config::{LightConfig, PressureConfig, RecordedLimit, StartBackPolicy, StationConfig};
pub use debounce::Debouncer;
pub use machine::{TestState, TestStateMachine, TickInput, TickOutcome, Transition};
pub use recorder::{ReportContext, RunRecorder, TestSummary, compose_report};
pub use runner::StationRunner;
pub use serial::SerialStore;
pub use session::{
    CalibrationSession, LogEntry, RunId, SCHEMA_VERSION, SessionMetadata, TestSession,
    UnitResults, VisualResult, VisualVerdict,
};
pub use stand::{ButtonLevels, EnvironmentReading, Menu, TestStand};
