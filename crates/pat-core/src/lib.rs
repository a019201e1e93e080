//! Core signal and decision primitives for the PPE analysis test stand (PAT).
//!
//! This crate is free of I/O and timing. It contains:
//!
//! - [`SignalSmoother`] and [`RunningAverage`]: pressure conditioning filters,
//! - [`CalibrationController`]: baseline search with timeout and cancellation,
//! - [`ToleranceProfile`]: time-indexed acceptance envelopes with pass/fail
//!   accounting,
//! - [`SampleSeries`]: append-only per-phase time series.
//!
//! Orchestration, persistence and operator interaction live in
//! `pat-pipeline`.
//!
//! # Example
//!
//! ```
//! use pat_core::{ProfileKind, ToleranceProfile};
//!
//! let mut normal = ToleranceProfile::new(ProfileKind::Normal).unwrap();
//! let mut high = ToleranceProfile::new(ProfileKind::High).unwrap();
//! for (t, v) in [0.0, 0.1, 3.0].into_iter().enumerate() {
//!     normal.step(t as u64, v);
//!     high.step(t as u64, v);
//! }
//! assert!(!normal.report().passed);
//! assert_eq!(high.report().failed_points, 1);
//! ```

/// Baseline calibration controller.
pub mod calibration;
/// Tolerance envelopes and profiles.
pub mod profile;
/// Per-phase sample series.
pub mod series;
/// Smoothing filters.
pub mod smoother;

pub use calibration::*;
pub use profile::*;
pub use series::*;
pub use smoother::*;
