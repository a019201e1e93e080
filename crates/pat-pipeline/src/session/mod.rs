//! Station session state.
//!
//! A [`TestSession`] lives for one calibration serial. It owns the shared
//! pressure [`RunningAverage`](pat_core::RunningAverage), the calibration
//! baseline, the per-unit results and an audit log.

mod test_session;
mod types;

pub use test_session::{
    CalibrationSession, RunId, SCHEMA_VERSION, TestSession, UnitResults, VisualResult,
    VisualVerdict,
};
pub use types::{LogEntry, SessionMetadata, current_timestamp};
