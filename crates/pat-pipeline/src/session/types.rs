//! Audit-trail types shared by the station session.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Metadata about a station session (one calibration serial).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Station identifier written into summaries.
    pub station: String,

    /// Summary schema version.
    pub schema_version: u32,

    /// Unix timestamp when the session was created (seconds since epoch).
    pub created_at: u64,

    /// Unix timestamp of the last recorded event.
    pub last_modified: u64,

    /// Optional operator-provided description.
    pub description: Option<String>,
}

impl SessionMetadata {
    pub fn new(station: impl Into<String>, schema_version: u32) -> Self {
        let now = current_timestamp();
        Self {
            station: station.into(),
            schema_version,
            created_at: now,
            last_modified: now,
            description: None,
        }
    }

    pub fn with_description(
        station: impl Into<String>,
        schema_version: u32,
        description: impl Into<String>,
    ) -> Self {
        let mut meta = Self::new(station, schema_version);
        meta.description = Some(description.into());
        meta
    }

    /// Update the last_modified timestamp to now.
    pub fn touch(&mut self) {
        self.last_modified = current_timestamp();
    }
}

/// One audit entry: a phase outcome or operator action.
///
/// Kept for the per-unit summary, not for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp (seconds since epoch).
    pub timestamp: u64,

    /// Operation name (e.g. "calibration", "light_test").
    pub operation: String,

    pub success: bool,

    /// Optional notes or failure reason.
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: None,
        }
    }

    pub fn success_with_notes(operation: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: true,
            notes: Some(notes.into()),
        }
    }

    pub fn failure(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation: operation.into(),
            success: false,
            notes: Some(reason.into()),
        }
    }
}

/// Current Unix timestamp in seconds; 0 if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
