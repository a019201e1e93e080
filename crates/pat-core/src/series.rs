//! Append-only per-phase time series.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile::ProfileKind;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeriesError {
    #[error("{phase} sample at t={time_index} has {got} fields, expected {expected}")]
    FieldCount {
        phase: Phase,
        time_index: u64,
        expected: usize,
        got: usize,
    },
    #[error("{phase} sample at t={time_index} precedes last sample at t={last}")]
    OutOfOrder {
        phase: Phase,
        time_index: u64,
        last: u64,
    },
}

/// Test phase that produces a sample series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Baseline search before the pressure test.
    Calibration,
    /// Visual light-leak scan.
    Light,
    /// Pressure waveform judged against one profile.
    Pressure(ProfileKind),
}

const CALIBRATION_COLUMNS: [&str; 4] = ["time", "pressure_deviation", "ema", "consecutive_in_range"];
const LIGHT_COLUMNS: [&str; 4] = ["time", "limit", "reading", "high_water_mark"];
const PRESSURE_COLUMNS: [&str; 4] = ["time", "profile_min", "raw_reading", "profile_max"];

impl Phase {
    /// Header row, `time` first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Phase::Calibration => &CALIBRATION_COLUMNS,
            Phase::Light => &LIGHT_COLUMNS,
            Phase::Pressure(_) => &PRESSURE_COLUMNS,
        }
    }

    /// Number of value fields per record (excluding `time`).
    pub fn field_count(self) -> usize {
        self.columns().len() - 1
    }

    /// File stem used by the recorder, e.g. `pressure-normal`.
    pub fn file_stem(self) -> String {
        match self {
            Phase::Calibration => "calibration".to_string(),
            Phase::Light => "light".to_string(),
            Phase::Pressure(kind) => format!("pressure-{kind}"),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// One row: logical time plus the phase's value fields in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub time_index: u64,
    pub fields: Vec<f64>,
}

/// Ordered, append-only sequence of [`SampleRecord`]s for one phase.
///
/// Restarting a phase replaces the whole series; existing entries are never
/// edited or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    phase: Phase,
    records: Vec<SampleRecord>,
}

impl SampleSeries {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            records: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Append a record. `time_index` may repeat but never go backwards.
    pub fn push(&mut self, time_index: u64, fields: &[f64]) -> Result<(), SeriesError> {
        let expected = self.phase.field_count();
        if fields.len() != expected {
            return Err(SeriesError::FieldCount {
                phase: self.phase,
                time_index,
                expected,
                got: fields.len(),
            });
        }
        if let Some(last) = self.records.last()
            && time_index < last.time_index
        {
            return Err(SeriesError::OutOfOrder {
                phase: self.phase,
                time_index,
                last: last.time_index,
            });
        }
        self.records.push(SampleRecord {
            time_index,
            fields: fields.to_vec(),
        });
        Ok(())
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&SampleRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_and_columns() {
        assert_eq!(Phase::Calibration.file_stem(), "calibration");
        assert_eq!(Phase::Light.file_stem(), "light");
        assert_eq!(Phase::Pressure(ProfileKind::High).file_stem(), "pressure-high");
        assert_eq!(Phase::Light.columns()[3], "high_water_mark");
        assert_eq!(Phase::Pressure(ProfileKind::Normal).field_count(), 3);
    }

    #[test]
    fn push_keeps_order() {
        let mut series = SampleSeries::new(Phase::Light);
        series.push(0, &[150.0, 1.0, 1.0]).unwrap();
        series.push(0, &[150.0, 2.0, 2.0]).unwrap();
        series.push(3, &[150.0, 0.5, 2.0]).unwrap();

        let err = series.push(2, &[150.0, 0.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            SeriesError::OutOfOrder {
                phase: Phase::Light,
                time_index: 2,
                last: 3
            }
        );
        assert_eq!(series.len(), 3);
        assert_eq!(series.last().unwrap().fields, vec![150.0, 0.5, 2.0]);
    }

    #[test]
    fn push_checks_field_count() {
        let mut series = SampleSeries::new(Phase::Calibration);
        let err = series.push(0, &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            SeriesError::FieldCount {
                expected: 3,
                got: 1,
                ..
            }
        ));
        assert!(series.is_empty());
    }
}
