//! Station configuration.
//!
//! All fields have defaults reproducing the fixed test sequence; a JSON file
//! only needs to name the values it overrides.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use pat_core::{CalibrationConfig, ProfileKind};
use serde::{Deserialize, Serialize};

/// What the operator's `back` press on the start menu does.
///
/// The original control flow pointed this edge at a state that does not
/// exist, so the behaviour is a policy rather than an inferred intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartBackPolicy {
    /// Log and stay on the start menu.
    #[default]
    Ignore,
    /// Go straight to pressure calibration, as the "Calibrate" label suggests.
    Calibrate,
    /// Follow the undefined target and halt in the error state.
    Legacy,
}

/// Value written to the light CSV `limit` column on non-breach ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedLimit {
    /// Record the configured `visible_limit`.
    #[default]
    VisibleLimit,
    /// Record a fixed value (`0.5` reproduces historical files).
    Fixed(f64),
}

impl RecordedLimit {
    pub fn value(self, visible_limit: f64) -> f64 {
        match self {
            RecordedLimit::VisibleLimit => visible_limit,
            RecordedLimit::Fixed(v) => v,
        }
    }
}

/// Visual light-leak test settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// A reading above this (lux) fails the visual test.
    pub visible_limit: f64,
    pub recorded_limit: RecordedLimit,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            visible_limit: 150.0,
            recorded_limit: RecordedLimit::default(),
        }
    }
}

/// Pressure waveform test settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Length of the replayed waveform in ticks.
    pub duration_ticks: u64,
    pub actuator_on_tick: u64,
    pub actuator_off_tick: u64,
    /// Profiles judged in parallel against the same readings.
    pub profiles: Vec<ProfileKind>,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            duration_ticks: 100,
            actuator_on_tick: 5,
            actuator_off_tick: 50,
            profiles: ProfileKind::ALL.to_vec(),
        }
    }
}

/// Complete test-stand configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Root of the per-calibration output tree.
    pub output_dir: PathBuf,
    /// Plain-text calibration serial counter.
    pub serial_file: PathBuf,
    /// Stable samples required before a button level change counts.
    pub debounce_ticks: u32,
    /// Control loop pacing used by the binary.
    pub tick_interval_ms: u64,
    pub start_back: StartBackPolicy,
    pub calibration: CalibrationConfig,
    pub light: LightConfig,
    pub pressure: PressureConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            serial_file: PathBuf::from("./cal_serial.txt"),
            debounce_ticks: 2,
            tick_interval_ms: 10,
            start_back: StartBackPolicy::default(),
            calibration: CalibrationConfig::default(),
            light: LightConfig::default(),
            pressure: PressureConfig::default(),
        }
    }
}

impl StationConfig {
    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.debounce_ticks > 0, "debounce_ticks must be positive");

        let cal = &self.calibration;
        ensure!(cal.smoother_period > 0, "calibration.smoother_period must be positive");
        ensure!(
            cal.tolerance.is_finite() && cal.tolerance > 0.0,
            "calibration.tolerance must be positive (got {})",
            cal.tolerance
        );
        let settle_ticks = cal.warmup_ticks.checked_add(u64::from(cal.required_in_range));
        ensure!(
            settle_ticks.is_some(),
            "calibration.warmup_ticks ({}) is too large",
            cal.warmup_ticks
        );
        if let (Some(timeout), Some(settle)) = (cal.timeout_ticks, settle_ticks) {
            ensure!(
                timeout > settle,
                "calibration.timeout_ticks ({timeout}) leaves no room to settle after {} warm-up ticks",
                cal.warmup_ticks
            );
        }

        ensure!(
            self.light.visible_limit.is_finite() && self.light.visible_limit > 0.0,
            "light.visible_limit must be positive (got {})",
            self.light.visible_limit
        );

        let p = &self.pressure;
        ensure!(p.duration_ticks > 0, "pressure.duration_ticks must be positive");
        ensure!(
            p.actuator_on_tick < p.actuator_off_tick,
            "pressure.actuator_on_tick ({}) must precede actuator_off_tick ({})",
            p.actuator_on_tick,
            p.actuator_off_tick
        );
        ensure!(
            p.actuator_off_tick < p.duration_ticks,
            "pressure.actuator_off_tick ({}) must fall inside the {} tick waveform",
            p.actuator_off_tick,
            p.duration_ticks
        );
        ensure!(!p.profiles.is_empty(), "pressure.profiles must not be empty");
        let unique: HashSet<_> = p.profiles.iter().collect();
        ensure!(
            unique.len() == p.profiles.len(),
            "pressure.profiles contains duplicates"
        );
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid station config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("in config {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}
