//! Time-indexed tolerance envelopes and pass/fail accounting.
//!
//! A [`ToleranceProfile`] judges a sampled waveform against an [`Envelope`]:
//! an immutable table mapping every tick index to a `[min, max]` band. The
//! built-in envelopes are selected by [`ProfileKind`]; custom envelopes can be
//! built from keyframes with [`Envelope::from_keyframes`].
//!
//! # Clamp policy
//!
//! The table covers indices `0..=last_keyframe`. Indices before the first
//! keyframe hold the first keyframe's bound, and indices past the last
//! keyframe hold the last keyframe's bound. There is no extrapolation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileError {
    #[error("unknown tolerance profile '{0}' (expected 'normal' or 'high')")]
    UnknownProfile(String),
    #[error("envelope needs at least one keyframe")]
    EmptyEnvelope,
    #[error("keyframe time indices must strictly increase ({previous} then {next})")]
    UnorderedKeyframes { previous: u64, next: u64 },
    #[error("invalid bounds at t={time_index}: min={min}, max={max}")]
    InvalidBounds { time_index: u64, min: f64, max: f64 },
    #[error("keyframe t={time_index} is past the envelope horizon of {limit} ticks")]
    BeyondHorizon { time_index: u64, limit: u64 },
}

/// Acceptance band at one tick. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when `value` lies in `[min, max]`. NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn lerp(a: Bounds, b: Bounds, t: f64) -> Bounds {
        Bounds {
            min: a.min + (b.min - a.min) * t,
            max: a.max + (b.max - a.max) * t,
        }
    }
}

/// Last time index an envelope table may cover.
pub const MAX_ENVELOPE_TICKS: u64 = 1_000_000;

/// Immutable per-tick lookup table built from keyframes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    table: Vec<Bounds>,
}

impl Envelope {
    /// Build a table from `(time_index, min, max)` keyframes.
    ///
    /// Bounds between keyframes are linearly interpolated. Keyframes must be
    /// strictly increasing in time and carry finite bounds with `min <= max`.
    pub fn from_keyframes(keyframes: &[(u64, f64, f64)]) -> Result<Self, ProfileError> {
        let (&(first_t, first_min, first_max), rest) =
            keyframes.split_first().ok_or(ProfileError::EmptyEnvelope)?;

        validate_bounds(first_t, first_min, first_max)?;
        let mut last_t = first_t;
        for &(t, min, max) in rest {
            validate_bounds(t, min, max)?;
            if t <= last_t {
                return Err(ProfileError::UnorderedKeyframes {
                    previous: last_t,
                    next: t,
                });
            }
            last_t = t;
        }
        if last_t > MAX_ENVELOPE_TICKS {
            return Err(ProfileError::BeyondHorizon {
                time_index: last_t,
                limit: MAX_ENVELOPE_TICKS,
            });
        }

        let mut table = Vec::with_capacity(last_t as usize + 1);
        let first = Bounds::new(first_min, first_max);
        table.extend(std::iter::repeat_n(first, first_t as usize));

        let mut anchor = (first_t, first);
        table.push(first);
        for &(t, min, max) in rest {
            let target = Bounds::new(min, max);
            let span = (t - anchor.0) as f64;
            for step in 1..=(t - anchor.0) {
                table.push(Bounds::lerp(anchor.1, target, step as f64 / span));
            }
            anchor = (t, target);
        }

        Ok(Self { table })
    }

    /// Envelope with a single constant band for every tick.
    pub fn constant(min: f64, max: f64) -> Result<Self, ProfileError> {
        Self::from_keyframes(&[(0, min, max)])
    }

    /// Bounds at `time_index`, holding the last entry past the end.
    pub fn bounds_at(&self, time_index: u64) -> Bounds {
        let last = self.table.len() - 1;
        let idx = usize::try_from(time_index).map_or(last, |i| i.min(last));
        self.table[idx]
    }

    /// Last explicitly tabulated tick index.
    pub fn horizon(&self) -> u64 {
        (self.table.len() - 1) as u64
    }
}

fn validate_bounds(time_index: u64, min: f64, max: f64) -> Result<(), ProfileError> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(ProfileError::InvalidBounds {
            time_index,
            min,
            max,
        });
    }
    Ok(())
}

/// Named acceptance profiles shipped with the test stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Expected response of a well-sealed mask.
    Normal,
    /// Wider band for high-flow breathing.
    High,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 2] = [ProfileKind::Normal, ProfileKind::High];

    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::Normal => "normal",
            ProfileKind::High => "high",
        }
    }

    /// Keyframes (tick, min, max) of the built-in envelope, in hPa relative
    /// to the calibrated baseline.
    pub fn keyframes(self) -> &'static [(u64, f64, f64)] {
        match self {
            ProfileKind::Normal => &[
                (0, -0.5, 0.5),
                (5, -0.5, 0.5),
                (10, 0.5, 6.0),
                (20, 1.5, 6.0),
                (50, 1.0, 6.0),
                (60, -0.5, 3.0),
                (75, -0.5, 1.0),
                (99, -0.5, 0.5),
            ],
            ProfileKind::High => &[
                (0, -0.5, 0.5),
                (5, -0.5, 0.5),
                (10, 2.0, 12.0),
                (20, 4.0, 12.0),
                (50, 3.0, 12.0),
                (60, 0.0, 6.0),
                (75, -0.5, 2.0),
                (99, -0.5, 0.5),
            ],
        }
    }

    pub fn envelope(self) -> Result<Envelope, ProfileError> {
        Envelope::from_keyframes(self.keyframes())
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(ProfileKind::Normal),
            "high" => Ok(ProfileKind::High),
            _ => Err(ProfileError::UnknownProfile(s.to_string())),
        }
    }
}

/// One evaluated point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    pub time_index: u64,
    pub value: f64,
    pub bounds: Bounds,
    pub in_band: bool,
}

/// Verdict of one profile over one pressure phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub name: String,
    /// True only when no evaluated point fell outside the band.
    pub passed: bool,
    pub failed_points: usize,
    pub points_evaluated: usize,
}

impl ProfileReport {
    /// Failed points as a percentage of evaluated points (0 when nothing was
    /// evaluated).
    pub fn failed_percent(&self) -> f64 {
        if self.points_evaluated == 0 {
            0.0
        } else {
            100.0 * self.failed_points as f64 / self.points_evaluated as f64
        }
    }
}

/// Named envelope plus running pass/fail counters.
///
/// Every instance owns its table, counters and history, so several
/// profiles fed the same stream produce independent verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceProfile {
    name: String,
    envelope: Envelope,
    points_evaluated: usize,
    points_failed: usize,
    history: Vec<ProfileSample>,
}

impl ToleranceProfile {
    /// Profile backed by a built-in envelope.
    pub fn new(kind: ProfileKind) -> Result<Self, ProfileError> {
        Ok(Self::with_envelope(kind.name(), kind.envelope()?))
    }

    /// Profile selected by name; unknown names are rejected here rather than
    /// at the first evaluation.
    pub fn named(name: &str) -> Result<Self, ProfileError> {
        Self::new(name.parse()?)
    }

    /// Profile over a custom envelope.
    pub fn with_envelope(name: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            name: name.into(),
            envelope,
            points_evaluated: 0,
            points_failed: 0,
            history: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn bounds_at(&self, time_index: u64) -> Bounds {
        self.envelope.bounds_at(time_index)
    }

    /// Evaluate one point.
    pub fn step(&mut self, time_index: u64, value: f64) {
        self.evaluate(time_index, value);
    }

    /// Evaluate one point and return the bounds it was judged against.
    pub fn step_plot(&mut self, time_index: u64, value: f64) -> Bounds {
        self.evaluate(time_index, value).bounds
    }

    fn evaluate(&mut self, time_index: u64, value: f64) -> ProfileSample {
        let bounds = self.envelope.bounds_at(time_index);
        let in_band = bounds.contains(value);
        self.points_evaluated += 1;
        if !in_band {
            self.points_failed += 1;
        }
        let sample = ProfileSample {
            time_index,
            value,
            bounds,
            in_band,
        };
        self.history.push(sample);
        sample
    }

    pub fn points_evaluated(&self) -> usize {
        self.points_evaluated
    }

    pub fn points_failed(&self) -> usize {
        self.points_failed
    }

    pub fn history(&self) -> &[ProfileSample] {
        &self.history
    }

    /// Clear counters and history, keeping the envelope.
    pub fn reset(&mut self) {
        self.points_evaluated = 0;
        self.points_failed = 0;
        self.history.clear();
    }

    pub fn report(&self) -> ProfileReport {
        ProfileReport {
            name: self.name.clone(),
            passed: self.points_failed == 0,
            failed_points: self.points_failed,
            points_evaluated: self.points_evaluated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_out_of_band_point_fails() {
        let mut profile =
            ToleranceProfile::with_envelope("unit", Envelope::constant(-1.0, 1.0).unwrap());
        profile.step(0, 2.0);

        assert_eq!(profile.points_evaluated(), 1);
        assert_eq!(profile.points_failed(), 1);
        let report = profile.report();
        assert!(!report.passed);
        assert_eq!(report.failed_points, 1);
        assert_eq!(report.points_evaluated, 1);
        assert!((report.failed_percent() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut profile =
            ToleranceProfile::with_envelope("unit", Envelope::constant(-1.0, 1.0).unwrap());
        profile.step(0, -1.0);
        profile.step(1, 1.0);
        profile.step(2, f64::NAN);
        assert_eq!(profile.points_failed(), 1);
        assert!(!profile.history()[2].in_band);
    }

    #[test]
    fn step_plot_counts_once() {
        let mut profile = ToleranceProfile::new(ProfileKind::Normal).unwrap();
        let bounds = profile.step_plot(0, 0.0);
        assert_eq!(bounds, Bounds::new(-0.5, 0.5));
        assert_eq!(profile.points_evaluated(), 1);
        assert_eq!(profile.points_failed(), 0);
        assert_eq!(profile.history().len(), 1);
        assert!(profile.report().passed);
    }

    #[test]
    fn empty_report_passes() {
        let profile = ToleranceProfile::new(ProfileKind::High).unwrap();
        let report = profile.report();
        assert!(report.passed);
        assert_eq!(report.failed_percent(), 0.0);
    }

    #[test]
    fn unknown_name_rejected_at_construction() {
        let err = ToleranceProfile::named("medium").unwrap_err();
        assert_eq!(err, ProfileError::UnknownProfile("medium".to_string()));
        assert!(err.to_string().contains("medium"));
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("Normal".parse::<ProfileKind>().unwrap(), ProfileKind::Normal);
        assert_eq!(" HIGH ".parse::<ProfileKind>().unwrap(), ProfileKind::High);
        assert_eq!(ProfileKind::High.to_string(), "high");
        assert_eq!(ToleranceProfile::named("high").unwrap().name(), "high");
    }

    #[test]
    fn interpolates_between_keyframes() {
        let env = Envelope::from_keyframes(&[(0, 0.0, 0.0), (10, 10.0, 20.0)]).unwrap();
        let b = env.bounds_at(5);
        assert!((b.min - 5.0).abs() < 1e-12);
        assert!((b.max - 10.0).abs() < 1e-12);
        assert_eq!(env.bounds_at(10), Bounds::new(10.0, 20.0));
    }

    #[test]
    fn clamp_holds_first_and_last_bound() {
        let env = Envelope::from_keyframes(&[(3, -1.0, 1.0), (6, -2.0, 2.0)]).unwrap();
        assert_eq!(env.bounds_at(0), Bounds::new(-1.0, 1.0));
        assert_eq!(env.bounds_at(2), Bounds::new(-1.0, 1.0));
        assert_eq!(env.horizon(), 6);
        assert_eq!(env.bounds_at(6), Bounds::new(-2.0, 2.0));
        assert_eq!(env.bounds_at(7), Bounds::new(-2.0, 2.0));
        assert_eq!(env.bounds_at(u64::MAX), Bounds::new(-2.0, 2.0));
    }

    #[test]
    fn builtin_envelopes_cover_pressure_phase() {
        for kind in ProfileKind::ALL {
            let env = kind.envelope().unwrap();
            assert_eq!(env.horizon(), 99);
            assert_eq!(env.bounds_at(150), env.bounds_at(99));
        }
        let normal = ProfileKind::Normal.envelope().unwrap();
        let high = ProfileKind::High.envelope().unwrap();
        assert!(high.bounds_at(30).max > normal.bounds_at(30).max);
    }

    #[test]
    fn invalid_keyframes_rejected() {
        assert_eq!(
            Envelope::from_keyframes(&[]).unwrap_err(),
            ProfileError::EmptyEnvelope
        );
        assert!(matches!(
            Envelope::from_keyframes(&[(0, 1.0, -1.0)]),
            Err(ProfileError::InvalidBounds { time_index: 0, .. })
        ));
        assert!(matches!(
            Envelope::from_keyframes(&[(0, 0.0, 1.0), (0, 0.0, 1.0)]),
            Err(ProfileError::UnorderedKeyframes {
                previous: 0,
                next: 0
            })
        ));
        assert!(matches!(
            Envelope::from_keyframes(&[(0, f64::NAN, 1.0)]),
            Err(ProfileError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn huge_time_index_rejected() {
        assert_eq!(
            Envelope::from_keyframes(&[(u64::MAX, 0.0, 1.0)]).unwrap_err(),
            ProfileError::BeyondHorizon {
                time_index: u64::MAX,
                limit: MAX_ENVELOPE_TICKS,
            }
        );
        let past = MAX_ENVELOPE_TICKS + 1;
        assert!(Envelope::from_keyframes(&[(0, 0.0, 1.0), (past, 0.0, 1.0)]).is_err());

        let env = Envelope::from_keyframes(&[(MAX_ENVELOPE_TICKS, 0.0, 1.0)]).unwrap();
        assert_eq!(env.bounds_at(0), Bounds::new(0.0, 1.0));
    }

    #[test]
    fn report_serializes_lowercase_kind() {
        let json = serde_json::to_string(&ProfileKind::Normal).unwrap();
        assert_eq!(json, "\"normal\"");
    }
}
