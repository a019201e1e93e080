//! Pressure baseline calibration.
//!
//! [`CalibrationController`] watches the box-filtered pressure stream until it
//! settles. After a warm-up window it feeds every reading into a
//! [`SignalSmoother`] and counts consecutive ticks where the reading stays
//! within `tolerance` of the smoothed value. Once the count exceeds
//! `required_in_range`, the smoothed value becomes the baseline.
//!
//! The wait is bounded by an optional tick timeout and can be aborted at any
//! time through a [`CancelToken`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::{Phase, SampleSeries, SeriesError};
use crate::smoother::{DEFAULT_WARMUP_PERIOD, SignalSmoother, SmootherError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error(transparent)]
    Smoother(#[from] SmootherError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error("calibration step called after it finished ({0:?})")]
    AlreadyFinished(CalibrationStatus),
}

/// Tunables for the baseline search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Ticks after phase entry before readings are fed to the smoother.
    pub warmup_ticks: u64,
    /// Warm-up period of the owned [`SignalSmoother`].
    pub smoother_period: usize,
    /// Maximum |reading - smoothed| counted as in range (exclusive).
    pub tolerance: f64,
    /// Calibration completes once the consecutive count exceeds this.
    pub required_in_range: u32,
    /// Give up after this many ticks since phase entry. `None` waits forever.
    pub timeout_ticks: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warmup_ticks: 500,
            smoother_period: DEFAULT_WARMUP_PERIOD,
            tolerance: 0.1,
            required_in_range: 100,
            timeout_ticks: Some(30_000),
        }
    }
}

/// Shared cancellation flag for the calibration wait.
///
/// Clones observe the same flag, so the operator input handler and any other
/// owner can abort a running calibration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next wait.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Result of one calibration tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    /// Still inside the warm-up window; nothing fed yet.
    WarmingUp,
    /// Feeding the smoother; `consecutive` in-range ticks so far.
    Settling { consecutive: u32 },
    /// Stable baseline found.
    Complete { baseline: f64 },
    /// Timeout reached without a stable baseline.
    TimedOut,
    /// Aborted through the [`CancelToken`].
    Cancelled,
}

impl CalibrationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            CalibrationStatus::Complete { .. }
                | CalibrationStatus::TimedOut
                | CalibrationStatus::Cancelled
        )
    }
}

/// Drives a [`SignalSmoother`] against the pressure stream until the
/// baseline is stable.
#[derive(Debug, Clone)]
pub struct CalibrationController {
    config: CalibrationConfig,
    smoother: SignalSmoother,
    consecutive: u32,
    last_smoothed: Option<f64>,
    outcome: Option<CalibrationStatus>,
    series: SampleSeries,
    cancel: CancelToken,
}

impl CalibrationController {
    pub fn new(config: CalibrationConfig) -> Result<Self, CalibrationError> {
        let smoother = SignalSmoother::new(config.smoother_period)?;
        Ok(Self {
            config,
            smoother,
            consecutive: 0,
            last_smoothed: None,
            outcome: None,
            series: SampleSeries::new(Phase::Calibration),
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Start a new calibration phase. Discards the previous series, counter
    /// and outcome, re-arms the smoother and the cancel token.
    pub fn begin(&mut self) {
        self.smoother.initialize();
        self.consecutive = 0;
        self.last_smoothed = None;
        self.outcome = None;
        self.series = SampleSeries::new(Phase::Calibration);
        self.cancel.reset();
    }

    /// Advance by one tick. `tick` counts from 0 at phase entry and `average`
    /// is the box-filtered pressure for this tick.
    pub fn step(&mut self, tick: u64, average: f64) -> Result<CalibrationStatus, CalibrationError> {
        if let Some(outcome) = self.outcome {
            return Err(CalibrationError::AlreadyFinished(outcome));
        }

        if self.cancel.is_cancelled() {
            return Ok(self.finish(CalibrationStatus::Cancelled));
        }
        if self.config.timeout_ticks.is_some_and(|limit| tick >= limit) {
            return Ok(self.finish(CalibrationStatus::TimedOut));
        }
        if tick < self.config.warmup_ticks {
            return Ok(CalibrationStatus::WarmingUp);
        }

        let smoothed = self.smoother.feed(average)?;
        let deviation = average - smoothed;
        if deviation.abs() < self.config.tolerance {
            self.consecutive += 1;
        } else {
            if self.consecutive > 0 {
                debug!(
                    "calibration drift at t={tick}: deviation {deviation:.4}, resetting after {} in range",
                    self.consecutive
                );
            }
            self.consecutive = 0;
        }
        self.last_smoothed = Some(smoothed);
        self.series
            .push(tick, &[deviation, smoothed, f64::from(self.consecutive)])?;

        if self.consecutive > self.config.required_in_range {
            return Ok(self.finish(CalibrationStatus::Complete { baseline: smoothed }));
        }
        Ok(CalibrationStatus::Settling {
            consecutive: self.consecutive,
        })
    }

    fn finish(&mut self, status: CalibrationStatus) -> CalibrationStatus {
        self.outcome = Some(status);
        status
    }

    pub fn consecutive_in_range(&self) -> u32 {
        self.consecutive
    }

    pub fn outcome(&self) -> Option<CalibrationStatus> {
        self.outcome
    }

    /// Baseline, once calibration completed.
    pub fn baseline(&self) -> Option<f64> {
        match self.outcome {
            Some(CalibrationStatus::Complete { baseline }) => Some(baseline),
            _ => None,
        }
    }

    pub fn last_smoothed(&self) -> Option<f64> {
        self.last_smoothed
    }

    /// Samples recorded since [`begin`](Self::begin).
    pub fn series(&self) -> &SampleSeries {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_constant(
        ctrl: &mut CalibrationController,
        value: f64,
        max_ticks: u64,
    ) -> (u64, CalibrationStatus) {
        for tick in 0..max_ticks {
            let status = ctrl.step(tick, value).unwrap();
            if status.is_finished() {
                return (tick, status);
            }
        }
        panic!("calibration did not finish within {max_ticks} ticks");
    }

    #[test]
    fn constant_input_completes_at_tick_600() {
        let mut ctrl = CalibrationController::new(CalibrationConfig::default()).unwrap();
        ctrl.begin();

        let (tick, status) = run_constant(&mut ctrl, 0.0, 1_000);
        assert_eq!(tick, 600);
        assert_eq!(status, CalibrationStatus::Complete { baseline: 0.0 });
        assert_eq!(ctrl.baseline(), Some(0.0));
        // 500..=600 fed
        assert_eq!(ctrl.series().len(), 101);
        assert_eq!(ctrl.series().records()[0].time_index, 500);
        assert_eq!(ctrl.series().last().unwrap().fields[2], 101.0);
    }

    #[test]
    fn warmup_feeds_nothing() {
        let mut ctrl = CalibrationController::new(CalibrationConfig::default()).unwrap();
        ctrl.begin();
        for tick in 0..500 {
            assert_eq!(ctrl.step(tick, 1013.0).unwrap(), CalibrationStatus::WarmingUp);
        }
        assert!(ctrl.series().is_empty());
        assert_eq!(
            ctrl.step(500, 1013.0).unwrap(),
            CalibrationStatus::Settling { consecutive: 1 }
        );
    }

    #[test]
    fn drift_resets_counter() {
        let config = CalibrationConfig {
            warmup_ticks: 0,
            smoother_period: 2,
            tolerance: 0.1,
            required_in_range: 3,
            timeout_ticks: None,
        };
        let mut ctrl = CalibrationController::new(config).unwrap();
        ctrl.begin();

        assert_eq!(
            ctrl.step(0, 10.0).unwrap(),
            CalibrationStatus::Settling { consecutive: 1 }
        );
        assert_eq!(
            ctrl.step(1, 10.0).unwrap(),
            CalibrationStatus::Settling { consecutive: 2 }
        );
        // big jump against a smoothed value near 10
        assert_eq!(
            ctrl.step(2, 20.0).unwrap(),
            CalibrationStatus::Settling { consecutive: 0 }
        );
        assert_eq!(ctrl.consecutive_in_range(), 0);
    }

    #[test]
    fn timeout_ends_wait() {
        let config = CalibrationConfig {
            timeout_ticks: Some(550),
            ..CalibrationConfig::default()
        };
        let mut ctrl = CalibrationController::new(config).unwrap();
        ctrl.begin();

        let (tick, status) = run_constant(&mut ctrl, 0.0, 1_000);
        assert_eq!(tick, 550);
        assert_eq!(status, CalibrationStatus::TimedOut);
        assert_eq!(ctrl.baseline(), None);
        assert!(matches!(
            ctrl.step(551, 0.0),
            Err(CalibrationError::AlreadyFinished(CalibrationStatus::TimedOut))
        ));
    }

    #[test]
    fn cancel_token_aborts_and_begin_rearms() {
        let token = CancelToken::new();
        let mut ctrl = CalibrationController::new(CalibrationConfig::default())
            .unwrap()
            .with_cancel_token(token.clone());
        ctrl.begin();

        assert_eq!(ctrl.step(0, 0.0).unwrap(), CalibrationStatus::WarmingUp);
        token.cancel();
        assert_eq!(ctrl.step(1, 0.0).unwrap(), CalibrationStatus::Cancelled);

        ctrl.begin();
        assert!(!token.is_cancelled());
        assert_eq!(ctrl.outcome(), None);
        assert_eq!(ctrl.step(0, 0.0).unwrap(), CalibrationStatus::WarmingUp);
    }

    #[test]
    fn step_before_begin_is_an_error() {
        let mut ctrl = CalibrationController::new(CalibrationConfig {
            warmup_ticks: 0,
            ..CalibrationConfig::default()
        })
        .unwrap();
        assert_eq!(
            ctrl.step(0, 1.0).unwrap_err(),
            CalibrationError::Smoother(SmootherError::NotInitialized)
        );
    }
}
