//! Incremental smoothing filters for the pressure channel.
//!
//! Two filters live here:
//!
//! - [`RunningAverage`]: the 3-sample box filter applied to every raw
//!   pressure reading, once per tick, regardless of the active state.
//! - [`SignalSmoother`]: simple average during a warm-up window, then an
//!   exponential moving average seeded from that simple average.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default warm-up window of [`SignalSmoother`].
pub const DEFAULT_WARMUP_PERIOD: usize = 500;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SmootherError {
    #[error("smoother warm-up period must be positive")]
    InvalidPeriod,
    #[error("smoother fed before initialize()")]
    NotInitialized,
}

/// Internal mode of the smoother.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Mode {
    /// Constructed but not armed yet.
    Idle,
    /// Accumulating the simple average.
    WarmUp { sum: f64, count: usize },
    /// Exponential smoothing, never left once entered.
    Exponential { ema: f64, count: usize },
}

/// Simple-average-then-EMA filter.
///
/// For the first `warmup_period` feeds the output is the cumulative simple
/// average of everything seen so far. The simple average at the end of the
/// warm-up seeds the EMA, and every later feed returns
/// `ema = (value - ema) * multiplier + ema` with
/// `multiplier = 2 / (warmup_period + 1)`.
///
/// # Example
///
/// ```
/// use pat_core::SignalSmoother;
///
/// let mut smoother = SignalSmoother::new(5).unwrap();
/// smoother.initialize();
/// let out: Vec<f64> = [10.0, 20.0, 30.0, 40.0, 50.0]
///     .into_iter()
///     .map(|v| smoother.feed(v).unwrap())
///     .collect();
/// assert_eq!(out, vec![10.0, 15.0, 20.0, 25.0, 30.0]);
/// assert!((smoother.feed(60.0).unwrap() - 40.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSmoother {
    warmup_period: usize,
    multiplier: f64,
    mode: Mode,
}

impl SignalSmoother {
    /// Create an un-armed smoother. Call [`initialize`](Self::initialize)
    /// before the first [`feed`](Self::feed).
    pub fn new(warmup_period: usize) -> Result<Self, SmootherError> {
        if warmup_period == 0 {
            return Err(SmootherError::InvalidPeriod);
        }
        Ok(Self {
            warmup_period,
            multiplier: 2.0 / (warmup_period as f64 + 1.0),
            mode: Mode::Idle,
        })
    }

    /// Arm the smoother, discarding any previous state.
    pub fn initialize(&mut self) {
        self.mode = Mode::WarmUp { sum: 0.0, count: 0 };
    }

    /// Feed one value and return the smoothed output.
    pub fn feed(&mut self, value: f64) -> Result<f64, SmootherError> {
        match self.mode {
            Mode::Idle => Err(SmootherError::NotInitialized),
            Mode::WarmUp { sum, count } if count < self.warmup_period => {
                let sum = sum + value;
                let count = count + 1;
                self.mode = Mode::WarmUp { sum, count };
                Ok(sum / count as f64)
            }
            Mode::WarmUp { sum, count } => {
                // Seed is the simple average over the full warm-up window.
                let seed = sum / self.warmup_period as f64;
                let ema = (value - seed) * self.multiplier + seed;
                self.mode = Mode::Exponential {
                    ema,
                    count: count + 1,
                };
                Ok(ema)
            }
            Mode::Exponential { ema, count } => {
                let ema = (value - ema) * self.multiplier + ema;
                self.mode = Mode::Exponential {
                    ema,
                    count: count + 1,
                };
                Ok(ema)
            }
        }
    }

    pub fn warmup_period(&self) -> usize {
        self.warmup_period
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// True once the smoother has switched to exponential mode.
    pub fn is_warm(&self) -> bool {
        matches!(self.mode, Mode::Exponential { .. })
    }

    /// Number of values fed since the last [`initialize`](Self::initialize).
    pub fn samples_seen(&self) -> usize {
        match self.mode {
            Mode::Idle => 0,
            Mode::WarmUp { count, .. } | Mode::Exponential { count, .. } => count,
        }
    }

    /// Last output, if any value has been fed.
    pub fn current(&self) -> Option<f64> {
        match self.mode {
            Mode::Idle | Mode::WarmUp { count: 0, .. } => None,
            Mode::WarmUp { sum, count } => Some(sum / count as f64),
            Mode::Exponential { ema, .. } => Some(ema),
        }
    }
}

/// Box filter `average = raw / 3 + average * 2 / 3`, starting at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningAverage {
    value: f64,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw reading in and return the updated average.
    pub fn update(&mut self, raw: f64) -> f64 {
        self.value = raw / 3.0 + (self.value / 3.0) * 2.0;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}
