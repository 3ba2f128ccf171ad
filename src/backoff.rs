//! Backoff schedules for retries and readiness polling.
//!
//! Attempt semantics: attempt index `0` represents the initial call (no delay), and retries
//! start at `attempt = 1`. For an exponential schedule with base `i`, multiplier `m` and cap `c`,
//! `delay(k) = min(i * m^(k-1), c)`. Delays saturate at [`MAX_BACKOFF`] to avoid overflow.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use postrelay::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_multiplier(2.0)
//!     .unwrap()
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(0)); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(6), Duration::from_secs(2)); // capped
//! ```

use crate::config::RetryConfig;
use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    ConstantDoesNotSupportMultiplier,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
    InvalidMultiplier(f64),
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for exponential backoff")
            }
            BackoffError::ConstantDoesNotSupportMultiplier => {
                write!(f, "with_multiplier is only valid for exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
            BackoffError::InvalidMultiplier(m) => {
                write!(f, "multiplier must be finite and >= 1.0 (got {})", m)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Exponential { base: Duration, multiplier: f64, max: Option<Duration> },
}

/// Delay schedule indexed by attempt number.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// Exponential growth from `base`, doubling by default.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, multiplier: 2.0, max: None } }
    }

    /// Interval shape for `RetryPolicy`: `initial_interval_ms` growing by `multiplier`,
    /// capped at `max_interval_ms`.
    pub fn from_retry_config(cfg: &RetryConfig) -> Result<Self, BackoffError> {
        Self::exponential(cfg.initial_interval())
            .with_multiplier(cfg.multiplier)?
            .with_max(cfg.max_interval())
    }

    /// Uncapped poll schedule: `sleep_time_ms` growing by `multiplier`.
    pub fn poll_schedule(cfg: &RetryConfig) -> Result<Self, BackoffError> {
        Self::exponential(cfg.sleep_time()).with_multiplier(cfg.multiplier)
    }

    /// Set the growth factor. Must be finite and `>= 1.0` so the schedule never shrinks.
    pub fn with_multiplier(mut self, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        match &mut self.kind {
            BackoffKind::Exponential { multiplier: existing, .. } => {
                *existing = multiplier;
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMultiplier),
        }
    }

    /// Set a maximum delay. Returns an error on `Constant`, if `max` is zero, or if `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Calculate the delay for a given attempt number (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match &self.kind {
            BackoffKind::Constant { delay } => *delay,
            BackoffKind::Exponential { base, multiplier, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let factor = multiplier.powi(exponent);
                let nanos = (base.as_nanos() as f64 * factor).round();
                let ceiling = MAX_BACKOFF.as_nanos() as f64;
                let grown = if nanos.is_finite() && nanos < ceiling {
                    Duration::from_nanos(nanos as u64)
                } else {
                    MAX_BACKOFF
                };
                max.map(|m| grown.min(m)).unwrap_or(grown).min(MAX_BACKOFF)
            }
        }
    }
}
