use crate::errors::{AppError, Result};
use crate::models::Opportunity;
use chrono::TimeDelta;

pub const DEFAULT_TIME_WINDOW_SECS: i64 = 300;
pub const DEFAULT_MIN_PROFIT_PCT: f64 = 1.0;

/// Validated parameters for cross-exchange detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    time_window: TimeDelta,
    min_profit_pct: f64,
}

impl DetectorConfig {
    /// Rejects negative windows and negative or non-finite thresholds.
    pub fn new(time_window: TimeDelta, min_profit_pct: f64) -> Result<Self> {
        if time_window < TimeDelta::zero() {
            return Err(AppError::InvalidConfiguration(format!(
                "time window must be >= 0, got {}s",
                time_window.num_seconds()
            )));
        }
        if !min_profit_pct.is_finite() || min_profit_pct < 0.0 {
            return Err(AppError::InvalidConfiguration(format!(
                "minimum profit percentage must be a finite value >= 0, got {min_profit_pct}"
            )));
        }
        Ok(Self {
            time_window,
            min_profit_pct,
        })
    }

    /// Builds a config from a window expressed in (possibly fractional) seconds.
    pub fn from_secs(time_window_secs: f64, min_profit_pct: f64) -> Result<Self> {
        if !time_window_secs.is_finite() || time_window_secs < 0.0 {
            return Err(AppError::InvalidConfiguration(format!(
                "time window must be a finite value >= 0, got {time_window_secs}s"
            )));
        }
        let millis = (time_window_secs * 1_000.0).round();
        if millis > i64::MAX as f64 {
            return Err(AppError::InvalidConfiguration(format!(
                "time window of {time_window_secs}s is out of range"
            )));
        }
        let window = TimeDelta::try_milliseconds(millis as i64).ok_or_else(|| {
            AppError::InvalidConfiguration(format!(
                "time window of {time_window_secs}s is out of range"
            ))
        })?;
        Self::new(window, min_profit_pct)
    }

    pub fn time_window(&self) -> TimeDelta {
        self.time_window
    }

    /// Window in seconds, keeping the millisecond fraction.
    pub fn time_window_secs(&self) -> f64 {
        self.time_window.num_milliseconds() as f64 / 1_000.0
    }

    pub fn min_profit_pct(&self) -> f64 {
        self.min_profit_pct
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            time_window: TimeDelta::seconds(DEFAULT_TIME_WINDOW_SECS),
            min_profit_pct: DEFAULT_MIN_PROFIT_PCT,
        }
    }
}

/// Output of one detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub opportunities: Vec<Opportunity>,
    /// Records excluded for lacking a usable price.
    pub skipped: usize,
    /// Distinct exchanges that contributed at least one usable record.
    pub exchanges: usize,
}
