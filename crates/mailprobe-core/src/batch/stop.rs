//! Stop-condition evaluation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::{BatchMetrics, StopReason};

/// Limits that halt a batch early. Every rule is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopCondition {
    /// Wall-clock limit.
    pub max_duration_seconds: Option<u64>,
    /// Completed-task limit.
    pub max_attempts: Option<u64>,
    /// Halt when `error_rate` rises above this.
    pub max_error_rate_pct: Option<f64>,
    /// Halt when `success_rate` falls below this.
    pub min_success_rate_pct: Option<f64>,
    /// Rate rules are ignored until this many tasks completed.
    pub min_sample_size: u64,
}

impl Default for StopCondition {
    /// No rule enabled.
    fn default() -> Self {
        Self {
            max_duration_seconds: None,
            max_attempts: None,
            max_error_rate_pct: None,
            min_success_rate_pct: None,
            min_sample_size: 10,
        }
    }
}

impl StopCondition {
    /// Thresholds suited to campaign list validation.
    #[must_use]
    pub fn recommended() -> Self {
        Self {
            max_error_rate_pct: Some(10.0),
            min_success_rate_pct: Some(50.0),
            min_sample_size: 10,
            ..Self::default()
        }
    }

    /// True when no rule can ever trip.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.max_duration_seconds.is_none()
            && self.max_attempts.is_none()
            && self.max_error_rate_pct.is_none()
            && self.min_success_rate_pct.is_none()
    }

    /// Decides whether the batch must halt.
    ///
    /// Rules are checked in priority order: attempt cap, duration, then the
    /// rate rules once the sample is large enough.
    #[must_use]
    pub fn should_stop(&self, metrics: &BatchMetrics, elapsed: Duration) -> Option<StopReason> {
        if self
            .max_attempts
            .is_some_and(|max| metrics.attempts >= max)
        {
            return Some(StopReason::MaxAttemptsReached);
        }

        if self
            .max_duration_seconds
            .is_some_and(|max| elapsed >= Duration::from_secs(max))
        {
            return Some(StopReason::MaxDurationReached);
        }

        if metrics.attempts < self.min_sample_size {
            return None;
        }

        if self
            .max_error_rate_pct
            .is_some_and(|max| metrics.error_rate > max)
        {
            return Some(StopReason::ErrorRateExceeded);
        }

        if self
            .min_success_rate_pct
            .is_some_and(|min| metrics.success_rate < min)
        {
            return Some(StopReason::SuccessRateBelowThreshold);
        }

        None
    }
}
