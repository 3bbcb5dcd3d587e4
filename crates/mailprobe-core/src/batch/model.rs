//! Batch data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::check::{CheckResult, CheckStatus, Protocol};
use crate::{Error, Result};

/// Unique batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("invalid batch id {s:?}: {e}")))
    }
}

/// Lifecycle state of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Created, no task submitted yet.
    #[default]
    Idle,
    /// Tasks are being submitted or are in flight.
    Running,
    /// Halted by a stop rule or an external stop.
    Stopped,
    /// Every input produced a result.
    Completed,
    /// Orchestration fault.
    Failed,
}

impl BatchState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True once the batch can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::InvalidInput(format!("unknown batch state: {s}"))),
        }
    }
}

/// Why a batch ended before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The attempt cap was hit.
    MaxAttemptsReached,
    /// The batch ran longer than allowed.
    MaxDurationReached,
    /// Too many failures once the sample was large enough.
    ErrorRateExceeded,
    /// Too few successes once the sample was large enough.
    SuccessRateBelowThreshold,
    /// Stopped from outside.
    Cancelled,
    /// Results could no longer be persisted.
    ResultSinkUnavailable,
}

impl StopReason {
    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxAttemptsReached => "max_attempts_reached",
            Self::MaxDurationReached => "max_duration_reached",
            Self::ErrorRateExceeded => "error_rate_exceeded",
            Self::SuccessRateBelowThreshold => "success_rate_below_threshold",
            Self::Cancelled => "cancelled",
            Self::ResultSinkUnavailable => "result_sink_unavailable",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::MaxAttemptsReached,
            Self::MaxDurationReached,
            Self::ErrorRateExceeded,
            Self::SuccessRateBelowThreshold,
            Self::Cancelled,
            Self::ResultSinkUnavailable,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == s)
        .ok_or_else(|| Error::InvalidInput(format!("unknown stop reason: {s}")))
    }
}

/// Rolling statistics for one batch.
///
/// Counters only grow. `successes + failures == attempts` holds after every
/// [`record`](Self::record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    /// Batch these metrics describe.
    pub batch_id: BatchId,
    /// Protocol checked by the batch.
    pub protocol: Protocol,
    /// Lifecycle state.
    pub state: BatchState,
    /// Number of inputs supplied at start.
    pub total_inputs: u64,
    /// Completed tasks.
    pub attempts: u64,
    /// Valid results.
    pub successes: u64,
    /// Invalid, error, and dead results.
    pub failures: u64,
    /// Valid results.
    pub valid: u64,
    /// Rejected credentials.
    pub invalid: u64,
    /// Reachable but never verified.
    pub error: u64,
    /// Never reachable.
    pub dead: u64,
    /// Fastest successful check.
    pub min_latency_ms: Option<u64>,
    /// Mean latency of successful checks.
    pub avg_latency_ms: Option<f64>,
    /// Slowest successful check.
    pub max_latency_ms: Option<u64>,
    /// Sum of successful latencies.
    pub latency_total_ms: u64,
    /// Percentage of attempts that failed.
    pub error_rate: f64,
    /// Percentage of attempts that succeeded.
    pub success_rate: f64,
    /// Set on every terminal state other than completed.
    pub stop_reason: Option<StopReason>,
    /// When the batch started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the batch reached a terminal state.
    pub stopped_at: Option<DateTime<Utc>>,
    /// Last mutation.
    pub updated_at: DateTime<Utc>,
    /// Wall time from start to stop, or to the last mutation while running.
    pub duration_seconds: f64,
}

impl BatchMetrics {
    /// Creates idle metrics.
    #[must_use]
    pub fn new(batch_id: BatchId, protocol: Protocol, total_inputs: u64) -> Self {
        Self {
            batch_id,
            protocol,
            state: BatchState::Idle,
            total_inputs,
            attempts: 0,
            successes: 0,
            failures: 0,
            valid: 0,
            invalid: 0,
            error: 0,
            dead: 0,
            min_latency_ms: None,
            avg_latency_ms: None,
            max_latency_ms: None,
            latency_total_ms: 0,
            error_rate: 0.0,
            success_rate: 0.0,
            stop_reason: None,
            started_at: None,
            stopped_at: None,
            updated_at: Utc::now(),
            duration_seconds: 0.0,
        }
    }

    /// Moves to running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = BatchState::Running;
        self.started_at = Some(now);
        self.touch(now);
    }

    /// Folds one result into the counters.
    pub fn record(&mut self, result: &CheckResult, now: DateTime<Utc>) {
        self.attempts += 1;
        match result.status {
            CheckStatus::Valid => {
                self.valid += 1;
                self.successes += 1;
                if let Some(latency) = result.latency_ms {
                    self.record_latency(latency);
                }
            }
            CheckStatus::Invalid => {
                self.invalid += 1;
                self.failures += 1;
            }
            CheckStatus::Error => {
                self.error += 1;
                self.failures += 1;
            }
            CheckStatus::Dead => {
                self.dead += 1;
                self.failures += 1;
            }
        }
        self.recompute_rates();
        self.touch(now);
    }

    /// Moves to a terminal state. Later calls are ignored.
    pub fn finish(&mut self, state: BatchState, reason: Option<StopReason>, now: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.stop_reason = reason;
        self.stopped_at = Some(now);
        self.touch(now);
    }

    /// Number of inputs without a result yet.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.total_inputs.saturating_sub(self.attempts)
    }

    fn record_latency(&mut self, latency: u64) {
        self.latency_total_ms = self.latency_total_ms.saturating_add(latency);
        self.min_latency_ms = Some(self.min_latency_ms.map_or(latency, |m| m.min(latency)));
        self.max_latency_ms = Some(self.max_latency_ms.map_or(latency, |m| m.max(latency)));
        #[allow(clippy::cast_precision_loss)]
        let avg = self.latency_total_ms as f64 / self.successes as f64;
        self.avg_latency_ms = Some(avg);
    }

    #[allow(clippy::cast_precision_loss)]
    fn recompute_rates(&mut self) {
        if self.attempts == 0 {
            self.error_rate = 0.0;
            self.success_rate = 0.0;
            return;
        }
        let attempts = self.attempts as f64;
        self.error_rate = self.failures as f64 / attempts * 100.0;
        self.success_rate = self.successes as f64 / attempts * 100.0;
    }

    #[allow(clippy::cast_precision_loss)]
    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        let end = self.stopped_at.unwrap_or(now);
        self.duration_seconds = self.started_at.map_or(0.0, |start| {
            (end - start).num_milliseconds().max(0) as f64 / 1000.0
        });
    }
}
