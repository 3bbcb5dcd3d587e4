//! Result aggregation and storage.
//!
//! [`ResultSink`] is the single writer of a batch's [`BatchMetrics`]. It
//! stamps every result with its completion sequence, folds it into the
//! counters and fans it out to live subscribers. Durable storage sits behind
//! [`ResultStore`].

mod repository;

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub use repository::SqliteResultStore;

use crate::Result;
use crate::batch::{BatchId, BatchMetrics, BatchState, StopReason};
use crate::check::{CheckResult, Protocol};

/// Results kept in memory per batch for `recent` queries.
pub const RECENT_CAPACITY: usize = 1024;

const SUBSCRIBER_CAPACITY: usize = 256;

struct SinkState {
    metrics: BatchMetrics,
    next_sequence: u64,
    recent: VecDeque<CheckResult>,
}

/// Per-batch aggregator.
pub struct ResultSink {
    state: Mutex<SinkState>,
    events: broadcast::Sender<CheckResult>,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResultSink")
            .field("batch_id", &state.metrics.batch_id)
            .field("state", &state.metrics.state)
            .field("attempts", &state.metrics.attempts)
            .finish_non_exhaustive()
    }
}

impl ResultSink {
    /// Creates a sink with idle metrics.
    #[must_use]
    pub fn new(batch_id: BatchId, protocol: Protocol, total_inputs: u64) -> Self {
        let (events, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            state: Mutex::new(SinkState {
                metrics: BatchMetrics::new(batch_id, protocol, total_inputs),
                next_sequence: 1,
                recent: VecDeque::new(),
            }),
            events,
        }
    }

    /// Marks the batch running.
    pub fn start(&self) -> BatchMetrics {
        let mut state = self.state.lock();
        state.metrics.start(Utc::now());
        state.metrics.clone()
    }

    /// Stamps `result` with the next sequence number and folds it in.
    ///
    /// Returns the stamped result and the metrics right after it.
    pub fn record(&self, mut result: CheckResult) -> (CheckResult, BatchMetrics) {
        let snapshot = {
            let mut state = self.state.lock();
            result.sequence = state.next_sequence;
            state.next_sequence += 1;
            state.metrics.record(&result, Utc::now());
            if state.recent.len() == RECENT_CAPACITY {
                state.recent.pop_front();
            }
            state.recent.push_back(result.clone());
            state.metrics.clone()
        };

        // No subscribers is fine
        let _ = self.events.send(result.clone());
        (result, snapshot)
    }

    /// Moves to a terminal state; the first call wins.
    pub fn finish(&self, state: BatchState, reason: Option<StopReason>) -> BatchMetrics {
        let mut guard = self.state.lock();
        guard.metrics.finish(state, reason, Utc::now());
        guard.metrics.clone()
    }

    /// Current metrics.
    #[must_use]
    pub fn snapshot(&self) -> BatchMetrics {
        self.state.lock().metrics.clone()
    }

    /// Up to `limit` most recent results, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<CheckResult> {
        let state = self.state.lock();
        let skip = state.recent.len().saturating_sub(limit);
        state.recent.iter().skip(skip).cloned().collect()
    }

    /// Live stream of results recorded from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CheckResult> {
        self.events.subscribe()
    }
}

/// Durable storage for results and metrics.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Appends one result. A second result for the same task is an error.
    async fn append(&self, result: &CheckResult) -> Result<()>;

    /// Inserts or replaces the metrics row of a batch.
    async fn save_metrics(&self, metrics: &BatchMetrics) -> Result<()>;

    /// Loads the metrics of a batch.
    async fn metrics(&self, batch_id: BatchId) -> Result<Option<BatchMetrics>>;

    /// Up to `limit` most recent results, oldest first.
    async fn recent(&self, batch_id: BatchId, limit: usize) -> Result<Vec<CheckResult>>;

    /// Every result of a batch in completion order.
    async fn results(&self, batch_id: BatchId) -> Result<Vec<CheckResult>>;
}

#[derive(Default)]
struct MemoryState {
    results: HashMap<BatchId, Vec<CheckResult>>,
    metrics: HashMap<BatchId, BatchMetrics>,
}

/// Non-durable store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryResultStore {
    state: Mutex<MemoryState>,
}

impl MemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(&self, result: &CheckResult) -> Result<()> {
        let mut state = self.state.lock();
        let rows = state.results.entry(result.batch_id).or_default();
        if rows.iter().any(|r| r.task_id == result.task_id) {
            return Err(crate::Error::StoreUnavailable(format!(
                "duplicate result for task {}",
                result.task_id
            )));
        }
        rows.push(result.clone());
        Ok(())
    }

    async fn save_metrics(&self, metrics: &BatchMetrics) -> Result<()> {
        self.state
            .lock()
            .metrics
            .insert(metrics.batch_id, metrics.clone());
        Ok(())
    }

    async fn metrics(&self, batch_id: BatchId) -> Result<Option<BatchMetrics>> {
        Ok(self.state.lock().metrics.get(&batch_id).cloned())
    }

    async fn recent(&self, batch_id: BatchId, limit: usize) -> Result<Vec<CheckResult>> {
        let mut results = self.results(batch_id).await?;
        let skip = results.len().saturating_sub(limit);
        Ok(results.split_off(skip))
    }

    async fn results(&self, batch_id: BatchId) -> Result<Vec<CheckResult>> {
        let mut results = self
            .state
            .lock()
            .results
            .get(&batch_id)
            .cloned()
            .unwrap_or_default();
        results.sort_by_key(|r| r.sequence);
        Ok(results)
    }
}
