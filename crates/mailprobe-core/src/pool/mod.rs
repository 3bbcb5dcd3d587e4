//! Named, capacity-bounded worker pools.
//!
//! A [`WorkerPool`] is the only place where concurrency is limited. Batches
//! that name the same pool share its capacity. Admission goes through a fair
//! semaphore, so waiting batches are served in arrival order.
//!
//! Every acquisition happens under a [`PoolToken`]. Cancelling the token makes
//! pending and future acquisitions under it fail; permits already handed out
//! stay valid until dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Capacity used when a pool is created without an explicit size.
pub const DEFAULT_MAX_WORKERS: usize = 50;

/// Pool admission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The token was cancelled before a slot was granted.
    #[error("pool admission cancelled")]
    Cancelled,
}

/// Cancellation handle scoping admission to one batch.
#[derive(Debug, Clone, Default)]
pub struct PoolToken {
    inner: CancellationToken,
}

impl PoolToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves when the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

/// A granted slot. The slot is returned when the permit is dropped.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A named pool with a fixed number of worker slots.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    max_workers: usize,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl WorkerPool {
    /// Creates a pool. A size of zero is raised to one.
    #[must_use]
    pub fn new(name: impl Into<String>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            name: name.into(),
            max_workers,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: AtomicUsize::new(0),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Cancelled`] if the token is cancelled before or
    /// while waiting.
    pub async fn acquire(&self, token: &PoolToken) -> Result<Permit, PoolError> {
        if token.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            () = token.cancelled() => return Err(PoolError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| PoolError::Cancelled)?
            }
        };

        // Cancellation may have raced with the grant
        if token.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);

        Ok(Permit {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Returns a slot to the pool. Dropping the permit is equivalent.
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    /// Stops admission under `token`.
    pub fn cancel(&self, token: &PoolToken) {
        tracing::debug!(pool = %self.name, "cancelling admission");
        token.cancel();
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured capacity.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Slots currently held.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Highest number of slots ever held at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Slots free right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Owner of all pools in the process.
///
/// Constructed once and handed to every orchestrator that should share
/// capacity.
#[derive(Debug)]
pub struct PoolRegistry {
    default_max_workers: usize,
    pools: Mutex<HashMap<String, Arc<WorkerPool>>>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(default_max_workers: usize) -> Self {
        Self {
            default_max_workers: default_max_workers.max(1),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pool named `name`, creating it on first use.
    ///
    /// The first caller decides the size; later callers asking for a
    /// different size get the existing pool and a warning.
    pub fn pool(&self, name: &str, max_workers: Option<usize>) -> Arc<WorkerPool> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(name) {
            if let Some(requested) = max_workers
                && requested.max(1) != pool.max_workers()
            {
                tracing::warn!(
                    pool = name,
                    existing = pool.max_workers(),
                    requested,
                    "pool already exists with a different size, keeping existing"
                );
            }
            return Arc::clone(pool);
        }

        let size = max_workers.unwrap_or(self.default_max_workers);
        tracing::debug!(pool = name, size, "creating worker pool");
        let pool = Arc::new(WorkerPool::new(name, size));
        pools.insert(name.to_string(), Arc::clone(&pool));
        pool
    }

    /// Names of all pools created so far, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Size used for pools created without an explicit size.
    #[must_use]
    pub const fn default_max_workers(&self) -> usize {
        self.default_max_workers
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}
