//! Batch-wide proxy rotation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::check::ProxyEndpoint;

/// Round-robin over the proxies attached to a batch.
///
/// A proxy that refuses a connection or rejects its credentials is marked
/// unusable for the rest of the batch and skipped from then on.
#[derive(Debug, Default)]
pub struct ProxyRotation {
    proxies: Vec<ProxyEndpoint>,
    usable: Vec<AtomicBool>,
    cursor: AtomicUsize,
}

impl ProxyRotation {
    /// Creates a rotation. An empty list means direct connections.
    #[must_use]
    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        let usable = proxies.iter().map(|_| AtomicBool::new(true)).collect();
        Self {
            proxies,
            usable,
            cursor: AtomicUsize::new(0),
        }
    }

    /// True when the batch runs without proxies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Number of configured proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Number of proxies not yet marked unusable.
    #[must_use]
    pub fn usable_count(&self) -> usize {
        self.usable
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    /// Picks the next usable proxy, or `None` when all are exhausted.
    #[must_use]
    pub fn next(&self) -> Option<(usize, &ProxyEndpoint)> {
        let len = self.proxies.len();
        if len == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| self.usable[index].load(Ordering::Acquire))
            .map(|index| (index, &self.proxies[index]))
    }

    /// Takes `index` out of rotation.
    pub fn mark_unusable(&self, index: usize) {
        let Some(flag) = self.usable.get(index) else {
            return;
        };
        if flag.swap(false, Ordering::AcqRel) {
            tracing::warn!(
                proxy = %self.proxies[index],
                remaining = self.usable_count(),
                "proxy marked unusable"
            );
        }
    }
}
