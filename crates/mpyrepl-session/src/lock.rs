//! Single-flight lock.
//!
//! At most one logical operation drives a session's transport at a time.
//! Waiters park on an async mutex and are woken as soon as the holder's guard
//! drops, including when the holder fails or is cancelled.

use std::future::Future;

use mpyrepl_metrics::{metric_defs, MetricLabels};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::trace;

/// Async mutual exclusion over one transport.
#[derive(Debug, Default)]
pub struct SingleFlight {
    inner: Mutex<()>,
}

/// Proof that the holder owns the transport. Releases on drop.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl SingleFlight {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock, recording the wait under `labels`.
    pub async fn acquire(&self, labels: &MetricLabels) -> FlightGuard<'_> {
        let started = Instant::now();
        let guard = self.inner.lock().await;
        let waited = started.elapsed();
        metrics::histogram!(metric_defs::LOCK_WAIT.name, &labels.to_labels())
            .record(waited.as_micros() as f64);
        trace!(waited_us = waited.as_micros() as u64, "lock acquired");
        FlightGuard { _guard: guard }
    }

    /// Run `operation` while holding the lock.
    pub async fn run<F, R>(&self, labels: &MetricLabels, operation: F) -> R
    where
        F: Future<Output = R>,
    {
        let _guard = self.acquire(labels).await;
        operation.await
    }

    /// True while some operation holds the lock.
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
