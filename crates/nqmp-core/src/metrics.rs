//! Global atomic counters for run observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    client_calls: AtomicU64,
    retries: AtomicU64,
    items_skipped: AtomicU64,
    items_graded: AtomicU64,
    items_errored: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            client_calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            items_skipped: AtomicU64::new(0),
            items_graded: AtomicU64::new(0),
            items_errored: AtomicU64::new(0),
        }
    }

    pub fn inc_client_calls(&self) {
        self.client_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "client_calls", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_graded(&self) {
        self.items_graded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errored(&self) {
        self.items_errored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_errored", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            client_calls = self.client_calls(),
            retries = self.retries(),
            items_skipped = self.items_skipped(),
            items_graded = self.items_graded(),
            items_errored = self.items_errored(),
        );
    }

    pub fn client_calls(&self) -> u64 {
        self.client_calls.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn items_skipped(&self) -> u64 {
        self.items_skipped.load(Ordering::Relaxed)
    }

    pub fn items_graded(&self) -> u64 {
        self.items_graded.load(Ordering::Relaxed)
    }

    pub fn items_errored(&self) -> u64 {
        self.items_errored.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.client_calls.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.items_skipped.store(0, Ordering::Relaxed);
        self.items_graded.store(0, Ordering::Relaxed);
        self.items_errored.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_counters() {
        let m = Metrics::new();
        m.inc_client_calls();
        m.inc_client_calls();
        m.inc_retries();
        m.inc_graded();
        assert_eq!(m.client_calls(), 2);
        assert_eq!(m.retries(), 1);
        assert_eq!(m.items_graded(), 1);
        m.reset();
        assert_eq!(m.client_calls(), 0);
        assert_eq!(m.retries(), 0);
    }
}
