//! Global atomic counters for memory observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a sync cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    appends: AtomicU64,
    compactions: AtomicU64,
    sync_commits: AtomicU64,
    sync_conflicts: AtomicU64,
    sync_failures: AtomicU64,
    redaction_fallbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            appends: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            sync_commits: AtomicU64::new(0),
            sync_conflicts: AtomicU64::new(0),
            sync_failures: AtomicU64::new(0),
            redaction_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn inc_appends(&self) {
        self.appends.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "appends", "counter incremented");
    }

    pub fn inc_compactions(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "compactions", "counter incremented");
    }

    pub fn inc_sync_commits(&self) {
        self.sync_commits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sync_commits", "counter incremented");
    }

    pub fn inc_sync_conflicts(&self) {
        self.sync_conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sync_conflicts", "counter incremented");
    }

    pub fn inc_sync_failures(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sync_failures", "counter incremented");
    }

    pub fn inc_redaction_fallbacks(&self) {
        self.redaction_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "redaction_fallbacks", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a cycle, daemon shutdown)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            appends = self.appends(),
            compactions = self.compactions(),
            sync_commits = self.sync_commits(),
            sync_conflicts = self.sync_conflicts(),
            sync_failures = self.sync_failures(),
            redaction_fallbacks = self.redaction_fallbacks(),
        );
    }

    pub fn appends(&self) -> u64 {
        self.appends.load(Ordering::Relaxed)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    pub fn sync_commits(&self) -> u64 {
        self.sync_commits.load(Ordering::Relaxed)
    }

    pub fn sync_conflicts(&self) -> u64 {
        self.sync_conflicts.load(Ordering::Relaxed)
    }

    pub fn sync_failures(&self) -> u64 {
        self.sync_failures.load(Ordering::Relaxed)
    }

    pub fn redaction_fallbacks(&self) -> u64 {
        self.redaction_fallbacks.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.appends.store(0, Ordering::Relaxed);
        self.compactions.store(0, Ordering::Relaxed);
        self.sync_commits.store(0, Ordering::Relaxed);
        self.sync_conflicts.store(0, Ordering::Relaxed);
        self.sync_failures.store(0, Ordering::Relaxed);
        self.redaction_fallbacks.store(0, Ordering::Relaxed);
    }
}
