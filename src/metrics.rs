//! Evaluation counters for profiling fixpoint runs.
//!
//! With the `metrics` feature enabled, the [`Machine`](crate::eval::Machine)
//! counts rounds, scans and insertions as it executes. When disabled, every
//! operation is a no-op with zero overhead.
//!
//! All counters use relaxed ordering; intermediate reads may be slightly
//! stale under concurrency, but the report taken after a run completes is
//! accurate.

use std::fmt;

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregate counters collected during one evaluation.
#[cfg(feature = "metrics")]
#[derive(Debug, Default)]
pub struct EvalMetrics {
    /// Incremental fixpoint rounds executed
    rounds: AtomicU64,
    /// Search/Query loops entered
    searches: AtomicU64,
    /// Rows produced by those scans
    tuples_scanned: AtomicU64,
    /// Project statements evaluated
    projections: AtomicU64,
    /// Projections that changed a relation
    inserts: AtomicU64,
    /// Projections subsumed by existing contents
    duplicates: AtomicU64,
    /// MergeInto statements executed
    merges: AtomicU64,
}

#[cfg(feature = "metrics")]
impl EvalMetrics {
    pub fn search(&self, scanned: usize) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.tuples_scanned
            .fetch_add(scanned as u64, Ordering::Relaxed);
    }

    pub fn project(&self, changed: bool) {
        self.projections.fetch_add(1, Ordering::Relaxed);
        if changed {
            self.inserts.fetch_add(1, Ordering::Relaxed);
        } else {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn merge(&self) {
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn round(&self) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            rounds: self.rounds.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            tuples_scanned: self.tuples_scanned.load(Ordering::Relaxed),
            projections: self.projections.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
        }
    }
}

/// No-op metrics when the feature is disabled.
#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct EvalMetrics;

#[cfg(not(feature = "metrics"))]
impl EvalMetrics {
    pub fn search(&self, _scanned: usize) {}
    pub fn project(&self, _changed: bool) {}
    pub fn merge(&self) {}
    pub fn round(&self) {}

    pub fn report(&self) -> MetricsReport {
        MetricsReport::default()
    }
}

/// Point-in-time snapshot of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsReport {
    pub rounds: u64,
    pub searches: u64,
    pub tuples_scanned: u64,
    pub projections: u64,
    pub inserts: u64,
    pub duplicates: u64,
    pub merges: u64,
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rounds={} searches={} scanned={} projections={} inserts={} duplicates={} merges={}",
            self.rounds,
            self.searches,
            self.tuples_scanned,
            self.projections,
            self.inserts,
            self.duplicates,
            self.merges
        )
    }
}
