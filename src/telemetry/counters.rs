use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lightweight in-process counters for a settlement worker, logged on a timer rather than
/// exported to a metrics backend (dashboards/alerting are out of scope for this core).
#[derive(Default)]
pub struct SettlementCounters {
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_requeued: AtomicU64,
}

impl SettlementCounters {
    pub fn inc_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requeued(&self) {
        self.jobs_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self) {
        info!(
            succeeded = self.jobs_succeeded.load(Ordering::Relaxed),
            failed = self.jobs_failed.load(Ordering::Relaxed),
            retried = self.jobs_retried.load(Ordering::Relaxed),
            requeued = self.jobs_requeued.load(Ordering::Relaxed),
            "settlement worker summary"
        );
    }
}

/// Counters for the persistence worker's per-stream consumer loops.
#[derive(Default)]
pub struct PersistenceCounters {
    acked: AtomicU64,
    retried: AtomicU64,
    reclaimed: AtomicU64,
    duplicates_skipped: AtomicU64,
}

impl PersistenceCounters {
    pub fn inc_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reclaimed(&self) {
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicates_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log_summary(&self) {
        info!(
            acked = self.acked.load(Ordering::Relaxed),
            retried = self.retried.load(Ordering::Relaxed),
            reclaimed = self.reclaimed.load(Ordering::Relaxed),
            duplicates_skipped = self.duplicates_skipped.load(Ordering::Relaxed),
            "persistence worker summary"
        );
    }
}
