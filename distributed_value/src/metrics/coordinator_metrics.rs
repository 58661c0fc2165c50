//! Counters shared between the ingestion thread and the scheduler.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe coordinator counters.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    experiences_stored: AtomicU64,
    samples_ignored: AtomicU64,
    verification_samples: AtomicU64,
    train_iterations: AtomicU64,
    empty_train_cycles: AtomicU64,
    target_syncs: AtomicU64,
    skipped_syncs: AtomicU64,
    broadcasts: AtomicU64,
    verifications: AtomicU64,
    /// Bits of the most recent training loss.
    last_loss_bits: AtomicU32,
}

/// Point-in-time copy of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Experience samples added to the replay buffer.
    pub experiences_stored: u64,
    /// Experience samples dropped past the cutoff.
    pub samples_ignored: u64,
    /// Verification samples received.
    pub verification_samples: u64,
    /// Train policy firings, with or without a batch.
    pub train_iterations: u64,
    /// Firings that found too little data to train.
    pub empty_train_cycles: u64,
    pub target_syncs: u64,
    /// Target syncs suppressed by the cutoff.
    pub skipped_syncs: u64,
    /// Weight versions published.
    pub broadcasts: u64,
    /// Verification reports produced.
    pub verifications: u64,
    /// Loss of the most recent non-empty training step.
    pub last_loss: f32,
}

impl CoordinatorMetrics {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// One experience sample stored.
    pub fn record_experience(&self) {
        self.experiences_stored.fetch_add(1, Ordering::Relaxed);
    }

    /// One experience sample read past the cutoff.
    pub fn record_ignored(&self) {
        self.samples_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// One verification sample received.
    pub fn record_verification_sample(&self) {
        self.verification_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one train policy firing and its loss, if a batch was drawn.
    pub fn record_train(&self, loss: Option<f32>) {
        self.train_iterations.fetch_add(1, Ordering::Relaxed);
        match loss {
            Some(loss) => self.last_loss_bits.store(loss.to_bits(), Ordering::Relaxed),
            None => {
                self.empty_train_cycles.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Target network replaced.
    pub fn record_target_sync(&self) {
        self.target_syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// Target sync suppressed by the cutoff.
    pub fn record_skipped_sync(&self) {
        self.skipped_syncs.fetch_add(1, Ordering::Relaxed);
    }

    /// One weight version published.
    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// One verification report produced.
    pub fn record_verification(&self) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            experiences_stored: self.experiences_stored.load(Ordering::Relaxed),
            samples_ignored: self.samples_ignored.load(Ordering::Relaxed),
            verification_samples: self.verification_samples.load(Ordering::Relaxed),
            train_iterations: self.train_iterations.load(Ordering::Relaxed),
            empty_train_cycles: self.empty_train_cycles.load(Ordering::Relaxed),
            target_syncs: self.target_syncs.load(Ordering::Relaxed),
            skipped_syncs: self.skipped_syncs.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
            last_loss: f32::from_bits(self.last_loss_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Shared coordinator metrics.
pub type SharedCoordinatorMetrics = Arc<CoordinatorMetrics>;

/// Create new shared coordinator metrics.
pub fn coordinator_metrics() -> SharedCoordinatorMetrics {
    Arc::new(CoordinatorMetrics::new())
}
