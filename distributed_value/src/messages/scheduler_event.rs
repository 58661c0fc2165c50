//! Events emitted by the training scheduler.

use std::path::PathBuf;

use crate::learner::{TrainOutcome, VerificationReport};

/// One fired policy, in the order the scheduler evaluated it.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// The train policy fired. `outcome` is `None` when the buffer could not
    /// supply a batch.
    Trained {
        iteration: u64,
        step: u64,
        outcome: Option<TrainOutcome>,
    },
    /// Live parameters were copied into the target network.
    TargetSynced { step: u64 },
    /// The sync policy fired past the ingestion cutoff; the copy was skipped.
    TargetSyncSkipped { step: u64, cutoff: u64 },
    /// Weights were published under `version`.
    Broadcast { version: u64, path: PathBuf },
    /// The verify policy fired. `report` is `None` for an empty store.
    Verified {
        iteration: u64,
        report: Option<VerificationReport>,
    },
}

impl SchedulerEvent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SchedulerEvent::Trained { outcome: Some(_), .. } => "trained",
            SchedulerEvent::Trained { outcome: None, .. } => "train-skipped",
            SchedulerEvent::TargetSynced { .. } => "target-synced",
            SchedulerEvent::TargetSyncSkipped { .. } => "target-sync-skipped",
            SchedulerEvent::Broadcast { .. } => "broadcast",
            SchedulerEvent::Verified { .. } => "verified",
        }
    }
}
