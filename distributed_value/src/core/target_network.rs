//! Frozen copy of the value network used for bootstrap targets.
//!
//! The live network is trained every cycle; bootstrapping from it directly
//! chases a moving target. The target network is a gradient-free snapshot
//! replaced wholesale every few train cycles:
//!
//! ```text
//! target(s) = max over actions a of  γ · Π over results r of a  V_target(r)
//! ```
//!
//! The discount is applied once per action, outside the product.
//!
//! Updates are hard copies only. The snapshot lives on the inner (non-autodiff)
//! backend, so forward passes through it never record a graph.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

/// Gradient-free snapshot of an autodiff module.
pub fn hard_copy<B, M>(live: &M) -> M::InnerModule
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    live.valid()
}

/// Holder for the target snapshot and its sync bookkeeping.
#[derive(Debug, Clone)]
pub struct TargetNetwork<M> {
    model: M,
    synced_at: Option<u64>,
    syncs: u64,
}

impl<M: Clone> TargetNetwork<M> {
    /// Wrap an initial snapshot. It counts as never synced.
    pub fn new(model: M) -> Self {
        Self {
            model,
            synced_at: None,
            syncs: 0,
        }
    }

    /// Replace the snapshot, recording the buffer step it was taken at.
    pub fn sync_from(&mut self, model: M, step: u64) {
        self.model = model;
        self.synced_at = Some(step);
        self.syncs += 1;
    }

    /// Current snapshot.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Buffer step of the last sync.
    pub fn synced_at(&self) -> Option<u64> {
        self.synced_at
    }

    /// Number of syncs since creation.
    pub fn syncs(&self) -> u64 {
        self.syncs
    }
}
