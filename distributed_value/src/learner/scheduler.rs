//! Threshold-driven training loop.
//!
//! The scheduler sleeps on the change signal. Each wake evaluates four
//! policies in a fixed order, each against its own "last fired" counter:
//!
//! | policy    | clock                 | action                              |
//! |-----------|-----------------------|-------------------------------------|
//! | train     | buffer step counter   | one trainer step                    |
//! | sync      | buffer step counter   | hard copy live -> target            |
//! | broadcast | buffer step counter   | publish weights as `next_version`   |
//! | verify    | training iterations   | score target net on verified states |
//!
//! Several policies may fire on one wake. Every policy that fires emits a
//! [`SchedulerEvent`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::tensor::backend::AutodiffBackend;
use crossbeam_channel::{Sender, TrySendError};

use super::trainer::{TrainOutcome, Trainer};
use super::verifier::Verifier;
use crate::checkpoint::WeightPublisher;
use crate::core::{
    hard_copy, SharedChangeSignal, SharedReplayBuffer, SharedVerificationStore, TargetNetwork,
};
use crate::error::CoordinatorError;
use crate::messages::SchedulerEvent;
use crate::metrics::SharedCoordinatorMetrics;
use crate::model::ValueNetwork;

/// Policy intervals.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Buffer steps between training steps.
    pub train_interval: u64,
    /// Buffer steps between target syncs.
    pub sync_interval: u64,
    /// Buffer steps between weight broadcasts.
    pub broadcast_interval: u64,
    /// Training iterations between verifications (None = never).
    pub verify_interval: Option<u64>,
    /// Skip target syncs once the buffer step counter passes this.
    pub ignore_after: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            train_interval: 8,
            sync_interval: 32,
            broadcast_interval: 16,
            verify_interval: None,
            ignore_after: None,
        }
    }
}

impl SchedulerConfig {
    /// Default intervals, no verification, no cutoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set buffer steps between training steps.
    pub fn with_train_interval(mut self, interval: u64) -> Self {
        self.train_interval = interval;
        self
    }

    /// Set buffer steps between target syncs.
    pub fn with_sync_interval(mut self, interval: u64) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set buffer steps between weight broadcasts.
    pub fn with_broadcast_interval(mut self, interval: u64) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Set training iterations between verification reports.
    pub fn with_verify_interval(mut self, interval: u64) -> Self {
        self.verify_interval = Some(interval);
        self
    }

    /// Stop target syncs after this buffer step.
    pub fn with_ignore_after(mut self, cutoff: u64) -> Self {
        self.ignore_after = Some(cutoff);
        self
    }
}

/// Counters consulted by the policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    /// Buffer step of the last train firing.
    pub steps_last_trained: u64,
    /// Buffer step of the last target sync.
    pub steps_last_synced: u64,
    /// Buffer step of the last broadcast.
    pub steps_last_broadcast: u64,
    /// Version number the next broadcast publishes.
    pub next_version: u64,
    pub iterations_trained: u64,
    /// Value of `iterations_trained` at the last report.
    pub last_verified: u64,
}

impl SchedulerState {
    /// Whether training is due at `steps`.
    pub fn train_due(&self, steps: u64, interval: u64) -> bool {
        steps.saturating_sub(self.steps_last_trained) >= interval
    }

    /// Whether a target sync is due at `steps`.
    pub fn sync_due(&self, steps: u64, interval: u64) -> bool {
        steps.saturating_sub(self.steps_last_synced) >= interval
    }

    /// Whether a broadcast is due at `steps`.
    pub fn broadcast_due(&self, steps: u64, interval: u64) -> bool {
        steps.saturating_sub(self.steps_last_broadcast) >= interval
    }

    /// Whether a verification report is due.
    pub fn verify_due(&self, interval: Option<u64>) -> bool {
        match interval {
            Some(interval) => self.iterations_trained.saturating_sub(self.last_verified) >= interval,
            None => false,
        }
    }
}

/// Handles shared with the ingestion thread.
#[derive(Clone)]
pub struct SharedHandles {
    pub buffer: SharedReplayBuffer,
    pub store: SharedVerificationStore,
    /// Raised by ingestion, waited on by the scheduler.
    pub signal: SharedChangeSignal,
    pub metrics: SharedCoordinatorMetrics,
}

/// Owns the networks and optimizer; runs on one thread.
pub struct TrainingScheduler<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    config: SchedulerConfig,
    state: SchedulerState,
    live: M,
    target: TargetNetwork<M::InnerModule>,
    trainer: Trainer<B, M, O>,
    publisher: WeightPublisher,
    verifier: Verifier,
    shared: SharedHandles,
    device: B::Device,
    events: Option<Sender<SchedulerEvent>>,
    dropped_events: Arc<AtomicUsize>,
}

impl<B, M, O> TrainingScheduler<B, M, O>
where
    B: AutodiffBackend,
    M: ValueNetwork<B> + AutodiffModule<B>,
    M::InnerModule: ValueNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    /// The target network starts as a hard copy of `live`.
    pub fn new(
        config: SchedulerConfig,
        live: M,
        trainer: Trainer<B, M, O>,
        publisher: WeightPublisher,
        verifier: Verifier,
        shared: SharedHandles,
        device: B::Device,
    ) -> Self {
        let target = TargetNetwork::new(hard_copy::<B, M>(&live));
        Self {
            config,
            state: SchedulerState::default(),
            live,
            target,
            trainer,
            publisher,
            verifier,
            shared,
            device,
            events: None,
            dropped_events: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit events on `tx`. Sends never block; overflow is counted.
    pub fn with_events(mut self, tx: Sender<SchedulerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Get the policy bookkeeping.
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Get the network being trained.
    pub fn live(&self) -> &M {
        &self.live
    }

    /// Get the frozen target network.
    pub fn target(&self) -> &TargetNetwork<M::InnerModule> {
        &self.target
    }

    /// Events lost because the observer queue was full.
    pub fn dropped_events(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Evaluate every policy once against the current counters.
    pub fn tick(&mut self) -> Result<Vec<SchedulerEvent>, CoordinatorError> {
        let steps = self.shared.buffer.steps();
        let mut events = Vec::new();

        if self.state.train_due(steps, self.config.train_interval) {
            self.state.steps_last_trained = steps;
            let outcome = self
                .trainer
                .train(&mut self.live, self.target.model(), &self.shared.buffer)?;
            self.state.iterations_trained += 1;
            self.record_train(steps, outcome);
            events.push(SchedulerEvent::Trained {
                iteration: self.state.iterations_trained,
                step: steps,
                outcome,
            });
        }

        if self.state.sync_due(steps, self.config.sync_interval) {
            self.state.steps_last_synced = steps;
            match self.config.ignore_after {
                Some(cutoff) if steps > cutoff => {
                    self.shared.metrics.record_skipped_sync();
                    log::warn!(
                        "Skipping target sync at step {}: past ingestion cutoff {}",
                        steps,
                        cutoff
                    );
                    events.push(SchedulerEvent::TargetSyncSkipped { step: steps, cutoff });
                }
                _ => {
                    self.target.sync_from(hard_copy::<B, M>(&self.live), steps);
                    self.shared.metrics.record_target_sync();
                    log::info!("Synced target network at step {}", steps);
                    events.push(SchedulerEvent::TargetSynced { step: steps });
                }
            }
        }

        if self.state.broadcast_due(steps, self.config.broadcast_interval) {
            self.state.steps_last_broadcast = steps;
            let version = self.state.next_version;
            let path = self.publisher.publish::<B, M>(&self.live, version)?;
            self.state.next_version += 1;
            self.shared.metrics.record_broadcast();
            self.log_progress(version);
            events.push(SchedulerEvent::Broadcast { version, path });
        }

        if self.state.verify_due(self.config.verify_interval) {
            let report = self.verifier.verify::<B::InnerBackend, M::InnerModule>(
                self.target.model(),
                &self.shared.store,
                &self.device,
            )?;
            self.state.last_verified = self.state.iterations_trained;
            self.shared.metrics.record_verification();
            events.push(SchedulerEvent::Verified {
                iteration: self.state.iterations_trained,
                report,
            });
        }

        for event in &events {
            self.emit(event.clone());
        }
        Ok(events)
    }

    fn record_train(&self, steps: u64, outcome: Option<TrainOutcome>) {
        self.shared.metrics.record_train(outcome.map(|o| o.loss));
        match outcome {
            Some(o) => log::info!(
                "Training iteration {} at step {}: batch {} loss {:.6}",
                self.state.iterations_trained,
                steps,
                o.batch_size,
                o.loss
            ),
            None => log::debug!(
                "Training iteration {} at step {}: not enough data for a batch",
                self.state.iterations_trained,
                steps
            ),
        }
    }

    fn log_progress(&self, version: u64) {
        let snap = self.shared.metrics.snapshot();
        log::info!(
            "Broadcast version {}: {} experiences stored, {} ignored, {} verification samples, \
             {} train iterations ({} empty), {} target syncs, last loss {:.6}",
            version,
            snap.experiences_stored,
            snap.samples_ignored,
            snap.verification_samples,
            snap.train_iterations,
            snap.empty_train_cycles,
            snap.target_syncs,
            snap.last_loss
        );
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            if let Err(TrySendError::Full(_)) = tx.try_send(event) {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Wait-and-tick until a fault arrives, which is returned.
    pub fn run(mut self) -> CoordinatorError {
        loop {
            if let Err(e) = self.shared.signal.wait() {
                return e;
            }
            if let Err(e) = self.tick() {
                log::error!("Training scheduler stopped: {}", e);
                return e;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_predicates_use_distance() {
        let state = SchedulerState {
            steps_last_trained: 8,
            steps_last_synced: 0,
            steps_last_broadcast: 16,
            ..Default::default()
        };
        assert!(!state.train_due(15, 8));
        assert!(state.train_due(16, 8));
        assert!(state.sync_due(32, 32));
        assert!(!state.broadcast_due(31, 16));
    }

    #[test]
    fn test_verify_disabled_without_interval() {
        let state = SchedulerState {
            iterations_trained: 100,
            ..Default::default()
        };
        assert!(!state.verify_due(None));
        assert!(state.verify_due(Some(100)));
        assert!(!state.verify_due(Some(101)));
    }

    #[test]
    fn test_fresh_state_is_not_due() {
        let state = SchedulerState::default();
        assert!(!state.train_due(0, 1));
        assert!(state.train_due(1, 1));
    }
}
