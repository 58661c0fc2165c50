//! One supervised step of the value network against bootstrapped targets.
//!
//! For a sampled start state `s` with transitions `a -> [r1, .., rk]`:
//!
//! ```text
//! Q(s, a)   = γ · Π_i V_target(r_i)      (empty product = 1)
//! target(s) = max_a Q(s, a)
//! loss      = mean((V_live(s) - target(s))²)
//! ```
//!
//! Every result state in the batch goes through the target network in one
//! forward pass; [`bootstrap_targets`] then folds the flat predictions back
//! into per-state targets.

use std::marker::PhantomData;

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::core::{flatten_states, ReplayBuffer, SampledEntry};
use crate::error::CoordinatorError;
use crate::model::ValueNetwork;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub batch_size: usize,
    /// Applied once per action when bootstrapping.
    pub discount_factor: f32,
    pub learning_rate: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            discount_factor: 0.9,
            learning_rate: 5e-6,
        }
    }
}

impl TrainerConfig {
    /// Defaults matching [`CoordinatorConfig`](crate::CoordinatorConfig).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set discount factor.
    pub fn with_discount_factor(mut self, gamma: f32) -> Self {
        self.discount_factor = gamma;
        self
    }

    /// Set learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }
}

/// Result of one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    /// Start states in the batch.
    pub batch_size: usize,
    /// MSE before the step.
    pub loss: f32,
}

/// Fold flat target-network predictions into one target per sampled state.
///
/// `predictions` must list result states in batch order, then transition
/// order, then result order.
pub fn bootstrap_targets(
    batch: &[SampledEntry],
    predictions: &[f32],
    discount: f32,
) -> Result<Vec<f32>, CoordinatorError> {
    let mut cursor = predictions.iter();
    let mut targets = Vec::with_capacity(batch.len());

    for entry in batch {
        if entry.transitions.is_empty() {
            return Err(CoordinatorError::EmptyTransitions);
        }
        let mut best = f32::NEG_INFINITY;
        for transition in &entry.transitions {
            let mut product = 1.0f32;
            for _ in &transition.result_states {
                let value = cursor.next().ok_or_else(|| {
                    CoordinatorError::Internal("fewer predictions than result states".to_string())
                })?;
                product *= *value;
            }
            best = best.max(discount * product);
        }
        targets.push(best);
    }

    if cursor.next().is_some() {
        return Err(CoordinatorError::Internal(
            "more predictions than result states".to_string(),
        ));
    }
    Ok(targets)
}

/// Owns the optimizer; borrows the networks for each step.
pub struct Trainer<B, M, O>
where
    B: AutodiffBackend,
{
    config: TrainerConfig,
    optimizer: O,
    device: B::Device,
    _model: PhantomData<M>,
}

impl<B, M, O> Trainer<B, M, O>
where
    B: AutodiffBackend,
    M: ValueNetwork<B> + AutodiffModule<B>,
    M::InnerModule: ValueNetwork<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    /// Create a trainer owning `optimizer`.
    pub fn new(config: TrainerConfig, optimizer: O, device: B::Device) -> Self {
        Self {
            config,
            optimizer,
            device,
            _model: PhantomData,
        }
    }

    /// Get the trainer configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Sample a batch and take one optimizer step on `live`.
    ///
    /// Returns `Ok(None)` when the buffer cannot supply a batch.
    pub fn train(
        &mut self,
        live: &mut M,
        target: &M::InnerModule,
        buffer: &ReplayBuffer,
    ) -> Result<Option<TrainOutcome>, CoordinatorError> {
        let batch = match buffer.sample(self.config.batch_size) {
            Some(batch) => batch,
            None => return Ok(None),
        };
        let batch_size = batch.len();
        let encoding = batch[0].state.len();

        let result_states: Vec<_> = batch
            .iter()
            .flat_map(|entry| entry.transitions.iter())
            .flat_map(|transition| transition.result_states.iter())
            .collect();
        let predictions = if result_states.is_empty() {
            Vec::new()
        } else {
            let n = result_states.len();
            let flat = flatten_states(result_states);
            let input = Tensor::<B::InnerBackend, 1>::from_floats(flat.as_slice(), &self.device)
                .reshape([n, encoding]);
            tensor_to_vec(target.predict(input))?
        };

        let targets = bootstrap_targets(&batch, &predictions, self.config.discount_factor)?;

        let starts = flatten_states(batch.iter().map(|entry| &entry.state));
        let input = Tensor::<B, 1>::from_floats(starts.as_slice(), &self.device)
            .reshape([batch_size, encoding]);
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device);

        let diff = live.predict(input) - targets;
        let loss = (diff.clone() * diff).mean();
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &*live);
        *live = self
            .optimizer
            .step(self.config.learning_rate, live.clone(), grads);

        Ok(Some(TrainOutcome {
            batch_size,
            loss: loss_value,
        }))
    }
}

pub(crate) fn tensor_to_vec<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f32>, CoordinatorError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoordinatorError::Internal(format!("tensor readback failed: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ReplayBufferConfig, State, Transition};
    use crate::model::{ValueMlp, ValueMlpConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::AdamConfig;

    type B = Autodiff<NdArray<f32>>;

    fn entry(seed: f32, transitions: Vec<Transition>) -> SampledEntry {
        SampledEntry {
            state: State::new(vec![seed]),
            transitions,
        }
    }

    fn results(n: usize) -> Vec<State> {
        (0..n).map(|i| State::new(vec![i as f32])).collect()
    }

    #[test]
    fn test_bootstrap_takes_max_over_actions() {
        let batch = vec![entry(
            0.0,
            vec![Transition::new(0, results(1)), Transition::new(1, results(2))],
        )];
        let targets = bootstrap_targets(&batch, &[0.5, 0.4, 0.8], 0.9).unwrap();
        assert_eq!(targets.len(), 1);
        assert!((targets[0] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_bootstrap_product_of_results() {
        let batch = vec![entry(0.0, vec![Transition::new(1, results(2))])];
        let targets = bootstrap_targets(&batch, &[0.4, 0.8], 0.9).unwrap();
        assert!((targets[0] - 0.288).abs() < 1e-6);
    }

    #[test]
    fn test_bootstrap_discounts_once_per_action() {
        let batch = vec![entry(0.0, vec![Transition::new(0, results(3))])];
        let targets = bootstrap_targets(&batch, &[1.0, 1.0, 1.0], 0.9).unwrap();
        assert!((targets[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_bootstrap_empty_results_is_discount() {
        let batch = vec![entry(0.0, vec![Transition::new(0, vec![])])];
        assert_eq!(bootstrap_targets(&batch, &[], 0.9).unwrap(), vec![0.9]);
    }

    #[test]
    fn test_bootstrap_empty_transitions_is_fatal() {
        let batch = vec![entry(0.0, vec![])];
        assert!(matches!(
            bootstrap_targets(&batch, &[], 0.9),
            Err(CoordinatorError::EmptyTransitions)
        ));
    }

    #[test]
    fn test_bootstrap_prediction_count_mismatch() {
        let batch = vec![entry(0.0, vec![Transition::new(0, results(2))])];
        assert!(matches!(
            bootstrap_targets(&batch, &[0.5], 0.9),
            Err(CoordinatorError::Internal(_))
        ));
        assert!(matches!(
            bootstrap_targets(&batch, &[0.5, 0.5, 0.5], 0.9),
            Err(CoordinatorError::Internal(_))
        ));
    }

    fn trainer(batch_size: usize, lr: f64) -> Trainer<B, ValueMlp<B>, impl Optimizer<ValueMlp<B>, B>> {
        let config = TrainerConfig::new()
            .with_batch_size(batch_size)
            .with_learning_rate(lr);
        Trainer::new(
            config,
            AdamConfig::new().init::<B, ValueMlp<B>>(),
            Default::default(),
        )
    }

    #[test]
    fn test_train_without_data_is_noop() {
        let device = Default::default();
        let mut live = ValueMlpConfig::new(2).init::<B>(&device);
        let target = live.valid();
        let buffer = ReplayBuffer::new(ReplayBufferConfig::new(10));

        let outcome = trainer(4, 1e-3).train(&mut live, &target, &buffer).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_train_reduces_loss() {
        let device = Default::default();
        let mut live = ValueMlpConfig::new(2).with_hidden_size(16).init::<B>(&device);
        let target = live.valid();
        let buffer = ReplayBuffer::new(ReplayBufferConfig::new(100));
        for i in 0..4 {
            buffer.add_transition(State::new(vec![i as f32, 1.0]), 0, vec![]);
        }

        let mut trainer = trainer(4, 1e-2);
        let first = trainer.train(&mut live, &target, &buffer).unwrap().unwrap();
        let mut last = None;
        for _ in 0..100 {
            last = trainer.train(&mut live, &target, &buffer).unwrap();
        }

        assert_eq!(first.batch_size, 4);
        assert!(last.unwrap().loss < first.loss);
    }

    #[test]
    fn test_train_uses_target_network_predictions() {
        let device = Default::default();
        let mut live = ValueMlpConfig::new(1).init::<B>(&device);
        let target = live.valid();
        let buffer = ReplayBuffer::new(ReplayBufferConfig::new(100));
        buffer.add_transition(State::new(vec![0.0]), 0, vec![State::new(vec![1.0])]);

        let outcome = trainer(1, 1e-3).train(&mut live, &target, &buffer).unwrap().unwrap();
        assert!(outcome.loss.is_finite());
        assert!(outcome.loss >= 0.0);
    }
}
