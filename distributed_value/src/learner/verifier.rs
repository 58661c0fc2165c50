//! Compares predicted steps-to-solve against verified ground truth.
//!
//! A value `v = γ^k` corresponds to `k = ln(v) / ln(γ)` steps.

use burn::prelude::*;

use super::trainer::tensor_to_vec;
use crate::core::{flatten_states, VerificationStore};
use crate::error::CoordinatorError;
use crate::model::ValueNetwork;

/// Mean absolute step error over every verified state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationReport {
    /// States evaluated.
    pub count: usize,
    /// Mean of |predicted steps - verified steps|.
    pub mean_abs_error: f32,
}

/// Steps implied by a value under `discount`.
pub fn predicted_steps(value: f32, discount: f32) -> f32 {
    value.ln() / discount.ln()
}

/// `None` for no entries.
pub fn mean_abs_step_error(
    values: &[f32],
    targets: &[u64],
    discount: f32,
) -> Option<VerificationReport> {
    if values.is_empty() || values.len() != targets.len() {
        return None;
    }
    let total: f32 = values
        .iter()
        .zip(targets)
        .map(|(&v, &t)| (predicted_steps(v, discount) - t as f32).abs())
        .sum();
    Some(VerificationReport {
        count: values.len(),
        mean_abs_error: total / values.len() as f32,
    })
}

/// Periodic accuracy check of the target network.
#[derive(Debug, Clone)]
pub struct Verifier {
    discount_factor: f32,
}

impl Verifier {
    /// Create a verifier converting values to steps under `discount_factor`.
    pub fn new(discount_factor: f32) -> Self {
        Self { discount_factor }
    }

    /// Score every stored state with `net` in one batch. Read-only.
    pub fn verify<B, N>(
        &self,
        net: &N,
        store: &VerificationStore,
        device: &B::Device,
    ) -> Result<Option<VerificationReport>, CoordinatorError>
    where
        B: Backend,
        N: ValueNetwork<B>,
    {
        let entries = store.snapshot();
        if entries.is_empty() {
            return Ok(None);
        }
        let n = entries.len();
        let encoding = entries[0].0.len();
        let flat = flatten_states(entries.iter().map(|(state, _)| state));
        let input = Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([n, encoding]);
        let values = tensor_to_vec(net.predict(input))?;
        let targets: Vec<u64> = entries.iter().map(|(_, target)| *target).collect();

        let report = mean_abs_step_error(&values, &targets, self.discount_factor);
        if let Some(report) = &report {
            log::info!(
                "Average V Value error across {} initial states: {:.4}",
                report.count,
                report.mean_abs_error
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::State;
    use crate::model::ValueMlpConfig;
    use burn::backend::NdArray;

    #[test]
    fn test_predicted_steps_inverts_discount_power() {
        let v = 0.9f32.powi(3);
        assert!((predicted_steps(v, 0.9) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_mean_abs_step_error() {
        let values = [0.9f32.powi(2), 0.9f32.powi(5)];
        let report = mean_abs_step_error(&values, &[4, 5], 0.9).unwrap();
        assert_eq!(report.count, 2);
        assert!((report.mean_abs_error - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_empty_inputs_give_no_report() {
        assert!(mean_abs_step_error(&[], &[], 0.9).is_none());
    }

    #[test]
    fn test_verify_empty_store() {
        let device = Default::default();
        let net = ValueMlpConfig::new(2).init::<NdArray<f32>>(&device);
        let report = Verifier::new(0.9)
            .verify::<NdArray<f32>, _>(&net, &VerificationStore::new(), &device)
            .unwrap();
        assert!(report.is_none());
    }

    #[test]
    fn test_verify_scores_every_state() {
        let device = Default::default();
        let net = ValueMlpConfig::new(2).init::<NdArray<f32>>(&device);
        let store = VerificationStore::new();
        store.record(State::new(vec![0.0, 1.0]), 3).unwrap();
        store.record(State::new(vec![1.0, 0.0]), 7).unwrap();

        let report = Verifier::new(0.9)
            .verify::<NdArray<f32>, _>(&net, &store, &device)
            .unwrap().unwrap();
        assert_eq!(report.count, 2);
        assert!(report.mean_abs_error.is_finite());
    }
}
