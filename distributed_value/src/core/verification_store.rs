//! Ground-truth steps-to-solve per state.
//!
//! Targets may only shrink: a worker that finds a shorter solution replaces
//! the stored value, while a longer one is a protocol violation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::state::State;
use crate::error::CoordinatorError;

/// Map from state to the best known number of steps to solve it.
#[derive(Default)]
pub struct VerificationStore {
    targets: RwLock<HashMap<State, u64>>,
}

impl VerificationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `target` for `state`.
    ///
    /// Returns the previous value if there was one. Fails without modifying
    /// the store when `target` is larger than the stored value.
    pub fn record(&self, state: State, target: u64) -> Result<Option<u64>, CoordinatorError> {
        let mut targets = self.targets.write();
        match targets.get(&state).copied() {
            Some(stored) if target > stored => Err(CoordinatorError::VerificationRegression {
                stored,
                incoming: target,
            }),
            previous => {
                targets.insert(state, target);
                Ok(previous)
            }
        }
    }

    /// Stored target for `state`.
    pub fn get(&self, state: &State) -> Option<u64> {
        self.targets.read().get(state).copied()
    }

    /// Number of distinct states.
    pub fn len(&self) -> usize {
        self.targets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.read().is_empty()
    }

    /// Copy of every `(state, target)` pair, in arbitrary order.
    pub fn snapshot(&self) -> Vec<(State, u64)> {
        self.targets
            .read()
            .iter()
            .map(|(state, target)| (state.clone(), *target))
            .collect()
    }
}

/// Shared verification store.
pub type SharedVerificationStore = Arc<VerificationStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> State {
        State::new(vec![0.25, 0.75])
    }

    #[test]
    fn test_first_record_has_no_previous() {
        let store = VerificationStore::new();
        assert_eq!(store.record(key(), 7).unwrap(), None);
        assert_eq!(store.get(&key()), Some(7));
    }

    #[test]
    fn test_smaller_target_replaces() {
        let store = VerificationStore::new();
        store.record(key(), 10).unwrap();
        assert_eq!(store.record(key(), 5).unwrap(), Some(10));
        assert_eq!(store.get(&key()), Some(5));
    }

    #[test]
    fn test_equal_target_is_accepted() {
        let store = VerificationStore::new();
        store.record(key(), 4).unwrap();
        assert_eq!(store.record(key(), 4).unwrap(), Some(4));
    }

    #[test]
    fn test_larger_target_is_rejected() {
        let store = VerificationStore::new();
        store.record(key(), 5).unwrap();
        let err = store.record(key(), 10).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::VerificationRegression { stored: 5, incoming: 10 }
        ));
        assert_eq!(store.get(&key()), Some(5));
    }

    #[test]
    fn test_snapshot_lists_all_states() {
        let store = VerificationStore::new();
        store.record(State::new(vec![1.0]), 1).unwrap();
        store.record(State::new(vec![2.0]), 2).unwrap();

        let mut snapshot = store.snapshot();
        snapshot.sort_by_key(|(_, t)| *t);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1], (State::new(vec![2.0]), 2));
    }
}
