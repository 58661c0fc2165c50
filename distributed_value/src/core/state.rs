//! Encoded search states and the transitions observed between them.
//!
//! States arrive already encoded as fixed-length `f32` vectors and are used
//! as exact-match map keys. Equality and hashing therefore work on the raw
//! bit patterns rather than on numeric comparison: two occurrences of a state
//! are the same key iff they are bit-for-bit identical. `0.0` and `-0.0` are
//! distinct keys, and a NaN matches an identical NaN.

use std::hash::{Hash, Hasher};

/// Fixed-length encoded state.
#[derive(Debug, Clone, Default)]
pub struct State(Vec<f32>);

impl State {
    /// Wrap an encoded vector.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Encoded values.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Encoding length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the encoding is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap into the encoded vector.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for State {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for value in &self.0 {
            state.write_u32(value.to_bits());
        }
    }
}

/// One action's full outcome set.
///
/// An action may lead to several states at once (an AND-branch); it only
/// succeeds if every one of them is eventually solved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transition {
    /// Action identifier chosen by the worker.
    pub action: i64,
    /// Resulting states, in the order the worker reported them.
    pub result_states: Vec<State>,
}

impl Transition {
    /// Create a new transition.
    pub fn new(action: i64, result_states: Vec<State>) -> Self {
        Self {
            action,
            result_states,
        }
    }
}

/// Flatten states into one row-major buffer for a `[n, encoding]` tensor.
pub fn flatten_states<'a, I>(states: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a State>,
{
    states
        .into_iter()
        .flat_map(|s| s.as_slice().iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_identical_bits_are_equal_keys() {
        let mut map = HashMap::new();
        map.insert(State::new(vec![1.0, 2.5]), 1);
        assert_eq!(map.get(&State::new(vec![1.0, 2.5])), Some(&1));
    }

    #[test]
    fn test_signed_zero_is_a_distinct_key() {
        let pos = State::new(vec![0.0]);
        let neg = State::new(vec![-0.0]);
        assert_ne!(pos, neg);

        let set: HashSet<State> = [pos, neg].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_identical_nan_matches() {
        let a = State::new(vec![f32::NAN]);
        let b = State::new(vec![f32::NAN]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_length_participates_in_equality() {
        assert_ne!(State::new(vec![1.0]), State::new(vec![1.0, 0.0]));
    }

    #[test]
    fn test_transition_set_deduplicates() {
        let t = Transition::new(3, vec![State::new(vec![1.0]), State::new(vec![2.0])]);
        let mut set = HashSet::new();
        assert!(set.insert(t.clone()));
        assert!(!set.insert(t));

        // Same states in another order is a different outcome list.
        let swapped = Transition::new(3, vec![State::new(vec![2.0]), State::new(vec![1.0])]);
        assert!(set.insert(swapped));
    }

    #[test]
    fn test_flatten_states_row_major() {
        let states = vec![State::new(vec![1.0, 2.0]), State::new(vec![3.0, 4.0])];
        assert_eq!(flatten_states(&states), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
