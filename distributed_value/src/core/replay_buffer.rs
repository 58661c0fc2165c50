//! Sliding-window, deduplicating replay buffer.
//!
//! Unlike a ring buffer of individual transitions, entries are keyed by
//! start state: every transition observed from a state is unioned into that
//! state's set, and the entry's `last_touched` stamp is refreshed on each
//! insert. Entries fall out of the window once `window_size` further inserts
//! have happened without touching them.
//!
//! # Eviction
//!
//! Eviction is lazy. `add_transition` never removes anything; `sample` first
//! drops every entry with `last_touched <= step_counter - window_size`, then
//! draws from the survivors. `len()` may therefore count expired entries that
//! have not been sampled past yet.
//!
//! ```text
//! add_transition ──► entries[start] ∪= (action, results); last_touched = step; step += 1
//! sample(n)      ──► evict expired ──► pool ──► n without replacement | whole pool | None
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::state::{State, Transition};

/// Configuration for the replay buffer.
#[derive(Debug, Clone)]
pub struct ReplayBufferConfig {
    /// Number of inserts an entry survives without being touched.
    pub window_size: u64,
    /// Return the whole pool when it is smaller than the batch.
    pub allow_partial_batches: bool,
    /// Seed for the sampling RNG (None = random).
    pub seed: Option<u64>,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            window_size: 2560,
            allow_partial_batches: false,
            seed: None,
        }
    }
}

impl ReplayBufferConfig {
    /// Create a config with the given window.
    pub fn new(window_size: u64) -> Self {
        Self {
            window_size,
            ..Default::default()
        }
    }

    /// Builder pattern: allow partial batches.
    pub fn with_allow_partial_batches(mut self, allow: bool) -> Self {
        self.allow_partial_batches = allow;
        self
    }

    /// Builder pattern: fix the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A start state together with every transition seen from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledEntry {
    /// Start state.
    pub state: State,
    /// Distinct transitions observed from `state`.
    pub transitions: Vec<Transition>,
}

struct BufferEntry {
    last_touched: u64,
    transitions: HashSet<Transition>,
}

struct BufferInner {
    entries: HashMap<State, BufferEntry>,
    step_counter: u64,
    rng: fastrand::Rng,
}

/// Thread-safe replay buffer keyed by start state.
///
/// A single mutex guards inserts, step advances and sampling.
pub struct ReplayBuffer {
    config: ReplayBufferConfig,
    inner: Mutex<BufferInner>,
}

impl ReplayBuffer {
    /// Create an empty buffer.
    pub fn new(config: ReplayBufferConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            config,
            inner: Mutex::new(BufferInner {
                entries: HashMap::new(),
                step_counter: 0,
                rng,
            }),
        }
    }

    /// Union `(action, result_states)` into the entry for `start`.
    ///
    /// Stamps the entry with the current step and then advances the step
    /// counter. Returns the new counter value.
    pub fn add_transition(&self, start: State, action: i64, result_states: Vec<State>) -> u64 {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let step = inner.step_counter;

        let entry = inner.entries.entry(start).or_insert_with(|| BufferEntry {
            last_touched: step,
            transitions: HashSet::new(),
        });
        entry.transitions.insert(Transition::new(action, result_states));
        entry.last_touched = step;

        inner.step_counter += 1;
        inner.step_counter
    }

    /// Advance the step counter without storing anything.
    ///
    /// Returns the new counter value.
    pub fn advance_step(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.step_counter += 1;
        inner.step_counter
    }

    /// Evict expired entries, then draw a batch.
    ///
    /// - pool >= `batch_size`: exactly `batch_size` entries, uniformly, without replacement
    /// - smaller non-empty pool with partial batches allowed: the whole pool
    /// - otherwise `None`
    pub fn sample(&self, batch_size: usize) -> Option<Vec<SampledEntry>> {
        if batch_size == 0 {
            return None;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = inner.step_counter;
        let window = self.config.window_size;

        inner
            .entries
            .retain(|_, entry| entry.last_touched.saturating_add(window) > now);

        let mut pool: Vec<(&State, &BufferEntry)> = inner.entries.iter().collect();
        if pool.len() >= batch_size {
            // Partial Fisher-Yates: the first `batch_size` slots become the sample.
            for i in 0..batch_size {
                let j = inner.rng.usize(i..pool.len());
                pool.swap(i, j);
            }
            pool.truncate(batch_size);
        } else if !(self.config.allow_partial_batches && !pool.is_empty()) {
            return None;
        }

        Some(
            pool.into_iter()
                .map(|(state, entry)| SampledEntry {
                    state: state.clone(),
                    transitions: entry.transitions.iter().cloned().collect(),
                })
                .collect(),
        )
    }

    /// Current step counter.
    pub fn steps(&self) -> u64 {
        self.inner.lock().step_counter
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct transitions stored for `state`.
    pub fn transition_count(&self, state: &State) -> Option<usize> {
        self.inner
            .lock()
            .entries
            .get(state)
            .map(|entry| entry.transitions.len())
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReplayBufferConfig {
        &self.config
    }

    /// Inserts an untouched entry survives.
    pub fn window_size(&self) -> u64 {
        self.config.window_size
    }

    /// Whether short batches may be sampled.
    pub fn allow_partial_batches(&self) -> bool {
        self.config.allow_partial_batches
    }
}

/// Thread-safe shared replay buffer.
pub type SharedReplayBuffer = Arc<ReplayBuffer>;

/// Create a new shared replay buffer.
pub fn replay_buffer(config: ReplayBufferConfig) -> SharedReplayBuffer {
    Arc::new(ReplayBuffer::new(config))
}
