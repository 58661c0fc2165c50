//! Shared state between the ingestion thread and the training scheduler.

pub mod change_signal;
pub mod replay_buffer;
pub mod state;
pub mod target_network;
pub mod verification_store;

pub use change_signal::{ChangeSignal, SharedChangeSignal};
pub use replay_buffer::{
    replay_buffer, ReplayBuffer, ReplayBufferConfig, SampledEntry, SharedReplayBuffer,
};
pub use state::{flatten_states, State, Transition};
pub use target_network::{hard_copy, TargetNetwork};
pub use verification_store::{SharedVerificationStore, VerificationStore};
