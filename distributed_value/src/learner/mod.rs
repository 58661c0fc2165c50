//! Training side of the coordinator.
//!
//! - [`Trainer`]: one optimizer step on bootstrapped targets
//! - [`Verifier`]: mean step error against verified solutions
//! - [`TrainingScheduler`]: wakes on new data and fires train / sync /
//!   broadcast / verify policies
//!
//! # Thread model
//!
//! The live network, target network and optimizer are owned by the
//! scheduler's thread. Only the replay buffer, verification store, change
//! signal and metrics are shared with ingestion.

pub mod scheduler;
pub mod trainer;
pub mod verifier;


pub use scheduler::{SchedulerConfig, SchedulerState, SharedHandles, TrainingScheduler};
pub use trainer::{bootstrap_targets, TrainOutcome, Trainer, TrainerConfig};
pub use verifier::{mean_abs_step_error, predicted_steps, VerificationReport, Verifier};
