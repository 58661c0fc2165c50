//! Messages exchanged with workers and emitted by the scheduler.
//!
//! # Flow
//!
//! ```text
//!  workers ──SampleMsg──► ingestion ──► replay buffer / verification store
//!                                             │
//!                              scheduler ◄────┘ (change signal)
//!                                  │
//!                                  └──SchedulerEvent──► observers
//! ```

mod sample_msg;
mod scheduler_event;


pub use sample_msg::{ExperienceSample, SampleMsg, SampleTag, VerificationSample};
pub use scheduler_event::SchedulerEvent;
