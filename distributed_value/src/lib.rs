//! # Distributed Value: learner-side coordinator for value-function training
//!
//! Remote search workers stream what they observe (state expansions and
//! verified solution lengths). The coordinator keeps a sliding window of
//! those observations, trains a value network on bootstrapped targets, and
//! periodically publishes versioned weights back to the workers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Worker 0        Worker 1        Worker N      (remote, over TCP)   │
//! │     │               │               │                               │
//! │     └───────────────┼───────────────┘                               │
//! │                     ▼                                               │
//! │            ┌──────────────────┐                                     │
//! │            │ SampleIngestion  │  thread: blocking receive loop      │
//! │            └───┬──────────┬───┘                                     │
//! │                ▼          ▼                                         │
//! │      ┌──────────────┐  ┌───────────────────┐                        │
//! │      │ ReplayBuffer │  │ VerificationStore │                        │
//! │      └──────┬───────┘  └─────────┬─────────┘                        │
//! │             │  ChangeSignal      │                                  │
//! │             ▼                    ▼                                  │
//! │      ┌──────────────────────────────────┐                           │
//! │      │ TrainingScheduler                │  thread: owns networks    │
//! │      │  train / sync / broadcast / verify│                          │
//! │      └───────────────┬──────────────────┘                           │
//! │                      ▼                                              │
//! │      {state_dir}/weights/common-v-network-{v}.dat                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use distributed_value::{runtime, CoordinatorConfig, TcpSampleListener, ValueMlp};
//!
//! let config = CoordinatorConfig::new(64).with_train_every(8);
//! let listener = TcpSampleListener::bind(&config.listen_addr)?;
//! let optimizer = AdamConfig::new().init::<B, ValueMlp<B>>();
//! let err = runtime::serve::<B, _, _>(config, device, optimizer, listener.into_source());
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod error;
pub mod ingestion;
pub mod learner;
pub mod messages;
pub mod metrics;
pub mod model;
pub mod runtime;
pub mod transport;

pub use checkpoint::{WeightPublisher, WeightPublisherConfig};
pub use config::{ConfigError, CoordinatorConfig, OptimizerKind};
pub use core::{
    ChangeSignal, ReplayBuffer, ReplayBufferConfig, SampledEntry, State, TargetNetwork,
    Transition, VerificationStore,
};
pub use error::CoordinatorError;
pub use ingestion::{IngestOutcome, IngestionConfig, SampleIngestionService};
pub use learner::{
    SchedulerConfig, SchedulerState, SharedHandles, TrainOutcome, Trainer, TrainerConfig,
    TrainingScheduler, VerificationReport, Verifier,
};
pub use messages::{ExperienceSample, SampleMsg, SampleTag, SchedulerEvent, VerificationSample};
pub use metrics::{
    coordinator_metrics, CoordinatorMetrics, MetricsSnapshot, SharedCoordinatorMetrics,
};
pub use model::{ValueMlp, ValueMlpConfig, ValueNetwork};
pub use transport::{
    channel_source, Mailbox, Payload, SampleSource, TcpSampleListener, TransportError,
    WorkerClient, WorkerId,
};
