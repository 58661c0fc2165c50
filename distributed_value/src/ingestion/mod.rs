//! Sample ingestion.
//!
//! One dedicated thread reads worker samples in full, validates them, and
//! files experience into the replay buffer and verification targets into the
//! verification store. Every processed sample raises the change signal.

mod service;


pub use service::{IngestOutcome, IngestionConfig, SampleIngestionService};
