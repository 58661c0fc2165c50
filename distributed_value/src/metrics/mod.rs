//! Coordinator metrics.
//!
//! - [`CoordinatorMetrics`]: lock-free counters for ingestion and scheduling
//! - [`SharedCoordinatorMetrics`]: Arc wrapper for multi-threaded access

pub mod coordinator_metrics;

pub use coordinator_metrics::{
    coordinator_metrics, CoordinatorMetrics, MetricsSnapshot, SharedCoordinatorMetrics,
};
