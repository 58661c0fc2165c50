//! Weight publishing for workers.
//!
//! ## Example
//!
//! ```rust,ignore
//! use distributed_value::checkpoint::{WeightPublisher, WeightPublisherConfig};
//!
//! let publisher = WeightPublisher::new(
//!     WeightPublisherConfig::new("drl_state/weights").with_keep_latest(3),
//! )?;
//!
//! // Every broadcast interval:
//! publisher.publish(&live_model, version)?;
//!
//! // Worker side, or when resuming:
//! let model = WeightPublisher::load(template, &publisher.path_for(v), &device)?;
//! ```

pub mod publisher;

pub use publisher::{
    parse_version, WeightPublisher, WeightPublisherConfig, WEIGHTS_PREFIX, WEIGHTS_SUFFIX,
};
