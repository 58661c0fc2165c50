//! Coordinator configuration.
//!
//! One flat struct covers every knob. It can be built in code with the
//! `with_*` methods, read from a TOML file (missing keys take defaults), and
//! is checked by [`CoordinatorConfig::validate`] before anything starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checkpoint::WeightPublisherConfig;
use crate::core::ReplayBufferConfig;
use crate::ingestion::IngestionConfig;
use crate::learner::{SchedulerConfig, TrainerConfig};
use crate::model::ValueMlpConfig;

/// Name of the readiness marker inside the state directory.
pub const READINESS_MARKER: &str = "learner_scheduled.txt";
/// Subdirectory for published weights.
pub const WEIGHTS_DIR: &str = "weights";

/// Error type for configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A count parameter must be positive.
    InvalidCount { field: &'static str, value: u64 },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// A required parameter was not set.
    Missing { field: &'static str },
    /// The config file could not be read.
    FileRead { path: PathBuf, message: String },
    /// The config file is not valid TOML for this struct.
    Parse(String),
    /// Unknown optimizer name.
    UnknownOptimizer(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in ({}, {}), got {}", field, min, max, value)
            }
            ConfigError::Missing { field } => write!(f, "{} is required", field),
            ConfigError::FileRead { path, message } => {
                write!(f, "failed to read config file '{}': {}", path.display(), message)
            }
            ConfigError::Parse(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::UnknownOptimizer(name) => {
                write!(f, "unknown optimizer '{}', expected 'adam' or 'sgd'", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

/// Optimizer used for the live network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "sgd" => Ok(OptimizerKind::Sgd),
            _ => Err(ConfigError::UnknownOptimizer(s.to_string())),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

/// Full coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Root for the readiness marker and published weights.
    pub state_dir: PathBuf,
    /// Length of every encoded state. Required.
    pub encoding_size: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// States per training batch.
    pub batch_size: usize,
    /// Discount factor, in (0, 1).
    pub gamma: f32,
    /// Width of each hidden layer.
    pub hidden_size: usize,
    /// Number of hidden layers.
    pub num_layers: usize,
    /// Train on a short batch instead of skipping.
    pub allow_partial_batches: bool,
    /// Inserts an untouched entry survives in the replay buffer.
    pub window_size: u64,
    /// Buffer steps between training steps.
    pub train_every: u64,
    /// Buffer steps between target network syncs.
    pub sync_target_every: u64,
    /// Published weight versions to keep on disk.
    pub keep_latest: u64,
    /// Buffer steps between weight broadcasts.
    pub sync_workers_every: u64,
    pub optimizer: OptimizerKind,
    /// Training iterations between verification reports.
    pub verify_every: Option<u64>,
    /// Weight file to initialise the live network from.
    pub start_from: Option<PathBuf>,
    /// Buffer step after which experience is dropped and target syncs stop.
    pub ignore_after: Option<u64>,
    /// Address the TCP transport binds to.
    pub listen_addr: String,
    /// Refuse to start on a CPU-only backend.
    pub require_accelerator: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("drl_state"),
            encoding_size: 0,
            learning_rate: 5e-6,
            batch_size: 64,
            gamma: 0.9,
            hidden_size: 128,
            num_layers: 3,
            allow_partial_batches: false,
            window_size: 2560,
            train_every: 8,
            sync_target_every: 32,
            keep_latest: 3,
            sync_workers_every: 16,
            optimizer: OptimizerKind::Adam,
            verify_every: None,
            start_from: None,
            ignore_after: None,
            listen_addr: "0.0.0.0:29500".to_string(),
            require_accelerator: true,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults with the required encoding size set.
    pub fn new(encoding_size: usize) -> Self {
        Self {
            encoding_size,
            ..Default::default()
        }
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without validating, for callers that layer
    /// overrides on top before calling [`validate`](Self::validate).
    pub fn read_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Set state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Set learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set hidden layer width.
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set number of hidden layers.
    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    /// Set whether short batches are trained on.
    pub fn with_allow_partial_batches(mut self, allow: bool) -> Self {
        self.allow_partial_batches = allow;
        self
    }

    /// Set replay window size.
    pub fn with_window_size(mut self, window: u64) -> Self {
        self.window_size = window;
        self
    }

    /// Set training interval.
    pub fn with_train_every(mut self, steps: u64) -> Self {
        self.train_every = steps;
        self
    }

    /// Set target sync interval.
    pub fn with_sync_target_every(mut self, steps: u64) -> Self {
        self.sync_target_every = steps;
        self
    }

    /// Set number of weight versions kept.
    pub fn with_keep_latest(mut self, keep: u64) -> Self {
        self.keep_latest = keep;
        self
    }

    /// Set broadcast interval.
    pub fn with_sync_workers_every(mut self, steps: u64) -> Self {
        self.sync_workers_every = steps;
        self
    }

    /// Set optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Enable verification every `iterations` training iterations.
    pub fn with_verify_every(mut self, iterations: u64) -> Self {
        self.verify_every = Some(iterations);
        self
    }

    /// Set initial weight file.
    pub fn with_start_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.start_from = Some(path.into());
        self
    }

    /// Set experience cutoff step.
    pub fn with_ignore_after(mut self, steps: u64) -> Self {
        self.ignore_after = Some(steps);
        self
    }

    /// Set worker listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set whether a GPU backend is required.
    pub fn with_require_accelerator(mut self, require: bool) -> Self {
        self.require_accelerator = require;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.encoding_size == 0 {
            return Err(ConfigError::Missing {
                field: "encoding_size",
            });
        }
        let counts: [(&'static str, u64); 8] = [
            ("batch_size", self.batch_size as u64),
            ("hidden_size", self.hidden_size as u64),
            ("num_layers", self.num_layers as u64),
            ("window_size", self.window_size),
            ("train_every", self.train_every),
            ("sync_target_every", self.sync_target_every),
            ("keep_latest", self.keep_latest),
            ("sync_workers_every", self.sync_workers_every),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if self.verify_every == Some(0) {
            return Err(ConfigError::InvalidCount {
                field: "verify_every",
                value: 0,
            });
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "gamma",
                value: self.gamma as f64,
                min: 0.0,
                max: 1.0,
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::OutOfRange {
                field: "learning_rate",
                value: self.learning_rate,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(())
    }

    /// Directory published weights are written to.
    pub fn weights_dir(&self) -> PathBuf {
        self.state_dir.join(WEIGHTS_DIR)
    }

    /// Path of the readiness marker file.
    pub fn readiness_marker_path(&self) -> PathBuf {
        self.state_dir.join(READINESS_MARKER)
    }

    /// Network shape for this configuration.
    pub fn model_config(&self) -> ValueMlpConfig {
        ValueMlpConfig::new(self.encoding_size)
            .with_hidden_size(self.hidden_size)
            .with_num_layers(self.num_layers)
    }

    /// Replay buffer settings.
    pub fn replay_buffer_config(&self) -> ReplayBufferConfig {
        ReplayBufferConfig::new(self.window_size)
            .with_allow_partial_batches(self.allow_partial_batches)
    }

    /// Trainer settings.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig::new()
            .with_batch_size(self.batch_size)
            .with_discount_factor(self.gamma)
            .with_learning_rate(self.learning_rate)
    }

    /// Scheduler policy intervals.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::new()
            .with_train_interval(self.train_every)
            .with_sync_interval(self.sync_target_every)
            .with_broadcast_interval(self.sync_workers_every);
        config.verify_interval = self.verify_every;
        config.ignore_after = self.ignore_after;
        config
    }

    /// Ingestion settings.
    pub fn ingestion_config(&self) -> IngestionConfig {
        let mut config = IngestionConfig::new(self.encoding_size);
        config.ignore_after = self.ignore_after;
        config
    }

    /// Weight publisher settings.
    pub fn publisher_config(&self) -> WeightPublisherConfig {
        WeightPublisherConfig::new(self.weights_dir()).with_keep_latest(self.keep_latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_encoding_size() {
        assert_eq!(
            CoordinatorConfig::default().validate(),
            Err(ConfigError::Missing {
                field: "encoding_size"
            })
        );
        assert!(CoordinatorConfig::new(16).validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = CoordinatorConfig::new(4).with_train_every(0).validate();
        assert_eq!(
            err,
            Err(ConfigError::InvalidCount {
                field: "train_every",
                value: 0
            })
        );
    }

    #[test]
    fn test_gamma_must_be_open_unit_interval() {
        for gamma in [0.0, 1.0, 1.5, -0.1] {
            let err = CoordinatorConfig::new(4).with_gamma(gamma).validate();
            assert!(matches!(err, Err(ConfigError::OutOfRange { field: "gamma", .. })));
        }
    }

    #[test]
    fn test_verify_every_zero_rejected() {
        assert!(CoordinatorConfig::new(4).with_verify_every(0).validate().is_err());
        assert!(CoordinatorConfig::new(4).with_verify_every(5).validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str(
            r#"
encoding_size = 32
train_every = 4
optimizer = "sgd"
ignore_after = 1000
"#,
        )
        .unwrap();
        assert_eq!(config.encoding_size, 32);
        assert_eq!(config.train_every, 4);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.ignore_after, Some(1000));
        assert_eq!(config.window_size, 2560);
        assert_eq!(config.state_dir, PathBuf::from("drl_state"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CoordinatorConfig::load(Path::new("/nonexistent/coordinator.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_load_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "encoding_size = 0\n").unwrap();
        assert!(matches!(
            CoordinatorConfig::load(&path),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn test_optimizer_from_str() {
        assert_eq!("Adam".parse::<OptimizerKind>(), Ok(OptimizerKind::Adam));
        assert_eq!("sgd".parse::<OptimizerKind>(), Ok(OptimizerKind::Sgd));
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_derived_paths_and_sub_configs() {
        let config = CoordinatorConfig::new(8)
            .with_state_dir("/tmp/run")
            .with_sync_workers_every(4)
            .with_ignore_after(50);

        assert_eq!(config.weights_dir(), PathBuf::from("/tmp/run/weights"));
        assert_eq!(
            config.readiness_marker_path(),
            PathBuf::from("/tmp/run/learner_scheduled.txt")
        );
        assert_eq!(config.scheduler_config().broadcast_interval, 4);
        assert_eq!(config.scheduler_config().ignore_after, Some(50));
        assert_eq!(config.ingestion_config().ignore_after, Some(50));
        assert_eq!(config.model_config().encoding_size, 8);
    }
}
