//! Versioned weight files for workers to pick up.
//!
//! Each publish writes `common-v-network-{version}.dat` through a `.tmp`
//! sibling and an atomic rename, so readers never observe a partial file.
//! Retention then keeps only the newest `keep_latest` versions.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;

use crate::error::CoordinatorError;

/// File name prefix of published weights.
pub const WEIGHTS_PREFIX: &str = "common-v-network-";
pub const WEIGHTS_SUFFIX: &str = ".dat";

/// Configuration for the weight publisher.
#[derive(Debug, Clone)]
pub struct WeightPublisherConfig {
    /// Directory holding the weight files.
    pub weights_dir: PathBuf,
    /// Number of newest versions to keep.
    pub keep_latest: u64,
}

impl WeightPublisherConfig {
    /// Publish into `weights_dir`, keeping every version.
    pub fn new(weights_dir: impl Into<PathBuf>) -> Self {
        Self {
            weights_dir: weights_dir.into(),
            keep_latest: 3,
        }
    }

    /// Keep only the newest `keep_latest` versions.
    pub fn with_keep_latest(mut self, keep_latest: u64) -> Self {
        self.keep_latest = keep_latest;
        self
    }
}

/// Writes and prunes versioned weight files.
pub struct WeightPublisher {
    config: WeightPublisherConfig,
}

impl WeightPublisher {
    /// Creates the weights directory if it doesn't exist.
    pub fn new(config: WeightPublisherConfig) -> Result<Self, CoordinatorError> {
        fs::create_dir_all(&config.weights_dir)?;
        Ok(Self { config })
    }

    /// Get the publisher configuration.
    pub fn config(&self) -> &WeightPublisherConfig {
        &self.config
    }

    /// File path for `version`.
    pub fn path_for(&self, version: u64) -> PathBuf {
        self.config
            .weights_dir
            .join(format!("{}{}{}", WEIGHTS_PREFIX, version, WEIGHTS_SUFFIX))
    }

    /// Serialize `model` and publish it as `version`.
    pub fn publish<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        version: u64,
    ) -> Result<PathBuf, CoordinatorError> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let bytes = Recorder::<B>::record(&recorder, model.clone().into_record(), ())
            .map_err(|e| CoordinatorError::Recorder(e.to_string()))?;
        self.publish_bytes(&bytes, version)
    }

    /// Atomically write `bytes` as `version`, then apply retention.
    pub fn publish_bytes(&self, bytes: &[u8], version: u64) -> Result<PathBuf, CoordinatorError> {
        let path = self.path_for(version);
        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        let deleted = self.prune()?;
        log::info!(
            "Published weights version {} to {} ({} old versions removed)",
            version,
            path.display(),
            deleted.len()
        );
        Ok(path)
    }

    /// Published versions, ascending.
    pub fn list_versions(&self) -> Result<Vec<u64>, CoordinatorError> {
        let mut versions: Vec<u64> = fs::read_dir(&self.config.weights_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| parse_version(e.file_name().to_str()?))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Newest published version.
    pub fn latest(&self) -> Result<u64, CoordinatorError> {
        self.list_versions()?
            .last()
            .copied()
            .ok_or(CoordinatorError::NoCheckpoints)
    }

    /// Delete every version `v <= latest - keep_latest`. Returns what was deleted.
    pub fn prune(&self) -> Result<Vec<u64>, CoordinatorError> {
        let versions = self.list_versions()?;
        let latest = versions.last().copied().ok_or(CoordinatorError::NoCheckpoints)?;
        let cutoff = match latest.checked_sub(self.config.keep_latest) {
            Some(cutoff) => cutoff,
            None => return Ok(Vec::new()),
        };

        let mut deleted = Vec::new();
        for version in versions.into_iter().filter(|v| *v <= cutoff) {
            fs::remove_file(self.path_for(version))?;
            deleted.push(version);
        }
        Ok(deleted)
    }

    /// Load published weights into `model`.
    pub fn load<B: Backend, M: Module<B>>(
        model: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CoordinatorError> {
        let bytes = fs::read(path)?;
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = Recorder::<B>::load(&recorder, bytes, device)
            .map_err(|e| CoordinatorError::Recorder(e.to_string()))?;
        Ok(model.load_record(record))
    }
}

/// Version number encoded in a weight file name.
pub fn parse_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(WEIGHTS_PREFIX)?
        .strip_suffix(WEIGHTS_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ValueMlpConfig, ValueNetwork};
    use burn::backend::NdArray;
    use burn::prelude::*;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    fn publisher(dir: &Path, keep: u64) -> WeightPublisher {
        WeightPublisher::new(WeightPublisherConfig::new(dir).with_keep_latest(keep)).unwrap()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("common-v-network-12.dat"), Some(12));
        assert_eq!(parse_version("common-v-network-12.dat.tmp"), None);
        assert_eq!(parse_version("common-v-network-x.dat"), None);
        assert_eq!(parse_version("other-3.dat"), None);
    }

    #[test]
    fn test_retention_keeps_latest_three() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), 3);
        for version in 1..=10 {
            publisher.publish_bytes(b"w", version).unwrap();
        }
        assert_eq!(publisher.list_versions().unwrap(), vec![8, 9, 10]);
        assert_eq!(publisher.latest().unwrap(), 10);
    }

    #[test]
    fn test_nothing_pruned_below_keep() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), 3);
        publisher.publish_bytes(b"w", 0).unwrap();
        publisher.publish_bytes(b"w", 1).unwrap();
        publisher.publish_bytes(b"w", 2).unwrap();
        assert_eq!(publisher.list_versions().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_prune_uses_newest_version_not_newest_write() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), 2);
        publisher.publish_bytes(b"w", 9).unwrap();
        publisher.publish_bytes(b"w", 3).unwrap();
        assert_eq!(publisher.list_versions().unwrap(), vec![9]);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), 3);
        publisher.publish_bytes(b"w", 0).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["common-v-network-0.dat".to_string()]);
    }

    #[test]
    fn test_empty_directory_has_no_checkpoints() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), 3);
        assert!(matches!(publisher.latest(), Err(CoordinatorError::NoCheckpoints)));
        assert!(matches!(publisher.prune(), Err(CoordinatorError::NoCheckpoints)));
    }

    #[test]
    fn test_publish_then_load_restores_predictions() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let publisher = publisher(dir.path(), 3);
        let config = ValueMlpConfig::new(3).with_hidden_size(8);
        let model = config.init::<B>(&device);

        let path = publisher.publish::<B, _>(&model, 0).unwrap();
        let loaded =
            WeightPublisher::load::<B, _>(config.init::<B>(&device), &path, &device).unwrap();

        let input = Tensor::<B, 2>::from_floats([[0.1, 0.2, 0.3]], &device);
        let a: Vec<f32> = model.predict(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.predict(input).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
