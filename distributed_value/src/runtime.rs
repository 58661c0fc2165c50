//! Startup sequence and the blocking serve loop.
//!
//! ```text
//! validate config ─► create dirs ─► accelerator check ─► live net (+ start_from)
//!   ─► shared state ─► readiness marker ─► spawn ingestion ─► scheduler.run()
//! ```

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::checkpoint::WeightPublisher;
use crate::config::{CoordinatorConfig, READINESS_MARKER};
use crate::core::{replay_buffer, ChangeSignal, VerificationStore};
use crate::error::CoordinatorError;
use crate::ingestion::SampleIngestionService;
use crate::learner::{SharedHandles, Trainer, TrainingScheduler, Verifier};
use crate::metrics::coordinator_metrics;
use crate::model::ValueMlp;
use crate::transport::SampleSource;

/// Write `{state_dir}/learner_scheduled.txt` containing `1`.
pub fn write_readiness_marker(state_dir: &Path) -> Result<PathBuf, CoordinatorError> {
    fs::create_dir_all(state_dir)?;
    let path = state_dir.join(READINESS_MARKER);
    fs::write(&path, "1")?;
    Ok(path)
}

/// Run a tiny tensor op on `device` and check the result.
///
/// Backends that cannot initialise their device panic on first use; the
/// panic is caught and reported as `NoAccelerator`.
pub fn ensure_accelerator<B: Backend>(device: &B::Device) -> Result<(), CoordinatorError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        Tensor::<B, 1>::from_floats([1.0f32, 2.0], device)
            .sum()
            .into_scalar()
            .elem::<f32>()
    }));
    match outcome {
        Ok(sum) if (sum - 3.0).abs() < 1e-6 => Ok(()),
        Ok(sum) => Err(CoordinatorError::NoAccelerator(format!(
            "test computation returned {}",
            sum
        ))),
        Err(_) => Err(CoordinatorError::NoAccelerator(
            "device initialisation failed".to_string(),
        )),
    }
}

/// Start the coordinator and block until a fatal error.
///
/// `source` is the inbound transport (TCP listener or in-process channel).
/// Returns only the error that stopped it.
pub fn serve<B, O, S>(
    config: CoordinatorConfig,
    device: B::Device,
    optimizer: O,
    source: S,
) -> CoordinatorError
where
    B: AutodiffBackend,
    O: Optimizer<ValueMlp<B>, B>,
    S: SampleSource + 'static,
{
    match build::<B, O, S>(config, device, optimizer, source) {
        Ok(scheduler) => scheduler.run(),
        Err(e) => e,
    }
}

fn build<B, O, S>(
    config: CoordinatorConfig,
    device: B::Device,
    optimizer: O,
    source: S,
) -> Result<TrainingScheduler<B, ValueMlp<B>, O>, CoordinatorError>
where
    B: AutodiffBackend,
    O: Optimizer<ValueMlp<B>, B>,
    S: SampleSource + 'static,
{
    config.validate()?;
    fs::create_dir_all(&config.state_dir)?;
    let publisher = WeightPublisher::new(config.publisher_config())?;

    if config.require_accelerator {
        ensure_accelerator::<B>(&device)?;
    }

    let mut live = config.model_config().init::<B>(&device);
    if let Some(path) = &config.start_from {
        live = WeightPublisher::load::<B, _>(live, path, &device)?;
        log::info!("Loaded initial weights from {}", path.display());
    }

    let shared = SharedHandles {
        buffer: replay_buffer(config.replay_buffer_config()),
        store: Arc::new(VerificationStore::new()),
        signal: Arc::new(ChangeSignal::new()),
        metrics: coordinator_metrics(),
    };

    let trainer = Trainer::new(config.trainer_config(), optimizer, device.clone());
    let scheduler = TrainingScheduler::new(
        config.scheduler_config(),
        live,
        trainer,
        publisher,
        Verifier::new(config.gamma),
        shared.clone(),
        device,
    );

    let marker = write_readiness_marker(&config.state_dir)?;
    log::info!("Coordinator ready ({})", marker.display());

    SampleIngestionService::new(
        source,
        config.ingestion_config(),
        shared.buffer,
        shared.store,
        shared.signal,
        shared.metrics,
    )
    .spawn()?;

    Ok(scheduler)
}
