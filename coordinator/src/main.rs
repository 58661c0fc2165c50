#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::backend::{Autodiff, NdArray};
use burn::optim::{AdamConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use clap::{Parser, ValueEnum};

use distributed_value::{
    runtime, CoordinatorConfig, CoordinatorError, OptimizerKind, TcpSampleListener, ValueMlp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// GPU via wgpu
    Wgpu,
    /// CPU via ndarray
    Ndarray,
}

/// Train a shared value network from samples streamed by search workers.
#[derive(Parser)]
#[command(name = "coordinator", about = "Distributed value-function training coordinator")]
struct Cli {
    /// Optional TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compute backend
    #[arg(long, value_enum, default_value = "wgpu")]
    backend: BackendKind,

    /// Directory for the readiness marker and published weights
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Length of each encoded state (required unless set in the config file)
    #[arg(long)]
    encoding_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Discount factor in (0, 1)
    #[arg(long)]
    gamma: Option<f32>,

    #[arg(long)]
    hidden_size: Option<usize>,

    #[arg(long)]
    num_layers: Option<usize>,

    /// Train on short batches instead of skipping
    #[arg(long)]
    allow_partial_batches: bool,

    /// Inserts an untouched replay entry survives
    #[arg(long)]
    window_size: Option<u64>,

    /// Buffer steps between training steps
    #[arg(long)]
    train_every: Option<u64>,

    /// Buffer steps between target network syncs
    #[arg(long)]
    sync_target_every: Option<u64>,

    /// Published weight versions to keep
    #[arg(long)]
    keep_latest: Option<u64>,

    /// Buffer steps between weight broadcasts
    #[arg(long)]
    sync_workers_every: Option<u64>,

    /// adam or sgd
    #[arg(long)]
    optimizer: Option<OptimizerKind>,

    /// Training iterations between verification reports
    #[arg(long)]
    verify_every: Option<u64>,

    /// Weight file to start from
    #[arg(long)]
    start_from: Option<PathBuf>,

    /// Buffer step after which experience is dropped and target syncs stop
    #[arg(long)]
    ignore_after: Option<u64>,

    /// Address to accept worker connections on
    #[arg(long)]
    listen_addr: Option<String>,

    /// Allow running without a GPU
    #[arg(long)]
    allow_cpu: bool,
}

impl Cli {
    fn apply(self, config: &mut CoordinatorConfig) {
        if let Some(v) = self.state_dir {
            config.state_dir = v;
        }
        if let Some(v) = self.encoding_size {
            config.encoding_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.gamma {
            config.gamma = v;
        }
        if let Some(v) = self.hidden_size {
            config.hidden_size = v;
        }
        if let Some(v) = self.num_layers {
            config.num_layers = v;
        }
        if self.allow_partial_batches {
            config.allow_partial_batches = true;
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.train_every {
            config.train_every = v;
        }
        if let Some(v) = self.sync_target_every {
            config.sync_target_every = v;
        }
        if let Some(v) = self.keep_latest {
            config.keep_latest = v;
        }
        if let Some(v) = self.sync_workers_every {
            config.sync_workers_every = v;
        }
        if let Some(v) = self.optimizer {
            config.optimizer = v;
        }
        if self.verify_every.is_some() {
            config.verify_every = self.verify_every;
        }
        if self.start_from.is_some() {
            config.start_from = self.start_from;
        }
        if self.ignore_after.is_some() {
            config.ignore_after = self.ignore_after;
        }
        if let Some(v) = self.listen_addr {
            config.listen_addr = v;
        }
        if self.allow_cpu {
            config.require_accelerator = false;
        }
    }
}

fn serve<B: AutodiffBackend>(config: CoordinatorConfig, device: B::Device) -> CoordinatorError {
    let listener = match TcpSampleListener::bind(config.listen_addr.as_str()) {
        Ok(listener) => listener,
        Err(e) => return e.into(),
    };
    let source = listener.into_source();

    match config.optimizer {
        OptimizerKind::Adam => {
            let optimizer = AdamConfig::new().init::<B, ValueMlp<B>>();
            runtime::serve::<B, _, _>(config, device, optimizer, source)
        }
        OptimizerKind::Sgd => {
            let optimizer = SgdConfig::new().init::<B, ValueMlp<B>>();
            runtime::serve::<B, _, _>(config, device, optimizer, source)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => CoordinatorConfig::read_toml(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CoordinatorConfig::default(),
    };
    let backend = cli.backend;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    log::info!(
        "Starting coordinator: backend {:?}, encoding {}, optimizer {}, state dir {}",
        backend,
        config.encoding_size,
        config.optimizer,
        config.state_dir.display()
    );

    let err = match backend {
        BackendKind::Wgpu => serve::<Autodiff<Wgpu>>(config, WgpuDevice::default()),
        BackendKind::Ndarray => {
            if config.require_accelerator {
                let err = CoordinatorError::NoAccelerator(
                    "ndarray backend is CPU-only; pass --allow-cpu to run without a GPU"
                        .to_string(),
                );
                return Err(err).context("startup failed");
            }
            serve::<Autodiff<NdArray<f32>>>(config, Default::default())
        }
    };

    log::error!("Coordinator stopped: {}", err);
    bail!(err)
}
