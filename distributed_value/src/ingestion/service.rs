//! Blocking receive loop that turns worker samples into buffer entries.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::{ChangeSignal, ReplayBuffer, State, VerificationStore};
use crate::error::CoordinatorError;
use crate::messages::SampleTag;
use crate::metrics::SharedCoordinatorMetrics;
use crate::transport::{Payload, SampleSource, WorkerId};

/// Validation and cutoff settings for ingestion.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Required length of every state vector.
    pub encoding_size: usize,
    /// Stop storing experience once the buffer step counter reaches this.
    pub ignore_after: Option<u64>,
}

impl IngestionConfig {
    /// Accept states of length `encoding_size`, no cutoff.
    pub fn new(encoding_size: usize) -> Self {
        Self {
            encoding_size,
            ignore_after: None,
        }
    }

    /// Drop experience once the buffer step passes `cutoff`.
    pub fn with_ignore_after(mut self, cutoff: u64) -> Self {
        self.ignore_after = Some(cutoff);
        self
    }
}

/// What one fully read sample turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Experience stored; `step` is the new buffer step counter.
    Stored { worker: WorkerId, step: u64 },
    /// Experience read past the cutoff and dropped; the counter still moved.
    Ignored { worker: WorkerId, step: u64 },
    /// Verification target recorded.
    Verified {
        worker: WorkerId,
        target: u64,
        previous: Option<u64>,
    },
}

/// Reads samples off a [`SampleSource`] and files them into shared state.
pub struct SampleIngestionService<S> {
    source: S,
    config: IngestionConfig,
    buffer: Arc<ReplayBuffer>,
    store: Arc<VerificationStore>,
    signal: Arc<ChangeSignal>,
    metrics: SharedCoordinatorMetrics,
}

impl<S: SampleSource> SampleIngestionService<S> {
    /// Create a service reading from `source`.
    pub fn new(
        source: S,
        config: IngestionConfig,
        buffer: Arc<ReplayBuffer>,
        store: Arc<VerificationStore>,
        signal: Arc<ChangeSignal>,
        metrics: SharedCoordinatorMetrics,
    ) -> Self {
        Self {
            source,
            config,
            buffer,
            store,
            signal,
            metrics,
        }
    }

    /// Block for the next sample and process it completely.
    pub fn ingest_next(&mut self) -> Result<IngestOutcome, CoordinatorError> {
        let (worker, first) = self.source.recv_any()?;
        let tag = match first {
            Payload::Scalar(tag) => tag,
            Payload::Vector(_) => {
                return Err(CoordinatorError::Protocol(format!(
                    "worker {} sent a vector where a sample tag was expected",
                    worker
                )))
            }
        };

        let outcome = match SampleTag::try_from(tag) {
            Ok(SampleTag::Experience) => self.ingest_experience(worker)?,
            Ok(SampleTag::Verification) => self.ingest_verification(worker)?,
            Err(other) => {
                return Err(CoordinatorError::Protocol(format!(
                    "worker {} sent unknown sample tag {}",
                    worker, other
                )))
            }
        };

        self.signal.raise();
        Ok(outcome)
    }

    fn ingest_experience(&mut self, worker: WorkerId) -> Result<IngestOutcome, CoordinatorError> {
        let prestate = self.recv_state(worker)?;
        let action = self.source.recv_scalar(worker)?;
        let count = self.recv_count(worker, "poststate count")?;
        let mut poststates = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            poststates.push(self.recv_state(worker)?);
        }

        if let Some(cutoff) = self.config.ignore_after {
            if self.buffer.steps() >= cutoff {
                let step = self.buffer.advance_step();
                self.metrics.record_ignored();
                log::warn!(
                    "Ignoring experience from worker {} past cutoff {} (step {})",
                    worker,
                    cutoff,
                    step
                );
                return Ok(IngestOutcome::Ignored { worker, step });
            }
        }

        let step = self.buffer.add_transition(prestate, action, poststates);
        self.metrics.record_experience();
        log::debug!("Stored experience from worker {} (step {})", worker, step);
        Ok(IngestOutcome::Stored { worker, step })
    }

    fn ingest_verification(&mut self, worker: WorkerId) -> Result<IngestOutcome, CoordinatorError> {
        let state = self.recv_state(worker)?;
        let target = self.recv_count(worker, "verification target")?;
        let previous = self.store.record(state, target)?;
        self.metrics.record_verification_sample();
        log::debug!(
            "Recorded verification target {} from worker {}",
            target,
            worker
        );
        Ok(IngestOutcome::Verified {
            worker,
            target,
            previous,
        })
    }

    fn recv_state(&mut self, worker: WorkerId) -> Result<State, CoordinatorError> {
        let values = self.source.recv_vector(worker)?;
        if values.len() != self.config.encoding_size {
            return Err(CoordinatorError::Protocol(format!(
                "worker {} sent a state of length {}, expected {}",
                worker,
                values.len(),
                self.config.encoding_size
            )));
        }
        Ok(State::new(values))
    }

    fn recv_count(&mut self, worker: WorkerId, what: &str) -> Result<u64, CoordinatorError> {
        let value = self.source.recv_scalar(worker)?;
        u64::try_from(value).map_err(|_| {
            CoordinatorError::Protocol(format!("worker {} sent negative {} {}", worker, what, value))
        })
    }

    /// Ingest until the first fatal error, which is returned.
    pub fn run(mut self) -> CoordinatorError {
        loop {
            if let Err(e) = self.ingest_next() {
                return e;
            }
        }
    }
}

impl<S: SampleSource + 'static> SampleIngestionService<S> {
    /// Run on a dedicated thread. A fatal error is logged and forwarded to
    /// the change signal.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("SampleIngestion".to_string())
            .spawn(move || {
                let signal = Arc::clone(&self.signal);
                let err = self.run();
                log::error!("Sample ingestion stopped: {}", err);
                signal.fail(err);
            })
    }
}
