//! Inbound sample transport.
//!
//! Workers speak in rounds of ordered scalar/vector sends. The ingestion
//! service pulls them through [`SampleSource`]: `recv_any` takes the next
//! payload from whichever worker sent one, `recv_from` takes the next payload
//! from one specific worker, holding back anything else that arrives in the
//! meantime.
//!
//! Every transport also reports the end of each worker's stream. A worker
//! that leaves between samples is dropped quietly; one that leaves in the
//! middle of a sample, or whose stream is corrupt, fails the receive.
//!
//! ```text
//! TcpSampleListener ─┐
//!                    ├─► crossbeam channel<(WorkerId, Inbound)> ─► Mailbox ─► ingestion
//! ChannelSender ─────┘
//! ```

pub mod channel;
pub mod frame;
pub mod mailbox;
pub mod tcp;

use thiserror::Error;

pub use channel::{channel_source, ChannelSender, WorkerHandle};
pub use frame::FrameError;
pub use mailbox::{Mailbox, DEFAULT_BACKLOG_LIMIT};
pub use tcp::{TcpSampleListener, WorkerClient};

/// Sender identity, assigned by the transport.
pub type WorkerId = usize;

/// One unit of a worker's send sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Scalar(i64),
    Vector(Vec<f32>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Scalar(_) => "scalar",
            Payload::Vector(_) => "vector",
        }
    }
}

/// One item on the shared inbound channel.
#[derive(Debug)]
pub enum Inbound {
    /// Next payload in the worker's stream.
    Payload(Payload),
    /// The worker's stream ended cleanly.
    Disconnected,
    /// The worker's stream failed and carries no further payloads.
    Failed(TransportError),
}

impl From<Payload> for Inbound {
    fn from(payload: Payload) -> Self {
        Inbound::Payload(payload)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Every sender is gone.
    #[error("transport closed")]
    Closed,
    /// A worker left while the receiver still expected part of a sample.
    #[error("worker {worker} disconnected in the middle of a sample")]
    Disconnected { worker: WorkerId },
    /// Too many payloads from other workers were parked while waiting on one.
    #[error("backlog limit {limit} reached while waiting on worker {worker}")]
    BacklogFull { worker: WorkerId, limit: usize },
    /// A typed receive got the other payload kind.
    #[error("worker {worker} sent a {got} where a {expected} was expected")]
    UnexpectedPayload {
        worker: WorkerId,
        expected: &'static str,
        got: &'static str,
    },
    /// Malformed wire data.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking, per-sender ordered source of payloads.
pub trait SampleSource: Send {
    /// Next payload from any worker.
    fn recv_any(&mut self) -> Result<(WorkerId, Payload), TransportError>;

    /// Next payload from `worker`.
    fn recv_from(&mut self, worker: WorkerId) -> Result<Payload, TransportError>;

    fn recv_scalar(&mut self, worker: WorkerId) -> Result<i64, TransportError> {
        match self.recv_from(worker)? {
            Payload::Scalar(value) => Ok(value),
            other => Err(TransportError::UnexpectedPayload {
                worker,
                expected: "scalar",
                got: other.kind(),
            }),
        }
    }

    fn recv_vector(&mut self, worker: WorkerId) -> Result<Vec<f32>, TransportError> {
        match self.recv_from(worker)? {
            Payload::Vector(values) => Ok(values),
            other => Err(TransportError::UnexpectedPayload {
                worker,
                expected: "vector",
                got: other.kind(),
            }),
        }
    }
}
