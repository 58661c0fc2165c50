//! Error type shared by the coordinator's long-running loops.
//!
//! The coordinator is fail-fast: every variant here is fatal for the loop
//! that produced it. The one recoverable condition (not enough replay data
//! for a batch) is modelled as `Ok(None)` by the trainer, never as an error.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Fatal coordinator error.
#[derive(Debug)]
pub enum CoordinatorError {
    /// A verification target increased for a state that already had one.
    VerificationRegression {
        /// Value currently stored for the state.
        stored: u64,
        /// Larger value that was received.
        incoming: u64,
    },
    /// Retention needed the latest checkpoint but none were found.
    NoCheckpoints,
    /// The compute device required at startup is not usable.
    NoAccelerator(String),
    /// A sampled start state carried no transitions.
    EmptyTransitions,
    /// Inbound message did not follow the sample protocol.
    Protocol(String),
    /// Internal bookkeeping mismatch (e.g. prediction count vs. batch layout).
    Internal(String),
    /// Transport failure while receiving samples.
    Transport(TransportError),
    /// Invalid configuration.
    Config(ConfigError),
    /// Filesystem error.
    Io(io::Error),
    /// Burn recorder failure while (de)serializing parameters.
    Recorder(String),
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::VerificationRegression { stored, incoming } => write!(
                f,
                "verification target increased from {} to {}; targets may only decrease",
                stored, incoming
            ),
            CoordinatorError::NoCheckpoints => write!(f, "no published checkpoints found"),
            CoordinatorError::NoAccelerator(reason) => {
                write!(f, "required compute accelerator unavailable: {}", reason)
            }
            CoordinatorError::EmptyTransitions => {
                write!(f, "sampled start state has no transitions")
            }
            CoordinatorError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            CoordinatorError::Internal(msg) => write!(f, "internal error: {}", msg),
            CoordinatorError::Transport(e) => write!(f, "transport error: {}", e),
            CoordinatorError::Config(e) => write!(f, "config error: {}", e),
            CoordinatorError::Io(e) => write!(f, "IO error: {}", e),
            CoordinatorError::Recorder(e) => write!(f, "Recorder error: {}", e),
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoordinatorError::Transport(e) => Some(e),
            CoordinatorError::Config(e) => Some(e),
            CoordinatorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CoordinatorError {
    fn from(e: io::Error) -> Self {
        CoordinatorError::Io(e)
    }
}

impl From<TransportError> for CoordinatorError {
    fn from(e: TransportError) -> Self {
        CoordinatorError::Transport(e)
    }
}

impl From<ConfigError> for CoordinatorError {
    fn from(e: ConfigError) -> Self {
        CoordinatorError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_regression_message_names_both_values() {
        let err = CoordinatorError::VerificationRegression { stored: 5, incoming: 10 };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_io_source_is_preserved() {
        let err: CoordinatorError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.source().is_some());
        assert!(matches!(err, CoordinatorError::Io(_)));
    }

    #[test]
    fn test_transport_conversion() {
        let err: CoordinatorError = TransportError::Closed.into();
        assert!(matches!(err, CoordinatorError::Transport(TransportError::Closed)));
    }
}
