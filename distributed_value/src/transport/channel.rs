//! In-process transport over a crossbeam channel.

use crossbeam_channel::{bounded, Sender};

use super::{Inbound, Mailbox, Payload, TransportError, WorkerId};
use crate::messages::SampleMsg;

/// Create a bounded in-process source and its sending side.
pub fn channel_source(capacity: usize) -> (ChannelSender, Mailbox) {
    let (tx, rx) = bounded(capacity);
    (ChannelSender { tx }, Mailbox::new(rx))
}

/// Cloneable sending side; hand out one [`WorkerHandle`] per worker.
#[derive(Clone)]
pub struct ChannelSender {
    tx: Sender<(WorkerId, Inbound)>,
}

impl ChannelSender {
    /// Handle that tags everything it sends with `id`.
    pub fn worker(&self, id: WorkerId) -> WorkerHandle {
        WorkerHandle {
            id,
            tx: self.tx.clone(),
        }
    }
}

/// Sends payloads tagged with a fixed worker id.
#[derive(Clone)]
pub struct WorkerHandle {
    id: WorkerId,
    tx: Sender<(WorkerId, Inbound)>,
}

impl WorkerHandle {
    /// Worker id stamped on everything this handle sends.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    fn push(&self, item: Inbound) -> Result<(), TransportError> {
        self.tx
            .send((self.id, item))
            .map_err(|_| TransportError::Closed)
    }

    /// Send one payload.
    pub fn send(&self, payload: Payload) -> Result<(), TransportError> {
        self.push(Inbound::Payload(payload))
    }

    /// Mark this worker's stream as ended, like a closed TCP connection.
    pub fn disconnect(self) -> Result<(), TransportError> {
        self.push(Inbound::Disconnected)
    }

    /// Send a scalar payload.
    pub fn send_scalar(&self, value: i64) -> Result<(), TransportError> {
        self.send(Payload::Scalar(value))
    }

    /// Send a vector payload.
    pub fn send_vector(&self, values: Vec<f32>) -> Result<(), TransportError> {
        self.send(Payload::Vector(values))
    }

    /// Send a full sample, tag first.
    pub fn send_sample(&self, sample: SampleMsg) -> Result<(), TransportError> {
        for payload in sample.into_payloads() {
            self.send(payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SampleSource;

    #[test]
    fn test_handle_tags_payloads_with_worker_id() {
        let (sender, mut source) = channel_source(8);
        sender.worker(4).send_scalar(1).unwrap();
        assert_eq!(source.recv_any().unwrap(), (4, Payload::Scalar(1)));
    }

    #[test]
    fn test_disconnect_reaches_source() {
        let (sender, mut source) = channel_source(8);
        let worker = sender.worker(2);
        worker.send_scalar(0).unwrap();
        worker.disconnect().unwrap();

        assert_eq!(source.recv_any().unwrap(), (2, Payload::Scalar(0)));
        assert!(matches!(
            source.recv_from(2),
            Err(TransportError::Disconnected { worker: 2 })
        ));
    }

    #[test]
    fn test_send_after_source_dropped_is_closed() {
        let (sender, source) = channel_source(1);
        drop(source);
        assert!(matches!(
            sender.worker(0).send_scalar(0),
            Err(TransportError::Closed)
        ));
    }
}
