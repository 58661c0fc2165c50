//! Demultiplexing receiver over the shared inbound channel.

use std::collections::VecDeque;

use crossbeam_channel::Receiver;

use super::{Inbound, Payload, SampleSource, TransportError, WorkerId};

/// Default number of payloads that may be parked while waiting on one worker.
pub const DEFAULT_BACKLOG_LIMIT: usize = 65_536;

/// Receiver that can wait for one worker while others keep sending.
///
/// Items from other workers that arrive during `recv_from` are parked in a
/// backlog and handed out, in arrival order, before anything new. The
/// backlog is bounded; hitting the limit fails the receive.
pub struct Mailbox {
    rx: Receiver<(WorkerId, Inbound)>,
    backlog: VecDeque<(WorkerId, Inbound)>,
    backlog_limit: usize,
}

impl Mailbox {
    /// Wrap the receiving side with the default backlog limit.
    pub fn new(rx: Receiver<(WorkerId, Inbound)>) -> Self {
        Self::with_backlog_limit(rx, DEFAULT_BACKLOG_LIMIT)
    }

    /// Wrap the receiving side with an explicit backlog limit.
    pub fn with_backlog_limit(rx: Receiver<(WorkerId, Inbound)>, backlog_limit: usize) -> Self {
        Self {
            rx,
            backlog: VecDeque::new(),
            backlog_limit,
        }
    }

    /// Items parked for later.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn recv_channel(&self) -> Result<(WorkerId, Inbound), TransportError> {
        self.rx.recv().map_err(|_| TransportError::Closed)
    }

    fn take_parked(&mut self, worker: WorkerId) -> Option<Inbound> {
        let pos = self.backlog.iter().position(|(w, _)| *w == worker)?;
        self.backlog.remove(pos).map(|(_, item)| item)
    }

    fn park(
        &mut self,
        waiting_on: WorkerId,
        from: WorkerId,
        item: Inbound,
    ) -> Result<(), TransportError> {
        if self.backlog.len() >= self.backlog_limit {
            return Err(TransportError::BacklogFull {
                worker: waiting_on,
                limit: self.backlog_limit,
            });
        }
        self.backlog.push_back((from, item));
        Ok(())
    }
}

impl SampleSource for Mailbox {
    /// Next payload from any worker.
    ///
    /// Called at sample boundaries, so a clean disconnect here is skipped.
    fn recv_any(&mut self) -> Result<(WorkerId, Payload), TransportError> {
        loop {
            let (worker, item) = match self.backlog.pop_front() {
                Some(parked) => parked,
                None => self.recv_channel()?,
            };
            match item {
                Inbound::Payload(payload) => return Ok((worker, payload)),
                Inbound::Disconnected => log::debug!("Worker {} left between samples", worker),
                Inbound::Failed(e) => return Err(e),
            }
        }
    }

    /// Next payload from `worker`, which is in the middle of a sample.
    fn recv_from(&mut self, worker: WorkerId) -> Result<Payload, TransportError> {
        let item = match self.take_parked(worker) {
            Some(item) => item,
            None => loop {
                let (from, item) = self.recv_channel()?;
                if from == worker {
                    break item;
                }
                self.park(worker, from, item)?;
            },
        };
        match item {
            Inbound::Payload(payload) => Ok(payload),
            Inbound::Disconnected => Err(TransportError::Disconnected { worker }),
            Inbound::Failed(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameError;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_interleaved_workers_stay_ordered() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);

        tx.send((0, Payload::Scalar(0).into())).unwrap();
        tx.send((1, Payload::Scalar(10).into())).unwrap();
        tx.send((1, Payload::Scalar(11).into())).unwrap();
        tx.send((0, Payload::Scalar(1).into())).unwrap();

        assert_eq!(mailbox.recv_any().unwrap(), (0, Payload::Scalar(0)));
        assert_eq!(mailbox.recv_from(0).unwrap(), Payload::Scalar(1));
        assert_eq!(mailbox.backlog_len(), 2);

        assert_eq!(mailbox.recv_any().unwrap(), (1, Payload::Scalar(10)));
        assert_eq!(mailbox.recv_from(1).unwrap(), Payload::Scalar(11));
        assert_eq!(mailbox.backlog_len(), 0);
    }

    #[test]
    fn test_disconnected_channel_is_closed() {
        let (tx, rx) = unbounded::<(WorkerId, Inbound)>();
        drop(tx);
        let mut mailbox = Mailbox::new(rx);
        assert!(matches!(mailbox.recv_any(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_typed_receive_rejects_wrong_kind() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send((3, Payload::Vector(vec![1.0]).into())).unwrap();

        let err = mailbox.recv_scalar(3).unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnexpectedPayload { worker: 3, expected: "scalar", got: "vector" }
        ));
    }

    #[test]
    fn test_disconnect_between_samples_is_skipped() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send((0, Inbound::Disconnected)).unwrap();
        tx.send((1, Payload::Scalar(5).into())).unwrap();

        assert_eq!(mailbox.recv_any().unwrap(), (1, Payload::Scalar(5)));
    }

    #[test]
    fn test_disconnect_mid_sample_fails_waiting_receive() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send((0, Payload::Scalar(0).into())).unwrap();
        tx.send((1, Payload::Scalar(1).into())).unwrap();
        tx.send((0, Inbound::Disconnected)).unwrap();

        assert_eq!(mailbox.recv_any().unwrap(), (0, Payload::Scalar(0)));
        assert!(matches!(
            mailbox.recv_from(0),
            Err(TransportError::Disconnected { worker: 0 })
        ));
        // The healthy worker's payload is still there.
        assert_eq!(mailbox.recv_any().unwrap(), (1, Payload::Scalar(1)));
    }

    #[test]
    fn test_parked_disconnect_is_found_by_later_receive() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send((1, Inbound::Disconnected)).unwrap();
        tx.send((0, Payload::Scalar(7).into())).unwrap();

        assert_eq!(mailbox.recv_from(0).unwrap(), Payload::Scalar(7));
        assert!(matches!(
            mailbox.recv_from(1),
            Err(TransportError::Disconnected { worker: 1 })
        ));
    }

    #[test]
    fn test_stream_failure_is_forwarded() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::new(rx);
        tx.send((2, Inbound::Failed(FrameError::BadKind(9).into()))).unwrap();

        assert!(matches!(
            mailbox.recv_any(),
            Err(TransportError::Frame(FrameError::BadKind(9)))
        ));
    }

    #[test]
    fn test_backlog_limit_fails_receive() {
        let (tx, rx) = unbounded();
        let mut mailbox = Mailbox::with_backlog_limit(rx, 2);
        for i in 0..3 {
            tx.send((1, Payload::Scalar(i).into())).unwrap();
        }

        assert!(matches!(
            mailbox.recv_from(0),
            Err(TransportError::BacklogFull { worker: 0, limit: 2 })
        ));
        assert_eq!(mailbox.backlog_len(), 2);
    }
}
