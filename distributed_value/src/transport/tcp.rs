//! TCP transport: one connection per worker.
//!
//! The listener numbers connections in accept order and spawns one reader
//! thread per connection. Readers decode frames and push them into a bounded
//! channel, so a slow coordinator back-pressures the socket. When a
//! connection ends, its reader pushes one final `Disconnected` or `Failed`
//! item for that worker.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};

use super::frame::{read_payload, write_payload, FrameError};
use super::{Inbound, Mailbox, Payload, TransportError, WorkerId};
use crate::messages::SampleMsg;

/// Default depth of the shared inbound payload queue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Bound TCP listener feeding a [`Mailbox`].
pub struct TcpSampleListener {
    local_addr: SocketAddr,
    mailbox: Mailbox,
    acceptor: JoinHandle<()>,
}

impl TcpSampleListener {
    /// Bind and start accepting workers.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        Self::bind_with_capacity(addr, DEFAULT_INBOUND_CAPACITY)
    }

    /// Bind with an explicit inbound queue depth.
    pub fn bind_with_capacity<A: ToSocketAddrs>(
        addr: A,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = bounded(capacity);

        let acceptor = thread::Builder::new()
            .name("SampleAcceptor".to_string())
            .spawn(move || accept_loop(listener, tx))?;

        log::info!("Listening for workers on {}", local_addr);
        Ok(Self {
            local_addr,
            mailbox: Mailbox::new(rx),
            acceptor,
        })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hand over the receiving side. The acceptor keeps running detached.
    pub fn into_source(self) -> Mailbox {
        drop(self.acceptor);
        self.mailbox
    }
}

fn accept_loop(listener: TcpListener, tx: Sender<(WorkerId, Inbound)>) {
    let mut next_id: WorkerId = 0;
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to accept worker connection: {}", e);
                continue;
            }
        };
        let worker = next_id;
        next_id += 1;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        log::info!("Worker {} connected from {}", worker, peer);

        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("SampleReader-{}", worker))
            .spawn(move || read_loop(worker, stream, tx));
        if let Err(e) = spawned {
            log::error!("Failed to spawn reader for worker {}: {}", worker, e);
        }
    }
}

fn read_loop(worker: WorkerId, stream: TcpStream, tx: Sender<(WorkerId, Inbound)>) {
    let mut reader = BufReader::new(stream);
    let last = loop {
        match read_payload(&mut reader) {
            Ok(payload) => {
                if tx.send((worker, Inbound::Payload(payload))).is_err() {
                    return;
                }
            }
            Err(FrameError::Closed) => {
                log::info!("Worker {} disconnected", worker);
                break Inbound::Disconnected;
            }
            Err(e) => {
                log::error!("Read failure on worker {}: {}", worker, e);
                break Inbound::Failed(e.into());
            }
        }
    };
    // Receiver gone means the coordinator is already shutting down.
    let _ = tx.send((worker, last));
}

/// Worker-side writer for the TCP transport.
pub struct WorkerClient {
    writer: BufWriter<TcpStream>,
}

impl WorkerClient {
    /// Connect to a coordinator with Nagle disabled.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            writer: BufWriter::new(stream),
        })
    }

    /// Frame and send one payload.
    pub fn send(&mut self, payload: &Payload) -> Result<(), TransportError> {
        write_payload(&mut self.writer, payload)?;
        Ok(())
    }

    /// Send a full sample, tag first.
    pub fn send_sample(&mut self, sample: SampleMsg) -> Result<(), TransportError> {
        for payload in sample.into_payloads() {
            self.send(&payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::State;
    use crate::messages::VerificationSample;
    use crate::transport::SampleSource;
    use std::io::Write;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_workers_over_tcp_are_demultiplexed() {
        let listener = TcpSampleListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let mut source = listener.into_source();

        let mut first = WorkerClient::connect(addr).unwrap();
        first.send(&Payload::Scalar(7)).unwrap();
        // Worker 0 is known once its first payload arrives.
        assert_eq!(source.recv_any().unwrap(), (0, Payload::Scalar(7)));

        let mut second = WorkerClient::connect(addr).unwrap();
        second
            .send_sample(
                VerificationSample {
                    state: State::new(vec![1.0, 2.0]),
                    target_steps: 3,
                }
                .into(),
            )
            .unwrap();
        first.send(&Payload::Vector(vec![0.5])).unwrap();

        assert_eq!(source.recv_from(0).unwrap(), Payload::Vector(vec![0.5]));
        assert_eq!(source.recv_scalar(1).unwrap(), 1);
        assert_eq!(source.recv_vector(1).unwrap(), vec![1.0, 2.0]);
        assert_eq!(source.recv_scalar(1).unwrap(), 3);
    }

    #[test]
    fn test_disconnect_mid_sample_fails_receive() {
        let listener = TcpSampleListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let mut source = listener.into_source();

        let mut partial = WorkerClient::connect(addr).unwrap();
        partial.send(&Payload::Scalar(0)).unwrap();
        assert_eq!(source.recv_any().unwrap(), (0, Payload::Scalar(0)));
        drop(partial);

        let mut healthy = WorkerClient::connect(addr).unwrap();
        for target in 0..50 {
            healthy
                .send_sample(
                    VerificationSample {
                        state: State::new(vec![1.0]),
                        target_steps: 50 - target,
                    }
                    .into(),
                )
                .unwrap();
        }

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = source.recv_vector(0);
            let _ = done_tx.send((result, source));
        });
        let (result, mut source) = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("receive from a disconnected worker must not block");
        assert!(matches!(result, Err(TransportError::Disconnected { worker: 0 })));

        // The healthy worker's samples are intact.
        assert_eq!(source.recv_any().unwrap(), (1, Payload::Scalar(1)));
        assert_eq!(source.recv_vector(1).unwrap(), vec![1.0]);
        assert_eq!(source.recv_scalar(1).unwrap(), 50);
    }

    #[test]
    fn test_corrupt_frame_is_forwarded() {
        let listener = TcpSampleListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let mut source = listener.into_source();

        let mut raw = TcpStream::connect(addr).unwrap();
        raw.write_all(&2u32.to_le_bytes()).unwrap();
        raw.write_all(&[9, 0]).unwrap();
        raw.flush().unwrap();

        assert!(matches!(
            source.recv_any(),
            Err(TransportError::Frame(FrameError::BadKind(9)))
        ));
    }
}
