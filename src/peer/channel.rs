use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::PeerError;
use super::message::{decode_messages, Message, MAX_MESSAGE_SIZE};

/// The receive buffer holds at most two maximum-size frames.
const MAX_BUFFER_SIZE: usize = MAX_MESSAGE_SIZE * 2;
const OUTGOING_QUEUE_SLOTS: usize = 10;

/// A bidirectional message channel over one peer socket.
///
/// [`start`](PeerChannel::start) launches two tasks: a sender draining
/// the outgoing queue and a receiver feeding decoded messages to the
/// incoming sink. [`stop`](PeerChannel::stop) cancels both; each task
/// drops its half of the socket on exit, which closes the connection.
///
/// Ordering is preserved in both directions: messages go out in
/// [`send`](PeerChannel::send) order and arrive on the sink in wire
/// order.
pub struct PeerChannel {
    outgoing_tx: mpsc::Sender<Message>,
    parts: Option<(TcpStream, mpsc::Receiver<Message>)>,
    stop: CancellationToken,
}

impl PeerChannel {
    pub fn new(socket: TcpStream) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_SLOTS);
        Self {
            outgoing_tx,
            parts: Some((socket, outgoing_rx)),
            stop: CancellationToken::new(),
        }
    }

    /// Launches the sender and receiver tasks and returns immediately.
    ///
    /// Decoded messages are delivered on `incoming`; the sink is closed
    /// when the remote end goes away or a frame fails to decode. Calling
    /// `start` a second time does nothing.
    pub fn start(&mut self, incoming: mpsc::Sender<Message>) {
        let Some((socket, outgoing_rx)) = self.parts.take() else {
            return;
        };

        let addr = socket.peer_addr().ok();
        let (reader, writer) = socket.into_split();

        tokio::spawn(send_loop(writer, outgoing_rx, self.stop.clone(), addr));
        tokio::spawn(recv_loop(reader, incoming, self.stop.clone(), addr));
    }

    /// Enqueues a message for sending.
    ///
    /// Applies back-pressure by waiting when the bounded queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::ConnectionClosed`] once the sender task has
    /// exited.
    pub async fn send(&self, message: Message) -> Result<(), PeerError> {
        self.outgoing_tx
            .send(message)
            .await
            .map_err(|_| PeerError::ConnectionClosed)
    }

    /// Signals both tasks to stop. Idempotent and safe from any task.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::Receiver<Message>,
    stop: CancellationToken,
    addr: Option<SocketAddr>,
) {
    loop {
        let message = tokio::select! {
            _ = stop.cancelled() => return,
            next = outgoing.recv() => match next {
                Some(message) => message,
                None => return,
            },
        };

        let data = message.encode();
        let result = tokio::select! {
            _ = stop.cancelled() => return,
            result = writer.write_all(&data) => result,
        };

        if let Err(e) = result {
            if !stop.is_cancelled() {
                warn!(peer = ?addr, error = %e, "failed to write to peer socket");
            }
            return;
        }
    }
}

async fn recv_loop(
    mut reader: OwnedReadHalf,
    incoming: mpsc::Sender<Message>,
    stop: CancellationToken,
    addr: Option<SocketAddr>,
) {
    let mut buffer: Vec<u8> = Vec::with_capacity(MAX_BUFFER_SIZE);
    let mut chunk = vec![0u8; MAX_MESSAGE_SIZE];

    loop {
        let to_read = (MAX_BUFFER_SIZE - buffer.len()).min(chunk.len());
        if to_read == 0 {
            // A full buffer with no complete frame means the peer
            // declared a frame larger than we will ever accept.
            warn!(peer = ?addr, "receive buffer exhausted without a complete frame");
            stop.cancel();
            return;
        }

        let read = tokio::select! {
            _ = stop.cancelled() => return,
            result = reader.read(&mut chunk[..to_read]) => result,
        };

        let count = match read {
            Ok(0) => {
                debug!(peer = ?addr, "remote peer closed connection");
                return;
            }
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(peer = ?addr, "remote peer reset connection");
                return;
            }
            Err(e) => {
                if !stop.is_cancelled() {
                    warn!(peer = ?addr, error = %e, "failed to read from peer socket");
                }
                return;
            }
        };

        buffer.extend_from_slice(&chunk[..count]);

        let (messages, leftover_len) = match decode_messages(&buffer) {
            Ok((messages, leftover)) => (messages, leftover.len()),
            Err(e) => {
                warn!(
                    peer = ?addr,
                    error = %e,
                    buffered = buffer.len(),
                    "failed to decode peer messages"
                );
                stop.cancel();
                return;
            }
        };

        // Slide the residue to the front of the same buffer; capacity
        // never grows past MAX_BUFFER_SIZE.
        let consumed = buffer.len() - leftover_len;
        buffer.copy_within(consumed.., 0);
        buffer.truncate(leftover_len);

        for message in messages {
            tokio::select! {
                _ = stop.cancelled() => return,
                sent = incoming.send(message) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
