use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::PeerError;
use super::message::{Handshake, HANDSHAKE_LEN};
use crate::metainfo::InfoHash;

/// Per-torrent peer strategy, implemented outside this crate.
///
/// The server hands ownership of the socket across
/// [`handle_incoming_connection`](PeerCoordinator::handle_incoming_connection);
/// from that point the coordinator owns the connection.
pub trait PeerCoordinator: Send + Sync {
    /// Whether the coordinator has room for another peer.
    fn can_accept_more(&self) -> bool;

    /// Takes over a socket that has completed the handshake exchange.
    fn handle_incoming_connection(&self, socket: TcpStream, remote_peer_id: [u8; 20]);
}

/// Accepts inbound peer connections for all registered torrents.
///
/// One server is shared across concurrent downloads: each incoming
/// handshake names an info hash, which routes the connection to the
/// coordinator registered for it. Connections that fail the handshake,
/// name an unknown torrent, or hit a full coordinator are closed
/// silently.
pub struct PeerServer {
    peer_id: [u8; 20],
    port: u16,
    coordinators: Mutex<HashMap<InfoHash, Arc<dyn PeerCoordinator>>>,
    shutdown: CancellationToken,
}

impl PeerServer {
    pub fn new(peer_id: [u8; 20], port: u16) -> Arc<Self> {
        Arc::new(Self {
            peer_id,
            port,
            coordinators: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Routes future connections for `info_hash` to `coordinator`.
    pub fn register(&self, info_hash: InfoHash, coordinator: Arc<dyn PeerCoordinator>) {
        self.coordinators.lock().insert(info_hash, coordinator);
    }

    /// Stops routing connections for `info_hash`.
    pub fn deregister(&self, info_hash: &InfoHash) {
        self.coordinators.lock().remove(info_hash);
    }

    fn coordinator(&self, info_hash: &InfoHash) -> Option<Arc<dyn PeerCoordinator>> {
        self.coordinators.lock().get(info_hash).cloned()
    }

    /// Terminates the accept loop. Idempotent and safe from any task.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Runs the accept loop until [`stop`](PeerServer::stop) is called.
    ///
    /// Each accepted connection is handled on its own task; handshake
    /// failures only affect that connection.
    pub async fn serve(self: Arc<Self>) -> Result<(), PeerError> {
        info!(port = self.port, "opening peer server");
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(port = self.port, "terminating peer server");
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_incoming_peer(socket, addr).await;
                    });
                }
                Err(e) => {
                    if self.shutdown.is_cancelled() {
                        return Ok(());
                    }
                    return Err(e.into());
                }
            }
        }
    }

    async fn handle_incoming_peer(&self, mut socket: TcpStream, addr: SocketAddr) {
        debug!(peer = %addr, "incoming peer connection");

        let mut handshake_data = [0u8; HANDSHAKE_LEN];
        if let Err(e) = socket.read_exact(&mut handshake_data).await {
            warn!(peer = %addr, error = %e, "failed to receive handshake");
            return;
        }

        let handshake = match Handshake::decode(&handshake_data) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(peer = %addr, error = %e, "invalid handshake");
                return;
            }
        };

        let info_hash = InfoHash(handshake.info_hash);
        let Some(coordinator) = self.coordinator(&info_hash) else {
            warn!(peer = %addr, info_hash = %info_hash, "handshake for unknown torrent");
            return;
        };

        if !coordinator.can_accept_more() {
            debug!(peer = %addr, "refusing connection, coordinator is full");
            return;
        }

        let reply = Handshake::new(handshake.info_hash, self.peer_id).encode();
        if let Err(e) = socket.write_all(&reply).await {
            warn!(peer = %addr, error = %e, "failed to send response handshake");
            return;
        }

        debug!(peer = %addr, "handshake exchanged, handing off to coordinator");
        coordinator.handle_incoming_connection(socket, handshake.peer_id);
    }
}
