use thiserror::Error;

/// Errors raised while talking to peers.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a malformed handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// A frame violated the declared message layout.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame carried an id outside the protocol.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// The channel is no longer accepting messages.
    #[error("connection closed")]
    ConnectionClosed,
}
