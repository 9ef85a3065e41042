//! Peer wire protocol (BEP-3)
//!
//! Message framing and handshake encoding, a per-connection
//! [`PeerChannel`] that pumps messages in both directions, and the
//! [`PeerServer`] accepting inbound peers for registered torrents.

mod channel;
mod error;
mod message;
mod server;

pub use channel::PeerChannel;
pub use error::PeerError;
pub use message::{decode_messages, Handshake, Message, MessageId, HANDSHAKE_LEN, PROTOCOL};
pub use server::{PeerCoordinator, PeerServer};
