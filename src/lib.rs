//! driftnet - BitTorrent client core
//!
//! This library implements the core subsystems of a BitTorrent client:
//! parsing `.torrent` metainfo, announcing to HTTP and UDP trackers,
//! speaking the peer wire protocol over TCP, and persisting pieces to disk.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`metainfo`] - `.torrent` metafile parsing and info hashes
//! - [`download`] - shared download identity and stats contracts
//! - [`peer`] - peer wire protocol, per-peer channels, the peer server
//! - [`tracker`] - HTTP and UDP tracker announcing
//! - [`cache`] - bounded in-memory piece cache
//! - [`storage`] - on-disk piece store and file composition
//!
//! The choking/piece-picking coordinator, configuration, and the CLI live
//! outside this crate; they plug in through [`download::StatsSource`],
//! [`peer::PeerCoordinator`], and the bounded result channels each
//! component takes.

pub mod bencode;
pub mod cache;
pub mod download;
pub mod metainfo;
pub mod peer;
pub mod storage;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use cache::PieceCache;
pub use download::{generate_peer_id, DownloadInfo, StatsSnapshot, StatsSource};
pub use metainfo::{File, InfoHash, Metafile, MetainfoError, Piece};
pub use peer::{
    decode_messages, Handshake, Message, MessageId, PeerChannel, PeerCoordinator, PeerError,
    PeerServer,
};
pub use storage::{PieceStore, RetrieveResult, StorageError, StoreResult};
pub use tracker::{
    parse_compact_peers, AnnounceResult, Announcer, AnnouncerHandle, TrackerError, TrackerEvent,
};
