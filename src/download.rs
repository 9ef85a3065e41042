//! Shared download identity and the stats contract.
//!
//! A [`DownloadInfo`] is built once per torrent and shared read-only by
//! the tracker announcer and the peer server. Transfer counters come
//! from an external [`StatsSource`]; this crate never mutates them.

use rand::Rng as _;

use crate::metainfo::InfoHash;

const PEER_ID_PREFIX: &[u8] = b"-DN0001-";

/// Identity of one download, shared by the announcer and the peer server.
#[derive(Debug, Clone)]
pub struct DownloadInfo {
    /// The torrent this download belongs to.
    pub info_hash: InfoHash,
    /// Our peer id, sent in handshakes and announces.
    pub peer_id: [u8; 20],
    /// The TCP port the peer server listens on.
    pub port: u16,
}

impl DownloadInfo {
    pub fn new(info_hash: InfoHash, peer_id: [u8; 20], port: u16) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
        }
    }
}

/// Transfer counters at a point in time, all in bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
}

/// Source of transfer counters for tracker announces.
///
/// Implemented by the stats aggregator outside this crate. `current`
/// must be a non-blocking read; the announcer calls it on every
/// announce.
pub trait StatsSource: Send + Sync {
    fn current(&self) -> StatsSnapshot;
}

/// Generates an Azureus-style peer id: client prefix plus random bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
    rand::rng().fill(&mut id[PEER_ID_PREFIX.len()..]);
    id
}
