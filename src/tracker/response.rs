use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::Bytes;

/// Lifecycle event reported with an announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Regular periodic announce.
    None,
    /// First announce of a download.
    Started,
    /// Final announce when the download is abandoned.
    Stopped,
    /// The download finished; we are now a seeder.
    Completed,
}

impl TrackerEvent {
    /// The `event` query value in the HTTP dialect; empty means no event.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerEvent::None => "",
            TrackerEvent::Started => "started",
            TrackerEvent::Stopped => "stopped",
            TrackerEvent::Completed => "completed",
        }
    }

    /// The event id field in the UDP dialect.
    pub fn as_udp_id(&self) -> u32 {
        match self {
            TrackerEvent::None => 0,
            TrackerEvent::Completed => 1,
            TrackerEvent::Started => 2,
            TrackerEvent::Stopped => 3,
        }
    }
}

/// One successful announce, as handed to the coordinator.
///
/// `peer_data` is the compact peer blob exactly as the tracker sent it:
/// six bytes per IPv4 peer, four of address and two of big-endian port.
/// The announcer never parses it; [`parse_compact_peers`] does.
#[derive(Debug, Clone)]
pub struct AnnounceResult {
    /// Number of seeders in the swarm.
    pub complete: u32,
    /// Number of leechers in the swarm.
    pub incomplete: u32,
    /// Compact peer blob.
    pub peer_data: Bytes,
}

impl AnnounceResult {
    /// Parses the compact peer blob carried by this result.
    pub fn peers(&self) -> Vec<SocketAddr> {
        parse_compact_peers(&self.peer_data)
    }
}

/// Parses a compact IPv4 peer blob into socket addresses.
///
/// Trailing bytes that do not fill a whole 6-byte entry are ignored.
pub fn parse_compact_peers(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}
