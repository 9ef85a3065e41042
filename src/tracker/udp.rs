use std::time::Duration;

use bytes::Bytes;
use rand::Rng as _;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::announcer::AnnounceParams;
use super::error::TrackerError;
use super::response::AnnounceResult;

const PROTOCOL_ID: u64 = 0x41727101980;
const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;
const CONNECT_REQUEST_LEN: usize = 16;
const CONNECT_RESPONSE_LEN: usize = 16;
const ANNOUNCE_REQUEST_LEN: usize = 98;
const ANNOUNCE_RESPONSE_HEADER_LEN: usize = 20;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The UDP tracker dialect (BEP-15).
///
/// Every announce is a two-step exchange over one connected socket: a
/// connect request yielding a 64-bit connection id, then the announce
/// proper. Each read carries a 5-second deadline.
pub(super) struct UdpDialect {
    socket: UdpSocket,
}

impl UdpDialect {
    pub(super) async fn connect(url: &str) -> Result<Self, TrackerError> {
        let addr = parse_udp_url(url)?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        Ok(Self { socket })
    }

    pub(super) async fn announce(
        &mut self,
        params: &AnnounceParams,
    ) -> Result<(AnnounceResult, u32), TrackerError> {
        let connection_id = self.exchange_connect().await?;

        let transaction_id = random_transaction_id();
        let request = build_announce_request(params, connection_id, transaction_id);
        self.socket.send(&request).await?;

        let mut response =
            vec![0u8; ANNOUNCE_RESPONSE_HEADER_LEN + params.numwant as usize * 6];
        let count = self.recv_with_deadline(&mut response).await?;

        parse_announce_response(&response[..count], transaction_id)
    }

    async fn exchange_connect(&self) -> Result<u64, TrackerError> {
        let transaction_id = random_transaction_id();

        let mut request = Vec::with_capacity(CONNECT_REQUEST_LEN);
        request.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
        request.extend_from_slice(&ACTION_CONNECT.to_be_bytes());
        request.extend_from_slice(&transaction_id.to_be_bytes());
        self.socket.send(&request).await?;

        let mut response = [0u8; CONNECT_RESPONSE_LEN];
        let count = self.recv_with_deadline(&mut response).await?;
        if count < CONNECT_RESPONSE_LEN {
            return Err(TrackerError::Protocol(format!(
                "connect response is {} bytes",
                count
            )));
        }

        let action = read_u32(&response[0..4]);
        if action != ACTION_CONNECT {
            return Err(TrackerError::Protocol(format!(
                "connect response carries action {}",
                action
            )));
        }

        let echoed = read_u32(&response[4..8]);
        if echoed != transaction_id {
            return Err(TrackerError::Protocol(
                "connect transaction id mismatch".into(),
            ));
        }

        Ok(u64::from_be_bytes([
            response[8],
            response[9],
            response[10],
            response[11],
            response[12],
            response[13],
            response[14],
            response[15],
        ]))
    }

    async fn recv_with_deadline(&self, buf: &mut [u8]) -> Result<usize, TrackerError> {
        timeout(READ_TIMEOUT, self.socket.recv(buf))
            .await
            .map_err(|_| TrackerError::Timeout)?
            .map_err(TrackerError::Io)
    }
}

fn build_announce_request(
    params: &AnnounceParams,
    connection_id: u64,
    transaction_id: u32,
) -> Vec<u8> {
    let key: u32 = rand::rng().random();

    let mut request = Vec::with_capacity(ANNOUNCE_REQUEST_LEN);
    request.extend_from_slice(&connection_id.to_be_bytes());
    request.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
    request.extend_from_slice(&transaction_id.to_be_bytes());
    request.extend_from_slice(&params.info_hash);
    request.extend_from_slice(&params.peer_id);
    request.extend_from_slice(&params.downloaded.to_be_bytes());
    request.extend_from_slice(&params.left.to_be_bytes());
    request.extend_from_slice(&params.uploaded.to_be_bytes());
    request.extend_from_slice(&params.event.as_udp_id().to_be_bytes());
    request.extend_from_slice(&0u32.to_be_bytes()); // IP address, 0 = sender address
    request.extend_from_slice(&key.to_be_bytes());
    request.extend_from_slice(&params.numwant.to_be_bytes());
    request.extend_from_slice(&params.port.to_be_bytes());

    request
}

fn parse_announce_response(
    response: &[u8],
    transaction_id: u32,
) -> Result<(AnnounceResult, u32), TrackerError> {
    if response.len() < 8 {
        return Err(TrackerError::Protocol(format!(
            "announce response is {} bytes",
            response.len()
        )));
    }

    let action = read_u32(&response[0..4]);
    if action == ACTION_ERROR {
        let message = String::from_utf8_lossy(&response[8..]).to_string();
        return Err(TrackerError::Failure(message));
    }

    if response.len() < ANNOUNCE_RESPONSE_HEADER_LEN {
        return Err(TrackerError::Protocol(format!(
            "announce response is {} bytes",
            response.len()
        )));
    }

    if action != ACTION_ANNOUNCE {
        return Err(TrackerError::Protocol(format!(
            "announce response carries action {}",
            action
        )));
    }

    let echoed = read_u32(&response[4..8]);
    if echoed != transaction_id {
        return Err(TrackerError::Protocol(
            "announce transaction id mismatch".into(),
        ));
    }

    let peer_data = &response[ANNOUNCE_RESPONSE_HEADER_LEN..];
    if peer_data.len() % 6 != 0 {
        return Err(TrackerError::Protocol(format!(
            "peer blob of {} bytes is not divisible by 6",
            peer_data.len()
        )));
    }

    let interval = read_u32(&response[8..12]);
    let incomplete = read_u32(&response[12..16]);
    let complete = read_u32(&response[16..20]);

    let result = AnnounceResult {
        complete,
        incomplete,
        peer_data: Bytes::copy_from_slice(peer_data),
    };

    Ok((result, interval))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn random_transaction_id() -> u32 {
    rand::rng().random_range(0..=i32::MAX as u32)
}

fn parse_udp_url(url: &str) -> Result<String, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() || !authority.contains(':') {
        return Err(TrackerError::InvalidUrl(url.to_string()));
    }

    Ok(authority.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::response::TrackerEvent;

    fn params() -> AnnounceParams {
        AnnounceParams {
            info_hash: [0x11; 20],
            peer_id: [0x22; 20],
            port: 6881,
            event: TrackerEvent::Started,
            downloaded: 100,
            uploaded: 200,
            left: 300,
            numwant: 20,
        }
    }

    #[test]
    fn announce_request_is_exactly_98_bytes() {
        let request = build_announce_request(&params(), 0xdead_beef, 42);
        assert_eq!(request.len(), ANNOUNCE_REQUEST_LEN);
    }

    #[test]
    fn announce_request_field_layout() {
        let request = build_announce_request(&params(), 0xdead_beef, 42);

        assert_eq!(read_u32(&request[8..12]), ACTION_ANNOUNCE);
        assert_eq!(read_u32(&request[12..16]), 42);
        assert_eq!(&request[16..36], &[0x11; 20]);
        assert_eq!(&request[36..56], &[0x22; 20]);
        assert_eq!(&request[56..64], &100u64.to_be_bytes());
        assert_eq!(&request[64..72], &300u64.to_be_bytes());
        assert_eq!(&request[72..80], &200u64.to_be_bytes());
        assert_eq!(read_u32(&request[80..84]), 2); // started
        assert_eq!(read_u32(&request[84..88]), 0); // ip
        assert_eq!(read_u32(&request[92..96]), 20); // numwant
        assert_eq!(&request[96..98], &6881u16.to_be_bytes());
    }

    #[test]
    fn announce_response_rejects_misaligned_peer_blob() {
        let mut response = Vec::new();
        response.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        response.extend_from_slice(&42u32.to_be_bytes());
        response.extend_from_slice(&[0u8; 12]);
        response.extend_from_slice(&[1, 2, 3]); // not a whole peer entry

        assert!(matches!(
            parse_announce_response(&response, 42),
            Err(TrackerError::Protocol(_))
        ));
    }

    #[test]
    fn announce_response_rejects_transaction_mismatch() {
        let mut response = Vec::new();
        response.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        response.extend_from_slice(&43u32.to_be_bytes());
        response.extend_from_slice(&[0u8; 12]);

        assert!(matches!(
            parse_announce_response(&response, 42),
            Err(TrackerError::Protocol(_))
        ));
    }

    #[test]
    fn announce_response_parses_counters_and_blob() {
        let mut response = Vec::new();
        response.extend_from_slice(&ACTION_ANNOUNCE.to_be_bytes());
        response.extend_from_slice(&42u32.to_be_bytes());
        response.extend_from_slice(&1800u32.to_be_bytes());
        response.extend_from_slice(&3u32.to_be_bytes()); // leechers
        response.extend_from_slice(&5u32.to_be_bytes()); // seeders
        response.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);

        let (result, interval) = parse_announce_response(&response, 42).unwrap();
        assert_eq!(interval, 1800);
        assert_eq!(result.incomplete, 3);
        assert_eq!(result.complete, 5);
        assert_eq!(result.peers(), vec!["127.0.0.1:6881".parse().unwrap()]);
    }

    #[test]
    fn udp_url_requires_scheme_and_port() {
        assert!(parse_udp_url("udp://tracker.test:6969").is_ok());
        assert!(parse_udp_url("udp://tracker.test:6969/announce").is_ok());
        assert!(parse_udp_url("http://tracker.test:6969").is_err());
        assert!(parse_udp_url("udp://tracker.test").is_err());
    }
}
