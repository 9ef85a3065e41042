use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::PeerError;

/// The protocol identifier opening every handshake.
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";
/// Length of the handshake message in bytes.
pub const HANDSHAKE_LEN: usize = 68;
/// Largest frame a well-behaved peer sends; channel buffers are sized
/// from this.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024;

/// Message type identifiers in the peer wire protocol.
///
/// Every message except the keep-alive carries a one-byte id after the
/// length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(PeerError::InvalidMessageId(value)),
        }
    }
}

/// The fixed 68-byte handshake opening a peer connection.
///
/// Layout: one length byte (19), the literal `BitTorrent protocol`,
/// eight reserved bytes, the info hash, and the sender's peer id. This
/// implementation writes the reserved bytes as zero and does not
/// interpret them when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// The torrent's info hash.
    pub info_hash: [u8; 20],
    /// The sender's peer id.
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Encodes the handshake for transmission.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    /// Parses a handshake from exactly 68 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::InvalidHandshake`] on any other length, a
    /// wrong length byte, or a wrong protocol literal.
    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() != HANDSHAKE_LEN {
            return Err(PeerError::InvalidHandshake);
        }

        if data[0] != PROTOCOL.len() as u8 || &data[1..20] != PROTOCOL {
            return Err(PeerError::InvalidHandshake);
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self { info_hash, peer_id })
    }
}

/// A peer wire protocol message.
///
/// Messages are framed with a 4-byte big-endian length prefix; a length
/// of zero is a keep-alive with no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Empty frame keeping an idle connection open.
    KeepAlive,
    /// We are not sending data to the peer.
    Choke,
    /// We are ready to send data to the peer.
    Unchoke,
    /// We want data from the peer.
    Interested,
    /// We do not want data from the peer.
    NotInterested,
    /// We acquired a piece.
    Have { piece: u32 },
    /// All pieces we have, one bit per piece.
    Bitfield(Bytes),
    /// Ask for a block of a piece.
    Request { index: u32, begin: u32, length: u32 },
    /// A block of piece data.
    Piece { index: u32, begin: u32, data: Bytes },
    /// Withdraw a pending request.
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Encodes the message, including the length prefix.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Choke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Choke as u8);
            }
            Message::Unchoke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Unchoke as u8);
            }
            Message::Interested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Interested as u8);
            }
            Message::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::NotInterested as u8);
            }
            Message::Have { piece } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bits);
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Request as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, data } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Cancel as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
        }

        buf.freeze()
    }
}

/// Peels as many complete frames as the buffer holds.
///
/// Returns the decoded messages and the residual bytes; the caller keeps
/// the residue and prepends the next read to it, so decoding resumes
/// across arbitrary TCP fragmentation.
///
/// # Errors
///
/// A frame with an unknown id or a payload violating its declared
/// length fails the whole call; the connection is beyond salvage at that
/// point and must be dropped.
pub fn decode_messages(mut data: &[u8]) -> Result<(Vec<Message>, &[u8]), PeerError> {
    let mut messages = Vec::new();

    loop {
        if data.len() < 4 {
            break;
        }

        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if length == 0 {
            messages.push(Message::KeepAlive);
            data = &data[4..];
            continue;
        }

        if data.len() - 4 < length {
            break;
        }

        messages.push(decode_payload(&data[4..4 + length])?);
        data = &data[4 + length..];
    }

    Ok((messages, data))
}

fn decode_payload(payload: &[u8]) -> Result<Message, PeerError> {
    let id = MessageId::try_from(payload[0])?;
    let mut body = &payload[1..];

    match id {
        MessageId::Choke | MessageId::Unchoke | MessageId::Interested | MessageId::NotInterested => {
            if !body.is_empty() {
                return Err(PeerError::InvalidMessage(format!(
                    "{:?} carries a payload of {} bytes",
                    id,
                    body.len()
                )));
            }
            Ok(match id {
                MessageId::Choke => Message::Choke,
                MessageId::Unchoke => Message::Unchoke,
                MessageId::Interested => Message::Interested,
                _ => Message::NotInterested,
            })
        }
        MessageId::Have => {
            if body.len() != 4 {
                return Err(PeerError::InvalidMessage(format!(
                    "have payload is {} bytes",
                    body.len()
                )));
            }
            Ok(Message::Have {
                piece: body.get_u32(),
            })
        }
        MessageId::Bitfield => Ok(Message::Bitfield(Bytes::copy_from_slice(body))),
        MessageId::Request => {
            if body.len() != 12 {
                return Err(PeerError::InvalidMessage(format!(
                    "request payload is {} bytes",
                    body.len()
                )));
            }
            Ok(Message::Request {
                index: body.get_u32(),
                begin: body.get_u32(),
                length: body.get_u32(),
            })
        }
        MessageId::Piece => {
            if body.len() < 8 {
                return Err(PeerError::InvalidMessage(format!(
                    "piece payload is {} bytes",
                    body.len()
                )));
            }
            let index = body.get_u32();
            let begin = body.get_u32();
            Ok(Message::Piece {
                index,
                begin,
                data: Bytes::copy_from_slice(body),
            })
        }
        MessageId::Cancel => {
            if body.len() != 12 {
                return Err(PeerError::InvalidMessage(format!(
                    "cancel payload is {} bytes",
                    body.len()
                )));
            }
            Ok(Message::Cancel {
                index: body.get_u32(),
                begin: body.get_u32(),
                length: body.get_u32(),
            })
        }
    }
}
