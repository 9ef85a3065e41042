use std::path::{Component, Path, PathBuf};

use bytes::Bytes;

use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, decode_prefix, Value};

/// A parsed `.torrent` metafile.
///
/// Immutable after parsing. The piece table and file table describe the
/// same byte stream: the concatenation of all files, cut into fixed-size
/// pieces of which only the last may be shorter.
///
/// # Examples
///
/// ```no_run
/// use driftnet::metainfo::Metafile;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metafile = Metafile::from_bytes(&data)?;
///
/// println!("announce: {}", metafile.announce);
/// println!("info hash: {}", metafile.info_hash);
/// println!("{} pieces, {} files", metafile.pieces.len(), metafile.files.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metafile {
    /// Tracker announce URL.
    pub announce: String,
    /// SHA-1 of the bencoded `info` dictionary.
    pub info_hash: InfoHash,
    /// Piece descriptors, in index order.
    pub pieces: Vec<Piece>,
    /// File descriptors, in torrent order.
    pub files: Vec<File>,
}

/// One piece of the torrent payload.
#[derive(Debug, Clone)]
pub struct Piece {
    /// Zero-based piece index.
    pub index: u32,
    /// Length in bytes. Equal to the declared piece length for every
    /// piece except possibly the last.
    pub length: u64,
    /// Expected SHA-1 of the piece data.
    pub hash: [u8; 20],
    /// Piece data, filled in opportunistically while downloading.
    pub data: Option<Bytes>,
}

/// One file of the torrent payload.
///
/// The path is relative to the download directory and already includes
/// the torrent name as its first component. Paths are validated at parse
/// time so they cannot escape the download directory.
#[derive(Debug, Clone)]
pub struct File {
    pub path: PathBuf,
    pub length: u64,
}

impl Metafile {
    /// Parses a metafile from raw `.torrent` bytes.
    ///
    /// The info hash is computed over the exact source bytes of the
    /// `info` value rather than a re-encoding: the parser locates
    /// `4:info` in the input, measures the bencoded value that follows,
    /// and hashes that slice.
    ///
    /// # Errors
    ///
    /// Fails if the input is not valid bencode, if `announce` or `info`
    /// (or any of the required `info` fields) is missing or mistyped, or
    /// if a file path would escape the download directory.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        root.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let announce = root
            .get(b"announce")
            .ok_or(MetainfoError::MissingField("announce"))?
            .as_str()
            .ok_or(MetainfoError::InvalidField("announce"))?
            .to_string();

        let info = root
            .get(b"info")
            .ok_or(MetainfoError::MissingField("info"))?;
        info.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

        let files = parse_files(info)?;
        let mut pieces = parse_pieces(info)?;

        let total_length: u64 = files.iter().map(|f| f.length).sum();
        fixup_last_piece(&mut pieces, total_length);

        let info_hash = hash_info_slice(data)?;

        Ok(Self {
            announce,
            info_hash,
            pieces,
            files,
        })
    }

    /// Total payload length in bytes.
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }
}

/// Locates the encoded `info` value inside the source buffer and hashes
/// it in place.
fn hash_info_slice(data: &[u8]) -> Result<InfoHash, MetainfoError> {
    let marker = b"4:info";
    let start = data
        .windows(marker.len())
        .position(|window| window == marker)
        .ok_or(MetainfoError::MissingField("info"))?
        + marker.len();

    let (_, consumed) = decode_prefix(&data[start..])?;
    Ok(InfoHash::from_info_bytes(&data[start..start + consumed]))
}

fn parse_files(info: &Value) -> Result<Vec<File>, MetainfoError> {
    let name = info
        .get(b"name")
        .ok_or(MetainfoError::MissingField("name"))?
        .as_str()
        .ok_or(MetainfoError::InvalidField("name"))?;

    if let Some(length) = info.get(b"length") {
        let length = length
            .as_integer()
            .ok_or(MetainfoError::InvalidField("length"))?;

        let file = File {
            path: PathBuf::from(name),
            length: length as u64,
        };
        validate_file_path(&file.path)?;
        return Ok(vec![file]);
    }

    let entries = info
        .get(b"files")
        .ok_or(MetainfoError::MissingField("length or files"))?
        .as_list()
        .ok_or(MetainfoError::InvalidField("files"))?;

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        let length = entry
            .get(b"length")
            .and_then(Value::as_integer)
            .ok_or(MetainfoError::InvalidField("files"))?;

        let components = entry
            .get(b"path")
            .and_then(Value::as_list)
            .ok_or(MetainfoError::InvalidField("files"))?;

        let mut path = PathBuf::from(name);
        for component in components {
            let component = component
                .as_str()
                .ok_or(MetainfoError::InvalidField("files"))?;
            path.push(component);
        }
        validate_file_path(&path)?;

        files.push(File {
            path,
            length: length as u64,
        });
    }

    Ok(files)
}

fn parse_pieces(info: &Value) -> Result<Vec<Piece>, MetainfoError> {
    let piece_length = info
        .get(b"piece length")
        .ok_or(MetainfoError::MissingField("piece length"))?
        .as_integer()
        .filter(|&len| len > 0)
        .ok_or(MetainfoError::InvalidField("piece length"))? as u64;

    let hashes = info
        .get(b"pieces")
        .ok_or(MetainfoError::MissingField("pieces"))?
        .as_bytes()
        .ok_or(MetainfoError::InvalidField("pieces"))?;

    if hashes.is_empty() || hashes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let pieces = hashes
        .chunks_exact(20)
        .enumerate()
        .map(|(index, chunk)| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            Piece {
                index: index as u32,
                length: piece_length,
                hash,
                data: None,
            }
        })
        .collect();

    Ok(pieces)
}

/// Shortens the last piece to the remainder of the total length. An
/// exact multiple keeps the full declared length.
fn fixup_last_piece(pieces: &mut [Piece], total_length: u64) {
    if let Some(last) = pieces.last_mut() {
        let remainder = total_length % last.length;
        if remainder != 0 {
            last.length = remainder;
        }
    }
}

fn validate_file_path(path: &Path) -> Result<(), MetainfoError> {
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MetainfoError::UnsafeFilePath(path.display().to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}
