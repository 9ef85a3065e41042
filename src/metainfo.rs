//! Torrent metainfo handling (BEP-3)
//!
//! Parses `.torrent` metafiles into a [`Metafile`]: the announce URL, the
//! info hash identifying the torrent, and the piece and file tables.

mod error;
mod info_hash;
mod metafile;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use metafile::{File, Metafile, Piece};
