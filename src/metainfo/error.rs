use thiserror::Error;

use crate::bencode::BencodeError;

#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("invalid info hash length")]
    InvalidInfoHash,

    #[error("file path escapes the download directory: {0}")]
    UnsafeFilePath(String),
}
