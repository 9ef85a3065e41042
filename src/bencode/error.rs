use thiserror::Error;

/// Errors raised while encoding or decoding bencode.
#[derive(Debug, Error)]
pub enum BencodeError {
    /// Input ended before a complete value was parsed.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Integer is empty, has leading zeros, or is not a valid number.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Byte-string length prefix is not a decimal number.
    #[error("invalid string length")]
    InvalidStringLength,

    /// Encountered a byte that cannot start a value.
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),

    /// Dictionary key is not a byte string.
    #[error("dictionary key is not a byte string")]
    InvalidDictKey,

    /// Extra data after the top-level value.
    #[error("trailing data after value")]
    TrailingData,

    /// Recursion limit exceeded.
    #[error("nesting too deep")]
    NestingTooDeep,

    /// I/O error while encoding.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
