use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// The tracker answered, but the response violates the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The tracker explicitly refused the announce.
    #[error("tracker returned failure: {0}")]
    Failure(String),

    #[error("timed out waiting for tracker")]
    Timeout,

    #[error("invalid tracker url: {0}")]
    InvalidUrl(String),

    #[error("unsupported tracker scheme: {0}")]
    UnsupportedScheme(String),
}
