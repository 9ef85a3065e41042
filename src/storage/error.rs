use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage root is not owner readable/writable/executable.
    #[error("insufficient permissions on storage root: {0}")]
    InsufficientPermissions(String),

    /// The piece files on disk do not form a run from index 0.
    #[error("cannot compose files yet, pieces are missing")]
    MissingPieces,

    /// File composition failed; the destination has been cleaned up.
    #[error("failed to compose files: {0}")]
    ComposeFailed(#[source] Box<StorageError>),
}
