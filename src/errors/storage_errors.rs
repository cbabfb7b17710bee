use thiserror::Error;

// Errors surfaced by the storage layer collaborator. Quorum failures are
// their own kinds so callers can tell a sick cluster from a bad request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage resources are insufficient for the write operation")]
    WriteQuorum,

    #[error("storage resources are insufficient for the read operation")]
    ReadQuorum,

    #[error("config file not found")]
    ConfigNotFound,

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_quorum(&self) -> bool {
        matches!(self, StorageError::WriteQuorum | StorageError::ReadQuorum)
    }
}
