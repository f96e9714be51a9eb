use std::io;
use std::sync::Arc;

/// Unified error type for the storage engine.
///
/// `Clone` because a single failure is handed to every writer of a commit
/// group and cached as the background error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
    /// Data corruption detected (CRC mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),
    /// The caller asked for something the database cannot do in its state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The database is closing; no more background work is accepted.
    #[error("Database is shutting down")]
    ShuttingDown,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
