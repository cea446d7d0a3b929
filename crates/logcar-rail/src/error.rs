//! Error types for the rail subsystem

use logcar_chunk::ChunkError;

/// All errors that can occur while emitting or searching fragments
#[derive(Debug, thiserror::Error)]
pub enum RailError {
    /// A search request exceeded its deadline
    #[error("log search request timed out")]
    Timeout,
    /// The GraphQL layer returned no result or a malformed payload
    #[error("log search backend error: {0}")]
    SearchBackendError(String),
    /// A write group would exceed the per-record fragment cap
    #[error("write group of {fragments} fragments exceeds the cap of {max}")]
    FanOutExceeded {
        /// Fragments the write would emit
        fragments: usize,
        /// Configured cap
        max: usize,
    },
    /// The emit sink failed
    #[error("emit sink error: {0}")]
    Io(#[from] std::io::Error),
    /// A log line or query payload could not be encoded
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// A chunk engine failure surfaced through the rail
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Convenience result alias for rail operations
pub type Result<T> = std::result::Result<T, RailError>;
