//! Error types returned at the record API boundary

use logcar_chunk::ChunkError;
use logcar_rail::RailError;
use uuid::Uuid;

/// All errors the record facade and HTTP surface can return
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A read was attempted without a configured deployment or environment id
    #[error("no deployment or environment id is configured for log search")]
    MissingDeploymentId,
    /// No live state exists for the record (never written, or deleted)
    #[error("record {0} not found")]
    NotFound(Uuid),
    /// The configuration is inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A stored value is not a valid file envelope
    #[error("invalid file payload: {0}")]
    InvalidFile(String),
    /// A rail-layer failure
    #[error(transparent)]
    Rail(#[from] RailError),
    /// A chunk-engine failure
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Convenience result alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
