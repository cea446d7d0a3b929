//! Error types for the chunk engine

/// All errors that can occur while chunking, reassembling or (de)crypting values
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Reassembly was requested with zero fragments
    #[error("empty fragment set")]
    EmptyFragmentSet,
    /// Fewer fragments present than the write group declared
    #[error("incomplete fragment set: {present} of {total} fragments present")]
    IncompleteFragmentSet {
        /// Fragments actually present
        present: usize,
        /// Fragment count the write group declared
        total: usize,
    },
    /// Fragment indices are not the contiguous range `[0, total)`
    #[error("invalid fragment sequence: {reason}")]
    FragmentSequence {
        /// What was wrong with the index sequence
        reason: String,
    },
    /// Wrong key, corrupted ciphertext, or a malformed encryption envelope
    #[error("decryption failed: {0}")]
    Decryption(String),
    /// A payload is marked encrypted but no key was supplied or configured
    #[error("encryption key required but not provided")]
    MissingKey,
    /// Value serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for chunk engine operations
pub type Result<T> = std::result::Result<T, ChunkError>;
