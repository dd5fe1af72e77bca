//! Error types for docdelta operations.

use thiserror::Error;

/// Errors that can occur while building checksums, patches or reconstructions.
#[derive(Error, Debug)]
pub enum DocDeltaError {
    /// I/O error while reading or writing content.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected before any work was done.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Requested strong hash algorithm is not available.
    #[error("Unsupported strong hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A byte source ended before the expected length was read.
    #[error("Truncated input: expected {expected} bytes, got {actual}")]
    TruncatedInput {
        /// Bytes the caller expected
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// Patch references a block the checksums do not contain.
    #[error("Invalid block index {index} (document has {block_count} blocks)")]
    InvalidBlockIndex {
        /// Offending block index
        index: u32,
        /// Number of blocks in the reference
        block_count: usize,
    },

    /// Reference block no longer matches its recorded strong digest.
    #[error("Reference block {index} does not match its checksum")]
    BlockMismatch {
        /// Block index that failed verification
        index: u32,
    },

    /// Patch document is internally inconsistent.
    #[error("Corrupted patch: {0}")]
    CorruptedPatch(String),

    /// No checksums are stored for the requested content.
    #[error("No checksums stored for {0}")]
    ChecksumsNotFound(String),

    /// Encoding or decoding a persisted record failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for DocDeltaError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for docdelta operations.
pub type Result<T> = std::result::Result<T, DocDeltaError>;
