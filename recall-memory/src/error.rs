//! Error types for the memory store and its embedding providers.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure while turning text into a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse embedding response: {0}")]
    Parse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("embeddings are disabled")]
    Disabled,
}

/// Memory store error taxonomy.
///
/// None of these reach callers of `add` or `retrieve_*`; they are logged and
/// recovered from inside the store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("failed to load index: {0}")]
    IndexLoad(String),

    #[error("failed to load entries: {0}")]
    EntryLoad(String),

    #[error("failed to write {}: {source}", path.display())]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("id {0} is already indexed")]
    DuplicateId(u64),
}

/// Result alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
