//! Core Memory trait and entry type for the Recall memory system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Timestamp layout used for entries (ISO-8601, UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A single conversational turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Store-assigned id, strictly increasing in add order
    pub id: u64,
    /// Creation time, ISO-8601 UTC
    pub timestamp: String,
    /// Speaker, e.g. "user" or "assistant"
    pub role: String,
    /// The stored text
    pub content: String,
}

impl MemoryEntry {
    /// Create an entry stamped with the current UTC time.
    pub fn new(id: u64, role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Point-in-time counters for a memory backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Entries in the entry table
    pub entries: usize,
    /// Vectors in the index
    pub indexed: usize,
    /// Ids in the short-term buffer
    pub short_term: usize,
    /// Whether unsaved changes exist
    pub dirty: bool,
}

/// Memory backend seam used by the transport.
///
/// Implementations never surface internal failures through these calls:
/// embedding and persistence problems are logged and degrade the result.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Backend name (e.g., "hybrid")
    fn name(&self) -> &str;

    /// Record a turn and return the created entry.
    async fn add(&self, role: &str, content: &str) -> MemoryEntry;

    /// Up to `n` most recent entries, oldest first.
    async fn retrieve_recent(&self, n: usize) -> Vec<MemoryEntry>;

    /// Up to `k` entries most similar to `query`, best first, content-deduplicated.
    async fn retrieve_relevant(&self, query: &str, k: usize) -> Vec<MemoryEntry>;

    /// Current counters.
    async fn stats(&self) -> MemoryStats;

    /// Whether the backend is operational.
    async fn health_check(&self) -> bool;
}
