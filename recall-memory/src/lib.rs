//! Recall Memory - Hybrid conversational memory.
//!
//! Keeps recent turns verbatim in a bounded short-term buffer and indexes
//! every turn by embedding for similarity search:
//! - Short-term recall: the last N turns in chronological order
//! - Long-term recall: nearest neighbours by cosine distance, thresholded
//!   and deduplicated by content
//!
//! ## Architecture
//!
//! ```text
//! add(role, content) → Embeddings(document) ─┐
//!                                            ├── MemoryStore → Entry table
//!                                            │              → Short-term buffer
//!                                            │              → Vector index
//! retrieve_relevant(q) → Embeddings(query) ──┘
//!                                    Flusher → index blob + entries JSON
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod embeddings;
pub mod error;
pub mod flusher;
pub mod persistence;
pub mod ranking;
pub mod short_term;
pub mod store;
pub mod table;
pub mod traits;
pub mod vector;

// Re-export commonly used types
pub use embeddings::{
    create_embedding_provider, normalize, EmbeddingIntent, EmbeddingProvider, NoopEmbedding,
    OpenAiEmbedding,
};
pub use error::{EmbeddingError, MemoryError};
pub use ranking::{Ranking, RelevancePolicy};
pub use store::MemoryStore;
pub use traits::{Memory, MemoryEntry, MemoryStats};
pub use vector::{FlatIndex, VectorIndex};
