//! Hybrid memory store.
//!
//! Combines the entry table, the short-term buffer and the vector index
//! behind one `RwLock`. Embeddings are computed before the lock is taken;
//! id allocation, the table insert, the buffer push and the vector insert
//! then commit together.
//!
//! ```text
//! add ──→ embed(document) ──→ [lock] id → table → short-term → index → dirty
//! relevant ──→ embed(query) ──→ [lock] index.search(k × oversample) → rank
//! flusher ──→ every N secs, if dirty: [lock] save index + entries
//! ```

use crate::embeddings::{EmbeddingIntent, EmbeddingProvider};
use crate::error::{EmbeddingError, Result};
use crate::flusher::Flusher;
use crate::persistence::{self, Snapshot, SnapshotPaths};
use crate::ranking::RelevancePolicy;
use crate::short_term::ShortTermBuffer;
use crate::table::EntryTable;
use crate::traits::{Memory, MemoryEntry, MemoryStats};
use crate::vector::{FlatIndex, VectorIndex};
use anyhow::Context;
use async_trait::async_trait;
use recall_common::config::{MemoryConfig, RetrievalConfig};
use recall_common::util::truncate_with_ellipsis;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

/// Embedding timeout used unless overridden.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

struct StoreState {
    table: EntryTable,
    index: FlatIndex,
    recent: ShortTermBuffer,
    next_id: u64,
}

impl StoreState {
    fn from_snapshot(snapshot: Snapshot, capacity: usize) -> Self {
        let next_id = snapshot.next_id();
        Self {
            table: snapshot.table,
            index: snapshot.index,
            recent: ShortTermBuffer::new(capacity),
            next_id,
        }
    }
}

struct StoreInner {
    state: RwLock<StoreState>,
    dirty: AtomicBool,
    paths: SnapshotPaths,
    dimension: usize,
    capacity: usize,
}

impl StoreInner {
    /// Save both artifacts if anything changed. Holds the write lock for
    /// the whole save; on failure the store stays dirty.
    async fn flush(&self) -> Result<bool> {
        let state = self.state.write().await;
        self.save_locked(&state).await
    }

    async fn save_locked(&self, state: &StoreState) -> Result<bool> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(false);
        }
        persistence::save_snapshot(&self.paths, &state.table, &state.index).await?;
        self.dirty.store(false, Ordering::Release);
        tracing::info!(
            entries = state.table.len(),
            indexed = state.index.len(),
            "Memory flushed"
        );
        Ok(true)
    }
}

/// Conversational memory with short-term recency and semantic recall.
pub struct MemoryStore {
    inner: Arc<StoreInner>,
    provider: Arc<dyn EmbeddingProvider>,
    policy: RelevancePolicy,
    embed_timeout: Duration,
    flusher: Mutex<Option<Flusher>>,
}

impl MemoryStore {
    /// Load whatever snapshot exists under `memory.data_dir` and start the
    /// background flusher.
    pub async fn open(
        memory: &MemoryConfig,
        retrieval: &RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&memory.data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", memory.data_dir))?;

        if provider.dimensions() != memory.dimension {
            tracing::warn!(
                provider = provider.name(),
                provider_dims = provider.dimensions(),
                index_dims = memory.dimension,
                "Embedding provider dimension differs from index, vectors will be rejected"
            );
        }

        let paths = SnapshotPaths::from_config(memory);
        let snapshot = persistence::load_snapshot(&paths, memory.dimension).await;
        let state = StoreState::from_snapshot(snapshot, memory.short_term_capacity);

        tracing::info!(
            entries = state.table.len(),
            indexed = state.index.len(),
            next_id = state.next_id,
            provider = provider.name(),
            "Memory store opened"
        );

        let inner = Arc::new(StoreInner {
            state: RwLock::new(state),
            dirty: AtomicBool::new(false),
            paths,
            dimension: memory.dimension,
            capacity: memory.short_term_capacity,
        });

        let flush_target = inner.clone();
        let flusher = Flusher::spawn(
            Duration::from_secs(memory.flush_interval_secs.max(1)),
            move || {
                let inner = flush_target.clone();
                async move {
                    if let Err(e) = inner.flush().await {
                        tracing::error!(error = %e, "Periodic flush failed, will retry");
                    }
                }
            },
        );

        Ok(Self {
            inner,
            provider,
            policy: RelevancePolicy::from_config(retrieval),
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// Bound every embedding call by `timeout`.
    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    async fn embed(
        &self,
        text: &str,
        intent: EmbeddingIntent,
    ) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let call = self.provider.embed_one(text, intent);
        match tokio::time::timeout(self.embed_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(self.embed_timeout)),
        }
    }

    /// Record a turn. Never fails: without an embedding the entry is still
    /// kept and reachable through recency.
    pub async fn add(&self, role: &str, content: &str) -> MemoryEntry {
        let vector = match self.embed(content, EmbeddingIntent::Document).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    content = %truncate_with_ellipsis(content, 60),
                    "Embedding failed, entry stored without vector"
                );
                None
            }
        };

        let mut state = self.inner.state.write().await;
        let id = state.next_id;
        state.next_id += 1;

        let entry = MemoryEntry::new(id, role, content);
        state.table.insert(entry.clone());

        if let Some(evicted) = state.recent.push(id) {
            tracing::trace!(evicted, "Short-term buffer full, oldest id evicted");
        }

        if let Some(vector) = vector {
            if let Err(e) = state.index.insert(id, vector) {
                tracing::warn!(id, error = %e, "Failed to index entry");
            }
        }

        self.inner.dirty.store(true, Ordering::Release);
        tracing::debug!(id, role = %role, "Memory entry added");
        entry
    }

    /// Up to `n` most recent entries, oldest first.
    pub async fn retrieve_recent(&self, n: usize) -> Vec<MemoryEntry> {
        let state = self.inner.state.read().await;
        state
            .recent
            .last(n)
            .filter_map(|id| state.table.get(id).cloned())
            .collect()
    }

    /// Up to `k` entries closest to `query`, best first, one per distinct
    /// content. Empty when the query is empty, nothing is indexed, or the
    /// query cannot be embedded.
    pub async fn retrieve_relevant(&self, query: &str, k: usize) -> Vec<MemoryEntry> {
        if query.is_empty() || k == 0 {
            return Vec::new();
        }
        if self.inner.state.read().await.index.is_empty() {
            return Vec::new();
        }

        let query_vector = match self.embed(query, EmbeddingIntent::Query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed, returning no results");
                return Vec::new();
            }
        };

        let state = self.inner.state.read().await;
        let candidates = state.index.search(&query_vector, self.policy.pool_size(k));
        let ranking = self.policy.rank(&candidates, k, |id| {
            state.table.get(id).map(|e| e.content.as_str())
        });

        tracing::debug!(
            query = %truncate_with_ellipsis(query, 60),
            k,
            candidates = candidates.len(),
            admitted = ranking.ids.len(),
            threshold = ranking.threshold,
            relaxed = ranking.relaxed,
            best_distance = ?ranking.best_distance,
            "Semantic retrieval"
        );

        ranking
            .ids
            .iter()
            .filter_map(|&id| state.table.get(id).cloned())
            .collect()
    }

    /// Save now if dirty. Returns whether anything was written.
    pub async fn flush(&self) -> Result<bool> {
        self.inner.flush().await
    }

    /// Persist pending changes, then replace the in-memory state with what
    /// is on disk. The short-term buffer starts empty again.
    pub async fn reload(&self) -> Result<()> {
        let mut state = self.inner.state.write().await;
        self.inner.save_locked(&state).await?;

        let snapshot = persistence::load_snapshot(&self.inner.paths, self.inner.dimension).await;
        let mut fresh = StoreState::from_snapshot(snapshot, self.inner.capacity);
        fresh.next_id = fresh.next_id.max(state.next_id);
        *state = fresh;

        tracing::info!(
            entries = state.table.len(),
            indexed = state.index.len(),
            "Memory reloaded"
        );
        Ok(())
    }

    /// Stop the flusher, wait for it, then flush once more if dirty.
    ///
    /// Safe to call more than once. The store stays usable afterwards but
    /// no longer flushes on its own.
    pub async fn shutdown(&self) {
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            flusher.stop().await;
        }

        match self.inner.flush().await {
            Ok(true) => tracing::info!("Final flush complete"),
            Ok(false) => tracing::debug!("Nothing to flush at shutdown"),
            Err(e) => tracing::error!(error = %e, "Final flush failed"),
        }
    }

    pub async fn stats(&self) -> MemoryStats {
        let state = self.inner.state.read().await;
        MemoryStats {
            entries: state.table.len(),
            indexed: state.index.len(),
            short_term: state.recent.len(),
            dirty: self.inner.dirty.load(Ordering::Acquire),
        }
    }

    fn flusher_running(&self) -> bool {
        self.flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        let slot = self.flusher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(flusher) = slot.take() {
            flusher.signal();
            if self.inner.dirty.load(Ordering::Acquire) {
                tracing::warn!("Memory store dropped without shutdown, unsaved changes lost");
            }
        }
    }
}

#[async_trait]
impl Memory for MemoryStore {
    fn name(&self) -> &str {
        "hybrid"
    }

    async fn add(&self, role: &str, content: &str) -> MemoryEntry {
        MemoryStore::add(self, role, content).await
    }

    async fn retrieve_recent(&self, n: usize) -> Vec<MemoryEntry> {
        MemoryStore::retrieve_recent(self, n).await
    }

    async fn retrieve_relevant(&self, query: &str, k: usize) -> Vec<MemoryEntry> {
        MemoryStore::retrieve_relevant(self, query, k).await
    }

    async fn stats(&self) -> MemoryStats {
        MemoryStore::stats(self).await
    }

    async fn health_check(&self) -> bool {
        self.flusher_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::NoopEmbedding;
    use tempfile::TempDir;

    /// Maps the first byte of the text onto one of `dims` axes.
    struct AxisEmbedding {
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedding {
        fn name(&self) -> &str {
            "axis"
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        async fn embed(
            &self,
            texts: &[&str],
            _intent: EmbeddingIntent,
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dims];
                    let axis = t.bytes().next().map_or(0, |b| b as usize % self.dims);
                    v[axis] = 1.0;
                    v
                })
                .collect())
        }
    }

    struct SlowEmbedding;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedding {
        fn name(&self) -> &str {
            "slow"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(
            &self,
            texts: &[&str],
            _intent: EmbeddingIntent,
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    fn memory_config(dir: &TempDir) -> MemoryConfig {
        MemoryConfig {
            dimension: 4,
            short_term_capacity: 3,
            ..MemoryConfig::in_dir(dir.path())
        }
    }

    async fn open_store(dir: &TempDir, provider: Arc<dyn EmbeddingProvider>) -> MemoryStore {
        MemoryStore::open(&memory_config(dir), &RetrievalConfig::default(), provider)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids_and_marks_dirty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(AxisEmbedding { dims: 4 })).await;

        let a = store.add("user", "a").await;
        let b = store.add("assistant", "b").await;
        assert_eq!((a.id, b.id), (0, 1));

        let stats = store.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.indexed, 2);
        assert!(stats.dirty);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn short_term_capacity_bounds_recent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(AxisEmbedding { dims: 4 })).await;
        for text in ["a", "b", "c", "d"] {
            store.add("user", text).await;
        }

        let recent: Vec<String> = store
            .retrieve_recent(10)
            .await
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(recent, vec!["b", "c", "d"]);
        // Evicted entries stay in the table.
        assert_eq!(store.stats().await.entries, 4);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_embeddings_keep_entries() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(NoopEmbedding::new(4))).await;

        store.add("user", "I love hiking").await;
        assert_eq!(store.retrieve_recent(1).await[0].content, "I love hiking");
        assert_eq!(store.stats().await.indexed, 0);
        assert!(store.retrieve_relevant("hiking", 5).await.is_empty());
        store.shutdown().await;
    }

    #[tokio::test]
    async fn embedding_timeout_is_non_fatal() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(SlowEmbedding))
            .await
            .with_embedding_timeout(Duration::from_millis(20));

        let entry = store.add("user", "slow").await;
        assert_eq!(entry.id, 0);
        let stats = store.stats().await;
        assert_eq!((stats.entries, stats.indexed), (1, 0));
        store.shutdown().await;
    }

    #[tokio::test]
    async fn flush_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(AxisEmbedding { dims: 4 })).await;

        assert!(!store.flush().await.unwrap());
        store.add("user", "a").await;
        assert!(store.flush().await.unwrap());
        assert!(!store.flush().await.unwrap());
        assert!(!store.stats().await.dirty);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(AxisEmbedding { dims: 4 })).await;
        assert!(store.health_check().await);

        store.add("user", "a").await;
        store.shutdown().await;
        store.shutdown().await;

        assert!(!store.health_check().await);
        assert!(memory_config(&dir).entries_path().exists());
    }

    #[tokio::test]
    async fn shutdown_stops_flusher_even_if_slot_poisoned() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, Arc::new(AxisEmbedding { dims: 4 })).await;
        store.add("user", "a").await;

        std::thread::scope(|s| {
            let poisoner = s.spawn(|| {
                let _slot = store.flusher.lock().unwrap();
                panic!("panicked while holding the flusher slot");
            });
            assert!(poisoner.join().is_err());
        });
        assert!(store.flusher.is_poisoned());
        assert!(store.health_check().await);

        store.shutdown().await;

        let slot = store.flusher.lock().unwrap_or_else(PoisonError::into_inner);
        assert!(slot.is_none());
        drop(slot);
        assert!(!store.health_check().await);
        assert!(!store.stats().await.dirty);
        assert!(memory_config(&dir).entries_path().exists());
    }

    #[tokio::test]
    async fn periodic_flush_persists_without_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = MemoryConfig {
            flush_interval_secs: 1,
            ..memory_config(&dir)
        };
        let store = MemoryStore::open(
            &config,
            &RetrievalConfig::default(),
            Arc::new(AxisEmbedding { dims: 4 }),
        )
        .await
        .unwrap();

        store.add("user", "a").await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(!store.stats().await.dirty);
        assert!(config.entries_path().exists());
        store.shutdown().await;
    }
}
