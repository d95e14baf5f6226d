//! On-disk snapshot: an index blob plus a JSON array of entries.
//!
//! The two artifacts load independently. A missing or unreadable artifact
//! is replaced by an empty one and the other is still used. Writes go to a
//! sibling temporary file that is synced, renamed over the target, and then
//! made durable by syncing the parent directory.

use crate::error::{MemoryError, Result};
use crate::table::EntryTable;
use crate::traits::MemoryEntry;
use crate::vector::{FlatIndex, VectorIndex};
use recall_common::config::MemoryConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Locations of the two persisted artifacts.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub index: PathBuf,
    pub entries: PathBuf,
}

impl SnapshotPaths {
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self {
            index: config.index_path(),
            entries: config.entries_path(),
        }
    }
}

/// Everything restored from disk.
#[derive(Debug)]
pub struct Snapshot {
    pub table: EntryTable,
    pub index: FlatIndex,
}

impl Snapshot {
    /// Next id that cannot collide with anything in either artifact.
    pub fn next_id(&self) -> u64 {
        self.table
            .max_id()
            .into_iter()
            .chain(self.index.max_id())
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// Read an artifact, treating a missing file as absent.
async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Load the entry document. A missing file yields an empty list.
pub async fn load_entries(path: &Path) -> Result<Vec<MemoryEntry>> {
    let Some(bytes) = read_optional(path)
        .await
        .map_err(|e| MemoryError::EntryLoad(e.to_string()))?
    else {
        return Ok(Vec::new());
    };
    serde_json::from_slice(&bytes).map_err(|e| MemoryError::EntryLoad(e.to_string()))
}

/// Load an index blob. A missing file yields `None`.
pub async fn load_index<I: VectorIndex>(path: &Path, dimension: usize) -> Result<Option<I>> {
    let Some(bytes) = read_optional(path)
        .await
        .map_err(|e| MemoryError::IndexLoad(e.to_string()))?
    else {
        return Ok(None);
    };
    I::from_bytes(&bytes, dimension).map(Some)
}

/// Load both artifacts, recovering each one independently.
pub async fn load_snapshot(paths: &SnapshotPaths, dimension: usize) -> Snapshot {
    let table = match load_entries(&paths.entries).await {
        Ok(entries) => EntryTable::from_entries(entries),
        Err(e) => {
            tracing::warn!(
                path = %paths.entries.display(),
                error = %e,
                "Entry table unreadable, starting empty"
            );
            EntryTable::new()
        }
    };

    let index = match load_index::<FlatIndex>(&paths.index, dimension).await {
        Ok(Some(index)) => index,
        Ok(None) => {
            tracing::debug!(path = %paths.index.display(), "No index on disk, starting empty");
            FlatIndex::new(dimension)
        }
        Err(e) => {
            tracing::warn!(
                path = %paths.index.display(),
                error = %e,
                "Vector index unreadable, starting empty"
            );
            FlatIndex::new(dimension)
        }
    };

    Snapshot { table, index }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Flush the directory entry of `path` so a completed rename survives a
/// power loss.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Write `bytes` to `path` through a synced temporary sibling and a rename.
///
/// The target is either the previous complete file or the new complete
/// file, never a partial one.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let wrap = |source| MemoryError::PersistenceWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Err(source) = write_synced(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(wrap(source));
    }
    if let Err(source) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(wrap(source));
    }
    sync_parent(path).await.map_err(wrap)
}

/// Write the full index and entry table.
///
/// The index goes first: ids it holds that the entry table lacks are
/// skipped at query time, so a crash between the two writes is harmless.
pub async fn save_snapshot(
    paths: &SnapshotPaths,
    table: &EntryTable,
    index: &impl VectorIndex,
) -> Result<()> {
    let index_bytes = index.to_bytes()?;
    let entries: Vec<&MemoryEntry> = table.iter().collect();
    let entry_bytes = serde_json::to_vec_pretty(&entries).map_err(|e| {
        MemoryError::PersistenceWrite {
            path: paths.entries.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        }
    })?;

    write_atomic(&paths.index, &index_bytes).await?;
    write_atomic(&paths.entries, &entry_bytes).await
}
