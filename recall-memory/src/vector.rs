//! Vector index over entry embeddings.
//!
//! The index only knows ids and vectors; entry content lives in the
//! [`EntryTable`](crate::table::EntryTable). Distances are cosine distances
//! (`1 - dot` on unit vectors), so smaller means more similar.

use crate::error::{MemoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Current on-disk blob layout version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Nearest-neighbour index keyed by entry id.
pub trait VectorIndex: Send + Sync {
    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest id stored, if any.
    fn max_id(&self) -> Option<u64>;

    /// Add a vector. Fails on a repeated id or a wrong-length vector.
    fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<()>;

    /// Up to `k` nearest ids, ascending by distance.
    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)>;

    /// Serialize the whole index.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Rebuild an index from [`to_bytes`](Self::to_bytes) output.
    fn from_bytes(bytes: &[u8], dimension: usize) -> Result<Self>
    where
        Self: Sized;
}

/// Exact inner-product index. Vectors are stored contiguously.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<u64>,
    vectors: Vec<f32>,
    present: HashSet<u64>,
}

#[derive(Serialize, Deserialize)]
struct IndexBlob {
    version: u32,
    dimension: usize,
    ids: Vec<u64>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            present: HashSet::new(),
        }
    }

    fn row(&self, pos: usize) -> &[f32] {
        &self.vectors[pos * self.dimension..(pos + 1) * self.dimension]
    }
}

/// Cosine distance between two unit vectors.
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    1.0 - dot
}

impl VectorIndex for FlatIndex {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn max_id(&self) -> Option<u64> {
        self.ids.iter().copied().max()
    }

    fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if !self.present.insert(id) {
            return Err(MemoryError::DuplicateId(id));
        }
        self.ids.push(id);
        self.vectors.extend_from_slice(&vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let mut scored: Vec<(u64, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, inner_product_distance(query, self.row(pos))))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let blob = IndexBlob {
            version: INDEX_FORMAT_VERSION,
            dimension: self.dimension,
            ids: self.ids.clone(),
            vectors: self.vectors.clone(),
        };
        bincode::serialize(&blob).map_err(|e| MemoryError::IndexLoad(e.to_string()))
    }

    fn from_bytes(bytes: &[u8], dimension: usize) -> Result<Self> {
        let blob: IndexBlob =
            bincode::deserialize(bytes).map_err(|e| MemoryError::IndexLoad(e.to_string()))?;

        if blob.version != INDEX_FORMAT_VERSION {
            return Err(MemoryError::IndexLoad(format!(
                "unsupported index version {}",
                blob.version
            )));
        }
        if blob.dimension != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: dimension,
                actual: blob.dimension,
            });
        }
        if blob.vectors.len() != blob.ids.len() * dimension {
            return Err(MemoryError::IndexLoad(format!(
                "{} ids but {} vector components",
                blob.ids.len(),
                blob.vectors.len()
            )));
        }

        let mut present = HashSet::with_capacity(blob.ids.len());
        for &id in &blob.ids {
            if !present.insert(id) {
                return Err(MemoryError::DuplicateId(id));
            }
        }

        Ok(Self {
            dimension,
            ids: blob.ids,
            vectors: blob.vectors,
            present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn insert_and_search_orders_by_distance() {
        let mut index = FlatIndex::new(3);
        index.insert(1, unit(3, 0)).unwrap();
        index.insert(2, unit(3, 1)).unwrap();
        index.insert(3, vec![0.8, 0.6, 0.0]).unwrap();

        let hits = index.search(&unit(3, 0), 3);
        let ids: Vec<u64> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!(hits[0].1.abs() < 1e-6);
        assert!((hits[1].1 - 0.2).abs() < 1e-6);
        assert!((hits[2].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_truncates_to_k() {
        let mut index = FlatIndex::new(2);
        for id in 0..10 {
            index.insert(id, unit(2, (id % 2) as usize)).unwrap();
        }
        assert_eq!(index.search(&unit(2, 0), 4).len(), 4);
        assert!(index.search(&unit(2, 0), 0).is_empty());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut index = FlatIndex::new(2);
        index.insert(5, unit(2, 0)).unwrap();
        assert!(matches!(
            index.insert(5, unit(2, 1)),
            Err(MemoryError::DuplicateId(5))
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn wrong_dimension_rejected() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.insert(1, vec![1.0, 0.0]),
            Err(MemoryError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn blob_restores_vectors_and_ids() {
        let mut index = FlatIndex::new(2);
        index.insert(4, unit(2, 0)).unwrap();
        index.insert(9, unit(2, 1)).unwrap();

        let restored = FlatIndex::from_bytes(&index.to_bytes().unwrap(), 2).unwrap();
        assert_eq!(restored.len(), 2);
        let ids: Vec<u64> = restored.search(&unit(2, 0), 2).iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![4, 9]);
        assert_eq!(restored.max_id(), Some(9));
        assert_eq!(restored.search(&unit(2, 1), 1)[0].0, 9);
    }

    #[test]
    fn blob_with_other_dimension_rejected() {
        let mut index = FlatIndex::new(2);
        index.insert(1, unit(2, 0)).unwrap();
        let bytes = index.to_bytes().unwrap();
        assert!(matches!(
            FlatIndex::from_bytes(&bytes, 768),
            Err(MemoryError::DimensionMismatch { expected: 768, actual: 2 })
        ));
    }

    #[test]
    fn garbage_blob_rejected() {
        assert!(matches!(
            FlatIndex::from_bytes(b"not an index", 2),
            Err(MemoryError::IndexLoad(_))
        ));
    }
}
