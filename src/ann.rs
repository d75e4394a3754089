//! In-memory ANN Index: a brute-force inner-product scan over unit-norm
//! embeddings.
//!
//! A flat scan is the documented baseline for this kind of dense
//! retrieval and stays correct at the corpus sizes this crate targets
//! (no approximate structure is substituted, so recall is always exact).
//! `rebuild` takes a full `Store` scan, defensively re-normalizes each
//! row, and publishes the new snapshot behind an `ArcSwap` so concurrent
//! `search` calls never observe a half-built index.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use arc_swap::ArcSwap;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

const NORM_TOLERANCE: f32 = 1e-3;

/// A single immutable snapshot of the vector population.
struct Snapshot {
    ids: Vec<i32>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

impl Snapshot {
    fn empty() -> Self {
        Snapshot {
            ids: Vec::new(),
            vectors: Vec::new(),
            dim: 0,
        }
    }
}

/// Atomically-swappable approximate-nearest-neighbor index.
pub struct AnnIndex {
    current: ArcSwap<Snapshot>,
}

impl Default for AnnIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnIndex {
    pub fn new() -> Self {
        AnnIndex {
            current: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Full scan of `store`, defensive L2-renormalization, and atomic
    /// publication of the new snapshot. Rows with the wrong dimension
    /// relative to the first valid row seen are skipped with a warning
    /// (the store itself already skips blobs of the wrong byte length).
    pub fn rebuild(&self, store: &Store) -> CoreResult<()> {
        let photos = store.scan()?;

        let mut ids = Vec::with_capacity(photos.len());
        let mut vectors = Vec::with_capacity(photos.len());
        let mut dim = 0usize;

        for photo in photos {
            if dim == 0 {
                dim = photo.embedding.len();
            }
            if photo.embedding.len() != dim {
                tracing::warn!(
                    id = photo.id,
                    expected = dim,
                    actual = photo.embedding.len(),
                    "skipping photo with mismatched embedding dimension at rebuild"
                );
                continue;
            }
            ids.push(photo.id);
            vectors.push(normalize(&photo.embedding));
        }

        info!(count = ids.len(), dim, "ann index rebuilt");
        self.current.store(Arc::new(Snapshot { ids, vectors, dim }));
        Ok(())
    }

    /// Number of vectors in the currently published snapshot.
    pub fn size(&self) -> usize {
        self.current.load().ids.len()
    }

    /// Up to `k` nearest neighbors of `q` by cosine similarity, sorted by
    /// descending score. `q` is assumed unit norm; the index still
    /// tolerates a non-unit query by treating score as plain dot product
    /// against the stored unit vectors.
    pub fn search(&self, q: &[f32], k: usize) -> CoreResult<Vec<(i32, f32)>> {
        let snapshot = self.current.load();
        if snapshot.dim != 0 && q.len() != snapshot.dim {
            return Err(CoreError::DimensionMismatch {
                expected: snapshot.dim,
                actual: q.len(),
            });
        }
        if snapshot.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(i32, f32)> = snapshot
            .ids
            .par_iter()
            .zip(snapshot.vectors.par_iter())
            .map(|(&id, v)| (id, dot(q, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Search restricted to a caller-supplied candidate set, used by the
    /// Search Engine after the metadata filter has narrowed `S`.
    pub fn search_within(
        &self,
        q: &[f32],
        k: usize,
        candidates: &std::collections::HashSet<i32>,
    ) -> CoreResult<Vec<(i32, f32)>> {
        let snapshot = self.current.load();
        if snapshot.dim != 0 && q.len() != snapshot.dim {
            return Err(CoreError::DimensionMismatch {
                expected: snapshot.dim,
                actual: q.len(),
            });
        }

        let mut scored: Vec<(i32, f32)> = snapshot
            .ids
            .par_iter()
            .zip(snapshot.vectors.par_iter())
            .filter(|(id, _)| candidates.contains(id))
            .map(|(&id, v)| (id, dot(q, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// The stored (already unit-norm) embedding for `id`, if present in
    /// the current snapshot.
    pub fn vector_for(&self, id: i32) -> Option<Vec<f32>> {
        let snapshot = self.current.load();
        snapshot
            .ids
            .iter()
            .position(|&x| x == id)
            .map(|i| snapshot.vectors[i].clone())
    }

    /// All `(id, vector)` pairs in the current snapshot, used by the
    /// visual recommender's K-means clustering.
    pub fn all_vectors(&self) -> Vec<(i32, Vec<f32>)> {
        let snapshot = self.current.load();
        snapshot
            .ids
            .iter()
            .cloned()
            .zip(snapshot.vectors.iter().cloned())
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2-normalize `v`; if its norm is already within tolerance of 1 this is
/// a near no-op, otherwise it defensively corrects drift.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < NORM_TOLERANCE {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn unit(seed: f32, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[0] = seed;
        v[1] = (1.0 - seed * seed).max(0.0).sqrt();
        v
    }

    fn populated_store(n: usize) -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path().to_str().unwrap()).unwrap();
        for i in 0..n {
            let seed = (i as f32) / (n as f32 + 1.0);
            store
                .put(
                    &format!("file:///{i}.jpg"),
                    "2024-01-01T00:00:00Z",
                    None,
                    None,
                    None,
                    &unit(seed, 8),
                    "{}",
                )
                .unwrap();
        }
        (store, file)
    }

    #[test]
    fn test_rebuild_size_matches_valid_rows() {
        let (store, _file) = populated_store(10);
        let index = AnnIndex::new();
        index.rebuild(&store).unwrap();
        assert_eq!(index.size(), store.count().unwrap() as usize);
    }

    #[test]
    fn test_search_returns_descending_scores() {
        let (store, _file) = populated_store(20);
        let index = AnnIndex::new();
        index.rebuild(&store).unwrap();

        let q = unit(0.5, 8);
        let results = index.search(&q, 5).unwrap();
        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let (store, _file) = populated_store(3);
        let index = AnnIndex::new();
        index.rebuild(&store).unwrap();

        let bad_q = vec![0.0f32; 3];
        match index.search(&bad_q, 1) {
            Err(CoreError::DimensionMismatch { .. }) => {}
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_index_search_is_empty() {
        let index = AnnIndex::new();
        assert_eq!(index.size(), 0);
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap(), Vec::new());
    }

    #[test]
    fn test_search_within_restricts_candidates() {
        let (store, _file) = populated_store(10);
        let index = AnnIndex::new();
        index.rebuild(&store).unwrap();

        let candidates: std::collections::HashSet<i32> = [1, 2, 3].into_iter().collect();
        let q = unit(0.5, 8);
        let results = index.search_within(&q, 10, &candidates).unwrap();
        assert!(results.len() <= 3);
        for (id, _) in &results {
            assert!(candidates.contains(id));
        }
    }

    #[test]
    fn test_normalize_is_idempotent_on_unit_vector() {
        let v = unit(0.5, 8);
        let once = normalize(&v);
        let twice = normalize(&once);
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
