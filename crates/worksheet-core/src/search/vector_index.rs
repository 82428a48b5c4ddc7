//! Exact in-memory vector index
//!
//! Brute-force k-nearest-neighbor search over squared Euclidean distance.
//! Sized for a single-tenant worksheet corpus; every query scans all slots.

use std::cmp::Ordering;

use parking_lot::RwLock;

use super::error::{SearchError, SearchResult};

/// Flat vector index with a slot -> page id map.
///
/// Vectors live back to back in one buffer. Slot order is insertion order,
/// which breaks distance ties (earlier insertion wins).
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: Vec<f32>,
    ids: Vec<i64>,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, page_id: i64) -> bool {
        self.ids.contains(&page_id)
    }

    /// Page ids in slot order
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    fn check_dimensions(&self, vector: &[f32]) -> SearchResult<()> {
        if vector.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Stored vectors must also be non-empty, so a zero-dimension index
    /// never holds anything.
    fn check_insertable(&self, vector: &[f32]) -> SearchResult<()> {
        if vector.is_empty() {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions.max(1),
                actual: 0,
            });
        }
        self.check_dimensions(vector)
    }

    /// Append a vector for `page_id`. The index is left untouched on error.
    pub fn add(&mut self, page_id: i64, vector: &[f32]) -> SearchResult<()> {
        self.check_insertable(vector)?;
        self.vectors.extend_from_slice(vector);
        self.ids.push(page_id);
        Ok(())
    }

    /// Up to `k` `(page_id, squared distance)` pairs, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> SearchResult<Vec<(i64, f32)>> {
        self.check_dimensions(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(slot, vector)| (slot, squared_l2(query, vector)))
            .collect();
        scored.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(slot, distance)| (self.ids[slot], distance))
            .collect())
    }

    /// Drop every vector stored for `page_id`. Returns whether anything was
    /// removed; an unknown id is not an error.
    pub fn remove(&mut self, page_id: i64) -> bool {
        let mut removed = false;
        while let Some(slot) = self.ids.iter().position(|&id| id == page_id) {
            self.ids.remove(slot);
            let start = slot * self.dimensions;
            self.vectors.drain(start..start + self.dimensions);
            removed = true;
        }
        removed
    }

    /// Replace whatever is stored for `page_id`. `None` means pure removal.
    /// A wrongly sized vector is rejected before anything is removed.
    pub fn upsert(&mut self, page_id: i64, vector: Option<&[f32]>) -> SearchResult<()> {
        if let Some(vector) = vector {
            self.check_insertable(vector)?;
        }
        self.remove(page_id);
        if let Some(vector) = vector {
            self.add(page_id, vector)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.ids.clear();
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// A [`VectorIndex`] behind a single reader/writer lock.
///
/// Searches take the read lock, every mutation takes the write lock, so a
/// search never sees a half-applied upsert or a partially rebuilt index.
/// Callers compute vectors before calling in; no I/O happens under the lock.
#[derive(Debug)]
pub struct SharedIndex {
    inner: RwLock<VectorIndex>,
}

impl SharedIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: RwLock::new(VectorIndex::new(dimensions)),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.read().dimensions()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn contains(&self, page_id: i64) -> bool {
        self.inner.read().contains(page_id)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.inner.read().ids().to_vec()
    }

    pub fn add(&self, page_id: i64, vector: &[f32]) -> SearchResult<()> {
        self.inner.write().add(page_id, vector)
    }

    pub fn search(&self, query: &[f32], k: usize) -> SearchResult<Vec<(i64, f32)>> {
        self.inner.read().search(query, k)
    }

    pub fn remove(&self, page_id: i64) -> bool {
        self.inner.write().remove(page_id)
    }

    pub fn upsert(&self, page_id: i64, vector: Option<&[f32]>) -> SearchResult<()> {
        self.inner.write().upsert(page_id, vector)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Swap in a fully built index in one step. The replacement must have
    /// the same dimensions.
    pub fn replace(&self, index: VectorIndex) -> SearchResult<()> {
        let mut guard = self.inner.write();
        if index.dimensions() != guard.dimensions() {
            return Err(SearchError::DimensionMismatch {
                expected: guard.dimensions(),
                actual: index.dimensions(),
            });
        }
        *guard = index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(points: &[(i64, [f32; 2])]) -> VectorIndex {
        let mut index = VectorIndex::new(2);
        for (id, v) in points {
            index.add(*id, v).unwrap();
        }
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        // squared distances from the origin: 0, 1, 4
        let index = index_with(&[(3, [2.0, 0.0]), (1, [0.0, 0.0]), (2, [0.0, 1.0])]);
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(1, 0.0), (2, 1.0)]);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = index_with(&[(1, [0.0, 0.0]), (2, [1.0, 0.0])]);
        assert_eq!(index.search(&[0.0, 0.0], 100).unwrap().len(), 2);
    }

    #[test]
    fn test_search_empty_index() {
        let index = VectorIndex::new(2);
        assert!(index.search(&[0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_tie_break_prefers_earlier_insertion() {
        let index = index_with(&[(7, [1.0, 0.0]), (4, [-1.0, 0.0]), (9, [0.0, 1.0])]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.0).collect();
        assert_eq!(ids, vec![7, 4, 9]);
    }

    #[test]
    fn test_search_is_deterministic() {
        let index = index_with(&[(1, [0.5, 0.5]), (2, [0.5, -0.5]), (3, [1.0, 1.0])]);
        let first = index.search(&[0.1, 0.0], 3).unwrap();
        for _ in 0..5 {
            assert_eq!(index.search(&[0.1, 0.0], 3).unwrap(), first);
        }
    }

    #[test]
    fn test_add_dimension_mismatch_leaves_index_intact() {
        let mut index = index_with(&[(1, [0.0, 0.0])]);
        let err = index.add(2, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SearchError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap(), vec![(1, 0.0)]);
    }

    #[test]
    fn test_remove_absent_id_is_noop() {
        let mut index = index_with(&[(1, [0.0, 0.0]), (2, [1.0, 0.0])]);
        let before = index.search(&[0.0, 0.0], 10).unwrap();
        assert!(!index.remove(7));
        assert_eq!(index.search(&[0.0, 0.0], 10).unwrap(), before);
    }

    #[test]
    fn test_remove_makes_id_unreachable() {
        let mut index = index_with(&[(1, [0.0, 0.0]), (2, [1.0, 0.0]), (3, [2.0, 0.0])]);
        assert!(index.remove(2));
        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        assert!(hits.iter().all(|(id, _)| *id != 2));
        // remaining slots keep their vectors
        assert_eq!(hits, vec![(1, 1.0), (3, 1.0)]);
    }

    #[test]
    fn test_upsert_replaces_and_removes() {
        let mut index = index_with(&[(1, [0.0, 0.0]), (2, [5.0, 0.0])]);
        index.upsert(1, Some(&[9.0, 0.0])).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.search(&[9.0, 0.0], 1).unwrap(), vec![(1, 0.0)]);

        index.upsert(1, None).unwrap();
        assert!(!index.contains(1));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_upsert_bad_vector_keeps_old_entry() {
        let mut index = index_with(&[(1, [0.0, 0.0])]);
        assert!(index.upsert(1, Some(&[1.0])).is_err());
        assert!(index.contains(1));
    }

    #[test]
    fn test_zero_dimension_index_stays_empty() {
        let mut index = VectorIndex::new(0);
        assert!(matches!(
            index.add(1, &[]),
            Err(SearchError::DimensionMismatch { actual: 0, .. })
        ));
        assert!(index.upsert(1, Some(&[])).is_err());
        assert!(index.is_empty());
        assert!(index.search(&[], 1).unwrap().is_empty());
    }

    #[test]
    fn test_shared_replace_rejects_other_dimensions() {
        let shared = SharedIndex::new(2);
        shared.add(1, &[0.0, 0.0]).unwrap();
        assert!(shared.replace(VectorIndex::new(3)).is_err());
        assert_eq!(shared.len(), 1);

        let mut fresh = VectorIndex::new(2);
        fresh.add(5, &[1.0, 1.0]).unwrap();
        shared.replace(fresh).unwrap();
        assert_eq!(shared.ids(), vec![5]);
    }

    #[test]
    fn test_shared_concurrent_search_sees_whole_entries() {
        use std::sync::Arc;

        let shared = Arc::new(SharedIndex::new(2));
        let writer = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    shared.upsert(1, Some(&[i as f32, 0.0])).unwrap();
                }
            })
        };
        for _ in 0..200 {
            let hits = shared.search(&[0.0, 0.0], 10).unwrap();
            assert!(hits.len() <= 1);
        }
        writer.join().unwrap();
        assert_eq!(shared.ids(), vec![1]);
    }
}
