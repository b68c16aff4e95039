//! Exact inner-product index.
//!
//! [`FlatIndex`] keeps every vector in one contiguous buffer and scores all of
//! them on each query. A query costs O(N·D); at 10⁶ vectors of 384 floats that
//! is roughly 4·10⁸ multiply-adds, fine for batch evaluation and small corpora
//! but not for interactive serving at that scale. Use
//! [`HnswIndex`](super::HnswIndex) there.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::codec::{ByteReader, put_f32s, put_u32, put_u64};
use crate::embedding::dot;
use crate::error::{IndexLoadError, MedragError, Result};

use super::{IndexKind, Neighbor, Ranked, VectorIndex, check_query, check_vector, sort_ranked};

/// An exact brute-force vector index.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::index::{FlatIndex, VectorIndex};
///
/// let mut index = FlatIndex::new(384)?;
/// let id = index.insert(embedding)?;
/// let hits = index.search(&query, 5)?;
/// ```
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for `dimensions`-component vectors.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(MedragError::Index("index dimensions must be non-zero".to_string()));
        }
        Ok(Self { dimensions, vectors: Vec::new() })
    }

    /// Decode an index written by [`VectorIndex::encode`].
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, IndexLoadError> {
        let mut reader = ByteReader::new(bytes);
        let dimensions = reader.u32("flat index dimensions")? as usize;
        let count = reader.len("flat index vector count")?;
        if dimensions == 0 {
            return Err(IndexLoadError::Corrupt("flat index has zero dimensions".to_string()));
        }
        let total = count
            .checked_mul(dimensions)
            .ok_or_else(|| IndexLoadError::Corrupt("flat index size overflows".to_string()))?;
        let vectors = reader.f32s(total, "flat index vectors")?;
        reader.finish("flat index")?;
        Ok(Self { dimensions, vectors })
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.vectors.len() / self.dimensions
    }

    fn insert(&mut self, vector: Vec<f32>) -> Result<u32> {
        check_vector(&vector, self.dimensions)?;
        let id = u32::try_from(self.len())
            .map_err(|_| MedragError::Index("flat index is full".to_string()))?;
        self.vectors.extend_from_slice(&vector);
        Ok(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_query(query, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Min-heap of the best k seen so far; the root is the weakest keeper.
        let mut best: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
        for (id, vector) in self.vectors.chunks_exact(self.dimensions).enumerate() {
            let candidate = Ranked(Neighbor { id: id as u32, score: dot(query, vector) });
            if best.len() < k {
                best.push(Reverse(candidate));
            } else if best.peek().is_some_and(|Reverse(weakest)| candidate > *weakest) {
                best.pop();
                best.push(Reverse(candidate));
            }
        }

        let mut neighbors: Vec<Neighbor> = best.into_iter().map(|Reverse(r)| r.0).collect();
        sort_ranked(&mut neighbors);
        Ok(neighbors)
    }

    fn vector(&self, id: u32) -> Option<&[f32]> {
        let start = (id as usize).checked_mul(self.dimensions)?;
        self.vectors.get(start..start + self.dimensions)
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(12 + self.vectors.len() * 4);
        put_u32(&mut buffer, self.dimensions as u32);
        put_u64(&mut buffer, self.len() as u64);
        put_f32s(&mut buffer, &self.vectors);
        buffer
    }
}
