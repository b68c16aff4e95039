//! Vector indexes for k-nearest-neighbor search by inner product.
//!
//! Two structures sit behind the [`VectorIndex`] trait:
//!
//! - [`FlatIndex`]: exact brute-force scan, O(N·D) per query
//! - [`HnswIndex`]: approximate hierarchical navigable small-world graph,
//!   roughly O(log N) per query, for corpora of 10⁵–10⁶ chunks
//!
//! Both expect unit-length vectors, so the inner product they rank by is the
//! cosine similarity. Results are ordered by descending score; equal scores
//! keep insertion order (lower ID first).

mod flat;
mod hnsw;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IndexLoadError, MedragError, Result};

pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};

/// A neighbor returned by a search: the vector ID and its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Stable ID assigned at insertion (`0..N`).
    pub id: u32,
    /// Inner product with the query.
    pub score: f32,
}

/// Total ranking order on neighbors: a greater `Ranked` is a better match.
///
/// Higher score wins; on equal scores the lower (earlier inserted) ID wins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ranked(pub(crate) Neighbor);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score).then_with(|| other.0.id.cmp(&self.0.id))
    }
}

/// Sort neighbors best first.
pub(crate) fn sort_ranked(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| Ranked(*b).cmp(&Ranked(*a)));
}

/// A searchable collection of unit vectors with dense IDs `0..len()`.
///
/// Indexes are built once with [`insert`](VectorIndex::insert) and are then
/// shared read-only: `search` takes `&self`, so any number of queries may run
/// against the same index concurrently without locking.
pub trait VectorIndex: Send + Sync + fmt::Debug {
    /// Which structure this is.
    fn kind(&self) -> IndexKind;

    /// Number of components in each stored vector.
    fn dimensions(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector and return its ID (always the previous `len()`).
    fn insert(&mut self, vector: Vec<f32>) -> Result<u32>;

    /// Return up to `k` nearest vectors to `query`, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// The stored vector with the given ID.
    fn vector(&self, id: u32) -> Option<&[f32]>;

    /// Serialize the index for an index bundle.
    fn encode(&self) -> Vec<u8>;
}

/// The index structures a bundle can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact brute-force scan.
    Flat,
    /// Approximate HNSW graph.
    #[default]
    Hnsw,
}

impl IndexKind {
    /// Create an empty index of this kind.
    pub fn create(self, dimensions: usize, params: &HnswParams) -> Result<Box<dyn VectorIndex>> {
        Ok(match self {
            IndexKind::Flat => Box::new(FlatIndex::new(dimensions)?),
            IndexKind::Hnsw => Box::new(HnswIndex::new(dimensions, params.clone())?),
        })
    }

    /// Decode an index of this kind from bytes written by [`VectorIndex::encode`].
    pub fn decode(self, bytes: &[u8]) -> std::result::Result<Box<dyn VectorIndex>, IndexLoadError> {
        Ok(match self {
            IndexKind::Flat => Box::new(FlatIndex::decode(bytes)?),
            IndexKind::Hnsw => Box::new(HnswIndex::decode(bytes)?),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = MedragError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(IndexKind::Flat),
            "hnsw" => Ok(IndexKind::Hnsw),
            other => Err(MedragError::Config(format!(
                "unknown index kind '{other}' (expected 'flat' or 'hnsw')"
            ))),
        }
    }
}

fn check_query(query: &[f32], dimensions: usize) -> Result<()> {
    if query.len() != dimensions {
        return Err(MedragError::Index(format!(
            "query has {} dimensions, index has {dimensions}",
            query.len()
        )));
    }
    Ok(())
}

fn check_vector(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.len() != dimensions {
        return Err(MedragError::Index(format!(
            "vector has {} dimensions, index has {dimensions}",
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(MedragError::Index("vector contains non-finite values".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_prefers_score_then_insertion_order() {
        let mut neighbors = vec![
            Neighbor { id: 3, score: 0.5 },
            Neighbor { id: 1, score: 0.9 },
            Neighbor { id: 2, score: 0.5 },
            Neighbor { id: 0, score: -0.1 },
        ];
        sort_ranked(&mut neighbors);
        let ids: Vec<u32> = neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 0]);
    }

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("HNSW".parse::<IndexKind>().unwrap(), IndexKind::Hnsw);
        assert_eq!(IndexKind::Flat.to_string(), "flat");
        assert!("faiss".parse::<IndexKind>().is_err());
    }
}
