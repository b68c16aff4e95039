//! HNSW (Hierarchical Navigable Small World) index.
//!
//! A multi-layer proximity graph for approximate nearest-neighbor search:
//! - higher layers hold exponentially fewer nodes
//! - a search greedily descends from the top layer to layer 0
//! - layer 0 is searched with a beam of width `ef`
//!
//! Insert and search are O(log N) on average; memory is O(N·M). Level
//! assignment uses a seeded LCG, so inserting the same vectors in the same
//! order always produces the same graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, put_f32s, put_u8, put_u32, put_u64};
use crate::embedding::dot;
use crate::error::{IndexLoadError, MedragError, Result};

use super::{IndexKind, Neighbor, Ranked, VectorIndex, check_query, check_vector, sort_ranked};

const MAX_LEVEL: u8 = 16;
const NO_ENTRY: u32 = u32::MAX;

/// Graph construction and search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Neighbors linked per node on each upper layer (layer 0 allows `2 * m`).
    pub m: usize,
    /// Beam width while inserting.
    pub ef_construction: usize,
    /// Beam width while querying; raised to `k` when a query asks for more.
    pub ef_search: usize,
    /// Seed of the level generator.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { m: 16, ef_construction: 200, ef_search: 64, seed: 42 }
    }
}

impl HnswParams {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(MedragError::Config("hnsw.m must be at least 2".to_string()));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(MedragError::Config(
                "hnsw.ef_construction and hnsw.ef_search must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An approximate inner-product index over unit vectors.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::index::{HnswIndex, HnswParams, VectorIndex};
///
/// let mut index = HnswIndex::new(384, HnswParams::default())?;
/// index.insert(embedding)?;
/// let hits = index.search(&query, 5)?;
/// ```
#[derive(Debug, Clone)]
pub struct HnswIndex {
    params: HnswParams,
    level_mult: f64,
    dimensions: usize,
    vectors: Vec<f32>,
    /// `links[node][layer]` for layers `0..=level(node)`.
    links: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u32>,
    top_level: u8,
    rng_state: u64,
}

impl HnswIndex {
    /// Create an empty graph for `dimensions`-component vectors.
    pub fn new(dimensions: usize, params: HnswParams) -> Result<Self> {
        if dimensions == 0 {
            return Err(MedragError::Index("index dimensions must be non-zero".to_string()));
        }
        params.validate()?;
        Ok(Self {
            level_mult: 1.0 / (params.m as f64).ln(),
            rng_state: params.seed,
            params,
            dimensions,
            vectors: Vec::new(),
            links: Vec::new(),
            entry_point: None,
            top_level: 0,
        })
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Decode a graph written by [`VectorIndex::encode`].
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, IndexLoadError> {
        let mut reader = ByteReader::new(bytes);
        let dimensions = reader.u32("hnsw dimensions")? as usize;
        let count = reader.len("hnsw node count")?;
        let params = HnswParams {
            m: reader.u32("hnsw m")? as usize,
            ef_construction: reader.u32("hnsw ef_construction")? as usize,
            ef_search: reader.u32("hnsw ef_search")? as usize,
            seed: reader.u64("hnsw seed")?,
        };
        let top_level = reader.u8("hnsw top level")?;
        let entry_raw = reader.u32("hnsw entry point")?;

        let mut index = HnswIndex::new(dimensions, params)
            .map_err(|e| IndexLoadError::Corrupt(format!("invalid hnsw header: {e}")))?;
        index.top_level = top_level;
        index.entry_point = (entry_raw != NO_ENTRY).then_some(entry_raw);
        index.vectors.reserve(count.saturating_mul(dimensions));
        index.links.reserve(count);

        for node in 0..count {
            let level = reader.u8("hnsw node level")?;
            if level > top_level {
                return Err(IndexLoadError::Corrupt(format!(
                    "node {node} level {level} above top level {top_level}"
                )));
            }
            index.vectors.extend(reader.f32s(dimensions, "hnsw node vector")?);
            let mut layers = Vec::with_capacity(level as usize + 1);
            for _ in 0..=level {
                let degree = reader.u32("hnsw neighbor count")? as usize;
                let mut neighbors = Vec::with_capacity(degree);
                for _ in 0..degree {
                    let neighbor = reader.u32("hnsw neighbor id")?;
                    if neighbor as usize >= count {
                        return Err(IndexLoadError::Corrupt(format!(
                            "node {node} links to missing node {neighbor}"
                        )));
                    }
                    neighbors.push(neighbor);
                }
                layers.push(neighbors);
            }
            index.links.push(layers);
        }
        reader.finish("hnsw index")?;

        for (node, layers) in index.links.iter().enumerate() {
            for (layer, neighbors) in layers.iter().enumerate() {
                if let Some(&neighbor) =
                    neighbors.iter().find(|&&n| index.links[n as usize].len() <= layer)
                {
                    return Err(IndexLoadError::Corrupt(format!(
                        "node {node} links to node {neighbor} on layer {layer}, above its level"
                    )));
                }
            }
        }

        match index.entry_point {
            Some(ep) if ep as usize >= count => {
                return Err(IndexLoadError::Corrupt(format!("entry point {ep} out of range")));
            }
            None if count > 0 => {
                return Err(IndexLoadError::Corrupt("non-empty graph without entry point".into()));
            }
            _ => {}
        }
        Ok(index)
    }

    fn node_vector(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimensions;
        &self.vectors[start..start + self.dimensions]
    }

    fn level_of(&self, id: u32) -> usize {
        self.links[id as usize].len() - 1
    }

    fn score(&self, id: u32, query: &[f32]) -> Ranked {
        Ranked(Neighbor { id, score: dot(self.node_vector(id), query) })
    }

    /// Draw a level from the exponential distribution `floor(-ln(U) * 1/ln(M))`.
    fn select_level(&mut self) -> u8 {
        self.rng_state = self.rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let uniform = ((self.rng_state >> 11) as f64 / (1u64 << 53) as f64).max(1e-12);
        let level = (-uniform.ln() * self.level_mult).floor();
        (level as u8).min(MAX_LEVEL)
    }

    /// Follow strictly better neighbors on one layer until none is left.
    fn greedy_closest(&self, query: &[f32], entry: u32, layer: usize) -> u32 {
        let mut current = self.score(entry, query);
        loop {
            let mut improved = false;
            for &neighbor in &self.links[current.0.id as usize][layer] {
                let candidate = self.score(neighbor, query);
                if candidate > current {
                    current = candidate;
                    improved = true;
                }
            }
            if !improved {
                return current.0.id;
            }
        }
    }

    /// Beam search on one layer; returns up to `ef` nodes, best first.
    fn search_layer(&self, query: &[f32], entry: u32, ef: usize, layer: usize) -> Vec<Neighbor> {
        let mut visited: HashSet<u32> = HashSet::new();
        // Explore best candidates first.
        let mut candidates: BinaryHeap<Ranked> = BinaryHeap::new();
        // Keep the best `ef`; the root is the weakest kept result.
        let mut results: BinaryHeap<Reverse<Ranked>> = BinaryHeap::new();

        let start = self.score(entry, query);
        visited.insert(entry);
        candidates.push(start);
        results.push(Reverse(start));

        while let Some(candidate) = candidates.pop() {
            let weakest = results.peek().map(|Reverse(r)| *r);
            if results.len() >= ef && weakest.is_some_and(|w| candidate < w) {
                break;
            }

            for &neighbor in &self.links[candidate.0.id as usize][layer] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = self.score(neighbor, query);
                let admit = results.len() < ef
                    || results.peek().is_some_and(|Reverse(weakest)| scored > *weakest);
                if admit {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut neighbors: Vec<Neighbor> = results.into_iter().map(|Reverse(r)| r.0).collect();
        sort_ranked(&mut neighbors);
        neighbors
    }

    fn link(&mut self, from: u32, to: u32, layer: usize) {
        let neighbors = &mut self.links[from as usize][layer];
        if !neighbors.contains(&to) {
            neighbors.push(to);
        }
    }

    /// Keep only the `max_degree` closest neighbors of `node` on `layer`.
    fn prune(&mut self, node: u32, layer: usize, max_degree: usize) {
        if self.links[node as usize][layer].len() <= max_degree {
            return;
        }
        let base = self.node_vector(node);
        let mut scored: Vec<Neighbor> = self.links[node as usize][layer]
            .iter()
            .map(|&id| Neighbor { id, score: dot(self.node_vector(id), base) })
            .collect();
        sort_ranked(&mut scored);
        scored.truncate(max_degree);
        self.links[node as usize][layer] = scored.into_iter().map(|n| n.id).collect();
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn insert(&mut self, vector: Vec<f32>) -> Result<u32> {
        check_vector(&vector, self.dimensions)?;
        let id = u32::try_from(self.len())
            .ok()
            .filter(|id| *id != NO_ENTRY)
            .ok_or_else(|| MedragError::Index("hnsw index is full".to_string()))?;

        let level = self.select_level();
        self.vectors.extend_from_slice(&vector);
        self.links.push(vec![Vec::new(); level as usize + 1]);

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.top_level = level;
            return Ok(id);
        };

        // Phase 1: greedy descent through the layers above the new node.
        for layer in (level as usize + 1..=self.top_level as usize).rev() {
            entry = self.greedy_closest(&vector, entry, layer);
        }

        // Phase 2: connect the node on every layer it lives on.
        for layer in (0..=level.min(self.top_level) as usize).rev() {
            let found = self.search_layer(&vector, entry, self.params.ef_construction, layer);
            let max_degree = if layer == 0 { self.params.m * 2 } else { self.params.m };

            for neighbor in found.iter().filter(|n| n.id != id).take(self.params.m) {
                self.link(id, neighbor.id, layer);
                self.link(neighbor.id, id, layer);
                self.prune(neighbor.id, layer, max_degree);
            }
            if let Some(best) = found.first() {
                entry = best.id;
            }
        }

        if level > self.top_level {
            self.entry_point = Some(id);
            self.top_level = level;
        }
        Ok(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_query(query, self.dimensions)?;
        let Some(mut entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        for layer in (1..=self.top_level as usize).rev() {
            if layer <= self.level_of(entry) {
                entry = self.greedy_closest(query, entry, layer);
            }
        }

        let ef = self.params.ef_search.max(k);
        let mut neighbors = self.search_layer(query, entry, ef, 0);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn vector(&self, id: u32) -> Option<&[f32]> {
        ((id as usize) < self.len()).then(|| self.node_vector(id))
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(
            37 + self.vectors.len() * 4 + self.len() * (1 + self.params.m * 2 * 4),
        );
        put_u32(&mut buffer, self.dimensions as u32);
        put_u64(&mut buffer, self.len() as u64);
        put_u32(&mut buffer, self.params.m as u32);
        put_u32(&mut buffer, self.params.ef_construction as u32);
        put_u32(&mut buffer, self.params.ef_search as u32);
        put_u64(&mut buffer, self.params.seed);
        put_u8(&mut buffer, self.top_level);
        put_u32(&mut buffer, self.entry_point.unwrap_or(NO_ENTRY));

        for (node, layers) in self.links.iter().enumerate() {
            put_u8(&mut buffer, (layers.len() - 1) as u8);
            put_f32s(&mut buffer, self.node_vector(node as u32));
            for neighbors in layers {
                put_u32(&mut buffer, neighbors.len() as u32);
                for &neighbor in neighbors {
                    put_u32(&mut buffer, neighbor);
                }
            }
        }
        buffer
    }
}
