//! Configuration for ingestion and retrieval.

use serde::{Deserialize, Serialize};

use crate::error::{MedragError, Result};
use crate::index::{HnswParams, IndexKind};

/// Configuration parameters shared by the ingestion pipeline and the retrieval service.
///
/// The chunking defaults are deliberately smaller than generic RAG defaults:
/// reference texts run to thousands of pages, so finer chunks keep retrieval
/// precise and bound the size of the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MedragConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of results returned when the caller does not ask for a specific `k`.
    pub top_k: usize,
    /// Upper bound on the `k` a caller may request.
    pub max_top_k: usize,
    /// Questions shorter than this (in characters, after trimming) are rejected.
    pub min_query_chars: usize,
    /// Number of chunk texts sent to the embedding provider per call.
    pub embed_batch_size: usize,
    /// Maximum number of documents loaded and chunked concurrently.
    pub ingest_concurrency: usize,
    /// Which index structure to build.
    pub index_kind: IndexKind,
    /// Graph parameters, used when `index_kind` is [`IndexKind::Hnsw`].
    pub hnsw: HnswParams,
}

impl Default for MedragConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            max_top_k: 50,
            min_query_chars: 5,
            embed_batch_size: 64,
            ingest_concurrency: std::thread::available_parallelism().map_or(4, |n| n.get()),
            index_kind: IndexKind::Hnsw,
            hnsw: HnswParams::default(),
        }
    }
}

impl MedragConfig {
    /// Create a new builder for constructing a [`MedragConfig`].
    pub fn builder() -> MedragConfigBuilder {
        MedragConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `top_k > max_top_k`
    /// - `embed_batch_size == 0` or `ingest_concurrency == 0`
    /// - the HNSW parameters are degenerate
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(MedragError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(MedragError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(MedragError::Config("top_k must be greater than zero".to_string()));
        }
        if self.top_k > self.max_top_k {
            return Err(MedragError::Config(format!(
                "top_k ({}) must not exceed max_top_k ({})",
                self.top_k, self.max_top_k
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(MedragError::Config(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.ingest_concurrency == 0 {
            return Err(MedragError::Config(
                "ingest_concurrency must be greater than zero".to_string(),
            ));
        }
        self.hnsw.validate()
    }
}

/// Builder for constructing a validated [`MedragConfig`].
#[derive(Debug, Clone, Default)]
pub struct MedragConfigBuilder {
    config: MedragConfig,
}

impl MedragConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of results per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the largest `k` a caller may request.
    pub fn max_top_k(mut self, k: usize) -> Self {
        self.config.max_top_k = k;
        self
    }

    /// Set the minimum accepted question length in characters.
    pub fn min_query_chars(mut self, chars: usize) -> Self {
        self.config.min_query_chars = chars;
        self
    }

    /// Set how many chunk texts are embedded per provider call.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many documents are processed concurrently during ingestion.
    pub fn ingest_concurrency(mut self, workers: usize) -> Self {
        self.config.ingest_concurrency = workers;
        self
    }

    /// Set the index structure to build.
    pub fn index_kind(mut self, kind: IndexKind) -> Self {
        self.config.index_kind = kind;
        self
    }

    /// Set the HNSW graph parameters.
    pub fn hnsw(mut self, params: HnswParams) -> Self {
        self.config.hnsw = params;
        self
    }

    /// Build the [`MedragConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`MedragConfig::validate`].
    pub fn build(self) -> Result<MedragConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_corpus_tuning() {
        let config = MedragConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.min_query_chars, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = MedragConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, MedragError::Config(_)));
    }

    #[test]
    fn top_k_bounds_are_enforced() {
        assert!(MedragConfig::builder().top_k(0).build().is_err());
        assert!(MedragConfig::builder().top_k(10).max_top_k(5).build().is_err());
        assert!(MedragConfig::builder().top_k(5).max_top_k(5).build().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: MedragConfig =
            serde_json::from_str(r#"{"chunk_size": 800, "index_kind": "flat"}"#).unwrap();
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.index_kind, IndexKind::Flat);
    }
}
