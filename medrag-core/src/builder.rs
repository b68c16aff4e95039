//! Embeds chunks and builds a [`VectorBundle`] from them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bundle::VectorBundle;
use crate::config::MedragConfig;
use crate::document::ChunkRecord;
use crate::embedding::{EmbeddingProvider, conform_embedding};
use crate::error::{MedragError, Result};

/// Turns ingested chunks into a searchable bundle.
///
/// Chunks are embedded in batches of `embed_batch_size`. Every vector is
/// checked against the provider's dimension and renormalized before it is
/// inserted, so the index only ever holds unit vectors. Vector IDs follow
/// chunk order: chunk `i` becomes vector `i`.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::{HashingEmbeddingProvider, IndexBuilder, MedragConfig};
///
/// let builder = IndexBuilder::new(Arc::new(HashingEmbeddingProvider::default()), config);
/// let bundle = builder.build(report.chunks).await?;
/// bundle.save("index.medrag")?;
/// ```
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    config: MedragConfig,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: MedragConfig) -> Self {
        Self { embedder, config }
    }

    /// Embed `chunks` and index them.
    ///
    /// # Errors
    ///
    /// - [`MedragError::NoContent`] if `chunks` is empty
    /// - [`MedragError::Embedding`] if the provider fails or returns vectors
    ///   of the wrong dimension
    /// - [`MedragError::Index`] if index construction fails
    pub async fn build(&self, chunks: Vec<ChunkRecord>) -> Result<VectorBundle> {
        self.config.validate()?;
        if chunks.is_empty() {
            return Err(MedragError::NoContent { total: 0, failed: 0 });
        }

        let dimensions = self.embedder.dimensions();
        let provider = self.embedder.model_id().to_string();
        let total = chunks.len();
        let mut vectors = Vec::with_capacity(total);

        for (batch_number, batch) in chunks.chunks(self.config.embed_batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(MedragError::Embedding {
                    provider,
                    message: format!(
                        "returned {} embeddings for {} texts",
                        embeddings.len(),
                        batch.len()
                    ),
                });
            }
            for embedding in embeddings {
                vectors.push(conform_embedding(embedding, dimensions, &provider)?);
            }
            debug!(batch = batch_number + 1, embedded = vectors.len(), total, "embedded batch");
        }
        info!(vectors = vectors.len(), dimensions, model = %provider, "embedded all chunks");

        let kind = self.config.index_kind;
        let params = self.config.hnsw.clone();
        let index = tokio::task::spawn_blocking(move || {
            let mut index = kind.create(dimensions, &params)?;
            for vector in vectors {
                index.insert(vector)?;
            }
            Ok::<_, MedragError>(index)
        })
        .await
        .map_err(|e| MedragError::Internal(format!("index build task failed: {e}")))??;

        info!(kind = %kind, vectors = index.len(), "built vector index");
        VectorBundle::new(chunks, index, &provider, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbeddingProvider;
    use crate::index::IndexKind;
    use async_trait::async_trait;

    fn chunk(i: u32, text: &str) -> ChunkRecord {
        ChunkRecord { text: text.into(), source_file: "notes.txt".into(), page: 1, chunk_index: i }
    }

    #[tokio::test]
    async fn ids_follow_chunk_order() {
        let config = MedragConfig::builder()
            .embed_batch_size(2)
            .index_kind(IndexKind::Flat)
            .build()
            .unwrap();
        let builder = IndexBuilder::new(Arc::new(HashingEmbeddingProvider::default()), config);
        let chunks = vec![
            chunk(0, "aspirin reduces fever"),
            chunk(1, "insulin regulates blood sugar"),
            chunk(2, "antibiotics treat bacterial infection"),
        ];

        let bundle = builder.build(chunks.clone()).await.unwrap();
        assert_eq!(bundle.records, chunks);
        assert_eq!(bundle.manifest.vector_count, 3);
        assert_eq!(bundle.manifest.embedding_model, "fnv1a-hashing-v1");

        let query = HashingEmbeddingProvider::default().embed("insulin regulates blood sugar").await.unwrap();
        assert_eq!(bundle.index.search(&query, 1).unwrap()[0].id, 1);
    }

    struct WrongSize;

    #[async_trait]
    impl EmbeddingProvider for WrongSize {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "wrong-size"
        }
    }

    #[tokio::test]
    async fn wrong_dimension_embeddings_are_rejected() {
        let builder = IndexBuilder::new(Arc::new(WrongSize), MedragConfig::default());
        let err = builder.build(vec![chunk(0, "text")]).await.unwrap_err();
        assert!(matches!(err, MedragError::Embedding { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_no_content() {
        let builder =
            IndexBuilder::new(Arc::new(HashingEmbeddingProvider::default()), MedragConfig::default());
        assert!(matches!(builder.build(Vec::new()).await, Err(MedragError::NoContent { .. })));
    }
}
