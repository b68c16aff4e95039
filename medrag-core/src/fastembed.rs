//! Local sentence embeddings through the `fastembed` crate.
//!
//! [`FastEmbedProvider`] runs `all-MiniLM-L6-v2` in-process on ONNX Runtime:
//! 384 dimensions, mean-pooled and normalized, the same model medical
//! bundles are built with when an embeddings server is used instead. The
//! model files are fetched from Hugging Face on first use and cached.
//!
//! This module is only available when the `fastembed` feature is enabled.

use std::path::PathBuf;
use std::sync::Arc;

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::embedding::{EmbeddingProvider, conform_embedding};
use crate::error::{MedragError, Result};

/// Model id recorded in bundles built with this provider.
pub const MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Output dimensionality of [`MODEL_ID`].
pub const DIMENSIONS: usize = 384;

const PROVIDER: &str = "FastEmbed";

/// An [`EmbeddingProvider`] running `all-MiniLM-L6-v2` locally.
///
/// Inference is CPU-bound, so every call runs on the blocking pool. The
/// session is shared behind a mutex; clones share the same loaded model.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::fastembed::FastEmbedProvider;
///
/// let provider = FastEmbedProvider::load(None).await?;
/// let embedding = provider.embed("high blood pressure").await?;
/// assert_eq!(embedding.len(), 384);
/// ```
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider").field("model", &MODEL_ID).finish_non_exhaustive()
    }
}

impl FastEmbedProvider {
    /// Load the model, downloading it into `cache_dir` (or the `fastembed`
    /// default cache) if needed.
    ///
    /// This blocks on file and network I/O; prefer [`load`](Self::load) from
    /// async code.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Embedding`] if the model cannot be fetched or
    /// the ONNX session cannot be created.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(options)
            .map_err(|e| embedding_error(format!("failed to initialize {MODEL_ID}: {e}")))?;
        info!(model = MODEL_ID, dimensions = DIMENSIONS, "fastembed model loaded");
        Ok(Self { model: Arc::new(Mutex::new(model)) })
    }

    /// [`new`](Self::new) on the blocking pool.
    pub async fn load(cache_dir: Option<PathBuf>) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::new(cache_dir))
            .await
            .map_err(|e| MedragError::Internal(format!("model load task failed: {e}")))?
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let count = texts.len();
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model.blocking_lock();
            model.embed(texts, None)
        })
        .await
        .map_err(|e| MedragError::Internal(format!("embedding task failed: {e}")))?
        .map_err(|e| embedding_error(format!("inference failed: {e}")))?;

        if embeddings.len() != count {
            return Err(embedding_error(format!(
                "expected {count} embeddings, got {}",
                embeddings.len()
            )));
        }
        debug!(count, "fastembed batch embedded");
        embeddings.into_iter().map(|v| conform_embedding(v, DIMENSIONS, PROVIDER)).collect()
    }
}

fn embedding_error(message: String) -> MedragError {
    MedragError::Embedding { provider: PROVIDER.to_string(), message }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| embedding_error("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.iter().map(ToString::to_string).collect()).await
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }
}
