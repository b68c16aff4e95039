//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::{MedragError, Result};

/// Tolerance on ‖v‖₂ − 1 within which a vector counts as unit length.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// A provider that generates unit-length vector embeddings from text input.
///
/// Implementations must be deterministic (same text, same vector) and must
/// return vectors of exactly [`dimensions`](EmbeddingProvider::dimensions)
/// components with unit L2 norm: the indexes rank by inner product, which
/// equals cosine similarity only under that invariant.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// let provider = HashingEmbeddingProvider::default();
/// let embedding = provider.embed("chest pain on exertion").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A stable identifier of the model, recorded in index bundles.
    fn model_id(&self) -> &str;
}

/// Scale `vector` to unit L2 norm in place.
///
/// # Errors
///
/// Returns [`MedragError::Embedding`] if the vector is all zeros or contains
/// non-finite components.
pub fn normalize_embedding(vector: &mut [f32], provider: &str) -> Result<()> {
    let norm = l2_norm(vector);
    if !norm.is_finite() || norm == 0.0 {
        return Err(MedragError::Embedding {
            provider: provider.to_string(),
            message: format!("cannot normalize vector with norm {norm}"),
        });
    }
    if (norm - 1.0).abs() > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    Ok(())
}

/// Euclidean length of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Inner product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Whether `vector` satisfies the unit-norm invariant.
pub fn is_unit_length(vector: &[f32]) -> bool {
    (l2_norm(vector) - 1.0).abs() <= NORM_TOLERANCE
}

/// Check an embedding returned by a provider against the expected dimension
/// and renormalize it if it drifted from unit length.
pub(crate) fn conform_embedding(
    mut vector: Vec<f32>,
    dimensions: usize,
    provider: &str,
) -> Result<Vec<f32>> {
    if vector.len() != dimensions {
        return Err(MedragError::Embedding {
            provider: provider.to_string(),
            message: format!(
                "expected {dimensions}-dimensional embedding, got {}",
                vector.len()
            ),
        });
    }
    if !is_unit_length(&vector) {
        normalize_embedding(&mut vector, provider)?;
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize_embedding(&mut v, "test").unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(is_unit_length(&v));
    }

    #[test]
    fn zero_vector_cannot_be_normalized() {
        let mut v = vec![0.0; 8];
        assert!(matches!(
            normalize_embedding(&mut v, "test"),
            Err(MedragError::Embedding { .. })
        ));
    }

    #[test]
    fn conform_rejects_wrong_dimension() {
        assert!(conform_embedding(vec![1.0, 0.0], 3, "test").is_err());
        let v = conform_embedding(vec![2.0, 0.0, 0.0], 3, "test").unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }
}
