//! Deterministic lexical embeddings based on signed feature hashing.
//!
//! [`HashingEmbeddingProvider`] needs no model download and no network. It
//! maps word unigrams, word bigrams and character trigrams into a fixed
//! number of buckets, so passages that share vocabulary land close together;
//! passages that share only meaning do not. It backs the test suites and
//! fully offline builds. Semantic retrieval uses a sentence-embedding model
//! (the `fastembed` or `openai` features). Bundles record the model id, and a
//! bundle can only be served by a provider of the same dimension.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::trace;

use crate::embedding::{EmbeddingProvider, normalize_embedding};
use crate::error::{MedragError, Result};

/// Default number of hash buckets.
pub const DEFAULT_DIMENSIONS: usize = 384;

const PROVIDER: &str = "Hashing";
const MODEL_ID: &str = "fnv1a-hashing-v1";

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// A deterministic, dependency-free [`EmbeddingProvider`].
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::HashingEmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::new(384)?;
/// let v = provider.embed("hypertension treatment").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
    model_id: String,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-component vectors.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Config`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(MedragError::Config("embedding dimensions must be non-zero".to_string()));
        }
        let model_id = if dimensions == DEFAULT_DIMENSIONS {
            MODEL_ID.to_string()
        } else {
            format!("{MODEL_ID}-{dimensions}")
        };
        Ok(Self { dimensions, model_id })
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let features = extract_features(text);
        if features.is_empty() {
            return Err(MedragError::Embedding {
                provider: PROVIDER.to_string(),
                message: "cannot embed empty text".to_string(),
            });
        }

        let mut vector = vec![0.0f32; self.dimensions];
        // BTreeMap iteration keeps the summation order, and so the output bits, stable.
        for (hash, (count, weight)) in &features {
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight * (1.0 + (*count as f32).ln());
        }

        if vector.iter().all(|v| *v == 0.0) {
            // Every feature cancelled out; fall back to the raw feature count.
            vector[0] = features.len() as f32;
        }
        normalize_embedding(&mut vector, PROVIDER)?;
        trace!(provider = PROVIDER, features = features.len(), "embedded text");
        Ok(vector)
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: DEFAULT_DIMENSIONS, model_id: MODEL_ID.to_string() }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_sync(text)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Feature hash → (occurrences, weight of the feature kind).
fn extract_features(text: &str) -> BTreeMap<u64, (u32, f32)> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> =
        lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();

    let mut features = BTreeMap::new();
    let mut add = |kind: u8, key: &str, weight: f32| {
        let entry = features.entry(fnv1a(kind, key)).or_insert((0u32, weight));
        entry.0 += 1;
    };

    if tokens.is_empty() {
        // Punctuation or symbols only: hash the characters themselves.
        for c in lowered.chars().filter(|c| !c.is_whitespace()) {
            add(b'c', c.encode_utf8(&mut [0u8; 4]), UNIGRAM_WEIGHT);
        }
        return features;
    }

    for token in &tokens {
        add(b'u', token, UNIGRAM_WEIGHT);

        let padded: Vec<char> = std::iter::once('^').chain(token.chars()).chain(['$']).collect();
        for window in padded.windows(3) {
            let trigram: String = window.iter().collect();
            add(b't', &trigram, TRIGRAM_WEIGHT);
        }
    }
    for pair in tokens.windows(2) {
        add(b'b', &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
    }
    features
}

fn fnv1a(kind: u8, key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    std::iter::once(kind).chain(key.bytes()).fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{dot, is_unit_length};

    #[tokio::test]
    async fn embeddings_are_unit_length_and_sized() {
        let provider = HashingEmbeddingProvider::default();
        for text in ["fever", "Acute myocardial infarction.", "???", "a"] {
            let v = provider.embed(text).await.unwrap();
            assert_eq!(v.len(), DEFAULT_DIMENSIONS);
            assert!(is_unit_length(&v), "{text:?} not normalized");
        }
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let a = HashingEmbeddingProvider::default();
        let b = HashingEmbeddingProvider::default();
        let text = "Insulin regulates blood glucose levels.";
        assert_eq!(a.embed(text).await.unwrap(), b.embed(text).await.unwrap());
        assert_eq!(a.embed(text).await.unwrap(), a.embed(text).await.unwrap());
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let provider = HashingEmbeddingProvider::default();
        let query = provider.embed("treatment of migraine headache").await.unwrap();
        let related = provider.embed("Migraine headache treatment includes triptans.").await.unwrap();
        let unrelated = provider.embed("The femur is the longest bone.").await.unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn batch_matches_single_calls() {
        let provider = HashingEmbeddingProvider::default();
        let texts = ["asthma", "chronic kidney disease"];
        let batch = provider.embed_batch(&texts).await.unwrap();
        for (text, vector) in texts.iter().zip(batch) {
            assert_eq!(provider.embed(text).await.unwrap(), vector);
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let provider = HashingEmbeddingProvider::default();
        assert!(provider.embed("   ").await.is_err());
    }

    #[test]
    fn custom_dimensions_change_model_id() {
        let provider = HashingEmbeddingProvider::new(768).unwrap();
        assert_eq!(provider.dimensions(), 768);
        assert_ne!(provider.model_id(), HashingEmbeddingProvider::default().model_id());
        assert!(HashingEmbeddingProvider::new(0).is_err());
    }
}
