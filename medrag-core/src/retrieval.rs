//! Online retrieval: question → ranked excerpts, citations and a confidence label.
//!
//! [`RetrievalService`] loads a bundle once and then answers any number of
//! concurrent queries against it. The index sits behind an `Arc` and is
//! never mutated, so queries take no locks; the CPU-bound search itself runs
//! on the blocking pool.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::bundle::{BundleManifest, VectorBundle};
use crate::config::MedragConfig;
use crate::document::{ChunkRecord, SearchResult};
use crate::embedding::{EmbeddingProvider, conform_embedding};
use crate::error::{IndexLoadError, MedragError, Result};
use crate::index::VectorIndex;

/// Results quoted in the excerpt answer.
pub const EXCERPT_FINDINGS: usize = 3;
/// Characters of each finding quoted in the excerpt answer.
pub const EXCERPT_CHARS: usize = 250;
/// Characters of each chunk quoted in a citation.
pub const CITATION_CHARS: usize = 400;

const EMPTY_QUESTION: &str = "Question cannot be empty";
const SHORT_QUESTION: &str = "Question too short. Please provide more detail.";

const DISCLAIMER: &str = "This information is retrieved from medical literature for educational \
purposes only. Always consult a qualified healthcare professional for medical advice, diagnosis, \
or treatment. Do not use this information as a substitute for professional medical care.";

/// A numbered reference to one retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based position in the ranking.
    pub citation_number: usize,
    /// The chunk text, cut to [`CITATION_CHARS`] characters plus `"..."`.
    pub content: String,
    pub source_file: String,
    pub page: u32,
}

/// How well supported an answer is, judged by the number of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Four or more results are `High`, two or three `Medium`, fewer `Low`.
    pub fn from_result_count(count: usize) -> Self {
        match count {
            4.. => Confidence::High,
            2..=3 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// The label returned to clients.
    pub fn label(self) -> &'static str {
        match self {
            Confidence::High => "High - Multiple relevant sources found",
            Confidence::Medium => "Medium - Some relevant sources found",
            Confidence::Low => "Low - Limited sources found",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// The answer to one question.
///
/// Serializes with the field names HTTP clients expect: `answer`, `sources`
/// and `confidence`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    #[serde(rename = "answer")]
    pub excerpt_answer: String,
    #[serde(rename = "sources")]
    pub citations: Vec<Citation>,
    pub confidence: Confidence,
    /// Ranked results with their scores, best first.
    #[serde(skip)]
    pub results: Vec<SearchResult>,
}

/// A snapshot of the loaded index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub vector_count: usize,
    pub dimensions: usize,
    pub index_kind: String,
    pub embedding_model: String,
}

/// Answers questions from a loaded index bundle.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::{HashingEmbeddingProvider, MedragConfig, RetrievalService};
///
/// let service = RetrievalService::open(
///     "index.medrag",
///     Arc::new(HashingEmbeddingProvider::default()),
///     MedragConfig::default(),
/// )
/// .await?;
/// let response = service.query("What are the symptoms of diabetes?", None).await?;
/// println!("{}", response.excerpt_answer);
/// ```
pub struct RetrievalService {
    manifest: BundleManifest,
    records: Arc<Vec<ChunkRecord>>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: MedragConfig,
}

impl fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalService")
            .field("manifest", &self.manifest)
            .field("embedding_model", &self.embedder.model_id())
            .finish_non_exhaustive()
    }
}

impl RetrievalService {
    /// Load the bundle at `path` for serving with `embedder`.
    ///
    /// # Errors
    ///
    /// - [`MedragError::Config`] if `config` is invalid
    /// - [`MedragError::IndexLoad`] if the bundle is missing, corrupt, of an
    ///   unsupported version, or built with a different embedding dimension
    pub async fn open(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: MedragConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let expected = embedder.dimensions();
        let bundle = tokio::task::spawn_blocking(move || VectorBundle::load(path, expected))
            .await
            .map_err(|e| MedragError::Internal(format!("bundle load task failed: {e}")))??;
        Self::from_bundle(bundle, embedder, config)
    }

    /// Serve an already loaded or freshly built bundle.
    ///
    /// # Errors
    ///
    /// Returns [`IndexLoadError::DimensionMismatch`] (as
    /// [`MedragError::IndexLoad`]) if the bundle and provider disagree on the
    /// embedding dimension.
    pub fn from_bundle(
        bundle: VectorBundle,
        embedder: Arc<dyn EmbeddingProvider>,
        config: MedragConfig,
    ) -> Result<Self> {
        config.validate()?;
        let VectorBundle { manifest, records, index } = bundle;
        if index.dimensions() != embedder.dimensions() {
            return Err(IndexLoadError::DimensionMismatch {
                expected: embedder.dimensions(),
                found: index.dimensions(),
            }
            .into());
        }
        if manifest.embedding_model != embedder.model_id() {
            warn!(
                bundle_model = %manifest.embedding_model,
                provider_model = %embedder.model_id(),
                "bundle was built with a different embedding model"
            );
        }

        info!(
            vectors = index.len(),
            dimensions = index.dimensions(),
            kind = %index.kind(),
            model = %embedder.model_id(),
            "retrieval service ready"
        );
        Ok(Self {
            manifest,
            records: Arc::new(records),
            index: Arc::from(index),
            embedder,
            config,
        })
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn config(&self) -> &MedragConfig {
        &self.config
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            vector_count: self.index.len(),
            dimensions: self.index.dimensions(),
            index_kind: self.index.kind().to_string(),
            embedding_model: self.embedder.model_id().to_string(),
        }
    }

    /// Check a question and `k` before any work is done.
    ///
    /// Returns the trimmed question.
    pub fn validate<'q>(&self, question: &'q str, k: usize) -> Result<&'q str> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MedragError::InvalidQuery(EMPTY_QUESTION.to_string()));
        }
        if question.chars().count() < self.config.min_query_chars {
            return Err(MedragError::InvalidQuery(SHORT_QUESTION.to_string()));
        }
        if k == 0 || k > self.config.max_top_k {
            return Err(MedragError::InvalidQuery(format!(
                "k must be between 1 and {}",
                self.config.max_top_k
            )));
        }
        Ok(question)
    }

    /// Retrieve the `k` most similar chunks (default `top_k`) for `question`.
    ///
    /// # Errors
    ///
    /// - [`MedragError::InvalidQuery`] for empty or short questions, or an
    ///   out-of-range `k`
    /// - [`MedragError::Embedding`] if the question cannot be embedded
    pub async fn search(&self, question: &str, k: Option<usize>) -> Result<Vec<SearchResult>> {
        let k = k.unwrap_or(self.config.top_k);
        let question = self.validate(question, k)?;

        let provider = self.embedder.model_id().to_string();
        let embedding = self.embedder.embed(question).await?;
        let embedding = conform_embedding(embedding, self.index.dimensions(), &provider)?;

        let index = Arc::clone(&self.index);
        let neighbors = tokio::task::spawn_blocking(move || index.search(&embedding, k))
            .await
            .map_err(|e| MedragError::Internal(format!("search task failed: {e}")))??;

        let results = neighbors
            .into_iter()
            .map(|neighbor| {
                let chunk = self.records.get(neighbor.id as usize).cloned().ok_or_else(|| {
                    MedragError::Internal(format!("no chunk record for vector {}", neighbor.id))
                })?;
                Ok(SearchResult { id: neighbor.id, chunk, score: neighbor.score })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(k, results = results.len(), top_score = results.first().map(|r| r.score), "search complete");
        Ok(results)
    }

    /// Answer `question` with excerpts, citations and a confidence label.
    ///
    /// # Errors
    ///
    /// See [`search`](Self::search).
    pub async fn query(&self, question: &str, k: Option<usize>) -> Result<QueryResponse> {
        let results = self.search(question, k).await?;
        let question = question.trim();
        Ok(QueryResponse {
            excerpt_answer: excerpt_answer(question, &results),
            citations: citations(&results),
            confidence: Confidence::from_result_count(results.len()),
            results,
        })
    }
}

/// Render the excerpt answer: a header, the top findings, and the disclaimer.
pub fn excerpt_answer(question: &str, results: &[SearchResult]) -> String {
    let mut answer = String::from("**Medical Information Retrieved:**\n\n");
    answer.push_str(&format!(
        "Based on medical literature search for '{question}', here are the most relevant findings:\n\n"
    ));

    for (i, result) in results.iter().take(EXCERPT_FINDINGS).enumerate() {
        let chunk = &result.chunk;
        answer.push_str(&format!(
            "**Finding {}** (Source: {}, Page {}):\n{}...\n\n",
            i + 1,
            chunk.source_file,
            chunk.page,
            truncate_chars(&chunk.text, EXCERPT_CHARS).trim()
        ));
    }

    answer.push_str("---\n\n**⚠️ Important Medical Disclaimer:**\n");
    answer.push_str(DISCLAIMER);
    answer.push_str("\n\n");
    answer.push_str(&format!(
        "**Confidence Score:** Based on {} relevant sources found in database.",
        results.len()
    ));
    answer
}

/// One citation per result, numbered from 1 in ranking order.
pub fn citations(results: &[SearchResult]) -> Vec<Citation> {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let text = &result.chunk.text;
            let content = if text.chars().count() > CITATION_CHARS {
                format!("{}...", truncate_chars(text, CITATION_CHARS))
            } else {
                text.clone()
            };
            Citation {
                citation_number: i + 1,
                content,
                source_file: result.chunk.source_file.clone(),
                page: result.chunk.page,
            }
        })
        .collect()
}

/// The first `max` characters of `text`.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u32, text: &str, page: u32) -> SearchResult {
        SearchResult {
            id,
            chunk: ChunkRecord {
                text: text.into(),
                source_file: "harrison.pdf".into(),
                page,
                chunk_index: id,
            },
            score: 1.0 - id as f32 * 0.1,
        }
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(Confidence::from_result_count(5), Confidence::High);
        assert_eq!(Confidence::from_result_count(4), Confidence::High);
        assert_eq!(Confidence::from_result_count(3), Confidence::Medium);
        assert_eq!(Confidence::from_result_count(2), Confidence::Medium);
        assert_eq!(Confidence::from_result_count(1), Confidence::Low);
        assert_eq!(Confidence::from_result_count(0), Confidence::Low);
        assert_eq!(
            serde_json::to_value(Confidence::Medium).unwrap(),
            "Medium - Some relevant sources found"
        );
    }

    #[test]
    fn excerpt_answer_quotes_top_three() {
        let results: Vec<SearchResult> =
            (0..5).map(|i| result(i, &format!("  finding text {i}  "), i + 10)).collect();
        let answer = excerpt_answer("fever in children", &results);

        assert!(answer.starts_with(
            "**Medical Information Retrieved:**\n\nBased on medical literature search for \
             'fever in children', here are the most relevant findings:\n\n"
        ));
        assert!(answer.contains("**Finding 1** (Source: harrison.pdf, Page 10):\nfinding text 0...\n\n"));
        assert!(answer.contains("**Finding 3** (Source: harrison.pdf, Page 12):\nfinding text 2...\n\n"));
        assert!(!answer.contains("**Finding 4**"));
        assert!(answer.contains("---\n\n**⚠️ Important Medical Disclaimer:**\nThis information"));
        assert!(answer.ends_with(
            "**Confidence Score:** Based on 5 relevant sources found in database."
        ));
    }

    #[test]
    fn excerpt_findings_are_cut_at_250_characters() {
        let long = "é".repeat(300);
        let answer = excerpt_answer("anemia", &[result(0, &long, 1)]);
        assert!(answer.contains(&format!("{}...\n\n", "é".repeat(250))));
        assert!(!answer.contains(&"é".repeat(251)));
    }

    #[test]
    fn citations_cut_long_text_only() {
        let long = "x".repeat(401);
        let exact = "y".repeat(400);
        let cited = citations(&[result(0, &long, 3), result(1, &exact, 4)]);

        assert_eq!(cited[0].citation_number, 1);
        assert_eq!(cited[0].content, format!("{}...", "x".repeat(400)));
        assert_eq!(cited[1].citation_number, 2);
        assert_eq!(cited[1].content, exact);
        assert_eq!(cited[1].page, 4);
    }

    #[test]
    fn response_uses_wire_field_names() {
        let results = vec![result(0, "text", 1)];
        let response = QueryResponse {
            excerpt_answer: excerpt_answer("cough", &results),
            citations: citations(&results),
            confidence: Confidence::Low,
            results,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("answer").is_some());
        assert_eq!(json["sources"][0]["source_file"], "harrison.pdf");
        assert_eq!(json["confidence"], "Low - Limited sources found");
        assert!(json.get("results").is_none());
    }
}
