//! Offline ingestion: source directory → ordered, provenance-tagged chunks.
//!
//! Documents are loaded and chunked by independent tasks on the blocking
//! pool, at most `ingest_concurrency` at a time. Each task hands back its
//! ordinal together with its outcome; the collector in
//! [`IngestPipeline::ingest_files`] is the only place results are
//! accumulated, and it restores discovery order before returning.
//!
//! A document that fails to load is recorded in
//! [`IngestReport::failed`] and never aborts the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::MedragConfig;
use crate::document::Chunk;
use crate::error::{MedragError, Result};
use crate::loader::{discover_documents, file_name, load_document};

/// A document that could not be turned into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    /// File name of the document.
    pub file_name: String,
    /// Why it failed.
    pub reason: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// All chunks, documents in discovery order, chunks in creation order.
    #[serde(skip)]
    pub chunks: Vec<Chunk>,
    /// Number of candidate documents discovered.
    pub documents_total: usize,
    /// Number of documents that loaded successfully.
    pub documents_succeeded: usize,
    /// Pages across the successfully loaded documents.
    pub pages_processed: usize,
    /// Documents that failed, in discovery order.
    pub failed: Vec<FailedDocument>,
}

impl IngestReport {
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

type DocumentOutcome = std::result::Result<(usize, Vec<Chunk>), String>;

/// Loads and chunks a corpus.
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::{IngestPipeline, MedragConfig};
///
/// let pipeline = IngestPipeline::new(MedragConfig::default())?;
/// let report = pipeline.ingest_directory("data/").await?;
/// println!("{} chunks from {} documents", report.chunk_count(), report.documents_succeeded);
/// ```
pub struct IngestPipeline {
    config: MedragConfig,
    chunker: Arc<dyn Chunker>,
}

impl IngestPipeline {
    /// Create a pipeline using a [`RecursiveChunker`] configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Config`] if `config` fails validation.
    pub fn new(config: MedragConfig) -> Result<Self> {
        config.validate()?;
        let chunker = Arc::new(RecursiveChunker::from_config(&config)?);
        Ok(Self { config, chunker })
    }

    /// Replace the chunking strategy.
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn config(&self) -> &MedragConfig {
        &self.config
    }

    /// Discover every supported document under `dir` and ingest it.
    ///
    /// # Errors
    ///
    /// - [`MedragError::EmptyCorpus`] if `dir` holds no candidate document
    /// - [`MedragError::NoContent`] if no chunk survives
    pub async fn ingest_directory(&self, dir: impl AsRef<Path>) -> Result<IngestReport> {
        let dir = dir.as_ref();
        let files = discover_documents(dir)?;
        info!(path = %dir.display(), documents = files.len(), "discovered source documents");
        self.ingest_files(files).await
    }

    /// Ingest an explicit list of files, keeping their order.
    ///
    /// # Errors
    ///
    /// - [`MedragError::EmptyCorpus`] if `files` is empty
    /// - [`MedragError::NoContent`] if no chunk survives
    /// - [`MedragError::Internal`] if a worker task is cancelled
    pub async fn ingest_files(&self, files: Vec<PathBuf>) -> Result<IngestReport> {
        let total = files.len();
        if total == 0 {
            return Err(MedragError::EmptyCorpus { path: PathBuf::new() });
        }

        let permits = Arc::new(Semaphore::new(self.config.ingest_concurrency));
        let mut tasks = JoinSet::new();

        for (ordinal, path) in files.into_iter().enumerate() {
            let permits = Arc::clone(&permits);
            let chunker = Arc::clone(&self.chunker);
            tasks.spawn(async move {
                let name = file_name(&path);
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => process_document(path, chunker).await,
                    Err(e) => Err(format!("worker pool closed: {e}")),
                };
                (ordinal, name, outcome)
            });
        }

        let mut slots: Vec<Option<(String, DocumentOutcome)>> = vec![None; total];
        let mut running_chunks = 0usize;
        let mut completed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            let (ordinal, name, outcome) =
                joined.map_err(|e| MedragError::Internal(format!("ingestion task failed: {e}")))?;
            completed += 1;
            match &outcome {
                Ok((pages, chunks)) => {
                    running_chunks += chunks.len();
                    info!(
                        document = ordinal + 1,
                        total,
                        completed,
                        file = %name,
                        pages,
                        chunks = chunks.len(),
                        running_chunks,
                        "processed document"
                    );
                    if chunks.is_empty() {
                        warn!(file = %name, "document produced no text chunks");
                    }
                }
                Err(reason) => {
                    warn!(document = ordinal + 1, total, file = %name, %reason, "failed to process document");
                }
            }
            slots[ordinal] = Some((name, outcome));
        }

        let mut report = IngestReport { documents_total: total, ..IngestReport::default() };
        for (name, outcome) in slots.into_iter().flatten() {
            match outcome {
                Ok((pages, chunks)) => {
                    report.documents_succeeded += 1;
                    report.pages_processed += pages;
                    report.chunks.extend(chunks);
                }
                Err(reason) => report.failed.push(FailedDocument { file_name: name, reason }),
            }
        }

        let failed_files: Vec<&str> = report.failed.iter().map(|f| f.file_name.as_str()).collect();
        info!(
            succeeded = report.documents_succeeded,
            total,
            pages = report.pages_processed,
            chunks = report.chunks.len(),
            failed = ?failed_files,
            "ingestion complete"
        );

        if report.chunks.is_empty() {
            return Err(MedragError::NoContent { total, failed: report.failed.len() });
        }
        Ok(report)
    }
}

/// Load and chunk one document on the blocking pool.
///
/// Panics inside the worker surface as a failure of this document only.
async fn process_document(path: PathBuf, chunker: Arc<dyn Chunker>) -> DocumentOutcome {
    let work = tokio::task::spawn_blocking(move || {
        let document = load_document(&path).map_err(|e| match e {
            MedragError::Document { message, .. } => message,
            other => other.to_string(),
        })?;
        let chunks = chunker.chunk(&document);
        Ok((document.pages.len(), chunks))
    });

    match work.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err("document processing panicked".to_string()),
        Err(e) => Err(format!("document processing was cancelled: {e}")),
    }
}
