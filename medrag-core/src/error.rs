//! Error types for the `medrag-core` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while ingesting, indexing or querying a corpus.
#[derive(Debug, Error)]
pub enum MedragError {
    /// The source directory holds no candidate documents.
    #[error("no source documents found in directory: {}", path.display())]
    EmptyCorpus {
        /// The directory that was scanned.
        path: PathBuf,
    },

    /// Every document failed or was empty, so no chunk survived ingestion.
    #[error("no text chunks created: {failed} of {total} documents failed")]
    NoContent {
        /// Number of documents that were discovered.
        total: usize,
        /// Number of documents that could not be loaded.
        failed: usize,
    },

    /// A single source document could not be read or parsed.
    #[error("failed to load {file}: {message}")]
    Document {
        /// File name of the offending document.
        file: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted index bundle could not be loaded.
    #[error("index load failed: {0}")]
    IndexLoad(#[from] IndexLoadError),

    /// The query was rejected before reaching the index.
    #[error("{0}")]
    InvalidQuery(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred while building or searching a vector index.
    #[error("Vector index error: {0}")]
    Index(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error outside of index loading.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An unexpected internal failure (worker panic, cancelled task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MedragError {
    /// Whether the error was caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MedragError::InvalidQuery(_))
    }
}

/// The distinguished causes of a failed bundle load.
///
/// Every variant is fatal for service startup: a service must never serve
/// from a bundle that failed any of these checks.
#[derive(Debug, Error)]
pub enum IndexLoadError {
    /// No bundle exists at the given path.
    #[error("index not found at {}", path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The bundle was built with a different embedding dimension than the live provider.
    #[error("embedding dimension mismatch: index has {found}, embedding provider produces {expected}")]
    DimensionMismatch {
        /// Dimension reported by the live embedding provider.
        expected: usize,
        /// Dimension recorded in the bundle.
        found: usize,
    },

    /// The bundle was written by an incompatible format version.
    #[error("unsupported bundle format version {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the bundle header.
        found: u32,
        /// Version this build reads and writes.
        supported: u32,
    },

    /// The bundle is truncated, tampered with, or internally inconsistent.
    #[error("corrupt index bundle: {0}")]
    Corrupt(String),

    /// The bundle exists but could not be read.
    #[error("failed to read index bundle: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience result type for medrag operations.
pub type Result<T> = std::result::Result<T, MedragError>;
