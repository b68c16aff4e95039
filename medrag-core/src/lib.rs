//! # medrag-core
//!
//! Retrieval over large medical reference corpora.
//!
//! ## Overview
//!
//! Two halves share this crate:
//!
//! - **Ingestion** (offline): [`IngestPipeline`] loads every document in a
//!   directory, splits it into overlapping, provenance-tagged chunks with a
//!   [`RecursiveChunker`], and [`IndexBuilder`] embeds them and builds a
//!   [`VectorBundle`] that is saved as one versioned, checksummed file.
//! - **Retrieval** (online): [`RetrievalService`] loads a bundle once and
//!   answers questions with ranked excerpts, numbered citations and a
//!   confidence label.
//!
//! ## Features
//!
//! - `pdf` (default): PDF text extraction via `lopdf`
//! - `fastembed`: [`fastembed::FastEmbedProvider`], local `all-MiniLM-L6-v2`
//!   sentence embeddings (the `medrag` CLI default)
//! - `openai`: [`openai::OpenAiEmbeddingProvider`] for OpenAI-compatible
//!   embeddings endpoints
//!
//! [`HashingEmbeddingProvider`] is always available. It is lexical, not
//! semantic, and exists for deterministic tests and fully offline builds.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medrag_core::{
//!     HashingEmbeddingProvider, IndexBuilder, IngestPipeline, MedragConfig, RetrievalService,
//! };
//!
//! let config = MedragConfig::default();
//! let embedder = Arc::new(HashingEmbeddingProvider::default());
//!
//! let report = IngestPipeline::new(config.clone())?.ingest_directory("data/").await?;
//! let bundle = IndexBuilder::new(embedder.clone(), config.clone()).build(report.chunks).await?;
//! bundle.save("index.medrag")?;
//!
//! let service = RetrievalService::open("index.medrag", embedder, config).await?;
//! let response = service.query("first-line treatment for hypertension", None).await?;
//! ```

pub mod builder;
pub mod bundle;
pub mod chunking;
mod codec;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod retrieval;

#[cfg(feature = "fastembed")]
pub mod fastembed;
#[cfg(feature = "openai")]
pub mod openai;

pub use builder::IndexBuilder;
pub use bundle::{BundleManifest, FORMAT_VERSION, VectorBundle, read_manifest};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{MedragConfig, MedragConfigBuilder};
pub use document::{Chunk, ChunkRecord, Page, SearchResult, SourceDocument};
pub use embedding::{EmbeddingProvider, normalize_embedding};
pub use error::{IndexLoadError, MedragError, Result};
pub use hashing::HashingEmbeddingProvider;
pub use index::{FlatIndex, HnswIndex, HnswParams, IndexKind, Neighbor, VectorIndex};
pub use ingest::{FailedDocument, IngestPipeline, IngestReport};
pub use loader::{discover_documents, load_document};
pub use retrieval::{Citation, Confidence, HealthStatus, QueryResponse, RetrievalService};
