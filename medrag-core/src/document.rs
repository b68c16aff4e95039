//! Data types for source documents, chunks, and search results.

use serde::{Deserialize, Serialize};

/// A single page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number; `0` when the source has no page structure.
    pub number: u32,
    /// The raw extracted text of the page.
    pub text: String,
}

/// One loaded source file, split into pages.
///
/// Only lives between loading and chunking; the pipeline drops it once its
/// chunks have been produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name (without directories) used for citations.
    pub file_name: String,
    /// Pages in reading order.
    pub pages: Vec<Page>,
}

impl SourceDocument {
    /// Total number of characters across all pages.
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// The atomic unit of retrieval: a bounded excerpt of a document plus its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// File name of the originating document.
    pub source_file: String,
    /// Page the chunk was cut from; `0` if unknown.
    pub page: u32,
    /// Position of the chunk within its document, counted across pages.
    pub chunk_index: u32,
}

/// What the index bundle retains about each chunk, keyed by its vector ID.
pub type ChunkRecord = Chunk;

/// A retrieved [`ChunkRecord`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Stable ID of the chunk inside the index.
    pub id: u32,
    /// The retrieved chunk.
    pub chunk: ChunkRecord,
    /// Inner-product similarity with the query (higher is more relevant).
    pub score: f32,
}
