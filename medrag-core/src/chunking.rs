//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text hierarchically by paragraphs, lines, sentences, words and
//! finally characters, merging the pieces back into overlapping chunks.

use std::collections::VecDeque;
use std::ops::Range;

use crate::config::MedragConfig;
use crate::document::{Chunk, SourceDocument};
use crate::error::{MedragError, Result};

/// Separators tried from coarsest to finest. The empty separator splits per character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations only need to split raw text; [`chunk`](Chunker::chunk)
/// walks the pages of a document and tags every piece with its provenance.
pub trait Chunker: Send + Sync {
    /// Split a block of text into trimmed, non-empty chunk texts.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split a document page by page.
    ///
    /// Chunks never straddle a page boundary. `chunk_index` counts across
    /// the whole document, so it is unique per file.
    fn chunk(&self, document: &SourceDocument) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index = 0u32;
        for page in &document.pages {
            for text in self.split_text(&page.text) {
                chunks.push(Chunk {
                    text,
                    source_file: document.file_name.clone(),
                    page: page.number,
                    chunk_index,
                });
                chunk_index += 1;
            }
        }
        chunks
    }
}

/// Splits text hierarchically: paragraphs → lines → sentences → words → characters.
///
/// The coarsest separator present in the text is used first; a piece that is
/// not shorter than `chunk_size` is split again with the remaining, finer
/// separators. Separators stay attached to the start of the piece that
/// follows them, so the pieces tile the input exactly. The pieces are then
/// merged greedily into chunks of at most `chunk_size` characters.
///
/// Every chunk after the first starts inside the previous one:
/// - trailing pieces of the emitted chunk are carried into the next one
///   while they fit in `chunk_overlap` characters;
/// - when no piece is small enough to carry, the next chunk starts with the
///   last `chunk_overlap` characters of the previous chunk instead, moved
///   forward to a word start when the cut would land inside a word.
///
/// Every chunk is a contiguous slice of the input; see
/// [`split_spans`](RecursiveChunker::split_spans).
///
/// # Example
///
/// ```rust,ignore
/// use medrag_core::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separators.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of characters consecutive chunks share
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Config`] if `chunk_size` is zero or the overlap
    /// is not smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(MedragError::Config("chunk_size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(MedragError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Create a chunker from the chunking fields of a [`MedragConfig`].
    pub fn from_config(config: &MedragConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Replace the separator hierarchy, coarsest first.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Byte ranges of the chunks of `text`, in order.
    ///
    /// Each range is trimmed of surrounding whitespace and never empty.
    /// Starts and ends strictly increase, and a range may begin before the
    /// end of its predecessor by at most `chunk_overlap` characters.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let whole = trim_span(text, 0..text.len());
        if whole.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        self.collect_pieces(text, whole, &self.separators, &mut pieces);
        self.merge_pieces(text, &pieces)
    }

    /// Split `span` into pieces shorter than `chunk_size`, recursing into
    /// finer separators for pieces that are too long.
    fn collect_pieces(
        &self,
        text: &str,
        span: Range<usize>,
        separators: &[String],
        pieces: &mut Vec<Range<usize>>,
    ) {
        let segment = &text[span.clone()];
        let mut separator = separators.last().map_or("", String::as_str);
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if segment.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        for piece in split_keeping_separator(segment, separator) {
            let piece = span.start + piece.start..span.start + piece.end;
            if finer.is_empty() || char_len(&text[piece.clone()]) < self.chunk_size {
                pieces.push(piece);
            } else {
                self.collect_pieces(text, piece, finer, pieces);
            }
        }
    }

    /// Greedily merge contiguous pieces into chunks of at most `chunk_size`
    /// characters, each starting inside its predecessor.
    fn merge_pieces(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks: Vec<Range<usize>> = Vec::new();
        let mut current: VecDeque<Range<usize>> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);
            if total + len > self.chunk_size && !current.is_empty() {
                push_chunk(text, &current, &mut chunks);
                let previous = chunks.last().cloned();
                while let Some(front) = current.front() {
                    let covers_previous =
                        previous.as_ref().is_some_and(|p| front.start <= p.start);
                    let fits = total <= self.chunk_overlap && total + len <= self.chunk_size;
                    if fits && !covers_previous {
                        break;
                    }
                    total -= char_len(&text[front.clone()]);
                    current.pop_front();
                }

                if let Some(previous) = &previous {
                    let carried_from = current.front().map_or(piece.start, |r| r.start);
                    if carried_from >= previous.end {
                        // Only whitespace would be carried over.
                        current.clear();
                        total = 0;
                        if let Some(tail) = self.overlap_tail(text, previous, piece.start, len) {
                            total = char_len(&text[tail.clone()]);
                            current.push_back(tail);
                        }
                    }
                }
            }
            current.push_back(piece.clone());
            total += len;
        }

        push_chunk(text, &current, &mut chunks);
        chunks
    }

    /// The end of `previous` as a prefix for a chunk that continues with a
    /// piece of `next_len` characters starting at byte `next_start`.
    fn overlap_tail(
        &self,
        text: &str,
        previous: &Range<usize>,
        next_start: usize,
        next_len: usize,
    ) -> Option<Range<usize>> {
        let previous_text = &text[previous.clone()];
        let previous_len = char_len(previous_text);
        let gap = char_len(&text[previous.end..next_start]);
        let budget = self
            .chunk_overlap
            .min(self.chunk_size.saturating_sub(next_len + gap))
            .min(previous_len.saturating_sub(1));
        if budget == 0 {
            return None;
        }

        let offset = previous_text
            .char_indices()
            .nth(previous_len - budget)
            .map_or(0, |(i, _)| i);
        let mut start = previous.start + offset;

        let mid_word = text[..start].chars().next_back().is_some_and(|c| !c.is_whitespace());
        if mid_word {
            let tail = &text[start..previous.end];
            if let Some(word) = tail
                .find(char::is_whitespace)
                .and_then(|ws| tail[ws..].find(|c: char| !c.is_whitespace()).map(|i| ws + i))
            {
                start += word;
            }
        }
        Some(start..next_start)
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|span| text[span].to_string()).collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Narrow `span` to exclude leading and trailing whitespace.
fn trim_span(text: &str, span: Range<usize>) -> Range<usize> {
    let segment = &text[span.clone()];
    let leading = segment.len() - segment.trim_start().len();
    let trailing = segment.len() - segment.trim_end().len();
    if leading == segment.len() {
        return span.start..span.start;
    }
    span.start + leading..span.end - trailing
}

/// Emit the trimmed extent of `current`, unless it adds nothing past the
/// previous chunk.
fn push_chunk(text: &str, current: &VecDeque<Range<usize>>, chunks: &mut Vec<Range<usize>>) {
    let (Some(first), Some(last)) = (current.front(), current.back()) else { return };
    let span = trim_span(text, first.start..last.end);
    if span.is_empty() || chunks.last().is_some_and(|previous| span.end <= previous.end) {
        return;
    }
    chunks.push(span);
}

/// Split text at a separator, keeping the separator attached to the start of
/// the following segment. The empty separator splits into single characters.
/// Returns byte ranges relative to `text`.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| i..i + c.len_utf8()).collect();
    }

    // Whitespace-only segments are folded into a neighbour.
    let mut result: Vec<Range<usize>> = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start && !text[start..pos].trim().is_empty() {
            result.push(start..pos);
            start = pos;
        }
    }
    if start < text.len() {
        match result.last_mut() {
            Some(last) if text[start..].trim().is_empty() => last.end = text.len(),
            _ => result.push(start..text.len()),
        }
    }
    result
}
