//! Corpus discovery and per-document text extraction.
//!
//! Supported sources:
//! - `.pdf` (feature `pdf`): one [`Page`] per PDF page, extracted with `lopdf`
//! - `.txt`: UTF-8 text, pages separated by form feed (`\x0c`) as written by
//!   `pdftotext`
//!
//! Files with any other extension are ignored.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::document::{Page, SourceDocument};
use crate::error::{MedragError, Result};

/// Extensions picked up by [`discover_documents`], lower-case.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["pdf", "txt"];

const PAGE_BREAK: char = '\x0c';

/// Recursively collect candidate source files under `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`MedragError::EmptyCorpus`] if `dir` is missing, is not a
/// directory, or holds no file with a supported extension.
pub fn discover_documents(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(MedragError::EmptyCorpus { path: dir.to_path_buf() });
    }

    let mut files = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            extension(entry.path()).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        })
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    if files.is_empty() {
        return Err(MedragError::EmptyCorpus { path: dir.to_path_buf() });
    }
    files.sort();
    Ok(files)
}

/// Load one source document and split it into pages.
///
/// This is blocking I/O and parsing; call it from a blocking context.
///
/// # Errors
///
/// Returns [`MedragError::Document`] if the file cannot be read, is not valid
/// UTF-8 (text files), cannot be parsed (PDF), or has an unsupported extension.
pub fn load_document(path: impl AsRef<Path>) -> Result<SourceDocument> {
    let path = path.as_ref();
    let file_name = file_name(path);

    let pages = match extension(path).as_deref() {
        Some("txt") => load_text(path, &file_name)?,
        Some("pdf") => load_pdf(path, &file_name)?,
        other => {
            return Err(document_error(
                &file_name,
                format!("unsupported file type: {}", other.unwrap_or("<none>")),
            ));
        }
    };

    debug!(file = %file_name, pages = pages.len(), "loaded document");
    Ok(SourceDocument { file_name, pages })
}

/// The name a document is cited by: its final path component.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn document_error(file: &str, message: impl Into<String>) -> MedragError {
    MedragError::Document { file: file.to_string(), message: message.into() }
}

fn load_text(path: &Path, file_name: &str) -> Result<Vec<Page>> {
    let bytes = std::fs::read(path).map_err(|e| document_error(file_name, e.to_string()))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| document_error(file_name, format!("invalid UTF-8: {e}")))?;

    Ok(text
        .split(PAGE_BREAK)
        .enumerate()
        .map(|(i, page)| Page { number: i as u32 + 1, text: page.to_string() })
        .collect())
}

#[cfg(feature = "pdf")]
fn load_pdf(path: &Path, file_name: &str) -> Result<Vec<Page>> {
    let document = lopdf::Document::load(path)
        .map_err(|e| document_error(file_name, format!("invalid PDF: {e}")))?;

    let mut pages = Vec::new();
    for number in document.get_pages().into_keys() {
        let text = match document.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                // One unreadable page should not cost the whole document.
                tracing::warn!(file = %file_name, page = number, error = %e, "failed to extract page text");
                String::new()
            }
        };
        pages.push(Page { number, text });
    }
    Ok(pages)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(_path: &Path, file_name: &str) -> Result<Vec<Page>> {
    Err(document_error(file_name, "PDF support is not enabled (build with the `pdf` feature)"))
}
