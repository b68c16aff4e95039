//! Index bundle persistence.
//!
//! An index and its chunk records are written together as one file so they
//! can never drift apart:
//!
//! ```text
//! [8]  magic  "MEDRAGIX"
//! [4]  format version (u32 LE)
//! [4]  header length (u32 LE)
//! [..] header JSON: manifest + payload length + payload SHA-256
//! [..] payload:
//!      [8]  records length (u64 LE)
//!      [..] records JSON (one entry per vector ID)
//!      [..] index bytes (see `VectorIndex::encode`)
//! ```
//!
//! Saving writes a temporary file next to the destination, fsyncs it and
//! renames it into place, so readers see either the old bundle or the new
//! one in full.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::codec::{ByteReader, put_u32, put_u64};
use crate::config::MedragConfig;
use crate::document::ChunkRecord;
use crate::error::{IndexLoadError, MedragError, Result};
use crate::index::{IndexKind, VectorIndex};

/// File signature of an index bundle.
pub const MAGIC: &[u8; 8] = b"MEDRAGIX";

/// The bundle format version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Signature, format version and header length.
const PREFIX_LEN: usize = MAGIC.len() + 8;

/// Describes how a bundle was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub index_kind: IndexKind,
    /// Embedding dimension every vector in the bundle has.
    pub dimensions: usize,
    pub vector_count: usize,
    /// [`model_id`](crate::EmbeddingProvider::model_id) of the provider that built it.
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
}

impl BundleManifest {
    /// Describe an index about to be bundled.
    pub fn new(index: &dyn VectorIndex, embedding_model: &str, config: &MedragConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            index_kind: index.kind(),
            dimensions: index.dimensions(),
            vector_count: index.len(),
            embedding_model: embedding_model.to_string(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            built_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleHeader {
    #[serde(flatten)]
    manifest: BundleManifest,
    payload_len: u64,
    payload_sha256: String,
}

/// A vector index together with the chunk record behind every vector ID.
#[derive(Debug)]
pub struct VectorBundle {
    pub manifest: BundleManifest,
    /// `records[id]` is the chunk embedded as vector `id`.
    pub records: Vec<ChunkRecord>,
    pub index: Box<dyn VectorIndex>,
}

impl VectorBundle {
    /// Pair an index with its records.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::Index`] if the record count differs from the
    /// number of vectors.
    pub fn new(
        records: Vec<ChunkRecord>,
        index: Box<dyn VectorIndex>,
        embedding_model: &str,
        config: &MedragConfig,
    ) -> Result<Self> {
        if records.len() != index.len() {
            return Err(MedragError::Index(format!(
                "{} chunk records for {} vectors",
                records.len(),
                index.len()
            )));
        }
        let manifest = BundleManifest::new(index.as_ref(), embedding_model, config);
        Ok(Self { manifest, records, index })
    }

    /// Atomically write the bundle to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let payload = self.encode_payload()?;
        let header = BundleHeader {
            manifest: self.manifest.clone(),
            payload_len: payload.len() as u64,
            payload_sha256: sha256_hex(&payload),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| MedragError::Internal(format!("failed to encode bundle header: {e}")))?;
        let header_len = u32::try_from(header_json.len())
            .map_err(|_| MedragError::Internal("bundle header too large".to_string()))?;

        let mut prefix = Vec::with_capacity(PREFIX_LEN + header_json.len());
        prefix.extend_from_slice(MAGIC);
        put_u32(&mut prefix, FORMAT_VERSION);
        put_u32(&mut prefix, header_len);
        prefix.extend_from_slice(&header_json);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&prefix)?;
        file.write_all(&payload)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;

        info!(
            path = %path.display(),
            vectors = self.manifest.vector_count,
            bytes = prefix.len() + payload.len(),
            "saved index bundle"
        );
        Ok(())
    }

    /// Load and verify a bundle, checking it against the live provider's dimension.
    ///
    /// # Errors
    ///
    /// - [`IndexLoadError::NotFound`] if nothing exists at `path`
    /// - [`IndexLoadError::Corrupt`] on a bad signature, truncation, checksum
    ///   mismatch, undecodable section or inconsistent counts
    /// - [`IndexLoadError::UnsupportedVersion`] for other format versions
    /// - [`IndexLoadError::DimensionMismatch`] if the bundle's dimension is not
    ///   `expected_dimensions`
    pub fn load(
        path: impl AsRef<Path>,
        expected_dimensions: usize,
    ) -> std::result::Result<Self, IndexLoadError> {
        let path = path.as_ref();
        let bytes = read_bundle(path)?;
        let (header, payload) = parse_header(&bytes)?;

        if payload.len() as u64 != header.payload_len {
            return Err(IndexLoadError::Corrupt(format!(
                "payload is {} bytes, header declares {}",
                payload.len(),
                header.payload_len
            )));
        }
        if sha256_hex(payload) != header.payload_sha256 {
            return Err(IndexLoadError::Corrupt("payload checksum mismatch".to_string()));
        }

        let manifest = header.manifest;
        if manifest.dimensions != expected_dimensions {
            return Err(IndexLoadError::DimensionMismatch {
                expected: expected_dimensions,
                found: manifest.dimensions,
            });
        }

        let mut reader = ByteReader::new(payload);
        let records_len = reader.len("records length")?;
        let records: Vec<ChunkRecord> = serde_json::from_slice(reader.take(records_len, "records")?)
            .map_err(|e| IndexLoadError::Corrupt(format!("undecodable chunk records: {e}")))?;
        let index = manifest.index_kind.decode(reader.rest())?;

        if index.dimensions() != manifest.dimensions {
            return Err(IndexLoadError::Corrupt(format!(
                "index has {} dimensions, manifest declares {}",
                index.dimensions(),
                manifest.dimensions
            )));
        }
        if records.len() != manifest.vector_count || index.len() != manifest.vector_count {
            return Err(IndexLoadError::Corrupt(format!(
                "manifest declares {} vectors, found {} records and {} vectors",
                manifest.vector_count,
                records.len(),
                index.len()
            )));
        }

        debug!(path = %path.display(), vectors = manifest.vector_count, "loaded index bundle");
        Ok(Self { manifest, records, index })
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        let records = serde_json::to_vec(&self.records)
            .map_err(|e| MedragError::Internal(format!("failed to encode chunk records: {e}")))?;
        let index = self.index.encode();
        let mut payload = Vec::with_capacity(8 + records.len() + index.len());
        put_u64(&mut payload, records.len() as u64);
        payload.extend_from_slice(&records);
        payload.extend_from_slice(&index);
        Ok(payload)
    }
}

/// Read only the manifest of a bundle, without verifying its payload.
///
/// Only the fixed prefix and the JSON header are read from disk; the payload
/// is never touched.
pub fn read_manifest(path: impl AsRef<Path>) -> std::result::Result<BundleManifest, IndexLoadError> {
    let path = path.as_ref();
    let mut file = fs::File::open(path).map_err(|e| not_found_or_io(path, e))?;

    let mut head = vec![0u8; PREFIX_LEN];
    read_section(&mut file, &mut head, "prefix")?;
    let header_len = prefix_header_len(&head)?;
    let available = file.metadata()?.len().saturating_sub(PREFIX_LEN as u64);
    if header_len as u64 > available {
        return Err(IndexLoadError::Corrupt("truncated header".to_string()));
    }
    head.resize(PREFIX_LEN + header_len, 0);
    read_section(&mut file, &mut head[PREFIX_LEN..], "header")?;

    parse_header(&head).map(|(header, _)| header.manifest)
}

fn read_bundle(path: &Path) -> std::result::Result<Vec<u8>, IndexLoadError> {
    fs::read(path).map_err(|e| not_found_or_io(path, e))
}

fn read_section(
    file: &mut fs::File,
    buf: &mut [u8],
    what: &str,
) -> std::result::Result<(), IndexLoadError> {
    file.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => IndexLoadError::Corrupt(format!("truncated {what}")),
        _ => IndexLoadError::Io(e),
    })
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> IndexLoadError {
    match e.kind() {
        ErrorKind::NotFound => IndexLoadError::NotFound { path: path.to_path_buf() },
        _ => IndexLoadError::Io(e),
    }
}

/// Check signature and version, returning the declared header length.
fn prefix_header_len(bytes: &[u8]) -> std::result::Result<usize, IndexLoadError> {
    let mut reader = ByteReader::new(bytes);
    if reader.take(MAGIC.len(), "signature").ok() != Some(MAGIC.as_slice()) {
        return Err(IndexLoadError::Corrupt("not an index bundle (bad signature)".to_string()));
    }
    let version = reader.u32("format version")?;
    if version != FORMAT_VERSION {
        return Err(IndexLoadError::UnsupportedVersion { found: version, supported: FORMAT_VERSION });
    }
    Ok(reader.u32("header length")? as usize)
}

fn parse_header(bytes: &[u8]) -> std::result::Result<(BundleHeader, &[u8]), IndexLoadError> {
    let header_len = prefix_header_len(bytes)?;
    let mut reader = ByteReader::new(&bytes[PREFIX_LEN..]);
    let header: BundleHeader = serde_json::from_slice(reader.take(header_len, "header")?)
        .map_err(|e| IndexLoadError::Corrupt(format!("undecodable header: {e}")))?;
    if header.manifest.format_version != FORMAT_VERSION {
        return Err(IndexLoadError::Corrupt(format!(
            "header declares format version {}, file signature {FORMAT_VERSION}",
            header.manifest.format_version
        )));
    }
    Ok((header, reader.rest()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FlatIndex, HnswIndex, HnswParams};

    fn record(i: u32) -> ChunkRecord {
        ChunkRecord {
            text: format!("chunk number {i}"),
            source_file: "manual.txt".into(),
            page: i + 1,
            chunk_index: i,
        }
    }

    fn bundle(kind: IndexKind) -> VectorBundle {
        let mut index: Box<dyn VectorIndex> = match kind {
            IndexKind::Flat => Box::new(FlatIndex::new(2).unwrap()),
            IndexKind::Hnsw => Box::new(HnswIndex::new(2, HnswParams::default()).unwrap()),
        };
        index.insert(vec![1.0, 0.0]).unwrap();
        index.insert(vec![0.0, 1.0]).unwrap();
        VectorBundle::new(vec![record(0), record(1)], index, "test-model", &MedragConfig::default())
            .unwrap()
    }

    #[test]
    fn save_then_load_restores_everything() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("index.medrag");
        for kind in [IndexKind::Flat, IndexKind::Hnsw] {
            let original = bundle(kind);
            original.save(&path).unwrap();

            let loaded = VectorBundle::load(&path, 2).unwrap();
            assert_eq!(loaded.manifest, original.manifest);
            assert_eq!(loaded.records, original.records);
            assert_eq!(loaded.index.kind(), kind);
            assert_eq!(loaded.index.search(&[0.0, 1.0], 1).unwrap()[0].id, 1);
        }
    }

    #[test]
    fn missing_bundle_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let err = VectorBundle::load(temp.path().join("absent.medrag"), 2).unwrap_err();
        assert!(matches!(err, IndexLoadError::NotFound { .. }));
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("index.medrag");
        bundle(IndexKind::Flat).save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&path, &bytes).unwrap();

        match VectorBundle::load(&path, 2) {
            Err(IndexLoadError::Corrupt(message)) => assert!(message.contains("checksum")),
            other => panic!("expected corrupt bundle, got {other:?}"),
        }
    }

    #[test]
    fn truncated_or_foreign_files_are_corrupt() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("index.medrag");
        bundle(IndexKind::Flat).save(&path).unwrap();
        let bytes = fs::read(&path).unwrap();

        fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(VectorBundle::load(&path, 2), Err(IndexLoadError::Corrupt(_))));

        fs::write(&path, b"PK\x03\x04 definitely a zip").unwrap();
        assert!(matches!(VectorBundle::load(&path, 2), Err(IndexLoadError::Corrupt(_))));
    }

    #[test]
    fn other_format_versions_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("index.medrag");
        bundle(IndexKind::Flat).save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            VectorBundle::load(&path, 2),
            Err(IndexLoadError::UnsupportedVersion { found: 7, supported: FORMAT_VERSION })
        ));
    }

    #[test]
    fn manifest_can_be_read_without_loading() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested/dir/index.medrag");
        bundle(IndexKind::Hnsw).save(&path).unwrap();

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.vector_count, 2);
        assert_eq!(manifest.index_kind, IndexKind::Hnsw);
        assert_eq!(manifest.embedding_model, "test-model");
    }

    #[test]
    fn manifest_reads_stop_at_the_header() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("index.medrag");
        bundle(IndexKind::Flat).save(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        let header_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

        // Payload cut off entirely: the full load fails, the manifest still reads.
        fs::write(&path, &bytes[..16 + header_len]).unwrap();
        assert!(matches!(VectorBundle::load(&path, 2), Err(IndexLoadError::Corrupt(_))));
        assert_eq!(read_manifest(&path).unwrap().vector_count, 2);

        fs::write(&path, &bytes[..16 + header_len - 1]).unwrap();
        assert!(matches!(read_manifest(&path), Err(IndexLoadError::Corrupt(_))));
        fs::write(&path, &bytes[..10]).unwrap();
        assert!(matches!(read_manifest(&path), Err(IndexLoadError::Corrupt(_))));
        assert!(matches!(
            read_manifest(temp.path().join("absent.medrag")),
            Err(IndexLoadError::NotFound { .. })
        ));
    }
}
