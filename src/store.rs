//! Collaborator interfaces around the delta engine.
//!
//! Content retrieval, checksum persistence and change notification live
//! outside the algorithm. This module defines their contracts and ships small
//! in-process adapters backed by memory or a local directory.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DocDeltaError, Result};
use crate::hash::StrongHashAlgorithm;
use crate::table::DocumentChecksums;

/// Supplies the raw bytes of a named document version.
pub trait ContentSource: Send + Sync {
    /// Fetch the full contents of `content_id`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the content cannot be read, or
    /// `TruncatedInput` if it ends early.
    fn fetch(&self, content_id: &str) -> Result<Vec<u8>>;
}

/// Persists checksums keyed by content identifier.
pub trait ChecksumStore: Send + Sync {
    /// Look up stored checksums.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn get(&self, content_id: &str) -> Result<Option<DocumentChecksums>>;

    /// Store checksums, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn put(&self, content_id: &str, checksums: &DocumentChecksums) -> Result<()>;
}

/// Receives fire-and-forget notifications about new checksums.
pub trait NotificationSink: Send + Sync {
    /// Announce that checksums are available.
    fn checksums_available(&self, event: &ChecksumsAvailable);
}

/// Event announcing freshly built checksums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumsAvailable {
    /// Server that built the checksums.
    pub server_id: String,
    /// Content the checksums describe.
    pub content_id: String,
    /// Block size of the checksums.
    pub block_size: usize,
    /// Number of blocks.
    pub block_count: usize,
}

impl ChecksumsAvailable {
    /// Describe `checksums` built by `server_id`.
    #[must_use]
    pub fn new(server_id: &str, content_id: &str, checksums: &DocumentChecksums) -> Self {
        Self {
            server_id: server_id.to_string(),
            content_id: content_id.to_string(),
            block_size: checksums.block_size(),
            block_count: checksums.block_count(),
        }
    }
}

/// Read exactly `expected` bytes from `reader`.
///
/// # Errors
///
/// Returns `TruncatedInput` if the reader ends before `expected` bytes.
pub fn read_exact_len<R: Read>(reader: R, expected: u64) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));
    reader.take(expected).read_to_end(&mut data)?;

    let actual = data.len() as u64;
    if actual < expected {
        return Err(DocDeltaError::TruncatedInput { expected, actual });
    }
    Ok(data)
}

// ============================================================================
// CONTENT SOURCES
// ============================================================================

/// In-memory content source.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    documents: RwLock<FxHashMap<String, Vec<u8>>>,
}

impl MemoryContentSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&self, content_id: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.documents.write().insert(content_id.into(), data.into());
    }
}

impl ContentSource for MemoryContentSource {
    fn fetch(&self, content_id: &str) -> Result<Vec<u8>> {
        self.documents.read().get(content_id).cloned().ok_or_else(|| {
            DocDeltaError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no content for {content_id}"),
            ))
        })
    }
}

/// Content source reading files below a root directory.
///
/// Content ids are relative paths; ids escaping the root are rejected.
#[derive(Debug, Clone)]
pub struct DirContentSource {
    root: PathBuf,
}

impl DirContentSource {
    /// Serve files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, content_id: &str) -> Result<PathBuf> {
        let relative = Path::new(content_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || content_id.is_empty() {
            return Err(DocDeltaError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("content id {content_id:?} is not a relative path"),
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentSource for DirContentSource {
    fn fetch(&self, content_id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(content_id)?;
        let file = File::open(&path)?;
        let expected = file.metadata()?.len();
        debug!(path = %path.display(), bytes = expected, "reading content");
        read_exact_len(file, expected)
    }
}

// ============================================================================
// CHECKSUM STORES
// ============================================================================

/// In-memory checksum store.
#[derive(Debug, Default)]
pub struct MemoryChecksumStore {
    records: RwLock<FxHashMap<String, DocumentChecksums>>,
}

impl MemoryChecksumStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl ChecksumStore for MemoryChecksumStore {
    fn get(&self, content_id: &str) -> Result<Option<DocumentChecksums>> {
        Ok(self.records.read().get(content_id).cloned())
    }

    fn put(&self, content_id: &str, checksums: &DocumentChecksums) -> Result<()> {
        self.records
            .write()
            .insert(content_id.to_string(), checksums.clone());
        Ok(())
    }
}

/// Checksum store keeping one bincode file per content id.
#[derive(Debug, Clone)]
pub struct FileChecksumStore {
    dir: PathBuf,
}

impl FileChecksumStore {
    /// Store records in `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Records are named by a fixed-length digest so long ids stay within
    /// filename limits. The id itself is kept inside the record.
    fn record_path(&self, content_id: &str) -> PathBuf {
        let name = StrongHashAlgorithm::Blake3.digest(content_id.as_bytes());
        self.dir.join(format!("{name}.checksums"))
    }
}

impl ChecksumStore for FileChecksumStore {
    fn get(&self, content_id: &str) -> Result<Option<DocumentChecksums>> {
        let path = self.record_path(content_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(bincode::deserialize(&bytes)?))
    }

    fn put(&self, content_id: &str, checksums: &DocumentChecksums) -> Result<()> {
        let path = self.record_path(content_id);
        let temp_path = path.with_extension("checksums.tmp");

        let bytes = bincode::serialize(checksums)?;
        if let Err(e) = write_and_rename(&temp_path, &path, &bytes) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_and_rename(temp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(temp_path, path)
}

// ============================================================================
// NOTIFICATION SINKS
// ============================================================================

/// Notification sink collecting events in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<ChecksumsAvailable>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<ChecksumsAvailable> {
        self.events.lock().clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn checksums_available(&self, event: &ChecksumsAvailable) {
        self.events.lock().push(event.clone());
    }
}

/// Notification sink that logs events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn checksums_available(&self, event: &ChecksumsAvailable) {
        info!(
            server_id = %event.server_id,
            content_id = %event.content_id,
            blocks = event.block_count,
            "checksums available"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::hash::StrongHashAlgorithm;
    use crate::table::BlockChecksumTable;

    fn sample_checksums() -> DocumentChecksums {
        BlockChecksumTable::new(4, StrongHashAlgorithm::Md5)
            .unwrap()
            .build("doc", b"abcdefghij")
    }

    #[test]
    fn read_exact_len_complete() {
        let data = read_exact_len(Cursor::new(b"abcdef"), 4).unwrap();
        assert_eq!(data, b"abcd");
    }

    #[test]
    fn read_exact_len_truncated() {
        let err = read_exact_len(Cursor::new(b"abc"), 48).unwrap_err();
        assert!(matches!(
            err,
            DocDeltaError::TruncatedInput {
                expected: 48,
                actual: 3
            }
        ));
    }

    #[test]
    fn memory_source_roundtrip() {
        let source = MemoryContentSource::new();
        source.insert("doc", b"contents".to_vec());
        assert_eq!(source.fetch("doc").unwrap(), b"contents");
        assert!(matches!(source.fetch("missing"), Err(DocDeltaError::Io(_))));
    }

    #[test]
    fn dir_source_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..=255).cycle().take(20_000).collect();
        fs::write(dir.path().join("doc.bin"), &data).unwrap();

        let source = DirContentSource::new(dir.path());
        assert_eq!(source.fetch("doc.bin").unwrap(), data);
    }

    #[test]
    fn dir_source_rejects_escaping_ids() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirContentSource::new(dir.path());
        assert!(source.fetch("../etc/passwd").is_err());
        assert!(source.fetch("/etc/passwd").is_err());
        assert!(source.fetch("").is_err());
    }

    #[test]
    fn memory_store_get_put() {
        let store = MemoryChecksumStore::new();
        assert!(store.get("doc").unwrap().is_none());

        let checksums = sample_checksums();
        store.put("doc", &checksums).unwrap();
        assert_eq!(store.get("doc").unwrap(), Some(checksums));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_get_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChecksumStore::open(dir.path().join("records")).unwrap();
        let id = "store://2015/1/2/content.bin";
        assert!(store.get(id).unwrap().is_none());

        let checksums = sample_checksums();
        store.put(id, &checksums).unwrap();
        let restored = store.get(id).unwrap().unwrap();
        assert_eq!(restored, checksums);
        assert_eq!(restored.bucket_count(), checksums.bucket_count());
    }

    #[test]
    fn file_store_long_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChecksumStore::open(dir.path()).unwrap();
        let id = format!("store://2015/1/2/{}.bin", "a".repeat(130));

        let checksums = sample_checksums();
        store.put(&id, &checksums).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap(), checksums);
        assert!(store.get("store://2015/1/2/other.bin").unwrap().is_none());
    }

    #[test]
    fn file_store_failed_put_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChecksumStore::open(dir.path()).unwrap();
        let path = store.record_path("doc");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), b"x").unwrap();

        assert!(matches!(
            store.put("doc", &sample_checksums()),
            Err(DocDeltaError::Io(_))
        ));
        assert!(!path.with_extension("checksums.tmp").exists());
    }

    #[test]
    fn file_store_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChecksumStore::open(dir.path()).unwrap();
        fs::write(store.record_path("doc"), b"\xFF\xFF").unwrap();
        assert!(matches!(
            store.get("doc"),
            Err(DocDeltaError::Serialization(_))
        ));
    }

    #[test]
    fn memory_notifier_collects() {
        let notifier = MemoryNotifier::new();
        let event = ChecksumsAvailable::new("server-1", "doc", &sample_checksums());
        notifier.checksums_available(&event);

        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_count, 3);
        assert_eq!(events[0].block_size, 4);
    }

    #[test]
    fn log_notifier_does_not_panic() {
        let event = ChecksumsAvailable::new("server-1", "doc", &sample_checksums());
        LogNotifier.checksums_available(&event);
    }
}
