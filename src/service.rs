//! Checksum service tying the engine to its collaborators.
//!
//! For a named piece of content the service fetches the whole document,
//! builds block checksums, stores them and announces them. Later versions of
//! the content are diffed against the stored checksums.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{DocDeltaError, Result};
use crate::hash::StrongHashAlgorithm;
use crate::patch::PatchDocument;
use crate::store::{ChecksumStore, ChecksumsAvailable, ContentSource, NotificationSink};
use crate::sync::{build_patch, DeltaEngine, DeltaSync, EngineBuilder, DEFAULT_BLOCK_SIZE};
use crate::table::DocumentChecksums;

/// Configuration for a [`ChecksumService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Identity reported in notifications.
    pub server_id: String,
    /// Block size for new checksums.
    pub block_size: usize,
    /// Strong hash algorithm for new checksums.
    pub algorithm: StrongHashAlgorithm,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_id: "docdelta".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            algorithm: StrongHashAlgorithm::Md5,
        }
    }
}

/// Builds, stores and serves document checksums.
pub struct ChecksumService<S, C> {
    server_id: String,
    engine: DeltaEngine,
    source: S,
    store: C,
    notifier: Option<Box<dyn NotificationSink>>,
}

impl<S: ContentSource, C: ChecksumStore> ChecksumService<S, C> {
    /// Create a service without a notification sink.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the block size is zero.
    pub fn new(config: ServiceConfig, source: S, store: C) -> Result<Self> {
        let engine = EngineBuilder::new()
            .block_size(config.block_size)
            .algorithm(config.algorithm)
            .build()?;
        Ok(Self {
            server_id: config.server_id,
            engine,
            source,
            store,
            notifier: None,
        })
    }

    /// Announce new checksums to `sink`.
    #[must_use]
    pub fn with_notifier(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.notifier = Some(Box::new(sink));
        self
    }

    /// Block size used for new checksums.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.engine.block_size()
    }

    /// Underlying checksum store.
    #[must_use]
    pub const fn store(&self) -> &C {
        &self.store
    }

    /// Build checksums over the whole of `content_id`, store and announce them.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be fetched or stored.
    pub fn extract_checksums(&self, content_id: &str) -> Result<DocumentChecksums> {
        let data = self.source.fetch(content_id)?;
        let checksums = self.engine.checksums(content_id, &data)?;
        self.store.put(content_id, &checksums)?;

        info!(
            content_id,
            bytes = data.len(),
            blocks = checksums.block_count(),
            "extracted checksums"
        );
        self.notify(content_id, &checksums);
        Ok(checksums)
    }

    /// Extract checksums for many documents in parallel.
    ///
    /// Each document succeeds or fails independently; results keep the
    /// input order.
    pub fn extract_many(&self, content_ids: &[&str]) -> Vec<Result<DocumentChecksums>> {
        content_ids
            .par_iter()
            .map(|id| self.extract_checksums(id))
            .collect()
    }

    /// Stored checksums for `content_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_checksums(&self, content_id: &str) -> Result<Option<DocumentChecksums>> {
        self.store.get(content_id)
    }

    /// Diff `candidate` against the stored checksums of `content_id`.
    ///
    /// The stored block size is used even if the service now builds new
    /// checksums with a different one.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumsNotFound` if nothing is stored for `content_id`.
    pub fn create_patch(&self, content_id: &str, candidate: &[u8]) -> Result<PatchDocument> {
        let checksums = self.require_checksums(content_id)?;
        let patch = build_patch(candidate, &checksums);
        debug!(
            content_id,
            matched_blocks = patch.matched_block_count,
            literal_bytes = patch.literal_len(),
            "created patch"
        );
        Ok(patch)
    }

    /// Rebuild a candidate from the current reference content and a patch.
    ///
    /// # Errors
    ///
    /// Returns `ChecksumsNotFound` if nothing is stored, or any reconstruction
    /// error.
    pub fn apply_patch(&self, content_id: &str, patch: &PatchDocument) -> Result<Vec<u8>> {
        let checksums = self.require_checksums(content_id)?;
        let reference = self.source.fetch(content_id)?;
        self.engine.reconstruct(&reference, &checksums, patch)
    }

    fn require_checksums(&self, content_id: &str) -> Result<DocumentChecksums> {
        self.store
            .get(content_id)?
            .ok_or_else(|| DocDeltaError::ChecksumsNotFound(content_id.to_string()))
    }

    fn notify(&self, content_id: &str, checksums: &DocumentChecksums) {
        if let Some(sink) = &self.notifier {
            let event = ChecksumsAvailable::new(&self.server_id, content_id, checksums);
            debug!(?event, "sending event");
            sink.checksums_available(&event);
        }
    }
}

/// Lowercase hex MD5 of `bytes`.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    StrongHashAlgorithm::Md5.digest(bytes).to_hex()
}
