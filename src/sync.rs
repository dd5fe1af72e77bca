//! Delta engine: checksum building, patch building and reconstruction.
//!
//! This module provides the `DeltaSync` trait and the configured
//! `DeltaEngine`, plus free functions for the default configuration.

use std::io::Write;

use tracing::{debug, warn};

use crate::builder::PatchBuilder;
use crate::error::{DocDeltaError, Result};
use crate::hash::StrongHashAlgorithm;
use crate::patch::PatchDocument;
use crate::table::{
    validate_block_size, BlockChecksumTable, DocumentChecksums, DEFAULT_PARALLEL_THRESHOLD,
};

/// Block size used when none is configured (10 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 10 * 1024;

/// Core delta operations.
///
/// 1. **Checksums**: split a reference into checksummed blocks
/// 2. **Patch**: describe a candidate as reference blocks plus literals
/// 3. **Reconstruct**: replay a patch against the reference
pub trait DeltaSync {
    /// Build block checksums for a reference document.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine configuration is invalid.
    fn checksums(&self, document_id: &str, reference: &[u8]) -> Result<DocumentChecksums>;

    /// Build a patch document for `candidate` against `checksums`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the checksums were built with a
    /// different block size.
    fn patch(&self, candidate: &[u8], checksums: &DocumentChecksums) -> Result<PatchDocument>;

    /// Rebuild the candidate described by `patch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference, checksums and patch disagree.
    fn reconstruct(
        &self,
        reference: &[u8],
        checksums: &DocumentChecksums,
        patch: &PatchDocument,
    ) -> Result<Vec<u8>>;
}

/// Configuration for delta operations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Block size for checksum generation (at least 1).
    pub block_size: usize,
    /// Strong hash algorithm for new checksums.
    pub algorithm: StrongHashAlgorithm,
    /// Verify each copied reference block against its strong digest.
    pub verify_blocks: bool,
    /// References above this size are hashed in parallel.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            algorithm: StrongHashAlgorithm::default(),
            verify_blocks: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

/// Builder for creating engines with custom configuration.
///
/// # Example
///
/// ```rust
/// use docdelta::{EngineBuilder, StrongHashAlgorithm};
///
/// let engine = EngineBuilder::new()
///     .block_size(4096)
///     .algorithm(StrongHashAlgorithm::Blake3)
///     .build()
///     .unwrap();
/// assert_eq!(engine.block_size(), 4096);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size.
    #[must_use]
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the strong hash algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: StrongHashAlgorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Enable or disable block verification during reconstruction.
    #[must_use]
    pub fn verify_blocks(mut self, verify: bool) -> Self {
        self.config.verify_blocks = verify;
        self
    }

    /// Set the parallel hashing threshold in bytes.
    #[must_use]
    pub fn parallel_threshold(mut self, threshold: usize) -> Self {
        self.config.parallel_threshold = threshold;
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the block size is zero.
    pub fn build(self) -> Result<DeltaEngine> {
        let table = BlockChecksumTable::new(self.config.block_size, self.config.algorithm)?
            .with_parallel_threshold(self.config.parallel_threshold);
        Ok(DeltaEngine {
            config: self.config,
            table,
        })
    }
}

/// Delta engine implementing the rsync block-matching algorithm.
#[derive(Debug, Clone)]
pub struct DeltaEngine {
    config: EngineConfig,
    table: BlockChecksumTable,
}

impl DeltaEngine {
    /// Create an engine with a custom block size and default settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the block size is zero.
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        EngineBuilder::new().block_size(block_size).build()
    }

    /// Get the configured block size.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build checksums for many documents in parallel.
    #[must_use]
    pub fn checksums_many<S: AsRef<str> + Sync, D: AsRef<[u8]> + Sync>(
        &self,
        documents: &[(S, D)],
    ) -> Vec<DocumentChecksums> {
        self.table.build_many(documents)
    }

    /// Replay `patch` into `output`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the inputs are inconsistent.
    pub fn reconstruct_to<W: Write>(
        &self,
        reference: &[u8],
        checksums: &DocumentChecksums,
        patch: &PatchDocument,
        output: W,
    ) -> Result<u64> {
        replay(reference, checksums, patch, self.config.verify_blocks, output)
    }
}

impl DeltaSync for DeltaEngine {
    fn checksums(&self, document_id: &str, reference: &[u8]) -> Result<DocumentChecksums> {
        Ok(self.table.build(document_id, reference))
    }

    fn patch(&self, candidate: &[u8], checksums: &DocumentChecksums) -> Result<PatchDocument> {
        if checksums.block_size() != self.config.block_size {
            return Err(DocDeltaError::InvalidConfiguration(format!(
                "checksums use block size {}, engine uses {}",
                checksums.block_size(),
                self.config.block_size
            )));
        }
        Ok(PatchBuilder::new(checksums, candidate).build())
    }

    fn reconstruct(
        &self,
        reference: &[u8],
        checksums: &DocumentChecksums,
        patch: &PatchDocument,
    ) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.reconstruct_to(reference, checksums, patch, &mut output)?;
        Ok(output)
    }
}

/// Build checksums for `reference` with the default algorithm.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if `block_size` is zero.
pub fn build_checksums(reference: &[u8], block_size: usize) -> Result<DocumentChecksums> {
    let table = BlockChecksumTable::new(block_size, StrongHashAlgorithm::default())?;
    Ok(table.build("", reference))
}

/// Build a patch for `candidate` against `checksums`, using their block size.
#[must_use]
pub fn build_patch(candidate: &[u8], checksums: &DocumentChecksums) -> PatchDocument {
    PatchBuilder::new(checksums, candidate).build()
}

/// Rebuild the candidate described by `patch`, verifying every copied block.
///
/// # Errors
///
/// Returns an error if the reference, checksums and patch disagree.
pub fn reconstruct(
    reference: &[u8],
    checksums: &DocumentChecksums,
    patch: &PatchDocument,
) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    replay(reference, checksums, patch, true, &mut output)?;
    Ok(output)
}

fn replay<W: Write>(
    reference: &[u8],
    checksums: &DocumentChecksums,
    patch: &PatchDocument,
    verify_blocks: bool,
    mut output: W,
) -> Result<u64> {
    validate_block_size(patch.block_size)?;
    if patch.block_size != checksums.block_size() {
        return Err(DocDeltaError::InvalidConfiguration(format!(
            "patch uses block size {}, checksums use {}",
            patch.block_size,
            checksums.block_size()
        )));
    }

    let reference_len = reference.len() as u64;
    if reference_len < checksums.original_length() {
        return Err(DocDeltaError::TruncatedInput {
            expected: checksums.original_length(),
            actual: reference_len,
        });
    }
    if reference_len != checksums.original_length() {
        return Err(DocDeltaError::InvalidConfiguration(format!(
            "reference is {reference_len} bytes, checksums describe {}",
            checksums.original_length()
        )));
    }

    if patch.matched_block_count != patch.matched_block_indices.len() {
        return Err(DocDeltaError::CorruptedPatch(format!(
            "matched block count {} disagrees with {} recorded indices",
            patch.matched_block_count,
            patch.matched_block_indices.len()
        )));
    }

    let mut written = 0u64;
    let mut runs = patch.patches.iter().peekable();

    for (ordinal, &block_index) in patch.matched_block_indices.iter().enumerate() {
        while let Some(run) = runs.next_if(|run| run.preceding_matches <= ordinal) {
            if run.preceding_matches != ordinal {
                return Err(DocDeltaError::CorruptedPatch(
                    "literal runs are out of order".to_string(),
                ));
            }
            output.write_all(&run.literal_bytes)?;
            written += run.literal_bytes.len() as u64;
        }

        let Some(checksum) = checksums.checksums().get(block_index as usize) else {
            return Err(DocDeltaError::InvalidBlockIndex {
                index: block_index,
                block_count: checksums.block_count(),
            });
        };

        let block = &reference[checksums.block_range(block_index)];
        if verify_blocks && checksums.algorithm().digest(block) != checksum.strong_digest {
            warn!(block_index, "reference block failed strong digest verification");
            return Err(DocDeltaError::BlockMismatch { index: block_index });
        }

        output.write_all(block)?;
        written += block.len() as u64;
    }

    let matched = patch.matched_block_indices.len();
    for run in runs {
        if run.preceding_matches != matched {
            return Err(DocDeltaError::CorruptedPatch(format!(
                "literal run claims {} preceding matches, patch has {matched}",
                run.preceding_matches
            )));
        }
        output.write_all(&run.literal_bytes)?;
        written += run.literal_bytes.len() as u64;
    }

    if written != patch.candidate_length {
        return Err(DocDeltaError::CorruptedPatch(format!(
            "reconstructed {written} bytes, patch describes {}",
            patch.candidate_length
        )));
    }

    output.flush()?;
    debug!(
        document_id = checksums.document_id(),
        bytes = written,
        "reconstructed candidate"
    );
    Ok(written)
}
