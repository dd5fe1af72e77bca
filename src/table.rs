//! Block checksum tables for reference documents.
//!
//! A reference document is split into fixed-size blocks (the last one may be
//! shorter). Each block gets a weak rolling checksum for fast filtering and a
//! strong digest for verification, and the table is bucketed by the 16-bit
//! weak hash so candidate lookup during patch building is O(1).

use std::ops::Range;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::WeakChecksum;
use crate::error::{DocDeltaError, Result};
use crate::hash::{StrongDigest, StrongHashAlgorithm};

/// References above this size build their block checksums in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64 * 1024;

/// Checksum record for a single reference block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Position of the block in the reference (0-based).
    pub block_index: u32,
    /// 16-bit bucket key.
    pub weak_hash16: u16,
    /// Combined 32-bit weak checksum.
    pub weak_checksum32: u32,
    /// Strong digest of the block contents.
    pub strong_digest: StrongDigest,
}

impl Checksum {
    /// Create a checksum record from precomputed values.
    #[must_use]
    pub const fn new(
        block_index: u32,
        weak_hash16: u16,
        weak_checksum32: u32,
        strong_digest: StrongDigest,
    ) -> Self {
        Self {
            block_index,
            weak_hash16,
            weak_checksum32,
            strong_digest,
        }
    }

    /// Compute the checksum record for one block.
    #[must_use]
    pub fn compute(block_index: u32, block: &[u8], algorithm: StrongHashAlgorithm) -> Self {
        let weak = WeakChecksum::compute(block);
        Self {
            block_index,
            weak_hash16: weak.hash16(),
            weak_checksum32: weak.combined(),
            strong_digest: algorithm.digest(block),
        }
    }
}

/// Ordered block checksums for one version of a reference document.
///
/// Read-only once built. The bucket index is derived from `checksums` and is
/// rebuilt on deserialization rather than persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChecksumsRecord", into = "ChecksumsRecord")]
pub struct DocumentChecksums {
    document_id: String,
    block_size: usize,
    original_length: u64,
    algorithm: StrongHashAlgorithm,
    checksums: Vec<Checksum>,
    /// weak hash16 -> positions in `checksums`, ascending
    buckets: FxHashMap<u16, Vec<usize>>,
}

impl DocumentChecksums {
    /// Assemble checksums computed elsewhere, validating the table invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the block size is zero, the block
    /// count does not cover `original_length`, indices are out of order, or a
    /// digest was produced by a different algorithm.
    pub fn from_parts(
        document_id: impl Into<String>,
        block_size: usize,
        original_length: u64,
        algorithm: StrongHashAlgorithm,
        checksums: Vec<Checksum>,
    ) -> Result<Self> {
        validate_block_size(block_size)?;

        let expected_blocks = original_length.div_ceil(block_size as u64);
        if checksums.len() as u64 != expected_blocks {
            return Err(DocDeltaError::InvalidConfiguration(format!(
                "{} checksums cannot describe {original_length} bytes in blocks of {block_size}",
                checksums.len()
            )));
        }

        for (i, checksum) in checksums.iter().enumerate() {
            if checksum.block_index as usize != i {
                return Err(DocDeltaError::InvalidConfiguration(format!(
                    "checksum at position {i} has block index {}",
                    checksum.block_index
                )));
            }
            if checksum.strong_digest.algorithm() != algorithm {
                return Err(DocDeltaError::InvalidConfiguration(format!(
                    "block {i} digest is {}, table uses {algorithm}",
                    checksum.strong_digest.algorithm()
                )));
            }
        }

        Ok(Self::indexed(
            document_id.into(),
            block_size,
            original_length,
            algorithm,
            checksums,
        ))
    }

    fn indexed(
        document_id: String,
        block_size: usize,
        original_length: u64,
        algorithm: StrongHashAlgorithm,
        checksums: Vec<Checksum>,
    ) -> Self {
        let mut buckets: FxHashMap<u16, Vec<usize>> =
            FxHashMap::with_capacity_and_hasher(checksums.len(), rustc_hash::FxBuildHasher);

        for (i, checksum) in checksums.iter().enumerate() {
            buckets.entry(checksum.weak_hash16).or_default().push(i);
        }

        Self {
            document_id,
            block_size,
            original_length,
            algorithm,
            checksums,
            buckets,
        }
    }

    /// All checksums sharing a 16-bit bucket, in ascending block order.
    pub fn lookup(&self, weak_hash16: u16) -> impl Iterator<Item = &Checksum> + '_ {
        self.buckets
            .get(&weak_hash16)
            .into_iter()
            .flatten()
            .map(move |&i| &self.checksums[i])
    }

    /// Find the first block whose weak checksum, length and strong digest
    /// all agree with `window`.
    ///
    /// The strong digest of `window` is computed at most once, and only if a
    /// candidate survives the 32-bit weak comparison.
    #[must_use]
    pub fn find_match(&self, weak: &WeakChecksum, window: &[u8]) -> Option<&Checksum> {
        let combined = weak.combined();
        let mut strong: Option<StrongDigest> = None;

        self.lookup(weak.hash16())
            .filter(|checksum| checksum.weak_checksum32 == combined)
            .filter(|checksum| self.block_len(checksum.block_index) == window.len())
            .find(|checksum| {
                let digest = *strong.get_or_insert_with(|| self.algorithm.digest(window));
                checksum.strong_digest == digest
            })
    }

    /// Check if a bucket has any candidates.
    #[must_use]
    pub fn has_bucket(&self, weak_hash16: u16) -> bool {
        self.buckets.contains_key(&weak_hash16)
    }

    /// Byte range of a block within the reference.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn block_range(&self, block_index: u32) -> Range<usize> {
        let start = (block_index as usize).saturating_mul(self.block_size);
        let end = start
            .saturating_add(self.block_size)
            .min(self.original_length as usize);
        start..end.max(start)
    }

    /// Length of a block in bytes (0 for indices past the end).
    #[must_use]
    pub fn block_len(&self, block_index: u32) -> usize {
        self.block_range(block_index).len()
    }

    /// Identifier of the document these checksums describe.
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Block size used to split the reference.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Length of the reference in bytes.
    #[must_use]
    pub const fn original_length(&self) -> u64 {
        self.original_length
    }

    /// Strong hash algorithm of every digest in the table.
    #[must_use]
    pub const fn algorithm(&self) -> StrongHashAlgorithm {
        self.algorithm
    }

    /// Checksums in block order.
    #[must_use]
    pub fn checksums(&self) -> &[Checksum] {
        &self.checksums
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.checksums.len()
    }

    /// Check if the reference was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    /// Number of distinct 16-bit buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Persisted shape of [`DocumentChecksums`].
#[derive(Clone, Serialize, Deserialize)]
struct ChecksumsRecord {
    document_id: String,
    block_size: usize,
    original_length: u64,
    algorithm: StrongHashAlgorithm,
    checksums: Vec<Checksum>,
}

impl TryFrom<ChecksumsRecord> for DocumentChecksums {
    type Error = DocDeltaError;

    fn try_from(record: ChecksumsRecord) -> Result<Self> {
        Self::from_parts(
            record.document_id,
            record.block_size,
            record.original_length,
            record.algorithm,
            record.checksums,
        )
    }
}

impl From<DocumentChecksums> for ChecksumsRecord {
    fn from(table: DocumentChecksums) -> Self {
        Self {
            document_id: table.document_id,
            block_size: table.block_size,
            original_length: table.original_length,
            algorithm: table.algorithm,
            checksums: table.checksums,
        }
    }
}

/// Builder of [`DocumentChecksums`] for a fixed block size and algorithm.
///
/// # Example
///
/// ```rust
/// use docdelta::{BlockChecksumTable, StrongHashAlgorithm};
///
/// let table = BlockChecksumTable::new(4, StrongHashAlgorithm::Md5).unwrap();
/// let checksums = table.build("doc", b"0123456789");
/// assert_eq!(checksums.block_count(), 3);
/// assert_eq!(checksums.block_len(2), 2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BlockChecksumTable {
    block_size: usize,
    algorithm: StrongHashAlgorithm,
    parallel_threshold: usize,
}

impl BlockChecksumTable {
    /// Create a table builder.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `block_size` is zero.
    pub fn new(block_size: usize, algorithm: StrongHashAlgorithm) -> Result<Self> {
        validate_block_size(block_size)?;
        Ok(Self {
            block_size,
            algorithm,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        })
    }

    /// Reference size above which blocks are hashed on the rayon pool.
    #[must_use]
    pub const fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Block size this builder splits references into.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Build checksums over the entire reference buffer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self, document_id: impl Into<String>, reference: &[u8]) -> DocumentChecksums {
        let algorithm = self.algorithm;
        let checksums: Vec<Checksum> = if reference.len() > self.parallel_threshold {
            reference
                .par_chunks(self.block_size)
                .enumerate()
                .map(|(i, block)| Checksum::compute(i as u32, block, algorithm))
                .collect()
        } else {
            reference
                .chunks(self.block_size)
                .enumerate()
                .map(|(i, block)| Checksum::compute(i as u32, block, algorithm))
                .collect()
        };

        let document_id = document_id.into();
        debug!(
            document_id = %document_id,
            bytes = reference.len(),
            blocks = checksums.len(),
            block_size = self.block_size,
            "built block checksums"
        );

        DocumentChecksums::indexed(
            document_id,
            self.block_size,
            reference.len() as u64,
            algorithm,
            checksums,
        )
    }

    /// Build checksums for many independent documents across the rayon pool.
    ///
    /// Output order matches input order.
    #[must_use]
    pub fn build_many<S: AsRef<str> + Sync, D: AsRef<[u8]> + Sync>(
        &self,
        documents: &[(S, D)],
    ) -> Vec<DocumentChecksums> {
        documents
            .par_iter()
            .map(|(id, data)| self.build(id.as_ref(), data.as_ref()))
            .collect()
    }
}

/// Reject block sizes that cannot split a document.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if `block_size` is zero.
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(DocDeltaError::InvalidConfiguration(
            "block size must be at least 1".to_string(),
        ));
    }
    Ok(())
}
