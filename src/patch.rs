//! Patch documents describing how to rebuild a candidate from a reference.
//!
//! A patch document is the ordered list of reference blocks to copy plus the
//! literal byte runs that fall between them.

use serde::{Deserialize, Serialize};

/// A literal byte run to insert verbatim during reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// Reference block matched immediately before this run, `None` if the run
    /// precedes every match.
    pub anchor_block_index: Option<u32>,
    /// Number of matched blocks emitted before this run.
    pub preceding_matches: usize,
    /// Literal bytes.
    pub literal_bytes: Vec<u8>,
}

impl Patch {
    /// Create a literal run.
    #[must_use]
    pub fn new(
        anchor_block_index: Option<u32>,
        preceding_matches: usize,
        literal_bytes: Vec<u8>,
    ) -> Self {
        Self {
            anchor_block_index,
            preceding_matches,
            literal_bytes,
        }
    }

    /// Number of literal bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.literal_bytes.len()
    }

    /// Check if the run carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.literal_bytes.is_empty()
    }
}

/// Complete description of a candidate in terms of a reference.
///
/// Replaying it in order (literals keyed by `preceding_matches`, blocks in
/// `matched_block_indices` order) reproduces the candidate byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDocument {
    /// Block size of the checksums the patch was built against.
    pub block_size: usize,
    /// Number of matched blocks.
    pub matched_block_count: usize,
    /// Matched reference blocks in emission order; duplicates allowed.
    pub matched_block_indices: Vec<u32>,
    /// Literal runs in document order.
    pub patches: Vec<Patch>,
    /// Length of the candidate this patch reproduces.
    pub candidate_length: u64,
}

impl PatchDocument {
    /// Create a patch document.
    #[must_use]
    pub fn new(
        block_size: usize,
        matched_block_indices: Vec<u32>,
        patches: Vec<Patch>,
        candidate_length: u64,
    ) -> Self {
        Self {
            block_size,
            matched_block_count: matched_block_indices.len(),
            matched_block_indices,
            patches,
            candidate_length,
        }
    }

    /// Total literal bytes across all runs.
    #[must_use]
    pub fn literal_len(&self) -> u64 {
        self.patches.iter().map(|p| p.literal_bytes.len() as u64).sum()
    }

    /// Check if the candidate was reproduced purely from reference blocks.
    #[must_use]
    pub fn is_all_matched(&self) -> bool {
        self.patches.is_empty()
    }

    /// Check if the patch describes an empty candidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matched_block_indices.is_empty() && self.patches.is_empty()
    }

    /// Fraction of candidate bytes served from the reference.
    ///
    /// Returns 1.0 for an empty candidate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // acceptable for ratio calculation
    pub fn match_ratio(&self) -> f64 {
        if self.candidate_length == 0 {
            return 1.0;
        }
        let matched = self.candidate_length.saturating_sub(self.literal_len());
        matched as f64 / self.candidate_length as f64
    }
}

/// Summary of a patch document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchStats {
    /// Number of matched blocks.
    pub matched_blocks: usize,
    /// Number of literal runs.
    pub literal_runs: usize,
    /// Total literal bytes.
    pub literal_bytes: u64,
    /// Bytes served from the reference.
    pub matched_bytes: u64,
    /// Fraction of candidate bytes served from the reference (0.0-1.0).
    pub match_ratio: f64,
}

impl PatchStats {
    /// Compute statistics from a patch document.
    #[must_use]
    pub fn from_patch(patch: &PatchDocument) -> Self {
        let literal_bytes = patch.literal_len();
        Self {
            matched_blocks: patch.matched_block_count,
            literal_runs: patch.patches.len(),
            literal_bytes,
            matched_bytes: patch.candidate_length.saturating_sub(literal_bytes),
            match_ratio: patch.match_ratio(),
        }
    }
}
