//! Streaming patch builder.
//!
//! Walks a candidate buffer one position at a time, rolling the weak checksum
//! forward and probing the reference table. A confirmed match jumps the cursor
//! a whole block ahead; anything else becomes a literal byte. Matches can
//! therefore be found at any byte offset, not just at block multiples.

use tracing::{debug, trace};

use crate::checksum::WeakChecksum;
use crate::patch::{Patch, PatchDocument};
use crate::table::DocumentChecksums;

/// State of a [`PatchBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Probing the window at the cursor.
    Scanning,
    /// A block matched at the cursor and is about to be recorded.
    Matched,
    /// The literal accumulator is being emitted as a patch.
    FlushingLiteral,
    /// The whole candidate has been consumed.
    Done,
}

/// Event observed while scanning a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Reference block matched at `offset` in the candidate.
    BlockMatched {
        /// Candidate offset of the matched window.
        offset: usize,
        /// Matched reference block.
        block_index: u32,
    },
    /// A literal run was emitted.
    LiteralFlushed {
        /// Match preceding the run.
        anchor_block_index: Option<u32>,
        /// Run length in bytes.
        len: usize,
    },
    /// Scanning completed.
    Finished {
        /// Matched blocks.
        matched_blocks: usize,
        /// Literal runs.
        literal_runs: usize,
    },
}

/// Receiver for scan diagnostics, passed to a builder explicitly.
pub trait DiagnosticSink {
    /// Record one event.
    fn record(&self, event: &ScanEvent);
}

/// Sink forwarding scan events to `tracing` at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &ScanEvent) {
        match event {
            ScanEvent::BlockMatched {
                offset,
                block_index,
            } => trace!(offset, block_index, "block matched"),
            ScanEvent::LiteralFlushed {
                anchor_block_index,
                len,
            } => trace!(anchor = ?anchor_block_index, len, "literal flushed"),
            ScanEvent::Finished {
                matched_blocks,
                literal_runs,
            } => trace!(matched_blocks, literal_runs, "scan finished"),
        }
    }
}

/// Builds a [`PatchDocument`] for one candidate against one reference.
///
/// Each builder owns its cursor and literal accumulator; builders are not
/// meant to be shared between callers.
///
/// # Example
///
/// ```rust
/// use docdelta::{BlockChecksumTable, PatchBuilder, StrongHashAlgorithm};
///
/// let checksums = BlockChecksumTable::new(4, StrongHashAlgorithm::Md5)
///     .unwrap()
///     .build("doc", b"abcdefgh");
/// let patch = PatchBuilder::new(&checksums, b"XabcdefghY").build();
///
/// assert_eq!(patch.matched_block_indices, vec![0, 1]);
/// assert_eq!(patch.patches.len(), 2);
/// ```
pub struct PatchBuilder<'a> {
    checksums: &'a DocumentChecksums,
    data: &'a [u8],
    cursor: usize,
    state: ScanState,
    /// Weak checksum of the previous full window, if rolling is still valid
    rolling: Option<WeakChecksum>,
    literal: Vec<u8>,
    pending_match: Option<u32>,
    last_match: Option<u32>,
    matched: Vec<u32>,
    patches: Vec<Patch>,
    diagnostics: Option<&'a dyn DiagnosticSink>,
}

impl<'a> PatchBuilder<'a> {
    /// Start scanning `candidate` at offset 0.
    #[must_use]
    pub fn new(checksums: &'a DocumentChecksums, candidate: &'a [u8]) -> Self {
        Self {
            checksums,
            data: candidate,
            cursor: 0,
            state: ScanState::Scanning,
            rolling: None,
            literal: Vec::new(),
            pending_match: None,
            last_match: None,
            matched: Vec::new(),
            patches: Vec::new(),
            diagnostics: None,
        }
    }

    /// Report scan events to `sink`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: &'a dyn DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Current candidate offset.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes waiting in the literal accumulator.
    #[must_use]
    pub fn pending_literal_len(&self) -> usize {
        self.literal.len()
    }

    /// Advance the state machine by one transition.
    pub fn step(&mut self) -> ScanState {
        self.state = match self.state {
            ScanState::Scanning => self.scan(),
            ScanState::FlushingLiteral => self.flush_literal(),
            ScanState::Matched => self.commit_match(),
            ScanState::Done => ScanState::Done,
        };
        self.state
    }

    /// Run to completion and return the patch document.
    #[must_use]
    pub fn build(mut self) -> PatchDocument {
        while self.step() != ScanState::Done {}

        self.emit(&ScanEvent::Finished {
            matched_blocks: self.matched.len(),
            literal_runs: self.patches.len(),
        });
        debug!(
            document_id = self.checksums.document_id(),
            candidate_bytes = self.data.len(),
            matched_blocks = self.matched.len(),
            literal_runs = self.patches.len(),
            "built patch document"
        );

        PatchDocument::new(
            self.checksums.block_size(),
            self.matched,
            self.patches,
            self.data.len() as u64,
        )
    }

    fn scan(&mut self) -> ScanState {
        let data = self.data;
        let len = data.len();
        let i = self.cursor;

        if i >= len {
            return self.end_of_data();
        }

        if self.checksums.is_empty() {
            self.literal.extend_from_slice(&data[i..]);
            self.cursor = len;
            return self.end_of_data();
        }

        let block_size = self.checksums.block_size();
        let remaining = len - i;
        let full = remaining >= block_size;
        let window_len = if full { block_size } else { remaining };
        let window = &data[i..i + window_len];

        // A short tail window can only match the reference's last block.
        if !full && window_len != self.tail_block_len() {
            self.literal.push(data[i]);
            self.cursor += 1;
            return ScanState::Scanning;
        }

        let weak = match self.rolling.take() {
            Some(mut prev) if full => {
                prev.roll(data[i - 1], data[i + block_size - 1]);
                prev
            }
            _ => WeakChecksum::compute(window),
        };

        if let Some(checksum) = self.checksums.find_match(&weak, window) {
            self.pending_match = Some(checksum.block_index);
            self.emit(&ScanEvent::BlockMatched {
                offset: i,
                block_index: checksum.block_index,
            });
            return if self.literal.is_empty() {
                ScanState::Matched
            } else {
                ScanState::FlushingLiteral
            };
        }

        self.literal.push(data[i]);
        self.cursor += 1;
        if full {
            self.rolling = Some(weak);
        }
        ScanState::Scanning
    }

    fn tail_block_len(&self) -> usize {
        let count = self.checksums.block_count();
        u32::try_from(count.saturating_sub(1)).map_or(0, |last| self.checksums.block_len(last))
    }

    fn end_of_data(&self) -> ScanState {
        if self.literal.is_empty() {
            ScanState::Done
        } else {
            ScanState::FlushingLiteral
        }
    }

    fn flush_literal(&mut self) -> ScanState {
        let bytes = std::mem::take(&mut self.literal);
        self.emit(&ScanEvent::LiteralFlushed {
            anchor_block_index: self.last_match,
            len: bytes.len(),
        });
        self.patches
            .push(Patch::new(self.last_match, self.matched.len(), bytes));

        if self.pending_match.is_some() {
            ScanState::Matched
        } else {
            ScanState::Done
        }
    }

    fn commit_match(&mut self) -> ScanState {
        if let Some(block_index) = self.pending_match.take() {
            self.matched.push(block_index);
            self.last_match = Some(block_index);
            self.cursor = self
                .cursor
                .saturating_add(self.checksums.block_size())
                .min(self.data.len());
            self.rolling = None;
        }
        ScanState::Scanning
    }

    fn emit(&self, event: &ScanEvent) {
        if let Some(sink) = self.diagnostics {
            sink.record(event);
        }
    }
}
