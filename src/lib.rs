//! # docdelta
//!
//! rsync-style content deltas for versioned documents.
//!
//! A reference document is split into fixed-size blocks, each described by a
//! rollable weak checksum and a strong digest. A candidate document is then
//! scanned byte by byte for runs that match reference blocks, producing a
//! compact patch document: reference block indices plus literal bytes. The
//! patch replays against the reference to reproduce the candidate exactly.
//!
//! ## Features
//!
//! - **Weak Checksum**: Adler-style 16-bit pair with O(1) window sliding
//! - **Strong Hash**: MD5 by default, BLAKE3 optional, for block verification
//! - **Bucket Lookup**: 16-bit bucket index over reference blocks
//! - **Reconstruction**: verified replay of patch documents
//!
//! ## Example
//!
//! ```rust
//! use docdelta::{build_checksums, build_patch, reconstruct};
//!
//! let reference = b"the quick brown fox jumps over the lazy dog";
//! let checksums = build_checksums(reference, 8).unwrap();
//!
//! let candidate = b"the quick brown cat jumps over the lazy dog";
//! let patch = build_patch(candidate, &checksums);
//! assert!(patch.matched_block_count > 0);
//!
//! let rebuilt = reconstruct(reference, &checksums, &patch).unwrap();
//! assert_eq!(rebuilt, candidate);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

#[cfg(feature = "async")]
pub mod async_sync;
mod builder;
mod checksum;
mod error;
mod hash;
mod patch;
mod service;
mod store;
mod sync;
mod table;

pub use builder::{DiagnosticSink, PatchBuilder, ScanEvent, ScanState, TracingSink};
pub use checksum::{hash16, roll_parts, WeakChecksum};
pub use error::{DocDeltaError, Result};
pub use hash::{StrongDigest, StrongHashAlgorithm};
pub use patch::{Patch, PatchDocument, PatchStats};
pub use service::{md5_hex, ChecksumService, ServiceConfig};
pub use store::{
    read_exact_len, ChecksumStore, ChecksumsAvailable, ContentSource, DirContentSource,
    FileChecksumStore, LogNotifier, MemoryChecksumStore, MemoryContentSource, MemoryNotifier,
    NotificationSink,
};
pub use sync::{
    build_checksums, build_patch, reconstruct, DeltaEngine, DeltaSync, EngineBuilder,
    EngineConfig, DEFAULT_BLOCK_SIZE,
};
pub use table::{validate_block_size, BlockChecksumTable, Checksum, DocumentChecksums};
