//! Async delta operations using tokio.
//!
//! The scan and replay themselves are CPU-bound and stay synchronous; this
//! module handles reading whole documents from async sources and writing
//! reconstructed output to async sinks.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{DocDeltaError, Result};
use crate::patch::{PatchDocument, PatchStats};
use crate::sync::{DeltaEngine, DeltaSync, EngineConfig};
use crate::table::DocumentChecksums;

/// Async front end for a [`DeltaEngine`].
#[derive(Debug, Clone)]
pub struct AsyncDeltaEngine {
    engine: DeltaEngine,
}

impl AsyncDeltaEngine {
    /// Wrap a configured engine.
    #[must_use]
    pub const fn new(engine: DeltaEngine) -> Self {
        Self { engine }
    }

    /// Create with custom block size.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the block size is zero.
    pub fn with_block_size(block_size: usize) -> Result<Self> {
        DeltaEngine::with_block_size(block_size).map(Self::new)
    }

    /// Get the configured block size.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.engine.block_size()
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Read the whole reference from `reader` and build its checksums.
    ///
    /// With `expected_len` set, a reader that ends early is rejected with
    /// `TruncatedInput` instead of being checksummed partially.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the input is truncated.
    pub async fn checksums_from_reader<R>(
        &self,
        document_id: &str,
        reader: R,
        expected_len: Option<u64>,
    ) -> Result<DocumentChecksums>
    where
        R: AsyncRead + Unpin,
    {
        let reference = read_document(reader, expected_len).await?;
        self.engine.checksums(document_id, &reference)
    }

    /// Read the whole candidate from `reader` and diff it against `checksums`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the block sizes disagree.
    pub async fn patch_from_reader<R>(
        &self,
        reader: R,
        checksums: &DocumentChecksums,
    ) -> Result<PatchDocument>
    where
        R: AsyncRead + Unpin,
    {
        let candidate = read_document(reader, None).await?;
        self.engine.patch(&candidate, checksums)
    }

    /// Replay `patch` against `reference` into `output`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if reconstruction or writing fails. Nothing is
    /// written when the patch does not replay cleanly.
    pub async fn reconstruct_to_writer<W>(
        &self,
        reference: &[u8],
        checksums: &DocumentChecksums,
        patch: &PatchDocument,
        mut output: W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let rebuilt = self.engine.reconstruct(reference, checksums, patch)?;
        output.write_all(&rebuilt).await?;
        output.flush().await?;
        Ok(rebuilt.len() as u64)
    }

    /// Replay `patch` against `reference` into the file at `output_path`.
    ///
    /// The output is written to a temporary file and renamed into place, so
    /// an existing file is left untouched when the patch does not replay.
    ///
    /// # Errors
    ///
    /// Returns an error if reconstruction or any I/O operation fails.
    pub async fn reconstruct_to_file<P: AsRef<Path>>(
        &self,
        reference: &[u8],
        checksums: &DocumentChecksums,
        patch: &PatchDocument,
        output_path: P,
    ) -> Result<u64> {
        let rebuilt = self.engine.reconstruct(reference, checksums, patch)?;
        replace_file(output_path.as_ref(), &rebuilt).await?;
        Ok(rebuilt.len() as u64)
    }

    /// Bring `target` up to date with `candidate`.
    ///
    /// The current target contents act as the reference. A missing target is
    /// treated as empty. Output is written to a temporary file and renamed
    /// over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if any I/O operation fails.
    pub async fn update_file<P1, P2>(
        &self,
        candidate_path: P1,
        target_path: P2,
    ) -> Result<PatchStats>
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
    {
        let candidate_path = candidate_path.as_ref();
        let target_path = target_path.as_ref();

        let candidate = tokio::fs::read(candidate_path).await?;
        let reference = match tokio::fs::read(target_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let id = target_path.to_string_lossy();
        let checksums = self.engine.checksums(&id, &reference)?;
        let patch = self.engine.patch(&candidate, &checksums)?;
        let rebuilt = self.engine.reconstruct(&reference, &checksums, &patch)?;

        replace_file(target_path, &rebuilt).await?;

        let stats = PatchStats::from_patch(&patch);
        debug!(
            target = %target_path.display(),
            matched_blocks = stats.matched_blocks,
            literal_bytes = stats.literal_bytes,
            "updated file"
        );
        Ok(stats)
    }
}

/// Write `data` beside `path` and rename it over `path`.
///
/// The temporary file is removed if either step fails.
async fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("docdelta.tmp");
    let written = match tokio::fs::write(&temp_path, data).await {
        Ok(()) => tokio::fs::rename(&temp_path, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Read an entire document, enforcing `expected_len` when given.
async fn read_document<R>(mut reader: R, expected_len: Option<u64>) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await?;
    if let Some(expected) = expected_len {
        let actual = data.len() as u64;
        if actual < expected {
            return Err(DocDeltaError::TruncatedInput { expected, actual });
        }
    }
    Ok(data)
}
