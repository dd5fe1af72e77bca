//! Strong digests used to confirm weak checksum hits.
//!
//! A weak checksum only nominates candidates; a block is accepted as a match
//! only after its strong digest agrees. MD5 is the default (it is what stored
//! checksum records carry), BLAKE3 is available for new deployments.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{DocDeltaError, Result};

/// Strong hash algorithm used for block verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StrongHashAlgorithm {
    /// MD5, 16-byte digests.
    #[default]
    Md5,
    /// BLAKE3, 32-byte digests.
    Blake3,
}

impl StrongHashAlgorithm {
    /// Digest `data` with this algorithm.
    ///
    /// # Example
    ///
    /// ```rust
    /// use docdelta::StrongHashAlgorithm;
    ///
    /// let a = StrongHashAlgorithm::Md5.digest(b"block");
    /// let b = StrongHashAlgorithm::Md5.digest(b"block");
    /// assert_eq!(a, b);
    /// assert_eq!(a.as_bytes().len(), 16);
    /// ```
    #[must_use]
    pub fn digest(self, data: &[u8]) -> StrongDigest {
        match self {
            Self::Md5 => {
                let mut out = [0u8; 16];
                out.copy_from_slice(&Md5::digest(data));
                StrongDigest::Md5(out)
            }
            Self::Blake3 => StrongDigest::Blake3(*blake3::hash(data).as_bytes()),
        }
    }

    /// Digest length in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Blake3 => 32,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Blake3 => "blake3",
        }
    }
}

impl FromStr for StrongHashAlgorithm {
    type Err = DocDeltaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "blake3" => Ok(Self::Blake3),
            other => Err(DocDeltaError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for StrongHashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-length strong digest of a byte run.
///
/// Digests produced by different algorithms never compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrongDigest {
    /// MD5 digest.
    Md5([u8; 16]),
    /// BLAKE3 digest.
    Blake3([u8; 32]),
}

impl StrongDigest {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(bytes) => bytes,
            Self::Blake3(bytes) => bytes,
        }
    }

    /// Algorithm that produced this digest.
    #[must_use]
    pub const fn algorithm(&self) -> StrongHashAlgorithm {
        match self {
            Self::Md5(_) => StrongHashAlgorithm::Md5,
            Self::Blake3(_) => StrongHashAlgorithm::Blake3,
        }
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Debug for StrongDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrongDigest({}:{self})", self.algorithm())
    }
}

impl fmt::Display for StrongDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for StrongDigest {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
