//! SHA256 digest utilities
//!
//! Content addressing for blobs and manifests: every descriptor's digest is the
//! `sha256:` hash of the exact bytes it points at.

use crate::error::{LockError, Result};
use sha2::{Digest, Sha256};

pub const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with SHA256 digests
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 hex digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Compute full OCI digest (with sha256: prefix) from byte data
    pub fn compute_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// Verify data matches expected digest
    pub fn verify(data: &[u8], expected_digest: &str) -> Result<()> {
        let actual = Self::compute_digest(data);
        if actual != expected_digest {
            return Err(LockError::DigestMismatch {
                expected: expected_digest.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Format digest for display (truncated for readability)
    pub fn format_digest_short(digest: &str) -> String {
        if digest.len() > 19 {
            format!("{}...", &digest[..19])
        } else {
            digest.to_string()
        }
    }
}
