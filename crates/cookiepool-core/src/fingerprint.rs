//! # Fingerprint Derivation
//!
//! Deterministic primary-key derivation from identity-bearing fields.
//!
//! Each field is framed as its byte length (u64, little-endian) followed by
//! its bytes, in the order given, and the frames are hashed with BLAKE3.
//! Framing keeps field boundaries unambiguous whatever bytes a field holds,
//! and empty fields still take their slot, so `["", "x"]` and `["x", ""]`
//! yield different fingerprints.

use crate::PoolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex length of a fingerprint (BLAKE3, 32 bytes).
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// A fixed-length lowercase hexadecimal digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Derive a fingerprint from ordered identity fields.
///
/// Pure and deterministic. Fails with `PoolError::InvalidArgument` when
/// `fields` is empty or every field is the empty string.
pub fn derive_fingerprint(fields: &[&str]) -> Result<Fingerprint, PoolError> {
    if fields.iter().all(|f| f.is_empty()) {
        return Err(PoolError::InvalidArgument(
            "at least one identity field must be non-empty".to_string(),
        ));
    }

    let mut hasher = blake3::Hasher::new();
    for field in fields {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }

    Ok(Fingerprint(hasher.finalize().to_hex().to_string()))
}
