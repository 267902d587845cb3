//! Record fingerprints.
//!
//! A fingerprint is SHA-256 over canonical bytes, rendered as `0x` plus 64
//! lowercase hex characters (66 total). The prefix and width are persisted
//! and indexed; changing either invalidates prior dedup comparisons and is
//! a breaking storage migration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::AuditError;

pub const FINGERPRINT_PREFIX: &str = "0x";
pub const FINGERPRINT_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a canonical byte string.
    pub fn compute(canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        let digest = hasher.finalize();
        Self(format!("{}{}", FINGERPRINT_PREFIX, hex::encode(digest)))
    }

    /// Parse and validate a stored fingerprint string.
    pub fn parse(s: &str) -> Result<Self, AuditError> {
        let hex_part = s.strip_prefix(FINGERPRINT_PREFIX).ok_or_else(|| {
            AuditError::InvalidFingerprint(format!("missing {} prefix", FINGERPRINT_PREFIX))
        })?;
        if hex_part.len() != FINGERPRINT_HEX_LEN {
            return Err(AuditError::InvalidFingerprint(format!(
                "expected {} hex chars, got {}",
                FINGERPRINT_HEX_LEN,
                hex_part.len()
            )));
        }
        if !hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(AuditError::InvalidFingerprint(
                "fingerprint must be lowercase hex".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
