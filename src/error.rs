use thiserror::Error;

/// Error taxonomy for the audit/anchoring subsystem.
///
/// `Canonicalization` is fatal to the attempt that raised it (no entry is
/// ever written without a valid fingerprint). `Unavailable` is an expected
/// mode: the anchor ledger being unreachable or unconfigured must never
/// fail the record mutation that triggered fingerprinting.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("anchor ledger unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(format!("{}", err))
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Canonicalization(format!("JSON serialization error: {}", err))
    }
}
