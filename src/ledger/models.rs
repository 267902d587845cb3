use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical::Fingerprint;

/// Status of an audit entry's external anchoring.
///
/// `confirmed` is terminal; `failed` is re-enterable into `pending` only
/// through an explicit resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Confirmed => "confirmed",
            EntryStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "confirmed" => Ok(EntryStatus::Confirmed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(format!("unknown entry status: {}", other)),
        }
    }
}

/// A stored fingerprint entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub record_type: String,
    pub record_id: String,
    pub fingerprint: Fingerprint,
    pub content_reference: Option<String>,
    pub external_reference: Option<String>,
    pub status: EntryStatus,
    pub submit_attempts: i64,
    pub created_at: DateTime<Utc>,
}

/// Input to `AuditLedger::append`.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub record_type: String,
    pub record_id: String,
    pub fingerprint: Fingerprint,
}

/// Filter for listing audit entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    pub record_type: Option<String>,
    pub record_id: Option<String>,
    pub status: Option<EntryStatus>,
    pub limit: Option<i64>,
}
