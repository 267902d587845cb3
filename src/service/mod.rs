//! Audit Service
//!
//! The single owner of the canonicalize → fingerprint → append path (one
//! call site per logical record mutation, never duplicated through
//! secondary hooks), plus the verification workflow: drift checks, lookups
//! by fingerprint, manual resend, and off-chain content attachment.

use serde::Serialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::anchor::{Anchor, AnchorSnapshot};
use crate::canonical::{Canonicalizer, Fingerprint};
use crate::error::AuditError;
use crate::ledger::{AuditEntry, AuditLedger, EntryFilter, EntryStatus, NewAuditEntry};

/// Result of verifying a record against its stored fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub entry: AuditEntry,
    /// True when the record's current content no longer matches the stored
    /// fingerprint — an edit-without-rehash or tamper signal.
    pub drift: bool,
}

pub struct AuditService {
    ledger: AuditLedger,
    anchor: Anchor,
    canonicalizer: Canonicalizer,
    submit_timeout: Duration,
    submit_retry_budget: i64,
}

impl AuditService {
    pub fn new(
        ledger: AuditLedger,
        anchor: Anchor,
        canonicalizer: Canonicalizer,
        submit_timeout: Duration,
        submit_retry_budget: i64,
    ) -> Self {
        Self {
            ledger,
            anchor,
            canonicalizer,
            submit_timeout,
            submit_retry_budget,
        }
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Fingerprint a record mutation and append the audit entry.
    ///
    /// Canonicalization failures are loud and abort the attempt before
    /// anything is written (fail closed). The trailing anchor submission is
    /// best-effort and timeout-bounded: the caller gets its entry back
    /// whether or not the anchor ledger is reachable.
    pub async fn record_changed<T: Serialize>(
        &self,
        record_type: &str,
        record_id: &str,
        record: &T,
    ) -> Result<AuditEntry, AuditError> {
        let canonical = self.canonicalizer.canonicalize_record(record)?;
        let fingerprint = Fingerprint::compute(&canonical);

        let entry = self
            .ledger
            .append(NewAuditEntry {
                record_type: record_type.to_string(),
                record_id: record_id.to_string(),
                fingerprint: fingerprint.clone(),
            })
            .await?;

        // deduped onto an entry that already holds a reference or reached a
        // terminal status: nothing left to submit
        if entry.status != EntryStatus::Pending || entry.external_reference.is_some() {
            return Ok(entry);
        }

        match timeout(self.submit_timeout, self.anchor.submit(&fingerprint)).await {
            Ok(Ok(reference)) => {
                let entry = self.ledger.confirm_with_reference(entry.id, &reference).await?;
                debug!(entry_id = entry.id, reference = %reference, "fingerprint anchored on first submit");
                Ok(entry)
            }
            Ok(Err(e)) => {
                warn!(entry_id = entry.id, "first anchor submit unavailable: {}", e);
                self.ledger
                    .record_submit_failure(entry.id, self.submit_retry_budget)
                    .await
            }
            Err(_) => {
                // timed out mid-flight: no attempt charged, the tracker
                // picks the entry up on its next tick
                warn!(entry_id = entry.id, "first anchor submit timed out");
                Ok(entry)
            }
        }
    }

    /// Verify a record against its most recent audit entry, recomputing the
    /// fingerprint from the caller-supplied current field mapping. Purely
    /// local: the anchor ledger is never consulted.
    pub async fn verify<T: Serialize>(
        &self,
        record_type: &str,
        record_id: &str,
        current: &T,
    ) -> Result<Verification, AuditError> {
        let entry = self
            .ledger
            .latest_for_record(record_type, record_id)
            .await?
            .ok_or_else(|| {
                AuditError::NotFound(format!("no audit entry for {} {}", record_type, record_id))
            })?;

        let canonical = self.canonicalizer.canonicalize_record(current)?;
        let recomputed = Fingerprint::compute(&canonical);
        let drift = recomputed != entry.fingerprint;
        Ok(Verification { entry, drift })
    }

    pub async fn verify_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<AuditEntry, AuditError> {
        self.ledger
            .get_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("no audit entry for {}", fingerprint)))
    }

    /// Re-submit the stored fingerprint, regardless of current status.
    ///
    /// All local writes happen after the anchor reply: a failed or
    /// cancelled submit leaves the entry untouched. Success re-enters
    /// `pending` with the fresh reference — unless the entry is already
    /// confirmed, which never regresses.
    pub async fn resend(&self, entry_id: i64) -> Result<AuditEntry, AuditError> {
        let entry = self
            .ledger
            .get(entry_id)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("audit entry {}", entry_id)))?;

        let reference = self.anchor.submit(&entry.fingerprint).await?;
        let entry = self.ledger.apply_resend(entry_id, &reference).await?;
        debug!(entry_id, reference = %reference, "fingerprint resent");
        Ok(entry)
    }

    /// Attach the off-chain content reference; set-once.
    pub async fn attach_content(
        &self,
        entry_id: i64,
        content_reference: &str,
    ) -> Result<AuditEntry, AuditError> {
        self.ledger.attach_content(entry_id, content_reference).await
    }

    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<AuditEntry>, AuditError> {
        self.ledger.list(filter).await
    }

    /// Advisory anchor connectivity snapshot; never gates correctness of
    /// any other operation.
    pub async fn anchor_snapshot(&self) -> AnchorSnapshot {
        self.anchor.snapshot().await
    }

    /// Verify a raw fingerprint string from an external caller.
    pub async fn verify_fingerprint_str(&self, raw: &str) -> Result<AuditEntry, AuditError> {
        let fingerprint = Fingerprint::parse(raw)?;
        self.verify_by_fingerprint(&fingerprint).await
    }
}
