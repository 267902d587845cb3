//! Audit Ledger
//!
//! Append-only store of fingerprint entries, one active entry per distinct
//! fingerprint. Entries are never deleted; later entries for the same
//! record supersede earlier ones, and duplicate fingerprints collapse at
//! write time through the unique index.

pub mod models;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::canonical::Fingerprint;
use crate::error::AuditError;

pub use models::{AuditEntry, EntryFilter, EntryStatus, NewAuditEntry};

#[derive(Clone)]
pub struct AuditLedger {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "id, record_type, record_id, fingerprint, \
     content_reference, external_reference, status, submit_attempts, created_at";

impl AuditLedger {
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(AuditLedger { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(include_str!("../../migrations/001_audit_entries.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a fingerprint entry, enforcing the dedup invariant at write
    /// time. A colliding fingerprint collapses onto the existing entry and
    /// only refreshes `created_at` (newest wins); status and references of
    /// the survivor are untouched, so a re-appended confirmed entry stays
    /// confirmed.
    pub async fn append(&self, new: NewAuditEntry) -> Result<AuditEntry, AuditError> {
        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (record_type, record_id, fingerprint, status, submit_attempts, created_at)
            VALUES (?1, ?2, ?3, 'pending', 0, ?4)
            ON CONFLICT(fingerprint) DO UPDATE SET created_at = excluded.created_at
            "#,
        )
        .bind(&new.record_type)
        .bind(&new.record_id)
        .bind(new.fingerprint.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        debug!(
            record_type = %new.record_type,
            record_id = %new.record_id,
            fingerprint = %new.fingerprint,
            "appended audit entry"
        );

        self.get_by_fingerprint(&new.fingerprint)
            .await?
            .ok_or_else(|| AuditError::Database("appended entry not readable".to_string()))
    }

    /// List entries newest-first. Deduplication is structural: the unique
    /// fingerprint index guarantees one row per fingerprint.
    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM audit_entries WHERE 1 = 1",
            SELECT_COLUMNS
        ));
        if let Some(record_type) = &filter.record_type {
            qb.push(" AND record_type = ").push_bind(record_type);
        }
        if let Some(record_id) = &filter.record_id {
            qb.push(" AND record_id = ").push_bind(record_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let entries = qb
            .build_query_as::<AuditEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn get(&self, id: i64) -> Result<Option<AuditEntry>, AuditError> {
        let entry = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_entries WHERE id = ?1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn get_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let entry = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_entries WHERE fingerprint = ?1",
            SELECT_COLUMNS
        ))
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Most recent entry for a record identity, any status.
    pub async fn latest_for_record(
        &self,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<AuditEntry>, AuditError> {
        let entry = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_entries \
             WHERE record_type = ?1 AND record_id = ?2 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(record_type)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Store a freshly obtained reference and confirm the entry. Guarded so
    /// an already-confirmed entry is never touched.
    pub async fn confirm_with_reference(
        &self,
        id: i64,
        reference: &str,
    ) -> Result<AuditEntry, AuditError> {
        sqlx::query(
            r#"
            UPDATE audit_entries
            SET external_reference = ?2, status = 'confirmed'
            WHERE id = ?1 AND status <> 'confirmed'
            "#,
        )
        .bind(id)
        .bind(reference)
        .execute(&self.pool)
        .await?;
        self.require(id).await
    }

    /// Confirm an entry whose anchoring was observed on the ledger.
    /// Monotonic: only a pending entry moves.
    pub async fn mark_confirmed(&self, id: i64) -> Result<AuditEntry, AuditError> {
        sqlx::query("UPDATE audit_entries SET status = 'confirmed' WHERE id = ?1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.require(id).await
    }

    /// Record one failed submit attempt. Once the retry budget is spent the
    /// entry moves from `pending` to `failed`; confirmed entries are never
    /// affected.
    pub async fn record_submit_failure(
        &self,
        id: i64,
        retry_budget: i64,
    ) -> Result<AuditEntry, AuditError> {
        sqlx::query(
            "UPDATE audit_entries SET submit_attempts = submit_attempts + 1 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "UPDATE audit_entries SET status = 'failed' \
             WHERE id = ?1 AND status = 'pending' AND submit_attempts >= ?2",
        )
        .bind(id)
        .bind(retry_budget)
        .execute(&self.pool)
        .await?;
        self.require(id).await
    }

    /// Apply a successful manual resend: fresh reference, back to `pending`
    /// with a reset budget — unless already confirmed, in which case only
    /// the reference is refreshed (status never regresses).
    pub async fn apply_resend(&self, id: i64, reference: &str) -> Result<AuditEntry, AuditError> {
        let result = sqlx::query(
            r#"
            UPDATE audit_entries
            SET external_reference = ?2,
                submit_attempts = 0,
                status = CASE WHEN status = 'confirmed' THEN 'confirmed' ELSE 'pending' END
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(reference)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuditError::NotFound(format!("audit entry {}", id)));
        }
        self.require(id).await
    }

    /// Attach an off-chain content reference. Set-once: a second attach
    /// fails with `Conflict` and mutates nothing.
    pub async fn attach_content(
        &self,
        id: i64,
        content_reference: &str,
    ) -> Result<AuditEntry, AuditError> {
        let result = sqlx::query(
            "UPDATE audit_entries SET content_reference = ?2 \
             WHERE id = ?1 AND content_reference IS NULL",
        )
        .bind(id)
        .bind(content_reference)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(AuditError::NotFound(format!("audit entry {}", id))),
                Some(_) => Err(AuditError::Conflict(format!(
                    "content reference already attached to entry {}",
                    id
                ))),
            };
        }
        self.require(id).await
    }

    /// Pending entries still awaiting a first accepted submission, with
    /// retry budget remaining. Oldest first so starved entries drain.
    pub async fn pending_without_reference(
        &self,
        retry_budget: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_entries \
             WHERE status = 'pending' AND external_reference IS NULL AND submit_attempts < ?1 \
             ORDER BY created_at ASC, id ASC LIMIT ?2",
            SELECT_COLUMNS
        ))
        .bind(retry_budget)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Pending entries holding a reference, awaiting on-ledger confirmation.
    pub async fn pending_with_reference(&self, limit: i64) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = sqlx::query_as::<_, AuditEntry>(&format!(
            "SELECT {} FROM audit_entries \
             WHERE status = 'pending' AND external_reference IS NOT NULL \
             ORDER BY created_at ASC, id ASC LIMIT ?1",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn require(&self, id: i64) -> Result<AuditEntry, AuditError> {
        self.get(id)
            .await?
            .ok_or_else(|| AuditError::NotFound(format!("audit entry {}", id)))
    }
}
