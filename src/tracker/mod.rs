//! Confirmation Tracker
//!
//! Periodic background task driving unconfirmed audit entries toward a
//! terminal status. Runs as one owned, non-overlapping loop: a tick must
//! finish (or time out) before the next one starts, and every anchor call
//! inside a tick is individually timeout-bounded so a hung call cannot
//! stall the rest of the batch.
//!
//! Per tick:
//! 1. pending entries with no external reference and budget remaining get
//!    one submit retry — an accepted submission confirms the entry with its
//!    fresh reference, an unavailable anchor spends one attempt, and a
//!    spent budget moves the entry to `failed` (explicit resend required
//!    from there);
//! 2. pending entries holding a reference are queried for on-ledger
//!    presence and confirmed when found.
//!
//! Transitions are monotonic; confirmed entries are never selected again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::anchor::Anchor;
use crate::error::AuditError;
use crate::ledger::{AuditLedger, EntryStatus};

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub interval: Duration,
    pub call_timeout: Duration,
    pub max_concurrency: usize,
    pub submit_retry_budget: i64,
    pub batch_limit: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(10),
            max_concurrency: 8,
            submit_retry_budget: 5,
            batch_limit: 256,
        }
    }
}

/// Counters for one tick, for logs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub submits_attempted: usize,
    pub queries_attempted: usize,
    pub confirmed: usize,
    pub exhausted: usize,
    pub timed_out: usize,
}

enum Outcome {
    Confirmed,
    StillPending,
    Exhausted,
    TimedOut,
}

pub struct ConfirmationTracker {
    ledger: AuditLedger,
    anchor: Anchor,
    config: TrackerConfig,
}

/// Owned lifecycle of a running tracker. Dropping the handle without
/// calling `stop` leaves the task running detached.
pub struct TrackerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TrackerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl ConfirmationTracker {
    pub fn new(ledger: AuditLedger, anchor: Anchor, config: TrackerConfig) -> Self {
        Self {
            ledger,
            anchor,
            config,
        }
    }

    /// Spawn the periodic loop. Ticks run inline in the loop body, so the
    /// next tick cannot start before the previous one returns; the whole
    /// tick is additionally capped at one interval.
    pub fn start(self) -> TrackerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval_duration = self.config.interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = interval_duration.as_secs(),
                "confirmation tracker started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match tokio::time::timeout(interval_duration, self.tick()).await {
                            Ok(Ok(summary)) => {
                                if summary.submits_attempted > 0 || summary.queries_attempted > 0 {
                                    debug!(?summary, "tracker tick finished");
                                }
                            }
                            Ok(Err(e)) => warn!("tracker tick failed: {}", e),
                            Err(_) => warn!("tracker tick exceeded its interval, cut off"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("confirmation tracker stopping");
                        break;
                    }
                }
            }
        });

        TrackerHandle { shutdown, task }
    }

    /// Run one tick. Public so callers (and tests) can drive the state
    /// machine without the periodic loop.
    pub async fn tick(&self) -> Result<TickSummary, AuditError> {
        let mut summary = TickSummary::default();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        let retries = self
            .ledger
            .pending_without_reference(self.config.submit_retry_budget, self.config.batch_limit)
            .await?;
        summary.submits_attempted = retries.len();

        let mut tasks: JoinSet<Result<Outcome, AuditError>> = JoinSet::new();
        for entry in retries {
            let ledger = self.ledger.clone();
            let anchor = self.anchor.clone();
            let semaphore = semaphore.clone();
            let call_timeout = self.config.call_timeout;
            let budget = self.config.submit_retry_budget;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                match tokio::time::timeout(call_timeout, anchor.submit(&entry.fingerprint)).await {
                    Ok(Ok(reference)) => {
                        ledger.confirm_with_reference(entry.id, &reference).await?;
                        debug!(entry_id = entry.id, "submit retry accepted, entry confirmed");
                        Ok(Outcome::Confirmed)
                    }
                    Ok(Err(e)) => {
                        debug!(entry_id = entry.id, "submit retry unavailable: {}", e);
                        let updated = ledger.record_submit_failure(entry.id, budget).await?;
                        if updated.status == EntryStatus::Failed {
                            warn!(entry_id = entry.id, "submit retry budget exhausted");
                            Ok(Outcome::Exhausted)
                        } else {
                            Ok(Outcome::StillPending)
                        }
                    }
                    // hung call: no attempt is charged, the entry stays
                    // pending for the next tick
                    Err(_) => Ok(Outcome::TimedOut),
                }
            });
        }
        Self::drain(&mut tasks, &mut summary).await;

        let checks = self.ledger.pending_with_reference(self.config.batch_limit).await?;
        summary.queries_attempted = checks.len();

        let mut tasks: JoinSet<Result<Outcome, AuditError>> = JoinSet::new();
        for entry in checks {
            let ledger = self.ledger.clone();
            let anchor = self.anchor.clone();
            let semaphore = semaphore.clone();
            let call_timeout = self.config.call_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                match tokio::time::timeout(call_timeout, anchor.query(&entry.fingerprint)).await {
                    Ok(Ok(true)) => {
                        ledger.mark_confirmed(entry.id).await?;
                        debug!(entry_id = entry.id, "anchoring observed on ledger, entry confirmed");
                        Ok(Outcome::Confirmed)
                    }
                    Ok(Ok(false)) | Ok(Err(_)) => Ok(Outcome::StillPending),
                    Err(_) => Ok(Outcome::TimedOut),
                }
            });
        }
        Self::drain(&mut tasks, &mut summary).await;

        Ok(summary)
    }

    async fn drain(tasks: &mut JoinSet<Result<Outcome, AuditError>>, summary: &mut TickSummary) {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Outcome::Confirmed)) => summary.confirmed += 1,
                Ok(Ok(Outcome::Exhausted)) => summary.exhausted += 1,
                Ok(Ok(Outcome::TimedOut)) => summary.timed_out += 1,
                Ok(Ok(Outcome::StillPending)) => {}
                Ok(Err(e)) => warn!("tracker entry update failed: {}", e),
                Err(e) => warn!("tracker task panicked: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::testing::{Scripted, ScriptedAnchor};
    use crate::canonical::Fingerprint;
    use crate::ledger::tests::test_ledger;
    use crate::ledger::NewAuditEntry;
    use std::sync::atomic::Ordering;

    fn config() -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_millis(50),
            call_timeout: Duration::from_millis(100),
            submit_retry_budget: 2,
            ..Default::default()
        }
    }

    async fn seed_entry(ledger: &AuditLedger, record_id: &str, payload: &[u8]) -> crate::ledger::AuditEntry {
        ledger
            .append(NewAuditEntry {
                record_type: "Patient".to_string(),
                record_id: record_id.to_string(),
                fingerprint: Fingerprint::compute(payload),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_pass_confirms_present_entries() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;
        ledger.apply_resend(entry.id, "0xtx1").await.unwrap();

        anchor.push_query(Scripted::Ok(true));
        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());
        let summary = tracker.tick().await.unwrap();

        assert_eq!(summary.confirmed, 1);
        let updated = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, EntryStatus::Confirmed);
        assert_eq!(updated.external_reference.as_deref(), Some("0xtx1"));
    }

    #[tokio::test]
    async fn test_submit_pass_confirms_on_fresh_reference() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;

        anchor.push_submit(Scripted::Ok("0xtx7".to_string()));
        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());
        tracker.tick().await.unwrap();

        let updated = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, EntryStatus::Confirmed);
        assert_eq!(updated.external_reference.as_deref(), Some("0xtx7"));
    }

    #[tokio::test]
    async fn test_unavailable_anchor_keeps_pending_until_budget_spent() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;
        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());

        // budget is 2: first failed attempt stays pending
        tracker.tick().await.unwrap();
        let after_one = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(after_one.status, EntryStatus::Pending);
        assert_eq!(after_one.submit_attempts, 1);

        // second failed attempt exhausts the budget
        let summary = tracker.tick().await.unwrap();
        assert_eq!(summary.exhausted, 1);
        let after_two = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(after_two.status, EntryStatus::Failed);

        // failed entries are left alone until an explicit resend
        tracker.tick().await.unwrap();
        assert_eq!(anchor.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_ticks_on_confirmed_entry_change_nothing() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;
        ledger.confirm_with_reference(entry.id, "0xtx1").await.unwrap();

        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());
        tracker.tick().await.unwrap();
        tracker.tick().await.unwrap();

        assert_eq!(anchor.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(anchor.query_calls.load(Ordering::SeqCst), 0);
        let unchanged = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, EntryStatus::Confirmed);
        assert_eq!(unchanged.external_reference.as_deref(), Some("0xtx1"));
    }

    #[tokio::test]
    async fn test_hung_call_times_out_and_entry_stays_pending() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;
        ledger.apply_resend(entry.id, "0xtx1").await.unwrap();

        anchor.push_query(Scripted::Hang);
        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());
        let summary = tracker.tick().await.unwrap();
        assert_eq!(summary.timed_out, 1);

        let still = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(still.status, EntryStatus::Pending);

        // next tick retries and succeeds
        anchor.push_query(Scripted::Ok(true));
        tracker.tick().await.unwrap();
        let confirmed = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, EntryStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (_dir, ledger) = test_ledger().await;
        let anchor = Arc::new(ScriptedAnchor::new());
        let entry = seed_entry(&ledger, "1", b"a").await;
        ledger.apply_resend(entry.id, "0xtx1").await.unwrap();
        anchor.push_query(Scripted::Ok(true));

        let tracker = ConfirmationTracker::new(ledger.clone(), Anchor::new(anchor.clone()), config());
        let handle = tracker.start();

        // give the loop a few intervals to run
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.stop().await;

        let confirmed = ledger.get(entry.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, EntryStatus::Confirmed);
    }
}
