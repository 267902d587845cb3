//! Anchor Ledger Client
//!
//! Capability seam for the external append-only ledger. The capability is
//! injected as a present/absent handle: an unconfigured anchor is a normal
//! mode in which every call reports `Unavailable`, entries stay local and
//! verifiable, and nothing escalates.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::canonical::Fingerprint;
use crate::error::AuditError;

pub use http::HttpAnchorClient;

/// External anchor ledger operations. All failures are transient and map to
/// `AuditError::Unavailable`; both calls are idempotent from the caller's
/// perspective (re-submitting an anchored fingerprint returns the same or a
/// new valid reference).
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Submit a fingerprint for anchoring; returns the external reference.
    async fn submit(&self, fingerprint: &Fingerprint) -> Result<String, AuditError>;

    /// Whether the fingerprint is present on the ledger.
    async fn query(&self, fingerprint: &Fingerprint) -> Result<bool, AuditError>;

    /// Advisory reachability probe; never gates correctness.
    async fn health(&self) -> AnchorHealth;
}

/// Connectivity report from a configured client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnchorHealth {
    pub reachable: bool,
    pub latest_position: Option<u64>,
}

/// Read-only snapshot exposed to callers; advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorSnapshot {
    pub configured: bool,
    pub reachable: bool,
    pub latest_position: Option<u64>,
}

/// Present/absent anchor capability.
#[derive(Clone)]
pub struct Anchor {
    client: Option<Arc<dyn AnchorClient>>,
}

impl Anchor {
    pub fn new(client: Arc<dyn AnchorClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub async fn submit(&self, fingerprint: &Fingerprint) -> Result<String, AuditError> {
        match &self.client {
            Some(client) => client.submit(fingerprint).await,
            None => Err(AuditError::Unavailable(
                "anchor client not configured".to_string(),
            )),
        }
    }

    pub async fn query(&self, fingerprint: &Fingerprint) -> Result<bool, AuditError> {
        match &self.client {
            Some(client) => client.query(fingerprint).await,
            None => Err(AuditError::Unavailable(
                "anchor client not configured".to_string(),
            )),
        }
    }

    pub async fn snapshot(&self) -> AnchorSnapshot {
        match &self.client {
            Some(client) => {
                let health = client.health().await;
                AnchorSnapshot {
                    configured: true,
                    reachable: health.reachable,
                    latest_position: health.latest_position,
                }
            }
            None => AnchorSnapshot {
                configured: false,
                reachable: false,
                latest_position: None,
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted anchor double for tracker/service tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) enum Scripted<T> {
        Ok(T),
        Unavailable,
        Hang,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedAnchor {
        submit_script: Mutex<VecDeque<Scripted<String>>>,
        query_script: Mutex<VecDeque<Scripted<bool>>>,
        pub(crate) submit_calls: AtomicUsize,
        pub(crate) query_calls: AtomicUsize,
    }

    impl ScriptedAnchor {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push_submit(&self, step: Scripted<String>) {
            self.submit_script.lock().unwrap().push_back(step);
        }

        pub(crate) fn push_query(&self, step: Scripted<bool>) {
            self.query_script.lock().unwrap().push_back(step);
        }
    }

    #[async_trait]
    impl AnchorClient for ScriptedAnchor {
        async fn submit(&self, _fingerprint: &Fingerprint) -> Result<String, AuditError> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .submit_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Unavailable);
            match step {
                Scripted::Ok(reference) => Ok(reference),
                Scripted::Unavailable => {
                    Err(AuditError::Unavailable("scripted outage".to_string()))
                }
                Scripted::Hang => std::future::pending().await,
            }
        }

        async fn query(&self, _fingerprint: &Fingerprint) -> Result<bool, AuditError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .query_script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Scripted::Unavailable);
            match step {
                Scripted::Ok(present) => Ok(present),
                Scripted::Unavailable => {
                    Err(AuditError::Unavailable("scripted outage".to_string()))
                }
                Scripted::Hang => std::future::pending().await,
            }
        }

        async fn health(&self) -> AnchorHealth {
            AnchorHealth {
                reachable: true,
                latest_position: Some(0),
            }
        }
    }

    #[tokio::test]
    async fn test_disabled_anchor_reports_unavailable() {
        let anchor = Anchor::disabled();
        let fp = Fingerprint::compute(b"x");

        assert!(matches!(
            anchor.submit(&fp).await,
            Err(AuditError::Unavailable(_))
        ));
        assert!(matches!(
            anchor.query(&fp).await,
            Err(AuditError::Unavailable(_))
        ));

        let snapshot = anchor.snapshot().await;
        assert!(!snapshot.configured);
        assert!(!snapshot.reachable);
    }
}
