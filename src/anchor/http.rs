//! HTTP adapter for an anchor ledger node.
//!
//! Speaks a small JSON API: `POST /anchors` submits a fingerprint and
//! returns its reference, `GET /anchors/{fingerprint}` reports presence,
//! `GET /status` reports the node's latest position. Every transport or
//! protocol failure maps to `Unavailable` — transient and non-fatal.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::anchor::{AnchorClient, AnchorHealth};
use crate::canonical::Fingerprint;
use crate::error::AuditError;

pub struct HttpAnchorClient {
    base_url: String,
    call_timeout: Duration,
    http_client: Client,
}

#[derive(Deserialize)]
struct SubmitResponse {
    reference: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    present: bool,
}

#[derive(Deserialize)]
struct StatusResponse {
    height: Option<u64>,
}

impl HttpAnchorClient {
    pub fn new(base_url: String, call_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            call_timeout,
            http_client: Client::new(),
        }
    }

    fn unavailable(context: &str, err: impl std::fmt::Display) -> AuditError {
        AuditError::Unavailable(format!("{}: {}", context, err))
    }
}

#[async_trait]
impl AnchorClient for HttpAnchorClient {
    async fn submit(&self, fingerprint: &Fingerprint) -> Result<String, AuditError> {
        let url = format!("{}/anchors", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .timeout(self.call_timeout)
            .json(&json!({ "fingerprint": fingerprint.as_str() }))
            .send()
            .await
            .map_err(|e| Self::unavailable("anchor submit failed", e))?;

        if !response.status().is_success() {
            return Err(AuditError::Unavailable(format!(
                "anchor submit returned {}",
                response.status()
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable("anchor submit response unreadable", e))?;

        debug!(fingerprint = %fingerprint, reference = %body.reference, "fingerprint submitted");
        Ok(body.reference)
    }

    async fn query(&self, fingerprint: &Fingerprint) -> Result<bool, AuditError> {
        let url = format!("{}/anchors/{}", self.base_url, fingerprint.as_str());
        let response = self
            .http_client
            .get(&url)
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| Self::unavailable("anchor query failed", e))?;

        if !response.status().is_success() {
            return Err(AuditError::Unavailable(format!(
                "anchor query returned {}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable("anchor query response unreadable", e))?;
        Ok(body.present)
    }

    async fn health(&self) -> AnchorHealth {
        let url = format!("{}/status", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .timeout(self.call_timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let latest_position = resp
                    .json::<StatusResponse>()
                    .await
                    .ok()
                    .and_then(|s| s.height);
                AnchorHealth {
                    reachable: true,
                    latest_position,
                }
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "anchor status probe rejected");
                AnchorHealth::default()
            }
            Err(e) => {
                debug!("anchor status probe failed: {}", e);
                AnchorHealth::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpAnchorClient {
        HttpAnchorClient::new(server.uri(), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_submit_returns_reference() {
        let server = MockServer::start().await;
        let fp = Fingerprint::compute(b"record");

        Mock::given(method("POST"))
            .and(path("/anchors"))
            .and(body_json(json!({ "fingerprint": fp.as_str() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reference": "0xdeadbeef"
            })))
            .mount(&server)
            .await;

        let reference = client_for(&server).submit(&fp).await.unwrap();
        assert_eq!(reference, "0xdeadbeef");
    }

    #[tokio::test]
    async fn test_submit_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/anchors"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .submit(&Fingerprint::compute(b"record"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_query_reports_presence() {
        let server = MockServer::start().await;
        let fp = Fingerprint::compute(b"record");

        Mock::given(method("GET"))
            .and(path(format!("/anchors/{}", fp.as_str())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "present": true })))
            .mount(&server)
            .await;

        assert!(client_for(&server).query(&fp).await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_unavailable() {
        // nothing listening on this port
        let client = HttpAnchorClient::new(
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(200),
        );
        let err = client
            .query(&Fingerprint::compute(b"record"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_health_probe_never_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "height": 42 })))
            .mount(&server)
            .await;

        let health = client_for(&server).health().await;
        assert!(health.reachable);
        assert_eq!(health.latest_position, Some(42));

        let dead = HttpAnchorClient::new(
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(200),
        );
        let health = dead.health().await;
        assert!(!health.reachable);
    }
}
