use serde::{Deserialize, Serialize};
use std::env;

/// Default exclusion set for canonicalization: identifiers, fingerprint
/// bookkeeping fields, and volatile timestamps. Overridable via
/// `EXCLUDED_FIELDS` (comma-separated); an explicit list, never inferred
/// from value types.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &[
    "id",
    "fingerprint",
    "external_reference",
    "content_reference",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Anchor ledger endpoint. `None` means the anchor capability is
    /// absent: entries are still created and verifiable locally.
    pub anchor_rpc_url: Option<String>,
    pub anchor_call_timeout_secs: u64,
    pub tracker_interval_secs: u64,
    pub tracker_max_concurrency: usize,
    pub submit_retry_budget: i64,
    pub excluded_fields: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://audit.db".to_string());

        let server_host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let anchor_rpc_url = env::var("ANCHOR_RPC_URL").ok().filter(|s| !s.is_empty());

        let anchor_call_timeout_secs = env::var("ANCHOR_CALL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let tracker_interval_secs = env::var("TRACKER_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()?;

        let tracker_max_concurrency = env::var("TRACKER_MAX_CONCURRENCY")
            .unwrap_or_else(|_| "8".to_string())
            .parse()?;

        let submit_retry_budget = env::var("SUBMIT_RETRY_BUDGET")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let excluded_fields = match env::var("EXCLUDED_FIELDS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_EXCLUDED_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        Ok(AppConfig {
            database_url,
            server_host,
            server_port,
            anchor_rpc_url,
            anchor_call_timeout_secs,
            tracker_interval_secs,
            tracker_max_concurrency,
            submit_retry_budget,
            excluded_fields,
        })
    }
}
