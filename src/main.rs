use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod anchor;
mod api;
mod canonical;
mod config;
mod error;
mod ledger;
mod service;
mod tracker;

use anchor::{Anchor, HttpAnchorClient};
use api::AppState;
use canonical::Canonicalizer;
use config::AppConfig;
use ledger::AuditLedger;
use service::AuditService;
use tracker::{ConfirmationTracker, TrackerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_anchor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting record-anchor service");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let ledger = AuditLedger::connect(&config.database_url).await?;
    ledger.run_migrations().await?;
    info!("Audit ledger ready at {}", config.database_url);

    let call_timeout = Duration::from_secs(config.anchor_call_timeout_secs);
    let anchor = match &config.anchor_rpc_url {
        Some(url) => {
            info!("Anchor ledger configured at {}", url);
            Anchor::new(Arc::new(HttpAnchorClient::new(url.clone(), call_timeout)))
        }
        None => {
            // normal mode: entries stay local and pending until an anchor
            // is configured
            info!("Anchor ledger not configured; fingerprints stay local");
            Anchor::disabled()
        }
    };

    let canonicalizer = Canonicalizer::new(config.excluded_fields.iter().cloned());

    let service = Arc::new(AuditService::new(
        ledger.clone(),
        anchor.clone(),
        canonicalizer,
        call_timeout,
        config.submit_retry_budget,
    ));

    let tracker_handle = if anchor.is_configured() {
        let tracker = ConfirmationTracker::new(
            ledger.clone(),
            anchor.clone(),
            TrackerConfig {
                interval: Duration::from_secs(config.tracker_interval_secs),
                call_timeout,
                max_concurrency: config.tracker_max_concurrency,
                submit_retry_budget: config.submit_retry_budget,
                ..Default::default()
            },
        );
        Some(tracker.start())
    } else {
        None
    };

    let app = api::router(AppState { service }).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .into_inner(),
    );

    let addr = format!("{}:{}", config.server_host, config.server_port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = tracker_handle {
        handle.stop().await;
    }
    info!("record-anchor service stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
