//! HTTP surface for the audit subsystem.
//!
//! The record store calls `POST /records` on every create/update; the rest
//! of the routes back the admin verification workflow. Anchor availability
//! never gates any of these: the worst case is a `pending` entry and a 503
//! from the explicitly anchor-facing calls.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::service::AuditService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuditService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/records", post(handlers::ingest_record))
        .route("/audits", get(handlers::list_audits))
        .route("/audits/:id", get(handlers::get_audit))
        .route("/audits/:id/resend", post(handlers::resend))
        .route("/audits/:id/content", post(handlers::attach_content))
        .route(
            "/audits/by-fingerprint/:fingerprint",
            get(handlers::get_by_fingerprint),
        )
        .route("/verify", post(handlers::verify))
        .route("/anchor/status", get(handlers::anchor_status))
        .with_state(state)
}
