use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::AppState;
use crate::error::AuditError;
use crate::ledger::EntryFilter;

#[derive(Deserialize)]
pub struct IngestRequest {
    pub record_type: String,
    pub record_id: String,
    pub fields: Value,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub record_type: String,
    pub record_id: String,
    pub fields: Value,
}

#[derive(Deserialize)]
pub struct AttachContentRequest {
    pub content_reference: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "record-anchor",
        "timestamp": chrono::Utc::now()
    }))
}

pub async fn ingest_record(
    State(state): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> (StatusCode, Json<Value>) {
    info!(
        record_type = %payload.record_type,
        record_id = %payload.record_id,
        "record mutation received"
    );
    match state
        .service
        .record_changed(&payload.record_type, &payload.record_id, &payload.fields)
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(json!(entry))),
        Err(e) => error_response(e),
    }
}

pub async fn list_audits(
    State(state): State<AppState>,
    Query(filter): Query<EntryFilter>,
) -> (StatusCode, Json<Value>) {
    match state.service.list(&filter).await {
        Ok(entries) => (StatusCode::OK, Json(json!(entries))),
        Err(e) => error_response(e),
    }
}

pub async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    match state.service.ledger().get(id).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(json!(entry))),
        Ok(None) => error_response(AuditError::NotFound(format!("audit entry {}", id))),
        Err(e) => error_response(e),
    }
}

pub async fn get_by_fingerprint(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.service.verify_fingerprint_str(&fingerprint).await {
        Ok(entry) => (StatusCode::OK, Json(json!(entry))),
        Err(e) => error_response(e),
    }
}

pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .service
        .verify(&payload.record_type, &payload.record_id, &payload.fields)
        .await
    {
        Ok(verification) => (StatusCode::OK, Json(json!(verification))),
        Err(e) => error_response(e),
    }
}

pub async fn resend(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    match state.service.resend(id).await {
        Ok(entry) => (StatusCode::OK, Json(json!(entry))),
        Err(e) => error_response(e),
    }
}

pub async fn attach_content(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AttachContentRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .service
        .attach_content(id, &payload.content_reference)
        .await
    {
        Ok(entry) => (StatusCode::OK, Json(json!(entry))),
        Err(e) => error_response(e),
    }
}

pub async fn anchor_status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.service.anchor_snapshot().await;
    Json(json!(snapshot))
}

fn error_response(err: AuditError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        AuditError::Canonicalization(_) | AuditError::InvalidFingerprint(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AuditError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuditError::NotFound(_) => StatusCode::NOT_FOUND,
        AuditError::Conflict(_) => StatusCode::CONFLICT,
        AuditError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
