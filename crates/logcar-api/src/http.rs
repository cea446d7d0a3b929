//! The HTTP surface: record CRUD and file upload/download over axum

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use logcar_chunk::ChunkError;
use logcar_rail::RailError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::files::FilePayload;
use crate::record::{RecordOptions, RecordStore, StoredRecord};

/// Shared state behind every handler.
pub struct ApiState {
    /// The record store serving this surface
    pub store: RecordStore,
}

/// Builds the record API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/records", post(create_record))
        .route(
            "/records/{rid}",
            get(read_record).put(update_record).delete(delete_record),
        )
        .route("/files", post(upload_file))
        .route("/files/{rid}", get(download_file))
        .with_state(state)
}

/// Binds and serves the router until the process exits.
pub async fn serve(state: Arc<ApiState>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("record API listening on {bind}");
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

fn options_from(headers: &HeaderMap) -> RecordOptions {
    RecordOptions {
        key: headers
            .get("x-encryption-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn create_record(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Result<Json<StoredRecord>, ApiError> {
    let record = state.store.create(value, &options_from(&headers)).await?;
    Ok(Json(record))
}

async fn read_record(
    State(state): State<Arc<ApiState>>,
    Path(rid): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<StoredRecord>, ApiError> {
    let record = state.store.read(rid, &options_from(&headers)).await?;
    Ok(Json(record))
}

async fn update_record(
    State(state): State<Arc<ApiState>>,
    Path(rid): Path<Uuid>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Result<Json<StoredRecord>, ApiError> {
    let record = state
        .store
        .update(rid, value, &options_from(&headers))
        .await?;
    Ok(Json(record))
}

async fn delete_record(
    State(state): State<Arc<ApiState>>,
    Path(rid): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(rid).await?;
    Ok(Json(json!({"rid": rid, "deleted": true})))
}

async fn upload_file(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let payload = FilePayload {
        name: headers
            .get("x-file-name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("upload.bin")
            .to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string(),
        data: body.to_vec(),
    };
    let size = payload.data.len();
    let record = state
        .store
        .create(payload.to_envelope(), &options_from(&headers))
        .await?;
    Ok(Json(json!({
        "rid": record.rid,
        "name": payload.name,
        "size": size,
    })))
}

async fn download_file(
    State(state): State<Arc<ApiState>>,
    Path(rid): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state.store.read(rid, &options_from(&headers)).await?;
    let payload = FilePayload::from_envelope(&record.value)?;
    Ok((
        [(header::CONTENT_TYPE, payload.content_type)],
        payload.data,
    )
        .into_response())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingDeploymentId | ApiError::Config(_) | ApiError::InvalidFile(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rail(RailError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Rail(RailError::SearchBackendError(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Rail(RailError::Chunk(ChunkError::Decryption(_) | ChunkError::MissingKey))
            | ApiError::Chunk(ChunkError::Decryption(_) | ChunkError::MissingKey) => {
                StatusCode::FORBIDDEN
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
