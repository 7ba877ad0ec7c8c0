//! Request handlers. Each one parses the wire format, calls into
//! [`ReceiverState`] and turns the outcome into a JSON response.

use crate::error::TransferError;
use crate::identity::DeviceInfo;
use crate::state::ReceiverState;
use crate::transfer::{ChunkStatus, FileMetadata};
use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Header carrying the session id of a chunk upload
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    #[serde(default)]
    pin_code: Option<String>,
    #[serde(default)]
    device_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RequestSendBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    files: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CancelSendBody {
    #[serde(default)]
    session_id: Option<String>,
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransferError> {
    serde_json::from_slice(body)
        .map_err(|_| TransferError::Validation("Invalid JSON format".to_string()))
}

/// `POST /connect`
pub async fn connect(
    State(state): State<Arc<ReceiverState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Response, TransferError> {
    tracing::info!("POST request to: /connect from {}", addr);
    let request: ConnectRequest = parse_json(&body)?;

    let (Some(pin_code), Some(device_info)) = (
        request.pin_code.filter(|p| !p.is_empty()),
        request.device_info.filter(|d| !d.is_null()),
    ) else {
        tracing::warn!("Connect request missing pin_code or device_info.");
        return Err(TransferError::Validation(
            "Missing pin_code or device_info".to_string(),
        ));
    };

    let remote: DeviceInfo = serde_json::from_value(device_info)
        .map_err(|e| TransferError::Validation(format!("Invalid device_info: {}", e)))?;

    let (me, _) = state.pair(&pin_code, remote).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Connection accepted",
        "device_info": me,
    }))
    .into_response())
}

/// `POST /request-send`
pub async fn request_send(
    State(state): State<Arc<ReceiverState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Response, TransferError> {
    tracing::info!("POST request to: /request-send from {}", addr);
    if let Err(e) = state.pairing.require_paired().await {
        tracing::warn!("Send request attempt without prior /connect.");
        return Err(e);
    }

    let request: RequestSendBody = parse_json(&body)?;
    let missing = || {
        TransferError::Validation(
            "Missing session_id or files, or invalid files format".to_string(),
        )
    };
    let session_id = request
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(missing)?;
    let files = match request.files {
        Some(files @ Value::Object(_)) => files,
        _ => return Err(missing()),
    };
    let manifest: HashMap<String, FileMetadata> = serde_json::from_value(files)
        .map_err(|e| TransferError::Validation(format!("Invalid file metadata: {}", e)))?;

    let opened = state.open_session(&session_id, manifest).await?;
    Ok(Json(opened).into_response())
}

/// `POST /api/v1/file_data/{file_id}` with the raw chunk as body
pub async fn file_data(
    State(state): State<Arc<ReceiverState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, TransferError> {
    let session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    let report = state.write_chunk(session_id, &file_id, &body).await?;
    let status = match report.status {
        ChunkStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        ChunkStatus::Receiving | ChunkStatus::Completed => StatusCode::OK,
    };
    Ok((status, Json(report)).into_response())
}

/// `POST /cancel-send`
pub async fn cancel_send(
    State(state): State<Arc<ReceiverState>>,
    body: Bytes,
) -> Result<Response, TransferError> {
    let request: CancelSendBody = parse_json(&body)?;
    let session_id = request
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TransferError::Validation("Missing session_id".to_string()))?;

    let cancelled = state.cancel_session(&session_id).await?;
    Ok(Json(json!({
        "session_id": cancelled.session_id,
        "message": "Session cancelled",
    }))
    .into_response())
}

/// `GET /ping`
pub async fn ping(State(state): State<Arc<ReceiverState>>) -> Json<Value> {
    Json(json!({
        "message": "pong",
        "device_info": state.device,
    }))
}

pub async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Endpoint not found" })),
    )
}
