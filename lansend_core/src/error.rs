//! Error taxonomy for the receiver core.
//!
//! Every variant is recoverable from the caller's point of view and maps to
//! one HTTP status plus a `{"message": ...}` body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed or missing request fields
    #[error("{0}")]
    Validation(String),

    /// Wrong PIN on pairing
    #[error("Invalid PIN code")]
    InvalidPin,

    /// File operations attempted without an active pairing
    #[error("No active connection. Please /connect first.")]
    NotPaired,

    #[error("Session ID mismatch or invalid session (expected {expected:?}, got {got:?})")]
    SessionMismatch {
        expected: Option<String>,
        got: Option<String>,
    },

    #[error("File ID {0} not found or not accepted in current session")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransferError::Validation(_) => StatusCode::BAD_REQUEST,
            TransferError::InvalidPin => StatusCode::UNAUTHORIZED,
            TransferError::NotPaired => StatusCode::FORBIDDEN,
            TransferError::SessionMismatch { .. } => StatusCode::BAD_REQUEST,
            TransferError::FileNotFound(_) => StatusCode::NOT_FOUND,
            TransferError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
