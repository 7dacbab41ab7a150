//! Error types for scout-search
//!
//! `SearchError` is returned by orchestrator operations; `ApiError` maps it
//! (and everything else) onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::SnapshotError;

/// Orchestrator operation errors
#[derive(Debug, Error)]
pub enum SearchError {
    /// A non-terminal session with this id exists
    #[error("Session already running: {0}")]
    AlreadyRunning(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    /// Request rejected before anything was started
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation not allowed in the session's current status
    #[error("Cannot {operation} session {session_id} while {status}")]
    InvalidState {
        session_id: String,
        status: String,
        operation: &'static str,
    },

    #[error("Snapshot store error: {0}")]
    Storage(#[from] SnapshotError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., session already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// scout-common error
    #[error("Common error: {0}")]
    Common(#[from] scout_common::Error),
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::AlreadyRunning(_) | SearchError::InvalidState { .. } => {
                ApiError::Conflict(err.to_string())
            }
            SearchError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SearchError::Validation(msg) => ApiError::BadRequest(msg),
            SearchError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_error_status_mapping() {
        let cases = [
            (SearchError::AlreadyRunning("s".into()), StatusCode::CONFLICT),
            (SearchError::NotFound("s".into()), StatusCode::NOT_FOUND),
            (SearchError::Validation("no positions".into()), StatusCode::BAD_REQUEST),
            (
                SearchError::InvalidState {
                    session_id: "s".into(),
                    status: "completed".into(),
                    operation: "pause",
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
