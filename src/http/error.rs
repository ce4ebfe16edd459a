//! HTTP error responses.
//!
//! Every error body has the shape `{ "error": "<message>" }`. Internal
//! failures are logged in full and reported with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::GateError;

/// Message returned for every authentication failure.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized: Invalid or missing token";

/// Message returned for unknown and expired attachments or tokens alike.
pub const NOT_FOUND_MESSAGE: &str = "Attachment not found or expired";

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors a handler can return.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or unacceptable request (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing, malformed or wrong bearer token (401).
    #[error("Unauthorized: Invalid or missing token")]
    Unauthorized,

    /// Unknown or expired attachment or token (404).
    #[error("Attachment not found or expired")]
    NotFound,

    /// No route for this method and path (404).
    #[error("Route {method} {path} not found")]
    NoRoute { method: String, path: String },

    /// Request body above the configured ceiling (413).
    #[error("Request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Anything else (500). The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound | Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::InvalidMessage(_) | GateError::MimeError(_) => {
                Self::BadRequest(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = body_of(ApiError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_fixed_messages_match_constants() {
        assert_eq!(ApiError::Unauthorized.to_string(), UNAUTHORIZED_MESSAGE);
        assert_eq!(ApiError::NotFound.to_string(), NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let (status, body) = body_of(ApiError::Internal("disk on fire at /var/x".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_no_route_message() {
        let err = ApiError::NoRoute {
            method: "DELETE".into(),
            path: "/nowhere".into(),
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route DELETE /nowhere not found");
    }

    #[test]
    fn test_gate_error_mapping() {
        let err: ApiError = GateError::InvalidMessage("Invalid email format".into()).into();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Invalid email format"));

        let err: ApiError = GateError::MimeError("truncated".into()).into();
        assert_eq!(err.to_string(), "Failed to parse email: truncated");

        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err: ApiError = GateError::io("/srv/blobs", io).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
