//! Route handlers.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, info};

use super::error::ApiError;
use super::view::{LinkResponse, ParseResponse};
use super::AppState;
use crate::model::attachment::DEFAULT_MIME_TYPE;
use crate::parser;
use crate::store::FetchedAttachment;

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /parse`: decode a raw message and process its attachments.
pub async fn parse(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ParseResponse>, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge {
                limit: state.config.server.body_limit,
            }
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body must not be empty".into()));
    }

    let size = body.len();
    let parsed = tokio::task::spawn_blocking(move || parser::parse_message(&body))
        .await
        .map_err(|e| ApiError::Internal(format!("parser task failed: {e}")))??;

    let processed = state.pipeline.process_mail(parsed).await;
    info!(
        bytes = size,
        attachments = processed.attachments.len(),
        "Parsed message"
    );

    Ok(Json(ParseResponse::new(processed, |id| state.attachment_url(id))))
}

/// `GET /attachments/{id}`: direct download.
pub async fn download_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let fetched = state.vault.fetch(&id).await?.ok_or(ApiError::NotFound)?;
    debug!(attachment_id = %id, "Serving attachment");
    attachment_response(fetched)
}

/// `POST /attachments/{id}/link`: issue a short-lived download token.
pub async fn issue_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LinkResponse>, ApiError> {
    let record = state.vault.lookup(&id).await.ok_or(ApiError::NotFound)?;
    let token = state.tokens.issue(&record.id);
    debug!(attachment_id = %record.id, "Issued download token");

    Ok(Json(LinkResponse {
        download_url: format!("{}/download/{token}", state.base_url),
        filename: record.filename,
        size: record.size,
        mime_type: record.mime_type,
        expires_in: state.tokens.ttl().as_secs(),
    }))
}

/// `GET /download/{token}`: redeem a token and download its attachment.
///
/// The attachment may expire between the two lookups; that is reported as
/// not found, like an unknown token.
pub async fn download_with_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let id = state.tokens.redeem(&token).ok_or(ApiError::NotFound)?;
    let fetched = state.vault.fetch(&id).await?.ok_or(ApiError::NotFound)?;
    debug!(attachment_id = %id, "Serving attachment via token");
    attachment_response(fetched)
}

/// Fallback for unmatched routes.
pub async fn no_route(method: Method, uri: Uri) -> ApiError {
    ApiError::NoRoute {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

/// `Content-Disposition` value carrying `filename` per RFC 5987.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn attachment_response(fetched: FetchedAttachment) -> Result<Response, ApiError> {
    let FetchedAttachment { record, content } = fetched;

    let content_type = HeaderValue::from_str(&record.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE));
    let disposition = HeaderValue::from_str(&content_disposition(&record.filename))
        .map_err(|e| ApiError::Internal(format!("bad Content-Disposition: {e}")))?;
    let last_modified = HeaderValue::from_str(
        &record
            .stored_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string(),
    )
    .map_err(|e| ApiError::Internal(format!("bad Last-Modified: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(record.size)),
            (header::CONTENT_DISPOSITION, disposition),
            (header::LAST_MODIFIED, last_modified),
        ],
        content,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_unicode() {
        assert_eq!(
            content_disposition("中文.txt"),
            "attachment; filename*=UTF-8''%E4%B8%AD%E6%96%87.txt"
        );
        assert_eq!(
            content_disposition("a b;\"c\".pdf"),
            "attachment; filename*=UTF-8''a%20b%3B%22c%22.pdf"
        );
    }
}
