//! Bearer token authentication.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use super::AppState;

/// Compare tokens without leaking their contents through timing.
///
/// A length mismatch still runs one comparison so the early return costs
/// about the same as a full one.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// The token from an `Authorization: Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Reject requests that do not carry the configured bearer token.
///
/// Every failure produces the same 401 body. With no token configured all
/// requests are rejected.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.server.api_token.as_deref() else {
        tracing::warn!("Rejecting request: no API token configured");
        return ApiError::Unauthorized.into_response();
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match provided {
        Some(token) if constant_time_token_eq(token, expected) => next.run(request).await,
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Authentication failed: invalid token");
            ApiError::Unauthorized.into_response()
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "Authentication failed: missing bearer token");
            ApiError::Unauthorized.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_token_eq("secret", "secret"));
        assert!(!constant_time_token_eq("secret", "secreT"));
        assert!(!constant_time_token_eq("sec", "secret"));
        assert!(!constant_time_token_eq("", "secret"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
