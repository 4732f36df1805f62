//! Error to HTTP status translation

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use undertow_core::{ErrorCategory, StreamingError, UndertowError};

/// Error returned by every handler.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing required parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("Invalid value for parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Invalid request body: {reason}")]
    InvalidBody { reason: String },

    #[error(transparent)]
    Service(#[from] UndertowError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter { .. }
            | ApiError::InvalidParameter { .. }
            | ApiError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            ApiError::Service(e) => match e.category() {
                ErrorCategory::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorCategory::NotFound => StatusCode::NOT_FOUND,
                ErrorCategory::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
                ErrorCategory::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCategory::Upstream { status } => StatusCode::from_u16(status)
                    .ok()
                    .filter(|code| code.is_client_error() || code.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                ErrorCategory::Timeout
                | ErrorCategory::ToolUnavailable
                | ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();

        if let ApiError::Service(UndertowError::Streaming(StreamingError::RangeNotSatisfiable {
            total_size,
        })) = &self
            && let Ok(value) = HeaderValue::from_str(&format!("bytes */{total_size}"))
        {
            response.headers_mut().insert(header::CONTENT_RANGE, value);
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use undertow_core::{MetainfoError, ResolveError, SessionError, SessionKey};

    use super::*;

    #[test]
    fn test_category_status_codes() {
        let key = SessionKey::from_bytes(&[1; 20]);

        let cases = [
            (
                ApiError::MissingParameter { name: "url" },
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(UndertowError::from(SessionError::NotCached { key: key.clone() })),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(UndertowError::from(ResolveError::Timeout {
                    key: key.clone(),
                    after: Duration::from_secs(30),
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(UndertowError::from(ResolveError::Cancelled { key })),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        let upstream = |status| {
            ApiError::from(UndertowError::from(MetainfoError::UpstreamStatus {
                url: "http://tracker.example.com/a.torrent".to_string(),
                status,
            }))
        };
        let cases = cases.into_iter().chain([
            (upstream(404), StatusCode::NOT_FOUND),
            (upstream(503), StatusCode::SERVICE_UNAVAILABLE),
            (upstream(204), StatusCode::BAD_GATEWAY),
            (
                ApiError::InvalidBody {
                    reason: "expected value".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
        ]);

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn test_unsatisfiable_range_reports_size() {
        let error = ApiError::from(UndertowError::from(StreamingError::RangeNotSatisfiable {
            total_size: 1000,
        }));

        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }
}
