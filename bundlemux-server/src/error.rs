//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use bundlemux_mcp::GatewayError;

/// Result type for route handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised at the HTTP boundary.
///
/// Gateway errors carry their own status mapping; the remaining variants
/// exist only at this layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Missing or malformed `Accept` header on the MCP ingress
    #[error("client must accept application/json and text/event-stream")]
    NotAcceptable,

    /// Concurrent session limit reached
    #[error("session capacity exhausted")]
    CapacityExhausted,

    /// Per-IP rate limit hit
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Request body failed to parse
    #[error("invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Gateway(err) => {
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ApiError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show callers; internals are collapsed.
    fn public_message(&self) -> String {
        match self {
            ApiError::Gateway(GatewayError::Internal { .. }) => "internal error".to_string(),
            ApiError::Gateway(GatewayError::DecryptError { .. }) => {
                "credential decryption failed".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Gateway(GatewayError::from(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut response =
            (status, Json(json!({ "error": self.public_message() }))).into_response();

        if let ApiError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}
