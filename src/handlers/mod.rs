// ---------------------------------------------------------------------------
// handlers/ - HTTP handlers that are not part of the MCP transport
// ---------------------------------------------------------------------------

pub(crate) mod system;

pub use system::{healthz, root};
pub use system::{__path_healthz, __path_root};

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Centralized HTTP error type.
/// Logged server-side with a request id, returned to the client as JSON.
///
/// Response format:
/// ```json
/// {
///   "error": {
///     "code": "UNAUTHORIZED",
///     "message": "Human-readable description",
///     "request_id": "uuid"
///   }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Machine-readable error code string for each variant.
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message returned to the client, without the variant prefix.
    fn client_message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::Unauthorized(m)
            | ApiError::Unavailable(m) => m,
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let request_id = Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(request_id = %request_id, code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        } else {
            tracing::info!(request_id = %request_id, code = self.error_code(), "API error ({}): {}", status.as_u16(), self);
        }

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.client_message(),
                "request_id": request_id,
            }
        });
        (status, Json(body)).into_response()
    }
}
