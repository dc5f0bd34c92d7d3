use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::{error, warn};

#[derive(Debug, ThisError)]
pub enum OpsError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Upstream rejected request: {0}")]
    Upstream(String),

    #[error("Assistant run did not finish within {0} seconds")]
    AssistantTimeout(u64),

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl OpsError {
    /// Transient failures worth another attempt against an upstream API.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::Reqwest(e) => e.is_connect() || e.is_timeout(),
            OpsError::UpstreamStatus(code) => code.is_server_error(),
            _ => false,
        }
    }

    /// The request never reached the upstream, so even a non-idempotent call
    /// may be sent again.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, OpsError::Reqwest(e) if e.is_connect())
    }

    fn status_and_body(&self) -> (StatusCode, ApiErrorBody) {
        let (status, code, message) = match self {
            OpsError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION", msg.clone()),
            OpsError::Json(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Malformed JSON payload.".to_string(),
            ),
            OpsError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            OpsError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            OpsError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }
            OpsError::DatabaseError(SqlxError::RowNotFound) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Resource not found.".to_string(),
            ),
            OpsError::DatabaseError(SqlxError::Database(db)) if db.is_unique_violation() => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "A record with the same unique value already exists.".to_string(),
            ),
            OpsError::DatabaseError(SqlxError::Database(db)) if db.is_foreign_key_violation() => (
                StatusCode::BAD_REQUEST,
                "INVALID_REFERENCE",
                "Referenced record does not exist.".to_string(),
            ),
            OpsError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            OpsError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                "request body too large".to_string(),
            ),
            OpsError::Reqwest(_) | OpsError::UrlParse(_) => (
                StatusCode::BAD_GATEWAY,
                "BAD_GATEWAY",
                "Upstream service is unavailable.".to_string(),
            ),
            OpsError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),
            OpsError::UpstreamStatus(code) => {
                let (err_code, msg) = match *code {
                    StatusCode::TOO_MANY_REQUESTS => {
                        ("RATE_LIMIT", "Upstream rate limit exceeded.")
                    }
                    StatusCode::UNAUTHORIZED => ("UNAUTHORIZED", "Upstream authentication failed."),
                    StatusCode::FORBIDDEN => ("FORBIDDEN", "Upstream permission denied."),
                    StatusCode::NOT_FOUND => ("NOT_FOUND", "Upstream resource not found."),
                    _ => ("UPSTREAM_ERROR", "An upstream error occurred."),
                };
                // Upstream auth problems are ours, not the caller's.
                let status = if code.is_client_error() && *code != StatusCode::TOO_MANY_REQUESTS {
                    StatusCode::BAD_GATEWAY
                } else {
                    *code
                };
                (status, err_code, msg.to_string())
            }
            OpsError::AssistantTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "ASSISTANT_TIMEOUT",
                self.to_string(),
            ),
            OpsError::DatabaseError(_) | OpsError::Io(_) | OpsError::RactorError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred.".to_string(),
            ),
        };
        (
            status,
            ApiErrorBody {
                code: code.to_string(),
                message,
            },
        )
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = self.status_and_body();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        } else {
            warn!(status = %status, error = %self, "request rejected");
        }
        (
            status,
            Json(ApiErrorResponse {
                success: false,
                error: error_body,
            }),
        )
            .into_response()
    }
}

/// Standardized API error response body
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}
