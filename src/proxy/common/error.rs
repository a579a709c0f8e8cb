// Gateway errors
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Backend address missing or invalid; fatal, never retried
    #[error("Server configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend answered with a non-2xx status; body kept verbatim
    #[error("Backend error: {status} - {body}")]
    Backend { status: u16, body: String },

    #[error("Backend did not answer within {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// No response reached us
    #[error("Transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body is not the expected JSON
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Configuration(_) => "configuration",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Backend { .. } => "backend",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Transport(_) => "transport",
            GatewayError::Decode(_) => "decode",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Backend { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Transport(_) | GatewayError::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Worth offering the caller a "try again"
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. } | GatewayError::Transport(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            GatewayError::Configuration(e.to_string())
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "detail": self.to_string(),
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "retryable": self.is_transient(),
            }
        });

        (status, Json(body)).into_response()
    }
}
