//! Error types for the gateway

use hyper::StatusCode;

use crate::relay::RelayError;
use crate::transport::TransportError;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("WhatsApp session is not ready")]
    NotReady,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::SendFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::WebSocket(_) => StatusCode::BAD_GATEWAY,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code carried in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_REQUEST",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::NotReady => "NOT_READY",
            Self::SendFailed(_) => "SEND_FAILED",
            Self::Transport(_) => "TRANSPORT_FATAL",
            Self::WebSocket(_) | Self::Http(_) => "BAD_REQUEST",
            Self::Config(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::json!({
            "success": false,
            "code": self.code(),
            "error": self.to_string(),
        });
        (status, body.to_string())
    }
}

impl From<RelayError> for GatewayError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotReady => Self::NotReady,
            RelayError::InvalidRequest(msg) => Self::BadRequest(msg),
            RelayError::SendFailed(msg) => Self::SendFailed(msg),
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_errors_map_to_http_status() {
        let not_ready: GatewayError = RelayError::NotReady.into();
        assert_eq!(not_ready.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid: GatewayError = RelayError::InvalidRequest("number is required".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "INVALID_REQUEST");

        let failed: GatewayError = RelayError::SendFailed("socket closed".into()).into();
        assert_eq!(failed.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_body_carries_code() {
        let (status, body) = GatewayError::NotReady.into_status_code_and_body();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["code"], "NOT_READY");
        assert_eq!(json["success"], false);

        let oversized = GatewayError::PayloadTooLarge(65536);
        assert_eq!(oversized.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(oversized.code(), "PAYLOAD_TOO_LARGE");
    }
}
