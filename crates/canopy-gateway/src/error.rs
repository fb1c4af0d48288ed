//! Gateway error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request has no usable host header")]
    MissingHost,

    #[error("State store error: {0}")]
    Store(String),

    #[error("Origin request failed: {0}")]
    Origin(String),

    #[error("Origin request timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<canopy_control::ControlError> for GatewayError {
    fn from(error: canopy_control::ControlError) -> Self {
        Self::Store(error.to_string())
    }
}

impl GatewayError {
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::MissingHost => "missing_host",
            Self::Store(_) => "store_error",
            Self::Origin(_) => "origin_error",
            Self::Timeout => "origin_timeout",
            Self::Io(_) => "io_error",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHost => StatusCode::NOT_FOUND,
            Self::Origin(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) | Self::Store(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Sanitise error messages for external responses
        let message = match &self {
            Self::MissingHost => "Not found".to_owned(),
            Self::Timeout => "Origin request timed out".to_owned(),
            Self::Origin(_) => "Origin unavailable".to_owned(),
            Self::Config(_) | Self::Store(_) | Self::Io(_) => "Internal server error".to_owned(),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            GatewayError::MissingHost.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Origin("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(GatewayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            GatewayError::Store("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_types() {
        assert_eq!(GatewayError::MissingHost.error_type(), "missing_host");
        assert_eq!(GatewayError::Timeout.error_type(), "origin_timeout");
    }
}
