//! Error types for the HTTP service

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use servicebus_gateway_core::GatewayError;
use servicebus_runtime::{ConfigurationError, ValidationError};
use tracing::{error, warn};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Retry-After used when the broker gives no hint of its own
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 5;

/// Request handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the request can never succeed as sent
/// - `422 Unprocessable Entity`: a message was read but its body does not
///   match the requested payload type
/// - `501 Not Implemented`: the configured transport cannot do this
/// - `502 Bad Gateway`: the broker rejected or failed the operation
/// - `503 Service Unavailable`: the broker failure is transient; carries
///   `Retry-After`
/// - `500 Internal Server Error`: anything else
///
/// Bodies are JSON: `{"error": ..., "status": ..., "timestamp": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Status code and optional Retry-After seconds for this error
    pub fn classify(&self) -> (StatusCode, Option<u64>) {
        match self {
            Self::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, None),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
            Self::Gateway(e) => match e {
                GatewayError::Deserialization { .. } => (StatusCode::UNPROCESSABLE_ENTITY, None),
                GatewayError::Serialization(_) | GatewayError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, None)
                }
                e if e.is_invalid_request() => (StatusCode::BAD_REQUEST, None),
                e if e.is_unsupported() => (StatusCode::NOT_IMPLEMENTED, None),
                e if e.is_transient() => {
                    let seconds = e
                        .retry_after()
                        .and_then(|d| u64::try_from(d.num_seconds()).ok())
                        .filter(|s| *s > 0)
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
                    (StatusCode::SERVICE_UNAVAILABLE, Some(seconds))
                }
                _ => (StatusCode::BAD_GATEWAY, None),
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest {
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry_after) = self.classify();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the log
            error!(error = %self, "Internal server error occurred");
            "Internal server error occurred. Please try again later.".to_string()
        } else {
            if status.is_server_error() {
                warn!(error = %self, status = %status, "Broker operation failed");
            }
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Broker connection failed: {0}")]
    Broker(#[from] GatewayError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) | Self::Broker(GatewayError::Configuration(_)) => 3,
            Self::Broker(_) => 4,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] config::ConfigError),

    #[error("Invalid service bus configuration: {0}")]
    ServiceBus(#[from] ConfigurationError),

    #[error("Invalid queue name: {0}")]
    QueueName(#[from] ValidationError),
}
