//! Tests for error to HTTP response mapping.

use super::*;
use servicebus_runtime::{MessageId, QueueError, SequenceNumber};

fn transport(source: QueueError) -> ApiError {
    ApiError::Gateway(GatewayError::Transport {
        operation: "receive",
        source,
    })
}

fn json_error() -> serde_json::Error {
    serde_json::from_str::<u32>("not json").unwrap_err()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_transient_transport_error_is_503_with_retry_after() {
    let response = transport(QueueError::ConnectionFailed {
        message: "reset by peer".to_string(),
    })
    .into_response();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["Retry-After"], "5");

    let body = body_json(response).await;
    assert_eq!(body["status"], 503);
    assert!(body["error"].as_str().unwrap().contains("reset by peer"));
    assert!(body["timestamp"].is_string());
}

#[test]
fn test_queue_full_uses_broker_retry_hint() {
    let (status, retry_after) = transport(QueueError::QueueFull {
        queue_name: "orders".to_string(),
        capacity: 10,
    })
    .classify();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(retry_after, Some(10));
}

#[test]
fn test_permanent_transport_error_is_502() {
    let (status, retry_after) = transport(QueueError::AuthenticationFailed {
        message: "bad key".to_string(),
    })
    .classify();

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(retry_after, None);
}

#[test]
fn test_permanent_completion_error_is_502() {
    let error = ApiError::Gateway(GatewayError::Completion {
        message_id: MessageId::new(),
        source: QueueError::MessageNotFound {
            receipt: "orders|1|token".to_string(),
        },
    });

    assert_eq!(error.classify().0, StatusCode::BAD_GATEWAY);
}

#[test]
fn test_unsupported_operation_is_501() {
    let (status, _) = transport(QueueError::UnsupportedOperation {
        operation: "peek".to_string(),
        provider: "AzureServiceBus".to_string(),
    })
    .classify();

    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[test]
fn test_deserialization_error_is_422() {
    let error = ApiError::Gateway(GatewayError::Deserialization {
        message_id: MessageId::new(),
        sequence_number: SequenceNumber::new(4),
        source: json_error(),
    });

    assert_eq!(error.classify().0, StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn test_invalid_requests_are_400() {
    let validation = ApiError::Gateway(GatewayError::Validation(ValidationError::OutOfRange {
        field: "max_messages".to_string(),
        message: "must be at least 1".to_string(),
    }));
    assert_eq!(validation.classify().0, StatusCode::BAD_REQUEST);

    let batch = transport(QueueError::BatchTooLarge {
        size: 500,
        max_size: 100,
    });
    assert_eq!(batch.classify().0, StatusCode::BAD_REQUEST);

    let request = ApiError::InvalidRequest {
        message: "nope".to_string(),
    };
    assert_eq!(request.classify().0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_serialization_error_is_500_without_details() {
    let response = ApiError::Gateway(GatewayError::Serialization(json_error())).into_response();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get("Retry-After").is_none());

    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "Internal server error occurred. Please try again later."
    );
}

#[test]
fn test_service_error_exit_codes() {
    let config = ServiceError::Configuration(ConfigError::Invalid {
        message: "bad".to_string(),
    });
    assert_eq!(config.exit_code(), 3);

    let bind = ServiceError::BindFailed {
        address: "0.0.0.0:8080".to_string(),
        message: "in use".to_string(),
    };
    assert_eq!(bind.exit_code(), 1);
}
