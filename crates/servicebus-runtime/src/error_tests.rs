//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::Timeout {
        duration: Duration::seconds(5),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    }
    .is_transient());

    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());

    assert!(!QueueError::UnsupportedOperation {
        operation: "peek".to_string(),
        provider: "AzureServiceBus".to_string(),
    }
    .is_transient());
}

#[test]
fn test_retry_suggestions() {
    let connection = QueueError::ConnectionFailed {
        message: "reset by peer".to_string(),
    };
    assert_eq!(connection.retry_after(), Some(Duration::seconds(5)));

    let not_found = QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_nested_errors_convert_into_queue_error() {
    let err: QueueError = ConfigurationError::Missing {
        key: "service_bus.namespace".to_string(),
    }
    .into();
    assert!(matches!(err, QueueError::ConfigurationError(_)));
    assert!(err.to_string().contains("service_bus.namespace"));

    let err: QueueError = ValidationError::Required {
        field: "queue_name".to_string(),
    }
    .into();
    assert!(matches!(err, QueueError::ValidationError(_)));
}
