//! Gateway error types.

use chrono::Duration;
use servicebus_runtime::{
    ConfigurationError, MessageId, QueueError, SequenceNumber, ValidationError,
};
use thiserror::Error;

/// Errors surfaced by [`BrokerGateway`](crate::BrokerGateway) operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Broker {operation} failed: {source}")]
    Transport {
        operation: &'static str,
        source: QueueError,
    },

    #[error("Failed to complete message {message_id}: {source}")]
    Completion {
        message_id: MessageId,
        source: QueueError,
    },

    #[error("Message {message_id} (sequence {sequence_number}) could not be decoded: {source}")]
    Deserialization {
        message_id: MessageId,
        sequence_number: SequenceNumber,
        source: serde_json::Error,
    },

    #[error("Payload could not be serialized: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),
}

impl GatewayError {
    pub(crate) fn transport(operation: &'static str, source: QueueError) -> Self {
        match source {
            QueueError::ValidationError(e) => Self::Validation(e),
            QueueError::ConfigurationError(e) => Self::Configuration(e),
            source => Self::Transport { operation, source },
        }
    }

    /// The broker error behind a transport or completion failure
    pub fn queue_error(&self) -> Option<&QueueError> {
        match self {
            Self::Transport { source, .. } | Self::Completion { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if the failed operation may succeed when tried again
    pub fn is_transient(&self) -> bool {
        self.queue_error().is_some_and(QueueError::is_transient)
    }

    /// Suggested delay before trying again
    pub fn retry_after(&self) -> Option<Duration> {
        self.queue_error().and_then(QueueError::retry_after)
    }

    /// Whether the transport cannot perform the requested operation at all
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self.queue_error(),
            Some(QueueError::UnsupportedOperation { .. })
        )
    }

    /// Whether the caller asked for something the broker will never accept
    pub fn is_invalid_request(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Transport { source, .. } => matches!(
                source,
                QueueError::BatchTooLarge { .. } | QueueError::MessageTooLarge { .. }
            ),
            _ => false,
        }
    }
}
