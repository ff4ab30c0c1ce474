//! Client traits and implementations for queue operations.

use crate::error::{QueueError, ValidationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, SequenceNumber};
use crate::provider::{QueueConfig, TransportType};
use crate::providers::{AzureServiceBusProvider, InMemoryProvider};
use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, instrument};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Main interface for queue operations across all transports.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send single message to queue
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError>;

    /// Lock and return the next available message, waiting up to `timeout`
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Lock and return up to `max_messages` messages
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Mark message as successfully processed, removing it from the queue
    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError>;

    /// Read a message without locking it.
    ///
    /// With `from_sequence` the message at exactly that sequence number is
    /// returned; without it the oldest message still in the queue.
    async fn peek_message(
        &self,
        queue: &QueueName,
        from_sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Read up to `max_messages` messages starting at `from_sequence` without locking
    async fn peek_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Check if the transport can browse without locking
    fn supports_peek(&self) -> bool;

    /// Largest batch accepted by receive/peek calls
    fn max_batch_size(&self) -> u32;
}

/// Interface implemented by specific queue transports (Azure, in-memory)
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Send single message
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive single message
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Receive multiple messages
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Complete message processing
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Peek single message
    async fn peek_message(
        &self,
        queue: &QueueName,
        from_sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Peek multiple messages
    async fn peek_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Check peek support
    fn supports_peek(&self) -> bool;

    /// Get maximum batch size
    fn max_batch_size(&self) -> u32;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: &QueueConfig) -> Result<Box<dyn QueueClient>, QueueError> {
        let provider: Box<dyn QueueProvider> = match config.transport() {
            TransportType::InMemory => {
                let provider = InMemoryProvider::new(config.in_memory_config().clone());
                provider.create_queue(config.queue_name());
                Box::new(provider)
            }
            TransportType::AzureServiceBus => {
                Box::new(AzureServiceBusProvider::from_config(config).await?)
            }
        };

        Ok(Box::new(StandardQueueClient::new(
            provider,
            config.max_batch_size(),
        )))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Box<dyn QueueClient> {
        let provider = InMemoryProvider::default();
        let max_batch_size = provider.max_batch_size();
        Box::new(StandardQueueClient::new(Box::new(provider), max_batch_size))
    }
}

/// Standard queue client implementation
pub struct StandardQueueClient {
    provider: Box<dyn QueueProvider>,
    max_batch_size: u32,
}

impl StandardQueueClient {
    /// Create new standard queue client with provider.
    ///
    /// `max_batch_size` is clamped to what the provider itself accepts.
    pub fn new(provider: Box<dyn QueueProvider>, max_batch_size: u32) -> Self {
        let max_batch_size = max_batch_size.min(provider.max_batch_size());
        Self {
            provider,
            max_batch_size,
        }
    }

    fn check_batch_size(&self, max_messages: u32) -> Result<(), QueueError> {
        if max_messages == 0 {
            return Err(QueueError::ValidationError(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }

        if max_messages > self.max_batch_size {
            return Err(QueueError::BatchTooLarge {
                size: max_messages as usize,
                max_size: self.max_batch_size as usize,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    #[instrument(skip(self, message), fields(queue = %queue, size = message.size()))]
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        let max_size = self.provider.transport_type().max_message_size();
        if message.size() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.size(),
                max_size,
            });
        }

        let message_id = self.provider.send_message(queue, &message).await?;
        debug!(message_id = %message_id, "Message sent");
        Ok(message_id)
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        self.provider.receive_message(queue, timeout).await
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.check_batch_size(max_messages)?;
        self.provider
            .receive_messages(queue, max_messages, timeout)
            .await
    }

    #[instrument(skip(self, receipt))]
    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError> {
        if receipt.transport() != self.provider.transport_type() {
            return Err(QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            });
        }

        self.provider.complete_message(&receipt).await
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn peek_message(
        &self,
        queue: &QueueName,
        from_sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        self.provider.peek_message(queue, from_sequence).await
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn peek_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.check_batch_size(max_messages)?;
        self.provider
            .peek_messages(queue, max_messages, from_sequence)
            .await
    }

    fn transport_type(&self) -> TransportType {
        self.provider.transport_type()
    }

    fn supports_peek(&self) -> bool {
        self.provider.supports_peek()
    }

    fn max_batch_size(&self) -> u32 {
        self.max_batch_size
    }
}
