//! Typed publish/receive/peek over one queue.

use crate::codec;
use crate::envelope::Envelope;
use crate::error::GatewayError;
use bytes::Bytes;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use servicebus_runtime::{
    Message, MessageId, QueueClient, QueueClientFactory, QueueConfig, QueueName,
    ReceivedMessage, SequenceNumber,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;

/// Content type stamped on raw text messages
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Gateway bound to a single queue.
///
/// Receive operations complete every message they fetch before handing it
/// back, so a returned envelope is already removed from the queue. Peek
/// operations never lock or complete anything.
pub struct BrokerGateway {
    client: Arc<dyn QueueClient>,
    queue: QueueName,
    receive_timeout: Duration,
}

impl BrokerGateway {
    /// Bind an existing client to `queue`
    pub fn new(client: Arc<dyn QueueClient>, queue: QueueName) -> Self {
        Self {
            client,
            queue,
            receive_timeout: Duration::seconds(5),
        }
    }

    /// Build a client from `config` and bind it to the configured queue
    pub async fn connect(config: &QueueConfig) -> Result<Self, GatewayError> {
        let client = QueueClientFactory::create_client(config)
            .await
            .map_err(|e| GatewayError::transport("connect", e))?;

        info!(
            queue = %config.queue_name(),
            transport = %config.transport(),
            namespace = config.fully_qualified_namespace(),
            "Broker gateway connected"
        );

        Ok(Self::new(Arc::from(client), config.queue_name().clone())
            .with_receive_timeout(config.receive_timeout()))
    }

    /// How long receive operations wait for a message to arrive
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn supports_peek(&self) -> bool {
        self.client.supports_peek()
    }

    pub fn max_batch_size(&self) -> u32 {
        self.client.max_batch_size()
    }

    // ------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------

    /// Serialize `payload` as JSON and send it as one message
    pub async fn publish<T>(&self, payload: &T) -> Result<MessageId, GatewayError>
    where
        T: Serialize + ?Sized,
    {
        let message = codec::encode(payload).map_err(GatewayError::Serialization)?;
        self.publish_message(message).await
    }

    /// Send `text` verbatim as the message body
    pub async fn publish_text(&self, text: &str) -> Result<MessageId, GatewayError> {
        let message = Message::new(Bytes::copy_from_slice(text.as_bytes()))
            .with_content_type(TEXT_CONTENT_TYPE);
        self.publish_message(message).await
    }

    /// Send a fully built message
    #[instrument(skip(self, message), fields(queue = %self.queue, size = message.size()))]
    pub async fn publish_message(&self, message: Message) -> Result<MessageId, GatewayError> {
        let message_id = self
            .client
            .send_message(&self.queue, message)
            .await
            .map_err(|e| GatewayError::transport("send", e))?;

        debug!(message_id = %message_id, "Message published");
        Ok(message_id)
    }

    // ------------------------------------------------------------------
    // Receive (destructive)
    // ------------------------------------------------------------------

    /// Receive and complete the next message as text
    pub async fn receive_one(&self) -> Result<Option<Envelope<String>>, GatewayError> {
        Ok(self.fetch_one().await?.map(Envelope::text))
    }

    /// Receive and complete up to `max` messages as text
    pub async fn receive_many(&self, max: u32) -> Result<Vec<Envelope<String>>, GatewayError> {
        Ok(self
            .fetch_many(max)
            .await?
            .into_iter()
            .map(Envelope::text)
            .collect())
    }

    /// Receive and complete the next message, decoding it as `T`
    pub async fn receive_one_as<T>(&self) -> Result<Option<Envelope<T>>, GatewayError>
    where
        T: DeserializeOwned,
    {
        self.fetch_one().await?.map(Envelope::decode).transpose()
    }

    /// Receive and complete up to `max` messages, decoding each as `T`
    pub async fn receive_many_as<T>(&self, max: u32) -> Result<Vec<Envelope<T>>, GatewayError>
    where
        T: DeserializeOwned,
    {
        self.fetch_many(max)
            .await?
            .into_iter()
            .map(Envelope::decode)
            .collect()
    }

    // ------------------------------------------------------------------
    // Peek (non-destructive)
    // ------------------------------------------------------------------

    /// Peek the message at `sequence`, or the oldest message when omitted
    pub async fn peek_one(
        &self,
        sequence: Option<SequenceNumber>,
    ) -> Result<Option<Envelope<String>>, GatewayError> {
        Ok(self.browse_one(sequence).await?.map(Envelope::text))
    }

    /// Peek up to `max` messages starting at `start`
    pub async fn peek_many(
        &self,
        max: u32,
        start: SequenceNumber,
    ) -> Result<Vec<Envelope<String>>, GatewayError> {
        Ok(self
            .browse_many(max, start)
            .await?
            .into_iter()
            .map(Envelope::text)
            .collect())
    }

    /// Peek one message and decode it as `T`
    pub async fn peek_one_as<T>(
        &self,
        sequence: Option<SequenceNumber>,
    ) -> Result<Option<Envelope<T>>, GatewayError>
    where
        T: DeserializeOwned,
    {
        self.browse_one(sequence)
            .await?
            .map(Envelope::decode)
            .transpose()
    }

    /// Peek up to `max` messages starting at `start`, decoding each as `T`
    pub async fn peek_many_as<T>(
        &self,
        max: u32,
        start: SequenceNumber,
    ) -> Result<Vec<Envelope<T>>, GatewayError>
    where
        T: DeserializeOwned,
    {
        self.browse_many(max, start)
            .await?
            .into_iter()
            .map(Envelope::decode)
            .collect()
    }

    // ------------------------------------------------------------------
    // Broker calls
    // ------------------------------------------------------------------

    #[instrument(skip(self), fields(queue = %self.queue))]
    async fn fetch_one(&self) -> Result<Option<ReceivedMessage>, GatewayError> {
        let received = self
            .client
            .receive_message(&self.queue, self.receive_timeout)
            .await
            .map_err(|e| GatewayError::transport("receive", e))?;

        match received {
            Some(message) => {
                self.complete(&message).await?;
                Ok(Some(message))
            }
            None => {
                debug!("No message available");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self), fields(queue = %self.queue))]
    async fn fetch_many(&self, max: u32) -> Result<Vec<ReceivedMessage>, GatewayError> {
        let received = self
            .client
            .receive_messages(&self.queue, max, self.receive_timeout)
            .await
            .map_err(|e| GatewayError::transport("receive", e))?;

        for message in &received {
            self.complete(message).await?;
        }

        debug!(count = received.len(), "Messages received");
        Ok(received)
    }

    async fn complete(&self, message: &ReceivedMessage) -> Result<(), GatewayError> {
        let Some(receipt) = message.receipt_handle.clone() else {
            // Receive always locks; a missing handle means the transport broke its contract
            return Err(GatewayError::Completion {
                message_id: message.message_id.clone(),
                source: servicebus_runtime::QueueError::MessageNotFound {
                    receipt: String::new(),
                },
            });
        };

        self.client.complete_message(receipt).await.map_err(|source| {
            warn!(
                message_id = %message.message_id,
                error = %source,
                "Failed to complete received message"
            );
            GatewayError::Completion {
                message_id: message.message_id.clone(),
                source,
            }
        })
    }

    #[instrument(skip(self), fields(queue = %self.queue))]
    async fn browse_one(
        &self,
        sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, GatewayError> {
        self.client
            .peek_message(&self.queue, sequence)
            .await
            .map_err(|e| GatewayError::transport("peek", e))
    }

    #[instrument(skip(self), fields(queue = %self.queue))]
    async fn browse_many(
        &self,
        max: u32,
        start: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, GatewayError> {
        self.client
            .peek_messages(&self.queue, max, start)
            .await
            .map_err(|e| GatewayError::transport("peek", e))
    }
}
