//! Received messages paired with their decoded bodies.

use crate::codec;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use servicebus_runtime::ReceivedMessage;
use std::collections::BTreeMap;

/// Broker-side facts about one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub message_id: String,
    pub sequence_number: u64,
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    pub body_size: usize,
}

impl From<&ReceivedMessage> for DeliveryMetadata {
    fn from(message: &ReceivedMessage) -> Self {
        Self {
            message_id: message.message_id.to_string(),
            sequence_number: message.sequence_number.value(),
            delivery_count: message.delivery_count,
            enqueued_at: message.enqueued_at.as_datetime(),
            locked_until: message.locked_until.as_ref().map(|t| t.as_datetime()),
            content_type: message.content_type.clone(),
            correlation_id: message.correlation_id.clone(),
            properties: message
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body_size: message.body.len(),
        }
    }
}

/// A message read from the queue and its body, decoded as `T` where possible.
///
/// `body` is `None` only for the raw text form when the payload is not UTF-8.
/// Typed reads never produce an envelope without a body; a body that does not
/// decode is reported as [`GatewayError::Deserialization`].
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    message: ReceivedMessage,
    body: Option<T>,
}

impl<T> Envelope<T> {
    /// The underlying broker message, including its receipt handle if locked
    pub fn message(&self) -> &ReceivedMessage {
        &self.message
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.message.body
    }

    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    pub fn metadata(&self) -> DeliveryMetadata {
        DeliveryMetadata::from(&self.message)
    }

    pub fn into_parts(self) -> (ReceivedMessage, Option<T>) {
        (self.message, self.body)
    }
}

impl Envelope<String> {
    /// Wrap a message whose body is read as UTF-8 text
    pub fn text(message: ReceivedMessage) -> Self {
        let body = std::str::from_utf8(&message.body).ok().map(str::to_string);
        Self { message, body }
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Wrap a message whose body is decoded as JSON into `T`
    pub fn decode(message: ReceivedMessage) -> Result<Self, GatewayError> {
        let body = codec::decode::<T>(&message.body).map_err(|source| {
            GatewayError::Deserialization {
                message_id: message.message_id.clone(),
                sequence_number: message.sequence_number,
                source,
            }
        })?;

        Ok(Self {
            message,
            body: Some(body),
        })
    }
}
