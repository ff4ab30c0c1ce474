//! API-facing views of gateway envelopes.

use serde::Serialize;
use servicebus_gateway_core::{DeliveryMetadata, Envelope};

#[cfg(test)]
#[path = "presentation_tests.rs"]
mod tests;

/// A delivered message as the API returns it.
///
/// Serialized untagged: the full view is `{"metadata": {...}, "body": ...}`,
/// the body-only view is the body itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageView<T> {
    Full {
        metadata: DeliveryMetadata,
        body: Option<T>,
    },
    BodyOnly(Option<T>),
}

impl<T> MessageView<T> {
    pub fn from_envelope(envelope: Envelope<T>, include_metadata: bool) -> Self {
        if include_metadata {
            let metadata = envelope.metadata();
            let (_, body) = envelope.into_parts();
            Self::Full { metadata, body }
        } else {
            Self::BodyOnly(envelope.into_parts().1)
        }
    }

    /// Map a batch item by item, keeping the gateway's order
    pub fn from_envelopes(envelopes: Vec<Envelope<T>>, include_metadata: bool) -> Vec<Self> {
        envelopes
            .into_iter()
            .map(|e| Self::from_envelope(e, include_metadata))
            .collect()
    }

    pub fn body(&self) -> Option<&T> {
        match self {
            Self::Full { body, .. } | Self::BodyOnly(body) => body.as_ref(),
        }
    }

    pub fn metadata(&self) -> Option<&DeliveryMetadata> {
        match self {
            Self::Full { metadata, .. } => Some(metadata),
            Self::BodyOnly(_) => None,
        }
    }
}
