//! Azure Service Bus provider implementation.
//!
//! Talks to the Service Bus HTTPS data plane directly:
//! - `POST {queue}/messages` to send, with broker properties in a JSON header
//! - `POST {queue}/messages/head?timeout=N` for peek-lock receive
//! - `DELETE {queue}/messages/{id}/{lock-token}` to complete
//!
//! ## Authentication
//!
//! - **SharedAccessKey**: a SAS token signed with HMAC-SHA256, derived from the
//!   connection string
//! - **Token**: an Azure AD bearer token from the default credential chain,
//!   used when only a namespace is configured
//!
//! The HTTPS data plane has no browse operation, so peek is reported as
//! unsupported by this transport.

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError, ValidationError};
use crate::message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, SequenceNumber, Timestamp,
};
use crate::provider::{QueueConfig, ServiceBusAuth, TransportType};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use azure_identity::{DefaultAzureCredential, TokenCredentialOptions};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// OAuth scope for the Service Bus data plane
const SERVICE_BUS_SCOPE: &str = "https://servicebus.azure.net/.default";

/// Header carrying system properties on requests and responses
const BROKER_PROPERTIES_HEADER: &str = "brokerproperties";

/// Lifetime of generated SAS tokens
const SAS_TOKEN_TTL_SECONDS: i64 = 3600;

/// Slack added on top of the server-side receive wait for the HTTP timeout
const HTTP_TIMEOUT_MARGIN_SECONDS: u64 = 30;

/// Lock duration assumed when the broker omits `LockedUntilUtc`
const DEFAULT_LOCK_SECONDS: i64 = 30;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Authentication
// ============================================================================

/// Credentials used to authorize data plane requests
#[derive(Clone)]
pub enum AzureCredential {
    /// Shared access key from a connection string
    SharedAccessKey { key_name: String, key: String },
    /// Azure AD token credential
    Token(Arc<dyn TokenCredential>),
}

impl fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedAccessKey { key_name, .. } => f
                .debug_struct("SharedAccessKey")
                .field("key_name", key_name)
                .field("key", &"<REDACTED>")
                .finish(),
            Self::Token(_) => f.write_str("Token"),
        }
    }
}

/// Build a SAS token for `resource_uri` valid until `expiry` (unix seconds).
///
/// The signature is HMAC-SHA256 over `<url-encoded uri>\n<expiry>`, keyed with
/// the raw bytes of the shared access key.
pub(crate) fn generate_sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expiry: i64,
) -> Result<String, AzureError> {
    let encoded_uri = urlencoding::encode(resource_uri);
    let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AzureError::Authentication(format!("invalid shared access key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
        encoded_uri,
        urlencoding::encode(&signature),
        expiry,
        urlencoding::encode(key_name)
    ))
}

// ============================================================================
// Error Types
// ============================================================================

/// The data plane call an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Send,
    Receive,
    Complete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Azure Service Bus specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Message lock lost: {0}")]
    LockLost(String),

    #[error("Message of {size} bytes rejected by the broker")]
    PayloadTooLarge { size: usize },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service Bus returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Malformed broker response: {0}")]
    Protocol(String),
}

impl AzureError {
    /// Classify a non-success HTTP status
    pub(crate) fn from_status(
        status: StatusCode,
        operation: Operation,
        subject: &str,
        body: &str,
        size: usize,
    ) -> Self {
        match status.as_u16() {
            401 => Self::Authentication(summarize(body)),
            403 => Self::PermissionDenied(operation.to_string()),
            404 if operation == Operation::Complete => Self::LockLost(subject.to_string()),
            404 => Self::EntityNotFound(subject.to_string()),
            410 => Self::LockLost(subject.to_string()),
            413 => Self::PayloadTooLarge { size },
            code => Self::Service {
                status: code,
                message: summarize(body),
            },
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Service { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Map Azure error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::PermissionDenied(operation) => QueueError::PermissionDenied { operation },
            Self::EntityNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::LockLost(receipt) => QueueError::MessageNotFound { receipt },
            Self::PayloadTooLarge { size } => QueueError::MessageTooLarge {
                size,
                max_size: TransportType::AzureServiceBus.max_message_size(),
            },
            Self::Network(message) => QueueError::ConnectionFailed { message },
            Self::Service { status, message } => QueueError::ProviderError {
                provider: TransportType::AzureServiceBus.to_string(),
                code: status.to_string(),
                message,
            },
            Self::Protocol(message) => QueueError::SerializationError(
                SerializationError::InvalidBrokerProperties { message },
            ),
        }
    }
}

/// Keep error bodies short enough for a log line
fn summarize(body: &str) -> String {
    const LIMIT: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= LIMIT {
        return trimmed.to_string();
    }

    let mut end = LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

// ============================================================================
// Broker properties
// ============================================================================

/// System properties exchanged in the `BrokerProperties` header
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct BrokerProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until_utc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_time_utc: Option<String>,
}

/// Parse the RFC 1123 timestamps Service Bus uses in broker properties
fn parse_broker_time(value: &str) -> Result<Timestamp, AzureError> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
        .map_err(|e| AzureError::Protocol(format!("invalid timestamp '{}': {}", value, e)))
}

// Receipt handles are "<queue>|<lock token>|<message id>"; queue names and
// lock tokens never contain '|', message ids may.
fn encode_receipt(queue: &QueueName, lock_token: &str, message_id: &MessageId) -> String {
    format!("{}|{}|{}", queue, lock_token, message_id)
}

fn decode_receipt(handle: &str) -> Option<(QueueName, &str, &str)> {
    let mut parts = handle.splitn(3, '|');
    let queue = QueueName::new(parts.next()?.to_string()).ok()?;
    let lock_token = parts.next().filter(|t| !t.is_empty())?;
    let message_id = parts.next().filter(|m| !m.is_empty())?;
    Some((queue, lock_token, message_id))
}

// ============================================================================
// Azure Service Bus Provider
// ============================================================================

/// Azure Service Bus queue provider over the HTTPS data plane
pub struct AzureServiceBusProvider {
    http_client: HttpClient,
    endpoint: Url,
    credential: AzureCredential,
}

impl fmt::Debug for AzureServiceBusProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureServiceBusProvider")
            .field("endpoint", &self.endpoint.as_str())
            .field("credential", &self.credential)
            .finish()
    }
}

impl AzureServiceBusProvider {
    /// Create a provider for the namespace and credentials in `config`
    pub async fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        let endpoint = config.endpoint()?;
        let credential = match config.auth() {
            ServiceBusAuth::SharedAccessKey { key_name, key } => {
                AzureCredential::SharedAccessKey { key_name, key }
            }
            ServiceBusAuth::DefaultCredential => {
                let credential = DefaultAzureCredential::create(TokenCredentialOptions::default())
                    .map_err(|e| QueueError::AuthenticationFailed {
                        message: format!("default Azure credential unavailable: {}", e),
                    })?;
                AzureCredential::Token(Arc::new(credential))
            }
        };

        debug!(
            endpoint = %endpoint,
            credential = ?credential,
            "Creating Azure Service Bus provider"
        );
        Self::with_endpoint(endpoint, credential)
    }

    /// Create a provider against an explicit endpoint
    pub fn with_endpoint(endpoint: Url, credential: AzureCredential) -> Result<Self, QueueError> {
        if endpoint.cannot_be_a_base() {
            return Err(ConfigurationError::Invalid {
                message: format!("endpoint '{}' cannot be used as a base URL", endpoint),
            }
            .into());
        }

        let http_client = HttpClient::builder()
            .build()
            .map_err(|e| AzureError::Network(format!("Failed to create HTTP client: {}", e)))
            .map_err(AzureError::to_queue_error)?;

        Ok(Self {
            http_client,
            endpoint,
            credential,
        })
    }

    fn queue_url(&self, queue: &QueueName, path: &str) -> Result<Url, AzureError> {
        self.endpoint
            .join(&format!("{}/{}", queue, path))
            .map_err(|e| AzureError::Protocol(format!("invalid queue URL: {}", e)))
    }

    /// Authorization header value for the next request
    async fn authorization(&self) -> Result<String, AzureError> {
        match &self.credential {
            AzureCredential::SharedAccessKey { key_name, key } => {
                let resource = self.endpoint.as_str().trim_end_matches('/').to_lowercase();
                let expiry = Utc::now().timestamp() + SAS_TOKEN_TTL_SECONDS;
                generate_sas_token(&resource, key_name, key, expiry)
            }
            AzureCredential::Token(credential) => {
                let token = credential
                    .get_token(&[SERVICE_BUS_SCOPE])
                    .await
                    .map_err(|e| AzureError::Authentication(e.to_string()))?;
                Ok(format!("Bearer {}", token.token.secret()))
            }
        }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, AzureError> {
        let authorization = self.authorization().await?;
        request
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AzureError::Network(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    AzureError::Network(format!("Connection failed: {}", e))
                } else {
                    AzureError::Network(format!("HTTP request failed: {}", e))
                }
            })
    }

    /// Turn a non-success response into an error
    async fn reject(
        response: Response,
        operation: Operation,
        subject: &str,
        size: usize,
    ) -> AzureError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        AzureError::from_status(status, operation, subject, &body, size)
    }

    fn build_send_headers(
        message: &Message,
        message_id: &MessageId,
    ) -> Result<HeaderMap, QueueError> {
        let broker = BrokerProperties {
            message_id: Some(message_id.to_string()),
            correlation_id: message.correlation_id.clone(),
            time_to_live: message
                .time_to_live
                .map(|ttl| ttl.num_milliseconds() as f64 / 1000.0),
            ..BrokerProperties::default()
        };
        let broker_json = serde_json::to_string(&broker).map_err(SerializationError::from)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(BROKER_PROPERTIES_HEADER),
            HeaderValue::from_str(&broker_json).map_err(|e| {
                SerializationError::InvalidBrokerProperties {
                    message: e.to_string(),
                }
            })?,
        );

        let content_type = message
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type).map_err(|_| ValidationError::InvalidFormat {
                field: "content_type".to_string(),
                message: "not a valid header value".to_string(),
            })?,
        );

        // Custom properties travel as headers with JSON string values
        for (key, value) in &message.properties {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                ValidationError::InvalidFormat {
                    field: format!("properties.{}", key),
                    message: "property name is not a valid header name".to_string(),
                }
            })?;
            let quoted = serde_json::to_string(value).map_err(SerializationError::from)?;
            let value = HeaderValue::from_str(&quoted).map_err(|_| {
                ValidationError::InvalidFormat {
                    field: format!("properties.{}", key),
                    message: "property value is not a valid header value".to_string(),
                }
            })?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Build a received message from a `201 Created` receive response
    async fn read_message(
        queue: &QueueName,
        response: Response,
    ) -> Result<ReceivedMessage, AzureError> {
        let headers = response.headers().clone();
        let broker_raw = headers
            .get(BROKER_PROPERTIES_HEADER)
            .ok_or_else(|| AzureError::Protocol("missing BrokerProperties header".to_string()))?
            .to_str()
            .map_err(|e| AzureError::Protocol(e.to_string()))?;
        let broker: BrokerProperties = serde_json::from_str(broker_raw)
            .map_err(|e| AzureError::Protocol(format!("invalid BrokerProperties: {}", e)))?;

        let message_id: MessageId = broker
            .message_id
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(|_| AzureError::Protocol("message has no MessageId".to_string()))?;
        let lock_token = broker
            .lock_token
            .clone()
            .ok_or_else(|| AzureError::Protocol("message has no LockToken".to_string()))?;
        let locked_until = match broker.locked_until_utc.as_deref() {
            Some(value) => parse_broker_time(value)?,
            None => Timestamp::now().plus(Duration::seconds(DEFAULT_LOCK_SECONDS)),
        };
        let enqueued_at = match broker.enqueued_time_utc.as_deref() {
            Some(value) => parse_broker_time(value)?,
            None => Timestamp::now(),
        };

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let properties = custom_properties(&headers);

        let body = response
            .bytes()
            .await
            .map_err(|e| AzureError::Network(format!("Failed to read response body: {}", e)))?;

        let receipt = ReceiptHandle::new(
            encode_receipt(queue, &lock_token, &message_id),
            locked_until.clone(),
            TransportType::AzureServiceBus,
        );

        Ok(ReceivedMessage {
            message_id,
            sequence_number: SequenceNumber::new(broker.sequence_number.unwrap_or_default()),
            body,
            content_type,
            correlation_id: broker.correlation_id,
            properties,
            delivery_count: broker.delivery_count.unwrap_or(1),
            enqueued_at,
            locked_until: Some(locked_until),
            receipt_handle: Some(receipt),
        })
    }

    /// One peek-lock receive call; `wait_seconds` is the server-side wait
    async fn receive_once(
        &self,
        queue: &QueueName,
        wait_seconds: u64,
    ) -> Result<Option<ReceivedMessage>, AzureError> {
        let mut url = self.queue_url(queue, "messages/head")?;
        url.query_pairs_mut()
            .append_pair("timeout", &wait_seconds.to_string());

        let request = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .timeout(std::time::Duration::from_secs(
                wait_seconds + HTTP_TIMEOUT_MARGIN_SECONDS,
            ));
        let response = self.execute(request).await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                Self::read_message(queue, response).await.map(Some)
            }
            StatusCode::NO_CONTENT => Ok(None),
            _ => Err(Self::reject(response, Operation::Receive, queue.as_str(), 0).await),
        }
    }
}

/// Application properties returned as headers with JSON string values
fn custom_properties(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            *name != CONTENT_TYPE && name.as_str() != BROKER_PROPERTIES_HEADER
        })
        .filter_map(|(name, value)| {
            let raw = value.to_str().ok()?;
            if !raw.starts_with('"') {
                return None;
            }
            let decoded: String = serde_json::from_str(raw).ok()?;
            Some((name.as_str().to_string(), decoded))
        })
        .collect()
}

fn unsupported_peek() -> QueueError {
    QueueError::UnsupportedOperation {
        operation: "peek".to_string(),
        provider: TransportType::AzureServiceBus.to_string(),
    }
}

#[async_trait]
impl QueueProvider for AzureServiceBusProvider {
    #[instrument(skip(self, message), fields(queue = %queue))]
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();
        let headers = Self::build_send_headers(message, &message_id)?;
        let url = self
            .queue_url(queue, "messages")
            .map_err(AzureError::to_queue_error)?;

        let request = self
            .http_client
            .post(url)
            .headers(headers)
            .body(message.body.clone());
        let response = self
            .execute(request)
            .await
            .map_err(AzureError::to_queue_error)?;

        if !response.status().is_success() {
            let err = Self::reject(response, Operation::Send, queue.as_str(), message.size()).await;
            warn!(error = %err, "Service Bus rejected message");
            return Err(err.to_queue_error());
        }

        debug!(message_id = %message_id, "Message accepted by Service Bus");
        Ok(message_id)
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let wait_seconds = timeout.num_seconds().max(0) as u64;
        self.receive_once(queue, wait_seconds)
            .await
            .map_err(AzureError::to_queue_error)
    }

    #[instrument(skip(self), fields(queue = %queue))]
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        // The data plane hands out one message per call; only the first waits
        let mut received = Vec::new();
        let mut wait_seconds = timeout.num_seconds().max(0) as u64;

        while received.len() < max_messages as usize {
            match self
                .receive_once(queue, wait_seconds)
                .await
                .map_err(AzureError::to_queue_error)?
            {
                Some(message) => received.push(message),
                None => break,
            }
            wait_seconds = 0;
        }

        Ok(received)
    }

    #[instrument(skip(self, receipt))]
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let (queue, lock_token, message_id) =
            decode_receipt(receipt.handle()).ok_or_else(|| QueueError::MessageNotFound {
                receipt: receipt.handle().to_string(),
            })?;

        let path = format!(
            "messages/{}/{}",
            urlencoding::encode(message_id),
            urlencoding::encode(lock_token)
        );
        let url = self
            .queue_url(&queue, &path)
            .map_err(AzureError::to_queue_error)?;

        let response = self
            .execute(self.http_client.delete(url))
            .await
            .map_err(AzureError::to_queue_error)?;

        if !response.status().is_success() {
            let err = Self::reject(response, Operation::Complete, message_id, 0).await;
            return Err(err.to_queue_error());
        }

        debug!(message_id = %message_id, "Message completed");
        Ok(())
    }

    async fn peek_message(
        &self,
        _queue: &QueueName,
        _from_sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        Err(unsupported_peek())
    }

    async fn peek_messages(
        &self,
        _queue: &QueueName,
        _max_messages: u32,
        _from_sequence: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        Err(unsupported_peek())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::AzureServiceBus
    }

    fn supports_peek(&self) -> bool {
        false
    }

    fn max_batch_size(&self) -> u32 {
        TransportType::AzureServiceBus.max_batch_size()
    }
}
