//! Transport types and queue configuration.

use crate::error::ConfigurationError;
use crate::message::QueueName;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Default DNS suffix appended to bare Service Bus namespace names
pub const SERVICE_BUS_DNS_SUFFIX: &str = "servicebus.windows.net";

/// How the runtime talks to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Azure Service Bus over its HTTPS data plane
    AzureServiceBus,
    /// Process-local broker for development and tests
    InMemory,
}

impl TransportType {
    /// Get maximum message size for transport
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureServiceBus => 256 * 1024, // Standard tier
            Self::InMemory => 10 * 1024 * 1024,
        }
    }

    /// Largest batch a single receive or peek call may request
    pub fn max_batch_size(&self) -> u32 {
        match self {
            Self::AzureServiceBus => 32,
            Self::InMemory => 100,
        }
    }

    /// Whether the transport can browse messages without locking them
    pub fn supports_peek(&self) -> bool {
        match self {
            Self::AzureServiceBus => false,
            Self::InMemory => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureServiceBus => "AzureServiceBus",
            Self::InMemory => "InMemory",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Connection strings
// ============================================================================

/// Parsed Service Bus connection string.
///
/// Accepts the portal format
/// `Endpoint=sb://<host>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<queue>]`.
/// Keys are matched case-insensitively and may appear in any order.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    host: String,
    shared_access_key_name: String,
    shared_access_key: String,
    entity_path: Option<String>,
}

impl ConnectionString {
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        let mut host = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Never echo the segment back, it may be a secret
            let (name, val) = part.split_once('=').ok_or_else(|| ConfigurationError::Parsing {
                message: "connection string contains a segment that is not a key=value pair"
                    .to_string(),
            })?;

            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => host = Some(parse_endpoint_host(val.trim())?),
                "sharedaccesskeyname" => key_name = Some(val.trim().to_string()),
                "sharedaccesskey" => key = Some(val.trim().to_string()),
                "entitypath" => entity_path = Some(val.trim().to_string()),
                // Unknown segments (e.g. TransportType) are tolerated
                _ => {}
            }
        }

        let host = host.ok_or_else(|| ConfigurationError::Missing {
            key: "connection_string.Endpoint".to_string(),
        })?;
        let shared_access_key_name = key_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "connection_string.SharedAccessKeyName".to_string(),
            })?;
        let shared_access_key = key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "connection_string.SharedAccessKey".to_string(),
            })?;

        Ok(Self {
            host,
            shared_access_key_name,
            shared_access_key,
            entity_path: entity_path.filter(|v| !v.is_empty()),
        })
    }

    /// Fully qualified namespace host, e.g. `contoso.servicebus.windows.net`
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn shared_access_key_name(&self) -> &str {
        &self.shared_access_key_name
    }

    pub fn shared_access_key(&self) -> &str {
        &self.shared_access_key
    }

    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("host", &self.host)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"<REDACTED>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

fn parse_endpoint_host(endpoint: &str) -> Result<String, ConfigurationError> {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let host = without_scheme.trim_end_matches('/');

    if host.is_empty() || host.contains('/') {
        return Err(ConfigurationError::Invalid {
            message: format!("connection string endpoint '{}' is not a namespace URI", endpoint),
        });
    }

    Ok(host.to_string())
}

/// Expand a bare namespace name into its fully qualified host
pub fn qualify_namespace(namespace: &str) -> Result<String, ConfigurationError> {
    let trimmed = namespace
        .trim()
        .trim_start_matches("sb://")
        .trim_start_matches("https://")
        .trim_end_matches('/');

    if trimmed.is_empty() {
        return Err(ConfigurationError::Missing {
            key: "namespace".to_string(),
        });
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(ConfigurationError::Invalid {
            message: format!("namespace '{}' contains invalid characters", trimmed),
        });
    }

    if trimmed.contains('.') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}.{}", trimmed, SERVICE_BUS_DNS_SUFFIX))
    }
}

// ============================================================================
// Queue configuration
// ============================================================================

/// How the Azure transport authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceBusAuth {
    /// Shared access signature derived from a connection string
    SharedAccessKey { key_name: String, key: String },
    /// Azure default credential chain (environment, managed identity, CLI)
    DefaultCredential,
}

impl fmt::Debug for ServiceBusAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedAccessKey { key_name, .. } => f
                .debug_struct("SharedAccessKey")
                .field("key_name", key_name)
                .field("key", &"<REDACTED>")
                .finish(),
            Self::DefaultCredential => f.write_str("DefaultCredential"),
        }
    }
}

/// Configuration for a connection bound to a single queue.
///
/// At least one of namespace or connection string must be provided; this is
/// checked by [`QueueConfig::new`] so an invalid value can never be built.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    namespace: Option<String>,
    connection_string: Option<ConnectionString>,
    queue_name: QueueName,
    transport: TransportType,
    receive_timeout: Duration,
    max_batch_size: u32,
    in_memory: InMemoryConfig,
}

impl QueueConfig {
    /// Create and validate a queue configuration
    pub fn new(
        namespace: Option<String>,
        connection_string: Option<String>,
        queue_name: QueueName,
        transport: TransportType,
    ) -> Result<Self, ConfigurationError> {
        let namespace = namespace.filter(|n| !n.trim().is_empty());
        let connection_string = connection_string.filter(|c| !c.trim().is_empty());

        if namespace.is_none() && connection_string.is_none() {
            return Err(ConfigurationError::Missing {
                key: "namespace or connection_string".to_string(),
            });
        }

        let namespace = namespace.map(|n| qualify_namespace(&n)).transpose()?;
        let connection_string = connection_string
            .map(|c| ConnectionString::parse(&c))
            .transpose()?;

        if let Some(entity) = connection_string.as_ref().and_then(|c| c.entity_path()) {
            if entity != queue_name.as_str() {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "connection string is scoped to '{}' but queue '{}' was configured",
                        entity, queue_name
                    ),
                });
            }
        }

        Ok(Self {
            namespace,
            connection_string,
            queue_name,
            transport,
            receive_timeout: Duration::seconds(5),
            max_batch_size: transport.max_batch_size(),
            in_memory: InMemoryConfig::default(),
        })
    }

    /// In-memory configuration for tests and local development
    pub fn in_memory(queue_name: QueueName) -> Self {
        Self {
            namespace: Some("localhost".to_string()),
            connection_string: None,
            queue_name,
            transport: TransportType::InMemory,
            receive_timeout: Duration::seconds(5),
            max_batch_size: TransportType::InMemory.max_batch_size(),
            in_memory: InMemoryConfig::default(),
        }
    }

    /// Set how long receive operations wait for a message
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the largest batch receive/peek callers may request
    pub fn with_max_batch_size(mut self, max: u32) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_in_memory_config(mut self, config: InMemoryConfig) -> Self {
        self.in_memory = config;
        self
    }

    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    pub fn transport(&self) -> TransportType {
        self.transport
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    pub fn max_batch_size(&self) -> u32 {
        self.max_batch_size
    }

    pub fn in_memory_config(&self) -> &InMemoryConfig {
        &self.in_memory
    }

    pub fn connection_string(&self) -> Option<&ConnectionString> {
        self.connection_string.as_ref()
    }

    /// Fully qualified namespace host; the connection string wins when both are set
    pub fn fully_qualified_namespace(&self) -> &str {
        match (&self.connection_string, &self.namespace) {
            (Some(cs), _) => cs.host(),
            (None, Some(ns)) => ns,
            // `new` rejects configs with neither
            (None, None) => "",
        }
    }

    /// HTTPS endpoint of the namespace
    pub fn endpoint(&self) -> Result<Url, ConfigurationError> {
        let raw = format!("https://{}/", self.fully_qualified_namespace());
        Url::parse(&raw).map_err(|e| ConfigurationError::Invalid {
            message: format!("namespace endpoint '{}' is not a valid URL: {}", raw, e),
        })
    }

    /// Authentication mode implied by the configured credentials
    pub fn auth(&self) -> ServiceBusAuth {
        match &self.connection_string {
            Some(cs) => ServiceBusAuth::SharedAccessKey {
                key_name: cs.shared_access_key_name().to_string(),
                key: cs.shared_access_key().to_string(),
            },
            None => ServiceBusAuth::DefaultCredential,
        }
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub max_queue_size: usize,
    pub lock_duration: Duration,
    pub default_message_ttl: Option<Duration>,
    pub auto_create_queues: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10000,
            lock_duration: Duration::seconds(30),
            default_message_ttl: None,
            auto_create_queues: true,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
