//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use servicebus_runtime::{QueueConfig, QueueName, TransportType};
use std::path::Path;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an extra configuration file
pub const CONFIG_FILE_ENV: &str = "SBG_CONFIG_FILE";

/// Prefix of environment variable overrides, e.g. `SBG__SERVER__PORT=9090`
pub const ENV_PREFIX: &str = "SBG";

const SYSTEM_CONFIG_FILE: &str = "/etc/servicebus-gateway/service";
const LOCAL_CONFIG_FILE: &str = "config/service";

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Broker connection settings
    pub service_bus: ServiceBusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check every setting that could stop the service from starting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must not be 0".to_string(),
            });
        }

        if !(1..=100).contains(&self.service_bus.max_batch_size) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "service_bus.max_batch_size must be between 1 and 100, got {}",
                    self.service_bus.max_batch_size
                ),
            });
        }

        self.service_bus.queue_config().map(|_| ())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
            enable_compression: true,
        }
    }
}

/// Broker connection settings.
///
/// Either `namespace` or `connection_string` must be set. When both are set
/// the connection string decides the host and credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceBusConfig {
    /// Namespace name or fully qualified host; authenticates with the Azure credential chain
    pub namespace: Option<String>,

    /// Shared access connection string
    pub connection_string: Option<String>,

    /// Queue every operation is bound to
    pub queue_name: String,

    /// Broker transport
    pub transport: TransportType,

    /// How long a receive waits for a message, in seconds
    pub receive_timeout_seconds: u64,

    /// Largest batch a receive or peek may request
    pub max_batch_size: u32,
}

impl Default for ServiceBusConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            connection_string: None,
            queue_name: "messages".to_string(),
            transport: TransportType::AzureServiceBus,
            receive_timeout_seconds: 5,
            max_batch_size: 32,
        }
    }
}

impl std::fmt::Debug for ServiceBusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusConfig")
            .field("namespace", &self.namespace)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<REDACTED>"),
            )
            .field("queue_name", &self.queue_name)
            .field("transport", &self.transport)
            .field("receive_timeout_seconds", &self.receive_timeout_seconds)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl ServiceBusConfig {
    /// Build the validated runtime configuration
    pub fn queue_config(&self) -> Result<QueueConfig, ConfigError> {
        let queue_name = QueueName::new(self.queue_name.clone())?;
        let config = QueueConfig::new(
            self.namespace.clone(),
            self.connection_string.clone(),
            queue_name,
            self.transport,
        )?;

        let timeout_seconds = i64::try_from(self.receive_timeout_seconds).map_err(|_| {
            ConfigError::Invalid {
                message: "service_bus.receive_timeout_seconds is too large".to_string(),
            }
        })?;

        Ok(config
            .with_receive_timeout(Duration::seconds(timeout_seconds))
            .with_max_batch_size(self.max_batch_size))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level or filter directive; `RUST_LOG` takes precedence
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Load the service configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/servicebus-gateway/service.yaml`
///  2. `./config/service.yaml`
///  3. `explicit_path`, or the file named by `SBG_CONFIG_FILE`
///  4. Environment variables prefixed `SBG__` with `__` between keys,
///     e.g. `SBG__SERVICE_BUS__QUEUE_NAME=orders`
///
/// Missing optional files are skipped. A missing explicit file, a malformed
/// file, or a value of the wrong type is an error. The result is not
/// validated; call [`ServiceConfig::validate`].
pub fn load_config(explicit_path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name(SYSTEM_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name(LOCAL_CONFIG_FILE)
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    let explicit = match explicit_path {
        Some(path) => Some(path.to_string_lossy().into_owned()),
        None => std::env::var(CONFIG_FILE_ENV).ok().filter(|p| !p.is_empty()),
    };

    if let Some(path) = explicit {
        info!(path = %path, "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::with_name(&path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
