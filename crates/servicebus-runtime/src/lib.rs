//! # Service Bus Runtime
//!
//! Queue runtime for a single Azure Service Bus queue, with an in-memory
//! transport for development and tests.
//!
//! This library provides:
//! - Peek-lock receive with explicit completion
//! - Non-destructive peek by sequence number (in-memory transport)
//! - Connection string and namespace based configuration
//! - Transport-independent error classification
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Transport types and configuration
//! - [`client`] - Client traits and implementations
//! - [`providers`] - Concrete transports

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, SequenceNumber, Timestamp,
};
pub use provider::{
    ConnectionString, InMemoryConfig, QueueConfig, ServiceBusAuth, TransportType,
};
pub use providers::{AzureServiceBusProvider, InMemoryProvider};
