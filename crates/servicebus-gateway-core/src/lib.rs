//! # Service Bus Gateway Core
//!
//! Typed message gateway over a single queue.
//!
//! The gateway translates between raw broker messages and application
//! payloads. Every operation comes in a raw text form and a typed form where
//! the payload type is a static type parameter:
//!
//! ```rust,no_run
//! use servicebus_gateway_core::{BrokerGateway, TaggedText};
//! use servicebus_runtime::{QueueConfig, QueueName};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QueueConfig::in_memory(QueueName::new("demo".to_string())?);
//! let gateway = BrokerGateway::connect(&config).await?;
//!
//! gateway.publish(&TaggedText::new("hello", vec!["a".to_string()])).await?;
//! if let Some(envelope) = gateway.receive_one_as::<TaggedText>().await? {
//!     println!("{:?} at {}", envelope.body(), envelope.metadata().sequence_number);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod payload;

pub use envelope::{DeliveryMetadata, Envelope};
pub use error::GatewayError;
pub use gateway::BrokerGateway;
pub use payload::TaggedText;
