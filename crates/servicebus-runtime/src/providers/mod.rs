//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueProvider`
//! trait for the supported transports.

pub mod azure;
pub mod memory;

pub use azure::{AzureCredential, AzureError, AzureServiceBusProvider};
pub use memory::InMemoryProvider;
