//! Request bodies, query parameters and response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Batch size used when `max` is omitted
pub const DEFAULT_BATCH_SIZE: u32 = 10;

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

// ============================================================================
// Request Types
// ============================================================================

/// Body of both publish endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub payload: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `?metadata=` on single-message reads
#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    #[serde(default)]
    pub metadata: bool,
}

/// `?max=&metadata=` on batch receives
#[derive(Debug, Deserialize)]
pub struct BatchParams {
    #[serde(default = "default_batch_size")]
    pub max: u32,
    #[serde(default)]
    pub metadata: bool,
}

/// `?start=&metadata=` on single-message peeks; no `start` means the oldest message
#[derive(Debug, Default, Deserialize)]
pub struct PeekParams {
    pub start: Option<u64>,
    #[serde(default)]
    pub metadata: bool,
}

/// `?max=&start=&metadata=` on batch peeks; `start` is required
#[derive(Debug, Deserialize)]
pub struct PeekBatchParams {
    #[serde(default = "default_batch_size")]
    pub max: u32,
    pub start: u64,
    #[serde(default)]
    pub metadata: bool,
}

// ============================================================================
// Response Types
// ============================================================================

/// Publish response
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub message_id: String,
    pub status: String,
}

impl PublishResponse {
    pub fn published(message_id: impl ToString) -> Self {
        Self {
            message_id: message_id.to_string(),
            status: "published".to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub queue: String,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
}
