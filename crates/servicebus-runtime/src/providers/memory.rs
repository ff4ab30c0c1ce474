//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory broker that:
//! - Assigns monotonically increasing sequence numbers per queue
//! - Implements peek-lock receive with lock expiry and redelivery
//! - Supports non-destructive peek by sequence number
//! - Honours message TTL and queue capacity limits
//! - Suspends receivers until a message arrives or the timeout elapses
//!
//! This provider is intended for:
//! - Unit and integration testing of gateway consumers
//! - Local development without a Service Bus namespace

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, SequenceNumber, Timestamp,
};
use crate::provider::{InMemoryConfig, TransportType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Upper bound on a single wait so that expired locks are noticed
const LOCK_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    /// Get a queue, creating it when auto-creation is enabled
    fn queue_mut(&mut self, queue_name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        if !self.queues.contains_key(queue_name) {
            if !self.config.auto_create_queues {
                return Err(QueueError::QueueNotFound {
                    queue_name: queue_name.to_string(),
                });
            }
            self.queues.insert(queue_name.clone(), InMemoryQueue::new());
        }

        self.queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    /// Active messages ordered by sequence number
    messages: BTreeMap<SequenceNumber, StoredMessage>,
    /// Last sequence number handed out
    last_sequence: u64,
    /// Wakes receivers waiting for new messages
    arrivals: Arc<Notify>,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            messages: BTreeMap::new(),
            last_sequence: 0,
            arrivals: Arc::new(Notify::new()),
        }
    }

    fn next_sequence(&mut self) -> SequenceNumber {
        self.last_sequence += 1;
        SequenceNumber::new(self.last_sequence)
    }

    /// Drop messages whose time-to-live has passed
    fn purge_expired(&mut self) {
        let now = Timestamp::now();
        self.messages.retain(|_, m| !m.is_expired_at(&now));
    }

    /// Lock the oldest message that is not currently locked
    fn lock_next(
        &mut self,
        queue_name: &QueueName,
        lock_duration: Duration,
    ) -> Option<ReceivedMessage> {
        let now = Timestamp::now();
        let stored = self
            .messages
            .values_mut()
            .find(|m| !m.is_locked_at(&now))?;

        let token = uuid::Uuid::new_v4().to_string();
        let locked_until = now.plus(lock_duration);
        stored.delivery_count += 1;
        stored.lock = Some(MessageLock {
            token: token.clone(),
            locked_until: locked_until.clone(),
        });

        let receipt = ReceiptHandle::new(
            encode_receipt(queue_name, stored.sequence_number, &token),
            locked_until,
            TransportType::InMemory,
        );
        Some(stored.to_received(Some(receipt)))
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    sequence_number: SequenceNumber,
    body: Bytes,
    content_type: Option<String>,
    correlation_id: Option<String>,
    properties: HashMap<String, String>,
    enqueued_at: Timestamp,
    delivery_count: u32,
    expires_at: Option<Timestamp>,
    lock: Option<MessageLock>,
}

#[derive(Clone)]
struct MessageLock {
    token: String,
    locked_until: Timestamp,
}

impl StoredMessage {
    fn from_message(
        message: &Message,
        message_id: MessageId,
        sequence_number: SequenceNumber,
        default_ttl: Option<Duration>,
    ) -> Self {
        let now = Timestamp::now();
        let expires_at = message
            .time_to_live
            .or(default_ttl)
            .map(|ttl| now.plus(ttl));

        Self {
            message_id,
            sequence_number,
            body: message.body.clone(),
            content_type: message.content_type.clone(),
            correlation_id: message.correlation_id.clone(),
            properties: message.properties.clone(),
            enqueued_at: now,
            delivery_count: 0,
            expires_at,
            lock: None,
        }
    }

    fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.expires_at.as_ref().is_some_and(|e| now >= e)
    }

    fn is_locked_at(&self, now: &Timestamp) -> bool {
        self.lock.as_ref().is_some_and(|l| now < &l.locked_until)
    }

    fn to_received(&self, receipt_handle: Option<ReceiptHandle>) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message_id.clone(),
            sequence_number: self.sequence_number,
            body: self.body.clone(),
            content_type: self.content_type.clone(),
            correlation_id: self.correlation_id.clone(),
            properties: self.properties.clone(),
            delivery_count: self.delivery_count,
            enqueued_at: self.enqueued_at.clone(),
            locked_until: self.lock.as_ref().map(|l| l.locked_until.clone()),
            receipt_handle,
        }
    }
}

// Receipt handles are "<queue>|<sequence>|<lock token>"; '|' is not a legal
// queue name character so the split is unambiguous.
fn encode_receipt(queue: &QueueName, sequence: SequenceNumber, token: &str) -> String {
    format!("{}|{}|{}", queue, sequence, token)
}

fn decode_receipt(handle: &str) -> Option<(QueueName, SequenceNumber, &str)> {
    let mut parts = handle.splitn(3, '|');
    let queue = QueueName::new(parts.next()?.to_string()).ok()?;
    let sequence = parts.next()?.parse::<u64>().ok()?;
    let token = parts.next()?;
    Some((queue, SequenceNumber::new(sequence), token))
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    /// Create a queue up front; a no-op when it already exists
    pub fn create_queue(&self, queue: &QueueName) {
        if let Ok(mut storage) = self.storage.write() {
            storage
                .queues
                .entry(queue.clone())
                .or_insert_with(InMemoryQueue::new);
        }
    }

    /// Number of active (not yet completed or expired) messages in a queue
    pub fn queue_length(&self, queue: &QueueName) -> usize {
        let Ok(storage) = self.read() else {
            return 0;
        };

        let now = Timestamp::now();
        storage.queues.get(queue).map_or(0, |q| {
            q.messages
                .values()
                .filter(|m| !m.is_expired_at(&now))
                .count()
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| poisoned())
    }

    /// Try to lock a message without waiting; also returns the queue's arrival signal
    fn try_receive(
        &self,
        queue: &QueueName,
    ) -> Result<(Option<ReceivedMessage>, Arc<Notify>), QueueError> {
        let mut storage = self.write()?;
        let lock_duration = storage.config.lock_duration;
        let q = storage.queue_mut(queue)?;
        q.purge_expired();
        Ok((q.lock_next(queue, lock_duration), Arc::clone(&q.arrivals)))
    }

    /// Wait for the first message, bounded by `timeout`
    async fn receive_first(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + timeout.to_std().unwrap_or_default();

        loop {
            let (received, arrivals) = self.try_receive(queue)?;
            if received.is_some() {
                return Ok(received);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            // A send between try_receive and here leaves a stored permit on
            // the Notify, so the wake-up cannot be lost.
            let _ = tokio::time::timeout(remaining.min(LOCK_POLL_INTERVAL), arrivals.notified())
                .await;
        }
    }
}

fn poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: TransportType::InMemory.to_string(),
        code: "StoragePoisoned".to_string(),
        message: "in-memory queue storage lock was poisoned".to_string(),
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.write()?;
        let capacity = storage.config.max_queue_size;
        let default_ttl = storage.config.default_message_ttl;
        let q = storage.queue_mut(queue)?;
        q.purge_expired();

        if q.messages.len() >= capacity {
            return Err(QueueError::QueueFull {
                queue_name: queue.to_string(),
                capacity,
            });
        }

        let message_id = MessageId::new();
        let sequence = q.next_sequence();
        q.messages.insert(
            sequence,
            StoredMessage::from_message(message, message_id.clone(), sequence, default_ttl),
        );
        q.arrivals.notify_one();

        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        self.receive_first(queue, timeout).await
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let Some(first) = self.receive_first(queue, timeout).await? else {
            return Ok(Vec::new());
        };

        let mut received = vec![first];
        while received.len() < max_messages as usize {
            match self.try_receive(queue)? {
                (Some(message), _) => received.push(message),
                (None, _) => break,
            }
        }

        Ok(received)
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let not_found = || QueueError::MessageNotFound {
            receipt: receipt.handle().to_string(),
        };
        let (queue, sequence, token) = decode_receipt(receipt.handle()).ok_or_else(not_found)?;

        let mut storage = self.write()?;
        let q = storage
            .queues
            .get_mut(&queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        let stored = q.messages.get(&sequence).ok_or_else(not_found)?;
        let lock = stored.lock.as_ref().filter(|l| l.token == token).ok_or_else(not_found)?;

        if Timestamp::now() >= lock.locked_until {
            return Err(QueueError::LockExpired {
                expired_at: lock.locked_until.clone(),
            });
        }

        q.messages.remove(&sequence);
        Ok(())
    }

    async fn peek_message(
        &self,
        queue: &QueueName,
        from_sequence: Option<SequenceNumber>,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = self.write()?;
        let q = storage.queue_mut(queue)?;
        q.purge_expired();

        let peeked = match from_sequence {
            Some(sequence) => q.messages.get(&sequence),
            None => q.messages.values().next(),
        };

        Ok(peeked.map(|m| m.to_received(None)))
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut storage = self.write()?;
        let q = storage.queue_mut(queue)?;
        q.purge_expired();

        Ok(q.messages
            .range(from_sequence..)
            .take(max_messages as usize)
            .map(|(_, m)| m.to_received(None))
            .collect())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::InMemory
    }

    fn supports_peek(&self) -> bool {
        true
    }

    fn max_batch_size(&self) -> u32 {
        TransportType::InMemory.max_batch_size()
    }
}
