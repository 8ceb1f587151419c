//! In-memory queue transport for testing and development.
//!
//! This module provides an in-process stand-in for SQS standard queues that:
//! - Issues message ids and a fresh receipt handle per delivery
//! - Honors send delays and visibility timeouts
//! - Redelivers messages whose visibility timeout lapsed without a delete
//! - Long-polls up to the requested wait time
//! - Reports `ApproximateReceiveCount` and `SentTimestamp` attributes
//!
//! Queues must be created with [`InMemoryTransport::create_queue`] before
//! use; calls against unknown queue locators fail with `QueueNotFound`.

use crate::config::ClientParameters;
use crate::transport::{
    DeleteMessageRequest, QueueTransport, RawMessage, ReceiveMessageRequest, SendMessageOutput,
    SendMessageRequest, TransportError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Visibility timeout applied when neither the request nor the queue sets one
pub const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;

const DEFAULT_BASE_URL: &str = "http://localhost:4566/000000000000";

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<String, InMemoryQueue>,
}

impl QueueStorage {
    fn queue_mut(&mut self, queue_url: &str) -> Result<&mut InMemoryQueue, TransportError> {
        self.queues
            .get_mut(queue_url)
            .ok_or_else(|| TransportError::QueueNotFound {
                queue_url: queue_url.to_string(),
            })
    }

    fn queue(&self, queue_url: &str) -> Result<&InMemoryQueue, TransportError> {
        self.queues
            .get(queue_url)
            .ok_or_else(|| TransportError::QueueNotFound {
                queue_url: queue_url.to_string(),
            })
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    /// Messages in send order, visible or not
    messages: VecDeque<StoredMessage>,
    visibility_timeout: u32,
}

impl InMemoryQueue {
    fn new(visibility_timeout: u32) -> Self {
        Self {
            messages: VecDeque::new(),
            visibility_timeout,
        }
    }

    /// Hand out up to `max` visible messages, hiding each for `visibility`
    fn deliver(&mut self, max: usize, visibility: u32, now: DateTime<Utc>) -> Vec<RawMessage> {
        let hidden_until = now + Duration::seconds(i64::from(visibility));

        self.messages
            .iter_mut()
            .filter(|message| message.is_available(now))
            .take(max)
            .map(|message| message.deliver(now, hidden_until))
            .collect()
    }

    fn remove(&mut self, receipt_handle: &str) -> Option<StoredMessage> {
        let position = self
            .messages
            .iter()
            .position(|message| message.receipt_handle.as_deref() == Some(receipt_handle))?;
        self.messages.remove(position)
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    sent_at: DateTime<Utc>,
    first_received_at: Option<DateTime<Utc>>,
    receive_count: u32,
    /// Delay end or visibility timeout end, whichever applies
    available_at: DateTime<Utc>,
    /// Handle of the latest delivery; earlier handles are no longer accepted
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn new(body: String, delay_seconds: u32, now: DateTime<Utc>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body,
            sent_at: now,
            first_received_at: None,
            receive_count: 0,
            available_at: now + Duration::seconds(i64::from(delay_seconds)),
            receipt_handle: None,
        }
    }

    fn is_available(&self, now: DateTime<Utc>) -> bool {
        now >= self.available_at
    }

    fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        !self.is_available(now) && self.receipt_handle.is_some()
    }

    fn deliver(&mut self, now: DateTime<Utc>, hidden_until: DateTime<Utc>) -> RawMessage {
        let receipt_handle = uuid::Uuid::new_v4().to_string();
        self.receive_count += 1;
        self.first_received_at.get_or_insert(now);
        self.available_at = hidden_until;
        self.receipt_handle = Some(receipt_handle.clone());

        RawMessage {
            message_id: self.message_id.clone(),
            receipt_handle,
            body: self.body.clone(),
            attributes: Some(self.attributes()),
        }
    }

    fn attributes(&self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        attributes.insert(
            "ApproximateReceiveCount".to_string(),
            self.receive_count.to_string(),
        );
        attributes.insert(
            "SentTimestamp".to_string(),
            self.sent_at.timestamp_millis().to_string(),
        );
        if let Some(first) = self.first_received_at {
            attributes.insert(
                "ApproximateFirstReceiveTimestamp".to_string(),
                first.timestamp_millis().to_string(),
            );
        }
        attributes
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue transport implementation
///
/// Clones share the same queues.
#[derive(Clone)]
pub struct InMemoryTransport {
    storage: Arc<RwLock<QueueStorage>>,
    base_url: String,
}

impl InMemoryTransport {
    /// Create a transport with no queues
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a transport whose queue locators start with `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                queues: HashMap::new(),
            })),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a queue with the default visibility timeout and return its
    /// locator. Creating an existing queue returns the same locator.
    pub fn create_queue(&self, name: &str) -> String {
        self.create_queue_with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create a queue with its own default visibility timeout
    pub fn create_queue_with_visibility_timeout(&self, name: &str, seconds: u32) -> String {
        let queue_url = format!("{}/{}", self.base_url, name);
        self.storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .queues
            .entry(queue_url.clone())
            .or_insert_with(|| InMemoryQueue::new(seconds));

        debug!(queue_url = %queue_url, "Created in-memory queue");
        queue_url
    }

    /// Number of messages currently available for receiving
    pub fn approximate_number_of_messages(&self, queue_url: &str) -> Result<usize, TransportError> {
        let now = Utc::now();
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        let queue = storage.queue(queue_url)?;

        Ok(queue
            .messages
            .iter()
            .filter(|message| message.is_available(now))
            .count())
    }

    /// Number of messages received but neither deleted nor visible again
    pub fn approximate_number_of_messages_not_visible(
        &self,
        queue_url: &str,
    ) -> Result<usize, TransportError> {
        let now = Utc::now();
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);
        let queue = storage.queue(queue_url)?;

        Ok(queue
            .messages
            .iter()
            .filter(|message| message.is_in_flight(now))
            .count())
    }

    fn try_receive(&self, request: &ReceiveMessageRequest) -> Result<Vec<RawMessage>, TransportError> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let queue = storage.queue_mut(&request.queue_url)?;

        let max = request.max_messages.unwrap_or(1) as usize;
        let visibility = request
            .visibility_timeout
            .unwrap_or(queue.visibility_timeout);

        Ok(queue.deliver(max, visibility, Utc::now()))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queues = self
            .storage
            .read()
            .map(|storage| storage.queues.len())
            .unwrap_or_default();
        f.debug_struct("InMemoryTransport")
            .field("base_url", &self.base_url)
            .field("queues", &queues)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn send_message(
        &self,
        _client: &ClientParameters,
        request: SendMessageRequest,
    ) -> Result<SendMessageOutput, TransportError> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let queue = storage.queue_mut(&request.queue_url)?;

        let message = StoredMessage::new(
            request.message_body,
            request.delay_seconds.unwrap_or(0),
            Utc::now(),
        );
        let message_id = message.message_id.clone();
        queue.messages.push_back(message);

        Ok(SendMessageOutput { message_id })
    }

    async fn receive_messages(
        &self,
        _client: &ClientParameters,
        request: ReceiveMessageRequest,
    ) -> Result<Option<Vec<RawMessage>>, TransportError> {
        let wait = std::time::Duration::from_secs(u64::from(request.wait_time_seconds.unwrap_or(0)));
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let messages = self.try_receive(&request)?;
            if !messages.is_empty() {
                return Ok(Some(messages));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn delete_message(
        &self,
        _client: &ClientParameters,
        request: DeleteMessageRequest,
    ) -> Result<(), TransportError> {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        let queue = storage.queue_mut(&request.queue_url)?;

        match queue.remove(&request.receipt_handle) {
            Some(_) => Ok(()),
            None => Err(TransportError::InvalidReceipt {
                receipt_handle: request.receipt_handle,
            }),
        }
    }
}
