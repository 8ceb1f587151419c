//! Common test utilities for sqs-models integration tests
//!
//! This module provides:
//! - A recording transport wrapping the in-memory transport
//! - A per-test queue fixture with its own registry
//! - Helpers for placing raw bodies on a queue
//!
//! Model bindings are per-type and global to the test binary, so every test
//! declares its own model types.

use async_trait::async_trait;
use sqs_models::{
    ClientParameters, DeleteMessageRequest, InMemoryTransport, QueueRegistry, QueueSettings,
    QueueTransport, RawMessage, ReceiveMessageRequest, SendMessageOutput, SendMessageRequest,
    TransportError,
};
use std::sync::{Arc, Mutex};

// ============================================================================
// Recording Transport
// ============================================================================

/// In-memory transport that remembers every request it was given
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingTransport {
    inner: InMemoryTransport,
    sends: Arc<Mutex<Vec<SendMessageRequest>>>,
    receives: Arc<Mutex<Vec<ReceiveMessageRequest>>>,
}

impl RecordingTransport {
    #[allow(dead_code)]
    pub fn inner(&self) -> &InMemoryTransport {
        &self.inner
    }

    #[allow(dead_code)]
    pub fn sends(&self) -> Vec<SendMessageRequest> {
        self.sends.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn receives(&self) -> Vec<ReceiveMessageRequest> {
        self.receives.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueTransport for RecordingTransport {
    async fn send_message(
        &self,
        client: &ClientParameters,
        request: SendMessageRequest,
    ) -> Result<SendMessageOutput, TransportError> {
        self.sends.lock().unwrap().push(request.clone());
        self.inner.send_message(client, request).await
    }

    async fn receive_messages(
        &self,
        client: &ClientParameters,
        request: ReceiveMessageRequest,
    ) -> Result<Option<Vec<RawMessage>>, TransportError> {
        self.receives.lock().unwrap().push(request.clone());
        self.inner.receive_messages(client, request).await
    }

    async fn delete_message(
        &self,
        client: &ClientParameters,
        request: DeleteMessageRequest,
    ) -> Result<(), TransportError> {
        self.inner.delete_message(client, request).await
    }
}

// ============================================================================
// Queue Fixture
// ============================================================================

/// A fresh queue with a registry over it
#[allow(dead_code)]
pub struct TestQueue {
    pub transport: RecordingTransport,
    pub registry: QueueRegistry,
    pub queue_url: String,
}

impl TestQueue {
    /// Create a queue with default settings
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_settings(|settings| settings)
    }

    /// Create a queue, adjusting the registry settings first
    #[allow(dead_code)]
    pub fn with_settings(adjust: impl FnOnce(QueueSettings) -> QueueSettings) -> Self {
        let transport = RecordingTransport::default();
        let queue_url = transport
            .inner()
            .create_queue(&format!("test-{}", uuid::Uuid::new_v4()));

        let settings = adjust(QueueSettings::new(queue_url.clone()));
        let registry = QueueRegistry::new(settings, Arc::new(transport.clone()))
            .expect("test settings should be valid");

        Self {
            transport,
            registry,
            queue_url,
        }
    }

    /// Place a raw body on the queue, bypassing the registry
    #[allow(dead_code)]
    pub async fn send_raw(&self, body: impl Into<String>) -> String {
        let request = SendMessageRequest {
            queue_url: self.queue_url.clone(),
            message_body: body.into(),
            delay_seconds: None,
        };

        self.transport
            .inner()
            .send_message(&self.registry.client_parameters(), request)
            .await
            .expect("raw send should succeed")
            .message_id
    }

    /// Place a well-formed envelope on the queue, bypassing the registry
    #[allow(dead_code)]
    pub async fn send_envelope(&self, model: &str, message: serde_json::Value) -> String {
        let body = serde_json::json!({ "model": model, "message": message });
        self.send_raw(body.to_string()).await
    }

    #[allow(dead_code)]
    pub fn visible_messages(&self) -> usize {
        self.transport
            .inner()
            .approximate_number_of_messages(&self.queue_url)
            .unwrap()
    }

    #[allow(dead_code)]
    pub fn in_flight_messages(&self) -> usize {
        self.transport
            .inner()
            .approximate_number_of_messages_not_visible(&self.queue_url)
            .unwrap()
    }
}
