//! Transport seam: the raw queue operations a registry delegates to.
//!
//! A transport plays the role of a shared session. It is created once by the
//! application, shared by every registry through an `Arc`, and receives the
//! registry's [`ClientParameters`] on each call so one transport can serve
//! registries configured for different regions or endpoints.

use crate::config::ClientParameters;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

// ============================================================================
// Requests and Responses
// ============================================================================

/// Parameters of a single send call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub queue_url: String,
    pub message_body: String,
    /// Already clamped into the transport's accepted range
    pub delay_seconds: Option<u32>,
}

/// Result of a successful send call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageOutput {
    pub message_id: String,
}

/// Parameters of a single receive call
///
/// `None` fields are omitted from the transport call so the queue's own
/// defaults apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveMessageRequest {
    pub queue_url: String,
    pub max_messages: Option<u32>,
    pub visibility_timeout: Option<u32>,
    pub wait_time_seconds: Option<u32>,
}

/// Parameters of a single delete call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMessageRequest {
    pub queue_url: String,
    pub receipt_handle: String,
}

/// A message as delivered by the transport, before demultiplexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: Option<HashMap<String, String>>,
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Raw queue operations against a managed message-queue service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Send one message
    async fn send_message(
        &self,
        client: &ClientParameters,
        request: SendMessageRequest,
    ) -> Result<SendMessageOutput, TransportError>;

    /// Receive a batch of messages.
    ///
    /// Returns `Ok(None)` when the queue had nothing to deliver.
    async fn receive_messages(
        &self,
        client: &ClientParameters,
        request: ReceiveMessageRequest,
    ) -> Result<Option<Vec<RawMessage>>, TransportError>;

    /// Delete one message by the receipt handle of its latest delivery
    async fn delete_message(
        &self,
        client: &ClientParameters,
        request: DeleteMessageRequest,
    ) -> Result<(), TransportError>;
}

// ============================================================================
// Error Types
// ============================================================================

/// Failures reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Queue not found: {queue_url}")]
    QueueNotFound { queue_url: String },

    #[error("Invalid receipt handle: {receipt_handle}")]
    InvalidReceipt { receipt_handle: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Request throttled: {message}")]
    Throttled { message: String },

    #[error("Invalid request: {code} - {message}")]
    InvalidRequest { code: String, message: String },

    #[error("Service error: {code} - {message}")]
    Service { code: String, message: String },
}

impl TransportError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::InvalidReceipt { .. } => false,
            Self::Connection { .. } => true,
            Self::Authentication { .. } => false,
            Self::Throttled { .. } => true,
            Self::InvalidRequest { .. } => false,
            Self::Service { .. } => true,
        }
    }

    /// Classify a service error code reported by the queue
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
                Self::QueueNotFound { queue_url: message }
            }
            "ReceiptHandleIsInvalid" | "InvalidReceiptHandle" => Self::InvalidReceipt {
                receipt_handle: message,
            },
            "InvalidClientTokenId"
            | "UnrecognizedClientException"
            | "SignatureDoesNotMatch"
            | "AccessDenied"
            | "AccessDeniedException" => Self::Authentication {
                message: format!("{}: {}", code, message),
            },
            "Throttling" | "ThrottlingException" | "RequestThrottled" | "KmsThrottled" => {
                Self::Throttled { message }
            }
            "InvalidParameterValue"
            | "InvalidParameterValueException"
            | "InvalidMessageContents"
            | "MissingParameter"
            | "UnsupportedOperation" => Self::InvalidRequest {
                code: code.to_string(),
                message,
            },
            _ => Self::Service {
                code: code.to_string(),
                message,
            },
        }
    }
}
