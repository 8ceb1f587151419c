//! Message identifiers and the wire envelope placed in every message body.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Transport-issued identifier of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create message ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Opaque token issued on receive and required to delete the message
///
/// Distinct from [`MessageId`]: the same message gets a new receipt handle on
/// every delivery, and only the latest one is guaranteed to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create receipt handle with validation
    pub fn new(handle: impl Into<String>) -> Result<Self, ValidationError> {
        let handle = handle.into();
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }

        Ok(Self(handle))
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReceiptHandle {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Wire Envelope
// ============================================================================

/// Body of every message sent through a registry
///
/// ```json
/// { "model": "<discriminator>", "message": { <payload fields> } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator the payload decodes under
    pub model: String,
    /// Payload fields that were explicitly set
    pub message: serde_json::Value,
}

impl Envelope {
    /// Build an envelope from a payload.
    ///
    /// Top-level fields that serialize to `null` are treated as unset and
    /// left out of the body, so the receiver falls back to its own defaults.
    pub fn new<T: Serialize>(model: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
        let mut message = serde_json::to_value(payload)?;
        if let serde_json::Value::Object(fields) = &mut message {
            fields.retain(|_, value| !value.is_null());
        }

        Ok(Self {
            model: model.into(),
            message,
        })
    }

    /// Serialize to the message body string
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a message body
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
