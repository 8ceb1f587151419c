//! Error types for registry, record and transport operations.

use crate::transport::TransportError;
use thiserror::Error;

/// Caller-visible failures of registry and record operations
///
/// None of these are retried by the library. Transport failures are carried
/// through untouched in [`QueueError::Transport`] so callers can apply their
/// own retry policy based on [`TransportError::is_transient`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{model} is not registered to a queue")]
    NotRegistered { model: String },

    #[error("{model} is already registered to {queue_url}")]
    AlreadyRegistered { model: String, queue_url: String },

    #[error("{model} failed validation: {source}")]
    InvalidRecord {
        model: String,
        #[source]
        source: ValidationError,
    },

    #[error("{queue_url} is empty")]
    EmptyQueue { queue_url: String },

    #[error("Invalid message {message_id} in queue {queue_url}: {source}")]
    InvalidMessage {
        message_id: String,
        queue_url: String,
        #[source]
        source: InvalidMessageError,
    },

    #[error("Message not in queue: {reason}")]
    MessageNotInQueue { reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
            Self::NotRegistered { .. }
            | Self::AlreadyRegistered { .. }
            | Self::InvalidRecord { .. }
            | Self::EmptyQueue { .. }
            | Self::InvalidMessage { .. }
            | Self::MessageNotInQueue { .. }
            | Self::Configuration(_)
            | Self::Serialization(_) => false,
        }
    }

    /// Get the underlying decode failure for an invalid message
    pub fn invalid_message_reason(&self) -> Option<&InvalidMessageError> {
        match self {
            Self::InvalidMessage { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Reasons a received message could not be turned into a typed record
#[derive(Debug, Error)]
pub enum InvalidMessageError {
    #[error("body is not a valid envelope: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("delivery is missing transport fields: {0}")]
    Incomplete(#[source] ValidationError),

    #[error("no model registered for type '{model}'")]
    UnknownModel { model: String },

    #[error("payload does not match model '{model}': {source}")]
    Payload {
        model: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload failed validation for model '{model}': {source}")]
    Validation {
        model: String,
        #[source]
        source: ValidationError,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors raised by model constraints and identifier parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
