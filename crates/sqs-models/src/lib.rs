//! # SQS Models
//!
//! Typed records over a single AWS SQS queue. Application types are
//! registered with a [`QueueRegistry`]; records of those types can then be
//! sent, received and deleted without handling message bodies by hand.
//!
//! This library provides:
//! - Model registration under a string discriminator
//! - A JSON envelope (`{"model": ..., "message": ...}`) in every message body
//! - Demultiplexing of mixed-model batches into typed records
//! - Validation of received payloads before they reach the caller
//! - A pluggable transport with AWS SQS and in-memory implementations
//!
//! ## Module Organization
//!
//! - [`config`] - Registry settings, limits and configuration loading
//! - [`error`] - Error types for all registry and record operations
//! - [`message`] - Message identifiers and the wire envelope
//! - [`model`] - The model capability, typed records and receive results
//! - [`registry`] - Registration, sending and demultiplexing
//! - [`transport`] - The transport seam
//! - [`providers`] - Transport implementations
//!
//! ## Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use sqs_models::{QueueRegistry, QueueSettings, ReceiveOptions, Record};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct AsyncTask {
//!     uuid: String,
//!     message: String,
//! }
//!
//! sqs_models::impl_queue_model!(AsyncTask);
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = QueueSettings::new("https://sqs.us-east-1.amazonaws.com/123456789012/tasks");
//! let registry = QueueRegistry::connect(settings).await?;
//! registry.register::<AsyncTask>()?;
//!
//! let mut task = Record::new(AsyncTask {
//!     uuid: "1".to_string(),
//!     message: "hello".to_string(),
//! });
//! task.to_queue(None).await?;
//!
//! for mut task in Record::<AsyncTask>::from_queue(ReceiveOptions::for_model()).await? {
//!     println!("{}", task.message);
//!     task.delete_from_queue().await?;
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod message;
pub mod model;
pub mod providers;
pub mod registry;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use config::{ClientParameters, QueueSettings};
pub use error::{ConfigurationError, InvalidMessageError, QueueError, ValidationError};
pub use message::{Envelope, MessageId, ReceiptHandle};
pub use model::{ModelBinding, QueueModel, ReceivedRecord, Record};
pub use providers::{AwsSqsTransport, InMemoryTransport};
pub use registry::{QueueRegistry, ReceiveOptions};
pub use transport::{
    DeleteMessageRequest, QueueTransport, RawMessage, ReceiveMessageRequest, SendMessageOutput,
    SendMessageRequest, TransportError,
};
