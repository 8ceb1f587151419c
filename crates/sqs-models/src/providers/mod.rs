//! Queue transport implementations.
//!
//! This module contains concrete implementations of the `QueueTransport`
//! trait: the AWS SQS transport for production use and an in-memory
//! transport for tests and local development.

pub mod aws;
pub mod memory;

pub use aws::AwsSqsTransport;
pub use memory::InMemoryTransport;
