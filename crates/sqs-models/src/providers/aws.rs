//! AWS SQS transport built on the AWS SDK.
//!
//! ## Clients
//!
//! One SDK client is built per distinct [`ClientParameters`] and cached, so
//! registries that share a transport but target different regions or
//! endpoints each get a matching client while registries with identical
//! parameters share one.
//!
//! ## Endpoints
//!
//! - An explicit `endpoint_url` (for example a local emulator) wins
//! - Otherwise `use_ssl = false` selects `http://sqs.{region}.amazonaws.com`
//! - Otherwise the SDK's default HTTPS endpoint for the region is used
//!
//! ## Authentication
//!
//! Credentials come from the standard AWS provider chain (environment,
//! profile, instance or task role) loaded by [`AwsSqsTransport::from_env`].
//!
//! ## Example
//!
//! ```no_run
//! use sqs_models::{AwsSqsTransport, QueueRegistry, QueueSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(AwsSqsTransport::from_env().await);
//! let settings = QueueSettings::new("https://sqs.us-east-1.amazonaws.com/123456789012/tasks");
//! let registry = QueueRegistry::new(settings, transport)?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientParameters;
use crate::transport::{
    DeleteMessageRequest, QueueTransport, RawMessage, ReceiveMessageRequest, SendMessageOutput,
    SendMessageRequest, TransportError,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};
use aws_sdk_sqs::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

/// AWS SQS transport
#[derive(Clone)]
pub struct AwsSqsTransport {
    shared_config: SdkConfig,
    clients: Arc<RwLock<HashMap<ClientParameters, Client>>>,
}

impl AwsSqsTransport {
    /// Create a transport from the ambient AWS configuration
    pub async fn from_env() -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::from_sdk_config(shared_config)
    }

    /// Create a transport from an already loaded AWS configuration
    pub fn from_sdk_config(shared_config: SdkConfig) -> Self {
        Self {
            shared_config,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the cached client for a parameter set, building it on first use
    async fn client(&self, params: &ClientParameters) -> Client {
        // Check cache first
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(params) {
                return client.clone();
            }
        }

        let mut clients = self.clients.write().await;
        clients
            .entry(params.clone())
            .or_insert_with(|| {
                debug!(
                    region = %params.region,
                    endpoint = ?resolve_endpoint(params),
                    "Creating SQS client"
                );
                Client::from_conf(sqs_config(&self.shared_config, params))
            })
            .clone()
    }
}

impl fmt::Debug for AwsSqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsTransport")
            .field("region", &self.shared_config.region())
            .field("clients", &"<cached>")
            .finish()
    }
}

#[async_trait]
impl QueueTransport for AwsSqsTransport {
    async fn send_message(
        &self,
        client: &ClientParameters,
        request: SendMessageRequest,
    ) -> Result<SendMessageOutput, TransportError> {
        let output = self
            .client(client)
            .await
            .send_message()
            .queue_url(&request.queue_url)
            .message_body(request.message_body)
            .set_delay_seconds(request.delay_seconds.map(to_sdk_int))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &request.queue_url))?;

        Ok(SendMessageOutput {
            message_id: output.message_id().unwrap_or_default().to_string(),
        })
    }

    async fn receive_messages(
        &self,
        client: &ClientParameters,
        request: ReceiveMessageRequest,
    ) -> Result<Option<Vec<RawMessage>>, TransportError> {
        let output = self
            .client(client)
            .await
            .receive_message()
            .queue_url(&request.queue_url)
            .set_max_number_of_messages(request.max_messages.map(to_sdk_int))
            .set_visibility_timeout(request.visibility_timeout.map(to_sdk_int))
            .set_wait_time_seconds(request.wait_time_seconds.map(to_sdk_int))
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &request.queue_url))?;

        Ok(output
            .messages
            .map(|messages| messages.into_iter().map(raw_message).collect()))
    }

    async fn delete_message(
        &self,
        client: &ClientParameters,
        request: DeleteMessageRequest,
    ) -> Result<(), TransportError> {
        self.client(client)
            .await
            .delete_message()
            .queue_url(&request.queue_url)
            .receipt_handle(&request.receipt_handle)
            .send()
            .await
            .map_err(|e| match map_sdk_error(e, &request.queue_url) {
                TransportError::InvalidReceipt { .. } => TransportError::InvalidReceipt {
                    receipt_handle: request.receipt_handle.clone(),
                },
                other => other,
            })?;

        Ok(())
    }
}

// ============================================================================
// SDK Adapters
// ============================================================================

/// Endpoint override implied by the client parameters, if any
pub(crate) fn resolve_endpoint(params: &ClientParameters) -> Option<String> {
    match &params.endpoint_url {
        Some(endpoint) => Some(endpoint.clone()),
        None if !params.use_ssl => Some(format!("http://sqs.{}.amazonaws.com", params.region)),
        None => None,
    }
}

/// SQS client configuration for one parameter set
pub(crate) fn sqs_config(shared: &SdkConfig, params: &ClientParameters) -> aws_sdk_sqs::Config {
    let mut builder =
        aws_sdk_sqs::config::Builder::from(shared).region(Region::new(params.region.clone()));
    if let Some(endpoint) = resolve_endpoint(params) {
        builder = builder.endpoint_url(endpoint);
    }
    builder.build()
}

fn to_sdk_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn raw_message(message: Message) -> RawMessage {
    let attributes = message.attributes.map(|attributes| {
        attributes
            .into_iter()
            .map(|(name, value)| (name.as_str().to_string(), value))
            .collect()
    });

    RawMessage {
        message_id: message.message_id.unwrap_or_default(),
        receipt_handle: message.receipt_handle.unwrap_or_default(),
        body: message.body.unwrap_or_default(),
        attributes,
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>, queue_url: &str) -> TransportError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => TransportError::Connection {
            message: DisplayErrorContext(&err).to_string(),
        },
        SdkError::ServiceError(_) => classify(err.code(), err.message(), queue_url),
        _ => TransportError::Service {
            code: "SdkError".to_string(),
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

/// Classify a service error, naming the queue on a missing-queue error
pub(crate) fn classify(code: Option<&str>, message: Option<&str>, queue_url: &str) -> TransportError {
    match TransportError::from_code(code.unwrap_or("Unknown"), message.unwrap_or_default()) {
        TransportError::QueueNotFound { .. } => TransportError::QueueNotFound {
            queue_url: queue_url.to_string(),
        },
        other => other,
    }
}
