//! The queue registry: model registration, enveloping and demultiplexing.
//!
//! A [`QueueRegistry`] owns the discriminator → model mapping for one queue
//! and performs every transport call. Sending wraps a record's payload in an
//! [`Envelope`]; receiving fetches one batch and decodes each message under
//! the model its envelope names, in the order the transport delivered them.
//!
//! Registration is expected to happen once per model type at startup,
//! before records are sent or received concurrently.

use crate::config::{
    ClientParameters, QueueSettings, DELAY_SECONDS_LIMIT, MAX_MESSAGES_LIMIT,
    VISIBILITY_TIMEOUT_LIMIT, WAIT_TIME_SECONDS_LIMIT,
};
use crate::error::{InvalidMessageError, QueueError};
use crate::message::{Envelope, MessageId, ReceiptHandle};
use crate::model::{decode_record, Binding, Delivery, QueueModel, ReceivedRecord, Record};
use crate::providers::AwsSqsTransport;
use crate::transport::{
    DeleteMessageRequest, QueueTransport, RawMessage, ReceiveMessageRequest, SendMessageRequest,
    TransportError,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// ============================================================================
// Receive Options
// ============================================================================

/// Call-time overrides and error policy for a receive call
///
/// Unset numeric values fall back to the registry's configured defaults and
/// are omitted from the transport call if those are unset too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to return (1-10)
    pub max_messages: Option<u32>,
    /// Seconds received messages stay hidden from other receivers
    pub visibility_timeout: Option<u32>,
    /// Seconds to long-poll for a message, capped at 20
    pub wait_time_seconds: Option<u32>,
    /// Return an empty batch instead of failing with `EmptyQueue`. Unset
    /// means no for [`QueueRegistry::receive`] and yes for
    /// [`Record::from_queue`].
    pub ignore_empty: Option<bool>,
    /// Skip messages that do not decode instead of failing the call
    pub ignore_unknown: bool,
}

impl ReceiveOptions {
    /// Registry-level defaults: empty queues and unknown messages are errors
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-scoped defaults used with [`Record::from_queue`]: an empty
    /// queue yields an empty batch
    pub fn for_model() -> Self {
        Self {
            ignore_empty: Some(true),
            ignore_unknown: true,
            ..Self::default()
        }
    }

    /// Set maximum number of messages to receive
    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = Some(max);
        self
    }

    /// Set visibility timeout
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    /// Set long-poll wait
    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    /// Set empty-queue policy
    pub fn ignore_empty(mut self, ignore: bool) -> Self {
        self.ignore_empty = Some(ignore);
        self
    }

    /// Set undecodable-message policy
    pub fn ignore_unknown(mut self, ignore: bool) -> Self {
        self.ignore_unknown = ignore;
        self
    }
}

// ============================================================================
// Registry
// ============================================================================

type DecodeFn =
    fn(&str, serde_json::Value, Delivery) -> Result<ReceivedRecord, InvalidMessageError>;

/// How to decode one registered model type
#[derive(Clone, Copy)]
struct ModelDescriptor {
    type_name: &'static str,
    decode: DecodeFn,
}

impl ModelDescriptor {
    fn of<T: QueueModel>() -> Self {
        Self {
            type_name: T::type_name(),
            decode: decode_record::<T>,
        }
    }
}

pub(crate) struct RegistryShared {
    settings: QueueSettings,
    transport: Arc<dyn QueueTransport>,
    models: RwLock<HashMap<String, ModelDescriptor>>,
}

/// Typed front end for a single queue
///
/// Cloning is cheap and yields a handle to the same registry. Model types
/// hold only a weak reference, so dropping every handle unbinds them.
#[derive(Clone)]
pub struct QueueRegistry {
    shared: Arc<RegistryShared>,
}

impl QueueRegistry {
    /// Create a registry over a shared transport
    pub fn new(
        settings: QueueSettings,
        transport: Arc<dyn QueueTransport>,
    ) -> Result<Self, QueueError> {
        settings.validate()?;

        Ok(Self {
            shared: Arc::new(RegistryShared {
                settings,
                transport,
                models: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Create a registry over an AWS SQS transport configured from the
    /// ambient AWS environment (credentials, profile)
    pub async fn connect(settings: QueueSettings) -> Result<Self, QueueError> {
        let transport = AwsSqsTransport::from_env().await;
        Self::new(settings, Arc::new(transport))
    }

    pub(crate) fn from_shared(shared: Arc<RegistryShared>) -> Self {
        Self { shared }
    }

    /// Get configured settings
    pub fn settings(&self) -> &QueueSettings {
        &self.shared.settings
    }

    /// Get queue locator
    pub fn queue_url(&self) -> &str {
        &self.shared.settings.queue_url
    }

    /// Get the shared transport
    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.shared.transport
    }

    /// Connection parameters passed to every transport call
    pub fn client_parameters(&self) -> ClientParameters {
        self.shared.settings.client_parameters()
    }

    /// Check if two handles refer to the same registry
    pub fn same_registry(&self, other: &QueueRegistry) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a model type under its lowercased type name
    pub fn register<T: QueueModel>(&self) -> Result<(), QueueError> {
        self.register_as::<T>(T::default_discriminator())
    }

    /// Register a model type under an explicit discriminator.
    ///
    /// Fails with `AlreadyRegistered`, leaving every mapping untouched, if
    /// the type is bound to any live registry (this one included) or if the
    /// discriminator is already taken here.
    pub fn register_as<T: QueueModel>(
        &self,
        discriminator: impl Into<String>,
    ) -> Result<(), QueueError> {
        let discriminator = discriminator.into();
        let mut binding = T::binding().lock();

        if let Some(bound) = binding.as_ref().and_then(|b| b.registry.upgrade()) {
            return Err(QueueError::AlreadyRegistered {
                model: T::type_name().to_string(),
                queue_url: bound.settings.queue_url.clone(),
            });
        }

        let mut models = self
            .shared
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if models.contains_key(&discriminator) {
            return Err(QueueError::AlreadyRegistered {
                model: discriminator,
                queue_url: self.queue_url().to_string(),
            });
        }

        models.insert(discriminator.clone(), ModelDescriptor::of::<T>());
        *binding = Some(Binding {
            registry: Arc::downgrade(&self.shared),
            discriminator: discriminator.clone(),
        });

        info!(
            queue_url = %self.queue_url(),
            model = T::type_name(),
            discriminator = %discriminator,
            "Registered model"
        );
        Ok(())
    }

    /// Check if a model type is bound to this registry
    pub fn is_registered<T: QueueModel>(&self) -> bool {
        T::binding()
            .current()
            .is_some_and(|(registry, _)| registry.same_registry(self))
    }

    /// Registered discriminators, sorted
    pub fn models(&self) -> Vec<String> {
        let models = self
            .shared
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();
        names
    }

    fn discriminator_for<T: QueueModel>(&self) -> Result<String, QueueError> {
        match T::binding().current() {
            Some((registry, discriminator)) if registry.same_registry(self) => Ok(discriminator),
            _ => Err(QueueError::NotRegistered {
                model: T::type_name().to_string(),
            }),
        }
    }

    fn descriptor(&self, discriminator: &str) -> Option<ModelDescriptor> {
        self.shared
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(discriminator)
            .copied()
    }

    // ------------------------------------------------------------------------
    // Transport Operations
    // ------------------------------------------------------------------------

    /// Validate and envelope a record, then send it, storing the issued
    /// message id on the record. `delay_seconds` is clamped into 0..=900.
    ///
    /// A payload failing [`QueueModel::validate`] is rejected with
    /// `InvalidRecord` before the transport is called.
    #[instrument(skip(self, record), fields(queue_url = %self.queue_url(), model = T::type_name()))]
    pub async fn send<T: QueueModel>(
        &self,
        record: &mut Record<T>,
        delay_seconds: Option<i64>,
    ) -> Result<MessageId, QueueError> {
        let discriminator = self.discriminator_for::<T>()?;
        record
            .model()
            .validate()
            .map_err(|source| QueueError::InvalidRecord {
                model: T::type_name().to_string(),
                source,
            })?;
        let message_body = Envelope::new(discriminator, record.model())?.encode()?;

        let request = SendMessageRequest {
            queue_url: self.queue_url().to_string(),
            message_body,
            delay_seconds: delay_seconds.map(clamp_delay_seconds),
        };

        let output = self
            .shared
            .transport
            .send_message(&self.client_parameters(), request)
            .await?;

        let message_id =
            MessageId::new(output.message_id).map_err(|e| TransportError::Service {
                code: "MissingMessageId".to_string(),
                message: e.to_string(),
            })?;

        debug!(message_id = %message_id, "Sent record");
        record.set_message_id(message_id.clone());
        Ok(message_id)
    }

    /// Resolve receive parameters: call-time override, then registry
    /// default, then omitted. Values are clamped into the transport's
    /// accepted ranges.
    pub fn receive_request(&self, options: &ReceiveOptions) -> ReceiveMessageRequest {
        let settings = &self.shared.settings;

        ReceiveMessageRequest {
            queue_url: settings.queue_url.clone(),
            max_messages: options
                .max_messages
                .or(settings.max_messages)
                .map(|max| max.clamp(1, MAX_MESSAGES_LIMIT)),
            visibility_timeout: options
                .visibility_timeout
                .or(settings.visibility_timeout)
                .map(|seconds| seconds.min(VISIBILITY_TIMEOUT_LIMIT)),
            wait_time_seconds: options
                .wait_time_seconds
                .or(settings.wait_time_seconds)
                .map(|seconds| seconds.min(WAIT_TIME_SECONDS_LIMIT)),
        }
    }

    /// Fetch one batch and decode every message into its registered model.
    ///
    /// Records come back in transport order. An empty batch fails with
    /// `EmptyQueue` unless `ignore_empty` is set to true. A message that cannot be
    /// decoded fails the whole call with `InvalidMessage`, discarding the
    /// records decoded so far, unless `ignore_unknown` is set, in which
    /// case it is skipped (and left to reappear after its visibility
    /// timeout) and decoding continues with the rest of the batch.
    #[instrument(skip(self, options), fields(queue_url = %self.queue_url()))]
    pub async fn receive(&self, options: ReceiveOptions) -> Result<Vec<ReceivedRecord>, QueueError> {
        let request = self.receive_request(&options);
        let messages = self
            .shared
            .transport
            .receive_messages(&self.client_parameters(), request)
            .await?
            .unwrap_or_default();

        if messages.is_empty() {
            if options.ignore_empty.unwrap_or(false) {
                debug!("Queue is empty");
                return Ok(Vec::new());
            }
            return Err(QueueError::EmptyQueue {
                queue_url: self.queue_url().to_string(),
            });
        }

        let fetched = messages.len();
        let mut records = Vec::with_capacity(fetched);
        for raw in messages {
            let message_id = raw.message_id.clone();
            match self.demultiplex(raw) {
                Ok(record) => records.push(record),
                Err(err) if options.ignore_unknown => {
                    warn!(
                        message_id = %message_id,
                        error = %err,
                        "Skipping message that does not decode to a registered model"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        debug!(fetched, decoded = records.len(), "Received records");
        Ok(records)
    }

    /// Delete a message by receipt handle
    #[instrument(skip(self, receipt_handle), fields(queue_url = %self.queue_url()))]
    pub async fn delete(&self, receipt_handle: &ReceiptHandle) -> Result<(), QueueError> {
        let request = DeleteMessageRequest {
            queue_url: self.queue_url().to_string(),
            receipt_handle: receipt_handle.as_str().to_string(),
        };

        self.shared
            .transport
            .delete_message(&self.client_parameters(), request)
            .await?;

        debug!("Deleted message");
        Ok(())
    }

    /// Decode one raw message into the model its envelope names
    fn demultiplex(&self, raw: RawMessage) -> Result<ReceivedRecord, QueueError> {
        let RawMessage {
            message_id,
            receipt_handle,
            body,
            attributes,
        } = raw;

        let invalid = |source: InvalidMessageError| QueueError::InvalidMessage {
            message_id: message_id.clone(),
            queue_url: self.queue_url().to_string(),
            source,
        };

        let envelope =
            Envelope::decode(&body).map_err(|e| invalid(InvalidMessageError::MalformedBody(e)))?;

        let descriptor = self.descriptor(&envelope.model).ok_or_else(|| {
            invalid(InvalidMessageError::UnknownModel {
                model: envelope.model.clone(),
            })
        })?;

        let delivery = Delivery {
            message_id: MessageId::new(message_id.clone())
                .map_err(|e| invalid(InvalidMessageError::Incomplete(e)))?,
            receipt_handle: ReceiptHandle::new(receipt_handle)
                .map_err(|e| invalid(InvalidMessageError::Incomplete(e)))?,
            attributes,
        };

        let record = (descriptor.decode)(&envelope.model, envelope.message, delivery)
            .map_err(invalid)?;

        debug!(
            message_id = %message_id,
            model = descriptor.type_name,
            "Decoded message"
        );
        Ok(record)
    }
}

impl fmt::Debug for QueueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueRegistry")
            .field("settings", &self.shared.settings)
            .field("models", &self.models())
            .finish()
    }
}

fn clamp_delay_seconds(delay_seconds: i64) -> u32 {
    // Both bounds fit in u32 after the clamp
    delay_seconds.clamp(0, i64::from(DELAY_SECONDS_LIMIT)) as u32
}
