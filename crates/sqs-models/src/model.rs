//! Typed records and the capability every queued model type provides.
//!
//! A model type implements [`QueueModel`] (usually through
//! [`impl_queue_model!`](crate::impl_queue_model)) and is registered with a
//! [`QueueRegistry`]. Instances are wrapped in a [`Record`], which carries the
//! queue lifecycle fields next to the payload and routes I/O to the registry
//! the type is bound to.
//!
//! ## Lifecycle
//!
//! ```text
//! Record::new ──to_queue──▶ sent (message id)
//!                              │
//!        registry.receive / Record::from_queue (another caller)
//!                              ▼
//!                 received (message id, receipt handle, attributes)
//!                              │ delete_from_queue
//!                              ▼
//!                          deleted (terminal)
//! ```

use crate::error::{InvalidMessageError, QueueError, ValidationError};
use crate::message::{MessageId, ReceiptHandle};
use crate::registry::{QueueRegistry, ReceiveOptions, RegistryShared};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard, Weak};

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;

// ============================================================================
// Model Capability
// ============================================================================

/// A validated payload type that can travel through a queue
///
/// Serialization decides what goes on the wire: fields serializing to `null`
/// are treated as unset and omitted from the envelope. Deserialization plus
/// [`QueueModel::validate`] together form the validation step applied to
/// every received payload.
pub trait QueueModel: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// The slot holding this type's registry binding
    fn binding() -> &'static ModelBinding;

    /// Short type name, without module path or generic arguments
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Discriminator used when registering without an explicit one
    fn default_discriminator() -> String {
        Self::type_name().to_lowercase()
    }

    /// Field constraints beyond what deserialization enforces
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Implement [`QueueModel`] for a concrete type with its own binding slot.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct AsyncTask {
///     uuid: String,
///     message: String,
/// }
///
/// sqs_models::impl_queue_model!(AsyncTask);
/// ```
#[macro_export]
macro_rules! impl_queue_model {
    ($model:ty) => {
        impl $crate::QueueModel for $model {
            fn binding() -> &'static $crate::ModelBinding {
                static BINDING: $crate::ModelBinding = $crate::ModelBinding::new();
                &BINDING
            }
        }
    };
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Per-type reference to the registry a model type is bound to
///
/// The reference is weak: a dropped registry leaves the type unbound.
pub struct ModelBinding {
    slot: RwLock<Option<Binding>>,
}

pub(crate) struct Binding {
    pub(crate) registry: Weak<RegistryShared>,
    pub(crate) discriminator: String,
}

impl ModelBinding {
    /// Create an unbound slot
    pub const fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Check if the type is currently bound to a live registry
    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }

    /// Bound registry and the discriminator the type was registered under
    pub(crate) fn current(&self) -> Option<(QueueRegistry, String)> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        let binding = slot.as_ref()?;
        let shared = binding.registry.upgrade()?;
        Some((
            QueueRegistry::from_shared(shared),
            binding.discriminator.clone(),
        ))
    }

    pub(crate) fn lock(&self) -> RwLockWriteGuard<'_, Option<Binding>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ModelBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let discriminator = self.current().map(|(_, discriminator)| discriminator);
        f.debug_struct("ModelBinding")
            .field("discriminator", &discriminator)
            .finish()
    }
}

// ============================================================================
// Record
// ============================================================================

/// Transport-supplied fields attached to a record on receive
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) message_id: MessageId,
    pub(crate) receipt_handle: ReceiptHandle,
    pub(crate) attributes: Option<HashMap<String, String>>,
}

/// A model instance together with its queue lifecycle state
#[derive(Debug, Clone)]
pub struct Record<T> {
    model: T,
    message_id: Option<MessageId>,
    receipt_handle: Option<ReceiptHandle>,
    attributes: Option<HashMap<String, String>>,
    deleted: bool,
}

impl<T: QueueModel> Record<T> {
    /// Wrap a model that has not been sent or received
    pub fn new(model: T) -> Self {
        Self {
            model,
            message_id: None,
            receipt_handle: None,
            attributes: None,
            deleted: false,
        }
    }

    /// Wrap a model after checking its constraints
    pub fn try_new(model: T) -> Result<Self, ValidationError> {
        model.validate()?;
        Ok(Self::new(model))
    }

    pub(crate) fn received(model: T, delivery: Delivery) -> Self {
        Self {
            model,
            message_id: Some(delivery.message_id),
            receipt_handle: Some(delivery.receipt_handle),
            attributes: delivery.attributes,
            deleted: false,
        }
    }

    /// Get the payload
    pub fn model(&self) -> &T {
        &self.model
    }

    /// Get the payload mutably
    pub fn model_mut(&mut self) -> &mut T {
        &mut self.model
    }

    /// Discard lifecycle state and keep the payload
    pub fn into_model(self) -> T {
        self.model
    }

    /// Identifier from the latest successful send or the receive
    pub fn message_id(&self) -> Option<&MessageId> {
        self.message_id.as_ref()
    }

    /// Receipt handle, present only on received records
    pub fn receipt_handle(&self) -> Option<&ReceiptHandle> {
        self.receipt_handle.as_ref()
    }

    /// Transport-supplied attributes, present only on received records
    pub fn attributes(&self) -> Option<&HashMap<String, String>> {
        self.attributes.as_ref()
    }

    /// Check if the message was deleted through this record
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn set_message_id(&mut self, message_id: MessageId) {
        self.message_id = Some(message_id);
    }

    /// Registry this record's type is bound to
    pub fn registry() -> Result<QueueRegistry, QueueError> {
        T::binding()
            .current()
            .map(|(registry, _)| registry)
            .ok_or_else(|| QueueError::NotRegistered {
                model: T::type_name().to_string(),
            })
    }

    /// Send this record through its registry.
    ///
    /// `delay_seconds` is clamped into 0..=900. Any record may be sent,
    /// including one that was already sent or received; each send creates a
    /// new message and replaces the stored message id.
    pub async fn to_queue(&mut self, delay_seconds: Option<i64>) -> Result<(), QueueError> {
        let registry = Self::registry()?;
        registry.send(self, delay_seconds).await?;
        Ok(())
    }

    /// Receive records of this type only.
    ///
    /// Messages of other registered types and undecodable messages are left
    /// on the queue; `ignore_unknown` is always enabled. An empty queue
    /// yields an empty batch unless `ignore_empty` was explicitly set to
    /// false, in which case it fails with `EmptyQueue`.
    pub async fn from_queue(options: ReceiveOptions) -> Result<Vec<Self>, QueueError> {
        let registry = Self::registry()?;
        let options = ReceiveOptions {
            ignore_empty: Some(options.ignore_empty.unwrap_or(true)),
            ..options
        };
        let records = registry.receive(options.ignore_unknown(true)).await?;

        Ok(records
            .into_iter()
            .filter_map(ReceivedRecord::downcast::<T>)
            .collect())
    }

    /// Delete the received message from the queue and mark this record deleted
    pub async fn delete_from_queue(&mut self) -> Result<(), QueueError> {
        let receipt_handle = match (&self.receipt_handle, self.deleted) {
            (None, _) => {
                return Err(QueueError::MessageNotInQueue {
                    reason: format!(
                        "{} has no receipt handle so it was not received from a queue",
                        self.describe()
                    ),
                })
            }
            (Some(_), true) => {
                return Err(QueueError::MessageNotInQueue {
                    reason: format!("{} has already been deleted", self.describe()),
                })
            }
            (Some(handle), false) => handle.clone(),
        };

        let registry = Self::registry()?;
        registry.delete(&receipt_handle).await?;
        self.deleted = true;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.message_id {
            Some(message_id) => format!("{} message {}", T::type_name(), message_id),
            None => T::type_name().to_string(),
        }
    }
}

impl<T: QueueModel> From<T> for Record<T> {
    fn from(model: T) -> Self {
        Self::new(model)
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.model
    }
}

impl<T> DerefMut for Record<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.model
    }
}

// ============================================================================
// Type-Erased Records
// ============================================================================

#[async_trait]
trait ErasedRecord: fmt::Debug + Send + Sync {
    fn message_id(&self) -> Option<&MessageId>;
    fn receipt_handle(&self) -> Option<&ReceiptHandle>;
    fn attributes(&self) -> Option<&HashMap<String, String>>;
    fn is_deleted(&self) -> bool;
    async fn delete_from_queue(&mut self) -> Result<(), QueueError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

#[async_trait]
impl<T: QueueModel> ErasedRecord for Record<T> {
    fn message_id(&self) -> Option<&MessageId> {
        Record::message_id(self)
    }

    fn receipt_handle(&self) -> Option<&ReceiptHandle> {
        Record::receipt_handle(self)
    }

    fn attributes(&self) -> Option<&HashMap<String, String>> {
        Record::attributes(self)
    }

    fn is_deleted(&self) -> bool {
        Record::is_deleted(self)
    }

    async fn delete_from_queue(&mut self) -> Result<(), QueueError> {
        Record::delete_from_queue(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// One element of a receive batch, of any registered model type
pub struct ReceivedRecord {
    discriminator: String,
    record: Box<dyn ErasedRecord>,
}

impl ReceivedRecord {
    pub(crate) fn new<T: QueueModel>(discriminator: impl Into<String>, record: Record<T>) -> Self {
        Self {
            discriminator: discriminator.into(),
            record: Box::new(record),
        }
    }

    /// Discriminator the message was decoded under
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Check if this is a record of model type `T`
    pub fn is<T: QueueModel>(&self) -> bool {
        self.record.as_any().is::<Record<T>>()
    }

    /// Borrow as a record of `T`
    pub fn downcast_ref<T: QueueModel>(&self) -> Option<&Record<T>> {
        self.record.as_any().downcast_ref::<Record<T>>()
    }

    /// Mutably borrow as a record of `T`
    pub fn downcast_mut<T: QueueModel>(&mut self) -> Option<&mut Record<T>> {
        self.record.as_any_mut().downcast_mut::<Record<T>>()
    }

    /// Convert into a record of `T`; `None` if it holds another type
    pub fn downcast<T: QueueModel>(self) -> Option<Record<T>> {
        self.record
            .into_any()
            .downcast::<Record<T>>()
            .ok()
            .map(|record| *record)
    }

    pub fn message_id(&self) -> Option<&MessageId> {
        self.record.message_id()
    }

    pub fn receipt_handle(&self) -> Option<&ReceiptHandle> {
        self.record.receipt_handle()
    }

    pub fn attributes(&self) -> Option<&HashMap<String, String>> {
        self.record.attributes()
    }

    pub fn is_deleted(&self) -> bool {
        self.record.is_deleted()
    }

    /// Delete the message through the registry of the record's own type
    pub async fn delete_from_queue(&mut self) -> Result<(), QueueError> {
        self.record.delete_from_queue().await
    }
}

impl fmt::Debug for ReceivedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedRecord")
            .field("discriminator", &self.discriminator)
            .field("record", &self.record)
            .finish()
    }
}

/// Decode one payload as model `T`, attaching the delivery fields
pub(crate) fn decode_record<T: QueueModel>(
    discriminator: &str,
    payload: serde_json::Value,
    delivery: Delivery,
) -> Result<ReceivedRecord, InvalidMessageError> {
    let model: T =
        serde_json::from_value(payload).map_err(|source| InvalidMessageError::Payload {
            model: discriminator.to_string(),
            source,
        })?;

    model
        .validate()
        .map_err(|source| InvalidMessageError::Validation {
            model: discriminator.to_string(),
            source,
        })?;

    Ok(ReceivedRecord::new(
        discriminator,
        Record::received(model, delivery),
    ))
}
