//! Tests for model records and the type-erased receive result.

use super::*;
use crate::config::QueueSettings;
use crate::transport::{MockQueueTransport, SendMessageOutput};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Constrained {
    value: i64,
}

impl QueueModel for Constrained {
    fn binding() -> &'static ModelBinding {
        static BINDING: ModelBinding = ModelBinding::new();
        &BINDING
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.value <= 3 {
            return Err(ValidationError::OutOfRange {
                field: "value".to_string(),
                message: "must be greater than 3".to_string(),
            });
        }
        Ok(())
    }
}

fn delivery(id: &str) -> Delivery {
    Delivery {
        message_id: MessageId::new(id).unwrap(),
        receipt_handle: ReceiptHandle::new(format!("receipt-{}", id)).unwrap(),
        attributes: Some(HashMap::from([(
            "ApproximateReceiveCount".to_string(),
            "1".to_string(),
        )])),
    }
}

fn registry_with(transport: MockQueueTransport) -> QueueRegistry {
    QueueRegistry::new(QueueSettings::new("http://localhost/queue"), Arc::new(transport)).unwrap()
}

// ============================================================================
// Naming Tests
// ============================================================================

mod naming {
    use super::*;

    #[test]
    fn test_short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name("crate::tasks::AsyncTask"), "AsyncTask");
        assert_eq!(short_type_name("Envelope<alloc::string::String>"), "Envelope");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_default_discriminator_is_lowercased_type_name() {
        #[derive(Debug, Serialize, Deserialize)]
        struct ThisModel {
            foo: String,
        }
        crate::impl_queue_model!(ThisModel);

        assert_eq!(ThisModel::type_name(), "ThisModel");
        assert_eq!(ThisModel::default_discriminator(), "thismodel");
    }
}

// ============================================================================
// Record Lifecycle Tests
// ============================================================================

mod lifecycle {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Unbound {
        foo: String,
    }
    crate::impl_queue_model!(Unbound);

    fn unbound() -> Record<Unbound> {
        Record::new(Unbound {
            foo: "bar".to_string(),
        })
    }

    #[test]
    fn test_new_record_has_no_lifecycle_fields() {
        let record = unbound();

        assert_eq!(record.foo, "bar");
        assert!(record.message_id().is_none());
        assert!(record.receipt_handle().is_none());
        assert!(record.attributes().is_none());
        assert!(!record.is_deleted());
    }

    #[test]
    fn test_try_new_applies_model_constraints() {
        assert!(Record::try_new(Constrained { value: 4 }).is_ok());

        let result = Record::try_new(Constrained { value: 3 });
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_unregistered_type_fails_every_operation() {
        assert!(!Unbound::binding().is_bound());
        assert!(matches!(
            Record::<Unbound>::registry(),
            Err(QueueError::NotRegistered { model }) if model == "Unbound"
        ));

        let mut record = unbound();
        let sent = tokio_test::block_on(record.to_queue(None));
        assert!(matches!(sent, Err(QueueError::NotRegistered { .. })));
        assert!(record.message_id().is_none());

        let received = tokio_test::block_on(Record::<Unbound>::from_queue(
            ReceiveOptions::for_model(),
        ));
        assert!(matches!(received, Err(QueueError::NotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_delete_of_unreceived_record_reports_message_not_in_queue() {
        // Lifecycle state is checked before the binding
        let mut record = unbound();
        let result = record.delete_from_queue().await;

        assert!(matches!(result, Err(QueueError::MessageNotInQueue { .. })));
    }

    #[tokio::test]
    async fn test_to_queue_stores_issued_message_id() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Sent {
            foo: String,
        }
        crate::impl_queue_model!(Sent);

        let mut transport = MockQueueTransport::new();
        transport.expect_send_message().times(2).returning(|_, _| {
            Ok(SendMessageOutput {
                message_id: uuid::Uuid::new_v4().to_string(),
            })
        });
        let registry = registry_with(transport);
        registry.register::<Sent>().unwrap();

        let mut record = Record::new(Sent {
            foo: "bar".to_string(),
        });
        record.to_queue(None).await.unwrap();
        let first = record.message_id().cloned().unwrap();

        // Re-sending creates a new message and replaces the id
        record.to_queue(Some(5)).await.unwrap();
        let second = record.message_id().cloned().unwrap();
        assert_ne!(first, second);
        assert!(record.receipt_handle().is_none());
    }

    #[tokio::test]
    async fn test_from_queue_tolerates_empty_queue_unless_told_otherwise() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Polled {
            foo: String,
        }
        crate::impl_queue_model!(Polled);

        let mut transport = MockQueueTransport::new();
        transport
            .expect_receive_messages()
            .times(3)
            .returning(|_, _| Ok(None));
        let registry = registry_with(transport);
        registry.register::<Polled>().unwrap();

        for options in [ReceiveOptions::new(), ReceiveOptions::default()] {
            let records = Record::<Polled>::from_queue(options).await.unwrap();
            assert!(records.is_empty());
        }

        let result =
            Record::<Polled>::from_queue(ReceiveOptions::new().ignore_empty(false)).await;
        assert!(matches!(result, Err(QueueError::EmptyQueue { .. })));
    }

    #[test]
    fn test_dropping_registry_unbinds_type() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Transient {
            foo: String,
        }
        crate::impl_queue_model!(Transient);

        let registry = registry_with(MockQueueTransport::new());
        registry.register::<Transient>().unwrap();
        assert!(Transient::binding().is_bound());
        assert!(Record::<Transient>::registry().is_ok());

        drop(registry);

        assert!(!Transient::binding().is_bound());
        assert!(matches!(
            Record::<Transient>::registry(),
            Err(QueueError::NotRegistered { .. })
        ));
    }
}

// ============================================================================
// Decoding Tests
// ============================================================================

mod decoding {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other {
        name: String,
    }
    crate::impl_queue_model!(Other);

    #[test]
    fn test_decode_attaches_delivery_fields() {
        let received =
            decode_record::<Constrained>("constrained", json!({"value": 7}), delivery("m-1"))
                .unwrap();

        assert_eq!(received.discriminator(), "constrained");
        assert_eq!(received.message_id().unwrap().as_str(), "m-1");
        assert_eq!(received.receipt_handle().unwrap().as_str(), "receipt-m-1");
        assert_eq!(
            received.attributes().unwrap().get("ApproximateReceiveCount"),
            Some(&"1".to_string())
        );
        assert!(!received.is_deleted());
    }

    #[test]
    fn test_decode_rejects_payload_of_wrong_shape() {
        let result =
            decode_record::<Constrained>("constrained", json!({"value": "high"}), delivery("m-2"));

        assert!(matches!(
            result,
            Err(InvalidMessageError::Payload { model, .. }) if model == "constrained"
        ));
    }

    #[test]
    fn test_decode_applies_model_constraints() {
        let result =
            decode_record::<Constrained>("constrained", json!({"value": 2}), delivery("m-3"));

        assert!(matches!(result, Err(InvalidMessageError::Validation { .. })));
    }

    #[test]
    fn test_downcast_to_matching_type() {
        let mut received =
            decode_record::<Other>("other", json!({"name": "n"}), delivery("m-4")).unwrap();

        assert!(received.is::<Other>());
        assert!(!received.is::<Constrained>());
        assert!(received.downcast_ref::<Constrained>().is_none());

        received.downcast_mut::<Other>().unwrap().name = "renamed".to_string();
        assert_eq!(received.downcast_ref::<Other>().unwrap().name, "renamed");

        let record = received.downcast::<Other>().unwrap();
        assert_eq!(record.message_id().unwrap().as_str(), "m-4");
        assert_eq!(
            record.into_model(),
            Other {
                name: "renamed".to_string()
            }
        );
    }

    #[test]
    fn test_downcast_to_other_type_fails() {
        let received =
            decode_record::<Other>("other", json!({"name": "n"}), delivery("m-5")).unwrap();

        assert!(received.downcast::<Constrained>().is_none());
    }
}
