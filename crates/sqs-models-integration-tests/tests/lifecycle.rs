//! Integration tests for record lifecycle and registration rules
//!
//! These tests verify:
//! - Deletion guards on records
//! - Registration exclusivity
//! - Redelivery after a visibility timeout
//! - Unbinding when a registry is dropped

mod common;

use common::TestQueue;
use serde::{Deserialize, Serialize};
use sqs_models::{QueueError, ReceiveOptions, Record, TransportError};

/// Verify a received record can be deleted exactly once
#[tokio::test]
async fn test_delete_guards() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Job {
        id: u32,
    }
    sqs_models::impl_queue_model!(Job);

    let queue = TestQueue::new();
    queue.registry.register::<Job>().unwrap();

    let mut unsent = Record::new(Job { id: 0 });
    let result = unsent.delete_from_queue().await;
    assert!(matches!(result, Err(QueueError::MessageNotInQueue { .. })));

    let mut sent = Record::new(Job { id: 1 });
    sent.to_queue(None).await.unwrap();
    let result = sent.delete_from_queue().await;
    assert!(
        matches!(result, Err(QueueError::MessageNotInQueue { .. })),
        "a sent record has no receipt handle"
    );

    let mut received = Record::<Job>::from_queue(ReceiveOptions::for_model())
        .await
        .unwrap();
    let record = &mut received[0];

    record.delete_from_queue().await.unwrap();
    assert!(record.is_deleted());
    assert_eq!(queue.visible_messages(), 0);
    assert_eq!(queue.in_flight_messages(), 0);

    let again = record.delete_from_queue().await;
    assert!(matches!(again, Err(QueueError::MessageNotInQueue { .. })));
}

/// Verify records in a mixed batch can be deleted without downcasting
#[tokio::test]
async fn test_delete_through_received_record() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }
    sqs_models::impl_queue_model!(Ping);

    let queue = TestQueue::new();
    queue.registry.register::<Ping>().unwrap();
    Record::new(Ping { seq: 1 }).to_queue(None).await.unwrap();

    let mut records = queue.registry.receive(ReceiveOptions::new()).await.unwrap();
    records[0].delete_from_queue().await.unwrap();

    assert!(records[0].is_deleted());
    assert!(records[0].downcast_ref::<Ping>().unwrap().is_deleted());
    assert_eq!(queue.in_flight_messages(), 0);
}

/// Verify a type can only be registered once while its registry lives
#[tokio::test]
async fn test_registration_exclusivity() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Exclusive {
        foo: String,
    }
    sqs_models::impl_queue_model!(Exclusive);

    let first = TestQueue::new();
    let second = TestQueue::new();
    first.registry.register::<Exclusive>().unwrap();

    let again = first.registry.register::<Exclusive>();
    assert!(matches!(again, Err(QueueError::AlreadyRegistered { .. })));

    let elsewhere = second.registry.register::<Exclusive>();
    assert!(matches!(elsewhere, Err(QueueError::AlreadyRegistered { .. })));

    // The original mapping still routes sends to the first queue
    Record::new(Exclusive {
        foo: "bar".to_string(),
    })
    .to_queue(None)
    .await
    .unwrap();
    assert_eq!(first.visible_messages(), 1);
    assert_eq!(second.visible_messages(), 0);
    assert_eq!(first.registry.models(), vec!["exclusive".to_string()]);
    assert!(second.registry.models().is_empty());
}

/// Verify an undeleted message comes back with a new receipt handle
#[tokio::test]
async fn test_redelivery_after_visibility_timeout() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Retried {
        attempt: u32,
    }
    sqs_models::impl_queue_model!(Retried);

    let queue = TestQueue::new();
    queue.registry.register::<Retried>().unwrap();
    Record::new(Retried { attempt: 1 }).to_queue(None).await.unwrap();

    let options = ReceiveOptions::for_model().with_visibility_timeout(0);
    let mut first = Record::<Retried>::from_queue(options.clone()).await.unwrap();
    let mut second = Record::<Retried>::from_queue(options).await.unwrap();

    assert_eq!(first[0].message_id(), second[0].message_id());
    assert_ne!(first[0].receipt_handle(), second[0].receipt_handle());
    assert_eq!(
        second[0]
            .attributes()
            .unwrap()
            .get("ApproximateReceiveCount")
            .map(String::as_str),
        Some("2")
    );

    // Only the latest receipt handle is accepted
    let stale = first[0].delete_from_queue().await;
    assert!(matches!(
        stale,
        Err(QueueError::Transport(TransportError::InvalidReceipt { .. }))
    ));
    assert!(!first[0].is_deleted());

    second[0].delete_from_queue().await.unwrap();
    assert_eq!(queue.visible_messages(), 0);
}

/// Verify a received record can be sent again as a new message
#[tokio::test]
async fn test_resend_received_record() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Forwarded {
        hops: u32,
    }
    sqs_models::impl_queue_model!(Forwarded);

    let queue = TestQueue::new();
    queue.registry.register::<Forwarded>().unwrap();
    Record::new(Forwarded { hops: 0 }).to_queue(None).await.unwrap();

    let mut received = Record::<Forwarded>::from_queue(ReceiveOptions::for_model())
        .await
        .unwrap();
    let record = &mut received[0];
    let original_id = record.message_id().cloned().unwrap();

    record.hops += 1;
    record.to_queue(None).await.unwrap();
    assert_ne!(record.message_id(), Some(&original_id));
    record.delete_from_queue().await.unwrap();

    let forwarded = Record::<Forwarded>::from_queue(ReceiveOptions::for_model())
        .await
        .unwrap();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].hops, 1);
}

/// Verify dropping the registry leaves its types unregistered
#[tokio::test]
async fn test_dropped_registry_unbinds_types() {
    #[derive(Debug, Serialize, Deserialize)]
    struct Orphan {
        foo: String,
    }
    sqs_models::impl_queue_model!(Orphan);

    let queue = TestQueue::new();
    queue.registry.register::<Orphan>().unwrap();
    drop(queue);

    let mut record = Record::new(Orphan {
        foo: "bar".to_string(),
    });
    let result = record.to_queue(None).await;
    assert!(matches!(result, Err(QueueError::NotRegistered { .. })));

    // The type is free to join a new registry
    let replacement = TestQueue::new();
    replacement.registry.register::<Orphan>().unwrap();
    record.to_queue(None).await.unwrap();
    assert_eq!(replacement.visible_messages(), 1);
}
