//! Tests for transport error classification.

use super::*;

#[test]
fn test_error_code_classification() {
    assert!(matches!(
        TransportError::from_code("AWS.SimpleQueueService.NonExistentQueue", "tasks"),
        TransportError::QueueNotFound { .. }
    ));
    assert!(matches!(
        TransportError::from_code("ReceiptHandleIsInvalid", "AQEB=="),
        TransportError::InvalidReceipt { .. }
    ));
    assert!(matches!(
        TransportError::from_code("SignatureDoesNotMatch", "bad signature"),
        TransportError::Authentication { .. }
    ));
    assert!(matches!(
        TransportError::from_code("ThrottlingException", "rate exceeded"),
        TransportError::Throttled { .. }
    ));
    assert!(matches!(
        TransportError::from_code("InvalidParameterValue", "DelaySeconds"),
        TransportError::InvalidRequest { .. }
    ));

    match TransportError::from_code("InternalError", "boom") {
        TransportError::Service { code, message } => {
            assert_eq!(code, "InternalError");
            assert_eq!(message, "boom");
        }
        other => panic!("Expected Service error, got: {:?}", other),
    }
}

#[test]
fn test_error_transience() {
    assert!(TransportError::Connection {
        message: "reset".to_string()
    }
    .is_transient());
    assert!(TransportError::Throttled {
        message: "slow down".to_string()
    }
    .is_transient());
    assert!(!TransportError::Authentication {
        message: "denied".to_string()
    }
    .is_transient());
    assert!(!TransportError::InvalidReceipt {
        receipt_handle: "stale".to_string()
    }
    .is_transient());
}
