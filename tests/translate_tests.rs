use mailpulse::push::{translate_message, Intent, MessagePayload, Notification, PushError};
use serde_json::json;

fn payload(value: serde_json::Value) -> MessagePayload {
    serde_json::from_value(value).unwrap()
}

/// Test a delivered message with the backend's wire field names
#[test]
fn test_new_message_wire_format() {
    let intents = translate_message(&payload(json!({
        "operation": "insert",
        "new_messages": "12",
        "mid": 170001,
        "hdr_status": "New",
        "hdr_from": "\"Support Team\" <support@example.com>",
        "hdr_subject": "Your ticket was updated",
        "firstline": "We have replied to your request"
    })))
    .unwrap();

    assert_eq!(
        intents,
        vec![
            Intent::LoadUnreadCount { count: Some(12) },
            Intent::ShowNotification(Notification {
                id: Some("170001".to_string()),
                from: "Support Team".to_string(),
                subject: "Your ticket was updated".to_string(),
                message: "We have replied to your request".to_string(),
            }),
        ]
    );
}

/// Test the documented example payload
#[test]
fn test_placeholder_subject_and_quoted_name() {
    let intents = translate_message(&payload(json!({
        "operation": "insert",
        "status": "New",
        "from": "\"Jane Doe\" <jane@example.com>",
        "subject": "No subject",
        "firstline": "hi",
        "unreadCount": "3"
    })))
    .unwrap();

    assert_eq!(intents[0], Intent::LoadUnreadCount { count: Some(3) });
    match &intents[1] {
        Intent::ShowNotification(notification) => {
            assert_eq!(notification.from, "Jane Doe");
            assert_eq!(notification.subject, "");
            assert_eq!(notification.message, "hi");
        }
        other => panic!("Expected notification, got {:?}", other),
    }
}

/// Test that non-delivery operations only refresh the count
#[test]
fn test_other_operations_refresh_count() {
    for operation in ["update", "delete", "move"] {
        let intents = translate_message(&payload(json!({
            "operation": operation,
            "hdr_status": "New",
            "hdr_from": "\"Jane\" <jane@example.com>",
            "new_messages": 3
        })))
        .unwrap();

        assert_eq!(intents, vec![Intent::LoadUnreadCount { count: None }]);
    }
}

/// Test that a new message without a usable sender fails loudly
#[test]
fn test_missing_or_unparseable_sender() {
    let missing = translate_message(&payload(json!({
        "operation": "insert",
        "hdr_status": "New",
        "new_messages": 1
    })));
    assert!(matches!(missing, Err(PushError::MalformedPayload(_))));

    let unparseable = translate_message(&payload(json!({
        "operation": "insert",
        "hdr_status": "New",
        "hdr_from": "jane@example.com",
        "new_messages": 1
    })));
    assert!(matches!(unparseable, Err(PushError::MalformedPayload(_))));
}
