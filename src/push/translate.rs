//! Translation of server mailbox events into store intents

use crate::push::{Intent, MessagePayload, Notification, PushError, PushResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Subject the backend substitutes for messages without one
const PLACEHOLDER_SUBJECT: &str = "No subject";

/// Turn a mailbox change into the intents the store should apply
///
/// A freshly delivered message (`insert` with status `New`) yields the new
/// unread count and a notification. Anything else only asks the store to
/// re-fetch the unread count.
pub fn translate_message(payload: &MessagePayload) -> PushResult<Vec<Intent>> {
    if !is_new_delivery(payload) {
        return Ok(vec![Intent::LoadUnreadCount { count: None }]);
    }

    let from = payload
        .from
        .as_deref()
        .ok_or_else(|| PushError::malformed("new message without sender"))?;
    let from = resolve_sender(from)?;

    let count = parse_unread_count(payload.unread_count.as_deref())?;

    let subject = match payload.subject.as_deref() {
        None | Some(PLACEHOLDER_SUBJECT) => String::new(),
        Some(subject) => subject.to_string(),
    };

    Ok(vec![
        Intent::LoadUnreadCount { count: Some(count) },
        Intent::ShowNotification(Notification {
            id: payload.message_id.clone(),
            from,
            subject,
            message: payload.preview.clone().unwrap_or_default(),
        }),
    ])
}

fn is_new_delivery(payload: &MessagePayload) -> bool {
    payload.operation == "insert" && payload.status.as_deref() == Some("New")
}

/// Display name for a `From` header: the quoted name, else the bracketed address
pub fn resolve_sender(from: &str) -> PushResult<String> {
    static NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"(.+)""#).unwrap());
    static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+)>$").unwrap());

    let from = from.trim();

    NAME_REGEX
        .captures(from)
        .or_else(|| EMAIL_REGEX.captures(from))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PushError::malformed(format!("unrecognised sender {:?}", from)))
}

fn parse_unread_count(raw: Option<&str>) -> PushResult<u32> {
    let raw = raw.ok_or_else(|| PushError::malformed("new message without unread count"))?;
    raw.trim()
        .parse()
        .map_err(|_| PushError::malformed(format!("invalid unread count {:?}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_delivery(from: &str) -> MessagePayload {
        MessagePayload {
            operation: "insert".to_string(),
            unread_count: Some("3".to_string()),
            message_id: Some("m1".to_string()),
            status: Some("New".to_string()),
            from: Some(from.to_string()),
            subject: Some("No subject".to_string()),
            preview: Some("hi".to_string()),
        }
    }

    #[test]
    fn test_quoted_name_preferred() {
        assert_eq!(
            resolve_sender("\"Jane Doe\" <jane@example.com>").unwrap(),
            "Jane Doe"
        );
    }

    #[test]
    fn test_email_fallback() {
        assert_eq!(
            resolve_sender("<jane@example.com>").unwrap(),
            "jane@example.com"
        );
        assert_eq!(
            resolve_sender("Jane <jane@example.com>").unwrap(),
            "jane@example.com"
        );
    }

    #[test]
    fn test_unmatched_sender_is_error() {
        let result = resolve_sender("jane@example.com");
        assert!(matches!(result, Err(PushError::MalformedPayload(_))));
    }

    #[test]
    fn test_placeholder_subject_blanked() {
        let intents = translate_message(&new_delivery("\"Jane Doe\" <jane@example.com>")).unwrap();
        assert_eq!(
            intents,
            vec![
                Intent::LoadUnreadCount { count: Some(3) },
                Intent::ShowNotification(Notification {
                    id: Some("m1".to_string()),
                    from: "Jane Doe".to_string(),
                    subject: String::new(),
                    message: "hi".to_string(),
                }),
            ]
        );
    }

    #[test]
    fn test_real_subject_kept() {
        let mut payload = new_delivery("<bob@example.com>");
        payload.subject = Some("Quarterly report".to_string());

        let intents = translate_message(&payload).unwrap();
        match &intents[1] {
            Intent::ShowNotification(notification) => {
                assert_eq!(notification.subject, "Quarterly report");
                assert_eq!(notification.from, "bob@example.com");
            }
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_seen_insert_only_refreshes_count() {
        let mut payload = new_delivery("\"Jane\" <jane@example.com>");
        payload.status = Some("Seen".to_string());

        let intents = translate_message(&payload).unwrap();
        assert_eq!(intents, vec![Intent::LoadUnreadCount { count: None }]);
    }

    #[test]
    fn test_bad_unread_count_is_error() {
        let mut payload = new_delivery("\"Jane\" <jane@example.com>");
        payload.unread_count = Some("many".to_string());
        assert!(translate_message(&payload).is_err());
    }
}
