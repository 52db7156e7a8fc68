use crate::push::{PushError, PushResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Event tag sent by the transport when the server asks for a fresh connection
pub const RECONNECT: &str = "RECONNECT";
/// Event tag sent by the transport for mailbox changes
pub const NEW_MESSAGE: &str = "NEW_MESSAGE";

/// Short-lived connection credentials issued by the backend
///
/// Opaque to the manager: obtained once per connect attempt and handed
/// straight to the transport.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub uid: Option<String>,
    /// Any additional fields the backend includes
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Credentials {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
            uid: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_uid<S: Into<String>>(mut self, uid: S) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("uid", &self.uid)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Sign-in state change observed from the host application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSignal {
    pub authorized: bool,
}

impl AuthorizationSignal {
    pub fn authorized() -> Self {
        Self { authorized: true }
    }

    pub fn unauthorized() -> Self {
        Self { authorized: false }
    }
}

/// Mailbox change pushed by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Mailbox operation, `insert` for a delivered message
    #[serde(default)]
    pub operation: String,
    /// Unread message count after the operation, number or decimal string
    #[serde(
        rename = "new_messages",
        alias = "unreadCount",
        default,
        deserialize_with = "string_or_number"
    )]
    pub unread_count: Option<String>,
    #[serde(
        rename = "mid",
        alias = "messageId",
        default,
        deserialize_with = "string_or_number"
    )]
    pub message_id: Option<String>,
    #[serde(rename = "hdr_status", alias = "status", default)]
    pub status: Option<String>,
    #[serde(rename = "hdr_from", alias = "from", default)]
    pub from: Option<String>,
    #[serde(rename = "hdr_subject", alias = "subject", default)]
    pub subject: Option<String>,
    #[serde(rename = "firstline", alias = "preview", default)]
    pub preview: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }),
    )
}

/// Event delivered by the transport's inbound callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Connection lost or server requested a reconnect
    Reconnect,
    /// Mailbox change
    NewMessage(MessagePayload),
    /// Tag this client does not know; ignored
    Other(String),
}

impl InboundEvent {
    /// Decode the `(event type, data)` pair a transport callback receives
    pub fn from_parts(tag: &str, data: Option<serde_json::Value>) -> PushResult<Self> {
        match tag {
            RECONNECT => Ok(InboundEvent::Reconnect),
            NEW_MESSAGE => {
                let data = data.ok_or_else(|| {
                    PushError::malformed("NEW_MESSAGE event without payload")
                })?;
                let payload = serde_json::from_value(data).map_err(|e| {
                    PushError::malformed(format!("NEW_MESSAGE payload: {}", e))
                })?;
                Ok(InboundEvent::NewMessage(payload))
            }
            other => Ok(InboundEvent::Other(other.to_string())),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            InboundEvent::Reconnect => RECONNECT,
            InboundEvent::NewMessage(_) => NEW_MESSAGE,
            InboundEvent::Other(tag) => tag,
        }
    }
}

/// New-mail notification to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<String>,
    pub from: String,
    pub subject: String,
    pub message: String,
}

/// State change the manager asks the application store to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Intent {
    Login,
    Logout,
    /// `None` asks the store to re-fetch the authoritative count
    LoadUnreadCount { count: Option<u32> },
    ShowNotification(Notification),
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Connection manager statistics
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    pub state: ConnectionState,
    pub attempt_count: u32,
    pub idle_reconnect_pending: bool,
    pub retry_pending: bool,
    pub reconnect_pending: bool,
    pub successful_connects: u64,
    pub failed_connects: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_wire_names() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "operation": "insert",
            "new_messages": 7,
            "mid": "1234",
            "hdr_status": "New",
            "hdr_from": "\"Jane Doe\" <jane@example.com>",
            "hdr_subject": "Hello",
            "firstline": "hi there"
        }))
        .unwrap();

        assert_eq!(payload.unread_count.as_deref(), Some("7"));
        assert_eq!(payload.message_id.as_deref(), Some("1234"));
        assert_eq!(payload.status.as_deref(), Some("New"));
        assert_eq!(payload.preview.as_deref(), Some("hi there"));
    }

    #[test]
    fn test_payload_descriptive_aliases() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "operation": "update",
            "unreadCount": "3",
            "messageId": 99
        }))
        .unwrap();

        assert_eq!(payload.operation, "update");
        assert_eq!(payload.unread_count.as_deref(), Some("3"));
        assert_eq!(payload.message_id.as_deref(), Some("99"));
        assert!(payload.from.is_none());
    }

    #[test]
    fn test_unknown_tag_is_other() {
        let event = InboundEvent::from_parts("TYPING", None).unwrap();
        assert_eq!(event, InboundEvent::Other("TYPING".to_string()));
        assert_eq!(event.tag(), "TYPING");
    }

    #[test]
    fn test_new_message_requires_payload() {
        let result = InboundEvent::from_parts(NEW_MESSAGE, None);
        assert!(matches!(result, Err(PushError::MalformedPayload(_))));
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = Credentials::new("secret-token").with_uid("42");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("42"));
    }

    #[test]
    fn test_intent_serialization() {
        let intent = Intent::LoadUnreadCount { count: Some(3) };
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value, json!({"type": "LoadUnreadCount", "count": 3}));
    }
}
