//! Request items addressing a message inside a conversation.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `{recipientId, messageId}` as sent by callers. Either field may arrive as
/// a JSON string or number, or be missing altogether.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub recipient_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub message_id: Option<String>,
}

impl MessageItem {
    pub fn new(recipient_id: &str, message_id: i32) -> Self {
        Self {
            recipient_id: Some(recipient_id.to_string()),
            message_id: Some(message_id.to_string()),
        }
    }

    /// Conversation ID, if present and non-empty
    pub fn recipient(&self) -> Option<&str> {
        self.recipient_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Message ID, if present, numeric and non-zero
    pub fn message(&self) -> Option<i32> {
        self.message_id
            .as_deref()
            .and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|id| *id != 0)
    }
}

/// Accept a string or a number; anything else counts as absent.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
