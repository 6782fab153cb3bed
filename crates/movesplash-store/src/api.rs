//! Persistence contract and JSON envelope helpers.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use movesplash_shared::{ConversationId, MessageId, UserId};

use crate::error::Result;

/// Body of `POST /chats`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    /// Local fallback id the client is already using.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ConversationId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub members: Vec<UserId>,
    pub is_group: bool,
}

/// Remote persistence for chats and messages.
///
/// Reads return raw records; callers run them through the normalizer.
/// Appends are upserts keyed by message id, so repeating one is harmless.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    async fn create_chat(&self, chat: &NewChat) -> Result<Value>;

    async fn list_chats(&self, user_id: &UserId) -> Result<Vec<Value>>;

    async fn list_messages(&self, chat_id: &ConversationId) -> Result<Vec<Value>>;

    async fn append_message(&self, record: &Value) -> Result<()>;

    async fn delete_message(&self, chat_id: &ConversationId, message_id: &MessageId) -> Result<()>;

    async fn star_message(
        &self,
        chat_id: &ConversationId,
        message_id: &MessageId,
        starred: bool,
    ) -> Result<()>;
}

/// Pull a list out of a response envelope.
///
/// Accepts `{"<key>": [...]}`, `{"data": [...]}` or a bare array. Anything
/// else is an empty list.
pub fn envelope_list(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove(key).or_else(|| obj.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Pull a single record out of a response envelope.
///
/// Accepts `{"<key>": {...}}`, `{"data": {...}}` or the bare object.
pub fn envelope_item(body: Value, key: &str) -> Value {
    match body {
        Value::Object(mut obj) => match obj.remove(key).or_else(|| obj.remove("data")) {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) | None => Value::Object(obj),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_envelope_shapes() {
        assert_eq!(envelope_list(json!({"messages": [1, 2]}), "messages").len(), 2);
        assert_eq!(envelope_list(json!({"data": [1]}), "messages").len(), 1);
        assert_eq!(envelope_list(json!([1, 2, 3]), "messages").len(), 3);
        assert!(envelope_list(json!({"messages": "nope"}), "messages").is_empty());
        assert!(envelope_list(json!(null), "messages").is_empty());
    }

    #[test]
    fn item_envelope_shapes() {
        assert_eq!(envelope_item(json!({"chat": {"id": "c"}}), "chat"), json!({"id": "c"}));
        assert_eq!(envelope_item(json!({"id": "c"}), "chat"), json!({"id": "c"}));
        assert_eq!(envelope_item(json!({"data": {"id": "d"}}), "chat"), json!({"id": "d"}));
    }

    #[test]
    fn new_chat_serializes_camel_case() {
        let chat = NewChat {
            id: None,
            name: "Crew".into(),
            avatar: None,
            members: vec!["u1".into(), "u2".into()],
            is_group: false,
        };
        assert_eq!(
            serde_json::to_value(&chat).unwrap(),
            json!({"name": "Crew", "members": ["u1", "u2"], "isGroup": false})
        );
    }
}
