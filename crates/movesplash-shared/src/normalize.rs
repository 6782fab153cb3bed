//! Schema-less record normalization.
//!
//! Persisted rows and realtime metadata are independently evolving JSON
//! objects. Both pass through [`normalize_message`] before anything else
//! touches them. Every field has a default; a malformed record degrades to
//! empty strings, zeros and `None`, never to an error.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::constants::DEFAULT_SNAP_TTL_SECS;
use crate::models::{Attachment, Conversation, Ephemeral, Message};
use crate::types::{ConversationId, MessageId, UserId};

/// Values used when a record lacks its own.
#[derive(Debug, Clone)]
pub struct RecordDefaults {
    pub conversation_id: ConversationId,
    pub id: Option<MessageId>,
    pub timestamp: DateTime<Utc>,
}

impl RecordDefaults {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            id: None,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

/// First non-null value under any of `keys`, looking at the top level and
/// then inside a nested `metadata` object.
fn lookup<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let top = record.as_object();
    let nested = record.get("metadata").and_then(Value::as_object);
    for obj in [top, nested].into_iter().flatten() {
        for key in keys {
            match obj.get(*key) {
                Some(Value::Null) | None => continue,
                Some(v) => return Some(v),
            }
        }
    }
    None
}

fn text(record: &Value, keys: &[&str]) -> String {
    match lookup(record, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn non_empty(record: &Value, keys: &[&str]) -> Option<String> {
    let value = text(record, keys);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn float(record: &Value, keys: &[&str]) -> f64 {
    let parsed = match lookup(record, keys) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

fn unsigned(record: &Value, keys: &[&str]) -> u64 {
    match lookup(record, keys) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

fn flag(record: &Value, keys: &[&str]) -> bool {
    match lookup(record, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map_or(false, |v| v != 0),
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
        _ => false,
    }
}

fn timestamp(record: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    match lookup(record, keys)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

fn attachment(record: &Value) -> Option<Attachment> {
    if let Some(src) = non_empty(record, &["image", "image_url", "imageUrl"]) {
        return Some(Attachment::Image { src });
    }

    let file_url = text(record, &["file_url", "fileUrl"]);
    let file_name = text(record, &["file_name", "fileName"]);
    if !file_url.is_empty() || !file_name.is_empty() {
        return Some(Attachment::File {
            name: file_name,
            url: file_url,
            mime_type: text(record, &["file_type", "fileType", "file_mime_type"]),
            size: unsigned(record, &["file_size", "fileSize"]),
        });
    }

    if let Some(url) = non_empty(record, &["voice_url", "voiceUrl"]) {
        return Some(Attachment::Voice {
            url,
            duration_secs: float(record, &["voice_duration", "voiceDuration"]),
            mime_type: text(record, &["voice_mime_type", "voiceMimeType"]),
        });
    }

    None
}

fn ephemeral(record: &Value) -> Option<Ephemeral> {
    if !flag(record, &["is_snap", "isSnap"]) {
        return None;
    }
    let ttl = unsigned(record, &["snap_duration", "snapDuration"]);
    Some(Ephemeral {
        ttl_secs: if ttl == 0 { DEFAULT_SNAP_TTL_SECS } else { ttl },
    })
}

/// Turn a persisted row or realtime payload into a canonical [`Message`].
///
/// Sender display fields are copied as found; directory lookups and avatar
/// placeholders are applied by the caller.
pub fn normalize_message(record: &Value, defaults: &RecordDefaults) -> Message {
    if !record.is_object() {
        debug!(kind = ?record, "Normalizing non-object message record");
    }

    let id = non_empty(record, &["id", "message_id", "messageId", "serial"])
        .map(MessageId)
        .or_else(|| defaults.id.clone())
        .unwrap_or_else(|| MessageId(format!("local-{}", uuid::Uuid::new_v4())));

    let conversation_id = non_empty(record, &["chat_id", "chatId", "conversation_id"])
        .map(ConversationId)
        .unwrap_or_else(|| defaults.conversation_id.clone());

    Message {
        id,
        conversation_id,
        sender_id: UserId(text(record, &["sender_id", "senderId", "client_id", "clientId"])),
        sender_name: text(record, &["sender_name", "senderName"]),
        sender_avatar: text(record, &["sender_avatar", "senderAvatar"]),
        content: non_empty(record, &["content", "text"]),
        attachment: attachment(record),
        timestamp: timestamp(record, &["created_at", "createdAt", "timestamp"])
            .unwrap_or(defaults.timestamp),
        ephemeral: ephemeral(record),
        starred: flag(record, &["starred", "is_starred", "isStarred"]),
    }
}

/// The snake_case record sent to `POST /messages`.
pub fn message_to_record(message: &Message) -> Value {
    let mut record = json!({
        "id": message.id.as_str(),
        "chat_id": message.conversation_id.as_str(),
        "sender_id": message.sender_id.as_str(),
        "sender_name": message.sender_name,
        "sender_avatar": message.sender_avatar,
        "content": message.content,
        "created_at": message.timestamp.to_rfc3339(),
        "is_snap": message.ephemeral.is_some(),
        "snap_duration": message.ephemeral.map(|e| e.ttl_secs),
        "starred": message.starred,
    });

    let extra: Map<String, Value> = match &message.attachment {
        Some(Attachment::Image { src }) => [("image".to_string(), json!(src))].into_iter().collect(),
        Some(Attachment::File {
            name,
            url,
            mime_type,
            size,
        }) => [
            ("file_name".to_string(), json!(name)),
            ("file_url".to_string(), json!(url)),
            ("file_type".to_string(), json!(mime_type)),
            ("file_size".to_string(), json!(size)),
        ]
        .into_iter()
        .collect(),
        Some(Attachment::Voice {
            url,
            duration_secs,
            mime_type,
        }) => [
            ("voice_url".to_string(), json!(url)),
            ("voice_duration".to_string(), json!(duration_secs)),
            ("voice_mime_type".to_string(), json!(mime_type)),
        ]
        .into_iter()
        .collect(),
        None => Map::new(),
    };

    if let Some(obj) = record.as_object_mut() {
        obj.extend(extra);
    }
    record
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

fn members(record: &Value) -> Vec<UserId> {
    let Some(Value::Array(items)) = lookup(record, &["members", "participants", "member_ids"])
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(UserId(s.clone())),
            Value::Object(_) => non_empty(item, &["id", "user_id", "userId"]).map(UserId),
            _ => None,
        })
        .collect()
}

/// Turn a persisted chat record into a [`Conversation`]. Records without an
/// id are unusable and yield `None`.
pub fn normalize_conversation(record: &Value) -> Option<Conversation> {
    let Some(id) = non_empty(record, &["id", "chat_id", "chatId"]) else {
        debug!("Skipping conversation record without id");
        return None;
    };

    let mut conversation = Conversation::new(
        ConversationId(id),
        text(record, &["name", "display_name", "displayName"]),
        members(record),
        flag(record, &["is_group", "isGroup"]),
    );
    conversation.avatar_url = non_empty(record, &["avatar", "avatar_url", "avatarUrl"]);
    conversation.last_message_preview = non_empty(record, &["last_message", "lastMessage"]);
    conversation.last_message_at = timestamp(record, &["last_message_at", "lastMessageAt"]);
    Some(conversation)
}
