//! Conversion between wire payloads and canonical [`Message`]s.

use serde_json::{json, Map, Value};

use movesplash_net::{ChannelMessage, OutboundMessage};
use movesplash_shared::normalize::{normalize_message, RecordDefaults};
use movesplash_shared::{Attachment, ConversationId, Ephemeral, Message, MessageId, Profile};

use crate::directory::UserDirectory;

/// Flatten a realtime message into one record. Metadata supplies the
/// message fields; the provider's serial, text and timestamp win over
/// anything the metadata claims, and a message without provider text has no
/// body. The sender falls back to the publishing client.
fn channel_record(message: &ChannelMessage, conversation_id: &ConversationId) -> Value {
    let mut record = match &message.metadata {
        Value::Object(obj) => obj.clone(),
        _ => Map::new(),
    };

    record.insert("id".into(), json!(message.serial));
    record.insert("chat_id".into(), json!(conversation_id.as_str()));
    record.insert("created_at".into(), json!(message.timestamp.to_rfc3339()));
    // The body is only ever the provider's text.
    record.remove("text");
    record.remove("content");
    if let Some(text) = &message.text {
        record.insert("content".into(), json!(text));
    }
    if let Some(client_id) = &message.client_id {
        record.entry("senderId").or_insert_with(|| json!(client_id));
    }
    // Star state lives in persistence only.
    record.remove("starred");

    Value::Object(record)
}

/// Canonical form of a realtime message received on `conversation_id`.
pub fn from_channel(
    message: &ChannelMessage,
    conversation_id: &ConversationId,
    directory: &UserDirectory,
) -> Message {
    let record = channel_record(message, conversation_id);
    let mut defaults = RecordDefaults::new(conversation_id.clone());
    defaults.id = Some(MessageId(message.serial.clone()));
    defaults.timestamp = message.timestamp;

    let mut normalized = normalize_message(&record, &defaults);
    directory.apply(&mut normalized);
    normalized
}

/// Canonical form of a persisted row. The conversation being joined is the
/// fallback when the row does not name one.
pub fn from_persisted(record: &Value, conversation_id: &ConversationId, directory: &UserDirectory) -> Message {
    let mut normalized = normalize_message(record, &RecordDefaults::new(conversation_id.clone()));
    directory.apply(&mut normalized);
    normalized
}

/// Build the publish payload for a message authored by `sender`.
pub fn outbound(
    sender: &Profile,
    conversation_id: &ConversationId,
    text: &str,
    attachment: Option<&Attachment>,
    ephemeral: Option<Ephemeral>,
) -> OutboundMessage {
    let mut metadata = Map::new();
    metadata.insert("chatId".into(), json!(conversation_id.as_str()));
    metadata.insert("senderId".into(), json!(sender.id.as_str()));
    metadata.insert("senderName".into(), json!(sender.display_name));
    metadata.insert(
        "senderAvatar".into(),
        json!(sender.avatar_url.clone().unwrap_or_else(|| sender.id.placeholder_avatar())),
    );
    metadata.insert("isSnap".into(), json!(ephemeral.is_some()));
    if let Some(snap) = ephemeral {
        metadata.insert("snapDuration".into(), json!(snap.ttl_secs));
    }

    match attachment {
        Some(Attachment::Image { src }) => {
            metadata.insert("image".into(), json!(src));
        }
        Some(Attachment::File {
            name,
            url,
            mime_type,
            size,
        }) => {
            metadata.insert("fileName".into(), json!(name));
            metadata.insert("fileUrl".into(), json!(url));
            metadata.insert("fileType".into(), json!(mime_type));
            metadata.insert("fileSize".into(), json!(size));
        }
        Some(Attachment::Voice {
            url,
            duration_secs,
            mime_type,
        }) => {
            metadata.insert("voiceUrl".into(), json!(url));
            metadata.insert("voiceDuration".into(), json!(duration_secs));
            metadata.insert("voiceMimeType".into(), json!(mime_type));
        }
        None => {}
    }

    let text = text.trim();
    OutboundMessage {
        text: (!text.is_empty()).then(|| text.to_string()),
        metadata: Value::Object(metadata),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use movesplash_shared::UserId;

    fn me() -> Profile {
        Profile {
            id: "u1".into(),
            display_name: "Ana".into(),
            avatar_url: None,
        }
    }

    #[test]
    fn provider_fields_override_metadata() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let msg = ChannelMessage {
            serial: "000000000007".into(),
            client_id: Some("u2".into()),
            text: Some("hello".into()),
            metadata: json!({
                "id": "spoofed",
                "chatId": "elsewhere",
                "senderName": "Bo",
                "createdAt": "2001-01-01T00:00:00Z",
                "starred": true,
                "isSnap": true,
                "snapDuration": 4
            }),
            timestamp: ts,
        };

        let m = from_channel(&msg, &"general".into(), &UserDirectory::default());
        assert_eq!(m.id.as_str(), "000000000007");
        assert_eq!(m.conversation_id.as_str(), "general");
        assert_eq!(m.sender_id.as_str(), "u2");
        assert_eq!(m.sender_name, "Bo");
        assert_eq!(m.content.as_deref(), Some("hello"));
        assert_eq!(m.timestamp, ts);
        assert_eq!(m.ephemeral, Some(Ephemeral { ttl_secs: 4 }));
        assert!(!m.starred);
    }

    #[test]
    fn metadata_sender_beats_connection_client_id() {
        let msg = ChannelMessage {
            serial: "s1".into(),
            client_id: Some("relay".into()),
            text: None,
            metadata: json!({"senderId": "u9"}),
            timestamp: Utc::now(),
        };
        let m = from_channel(&msg, &"c".into(), &UserDirectory::default());
        assert_eq!(m.sender_id.as_str(), "u9");
        assert_eq!(m.sender_name, "u9");
    }

    #[test]
    fn metadata_cannot_supply_the_body() {
        let msg = ChannelMessage {
            serial: "s2".into(),
            client_id: Some("u2".into()),
            text: None,
            metadata: json!({"content": "forged", "text": "also forged"}),
            timestamp: Utc::now(),
        };
        let m = from_channel(&msg, &"c".into(), &UserDirectory::default());
        assert!(m.content.is_none());
    }

    #[test]
    fn persisted_rows_use_directory_names() {
        let dir = UserDirectory::new([Profile {
            id: "u2".into(),
            display_name: "Bo".into(),
            avatar_url: None,
        }]);
        let m = from_persisted(&json!({"id": "m1", "sender_id": "u2", "content": "x"}), &"c1".into(), &dir);
        assert_eq!(m.conversation_id.as_str(), "c1");
        assert_eq!(m.sender_name, "Bo");
    }

    #[test]
    fn outbound_metadata_round_trips_through_mapping() {
        let attachment = Attachment::Voice {
            url: "https://cdn/v.webm".into(),
            duration_secs: 3.0,
            mime_type: "audio/webm".into(),
        };
        let out = outbound(&me(), &"c1".into(), "  ", Some(&attachment), Some(Ephemeral { ttl_secs: 5 }));
        assert_eq!(out.text, None);
        assert_eq!(out.metadata["isSnap"], true);
        assert_eq!(out.metadata["snapDuration"], 5);
        assert_eq!(out.metadata["senderAvatar"], UserId::from("u1").placeholder_avatar());

        let echoed = ChannelMessage {
            serial: "s9".into(),
            client_id: Some("u1".into()),
            text: out.text.clone(),
            metadata: out.metadata.clone(),
            timestamp: Utc::now(),
        };
        let m = from_channel(&echoed, &"c1".into(), &UserDirectory::default());
        assert_eq!(m.sender_name, "Ana");
        assert_eq!(m.attachment, Some(attachment));
        assert!(m.content.is_none());
    }
}
