//! Canonical chat models.
//!
//! Everything past the normalization boundary works with these typed values;
//! untyped JSON never travels further than [`crate::normalize`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// The single attachment a message may carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    /// Inline data URI or remote URL.
    Image { src: String },
    File {
        name: String,
        url: String,
        mime_type: String,
        size: u64,
    },
    Voice {
        url: String,
        duration_secs: f64,
        mime_type: String,
    },
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Ephemeral ("snap") settings of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ephemeral {
    /// Lifetime in seconds, counted from receipt.
    pub ttl_secs: u64,
}

/// A chat message as displayed and persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    /// Denormalized for display.
    pub sender_name: String,
    pub sender_avatar: String,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
    pub ephemeral: Option<Ephemeral>,
    pub starred: bool,
}

impl Message {
    /// True when the message carries neither text nor an attachment.
    pub fn is_blank(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty()) && self.attachment.is_none()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation (chat), direct or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Insertion order is kept for display; membership compares as a set.
    pub members: Vec<UserId>,
    pub is_group: bool,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Build a conversation. Three or more members always make a group.
    pub fn new(
        id: ConversationId,
        display_name: impl Into<String>,
        members: Vec<UserId>,
        flagged_group: bool,
    ) -> Self {
        let mut unique: Vec<UserId> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        let is_group = flagged_group || unique.len() > 2;
        Self {
            id,
            display_name: display_name.into(),
            avatar_url: None,
            members: unique,
            is_group,
            last_message_preview: None,
            last_message_at: None,
        }
    }

    pub fn member_set(&self) -> BTreeSet<&UserId> {
        self.members.iter().collect()
    }

    /// Member-set equality, ignoring order and duplicates.
    pub fn has_members(&self, members: &[UserId]) -> bool {
        self.member_set() == members.iter().collect::<BTreeSet<_>>()
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Display metadata for a user, as known to the local directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<UserId> {
        raw.iter().map(|s| UserId::from(*s)).collect()
    }

    #[test]
    fn three_members_make_a_group() {
        let c = Conversation::new("c".into(), "trio", ids(&["a", "b", "c"]), false);
        assert!(c.is_group);
        let d = Conversation::new("d".into(), "pair", ids(&["a", "b"]), false);
        assert!(!d.is_group);
        let e = Conversation::new("e".into(), "flagged", ids(&["a", "b"]), true);
        assert!(e.is_group);
    }

    #[test]
    fn member_comparison_ignores_order() {
        let c = Conversation::new("c".into(), "pair", ids(&["u2", "u1", "u2"]), false);
        assert_eq!(c.members, ids(&["u2", "u1"]));
        assert!(c.has_members(&ids(&["u1", "u2"])));
        assert!(!c.has_members(&ids(&["u1", "u3"])));
    }
}
