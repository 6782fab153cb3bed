//! State the chat session exposes to the presentation layer.
//!
//! The session publishes a fresh [`SessionView`] through a `watch` channel
//! after every change; readers never see a half-applied update.

use serde::Serialize;

use movesplash_shared::{Attachment, Conversation, ConversationId, Message};

/// Realtime connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle of the active conversation's channel binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChannelState {
    #[default]
    Idle,
    JoiningChannel,
    Synced,
    Leaving,
}

/// A recorded voice clip waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceClip {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DraftAttachment {
    /// Already hosted or inline (image, file).
    Ready(Attachment),
    /// Needs an upload before it can be sent.
    Voice(VoiceClip),
}

/// Composer content. Cleared only by a successful send.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<DraftAttachment>,
    /// Snap lifetime in seconds; `Some(0)` means the configured default.
    pub snap_ttl_secs: Option<u64>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, attachment: DraftAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn as_snap(mut self, ttl_secs: u64) -> Self {
        self.snap_ttl_secs = Some(ttl_secs);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

/// Snapshot of everything the chat screen renders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionView {
    pub connection: ConnectionState,
    pub channel: ChannelState,
    /// Provider status strings, mirrored as they change.
    pub connection_status: String,
    pub channel_status: String,
    /// Retained connectivity / join error line.
    pub error: Option<String>,
    pub active: Option<ConversationId>,
    /// Ordered by timestamp ascending, ties by arrival.
    pub messages: Vec<Message>,
    /// Most recent activity first.
    pub conversations: Vec<Conversation>,
    pub composer: Draft,
    pub sending: bool,
}

impl SessionView {
    pub fn message_ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }
}
