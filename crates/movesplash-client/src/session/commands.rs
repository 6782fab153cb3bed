use serde_json::Value;
use tokio::sync::oneshot;

use movesplash_shared::{ConversationId, MessageId, Profile, UserId};
use movesplash_store::StoreError;

use crate::error::SendError;
use crate::state::Draft;

use super::join::JoinOutcome;

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Leave the current conversation (if any) and join another.
    SelectConversation(ConversationId),
    /// Re-run a failed join of the active conversation.
    RetryJoin,
    /// Replace the composer content.
    SetDraft(Draft),
    /// Send the composer content.
    Send(oneshot::Sender<Result<(), SendError>>),
    /// Flip the star flag of a message in the active conversation.
    ToggleStar(MessageId),
    /// Find or create the direct conversation with a user.
    OpenDirect {
        peer: Profile,
        reply: oneshot::Sender<ConversationId>,
    },
    /// Create a group conversation.
    CreateGroup {
        name: String,
        members: Vec<UserId>,
        reply: oneshot::Sender<ConversationId>,
    },
    /// Reload the conversation list from persistence.
    RefreshConversations,
    /// Add or update profiles in the local user directory.
    UpdateDirectory(Vec<Profile>),
    /// Tear down and stop the task.
    Shutdown(oneshot::Sender<()>),
}

/// Results of background work, fed back into the session task.
pub(crate) enum Internal {
    Joined(JoinOutcome),
    ConversationsLoaded(Result<Vec<Value>, StoreError>),
    ChatCreated {
        local_id: ConversationId,
        result: Result<Value, StoreError>,
    },
}
