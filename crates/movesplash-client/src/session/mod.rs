//! Chat session: the handle the presentation layer talks to, backed by a
//! single task that owns all chat state.

mod actor;
mod commands;
mod join;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use movesplash_net::RealtimeProvider;
use movesplash_shared::{ConversationId, MessageId, Profile, UserId};
use movesplash_store::{PersistenceApi, VoiceUploader};

use crate::config::ClientConfig;
use crate::directory::UserDirectory;
use crate::error::{SendError, SessionError};
use crate::events::Notice;
use crate::state::{Draft, SessionView};

use actor::{ActorParts, SessionActor};
use commands::SessionCommand;

/// External services the session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub realtime: Arc<dyn RealtimeProvider>,
    pub persistence: Arc<dyn PersistenceApi>,
    pub voice: Arc<dyn VoiceUploader>,
}

/// Handle to a running chat session.
///
/// Dropping the last handle tears the session down: timers are cancelled,
/// the channel is released and the connection closed.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

/// Start a chat session for `identity`. Connecting begins immediately.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session(
    identity: Profile,
    deps: SessionDeps,
    directory: UserDirectory,
    config: &ClientConfig,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer.max(1));
    let (view_tx, view_rx) = watch::channel(SessionView::default());
    let (notices, _) = broadcast::channel(64);

    let mut directory = directory;
    directory.upsert(identity.clone());

    let (actor, inbox) = SessionActor::new(
        ActorParts {
            identity,
            deps,
            history_limit: config.history_limit,
            default_snap_ttl: config.snap_ttl_secs,
            directory,
            view_tx,
            notices: notices.clone(),
        },
        cmd_rx,
    );
    let task = tokio::spawn(actor.run(inbox));

    SessionHandle {
        commands: cmd_tx,
        view: view_rx,
        notices,
        task,
    }
}

impl SessionHandle {
    /// Live view of the session; changes on every state transition.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Current view snapshot.
    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// One-shot notices (toasts). Only notices sent after subscribing are seen.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    async fn command(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Switch to a conversation. Completes once the switch is queued; watch
    /// the view for the join result.
    pub async fn select_conversation(&self, id: ConversationId) -> Result<(), SessionError> {
        self.command(SessionCommand::SelectConversation(id)).await
    }

    /// Re-run a failed join of the active conversation.
    pub async fn retry_join(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::RetryJoin).await
    }

    pub async fn set_draft(&self, draft: Draft) -> Result<(), SessionError> {
        self.command(SessionCommand::SetDraft(draft)).await
    }

    /// Send the composer content. On success the composer is cleared; the
    /// message itself shows up when the channel echoes it back.
    pub async fn send(&self) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send(reply))
            .await
            .map_err(|_| SendError::Closed)?;
        rx.await.map_err(|_| SendError::Closed)?
    }

    pub async fn toggle_star(&self, id: MessageId) -> Result<(), SessionError> {
        self.command(SessionCommand::ToggleStar(id)).await
    }

    /// Id of the direct conversation with `peer`, created if needed.
    pub async fn open_direct(&self, peer: Profile) -> Result<ConversationId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::OpenDirect { peer, reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Create a group with `members` (the current user is added). Returns
    /// the local id; the view follows if the server assigns another.
    pub async fn create_group(
        &self,
        name: impl Into<String>,
        members: Vec<UserId>,
    ) -> Result<ConversationId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::CreateGroup {
            name: name.into(),
            members,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn refresh_conversations(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::RefreshConversations).await
    }

    pub async fn update_directory(&self, profiles: Vec<Profile>) -> Result<(), SessionError> {
        self.command(SessionCommand::UpdateDirectory(profiles)).await
    }

    /// Tear the session down and wait for the task to finish.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(SessionCommand::Shutdown(reply)).await?;
        let _ = rx.await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session task ended abnormally");
        }
        Ok(())
    }
}
