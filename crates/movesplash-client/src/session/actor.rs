//! The session task.
//!
//! One task owns all session state. Commands, live channel events, expiry
//! fires, join results and provider status changes are processed strictly
//! one at a time, so every view the presentation layer receives is
//! consistent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use movesplash_net::{ChannelEvent, RealtimeChannel, RealtimeConnection, Subscription};
use movesplash_shared::normalize::normalize_conversation;
use movesplash_shared::{Attachment, ConversationId, Ephemeral, MessageId, Profile, UserId};
use movesplash_store::{NewChat, VoiceUpload};

use crate::conversations::ConversationList;
use crate::directory::UserDirectory;
use crate::error::SendError;
use crate::events::Notice;
use crate::expiry::{remaining_lifetime, ExpiryFired, ExpiryScheduler};
use crate::mapping;
use crate::persist::{self, PersistRegistry};
use crate::state::{ChannelState, ConnectionState, Draft, DraftAttachment, SessionView};
use crate::timeline::Timeline;

use super::commands::{Internal, SessionCommand};
use super::join::{join_conversation, JoinOutcome, JoinRequest, JoinedChannel};
use super::SessionDeps;

/// The channel currently bound to the active conversation.
struct Binding {
    conversation_id: ConversationId,
    channel: Arc<dyn RealtimeChannel>,
    subscription: Subscription,
}

/// Receivers the run loop selects over that are not session state.
pub(crate) struct Inbox {
    pub commands: mpsc::Receiver<SessionCommand>,
    pub internal: mpsc::UnboundedReceiver<Internal>,
    pub expiry: mpsc::UnboundedReceiver<ExpiryFired>,
}

pub(crate) struct SessionActor {
    identity: Profile,
    deps: SessionDeps,
    history_limit: usize,
    default_snap_ttl: u64,

    connection: Option<Arc<dyn RealtimeConnection>>,
    connection_status: Option<watch::Receiver<String>>,
    binding: Option<Binding>,
    channel_status: Option<watch::Receiver<String>>,
    active: Option<ConversationId>,
    /// Bumped whenever the active conversation changes; join results
    /// carrying an older value are stale.
    generation: u64,

    timeline: Timeline,
    registry: PersistRegistry,
    expiry: ExpiryScheduler,
    conversations: ConversationList,
    directory: UserDirectory,
    draft: Draft,
    sending: bool,

    view: SessionView,
    view_tx: watch::Sender<SessionView>,
    notices: broadcast::Sender<Notice>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

pub(crate) struct ActorParts {
    pub identity: Profile,
    pub deps: SessionDeps,
    pub history_limit: usize,
    pub default_snap_ttl: u64,
    pub directory: UserDirectory,
    pub view_tx: watch::Sender<SessionView>,
    pub notices: broadcast::Sender<Notice>,
}

impl SessionActor {
    pub(crate) fn new(
        parts: ActorParts,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> (Self, Inbox) {
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (expiry, expiry_rx) = ExpiryScheduler::new();

        let actor = Self {
            identity: parts.identity,
            deps: parts.deps,
            history_limit: parts.history_limit,
            default_snap_ttl: parts.default_snap_ttl,
            connection: None,
            connection_status: None,
            binding: None,
            channel_status: None,
            active: None,
            generation: 0,
            timeline: Timeline::new(),
            registry: PersistRegistry::default(),
            expiry,
            conversations: ConversationList::new(),
            directory: parts.directory,
            draft: Draft::default(),
            sending: false,
            view: SessionView::default(),
            view_tx: parts.view_tx,
            notices: parts.notices,
            internal_tx,
        };
        let inbox = Inbox {
            commands,
            internal,
            expiry: expiry_rx,
        };
        (actor, inbox)
    }

    pub(crate) async fn run(mut self, mut inbox: Inbox) {
        info!(user = %self.identity.id, "Chat session starting");
        self.connect().await;

        loop {
            tokio::select! {
                // --- Commands from the presentation layer ---
                cmd = inbox.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown(reply)) => {
                            info!("Chat session shutdown requested");
                            self.teardown().await;
                            let _ = reply.send(());
                            return;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("All session handles dropped, shutting down");
                            break;
                        }
                    }
                }

                // --- Background work results ---
                Some(internal) = inbox.internal.recv() => {
                    self.handle_internal(internal).await;
                }

                // --- Live channel events ---
                event = next_event(&mut self.binding) => {
                    match event {
                        Some(event) => self.handle_live_event(event),
                        None => self.handle_subscription_closed(),
                    }
                }

                // --- Snap expiry ---
                Some(fired) = inbox.expiry.recv() => {
                    self.handle_expiry(fired).await;
                }

                // --- Provider status mirroring ---
                status = next_status(&mut self.connection_status) => {
                    match status {
                        Some(status) => self.view.connection_status = status,
                        None => self.connection_status = None,
                    }
                    self.publish_view();
                }
                status = next_status(&mut self.channel_status) => {
                    match status {
                        Some(status) => self.view.channel_status = status,
                        None => self.channel_status = None,
                    }
                    self.publish_view();
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SelectConversation(id) => self.select_conversation(id).await,
            SessionCommand::RetryJoin => self.retry_join().await,
            SessionCommand::SetDraft(draft) => {
                self.draft = draft;
                self.publish_view();
            }
            SessionCommand::Send(reply) => {
                let result = self.send().await;
                let _ = reply.send(result);
            }
            SessionCommand::ToggleStar(id) => self.toggle_star(id),
            SessionCommand::OpenDirect { peer, reply } => {
                let id = self.open_direct(peer);
                let _ = reply.send(id);
            }
            SessionCommand::CreateGroup {
                name,
                members,
                reply,
            } => {
                let id = self.create_group(name, members);
                let _ = reply.send(id);
            }
            SessionCommand::RefreshConversations => self.load_conversations(),
            SessionCommand::UpdateDirectory(profiles) => {
                self.directory.extend(profiles);
                for message in self.timeline.iter_mut() {
                    self.directory.apply(message);
                }
                self.conversations
                    .fill_direct_names(&self.identity.id, &self.directory);
                self.publish_view();
            }
            // Handled by the run loop.
            SessionCommand::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Joined(outcome) => self.finish_join(outcome).await,
            Internal::ConversationsLoaded(Ok(records)) => {
                let remote: Vec<_> = records.iter().filter_map(normalize_conversation).collect();
                debug!(count = remote.len(), "Conversations loaded");
                let renamed = self.conversations.merge_remote(remote);
                self.conversations
                    .fill_direct_names(&self.identity.id, &self.directory);
                for (local, server) in renamed {
                    self.follow_rename(&local, server).await;
                }
                self.publish_view();
            }
            Internal::ConversationsLoaded(Err(e)) => {
                warn!(error = %e, "Failed to load conversations");
            }
            Internal::ChatCreated { local_id, result } => {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(conversation = %local_id, error = %e, "Failed to persist new conversation");
                        return;
                    }
                };
                let confirmed = normalize_conversation(&record).or_else(|| {
                    debug!(conversation = %local_id, "Server returned no chat id, keeping local id");
                    self.conversations.get(&local_id).cloned()
                });
                if let Some(server) = confirmed {
                    if let Some(server_id) = self.conversations.confirm(&local_id, server) {
                        info!(local = %local_id, server = %server_id, "Conversation confirmed under server id");
                        self.follow_rename(&local_id, server_id).await;
                    }
                }
                self.publish_view();
            }
        }
    }

    // =========================================================================
    // Connection
    // =========================================================================

    async fn connect(&mut self) {
        if self.connection.is_some() {
            return;
        }

        self.view.connection = ConnectionState::Connecting;
        self.publish_view();

        match self.deps.realtime.connect(self.identity.id.as_str()).await {
            Ok(connection) => {
                let status = connection.status();
                self.view.connection_status = status.borrow().clone();
                self.connection_status = Some(status);
                self.connection = Some(connection);
                self.view.connection = ConnectionState::Connected;
                self.view.error = None;
                info!(user = %self.identity.id, "Connected to realtime provider");
                self.load_conversations();
            }
            Err(e) => {
                warn!(error = %e, "Realtime connection failed");
                self.view.connection = ConnectionState::Disconnected;
                self.view.error = Some(format!("Unable to reach the chat service: {e}"));
            }
        }
        self.publish_view();
    }

    fn load_conversations(&self) {
        let api = self.deps.persistence.clone();
        let user = self.identity.id.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.list_chats(&user).await;
            let _ = tx.send(Internal::ConversationsLoaded(result));
        });
    }

    // =========================================================================
    // Joining and leaving
    // =========================================================================

    async fn select_conversation(&mut self, id: ConversationId) {
        if self.active.as_ref() == Some(&id)
            && matches!(self.view.channel, ChannelState::Synced | ChannelState::JoiningChannel)
        {
            debug!(conversation = %id, "Conversation already active");
            return;
        }

        self.leave_current().await;
        self.active = Some(id);
        self.begin_join().await;
    }

    async fn retry_join(&mut self) {
        if self.active.is_none() || self.view.channel != ChannelState::Idle {
            debug!("Nothing to retry");
            return;
        }
        self.begin_join().await;
    }

    /// Drop everything tied to the current binding and release its channel.
    async fn leave_current(&mut self) {
        self.generation += 1;
        let cancelled = self.expiry.cancel_all();
        self.registry.reset();
        self.timeline.clear();

        if let Some(binding) = self.binding.take() {
            self.view.channel = ChannelState::Leaving;
            self.publish_view();

            self.channel_status = None;
            let Binding {
                conversation_id,
                subscription,
                ..
            } = binding;
            drop(subscription);
            if let Some(connection) = &self.connection {
                if let Err(e) = connection.release(conversation_id.as_str()).await {
                    warn!(conversation = %conversation_id, error = %e, "Channel release failed");
                }
            }
            debug!(conversation = %conversation_id, cancelled, "Left conversation");
        }

        self.view.channel = ChannelState::Idle;
        self.view.channel_status = String::new();
        self.publish_view();
    }

    async fn begin_join(&mut self) {
        let Some(conversation_id) = self.active.clone() else {
            return;
        };

        if self.connection.is_none() {
            self.connect().await;
        }
        let Some(connection) = self.connection.clone() else {
            self.notify(Notice::error("Not connected to the chat service"));
            return;
        };

        self.generation += 1;
        let request = JoinRequest {
            connection,
            persistence: self.deps.persistence.clone(),
            conversation_id: conversation_id.clone(),
            generation: self.generation,
            history_limit: self.history_limit,
            directory: self.directory.clone(),
        };

        self.view.channel = ChannelState::JoiningChannel;
        self.publish_view();
        debug!(conversation = %conversation_id, generation = self.generation, "Joining");

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = join_conversation(request).await;
            let _ = tx.send(Internal::Joined(outcome));
        });
    }

    async fn finish_join(&mut self, outcome: JoinOutcome) {
        let JoinOutcome {
            generation,
            conversation_id,
            result,
        } = outcome;

        if generation != self.generation || self.active.as_ref() != Some(&conversation_id) {
            debug!(conversation = %conversation_id, generation, "Discarding stale join");
            if let Ok(joined) = result {
                drop(joined.subscription);
            }
            // A newer join of the same conversation shares the channel.
            if self.active.as_ref() != Some(&conversation_id) {
                self.release(&conversation_id).await;
            }
            return;
        }

        match result {
            Ok(joined) => self.install(conversation_id, joined),
            Err(e) => {
                self.release(&conversation_id).await;
                self.view.channel = ChannelState::Idle;
                self.view.error = Some(format!("Failed to join conversation: {e}"));
                self.notify(Notice::error("Failed to join conversation"));
                self.publish_view();
            }
        }
    }

    async fn release(&self, conversation_id: &ConversationId) {
        if let Some(connection) = &self.connection {
            if let Err(e) = connection.release(conversation_id.as_str()).await {
                debug!(conversation = %conversation_id, error = %e, "Release after join failed");
            }
        }
    }

    /// Bind the joined channel and show the merged history. Live events that
    /// queued up during the join are read next by the run loop.
    fn install(&mut self, conversation_id: ConversationId, joined: JoinedChannel) {
        let JoinedChannel {
            channel,
            subscription,
            merge,
        } = joined;

        for message in &merge.messages {
            self.registry.mark(message.id.clone());
        }
        for id in &merge.discovered {
            if let Some(message) = merge.messages.iter().find(|m| &m.id == id) {
                debug!(message_id = %id, "Persisting message found only in realtime history");
                persist::spawn_append(self.deps.persistence.clone(), message);
            }
        }

        // History snaps get whatever is left of their lifetime.
        let now = Utc::now();
        for message in &merge.messages {
            if let Some(Ephemeral { ttl_secs }) = message.ephemeral {
                let remaining = remaining_lifetime(message.timestamp, ttl_secs, now);
                self.expiry.schedule(message.id.clone(), remaining);
            }
        }

        let count = merge.messages.len();
        self.timeline.replace(merge.messages);
        if let Some(last) = self.timeline.last() {
            self.conversations.apply_message(last);
        }

        let status = channel.status();
        self.view.channel_status = status.borrow().clone();
        self.channel_status = Some(status);
        self.binding = Some(Binding {
            conversation_id: conversation_id.clone(),
            channel,
            subscription,
        });

        self.view.channel = ChannelState::Synced;
        self.view.error = None;
        info!(conversation = %conversation_id, messages = count, "Conversation synced");
        self.publish_view();
    }

    fn handle_subscription_closed(&mut self) {
        if let Some(binding) = self.binding.take() {
            warn!(conversation = %binding.conversation_id, "Live subscription ended");
            self.expiry.cancel_all();
            self.channel_status = None;
            self.view.channel = ChannelState::Idle;
            self.view.error = Some("Lost the live connection to this conversation".into());
            self.publish_view();
        }
    }

    /// When the active conversation got a server id, rebind under it.
    async fn follow_rename(&mut self, local: &ConversationId, server: ConversationId) {
        if self.active.as_ref() == Some(local) {
            self.select_conversation(server).await;
        }
    }

    // =========================================================================
    // Live events
    // =========================================================================

    fn handle_live_event(&mut self, event: ChannelEvent) {
        let Some(binding) = &self.binding else {
            return;
        };
        let conversation_id = binding.conversation_id.clone();

        match event {
            ChannelEvent::Message(raw) => {
                let mut message = mapping::from_channel(&raw, &conversation_id, &self.directory);
                if let Some(existing) = self.timeline.get(&message.id) {
                    message.starred = existing.starred;
                }

                if let Some(Ephemeral { ttl_secs }) = message.ephemeral {
                    self.expiry
                        .schedule(message.id.clone(), Duration::from_secs(ttl_secs));
                }
                if self.registry.mark(message.id.clone()) {
                    persist::spawn_append(self.deps.persistence.clone(), &message);
                }

                self.conversations.apply_message(&message);
                debug!(message_id = %message.id, "Live message");
                self.timeline.upsert(message);
                self.publish_view();
            }
            ChannelEvent::Deleted { serial } => {
                let id = MessageId(serial);
                self.expiry.cancel(&id);
                match self.timeline.remove(&id) {
                    Some(removed) => {
                        debug!(message_id = %id, "Message deleted");
                        persist::spawn_delete(
                            self.deps.persistence.clone(),
                            removed.conversation_id.clone(),
                            id,
                        );
                        self.conversations
                            .refresh_preview(&conversation_id, self.timeline.last());
                        self.publish_view();
                    }
                    None => debug!(message_id = %id, "Delete for unknown message ignored"),
                }
            }
        }
    }

    /// A snap's lifetime ran out: ask the provider to delete it. Local
    /// removal happens when the resulting delete event comes back.
    async fn handle_expiry(&mut self, fired: ExpiryFired) {
        if !self.expiry.take_fired(&fired) {
            debug!(message_id = %fired.id, "Ignoring stale expiry");
            return;
        }
        let Some(binding) = &self.binding else {
            return;
        };
        if !self.timeline.contains(&fired.id) {
            return;
        }

        debug!(message_id = %fired.id, "Snap expired");
        if let Err(e) = binding.channel.delete(fired.id.as_str()).await {
            warn!(message_id = %fired.id, error = %e, "Failed to delete expired snap");
        }
    }

    // =========================================================================
    // Composer
    // =========================================================================

    async fn send(&mut self) -> Result<(), SendError> {
        if self.draft.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let channel = match (&self.binding, self.view.channel) {
            (Some(binding), ChannelState::Synced) => binding.channel.clone(),
            _ => {
                self.notify(Notice::info(SendError::NotReady.to_string()));
                return Err(SendError::NotReady);
            }
        };
        let Some(conversation_id) = self.active.clone() else {
            return Err(SendError::NotReady);
        };

        self.sending = true;
        self.publish_view();
        let result = self.publish_draft(channel.as_ref(), &conversation_id).await;
        self.sending = false;

        match &result {
            Ok(()) => {
                self.draft = Draft::default();
                debug!(conversation = %conversation_id, "Message sent");
            }
            Err(e) => {
                error!(conversation = %conversation_id, error = %e, "Send failed");
                self.notify(Notice::error(e.to_string()));
            }
        }
        self.publish_view();
        result
    }

    async fn publish_draft(
        &self,
        channel: &dyn RealtimeChannel,
        conversation_id: &ConversationId,
    ) -> Result<(), SendError> {
        let attachment = match &self.draft.attachment {
            None => None,
            Some(DraftAttachment::Ready(attachment)) => Some(attachment.clone()),
            Some(DraftAttachment::Voice(clip)) => {
                let upload = VoiceUpload::from_bytes(&clip.bytes, &clip.mime_type, clip.duration_secs);
                let uploaded = self
                    .deps
                    .voice
                    .upload(&upload)
                    .await
                    .map_err(SendError::Upload)?;
                Some(Attachment::Voice {
                    url: uploaded.url,
                    duration_secs: uploaded.duration.unwrap_or(clip.duration_secs),
                    mime_type: uploaded.mime_type.unwrap_or_else(|| clip.mime_type.clone()),
                })
            }
        };

        let ephemeral = self.draft.snap_ttl_secs.map(|ttl| Ephemeral {
            ttl_secs: if ttl == 0 { self.default_snap_ttl } else { ttl },
        });

        let outbound = mapping::outbound(
            &self.identity,
            conversation_id,
            &self.draft.text,
            attachment.as_ref(),
            ephemeral,
        );
        channel.publish(outbound).await.map_err(SendError::Publish)
    }

    fn toggle_star(&mut self, id: MessageId) {
        let Some(conversation_id) = self.active.clone() else {
            return;
        };
        match self.timeline.toggle_star(&id) {
            Some(starred) => {
                persist::spawn_star(self.deps.persistence.clone(), conversation_id, id, starred);
                self.publish_view();
            }
            None => debug!(message_id = %id, "Star toggle for unknown message"),
        }
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    fn open_direct(&mut self, peer: Profile) -> ConversationId {
        self.directory.upsert(peer.clone());
        let opened = self.conversations.open_direct(&self.identity.id, &peer);
        if opened.created {
            info!(conversation = %opened.id, peer = %peer.id, "Direct conversation created");
            self.spawn_create_chat(
                opened.id.clone(),
                NewChat {
                    id: Some(opened.id.clone()),
                    name: peer.display_name.clone(),
                    avatar: peer.avatar_url.clone(),
                    members: vec![self.identity.id.clone(), peer.id.clone()],
                    is_group: false,
                },
            );
            self.notify(Notice::success(format!("Started a chat with {}", peer.display_name)));
        }
        self.publish_view();
        opened.id
    }

    fn create_group(&mut self, name: String, members: Vec<UserId>) -> ConversationId {
        let id = self
            .conversations
            .create_group(&name, &self.identity.id, members);
        let all_members = self
            .conversations
            .get(&id)
            .map(|c| c.members.clone())
            .unwrap_or_default();

        info!(conversation = %id, members = all_members.len(), "Group created");
        self.spawn_create_chat(
            id.clone(),
            NewChat {
                id: None,
                name: name.clone(),
                avatar: None,
                members: all_members,
                is_group: true,
            },
        );
        self.notify(Notice::success(format!("Created group {name}")));
        self.publish_view();
        id
    }

    fn spawn_create_chat(&self, local_id: ConversationId, chat: NewChat) {
        let api = self.deps.persistence.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = api.create_chat(&chat).await;
            let _ = tx.send(Internal::ChatCreated { local_id, result });
        });
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn publish_view(&mut self) {
        self.view.active = self.active.clone();
        self.view.messages = self.timeline.messages();
        self.view.conversations = self.conversations.sorted();
        self.view.composer = self.draft.clone();
        self.view.sending = self.sending;
        self.view_tx.send_replace(self.view.clone());
    }

    fn notify(&self, notice: Notice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    /// Best-effort release of everything the session holds.
    async fn teardown(&mut self) {
        self.generation += 1;
        let cancelled = self.expiry.cancel_all();

        if let Some(binding) = self.binding.take() {
            drop(binding.subscription);
            if let Some(connection) = &self.connection {
                if let Err(e) = connection.release(binding.conversation_id.as_str()).await {
                    warn!(conversation = %binding.conversation_id, error = %e, "Channel release failed");
                }
            }
        }
        self.channel_status = None;

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "Closing realtime connection failed");
            }
        }
        self.connection_status = None;

        self.view.connection = ConnectionState::Disconnected;
        self.view.channel = ChannelState::Idle;
        self.publish_view();
        info!(cancelled_timers = cancelled, "Chat session closed");
    }
}

async fn next_event(binding: &mut Option<Binding>) -> Option<ChannelEvent> {
    match binding {
        Some(binding) => binding.subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Next provider status value. `None` once the provider dropped its sender.
async fn next_status(rx: &mut Option<watch::Receiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
