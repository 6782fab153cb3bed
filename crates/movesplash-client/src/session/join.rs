//! Joining a conversation's channel.
//!
//! The subscription is opened before history is fetched. Live events that
//! arrive while history loads queue up in it and are replayed once the
//! merged history is installed, so nothing published during the join is
//! lost.
//!
//! A failed join leaves its channel acquired. Only the session knows whether
//! the join is still current, so releasing it is left to the session.

use std::sync::Arc;

use tracing::{debug, warn};

use movesplash_net::{HistoryQuery, RealtimeChannel, RealtimeConnection, Subscription};
use movesplash_shared::{ConversationId, Message};
use movesplash_store::PersistenceApi;

use crate::directory::UserDirectory;
use crate::error::SessionError;
use crate::mapping;
use crate::merge::{merge_histories, MergeOutcome};

pub(crate) struct JoinRequest {
    pub connection: Arc<dyn RealtimeConnection>,
    pub persistence: Arc<dyn PersistenceApi>,
    pub conversation_id: ConversationId,
    pub generation: u64,
    pub history_limit: usize,
    pub directory: UserDirectory,
}

pub(crate) struct JoinedChannel {
    pub channel: Arc<dyn RealtimeChannel>,
    pub subscription: Subscription,
    pub merge: MergeOutcome,
}

pub(crate) struct JoinOutcome {
    pub generation: u64,
    pub conversation_id: ConversationId,
    pub result: Result<JoinedChannel, SessionError>,
}

impl std::fmt::Debug for JoinOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinOutcome")
            .field("generation", &self.generation)
            .field("conversation_id", &self.conversation_id)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

pub(crate) async fn join_conversation(request: JoinRequest) -> JoinOutcome {
    let JoinRequest {
        connection,
        persistence,
        conversation_id,
        generation,
        history_limit,
        directory,
    } = request;

    let result = acquire(
        connection.as_ref(),
        persistence.as_ref(),
        &conversation_id,
        history_limit,
        &directory,
    )
    .await;

    if let Err(e) = &result {
        warn!(conversation = %conversation_id, error = %e, "Join failed");
    }

    JoinOutcome {
        generation,
        conversation_id,
        result,
    }
}

async fn acquire(
    connection: &dyn RealtimeConnection,
    persistence: &dyn PersistenceApi,
    conversation_id: &ConversationId,
    history_limit: usize,
    directory: &UserDirectory,
) -> Result<JoinedChannel, SessionError> {
    let channel = connection.channel(conversation_id.as_str()).await?;
    let (subscription, merge) =
        load(&channel, persistence, conversation_id, history_limit, directory).await?;
    Ok(JoinedChannel {
        channel,
        subscription,
        merge,
    })
}

async fn load(
    channel: &Arc<dyn RealtimeChannel>,
    persistence: &dyn PersistenceApi,
    conversation_id: &ConversationId,
    history_limit: usize,
    directory: &UserDirectory,
) -> Result<(Subscription, MergeOutcome), SessionError> {
    let subscription = channel.subscribe().await?;
    channel.attach().await?;

    let persisted: Vec<Message> = persistence
        .list_messages(conversation_id)
        .await?
        .iter()
        .map(|record| mapping::from_persisted(record, conversation_id, directory))
        .collect();

    let realtime: Vec<Message> = channel
        .history(HistoryQuery::oldest_first(history_limit))
        .await?
        .iter()
        .map(|message| mapping::from_channel(message, conversation_id, directory))
        .collect();

    debug!(
        conversation = %conversation_id,
        persisted = persisted.len(),
        realtime = realtime.len(),
        "Merging history"
    );

    Ok((subscription, merge_histories(persisted, realtime)))
}
