//! Write-back to the persistence layer.
//!
//! Every write here is fire-and-forget: failures are logged and never
//! reach the user or block the timeline.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use movesplash_shared::normalize::message_to_record;
use movesplash_shared::{ConversationId, Message, MessageId};
use movesplash_store::PersistenceApi;

/// Ids already persisted or already handed to the persistence layer during
/// the current channel binding.
#[derive(Debug, Default)]
pub struct PersistRegistry {
    ids: HashSet<MessageId>,
}

impl PersistRegistry {
    /// Record `id`, returning `true` the first time it is seen.
    pub fn mark(&mut self, id: MessageId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn reset(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub fn spawn_append(api: Arc<dyn PersistenceApi>, message: &Message) {
    let record = message_to_record(message);
    let id = message.id.clone();
    tokio::spawn(async move {
        match api.append_message(&record).await {
            Ok(()) => debug!(message_id = %id, "Message persisted"),
            Err(e) => warn!(message_id = %id, error = %e, "Failed to persist message"),
        }
    });
}

pub fn spawn_delete(api: Arc<dyn PersistenceApi>, conversation_id: ConversationId, id: MessageId) {
    tokio::spawn(async move {
        match api.delete_message(&conversation_id, &id).await {
            Ok(()) => debug!(message_id = %id, "Persisted message deleted"),
            Err(e) => warn!(message_id = %id, error = %e, "Failed to delete persisted message"),
        }
    });
}

pub fn spawn_star(api: Arc<dyn PersistenceApi>, conversation_id: ConversationId, id: MessageId, starred: bool) {
    tokio::spawn(async move {
        if let Err(e) = api.star_message(&conversation_id, &id, starred).await {
            warn!(message_id = %id, starred, error = %e, "Failed to persist star flag");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_reports_first_sighting_only() {
        let mut registry = PersistRegistry::default();
        assert!(registry.mark("m1".into()));
        assert!(!registry.mark("m1".into()));
        assert!(registry.contains(&"m1".into()));

        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.mark("m1".into()));
    }
}
