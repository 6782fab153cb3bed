//! Reconciliation of persisted and realtime history on join.

use std::collections::HashMap;

use movesplash_shared::{Message, MessageId};

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Union of both sources, sorted by timestamp.
    pub messages: Vec<Message>,
    /// Ids present only in realtime history, in the order they were seen.
    pub discovered: Vec<MessageId>,
}

/// Merge persisted history `persisted` with realtime history `realtime`.
///
/// Realtime content wins for ids present in both, except for the star flag,
/// which only persistence knows. Ids the persistence layer has never seen
/// are reported as discovered so the caller can write them back.
pub fn merge_histories(persisted: Vec<Message>, realtime: Vec<Message>) -> MergeOutcome {
    let mut messages: Vec<Message> = Vec::with_capacity(persisted.len() + realtime.len());
    let mut index: HashMap<MessageId, usize> = HashMap::new();

    for message in persisted {
        match index.get(&message.id) {
            Some(&i) => messages[i] = message,
            None => {
                index.insert(message.id.clone(), messages.len());
                messages.push(message);
            }
        }
    }

    let mut discovered = Vec::new();
    for mut message in realtime {
        match index.get(&message.id) {
            Some(&i) => {
                message.starred = messages[i].starred;
                messages[i] = message;
            }
            None => {
                discovered.push(message.id.clone());
                index.insert(message.id.clone(), messages.len());
                messages.push(message);
            }
        }
    }

    // Stable: equal timestamps keep persisted-then-realtime order.
    messages.sort_by_key(|m| m.timestamp);

    MergeOutcome {
        messages,
        discovered,
    }
}
