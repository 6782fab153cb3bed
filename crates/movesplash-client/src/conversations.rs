//! The user's conversation list.
//!
//! Conversations created on this device get a local id first; they stay
//! "pending" until the persistence layer confirms them, possibly under a
//! different id.

use std::collections::HashSet;

use movesplash_shared::preview::preview_line;
use movesplash_shared::{Conversation, ConversationId, Message, Profile, UserId};

use crate::directory::UserDirectory;

/// Result of [`ConversationList::open_direct`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub id: ConversationId,
    /// `true` when no matching conversation existed and one was created.
    pub created: bool,
}

#[derive(Debug, Default)]
pub struct ConversationList {
    items: Vec<Conversation>,
    pending: HashSet<ConversationId>,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.items.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_pending(&self, id: &ConversationId) -> bool {
        self.pending.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fold in conversations loaded from persistence.
    ///
    /// Returns `(local, server)` pairs for pending local conversations that
    /// turned out to exist remotely under another id.
    pub fn merge_remote(&mut self, remote: Vec<Conversation>) -> Vec<(ConversationId, ConversationId)> {
        let mut renamed = Vec::new();

        for incoming in remote {
            if let Some(existing) = self.items.iter_mut().find(|c| c.id == incoming.id) {
                absorb(existing, incoming);
                self.pending.remove(&existing.id);
                continue;
            }

            let pending_match = self.items.iter().position(|c| {
                self.pending.contains(&c.id)
                    && !c.is_group
                    && !incoming.is_group
                    && c.has_members(&incoming.members)
            });

            match pending_match {
                Some(index) => {
                    let local = self.items[index].id.clone();
                    self.pending.remove(&local);
                    let server = incoming.id.clone();
                    absorb(&mut self.items[index], incoming);
                    self.items[index].id = server.clone();
                    renamed.push((local, server));
                }
                None => self.items.push(incoming),
            }
        }

        renamed
    }

    /// Find the direct conversation with `peer`, creating a pending one if
    /// none exists. Matching is by member set, not by id.
    pub fn open_direct(&mut self, me: &UserId, peer: &Profile) -> Opened {
        let members = vec![me.clone(), peer.id.clone()];
        if let Some(existing) = self
            .items
            .iter()
            .find(|c| !c.is_group && c.has_members(&members))
        {
            return Opened {
                id: existing.id.clone(),
                created: false,
            };
        }

        let id = ConversationId::direct(me, &peer.id);
        let mut conversation = Conversation::new(id.clone(), peer.display_name.clone(), members, false);
        conversation.avatar_url = peer.avatar_url.clone();
        self.items.push(conversation);
        self.pending.insert(id.clone());
        Opened { id, created: true }
    }

    /// Create a pending group containing `me` and `members`.
    pub fn create_group(&mut self, name: &str, me: &UserId, members: Vec<UserId>) -> ConversationId {
        let id = ConversationId::local_group();
        let mut all = vec![me.clone()];
        all.extend(members);
        self.items.push(Conversation::new(id.clone(), name, all, true));
        self.pending.insert(id.clone());
        id
    }

    /// Apply the server's record for a pending conversation. Returns the new
    /// id when the server assigned a different one.
    pub fn confirm(&mut self, local: &ConversationId, server: Conversation) -> Option<ConversationId> {
        self.pending.remove(local);
        let index = self.items.iter().position(|c| &c.id == local)?;

        if &server.id == local {
            absorb(&mut self.items[index], server);
            return None;
        }

        let server_id = server.id.clone();
        if let Some(dup) = self.items.iter().position(|c| c.id == server_id) {
            // Already known under the server id; drop the local copy.
            self.items.remove(index);
            let dup = if dup > index { dup - 1 } else { dup };
            absorb(&mut self.items[dup], server);
            return Some(server_id);
        }

        absorb(&mut self.items[index], server);
        self.items[index].id = server_id.clone();
        Some(server_id)
    }

    /// Update the preview of the message's conversation if it is the newest.
    pub fn apply_message(&mut self, message: &Message) {
        let Some(conversation) = self.items.iter_mut().find(|c| c.id == message.conversation_id) else {
            return;
        };
        if conversation
            .last_message_at
            .map_or(true, |at| message.timestamp >= at)
        {
            conversation.last_message_preview = Some(preview_line(message));
            conversation.last_message_at = Some(message.timestamp);
        }
    }

    /// Recompute a preview after the newest message went away.
    pub fn refresh_preview(&mut self, id: &ConversationId, last: Option<&Message>) {
        let Some(conversation) = self.items.iter_mut().find(|c| &c.id == id) else {
            return;
        };
        match last {
            Some(message) => {
                conversation.last_message_preview = Some(preview_line(message));
                conversation.last_message_at = Some(message.timestamp);
            }
            None => conversation.last_message_preview = None,
        }
    }

    /// Give unnamed direct conversations the other member's name.
    pub fn fill_direct_names(&mut self, me: &UserId, directory: &UserDirectory) {
        for conversation in self.items.iter_mut().filter(|c| !c.is_group) {
            if !conversation.display_name.trim().is_empty() {
                continue;
            }
            let Some(peer) = conversation.members.iter().find(|m| *m != me) else {
                continue;
            };
            let (name, avatar) = directory.resolve(peer, "", "");
            conversation.display_name = name;
            conversation.avatar_url.get_or_insert(avatar);
        }
    }

    /// Most recent activity first; conversations without messages last.
    pub fn sorted(&self) -> Vec<Conversation> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| match (a.last_message_at, b.last_message_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        items
    }
}

/// Copy `incoming` into `existing`, keeping local fields the incoming record
/// leaves blank and whichever preview is newer.
fn absorb(existing: &mut Conversation, incoming: Conversation) {
    if !incoming.display_name.trim().is_empty() {
        existing.display_name = incoming.display_name;
    }
    if incoming.avatar_url.is_some() {
        existing.avatar_url = incoming.avatar_url;
    }
    if !incoming.members.is_empty() {
        existing.members = incoming.members;
    }
    existing.is_group = existing.is_group || incoming.is_group;

    let incoming_newer = match (existing.last_message_at, incoming.last_message_at) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(ours), Some(theirs)) => theirs > ours,
    };
    if incoming_newer {
        existing.last_message_preview = incoming.last_message_preview;
        existing.last_message_at = incoming.last_message_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: id.into(),
            display_name: name.into(),
            avatar_url: None,
        }
    }

    fn remote(id: &str, members: &[&str]) -> Conversation {
        Conversation::new(id.into(), "", members.iter().map(|m| UserId::from(*m)).collect(), false)
    }

    #[test]
    fn open_direct_reuses_existing_by_member_set() {
        let mut list = ConversationList::new();
        list.merge_remote(vec![remote("srv-9", &["u2", "me"])]);

        let opened = list.open_direct(&"me".into(), &profile("u2", "Bo"));
        assert_eq!(opened, Opened { id: "srv-9".into(), created: false });
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn open_direct_creates_pending_with_derived_id() {
        let mut list = ConversationList::new();
        let opened = list.open_direct(&"me".into(), &profile("u2", "Bo"));
        assert!(opened.created);
        assert_eq!(opened.id.as_str(), "me_u2");
        assert!(list.is_pending(&opened.id));
        assert_eq!(list.get(&opened.id).unwrap().display_name, "Bo");

        let again = list.open_direct(&"me".into(), &profile("u2", "Bo"));
        assert!(!again.created);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn confirm_renames_pending_conversation() {
        let mut list = ConversationList::new();
        let opened = list.open_direct(&"me".into(), &profile("u2", "Bo"));

        let renamed = list.confirm(&opened.id, remote("srv-1", &["me", "u2"]));
        assert_eq!(renamed, Some("srv-1".into()));
        assert!(!list.contains(&opened.id));
        let confirmed = list.get(&"srv-1".into()).unwrap();
        assert_eq!(confirmed.display_name, "Bo");
        assert!(!list.is_pending(&"srv-1".into()));
    }

    #[test]
    fn confirm_with_same_id_is_not_a_rename() {
        let mut list = ConversationList::new();
        let id = list.create_group("Crew", &"me".into(), vec!["a".into(), "b".into()]);
        assert!(list.get(&id).unwrap().is_group);
        assert_eq!(list.get(&id).unwrap().members.len(), 3);

        let mut server = Conversation::new(id.clone(), "Crew", Vec::new(), true);
        server.avatar_url = Some("https://cdn/crew.png".into());
        assert_eq!(list.confirm(&id, server), None);
        assert_eq!(list.get(&id).unwrap().avatar_url.as_deref(), Some("https://cdn/crew.png"));
        assert_eq!(list.get(&id).unwrap().members.len(), 3);
    }

    #[test]
    fn remote_load_reconciles_pending_direct_chat() {
        let mut list = ConversationList::new();
        let opened = list.open_direct(&"me".into(), &profile("u2", "Bo"));
        let renamed = list.merge_remote(vec![remote("srv-3", &["u2", "me"])]);
        assert_eq!(renamed, vec![(opened.id, "srv-3".into())]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn sorted_by_recent_activity() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut list = ConversationList::new();
        let mut old = remote("old", &["me", "a"]);
        old.last_message_at = Some(base);
        let mut new = remote("new", &["me", "b"]);
        new.last_message_at = Some(base + Duration::minutes(5));
        list.merge_remote(vec![remote("empty", &["me", "c"]), old, new]);

        let ids: Vec<String> = list.sorted().into_iter().map(|c| c.id.0).collect();
        assert_eq!(ids, ["new", "old", "empty"]);
    }

    #[test]
    fn apply_message_ignores_older_messages() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut list = ConversationList::new();
        list.merge_remote(vec![remote("c", &["me", "a"])]);

        let mut msg = Message {
            id: "m2".into(),
            conversation_id: "c".into(),
            sender_id: "a".into(),
            sender_name: "Ana".into(),
            sender_avatar: String::new(),
            content: Some("newer".into()),
            attachment: None,
            timestamp: base + Duration::seconds(10),
            ephemeral: None,
            starred: false,
        };
        list.apply_message(&msg);
        msg.content = Some("older".into());
        msg.timestamp = base;
        list.apply_message(&msg);

        let c = list.get(&"c".into()).unwrap();
        assert_eq!(c.last_message_preview.as_deref(), Some("Ana: newer"));
    }

    #[test]
    fn unnamed_direct_chats_take_peer_name() {
        let mut list = ConversationList::new();
        list.merge_remote(vec![remote("c", &["me", "u2"])]);
        let directory = UserDirectory::new([profile("u2", "Bo")]);
        list.fill_direct_names(&"me".into(), &directory);
        assert_eq!(list.get(&"c".into()).unwrap().display_name, "Bo");
    }
}
