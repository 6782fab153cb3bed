//! Ordered, id-unique message list for the active conversation.

use movesplash_shared::{Message, MessageId};

#[derive(Debug, Clone)]
struct Entry {
    /// Arrival order, breaks timestamp ties.
    seq: u64,
    message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Messages sorted by `(timestamp, arrival)`. Ids are unique.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents wholesale. Input order is the arrival order.
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.entries.clear();
        for message in messages {
            self.upsert(message);
        }
    }

    pub fn upsert(&mut self, message: Message) -> Upsert {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == message.id) {
            entry.message = message;
            self.sort();
            return Upsert::Updated;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { seq, message });
        self.sort();
        Upsert::Inserted
    }

    /// Remove by id. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.entries.iter().position(|e| &e.message.id == id)?;
        Some(self.entries.remove(index).message)
    }

    /// Flip the local star flag, returning the new value.
    pub fn toggle_star(&mut self, id: &MessageId) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| &e.message.id == id)?;
        entry.message.starred = !entry.message.starred;
        Some(entry.message.starred)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.iter().map(|e| &e.message).find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.get(id).is_some()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last().map(|e| &e.message)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.entries.iter_mut().map(|e| &mut e.message)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.message
                .timestamp
                .cmp(&b.message.timestamp)
                .then(a.seq.cmp(&b.seq))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn msg(id: &str, offset_secs: i64) -> Message {
        Message {
            id: id.into(),
            conversation_id: "c".into(),
            sender_id: "u".into(),
            sender_name: "U".into(),
            sender_avatar: String::new(),
            content: Some(id.to_string()),
            attachment: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs),
            ephemeral: None,
            starred: false,
        }
    }

    fn ids(t: &Timeline) -> Vec<String> {
        t.messages().into_iter().map(|m| m.id.0).collect()
    }

    #[test]
    fn sorted_by_timestamp_then_arrival() {
        let mut t = Timeline::new();
        t.upsert(msg("late", 10));
        t.upsert(msg("tie-a", 5));
        t.upsert(msg("early", 1));
        t.upsert(msg("tie-b", 5));
        assert_eq!(ids(&t), ["early", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut t = Timeline::new();
        assert_eq!(t.upsert(msg("a", 1)), Upsert::Inserted);
        let mut edited = msg("a", 1);
        edited.content = Some("edited".into());
        assert_eq!(t.upsert(edited), Upsert::Updated);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&"a".into()).unwrap().content.as_deref(), Some("edited"));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut t = Timeline::new();
        t.upsert(msg("a", 1));
        assert!(t.remove(&"a".into()).is_some());
        assert!(t.remove(&"a".into()).is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn toggle_star_flips_and_reports() {
        let mut t = Timeline::new();
        t.upsert(msg("a", 1));
        assert_eq!(t.toggle_star(&"a".into()), Some(true));
        assert_eq!(t.toggle_star(&"a".into()), Some(false));
        assert_eq!(t.toggle_star(&"missing".into()), None);
    }
}
