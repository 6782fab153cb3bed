//! Per-message expiry timers for snaps.
//!
//! Each timer is a sleeping task that reports back through a channel. A
//! fire carries the token it was armed with; re-arming or cancelling a
//! message invalidates older tokens, so a fire that raced a cancel is
//! recognised and dropped by [`ExpiryScheduler::take_fired`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use movesplash_shared::MessageId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryFired {
    pub id: MessageId,
    pub token: u64,
}

struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

pub struct ExpiryScheduler {
    timers: HashMap<MessageId, Timer>,
    next_token: u64,
    fired_tx: mpsc::UnboundedSender<ExpiryFired>,
}

impl ExpiryScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExpiryFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: HashMap::new(),
            next_token: 0,
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Arm (or re-arm) the timer for `id`. Must run inside a tokio runtime.
    pub fn schedule(&mut self, id: MessageId, after: Duration) -> u64 {
        self.cancel(&id);

        self.next_token += 1;
        let token = self.next_token;
        let tx = self.fired_tx.clone();
        let fired = ExpiryFired {
            id: id.clone(),
            token,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(fired);
        });

        trace!(message_id = %id, ?after, token, "Expiry armed");
        self.timers.insert(id, Timer { token, handle });
        token
    }

    pub fn cancel(&mut self, id: &MessageId) -> bool {
        match self.timers.remove(id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    /// Accept a fire if it belongs to the currently armed timer.
    pub fn take_fired(&mut self, fired: &ExpiryFired) -> bool {
        match self.timers.get(&fired.id) {
            Some(timer) if timer.token == fired.token => {
                self.timers.remove(&fired.id);
                true
            }
            _ => false,
        }
    }

    pub fn is_scheduled(&self, id: &MessageId) -> bool {
        self.timers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Time a snap created at `created_at` still has to live, clamped at zero.
///
/// A lifetime too long to land on the calendar is counted from now instead.
pub fn remaining_lifetime(created_at: DateTime<Utc>, ttl_secs: u64, now: DateTime<Utc>) -> Duration {
    let deadline = i64::try_from(ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| created_at.checked_add_signed(ttl));
    match deadline {
        Some(deadline) => (deadline - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(ttl_secs),
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (mut sched, mut rx) = ExpiryScheduler::new();
        let token = sched.schedule("m1".into(), Duration::from_secs(5));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, ExpiryFired { id: "m1".into(), token });
        assert!(sched.take_fired(&fired));
        assert!(!sched.is_scheduled(&"m1".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut sched, mut rx) = ExpiryScheduler::new();
        sched.schedule("m1".into(), Duration::from_secs(5));
        assert!(sched.cancel(&"m1".into()));
        assert!(!sched.cancel(&"m1".into()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_invalidates_previous_token() {
        let (mut sched, _rx) = ExpiryScheduler::new();
        let old = sched.schedule("m1".into(), Duration::from_secs(5));
        let new = sched.schedule("m1".into(), Duration::from_secs(5));
        assert_ne!(old, new);
        assert_eq!(sched.len(), 1);

        let stale = ExpiryFired { id: "m1".into(), token: old };
        assert!(!sched.take_fired(&stale));
        assert!(sched.is_scheduled(&"m1".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_everything() {
        let (mut sched, mut rx) = ExpiryScheduler::new();
        sched.schedule("a".into(), Duration::from_secs(1));
        sched.schedule("b".into(), Duration::from_secs(2));
        assert_eq!(sched.cancel_all(), 2);
        assert!(sched.is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remaining_lifetime_counts_from_creation() {
        let now = Utc::now();
        let created = now - chrono::Duration::seconds(10);
        assert_eq!(remaining_lifetime(created, 30, now), Duration::from_secs(20));
        assert_eq!(remaining_lifetime(created, 5, now), Duration::ZERO);
        assert_eq!(remaining_lifetime(now, 0, now), Duration::ZERO);
    }

    #[test]
    fn oversized_lifetime_is_counted_from_now() {
        let now = Utc::now();
        let huge = 10_000_000_000_000;
        assert_eq!(remaining_lifetime(now, huge, now), Duration::from_secs(huge));
        assert_eq!(remaining_lifetime(now, u64::MAX, now), Duration::from_secs(u64::MAX));
    }
}
