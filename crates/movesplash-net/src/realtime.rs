//! Realtime channel provider contract.
//!
//! A provider hands out one connection per client identity; a connection
//! hands out named channels. Channels carry ordered history, publish,
//! delete and a live event feed. Status values are the provider's own
//! strings (`"connected"`, `"attached"`, ...) and are exposed through
//! `watch` receivers so callers can mirror them without polling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A message as the provider stores and delivers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelMessage {
    /// Provider-assigned serial, unique within the channel.
    pub serial: String,
    /// Client identity of the publisher, when known.
    pub client_id: Option<String>,
    pub text: Option<String>,
    /// Schema-less sender and attachment metadata.
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// What a client asks the provider to publish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub text: Option<String>,
    pub metadata: Value,
}

/// Live events delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A new or updated message.
    Message(ChannelMessage),
    /// A message was deleted (by its sender, by expiry, or server-side).
    Deleted { serial: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    /// Oldest first.
    Forwards,
    /// Newest first.
    Backwards,
}

/// Bounded history page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub direction: HistoryDirection,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn oldest_first(limit: usize) -> Self {
        Self {
            direction: HistoryDirection::Forwards,
            limit,
        }
    }

    pub fn newest_first(limit: usize) -> Self {
        Self {
            direction: HistoryDirection::Backwards,
            limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live event feed. Events queue up until read, so nothing published after
/// subscribing is lost. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the provider side has gone away.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    /// Open a connection identified by `client_id`.
    async fn connect(&self, client_id: &str) -> Result<Arc<dyn RealtimeConnection>>;
}

#[async_trait]
pub trait RealtimeConnection: Send + Sync {
    /// Acquire the named channel. Repeated calls return the same channel.
    async fn channel(&self, name: &str) -> Result<Arc<dyn RealtimeChannel>>;

    /// Release a previously acquired channel (detach and forget it).
    async fn release(&self, name: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Connection status feed.
    fn status(&self) -> watch::Receiver<String>;
}

#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn attach(&self) -> Result<()>;

    async fn history(&self, query: HistoryQuery) -> Result<Vec<ChannelMessage>>;

    async fn publish(&self, message: OutboundMessage) -> Result<()>;

    async fn subscribe(&self) -> Result<Subscription>;

    /// Delete a message by serial; subscribers observe a
    /// [`ChannelEvent::Deleted`].
    async fn delete(&self, serial: &str) -> Result<()>;

    /// Channel status feed.
    fn status(&self) -> watch::Receiver<String>;
}
