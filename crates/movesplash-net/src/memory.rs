//! In-process realtime provider.
//!
//! [`MemoryHub`] implements the full provider contract inside one process:
//! serials, retained history, fan-out to every subscriber (including the
//! publisher, so self-echo works), soft deletes and status feeds. It backs
//! local development builds and the session controller tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{RealtimeError, Result};
use crate::realtime::{
    ChannelEvent, ChannelMessage, HistoryDirection, HistoryQuery, OutboundMessage,
    RealtimeChannel, RealtimeConnection, RealtimeProvider, Subscription,
};

// ---------------------------------------------------------------------------
// Hub state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChannelSlot {
    history: Vec<ChannelMessage>,
    /// (subscribing client id, sender)
    subscribers: Vec<(String, mpsc::UnboundedSender<ChannelEvent>)>,
}

impl ChannelSlot {
    fn fan_out(&mut self, event: &ChannelEvent) {
        self.subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}

#[derive(Default)]
struct HubState {
    channels: HashMap<String, ChannelSlot>,
    next_serial: u64,
    offline: bool,
    reject_publish: bool,
    connected: HashSet<String>,
    /// (client id, channel name)
    attached: HashSet<(String, String)>,
}

impl HubState {
    fn next_serial(&mut self) -> String {
        self.next_serial += 1;
        format!("{:012}", self.next_serial)
    }
}

/// Shared in-process pub/sub hub. Cloning yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While offline, new connections are refused.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// While set, every publish is rejected.
    pub fn set_reject_publish(&self, reject: bool) {
        self.state().reject_publish = reject;
    }

    /// Publish on behalf of another participant, fanning out to subscribers.
    pub fn publish_as(
        &self,
        channel: &str,
        client_id: &str,
        message: OutboundMessage,
    ) -> ChannelMessage {
        let mut state = self.state();
        let stored = ChannelMessage {
            serial: state.next_serial(),
            client_id: Some(client_id.to_string()),
            text: message.text,
            metadata: message.metadata,
            timestamp: Utc::now(),
        };
        let slot = state.channels.entry(channel.to_string()).or_default();
        slot.history.push(stored.clone());
        slot.fan_out(&ChannelEvent::Message(stored.clone()));
        stored
    }

    /// Place a message in retained history without notifying anyone, as if
    /// it had been published before any current subscriber existed.
    pub fn seed(&self, channel: &str, message: ChannelMessage) {
        let mut state = self.state();
        let slot = state.channels.entry(channel.to_string()).or_default();
        slot.history.push(message);
        slot.history.sort_by_key(|m| m.timestamp);
    }

    /// Deliver a provider-side event (for example a server-side soft delete)
    /// to current subscribers.
    pub fn inject(&self, channel: &str, event: ChannelEvent) {
        let mut state = self.state();
        let slot = state.channels.entry(channel.to_string()).or_default();
        if let ChannelEvent::Deleted { serial } = &event {
            slot.history.retain(|m| &m.serial != serial);
        }
        slot.fan_out(&event);
    }

    pub fn history_len(&self, channel: &str) -> usize {
        self.state()
            .channels
            .get(channel)
            .map_or(0, |slot| slot.history.len())
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state().connected.contains(client_id)
    }

    pub fn is_attached(&self, client_id: &str, channel: &str) -> bool {
        self.state()
            .attached
            .contains(&(client_id.to_string(), channel.to_string()))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state().channels.get_mut(channel).map_or(0, |slot| {
            slot.subscribers.retain(|(_, tx)| !tx.is_closed());
            slot.subscribers.len()
        })
    }

    fn detach(&self, client_id: &str, channel: &str) {
        let mut state = self.state();
        state
            .attached
            .remove(&(client_id.to_string(), channel.to_string()));
        if let Some(slot) = state.channels.get_mut(channel) {
            slot.subscribers.retain(|(owner, _)| owner != client_id);
        }
    }
}

#[async_trait]
impl RealtimeProvider for MemoryHub {
    async fn connect(&self, client_id: &str) -> Result<Arc<dyn RealtimeConnection>> {
        {
            let mut state = self.state();
            if state.offline {
                warn!(client_id, "Hub offline, refusing connection");
                return Err(RealtimeError::Connection("hub is offline".into()));
            }
            state.connected.insert(client_id.to_string());
        }

        info!(client_id, "Memory hub connection opened");
        let (status, _) = watch::channel("connected".to_string());
        Ok(Arc::new(MemoryConnection {
            hub: self.clone(),
            client_id: client_id.to_string(),
            status,
            channels: Mutex::new(HashMap::new()),
        }))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

struct MemoryConnection {
    hub: MemoryHub,
    client_id: String,
    status: watch::Sender<String>,
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
}

impl MemoryConnection {
    fn is_closed(&self) -> bool {
        self.status.borrow().as_str() == "closed"
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Arc<MemoryChannel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RealtimeConnection for MemoryConnection {
    async fn channel(&self, name: &str) -> Result<Arc<dyn RealtimeChannel>> {
        if self.is_closed() {
            return Err(RealtimeError::Closed);
        }

        let channel: Arc<dyn RealtimeChannel> = self
            .channels()
            .entry(name.to_string())
            .or_insert_with(|| {
                let (status, _) = watch::channel("initialized".to_string());
                Arc::new(MemoryChannel {
                    hub: self.hub.clone(),
                    name: name.to_string(),
                    client_id: self.client_id.clone(),
                    status,
                })
            })
            .clone();
        Ok(channel)
    }

    async fn release(&self, name: &str) -> Result<()> {
        let Some(channel) = self.channels().remove(name) else {
            return Err(RealtimeError::Channel {
                channel: name.to_string(),
                reason: "not acquired".into(),
            });
        };
        self.hub.detach(&self.client_id, name);
        channel.status.send_replace("detached".to_string());
        debug!(client_id = %self.client_id, channel = name, "Channel released");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let channels: Vec<Arc<MemoryChannel>> = self.channels().drain().map(|(_, c)| c).collect();
        for channel in channels {
            self.hub.detach(&self.client_id, &channel.name);
            channel.status.send_replace("detached".to_string());
        }
        self.hub.state().connected.remove(&self.client_id);
        self.status.send_replace("closed".to_string());
        info!(client_id = %self.client_id, "Memory hub connection closed");
        Ok(())
    }

    fn status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct MemoryChannel {
    hub: MemoryHub,
    name: String,
    client_id: String,
    status: watch::Sender<String>,
}

impl MemoryChannel {
    fn ensure_usable(&self) -> Result<()> {
        if self.status.borrow().as_str() == "detached" {
            return Err(RealtimeError::Channel {
                channel: self.name.clone(),
                reason: "channel was released".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attach(&self) -> Result<()> {
        self.ensure_usable()?;
        self.hub
            .state()
            .attached
            .insert((self.client_id.clone(), self.name.clone()));
        self.status.send_replace("attached".to_string());
        Ok(())
    }

    async fn history(&self, query: HistoryQuery) -> Result<Vec<ChannelMessage>> {
        self.ensure_usable()?;
        let state = self.hub.state();
        let Some(slot) = state.channels.get(&self.name) else {
            return Ok(Vec::new());
        };
        let page: Vec<ChannelMessage> = match query.direction {
            HistoryDirection::Forwards => slot.history.iter().take(query.limit).cloned().collect(),
            HistoryDirection::Backwards => slot
                .history
                .iter()
                .rev()
                .take(query.limit)
                .cloned()
                .collect(),
        };
        Ok(page)
    }

    async fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.ensure_usable()?;
        if self.hub.state().reject_publish {
            return Err(RealtimeError::Publish("publish rejected by hub".into()));
        }
        let stored = self.hub.publish_as(&self.name, &self.client_id, message);
        debug!(channel = %self.name, serial = %stored.serial, "Published");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        self.ensure_usable()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .state()
            .channels
            .entry(self.name.clone())
            .or_default()
            .subscribers
            .push((self.client_id.clone(), tx));
        Ok(Subscription::new(rx))
    }

    async fn delete(&self, serial: &str) -> Result<()> {
        self.ensure_usable()?;
        let mut state = self.hub.state();
        let slot = state.channels.entry(self.name.clone()).or_default();
        let before = slot.history.len();
        slot.history.retain(|m| m.serial != serial);
        if slot.history.len() == before {
            return Err(RealtimeError::Delete(format!("unknown serial {serial}")));
        }
        slot.fan_out(&ChannelEvent::Deleted {
            serial: serial.to_string(),
        });
        Ok(())
    }

    fn status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }
}

/// Build a retained-history message with an explicit timestamp.
pub fn historical_message(
    serial: &str,
    client_id: &str,
    text: &str,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
) -> ChannelMessage {
    ChannelMessage {
        serial: serial.to_string(),
        client_id: Some(client_id.to_string()),
        text: Some(text.to_string()),
        metadata,
        timestamp,
    }
}
