// Realtime pub/sub layer: the provider contract the chat session consumes,
// plus an in-process provider.

pub mod error;
pub mod memory;
pub mod realtime;

pub use error::{RealtimeError, Result};
pub use memory::MemoryHub;
pub use realtime::{
    ChannelEvent, ChannelMessage, HistoryDirection, HistoryQuery, OutboundMessage,
    RealtimeChannel, RealtimeConnection, RealtimeProvider, Subscription,
};
