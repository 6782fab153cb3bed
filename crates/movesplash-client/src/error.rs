use thiserror::Error;

use movesplash_net::RealtimeError;
use movesplash_store::StoreError;

/// Errors surfaced by the chat session outside of sending.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Chat session is closed")]
    Closed,

    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Why a send did not go out. The composer keeps its content in every case.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Nothing to send")]
    EmptyMessage,

    #[error("Still connecting, try again in a moment")]
    NotReady,

    #[error("Voice upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("Message could not be sent: {0}")]
    Publish(#[source] RealtimeError),

    #[error("Chat session is closed")]
    Closed,
}

impl SendError {
    /// Whether pressing send again may succeed without editing the message.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady | Self::Upload(_) | Self::Publish(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_send_errors() {
        assert!(SendError::NotReady.is_retryable());
        assert!(SendError::Publish(RealtimeError::Closed).is_retryable());
        assert!(!SendError::EmptyMessage.is_retryable());
        assert!(!SendError::Closed.is_retryable());
    }
}
