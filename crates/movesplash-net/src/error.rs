use thiserror::Error;

/// Errors surfaced by a realtime provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    /// Opening the connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A channel operation (attach, history, release) failed.
    #[error("Channel {channel} error: {reason}")]
    Channel { channel: String, reason: String },

    /// The provider rejected a publish.
    #[error("Publish rejected: {0}")]
    Publish(String),

    /// The provider rejected a delete.
    #[error("Delete rejected: {0}")]
    Delete(String),

    /// The connection has been closed.
    #[error("Connection closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RealtimeError>;
