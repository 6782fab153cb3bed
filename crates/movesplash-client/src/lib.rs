//! # movesplash-client
//!
//! Chat session core for MoveSplash: joins a conversation's realtime
//! channel, reconciles its history with persistence, keeps the timeline
//! live, expires snaps and sends messages. The presentation layer drives a
//! [`SessionHandle`] and renders the [`SessionView`] it publishes.

pub mod config;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod events;
pub mod expiry;
pub mod mapping;
pub mod merge;
pub mod persist;
pub mod session;
pub mod state;
pub mod timeline;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use directory::UserDirectory;
pub use error::{SendError, SessionError};
pub use events::{Notice, NoticeLevel};
pub use session::{spawn_session, SessionDeps, SessionHandle};
pub use state::{ChannelState, ConnectionState, Draft, DraftAttachment, SessionView, VoiceClip};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("movesplash_client=debug,movesplash_net=info,movesplash_store=info,warn")
    });

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting {} chat client", movesplash_shared::constants::APP_NAME);
    }
}
