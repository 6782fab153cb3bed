//! # movesplash-shared
//!
//! Types shared by every MoveSplash crate: identifiers, the canonical chat
//! models, the record normalizer that turns schema-less JSON into those
//! models, and conversation preview helpers.

pub mod constants;
pub mod models;
pub mod normalize;
pub mod preview;
pub mod types;

pub use models::*;
pub use types::{ConversationId, MessageId, UserId};
