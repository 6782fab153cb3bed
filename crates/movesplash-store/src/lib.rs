//! # movesplash-store
//!
//! Remote persistence for MoveSplash chats. The [`PersistenceApi`] trait is
//! the contract the chat session consumes; [`HttpPersistenceClient`] speaks
//! it over bearer-authenticated HTTP. Records cross this boundary as raw
//! JSON and are normalized by the caller.

pub mod api;
pub mod client;
pub mod voice;

mod error;

pub use api::{NewChat, PersistenceApi};
pub use client::HttpPersistenceClient;
pub use error::{Result, StoreError};
pub use voice::{HttpVoiceUploader, UploadedVoice, VoiceUpload, VoiceUploader};
