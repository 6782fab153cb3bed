//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so a development build starts with zero
//! configuration.

use movesplash_shared::constants::{DEFAULT_SNAP_TTL_SECS, HISTORY_PAGE_LIMIT};
use movesplash_store::{HttpPersistenceClient, HttpVoiceUploader, StoreError};

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the persistence API.
    /// Env: `MOVESPLASH_API_URL`
    /// Default: `http://localhost:3000/api`
    pub api_url: String,

    /// Bearer token for the persistence and upload APIs.
    /// Env: `MOVESPLASH_API_TOKEN`
    /// Default: empty.
    pub api_token: String,

    /// Voice clip upload endpoint.
    /// Env: `MOVESPLASH_VOICE_UPLOAD_URL`
    /// Default: `<api_url>/voice`
    pub voice_upload_url: String,

    /// Realtime history page size fetched on join.
    /// Env: `MOVESPLASH_HISTORY_LIMIT`
    /// Default: `50`
    pub history_limit: usize,

    /// Snap lifetime when the composer does not pick one.
    /// Env: `MOVESPLASH_SNAP_TTL_SECS`
    /// Default: `10`
    pub snap_ttl_secs: u64,

    /// Capacity of the session command queue.
    /// Env: `MOVESPLASH_COMMAND_BUFFER`
    /// Default: `64`
    pub command_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api_url = "http://localhost:3000/api".to_string();
        Self {
            voice_upload_url: format!("{api_url}/voice"),
            api_url,
            api_token: String::new(),
            history_limit: HISTORY_PAGE_LIMIT,
            snap_ttl_secs: DEFAULT_SNAP_TTL_SECS,
            command_buffer: 64,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("MOVESPLASH_API_URL") {
            let url = url.trim_end_matches('/').to_string();
            config.voice_upload_url = format!("{url}/voice");
            config.api_url = url;
        }

        if let Some(token) = lookup("MOVESPLASH_API_TOKEN") {
            config.api_token = token;
        }

        if let Some(url) = lookup("MOVESPLASH_VOICE_UPLOAD_URL") {
            config.voice_upload_url = url;
        }

        if let Some(val) = lookup("MOVESPLASH_HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => tracing::warn!(value = %val, "Invalid MOVESPLASH_HISTORY_LIMIT, using default"),
            }
        }

        if let Some(val) = lookup("MOVESPLASH_SNAP_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.snap_ttl_secs = n,
                _ => tracing::warn!(value = %val, "Invalid MOVESPLASH_SNAP_TTL_SECS, using default"),
            }
        }

        if let Some(val) = lookup("MOVESPLASH_COMMAND_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.command_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid MOVESPLASH_COMMAND_BUFFER, using default"),
            }
        }

        config
    }

    pub fn persistence_client(&self) -> Result<HttpPersistenceClient, StoreError> {
        HttpPersistenceClient::new(&self.api_url, self.api_token.clone())
    }

    pub fn voice_uploader(&self) -> HttpVoiceUploader {
        HttpVoiceUploader::new(self.voice_upload_url.clone(), self.api_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.snap_ttl_secs, 10);
        assert_eq!(config.voice_upload_url, "http://localhost:3000/api/voice");
    }

    #[test]
    fn test_api_url_drives_voice_url() {
        let config = ClientConfig::from_lookup(lookup(&[("MOVESPLASH_API_URL", "https://x.dev/api/")]));
        assert_eq!(config.api_url, "https://x.dev/api");
        assert_eq!(config.voice_upload_url, "https://x.dev/api/voice");

        let config = ClientConfig::from_lookup(lookup(&[
            ("MOVESPLASH_API_URL", "https://x.dev/api"),
            ("MOVESPLASH_VOICE_UPLOAD_URL", "https://media.x.dev/up"),
        ]));
        assert_eq!(config.voice_upload_url, "https://media.x.dev/up");
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("MOVESPLASH_HISTORY_LIMIT", "zero"),
            ("MOVESPLASH_SNAP_TTL_SECS", "0"),
            ("MOVESPLASH_COMMAND_BUFFER", "8"),
        ]));
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.snap_ttl_secs, 10);
        assert_eq!(config.command_buffer, 8);
    }

    #[test]
    fn test_persistence_client_requires_valid_url() {
        let config = ClientConfig::from_lookup(lookup(&[("MOVESPLASH_API_URL", "nonsense")]));
        assert!(config.persistence_client().is_err());
        assert!(ClientConfig::default().persistence_client().is_ok());
    }
}
