//! Voice clip upload.
//!
//! Clips are posted as base64 data URLs and come back as hosted URLs that a
//! chat message can reference.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// Body of the upload request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpload {
    pub data_url: String,
    pub mime_type: String,
    pub duration: f64,
}

impl VoiceUpload {
    /// Encode raw clip bytes as a `data:` URL.
    pub fn from_bytes(bytes: &[u8], mime_type: &str, duration: f64) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            data_url: format!("data:{mime_type};base64,{encoded}"),
            mime_type: mime_type.to_string(),
            duration,
        }
    }
}

/// Hosted clip returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedVoice {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[async_trait]
pub trait VoiceUploader: Send + Sync {
    async fn upload(&self, clip: &VoiceUpload) -> Result<UploadedVoice>;
}

/// HTTP implementation of [`VoiceUploader`].
#[derive(Clone, Debug)]
pub struct HttpVoiceUploader {
    http_client: reqwest::Client,
    url: String,
    access_token: String,
}

impl HttpVoiceUploader {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url: url.into(),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl VoiceUploader for HttpVoiceUploader {
    async fn upload(&self, clip: &VoiceUpload) -> Result<UploadedVoice> {
        debug!(mime_type = %clip.mime_type, duration = clip.duration, "Uploading voice clip");

        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(clip)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, "Voice upload rejected");
            return Err(StoreError::Api { status, message });
        }

        let body: Value = response.json().await?;
        let record = body.get("voice").cloned().unwrap_or(body);
        let uploaded: UploadedVoice = serde_json::from_value(record)
            .map_err(|e| StoreError::Upload(format!("unexpected upload response: {e}")))?;
        if uploaded.url.is_empty() {
            return Err(StoreError::Upload("upload response has an empty url".into()));
        }
        Ok(uploaded)
    }
}
