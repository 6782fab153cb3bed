//! Bearer-authenticated HTTP client for the chat persistence API.

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use movesplash_shared::{ConversationId, MessageId, UserId};

use crate::api::{envelope_item, envelope_list, NewChat, PersistenceApi};
use crate::error::{Result, StoreError};

/// HTTP implementation of [`PersistenceApi`].
#[derive(Clone)]
pub struct HttpPersistenceClient {
    http_client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl HttpPersistenceClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.movesplash.app/api`
    /// * `access_token` - bearer token sent with every request
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "base url {base_url} cannot carry a path"
            )));
        }
        Ok(Self {
            http_client: reqwest::Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    /// Build an endpoint URL by appending percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("base url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =========================================================================
    // HTTP helpers
    // =========================================================================

    async fn get(&self, url: Url) -> Result<Value> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::json_body(response).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: Url,
        body: &T,
    ) -> Result<Value> {
        let response = self
            .http_client
            .request(method, url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        Self::json_body(response).await
    }

    async fn delete(&self, url: Url) -> Result<()> {
        let response = self
            .http_client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Persistence request failed");
            return Err(StoreError::Api {
                status,
                message: body,
            });
        }
        Ok(response)
    }

    /// Successful bodies that are empty or not JSON read as `null`.
    async fn json_body(response: reqwest::Response) -> Result<Value> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            debug!(error = %e, "Response body is not JSON, treating as empty");
            Value::Null
        }))
    }
}

#[async_trait]
impl PersistenceApi for HttpPersistenceClient {
    async fn create_chat(&self, chat: &NewChat) -> Result<Value> {
        let url = self.endpoint(&["chats"])?;
        debug!(name = %chat.name, members = chat.members.len(), "Creating chat");
        let body = self.send_json(reqwest::Method::POST, url, chat).await?;
        Ok(envelope_item(body, "chat"))
    }

    async fn list_chats(&self, user_id: &UserId) -> Result<Vec<Value>> {
        let url = self.endpoint(&["chats", user_id.as_str()])?;
        let body = self.get(url).await?;
        let chats = envelope_list(body, "chats");
        debug!(user_id = %user_id, count = chats.len(), "Loaded chats");
        Ok(chats)
    }

    async fn list_messages(&self, chat_id: &ConversationId) -> Result<Vec<Value>> {
        let url = self.endpoint(&["messages", chat_id.as_str()])?;
        let body = self.get(url).await?;
        let messages = envelope_list(body, "messages");
        debug!(chat_id = %chat_id, count = messages.len(), "Loaded persisted messages");
        Ok(messages)
    }

    async fn append_message(&self, record: &Value) -> Result<()> {
        let url = self.endpoint(&["messages"])?;
        self.send_json(reqwest::Method::POST, url, record).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &ConversationId, message_id: &MessageId) -> Result<()> {
        let url = self.endpoint(&["messages", chat_id.as_str(), message_id.as_str()])?;
        self.delete(url).await
    }

    async fn star_message(
        &self,
        chat_id: &ConversationId,
        message_id: &MessageId,
        starred: bool,
    ) -> Result<()> {
        let url = self.endpoint(&["messages", chat_id.as_str(), message_id.as_str(), "star"])?;
        self.send_json(reqwest::Method::PUT, url, &json!({ "starred": starred }))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpPersistenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPersistenceClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
