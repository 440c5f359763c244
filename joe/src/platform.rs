//! Platform history/audit API client: an optional collaborator
//! that records finished commands for later review. Disabled entirely
//! when `history_enabled = false`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::CommandRecord;

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    project: &'a str,
    #[serde(rename = "user_id")]
    user_id: &'a str,
    username: &'a str,
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    #[serde(rename = "session_id")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PostCommandResponse {
    pub command_id: String,
    pub command_link: Option<String>,
}

/// The external history/collaboration service. `post_command` is the only
/// call whose response the dispatcher inspects (for `command_link`).
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_session(
        &self,
        project: &str,
        user_id: &str,
        username: &str,
        channel: &str,
    ) -> Result<String, EngineError>;

    async fn post_command(&self, record: &CommandRecord) -> Result<PostCommandResponse, EngineError>;

    async fn post_message(&self, session_id: &str, text: &str) -> Result<(), EngineError>;

    async fn add_artifact(&self, message_id: &str, title: &str, content: &str) -> Result<String, EngineError>;
}

/// `reqwest`-backed Platform client, authenticated via an `Access-Token` header.
pub struct HttpPlatformClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPlatformClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(joe_core::HTTP_TIMEOUT_SECS))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn create_session(
        &self,
        project: &str,
        user_id: &str,
        username: &str,
        channel: &str,
    ) -> Result<String, EngineError> {
        let url = format!("{}/rpc/session", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Access-Token", &self.token)
            .json(&CreateSessionRequest {
                project,
                user_id,
                username,
                channel,
            })
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::History(format!(
                "create_session failed: {}",
                resp.status()
            )));
        }

        let parsed: CreateSessionResponse =
            resp.json().await.map_err(|e| EngineError::History(e.to_string()))?;
        Ok(parsed.session_id)
    }

    async fn post_command(&self, record: &CommandRecord) -> Result<PostCommandResponse, EngineError> {
        let url = format!("{}/rpc/command", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Access-Token", &self.token)
            .json(record)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::History(format!(
                "post_command failed: {}",
                resp.status()
            )));
        }

        resp.json().await.map_err(|e| EngineError::History(e.to_string()))
    }

    async fn post_message(&self, session_id: &str, text: &str) -> Result<(), EngineError> {
        let url = format!("{}/rpc/message", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Access-Token", &self.token)
            .json(&serde_json::json!({ "session_id": session_id, "message": text }))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::History(format!(
                "post_message failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn add_artifact(&self, message_id: &str, title: &str, content: &str) -> Result<String, EngineError> {
        let url = format!("{}/rpc/artifact", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Access-Token", &self.token)
            .json(&serde_json::json!({
                "message_id": message_id,
                "title": title,
                "content": content,
            }))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::History(format!(
                "add_artifact failed: {}",
                resp.status()
            )));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| EngineError::History(e.to_string()))?;
        body.get("link")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| EngineError::History("add_artifact response missing link".into()))
    }
}
