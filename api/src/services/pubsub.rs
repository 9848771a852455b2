//! Message channel between approval and consumption.
//!
//! Delivery is at-least-once: a published `TaskMessage` may reach the
//! consumer more than once.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::gcp_auth::MetadataTokenSource;
use crate::domain::TaskList;

/// Unit of work handed to the creative service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub event_id: String,
    pub task_list: TaskList,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Publish failed: {0}")]
    Publish(String),
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed message: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish a message, returning the channel's message id.
    async fn publish(&self, message: &TaskMessage) -> Result<String, ChannelError>;
}

/// Push-delivery envelope posted to `/consume`.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    pub data: String,
    #[serde(default, rename = "messageId", alias = "message_id")]
    pub message_id: Option<String>,
}

impl PushEnvelope {
    pub fn decode(&self) -> Result<TaskMessage, ChannelError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| ChannelError::Malformed(format!("invalid base64: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ChannelError::Malformed(format!("invalid payload: {}", e)))
    }
}

pub fn encode_message(message: &TaskMessage) -> Result<String, ChannelError> {
    let json = serde_json::to_vec(message).map_err(|e| ChannelError::Publish(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

// ============================================================================
// Google Pub/Sub
// ============================================================================

pub struct PubSubChannel {
    http: reqwest::Client,
    tokens: MetadataTokenSource,
    topic_path: String,
    timeout: Duration,
}

impl PubSubChannel {
    pub fn new(project_id: &str, topic: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::new();
        Self {
            tokens: MetadataTokenSource::new(http.clone()),
            http,
            topic_path: format!("projects/{}/topics/{}", project_id, topic),
            timeout,
        }
    }

    async fn publish_inner(&self, message: &TaskMessage) -> Result<String, ChannelError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| ChannelError::Publish(format!("no access token: {}", e)))?;
        let body = json!({
            "messages": [{
                "data": encode_message(message)?,
                "attributes": { "event_id": message.event_id }
            }]
        });

        let resp = self
            .http
            .post(format!(
                "https://pubsub.googleapis.com/v1/{}:publish",
                self.topic_path
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Publish(e.to_string()))?;

        let status = resp.status();
        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Publish(e.to_string()))?;
        if !status.is_success() {
            return Err(ChannelError::Publish(format!("{}: {}", status, value)));
        }
        value
            .pointer("/messageIds/0")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ChannelError::Publish("no message id returned".into()))
    }
}

#[async_trait]
impl MessageChannel for PubSubChannel {
    async fn publish(&self, message: &TaskMessage) -> Result<String, ChannelError> {
        tokio::time::timeout(self.timeout, self.publish_inner(message))
            .await
            .map_err(|_| ChannelError::Timeout(self.timeout))?
    }
}

// ============================================================================
// In-memory channel
// ============================================================================

/// Records published messages. Can be switched to fail for tests.
#[derive(Default)]
pub struct MemoryChannel {
    published: Mutex<Vec<TaskMessage>>,
    fail: AtomicBool,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let channel = Self::default();
        channel.set_failing(true);
        channel
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<TaskMessage> {
        self.published
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn publish(&self, message: &TaskMessage) -> Result<String, ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Publish("channel unavailable".into()));
        }
        let mut published = self
            .published
            .lock()
            .map_err(|_| ChannelError::Publish("channel lock poisoned".into()))?;
        published.push(message.clone());
        Ok(format!("mock-{}", published.len()))
    }
}
