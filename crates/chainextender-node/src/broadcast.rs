//! Publisher for a Centrifugo-compatible HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use chainextender_core::broadcast::Broadcaster;
use chainextender_core::error::ExtenderError;

use crate::error::NodeError;

#[derive(Serialize)]
struct PublishCommand<'a> {
    method: &'static str,
    params: PublishParams<'a>,
}

#[derive(Serialize)]
struct PublishParams<'a> {
    channel: &'a str,
    data: &'a Value,
}

/// Publishes each message with a single `publish` command.
pub struct CentrifugoBroadcaster {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl CentrifugoBroadcaster {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NodeError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            api_key: api_key.into(),
            http,
        })
    }

    async fn send(&self, channel: &str, data: &Value) -> Result<(), NodeError> {
        let command = PublishCommand {
            method: "publish",
            params: PublishParams { channel, data },
        };
        let resp = self
            .http
            .post(&self.url)
            .header("Authorization", format!("apikey {}", self.api_key))
            .json(&command)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NodeError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for CentrifugoBroadcaster {
    async fn publish(&self, channel: &str, data: &Value) -> Result<(), ExtenderError> {
        self.send(channel, data).await.map_err(ExtenderError::from)
    }
}
