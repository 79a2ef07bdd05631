//! Slack Web API gateway.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::info;

use crate::config;

pub mod blocks;

const SLACK_API_BASE: &str = "https://slack.com/api/";

/// Address of a posted channel message, used to edit it in place later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// The chat operations the workflow depends on.
#[async_trait]
pub trait SlackService: Send + Sync {
    /// Post to the configured channel (or a thread within it); returns the
    /// address of the new message.
    async fn post_message(
        &self,
        text: &str,
        blocks: Option<&[Value]>,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage>;

    /// Replace the text and blocks of a previously posted message.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: &[Value],
    ) -> Result<()>;

    /// Open a modal on the clicking user's screen.
    async fn open_modal(&self, trigger_id: &str, view: &Value) -> Result<()>;

    /// Resolve a user id to the name operators know each other by.
    async fn display_name(&self, user_id: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    base_url: Url,
    token: String,
    channel_id: String,
}

impl fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn from_config(cfg: &config::Slack) -> Self {
        let base_url = Url::parse(SLACK_API_BASE).expect("valid default Slack URL");
        Self::with_base_url(cfg.bot_token.clone(), cfg.channel_id.clone(), base_url)
    }

    pub fn with_base_url(token: String, channel_id: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("map-approvalbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            token,
            channel_id,
        }
    }

    /// POST a Web API method and return the parsed body after checking both
    /// the HTTP status and Slack's `ok` envelope field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let url = self
            .base_url
            .join(method)
            .context("invalid Slack base URL")?;
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach Slack ({method})"))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("slack {method} error {status}: {body}"));
        }
        let payload: Value = res
            .json()
            .await
            .with_context(|| format!("invalid Slack response JSON ({method})"))?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(anyhow!("slack {method} returned ok=false: {reason}"));
        }
        Ok(payload)
    }
}

#[async_trait]
impl SlackService for SlackClient {
    async fn post_message(
        &self,
        text: &str,
        blocks: Option<&[Value]>,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage> {
        let mut body = json!({
            "channel": self.channel_id,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false,
        });
        if let Some(blocks) = blocks {
            body["blocks"] = Value::Array(blocks.to_vec());
        }
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = Value::String(thread_ts.to_string());
        }
        let payload = self.call("chat.postMessage", &body).await?;
        let channel = payload
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or(&self.channel_id)
            .to_string();
        let ts = payload
            .get("ts")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("chat.postMessage response missing ts"))?
            .to_string();
        info!(%channel, %ts, "posted message to Slack");
        Ok(PostedMessage { channel, ts })
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: &[Value],
    ) -> Result<()> {
        let body = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
            "blocks": blocks,
        });
        self.call("chat.update", &body).await?;
        Ok(())
    }

    async fn open_modal(&self, trigger_id: &str, view: &Value) -> Result<()> {
        let body = json!({
            "trigger_id": trigger_id,
            "view": view,
        });
        self.call("views.open", &body).await?;
        Ok(())
    }

    async fn display_name(&self, user_id: &str) -> Result<String> {
        let body = json!({ "user": user_id });
        let payload = self.call("users.profile.get", &body).await?;
        payload
            .pointer("/profile/display_name_normalized")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                payload
                    .pointer("/profile/real_name_normalized")
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .ok_or_else(|| anyhow!("users.profile.get response missing display name"))
    }
}
