//! Forms backend gateway (Gravity Forms REST v2).
//!
//! The backend is the sole owner of entry state: every workflow transition
//! re-fetches the entry it is about to act on instead of trusting anything
//! previously rendered into chat.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use tracing::info;

use crate::config;
use crate::model::FieldMap;

/// Search filter matching entries still waiting for operator approval.
const UNAPPROVED_FILTER: &str =
    r#"{"field_filters": [{"key":"is_approved","value":3,"operator":"="}]}"#;

/// The record operations the workflow depends on. Update and trash report
/// success as a bool (HTTP 200), mirroring the backend's own contract;
/// transport-level failures are errors.
#[async_trait]
pub trait FormsService: Send + Sync {
    async fn fetch_entry(&self, entry_id: &str) -> Result<FieldMap>;
    async fn update_entry(&self, entry_id: &str, fields: &FieldMap) -> Result<bool>;
    async fn trash_entry(&self, entry_id: &str) -> Result<bool>;
    async fn unapproved_count(&self, form_id: &str) -> Result<u64>;
}

#[derive(Clone)]
pub struct FormsClient {
    http: Client,
    base_url: Url,
    key: String,
    secret: String,
}

impl fmt::Debug for FormsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FormsClient {
    pub fn from_config(cfg: &config::Forms) -> Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid forms base URL: {}", cfg.base_url))?;
        Ok(Self::with_base_url(
            cfg.key.clone(),
            cfg.secret.clone(),
            base_url,
        ))
    }

    pub fn with_base_url(key: String, secret: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("map-approvalbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            key,
            secret,
        }
    }

    fn entry_url(&self, entry_id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("wp-json/gf/v2/entries/{entry_id}"))
            .context("invalid forms base URL")
    }

    /// The backend serves JSON with a UTF-8 BOM; tolerate it.
    fn parse_body(body: &str) -> Result<Value> {
        let trimmed = body.trim_start_matches('\u{feff}');
        serde_json::from_str(trimmed).context("invalid forms response JSON")
    }
}

#[async_trait]
impl FormsService for FormsClient {
    async fn fetch_entry(&self, entry_id: &str) -> Result<FieldMap> {
        let res = self
            .http
            .get(self.entry_url(entry_id)?)
            .basic_auth(&self.key, Some(&self.secret))
            .send()
            .await
            .context("failed to reach forms backend")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("forms fetch entry {entry_id} error {status}: {body}"));
        }
        let body = res.text().await.context("failed to read forms response")?;
        match Self::parse_body(&body)? {
            Value::Object(map) => Ok(map),
            other => Err(anyhow!(
                "forms entry {entry_id} is not a JSON object: {other}"
            )),
        }
    }

    async fn update_entry(&self, entry_id: &str, fields: &FieldMap) -> Result<bool> {
        let res = self
            .http
            .put(self.entry_url(entry_id)?)
            .basic_auth(&self.key, Some(&self.secret))
            .json(fields)
            .send()
            .await
            .context("failed to reach forms backend")?;
        info!(entry_id, status = %res.status(), "updated forms entry");
        Ok(res.status() == StatusCode::OK)
    }

    async fn trash_entry(&self, entry_id: &str) -> Result<bool> {
        let res = self
            .http
            .delete(self.entry_url(entry_id)?)
            .basic_auth(&self.key, Some(&self.secret))
            .send()
            .await
            .context("failed to reach forms backend")?;
        info!(entry_id, status = %res.status(), "trashed forms entry");
        Ok(res.status() == StatusCode::OK)
    }

    async fn unapproved_count(&self, form_id: &str) -> Result<u64> {
        let url = self
            .base_url
            .join(&format!("wp-json/gf/v2/forms/{form_id}/entries"))
            .context("invalid forms base URL")?;
        let res = self
            .http
            .get(url)
            .query(&[("search", UNAPPROVED_FILTER)])
            .basic_auth(&self.key, Some(&self.secret))
            .send()
            .await
            .context("failed to reach forms backend")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "forms unapproved count for form {form_id} error {status}: {body}"
            ));
        }
        let body = res.text().await.context("failed to read forms response")?;
        let payload = Self::parse_body(&body)?;
        match payload.get("total_count") {
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| anyhow!("negative total_count in forms response")),
            Some(Value::String(s)) => s
                .parse::<u64>()
                .with_context(|| format!("unparseable total_count '{s}'")),
            _ => Err(anyhow!("forms response missing total_count")),
        }
    }
}
