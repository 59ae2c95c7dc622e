//! Order hub HTTP client with a cached bearer token.

use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use switchboard_core::config::HubConfig;

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Authenticated client for the order-management API.
pub struct HubClient {
    api_url: String,
    email: String,
    password: String,
    page_limit: u32,
    token_ttl: Duration,
    client: Client,
    token: RwLock<Option<CachedToken>>,
}

impl HubClient {
    /// Build a client; fails when the URL or credentials are missing.
    pub fn from_config(config: &HubConfig) -> anyhow::Result<Self> {
        if config.api_url.is_empty() {
            anyhow::bail!("HUB_API_URL is required (hub.apiUrl in config)");
        }
        if config.user_email.is_empty() || config.user_password.is_empty() {
            anyhow::bail!(
                "HUB_USER_EMAIL and HUB_USER_PASSWORD are required (hub.userEmail / hub.userPassword in config)"
            );
        }
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            email: config.user_email.clone(),
            password: config.user_password.clone(),
            page_limit: config.page_limit.max(1),
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            client: Client::new(),
            token: RwLock::new(None),
        })
    }

    /// Orders fetched per list call.
    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    /// `GET {api_url}{path}` with bearer auth.
    ///
    /// An empty body (or 404) yields `Value::Null`. A 401 drops the cached
    /// token and retries once with a fresh one.
    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.api_url, path);
        let mut retried = false;
        loop {
            let token = self.token().await?;
            debug!(url = %url, params = query.len(), "hub request");
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await
                .with_context(|| format!("Hub request to {path} failed"))?;

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!(path, "hub token rejected, re-authenticating");
                self.invalidate().await;
                retried = true;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Ok(Value::Null);
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Hub API returned {status}: {body}");
            }
            let body = resp
                .text()
                .await
                .with_context(|| format!("Failed to read hub response from {path}"))?;
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .with_context(|| format!("Failed to parse hub response from {path}"));
        }
    }

    /// Forget the cached token.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    async fn token(&self) -> anyhow::Result<String> {
        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.fetched_at.elapsed() < self.token_ttl {
                return Ok(cached.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.token_ttl {
                return Ok(cached.value.clone());
            }
        }
        let value = self.authenticate().await?;
        *slot = Some(CachedToken {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    async fn authenticate(&self) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/api/auth/token", self.api_url))
            .json(&json!({ "email": self.email, "password": self.password }))
            .send()
            .await
            .context("Authentication request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Authentication failed: {status} - {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse authentication response")?;
        let token = body["data"]["token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("No token received in authentication response"))?;

        info!("obtained hub authorization token");
        Ok(token.to_string())
    }
}
