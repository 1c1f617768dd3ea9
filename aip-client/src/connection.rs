//! HTTP transport for the AIP client.

use std::time::Duration;

use aip_core::{manifest, AipError, AipResult};
use serde::Serialize;
use serde_json::Value;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider base URL, without the discovery path.
    pub base_url: String,
    pub agent_id: String,
    pub platform: String,
    /// Scopes sent with submissions. `bind` is added automatically on bind.
    pub consent_scope: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        let short_id: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            base_url: manifest::normalize_base_url(base_url.as_ref()).to_string(),
            agent_id: format!("aip-client-{}", short_id),
            platform: "custom".to_string(),
            consent_scope: vec!["intake".to_string(), "offer".to_string()],
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_consent_scope<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consent_scope = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Status and JSON body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    /// `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// JSON-over-HTTP connection to a provider.
#[derive(Debug, Clone)]
pub struct Connection {
    http: reqwest::Client,
}

impl Connection {
    pub fn new(config: &ClientConfig) -> AipResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AipError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    pub async fn get(&self, url: &str) -> AipResult<Reply> {
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AipError::Transport(format!("GET {} failed: {}", url, e)))?;
        Self::read(response).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> AipResult<Reply> {
        tracing::debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AipError::Transport(format!("POST {} failed: {}", url, e)))?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> AipResult<Reply> {
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AipError::Transport(format!("Failed to read response body: {}", e)))?;
        let body = serde_json::from_slice(&bytes).ok();
        Ok(Reply { status, body })
    }
}
