//! Server configuration for AIP providers.

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use aip_core::{ProviderInfo, AIP_VERSION};
use chrono::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Public URL agents reach this provider at; endpoints derive from it.
    pub base_url: String,
    /// Identity advertised in the manifest.
    pub provider: ProviderInfo,
    pub aip_version: String,
    /// Default offer lifetime.
    pub offer_ttl: Duration,
    /// How often abandoned offers are purged.
    pub sweep_interval: StdDuration,
    /// Max request body size in bytes.
    pub max_body_size: usize,
    /// Bind fields for intakes that don't name their own.
    pub default_bind_requires: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            base_url: "http://localhost:3000".to_string(),
            provider: ProviderInfo::new("AIP Provider", "http://localhost:3000"),
            aip_version: AIP_VERSION.to_string(),
            offer_ttl: Duration::days(7),
            sweep_interval: StdDuration::from_secs(60),
            max_body_size: 1024 * 1024, // 1MB
            default_bind_requires: vec!["email".to_string(), "full_name".to_string()],
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address.
    pub fn with_addr(addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_offer_ttl(mut self, ttl: Duration) -> Self {
        self.offer_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: StdDuration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn with_default_bind_requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_bind_requires = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.offer_ttl, Duration::days(7));
        assert_eq!(config.default_bind_requires, ["email", "full_name"]);
        assert_eq!(config.aip_version, AIP_VERSION);
    }

    #[test]
    fn builders_override_fields() {
        let config = ServerConfig::with_addr(([0, 0, 0, 0], 8080))
            .with_base_url("https://intake.example.com")
            .with_offer_ttl(Duration::days(3))
            .with_default_bind_requires(["email"]);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.base_url, "https://intake.example.com");
        assert_eq!(config.offer_ttl, Duration::days(3));
        assert_eq!(config.default_bind_requires, ["email"]);
    }
}
