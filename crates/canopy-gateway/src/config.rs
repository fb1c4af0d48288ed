//! Configuration for canopy-gateway.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::GatewayError;

/// Top-level configuration for the request router.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GatewayConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// State store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Artifact origin configuration.
    #[serde(default)]
    pub origin: OriginConfig,
}

impl GatewayConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `gateway.toml` in the current directory (if present)
    /// 3. Environment variables with `CANOPY_GATEWAY_` prefix
    pub fn load() -> Result<Self, GatewayError> {
        Figment::new()
            .merge(Toml::file("gateway.toml"))
            .merge(Env::prefixed("CANOPY_GATEWAY_").split("__"))
            .extract()
            .map_err(|e| GatewayError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the router listens on. Subdomain URLs handed out by the
    /// control service point at this port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// State store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. When unset, the in-memory store is used
    /// (single node only, development).
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Artifact origin configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    /// Base URL of the artifact store that serves build outputs.
    #[serde(default = "default_origin_url")]
    pub url: String,

    /// Per-request timeout towards the origin in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl OriginConfig {
    /// The origin request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_origin_url() -> String {
    "http://127.0.0.1:9100".to_owned()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: default_origin_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8000);
        assert!(config.database.url.is_none());
        assert_eq!(config.origin.request_timeout(), Duration::from_secs(30));
    }
}
