//! Configuration for canopy-control.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP API server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// State store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Message relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Worker launch configuration.
    #[serde(default)]
    pub launch: LaunchConfig,

    /// Status consumer configuration.
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `control.toml` in the current directory (if present)
    /// 3. Environment variables with `CANOPY_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file("control.toml"))
            .merge(Env::prefixed("CANOPY_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9000)
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
    /// (single node only).
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

/// Message relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Valkey/Redis URL. When unset, the in-memory relay is used (single
    /// node only).
    #[serde(default)]
    pub url: Option<String>,

    /// Publisher connection pool size.
    #[serde(default = "default_relay_pool_size")]
    pub pool_size: usize,
}

const fn default_relay_pool_size() -> usize {
    8
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_relay_pool_size(),
        }
    }
}

/// Worker launch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchConfig {
    /// Build worker container image.
    #[serde(default = "default_worker_image")]
    pub worker_image: String,

    /// Zone suffix appended to subdomains to form routable URLs.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Task-launch service endpoint. When unset, launches are expected to
    /// be wired to an in-process launcher (tests, development).
    #[serde(default)]
    pub task_endpoint: Option<String>,

    /// Task-start request timeout in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Additional environment injected into every worker, e.g. relay and
    /// artifact store endpoints and credentials.
    #[serde(default)]
    pub worker_env: BTreeMap<String, String>,
}

fn default_worker_image() -> String {
    "canopy/builder:latest".to_owned()
}

fn default_zone() -> String {
    "canopy.localhost:8000".to_owned()
}

const fn default_task_timeout_secs() -> u64 {
    10
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            worker_image: default_worker_image(),
            zone: default_zone(),
            task_endpoint: None,
            task_timeout_secs: default_task_timeout_secs(),
            worker_env: BTreeMap::new(),
        }
    }
}

/// Status consumer retry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Maximum store-write attempts per event before the transition is
    /// logged as lost.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Base backoff between attempts in milliseconds; doubles per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

const fn default_retry_budget() -> u32 {
    5
}

const fn default_backoff_base_ms() -> u64 {
    100
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = ControlConfig::default();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert!(config.database.url.is_none());
        assert_eq!(config.consumer.retry_budget, 5);
        assert_eq!(config.launch.zone, "canopy.localhost:8000");
    }
}
