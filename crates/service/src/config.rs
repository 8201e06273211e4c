use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use common::discovery::{CredentialVars, StaticNode, DEFAULT_DOCKER_HOST};
use common::pool::{PoolConfig, DEFAULT_REFRESH_INTERVAL};
use storage::DEFAULT_PRESIGN_EXPIRY;

/// Maximum object size in bytes (500 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 500 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_NODE_PORT: u16 = 9000;

/// Where the node set comes from.
#[derive(Debug, Clone)]
pub enum DiscoveryConfig {
    /// Running containers on a Docker network
    Docker {
        /// engine endpoint, `tcp://host:port`
        docker_host: String,
        /// network shared by the gateway and the nodes
        network: String,
        /// port the nodes' object API listens on
        node_port: u16,
    },
    /// A fixed node list
    Static { nodes: Vec<StaticNode> },
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::Docker {
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            network: "amazin-object-storage".to_string(),
            node_port: DEFAULT_NODE_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address for the object API to listen on.
    ///  defaults to 0.0.0.0:3000
    pub listen_addr: SocketAddr,
    /// per-request timeout, covering the proxied read
    pub request_timeout: Duration,
    /// largest accepted object body
    pub max_payload_bytes: u64,

    // node configuration
    pub discovery: DiscoveryConfig,
    /// bucket every node stores objects in
    pub bucket: String,
    /// container name filter used by discovery
    pub node_pattern: String,
    /// environment variables holding each node's credentials
    pub credential_vars: CredentialVars,
    pub refresh_interval: Duration,
    /// lifetime of presigned read URLs
    pub presign_expiry: Duration,

    // misc
    pub log_level: tracing::Level,
    /// directory for daily rolling log files,
    ///  if not set then logs only go to stdout
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 3000),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            discovery: DiscoveryConfig::default(),
            bucket: "objects".to_string(),
            node_pattern: "amazin-object-storage-node".to_string(),
            credential_vars: CredentialVars::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            bucket: self.bucket.clone(),
            pattern: self.node_pattern.clone(),
            credential_vars: self.credential_vars.clone(),
            refresh_interval: self.refresh_interval,
            presign_expiry: self.presign_expiry,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket name is empty".into()));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid("refresh interval must be positive".into()));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("max payload size must be positive".into()));
        }
        if let DiscoveryConfig::Static { nodes } = &self.discovery {
            if nodes.is_empty() {
                return Err(ConfigError::Invalid(
                    "static discovery needs at least one node".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.pool_config().presign_expiry, Duration::from_secs(300));
    }

    #[test]
    fn test_rejects_empty_static_list() {
        let config = Config {
            discovery: DiscoveryConfig::Static { nodes: vec![] },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
