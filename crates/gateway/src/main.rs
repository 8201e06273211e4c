//! shardgate - one HTTP object endpoint over many independent MinIO nodes
//!
//! Object ids are hashed onto the live node set, which is rediscovered on a
//! fixed interval. Every option can also be given through the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use common::discovery::{CredentialVars, StaticNode, DEFAULT_DOCKER_HOST};
use service::config::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_NODE_PORT};
use service::{Config, DiscoveryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiscoveryMode {
    /// Running containers on a Docker network
    Docker,
    /// The nodes given with --node
    Static,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on for HTTP requests
    #[arg(short, long, env = "SHARDGATE_PORT", default_value_t = 3000)]
    port: u16,

    /// Bucket every node stores objects in
    #[arg(long, env = "SHARDGATE_BUCKET", default_value = "objects")]
    bucket: String,

    /// How storage nodes are discovered
    #[arg(long, env = "SHARDGATE_DISCOVERY", value_enum, default_value_t = DiscoveryMode::Docker)]
    discovery: DiscoveryMode,

    /// Container name filter for storage nodes
    #[arg(long, env = "SHARDGATE_NODE_PATTERN", default_value = "amazin-object-storage-node")]
    node_pattern: String,

    /// Docker Engine endpoint (tcp://host:port)
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    docker_host: String,

    /// Docker network shared by the gateway and the nodes
    #[arg(long, env = "SHARDGATE_NETWORK", default_value = "amazin-object-storage")]
    network: String,

    /// Port the nodes' object API listens on
    #[arg(long, env = "SHARDGATE_NODE_PORT", default_value_t = DEFAULT_NODE_PORT)]
    node_port: u16,

    /// Static node, host:port or host:port=access_key:secret_key (repeatable)
    #[arg(long = "node", env = "SHARDGATE_NODES", value_delimiter = ',')]
    nodes: Vec<StaticNode>,

    /// Node environment variable holding the access key
    #[arg(long, env = "SHARDGATE_ACCESS_KEY_VAR", default_value = "MINIO_ROOT_USER")]
    access_key_var: String,

    /// Node environment variable holding the secret key
    #[arg(long, env = "SHARDGATE_SECRET_KEY_VAR", default_value = "MINIO_ROOT_PASSWORD")]
    secret_key_var: String,

    /// Seconds between node discovery refreshes
    #[arg(long, env = "SHARDGATE_REFRESH_INTERVAL", default_value_t = 30)]
    refresh_interval_secs: u64,

    /// Largest accepted object in bytes
    #[arg(long, env = "SHARDGATE_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload_bytes: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "SHARDGATE_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout_secs: u64,

    /// Lifetime of presigned read URLs in seconds
    #[arg(long, env = "SHARDGATE_PRESIGN_EXPIRY", default_value_t = 300)]
    presign_expiry_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "SHARDGATE_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    /// Directory for daily rolling log files
    #[arg(long, env = "SHARDGATE_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let discovery = match self.discovery {
            DiscoveryMode::Docker => DiscoveryConfig::Docker {
                docker_host: self.docker_host,
                network: self.network,
                node_port: self.node_port,
            },
            DiscoveryMode::Static => DiscoveryConfig::Static { nodes: self.nodes },
        };

        let config = Config {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_payload_bytes: self.max_payload_bytes,
            discovery,
            bucket: self.bucket,
            node_pattern: self.node_pattern,
            credential_vars: CredentialVars {
                access_key: self.access_key_var,
                secret_key: self.secret_key_var,
            },
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            presign_expiry: Duration::from_secs(self.presign_expiry_secs),
            log_level: self.log_level,
            log_dir: self.log_dir,
        };
        config.validate().context("invalid gateway configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    service::spawn_service(&config).await;
    Ok(())
}
