use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::discovery::{DiscoveryError, DockerDiscovery, DynDiscovery, StaticDiscovery};
use common::pool::{NodePool, PoolError};
use common::router::Router;
use storage::{DynNodeConnector, S3Connector};

use super::config::{Config, ConfigError, DiscoveryConfig};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Set once a shutdown signal arrives, before the server stops accepting.
#[derive(Debug, Clone, Default)]
pub struct Draining(Arc<AtomicBool>);

impl Draining {
    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Main service state, shared by every request handler
#[derive(Debug, Clone)]
pub struct State {
    router: Router,
    http: reqwest::Client,
    max_payload_bytes: u64,
    draining: Draining,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        config.validate()?;

        // 1. One HTTP client for discovery, node calls and proxied reads
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        // 2. Discovery backend
        let discovery: DynDiscovery = match &config.discovery {
            DiscoveryConfig::Docker {
                docker_host,
                network,
                node_port,
            } => Arc::new(
                DockerDiscovery::connect(http.clone(), docker_host, network, *node_port).await?,
            ),
            DiscoveryConfig::Static { nodes } => {
                tracing::info!(count = nodes.len(), "using static node list");
                Arc::new(StaticDiscovery::new(nodes.clone()))
            }
        };

        // 3. Initial node pool
        let connector: DynNodeConnector =
            Arc::new(S3Connector::new(http.clone()).with_connect_timeout(CONNECT_TIMEOUT));
        let pool = NodePool::initialize(discovery, connector, config.pool_config()).await?;

        Ok(Self::new(Arc::new(pool), http, config.max_payload_bytes))
    }

    pub fn new(pool: Arc<NodePool>, http: reqwest::Client, max_payload_bytes: u64) -> Self {
        Self {
            router: Router::new(pool),
            http,
            max_payload_bytes,
            draining: Draining::default(),
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        self.router.pool()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    pub fn draining(&self) -> &Draining {
        &self.draining
    }
}

impl AsRef<Router> for State {
    fn as_ref(&self) -> &Router {
        &self.router
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("discovery setup error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("node pool setup error: {0}")]
    Pool(#[from] PoolError),
}
