#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::Router;
use bytes::Bytes;
use common::pool::{NodePool, PoolConfig};
use common::testkit::{MemoryCluster, ScriptedDiscovery};
use http::{Request, StatusCode};
use service::config::DEFAULT_MAX_PAYLOAD_BYTES;
use service::ServiceState;
use tower::ServiceExt;

pub const NODES: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A gateway wired to in-memory nodes.
pub struct Gateway {
    pub cluster: Arc<MemoryCluster>,
    pub discovery: Arc<ScriptedDiscovery>,
    pub state: ServiceState,
    pub app: Router,
}

impl Gateway {
    pub async fn start(nodes: &[&str]) -> Self {
        Self::with_limit(nodes, DEFAULT_MAX_PAYLOAD_BYTES).await
    }

    pub async fn with_limit(nodes: &[&str], max_payload_bytes: u64) -> Self {
        let cluster = MemoryCluster::with_nodes(nodes);
        cluster.serve().await.expect("memory cluster serves");
        Self::build(cluster, nodes, max_payload_bytes, REQUEST_TIMEOUT).await
    }

    pub async fn with_timeout(nodes: &[&str], request_timeout: Duration) -> Self {
        let cluster = MemoryCluster::with_nodes(nodes);
        cluster.serve().await.expect("memory cluster serves");
        Self::build(cluster, nodes, DEFAULT_MAX_PAYLOAD_BYTES, request_timeout).await
    }

    /// Nodes answer existence checks but their presigned URLs are unreachable.
    pub async fn unserved(nodes: &[&str]) -> Self {
        let cluster = MemoryCluster::with_nodes(nodes);
        Self::build(cluster, nodes, DEFAULT_MAX_PAYLOAD_BYTES, REQUEST_TIMEOUT).await
    }

    async fn build(
        cluster: Arc<MemoryCluster>,
        nodes: &[&str],
        max_payload_bytes: u64,
        request_timeout: Duration,
    ) -> Self {
        let discovery = ScriptedDiscovery::with_nodes(nodes);
        let pool = NodePool::initialize(
            discovery.clone(),
            cluster.connector(),
            PoolConfig::new("objects", "amazin-object-storage-node"),
        )
        .await
        .expect("pool initializes");

        let state = ServiceState::new(Arc::new(pool), reqwest::Client::new(), max_payload_bytes);
        let config =
            service::http::Config::new(SocketAddr::from(([127, 0, 0, 1], 0)), request_timeout);
        let app = service::http::router(&config, state.clone());

        Self {
            cluster,
            discovery,
            state,
            app,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn put(&self, uri: &str, data: impl Into<Bytes>) -> (StatusCode, Bytes) {
        let data = data.into();
        let request = Request::put(uri)
            .header(http::header::CONTENT_LENGTH, data.len())
            .body(Body::from(data))
            .unwrap();
        self.send(request).await
    }

    /// The node address currently responsible for `id`.
    pub fn primary(&self, id: &str) -> String {
        let id = common::object_id::ObjectId::parse(id).unwrap();
        self.state.pool().snapshot().primary_id(&id).to_string()
    }

    pub fn total_puts(&self) -> usize {
        self.state
            .pool()
            .snapshot()
            .ids()
            .iter()
            .filter_map(|id| self.cluster.node(id.as_str()))
            .map(|node| node.puts())
            .sum()
    }
}
