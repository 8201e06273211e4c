use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::{stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use storage::{
    Credentials, DynNodeClient, DynNodeConnector, NodeClient, NodeConnector, NodeError,
    ObjectBody, ObjectStat,
};
use url::Url;

// Presigned URLs point at a closed port until the cluster is served.
const UNSERVED_ENDPOINT: &str = "http://127.0.0.1:1/";

/// One in-memory storage node.
#[derive(Debug, Default)]
pub struct MemoryNode {
    address: String,
    buckets: Mutex<HashMap<String, HashMap<String, Bytes>>>,

    fail_stats: AtomicBool,
    stall_stats: AtomicBool,
    fail_puts: AtomicBool,
    race_bucket_creation: AtomicBool,
    refuse_connections: AtomicBool,
    // (chunk size, delay per chunk) for served downloads
    throttle: Mutex<Option<(usize, Duration)>>,

    connects: AtomicUsize,
    stats: AtomicUsize,
    stats_in_flight: AtomicUsize,
    puts: AtomicUsize,
    bucket_creates: AtomicUsize,
    downloads: AtomicUsize,
    downloads_in_flight: AtomicUsize,
}

impl MemoryNode {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Default::default()
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().contains_key(bucket)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets.lock().get(bucket)?.get(key).cloned()
    }

    /// Store an object directly, bypassing the client.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    /// Existence checks fail with a transport error.
    pub fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    /// Existence checks never complete.
    pub fn stall_stats(&self, stall: bool) {
        self.stall_stats.store(stall, Ordering::SeqCst);
    }

    /// Serve downloads `chunk` bytes at a time with `delay` before each chunk.
    pub fn throttle_downloads(&self, chunk: usize, delay: Duration) {
        *self.throttle.lock() = Some((chunk.max(1), delay));
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Bucket creation reports that someone else created it first.
    pub fn race_bucket_creation(&self, race: bool) {
        self.race_bucket_creation.store(race, Ordering::SeqCst);
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> usize {
        self.stats.load(Ordering::SeqCst)
    }

    /// Existence checks started but not yet finished or dropped.
    pub fn stats_in_flight(&self) -> usize {
        self.stats_in_flight.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Download bodies still held open by the serving side.
    pub fn downloads_in_flight(&self) -> usize {
        self.downloads_in_flight.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn bucket_creates(&self) -> usize {
        self.bucket_creates.load(Ordering::SeqCst)
    }
}

/// Counts an operation as running until dropped.
struct InFlight {
    node: Arc<MemoryNode>,
    counter: fn(&MemoryNode) -> &AtomicUsize,
}

impl InFlight {
    fn enter(node: Arc<MemoryNode>, counter: fn(&MemoryNode) -> &AtomicUsize) -> Self {
        counter(&node).fetch_add(1, Ordering::SeqCst);
        Self { node, counter }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        (self.counter)(&self.node).fetch_sub(1, Ordering::SeqCst);
    }
}

/// A set of memory nodes addressed the way discovery reports them.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    nodes: RwLock<BTreeMap<String, Arc<MemoryNode>>>,
    endpoint: RwLock<Option<Url>>,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_nodes(addresses: &[&str]) -> Arc<Self> {
        let cluster = Self::new();
        for address in addresses {
            cluster.add_node(address);
        }
        cluster
    }

    pub fn add_node(&self, address: &str) -> Arc<MemoryNode> {
        self.nodes
            .write()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MemoryNode::new(address)))
            .clone()
    }

    pub fn node(&self, address: &str) -> Option<Arc<MemoryNode>> {
        self.nodes.read().get(address).cloned()
    }

    pub fn connector(self: &Arc<Self>) -> DynNodeConnector {
        Arc::new(MemoryConnector {
            cluster: self.clone(),
        })
    }

    /// Serve stored objects over loopback HTTP at
    /// `/nodes/:node/:bucket/:key` and point presigned URLs at it.
    pub async fn serve(self: &Arc<Self>) -> io::Result<Url> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = axum::Router::new()
            .route("/nodes/:node/:bucket/:key", get(serve_object))
            .with_state(self.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("memory cluster server exited: {}", e);
            }
        });

        let url = Url::parse(&format!("http://{}/", addr))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        *self.endpoint.write() = Some(url.clone());
        Ok(url)
    }

    fn endpoint(&self) -> Result<Url, url::ParseError> {
        match self.endpoint.read().as_ref() {
            Some(url) => Ok(url.clone()),
            None => Url::parse(UNSERVED_ENDPOINT),
        }
    }
}

async fn serve_object(
    State(cluster): State<Arc<MemoryCluster>>,
    Path((node, bucket, key)): Path<(String, String, String)>,
) -> Response {
    let Some(node) = cluster.node(&node) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(data) = node.object(&bucket, &key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    node.downloads.fetch_add(1, Ordering::SeqCst);
    let throttle = *node.throttle.lock();
    let held = InFlight::enter(node, |n| &n.downloads_in_flight);

    let (chunk, delay) = throttle.unwrap_or((data.len().max(1), Duration::ZERO));
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(chunk)
        .map(|start| data.slice(start..(start + chunk).min(data.len())))
        .collect();
    let body = stream::iter(chunks).then(move |part| {
        let _held = &held;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, io::Error>(part)
        }
    });
    (StatusCode::OK, Body::from_stream(body)).into_response()
}

#[derive(Debug)]
pub struct MemoryConnector {
    cluster: Arc<MemoryCluster>,
}

#[async_trait]
impl NodeConnector for MemoryConnector {
    async fn connect(
        &self,
        address: &str,
        _credentials: &Credentials,
        bucket: &str,
    ) -> storage::Result<DynNodeClient> {
        let node = self
            .cluster
            .node(address)
            .filter(|node| !node.refuse_connections.load(Ordering::SeqCst))
            .ok_or_else(|| NodeError::Transport(format!("connection refused: {}", address)))?;
        node.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MemoryNodeClient {
            cluster: self.cluster.clone(),
            node,
            bucket: bucket.to_string(),
        }))
    }
}

/// Client bound to one memory node and bucket.
#[derive(Debug)]
pub struct MemoryNodeClient {
    cluster: Arc<MemoryCluster>,
    node: Arc<MemoryNode>,
    bucket: String,
}

#[async_trait]
impl NodeClient for MemoryNodeClient {
    async fn bucket_exists(&self) -> storage::Result<bool> {
        Ok(self.node.has_bucket(&self.bucket))
    }

    async fn make_bucket(&self) -> storage::Result<()> {
        self.node.bucket_creates.fetch_add(1, Ordering::SeqCst);
        let raced = self.node.race_bucket_creation.load(Ordering::SeqCst);
        self.node
            .buckets
            .lock()
            .entry(self.bucket.clone())
            .or_default();
        if raced {
            return Err(NodeError::BucketAlreadyExists(self.bucket.clone()));
        }
        Ok(())
    }

    async fn stat_object(&self, key: &str) -> storage::Result<Option<ObjectStat>> {
        self.node.stats.fetch_add(1, Ordering::SeqCst);
        let _running = InFlight::enter(self.node.clone(), |n| &n.stats_in_flight);
        if self.node.stall_stats.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.node.fail_stats.load(Ordering::SeqCst) {
            return Err(NodeError::Transport(format!(
                "connection reset by {}",
                self.node.address
            )));
        }
        Ok(self.node.object(&self.bucket, key).map(|data| ObjectStat {
            size: data.len() as u64,
            e_tag: None,
        }))
    }

    async fn put_object(&self, key: &str, body: ObjectBody) -> storage::Result<()> {
        self.node.puts.fetch_add(1, Ordering::SeqCst);
        if self.node.fail_puts.load(Ordering::SeqCst) {
            return Err(NodeError::Transport(format!(
                "connection reset by {}",
                self.node.address
            )));
        }
        let data = body.collect().await?;
        self.node.insert(&self.bucket, key, data);
        Ok(())
    }

    async fn presigned_get_object(&self, key: &str, expiry: Duration) -> storage::Result<Url> {
        let mut url = self
            .cluster
            .endpoint()
            .and_then(|base| base.join(&format!("nodes/{}/{}/{}", self.node.address, self.bucket, key)))
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("expires", &expiry.as_secs().to_string());
        Ok(url)
    }
}
