//! The node pool: who is in the cluster right now.
//!
//! Membership lives in an immutable [`Membership`] snapshot. Refreshing builds
//! a complete replacement off to the side and publishes it with a single
//! pointer swap, so a reader holds either the old snapshot or the new one and
//! never a mix of both.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use storage::{DynNodeConnector, NodeId, StorageNode, DEFAULT_PRESIGN_EXPIRY};
use tokio::sync::{watch, Mutex};

use crate::discovery::{CredentialVars, DiscoveryError, DynDiscovery, NodeDescriptor, NodeQuery};
use crate::object_id::ObjectId;
use crate::router::primary_index;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Bucket every node stores objects in
    pub bucket: String,
    /// Node name match pattern handed to discovery
    pub pattern: String,
    pub credential_vars: CredentialVars,
    pub refresh_interval: Duration,
    pub presign_expiry: Duration,
}

impl PoolConfig {
    pub fn new(bucket: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            pattern: pattern.into(),
            credential_vars: CredentialVars::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
        }
    }

    fn query(&self) -> NodeQuery {
        NodeQuery {
            pattern: self.pattern.clone(),
            credential_vars: self.credential_vars.clone(),
        }
    }
}

/// One consistent view of the live nodes.
///
/// `ids` is always the sorted key set of `nodes`; both are fixed at
/// construction. A membership is never empty.
#[derive(Debug)]
pub struct Membership {
    nodes: BTreeMap<NodeId, Arc<StorageNode>>,
    ids: Vec<NodeId>,
}

impl Membership {
    pub fn new(nodes: BTreeMap<NodeId, Arc<StorageNode>>) -> Result<Self, PoolError> {
        if nodes.is_empty() {
            return Err(PoolError::NoNodes);
        }
        let ids = nodes.keys().cloned().collect();
        Ok(Self { nodes, ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Node ids in routing order.
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn get(&self, id: &NodeId) -> Option<&Arc<StorageNode>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in routing order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<StorageNode>> {
        self.nodes.values()
    }

    pub fn primary_id(&self, id: &ObjectId) -> &NodeId {
        &self.ids[primary_index(id.as_bytes(), self.ids.len())]
    }

    /// The node an id is assigned to under this membership.
    pub fn primary(&self, id: &ObjectId) -> &Arc<StorageNode> {
        &self.nodes[self.primary_id(id)]
    }
}

/// What a successful refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub retained: usize,
}

impl RefreshReport {
    fn diff(previous: &Membership, next: &Membership) -> Self {
        let added = next
            .ids()
            .iter()
            .filter(|id| !previous.contains(id))
            .cloned()
            .collect();
        let removed = previous
            .ids()
            .iter()
            .filter(|id| !next.contains(id))
            .cloned()
            .collect();
        let retained = next.ids().iter().filter(|id| previous.contains(id)).count();
        Self {
            added,
            removed,
            retained,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct NodePool {
    config: PoolConfig,
    discovery: DynDiscovery,
    connector: DynNodeConnector,
    membership: RwLock<Arc<Membership>>,
    // serializes refreshes so reuse decisions never interleave
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("config", &self.config)
            .field("nodes", &self.snapshot().ids())
            .finish()
    }
}

impl NodePool {
    /// Discover and connect the initial set of nodes.
    ///
    /// Fails if discovery fails or if no node could be connected.
    pub async fn initialize(
        discovery: DynDiscovery,
        connector: DynNodeConnector,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let nodes = Self::populate(&config, &discovery, &connector, None).await?;
        let membership = Membership::new(nodes)?;
        tracing::info!(
            nodes = ?membership.ids(),
            bucket = %config.bucket,
            "node pool initialized"
        );

        Ok(Self {
            config,
            discovery,
            connector,
            membership: RwLock::new(Arc::new(membership)),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Re-run discovery and swap in the new membership.
    ///
    /// Nodes already connected are reused, newcomers are connected, vanished
    /// nodes are dropped. On any error the current membership stays in place.
    pub async fn refresh(&self) -> Result<RefreshReport, PoolError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.snapshot();
        let nodes =
            Self::populate(&self.config, &self.discovery, &self.connector, Some(&current)).await?;
        let next = Membership::new(nodes)?;

        let report = RefreshReport::diff(&current, &next);
        for id in &report.removed {
            tracing::warn!(node = %id, "removing node since offline");
        }
        for id in &report.added {
            tracing::info!(node = %id, "node joined");
        }

        *self.membership.write() = Arc::new(next);
        Ok(report)
    }

    /// Current membership. Cheap; hold it for the length of one request.
    pub fn snapshot(&self) -> Arc<Membership> {
        self.membership.read().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    async fn populate(
        config: &PoolConfig,
        discovery: &DynDiscovery,
        connector: &DynNodeConnector,
        previous: Option<&Membership>,
    ) -> Result<BTreeMap<NodeId, Arc<StorageNode>>, PoolError> {
        let descriptors = discovery.list_nodes(&config.query()).await?;

        let mut nodes = BTreeMap::new();
        let mut newcomers = Vec::new();
        for descriptor in descriptors {
            if nodes.contains_key(&descriptor.id)
                || newcomers
                    .iter()
                    .any(|d: &NodeDescriptor| d.id == descriptor.id)
            {
                tracing::debug!(node = %descriptor.id, "duplicate node in discovery snapshot");
                continue;
            }

            let reusable = previous
                .and_then(|m| m.get(&descriptor.id))
                .filter(|node| node.address() == descriptor.address);
            match reusable {
                Some(node) => {
                    nodes.insert(descriptor.id, node.clone());
                }
                None => newcomers.push(descriptor),
            }
        }

        let connected = join_all(
            newcomers
                .into_iter()
                .map(|descriptor| Self::connect_node(config, connector, descriptor)),
        )
        .await;
        for node in connected.into_iter().flatten() {
            nodes.insert(node.id().clone(), Arc::new(node));
        }

        Ok(nodes)
    }

    /// Connect one node, or log why it was skipped.
    async fn connect_node(
        config: &PoolConfig,
        connector: &DynNodeConnector,
        descriptor: NodeDescriptor,
    ) -> Option<StorageNode> {
        let Some(credentials) = descriptor.credentials.as_ref() else {
            tracing::warn!(
                node = %descriptor.id,
                access_key_var = %config.credential_vars.access_key,
                secret_key_var = %config.credential_vars.secret_key,
                "node is missing credentials in its environment, skipping"
            );
            return None;
        };

        match StorageNode::connect(
            descriptor.id.clone(),
            &descriptor.address,
            credentials,
            &config.bucket,
            connector.as_ref(),
        )
        .await
        {
            Ok(node) => Some(node.with_presign_expiry(config.presign_expiry)),
            Err(e) => {
                tracing::warn!(node = %descriptor.id, address = %descriptor.address, "failed to connect node, skipping: {}", e);
                None
            }
        }
    }
}

/// Refresh the pool every `refresh_interval` until shutdown.
///
/// A failed refresh is logged and the previous membership keeps serving.
pub async fn run_refresh_loop(pool: Arc<NodePool>, mut shutdown_rx: watch::Receiver<()>) {
    let mut interval_timer = tokio::time::interval(pool.refresh_interval());
    interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval_timer.tick().await; // Skip first immediate tick

    tracing::info!(
        interval_secs = pool.refresh_interval().as_secs(),
        "node refresh loop started"
    );

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                match pool.refresh().await {
                    Ok(report) => {
                        tracing::debug!(
                            nodes = pool.len(),
                            added = report.added.len(),
                            removed = report.removed.len(),
                            "refreshed node pool"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            nodes = pool.len(),
                            "node refresh failed, keeping current membership: {}",
                            e
                        );
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::info!("node refresh loop shutting down");
                break;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("no running storage nodes found")]
    NoNodes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MemoryCluster, ScriptedDiscovery};

    const NODES: [&str; 3] = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];

    async fn pool_with(
        cluster: &Arc<MemoryCluster>,
        discovery: &Arc<ScriptedDiscovery>,
    ) -> Result<NodePool, PoolError> {
        NodePool::initialize(
            discovery.clone(),
            cluster.connector(),
            PoolConfig::new("objects", "node"),
        )
        .await
    }

    #[tokio::test]
    async fn test_initialize_connects_and_creates_bucket() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        assert_eq!(pool.len(), 3);
        for address in NODES {
            assert!(cluster.node(address).unwrap().has_bucket("objects"));
        }
    }

    #[tokio::test]
    async fn test_initialize_sorts_regardless_of_discovery_order() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        let snapshot = pool.snapshot();
        let ids: Vec<&str> = snapshot.ids().iter().map(NodeId::as_str).collect();
        assert_eq!(ids, NODES);
    }

    #[tokio::test]
    async fn test_initialize_skips_misconfigured_nodes() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&["10.0.0.1", "10.0.0.2"]);
        discovery.push(NodeDescriptor::new("10.0.0.3", "10.0.0.3", None));
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        assert_eq!(pool.len(), 2);
        assert!(!pool.snapshot().contains(&NodeId::from("10.0.0.3")));
    }

    #[tokio::test]
    async fn test_initialize_tolerates_bucket_creation_race() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        cluster.node("10.0.0.2").unwrap().race_bucket_creation(true);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        assert_eq!(pool.len(), 3);
        assert_eq!(cluster.node("10.0.0.2").unwrap().bucket_creates(), 1);
    }

    #[tokio::test]
    async fn test_initialize_skips_unreachable_nodes() {
        let cluster = MemoryCluster::with_nodes(&["10.0.0.1"]);
        let discovery = ScriptedDiscovery::with_nodes(&["10.0.0.1", "10.0.0.9"]);
        let pool = pool_with(&cluster, &discovery).await.unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_fails_without_nodes() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&[]);
        let err = pool_with(&cluster, &discovery).await.unwrap_err();
        assert!(matches!(err, PoolError::NoNodes));

        discovery.fail("engine unreachable");
        let err = pool_with(&cluster, &discovery).await.unwrap_err();
        assert!(matches!(err, PoolError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_refresh_adds_and_removes_nodes() {
        let cluster = MemoryCluster::with_nodes(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        discovery.set_nodes(&["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let report = pool.refresh().await.unwrap();

        assert_eq!(report.added, vec![NodeId::from("10.0.0.4")]);
        assert_eq!(report.removed, vec![NodeId::from("10.0.0.1")]);
        assert_eq!(report.retained, 2);
        let snapshot = pool.snapshot();
        let ids: Vec<&str> = snapshot.ids().iter().map(NodeId::as_str).collect();
        assert_eq!(ids, ["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
    }

    #[tokio::test]
    async fn test_refresh_reuses_connected_nodes() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        let before = pool.snapshot();
        let report = pool.refresh().await.unwrap();
        let after = pool.snapshot();

        assert!(report.is_unchanged());
        for id in before.ids() {
            assert!(Arc::ptr_eq(before.get(id).unwrap(), after.get(id).unwrap()));
        }
        assert_eq!(cluster.node("10.0.0.1").unwrap().connects(), 1);
    }

    #[tokio::test]
    async fn test_refresh_reconnects_node_whose_address_changed() {
        let cluster = MemoryCluster::with_nodes(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.9"]);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();
        let before = pool.snapshot();

        discovery.set_nodes(&["10.0.0.1", "10.0.0.2"]);
        discovery.push(NodeDescriptor::new(
            "10.0.0.3",
            "10.0.0.9",
            Some(storage::Credentials::new("minioadmin", "minioadmin")),
        ));
        let report = pool.refresh().await.unwrap();
        assert!(report.is_unchanged());

        let id = NodeId::from("10.0.0.3");
        let after = pool.snapshot();
        let moved = after.get(&id).unwrap();
        assert_eq!(moved.address(), "10.0.0.9");
        assert!(!Arc::ptr_eq(before.get(&id).unwrap(), moved));
        assert_eq!(cluster.node("10.0.0.9").unwrap().connects(), 1);
        assert_eq!(cluster.node("10.0.0.3").unwrap().connects(), 1);

        let untouched = NodeId::from("10.0.0.1");
        assert!(Arc::ptr_eq(
            before.get(&untouched).unwrap(),
            after.get(&untouched).unwrap()
        ));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_node_that_refused_earlier() {
        let cluster = MemoryCluster::with_nodes(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let late = cluster.node("10.0.0.4").unwrap();
        late.refuse_connections(true);
        let discovery =
            ScriptedDiscovery::with_nodes(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let pool = pool_with(&cluster, &discovery).await.unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(late.connects(), 0);

        late.refuse_connections(false);
        let report = pool.refresh().await.unwrap();
        assert_eq!(report.added, vec![NodeId::from("10.0.0.4")]);
        assert_eq!(pool.len(), 4);
        assert!(late.has_bucket("objects"));
    }

    #[tokio::test]
    async fn test_refresh_with_zero_nodes_keeps_membership() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();
        let before = pool.snapshot();

        discovery.set_nodes(&[]);
        let err = pool.refresh().await.unwrap_err();
        assert!(matches!(err, PoolError::NoNodes));

        let after = pool.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_with_discovery_failure_keeps_membership() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        discovery.fail("engine restarting");
        assert!(matches!(
            pool.refresh().await.unwrap_err(),
            PoolError::Discovery(_)
        ));
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_held_across_refresh_stays_consistent() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = pool_with(&cluster, &discovery).await.unwrap();

        let held = pool.snapshot();
        discovery.set_nodes(&["10.0.0.1"]);
        pool.refresh().await.unwrap();

        assert_eq!(held.len(), 3);
        assert_eq!(held.ids().len(), held.nodes().count());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_torn_membership() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let pool = Arc::new(pool_with(&cluster, &discovery).await.unwrap());

        let mut readers = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = pool.snapshot();
                    assert_eq!(snapshot.ids().len(), snapshot.nodes().count());
                    for id in snapshot.ids() {
                        assert!(snapshot.contains(id));
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for round in 0..50 {
            let live: &[&str] = if round % 2 == 0 { &NODES[..1] } else { &NODES };
            discovery.set_nodes(live);
            pool.refresh().await.unwrap();
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_survives_failures() {
        let cluster = MemoryCluster::with_nodes(&NODES);
        let discovery = ScriptedDiscovery::with_nodes(&NODES);
        let mut config = PoolConfig::new("objects", "node");
        config.refresh_interval = Duration::from_secs(5);
        let pool = Arc::new(
            NodePool::initialize(discovery.clone(), cluster.connector(), config)
                .await
                .unwrap(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(run_refresh_loop(pool.clone(), shutdown_rx));

        discovery.set_nodes(&[]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(pool.len(), 3);

        discovery.set_nodes(&["10.0.0.2"]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pool.len(), 1);
        // one call from initialize, one per tick
        assert!(discovery.calls() >= 3);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
