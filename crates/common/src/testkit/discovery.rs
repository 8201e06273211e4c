use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use storage::Credentials;

use crate::discovery::{DiscoveryError, MembershipDiscovery, NodeDescriptor, NodeQuery};

/// A live node at `address`, identified by its address, with test credentials.
pub fn descriptor(address: &str) -> NodeDescriptor {
    NodeDescriptor::new(
        address,
        address,
        Some(Credentials::new("minioadmin", "minioadmin")),
    )
}

/// Discovery whose answer is set by the test.
#[derive(Debug, Default)]
pub struct ScriptedDiscovery {
    nodes: Mutex<Vec<NodeDescriptor>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedDiscovery {
    pub fn with_nodes(addresses: &[&str]) -> Arc<Self> {
        let discovery = Arc::new(Self::default());
        discovery.set_nodes(addresses);
        discovery
    }

    /// Replace the reported node set and clear any scripted failure.
    pub fn set_nodes(&self, addresses: &[&str]) {
        *self.nodes.lock() = addresses.iter().map(|a| descriptor(a)).collect();
        *self.failure.lock() = None;
    }

    pub fn push(&self, node: NodeDescriptor) {
        self.nodes.lock().push(node);
    }

    /// Make every following call fail until `set_nodes` is called.
    pub fn fail(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipDiscovery for ScriptedDiscovery {
    async fn list_nodes(&self, _query: &NodeQuery) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failure.lock().clone() {
            return Err(DiscoveryError::Unavailable(reason));
        }
        Ok(self.nodes.lock().clone())
    }
}
