//! Shard routing: which node an object id belongs to.
//!
//! An id's primary node is `fnv1a_32(id) % N` over the sorted node ids of the
//! current membership. Writes always go to the primary. Reads try the primary
//! first and, on a miss, scan the remaining nodes in order, which finds
//! objects written before the node count last changed.

use std::sync::Arc;

use storage::{NodeError, NodeId, ObjectBody, Presence, StorageNode};

use crate::object_id::ObjectId;
use crate::pool::{Membership, NodePool};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Index of the primary node for `id` among `n` nodes. `n` must be non-zero.
pub fn primary_index(id: &[u8], n: usize) -> usize {
    debug_assert!(n > 0, "primary_index over an empty node set");
    (fnv1a_32(id) as usize) % n
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("storage node {node} failed: {source}")]
    Transport {
        node: NodeId,
        #[source]
        source: NodeError,
    },
}

impl RouteError {
    fn transport(node: &StorageNode, source: NodeError) -> Self {
        Self::Transport {
            node: node.id().clone(),
            source,
        }
    }

    pub fn node(&self) -> &NodeId {
        match self {
            Self::Transport { node, .. } => node,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    pool: Arc<NodePool>,
}

impl Router {
    pub fn new(pool: Arc<NodePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// The node that holds `id`, if any.
    ///
    /// Every existence check in one call uses the same membership snapshot.
    /// A transport failure on any node ends the search with an error rather
    /// than a miss.
    pub async fn lookup(&self, id: &ObjectId) -> Result<Option<Arc<StorageNode>>, RouteError> {
        let membership = self.pool.snapshot();
        Self::lookup_in(&membership, id).await
    }

    pub async fn lookup_in(
        membership: &Membership,
        id: &ObjectId,
    ) -> Result<Option<Arc<StorageNode>>, RouteError> {
        let primary_id = membership.primary_id(id);
        let primary = membership.primary(id);
        if Self::check_presence(primary, id).await? == Presence::Present {
            return Ok(Some(primary.clone()));
        }

        for node in membership.nodes().filter(|node| node.id() != primary_id) {
            if Self::check_presence(node, id).await? == Presence::Present {
                tracing::debug!(
                    object = %id,
                    primary = %primary_id,
                    found_on = %node.id(),
                    "object found off its primary node"
                );
                return Ok(Some(node.clone()));
            }
        }

        Ok(None)
    }

    /// Store `body` under `id` on its primary node.
    pub async fn put(&self, id: &ObjectId, body: ObjectBody) -> Result<NodeId, RouteError> {
        let membership = self.pool.snapshot();
        let node = membership.primary(id);
        node.put(id.as_str(), body)
            .await
            .map_err(|e| RouteError::transport(node, e))?;
        Ok(node.id().clone())
    }

    async fn check_presence(node: &StorageNode, id: &ObjectId) -> Result<Presence, RouteError> {
        node.exists(id.as_str()).await.map_err(|e| {
            tracing::warn!(node = %node.id(), object = %id, "existence check failed: {}", e);
            RouteError::transport(node, e)
        })
    }
}
