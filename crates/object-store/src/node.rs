use std::fmt;
use std::time::Duration;

use url::Url;

use crate::client::{Credentials, DynNodeClient, NodeConnector, ObjectBody};
use crate::error::{NodeError, Result};

/// How long a presigned read URL stays valid unless configured otherwise.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Identity of a storage node: its network address as discovered.
///
/// Ordering is lexicographic on the address string, which is the order
/// shard assignment indexes into.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Outcome of an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

/// A connected storage node with its bucket ready for use.
#[derive(Debug)]
pub struct StorageNode {
    id: NodeId,
    address: String,
    bucket: String,
    presign_expiry: Duration,
    client: DynNodeClient,
}

impl StorageNode {
    /// Build a client for the node and make sure the bucket exists.
    pub async fn connect(
        id: NodeId,
        address: &str,
        credentials: &Credentials,
        bucket: &str,
        connector: &dyn NodeConnector,
    ) -> Result<Self> {
        let client = connector.connect(address, credentials, bucket).await?;
        let node = Self::from_client(id, address, bucket, client);
        node.ensure_bucket().await?;
        tracing::debug!(node = %node.id, bucket = %node.bucket, "storage node connected");
        Ok(node)
    }

    /// Wrap an existing client. Does not touch the bucket.
    pub fn from_client(
        id: NodeId,
        address: impl Into<String>,
        bucket: impl Into<String>,
        client: DynNodeClient,
    ) -> Self {
        Self {
            id,
            address: address.into(),
            bucket: bucket.into(),
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
            client,
        }
    }

    pub fn with_presign_expiry(mut self, expiry: Duration) -> Self {
        self.presign_expiry = expiry;
        self
    }

    /// Create the bucket if it is missing. Losing a creation race to another
    /// initializer counts as success.
    pub async fn ensure_bucket(&self) -> Result<()> {
        if self.client.bucket_exists().await? {
            return Ok(());
        }

        match self.client.make_bucket().await {
            Ok(()) => Ok(()),
            Err(NodeError::BucketAlreadyExists(bucket)) => {
                tracing::debug!(node = %self.id, %bucket, "bucket created concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<Presence> {
        let stat = self.client.stat_object(key).await?;
        Ok(match stat {
            Some(_) => Presence::Present,
            None => Presence::Absent,
        })
    }

    pub async fn put(&self, key: &str, body: ObjectBody) -> Result<()> {
        self.client.put_object(key, body).await
    }

    pub async fn presigned_url(&self, key: &str) -> Result<Url> {
        self.client
            .presigned_get_object(key, self.presign_expiry)
            .await
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn presign_expiry(&self) -> Duration {
        self.presign_expiry
    }
}
