//! The client seam between a [`StorageNode`](crate::StorageNode) and the
//! object engine running on the node.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use url::Url;

use crate::error::Result;

/// A stream of body chunks, as handed over by the HTTP layer.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Access credentials for one node.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Metadata returned by a successful stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStat {
    pub size: u64,
    pub e_tag: Option<String>,
}

/// An object payload on its way to a node.
///
/// `size` is the declared length when the caller knows it. Clients that need
/// a length up front upload bodies without one in parts.
pub struct ObjectBody {
    stream: ByteStream,
    size: Option<u64>,
}

impl ObjectBody {
    pub fn new(stream: ByteStream, size: Option<u64>) -> Self {
        Self { stream, size }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self {
            stream: stream::once(async move { Ok(bytes) }).boxed(),
            size: Some(size),
        }
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> io::Result<Bytes> {
        let capacity = self.size.unwrap_or(0) as usize;
        let buf = self
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Operations a storage node must support. A client is bound to one node and
/// one bucket.
#[async_trait]
pub trait NodeClient: Send + Sync + fmt::Debug {
    async fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket. Returns
    /// [`NodeError::BucketAlreadyExists`](crate::NodeError::BucketAlreadyExists)
    /// when someone else created it first.
    async fn make_bucket(&self) -> Result<()>;

    /// `Ok(None)` when the object does not exist.
    async fn stat_object(&self, key: &str) -> Result<Option<ObjectStat>>;

    async fn put_object(&self, key: &str, body: ObjectBody) -> Result<()>;

    async fn presigned_get_object(&self, key: &str, expiry: Duration) -> Result<Url>;
}

pub type DynNodeClient = Arc<dyn NodeClient>;

/// Builds clients for newly discovered nodes.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        bucket: &str,
    ) -> Result<DynNodeClient>;
}

pub type DynNodeConnector = Arc<dyn NodeConnector>;
