//! Storage node connections
//!
//! This crate owns the gateway's view of a single storage node: a client bound
//! to one node and one bucket, plus the [`StorageNode`] wrapper that makes sure
//! the bucket exists and answers existence, put and presign requests.
//!
//! # Features
//!
//! - A [`NodeClient`] trait so the routing layer never depends on a concrete backend
//! - An S3/MinIO implementation built on `object_store` and presigned `reqwest` calls
//! - Tri-state existence checks: present, absent, or a transport error
//!
//! # Example
//!
//! ```rust,no_run
//! use storage::{Credentials, NodeId, S3Connector, StorageNode};
//!
//! # async fn example() -> Result<(), storage::NodeError> {
//! let connector = S3Connector::new(reqwest::Client::new());
//! let node = StorageNode::connect(
//!     NodeId::new("10.0.0.1"),
//!     "10.0.0.1:9000",
//!     &Credentials::new("minioadmin", "minioadmin"),
//!     "objects",
//!     &connector,
//! )
//! .await?;
//! let url = node.presigned_url("abc123").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod node;
mod s3;

pub use client::{
    ByteStream, Credentials, DynNodeClient, DynNodeConnector, NodeClient, NodeConnector,
    ObjectBody, ObjectStat,
};
pub use error::{NodeError, Result};
pub use node::{NodeId, Presence, StorageNode, DEFAULT_PRESIGN_EXPIRY};
pub use s3::{S3Connector, S3NodeClient, S3NodeConfig};
