//! In-process storage nodes and scripted discovery for tests.
//!
//! A [`MemoryCluster`] owns a set of [`MemoryNode`]s keyed by address and
//! hands out a connector the pool can use in place of the S3 one. Faults can
//! be switched on per node. Calling [`MemoryCluster::serve`] starts a
//! loopback HTTP server so presigned read URLs resolve to real bytes.
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testkit::{MemoryCluster, ScriptedDiscovery};
//!
//! let cluster = MemoryCluster::with_nodes(&["10.0.0.1", "10.0.0.2"]);
//! let discovery = ScriptedDiscovery::with_nodes(&["10.0.0.1", "10.0.0.2"]);
//! let pool = NodePool::initialize(discovery.clone(), cluster.connector(), config).await?;
//!
//! cluster.node("10.0.0.2").unwrap().fail_stats(true);
//! discovery.set_nodes(&["10.0.0.1"]);
//! pool.refresh().await?;
//! ```
mod cluster;
mod discovery;

pub use cluster::{MemoryCluster, MemoryConnector, MemoryNode, MemoryNodeClient};
pub use discovery::{descriptor, ScriptedDiscovery};
