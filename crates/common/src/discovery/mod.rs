//! Membership discovery: where the set of live storage nodes comes from.
//!
//! The pool never talks to an orchestration backend directly. It holds a
//! [`MembershipDiscovery`] and asks it for a fresh snapshot on every refresh.

mod docker;
mod static_list;

use std::sync::Arc;

use async_trait::async_trait;
use storage::{Credentials, NodeId};

pub use docker::{DockerDiscovery, DEFAULT_DOCKER_HOST};
pub use static_list::{StaticDiscovery, StaticNode, StaticNodeParseError};

/// Environment variable names that carry a node's access credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialVars {
    pub access_key: String,
    pub secret_key: String,
}

impl Default for CredentialVars {
    fn default() -> Self {
        Self {
            access_key: "MINIO_ROOT_USER".to_string(),
            secret_key: "MINIO_ROOT_PASSWORD".to_string(),
        }
    }
}

impl CredentialVars {
    /// Pull credentials out of `KEY=value` environment entries.
    ///
    /// Returns `None` unless both variables are present.
    pub fn extract<S: AsRef<str>>(&self, env: &[S]) -> Option<Credentials> {
        let lookup = |name: &str| {
            env.iter().find_map(|entry| {
                let (key, value) = entry.as_ref().split_once('=')?;
                (key == name).then(|| value.to_string())
            })
        };

        let access_key = lookup(&self.access_key)?;
        let secret_key = lookup(&self.secret_key)?;
        Some(Credentials::new(access_key, secret_key))
    }
}

/// What the pool asks discovery for.
#[derive(Debug, Clone)]
pub struct NodeQuery {
    /// Node name match pattern (a container name filter for Docker)
    pub pattern: String,
    pub credential_vars: CredentialVars,
}

/// One live node as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub id: NodeId,
    /// `host:port` the node's object API listens on
    pub address: String,
    /// `None` when the node's environment lacks the configured credentials
    pub credentials: Option<Credentials>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            credentials,
        }
    }
}

#[async_trait]
pub trait MembershipDiscovery: Send + Sync {
    /// Currently live nodes matching the query.
    async fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeDescriptor>, DiscoveryError>;
}

pub type DynDiscovery = Arc<dyn MembershipDiscovery>;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("discovery backend responded with {0}: {1}")]
    Status(reqwest::StatusCode, String),
    #[error("invalid discovery endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("no shared network found: {0}")]
    NetworkNotFound(String),
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),
}
