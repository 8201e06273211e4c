use std::str::FromStr;

use async_trait::async_trait;
use storage::Credentials;

use super::{DiscoveryError, MembershipDiscovery, NodeDescriptor, NodeQuery};

/// A node given on the command line as `host:port` or
/// `host:port=access_key:secret_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNode {
    pub address: String,
    pub credentials: Option<Credentials>,
}

impl FromStr for StaticNode {
    type Err = StaticNodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, credentials) = match s.split_once('=') {
            Some((address, creds)) => {
                let (access_key, secret_key) = creds
                    .split_once(':')
                    .ok_or_else(|| StaticNodeParseError::Credentials(s.to_string()))?;
                if access_key.is_empty() {
                    return Err(StaticNodeParseError::Credentials(s.to_string()));
                }
                (address, Some(Credentials::new(access_key, secret_key)))
            }
            None => (s, None),
        };

        if address.is_empty() {
            return Err(StaticNodeParseError::Address(s.to_string()));
        }

        Ok(Self {
            address: address.to_string(),
            credentials,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StaticNodeParseError {
    #[error("missing node address in {0:?}")]
    Address(String),
    #[error("credentials must be access_key:secret_key in {0:?}")]
    Credentials(String),
}

/// A fixed list of nodes. The query pattern is not applied; every
/// configured node is considered live.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    nodes: Vec<StaticNode>,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<StaticNode>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl MembershipDiscovery for StaticDiscovery {
    async fn list_nodes(&self, _query: &NodeQuery) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        Ok(self
            .nodes
            .iter()
            .map(|node| {
                NodeDescriptor::new(
                    node.address.as_str(),
                    node.address.as_str(),
                    node.credentials.clone(),
                )
            })
            .collect())
    }
}
