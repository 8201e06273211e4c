//! Discovery through the Docker Engine HTTP API.
//!
//! Nodes are running containers whose name matches the query pattern. A
//! node's address is its IP on the shared network plus the node port; its
//! credentials come from the container environment.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{DiscoveryError, MembershipDiscovery, NodeDescriptor, NodeQuery};

pub const DEFAULT_DOCKER_HOST: &str = "tcp://127.0.0.1:2375";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSummary {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDetails {
    #[serde(default)]
    config: ContainerConfig,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default)]
    networks: HashMap<String, EndpointSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

#[derive(Debug, Clone)]
pub struct DockerDiscovery {
    client: reqwest::Client,
    base: Url,
    network: String,
    node_port: u16,
}

impl DockerDiscovery {
    /// Connect to the engine at `docker_host` (`tcp://host:port` or
    /// `http(s)://host:port`) and verify that `network` exists.
    pub async fn connect(
        client: reqwest::Client,
        docker_host: &str,
        network: &str,
        node_port: u16,
    ) -> Result<Self, DiscoveryError> {
        let mut discovery = Self {
            client,
            base: Self::engine_url(docker_host)?,
            network: network.to_string(),
            node_port,
        };
        discovery.network = discovery.resolve_network().await?;
        tracing::info!(
            docker_host = %discovery.base,
            network = %discovery.network,
            "docker discovery ready"
        );
        Ok(discovery)
    }

    fn engine_url(docker_host: &str) -> Result<Url, DiscoveryError> {
        let normalized = match docker_host.split_once("://") {
            Some(("tcp", rest)) => format!("http://{}", rest),
            Some(("http" | "https", _)) => docker_host.to_string(),
            Some((scheme, _)) => {
                return Err(DiscoveryError::InvalidEndpoint(format!(
                    "unsupported docker host scheme '{}', expose the engine over tcp",
                    scheme
                )))
            }
            None => format!("http://{}", docker_host),
        };
        Url::parse(&normalized).map_err(|e| DiscoveryError::InvalidEndpoint(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, DiscoveryError> {
        self.base
            .join(path)
            .map_err(|e| DiscoveryError::InvalidEndpoint(e.to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        filters: Option<serde_json::Value>,
    ) -> Result<T, DiscoveryError> {
        let mut request = self.client.get(self.endpoint(path)?);
        if let Some(filters) = filters {
            request = request.query(&[("filters", filters.to_string())]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status, response.text().await?));
        }
        Ok(response.json::<T>().await?)
    }

    /// The engine's name for the configured network.
    ///
    /// The engine filters names by substring, so an exact match wins; otherwise
    /// exactly one network must match.
    async fn resolve_network(&self) -> Result<String, DiscoveryError> {
        let filters = serde_json::json!({ "name": [self.network] });
        let networks: Vec<NetworkSummary> = self.get_json("/networks", Some(filters)).await?;
        Self::pick_network(&self.network, networks)
    }

    fn pick_network(wanted: &str, networks: Vec<NetworkSummary>) -> Result<String, DiscoveryError> {
        if networks.iter().any(|n| n.name == wanted) {
            return Ok(wanted.to_string());
        }
        let mut networks = networks.into_iter();
        match (networks.next(), networks.next()) {
            (Some(only), None) => Ok(only.name),
            _ => Err(DiscoveryError::NetworkNotFound(wanted.to_string())),
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDetails, DiscoveryError> {
        self.get_json(&format!("/containers/{}/json", container_id), None)
            .await
    }

    fn descriptor(
        &self,
        summary: &ContainerSummary,
        details: ContainerDetails,
        query: &NodeQuery,
    ) -> Option<NodeDescriptor> {
        let ip = details
            .network_settings
            .networks
            .get(&self.network)
            .map(|endpoint| endpoint.ip_address.as_str())
            .filter(|ip| !ip.is_empty());

        let Some(ip) = ip else {
            tracing::warn!(
                container = %summary.id,
                names = ?summary.names,
                network = %self.network,
                "container has no address on the shared network, skipping"
            );
            return None;
        };

        let env = details.config.env.unwrap_or_default();
        let credentials = query.credential_vars.extract(&env);

        Some(NodeDescriptor::new(
            ip,
            format!("{}:{}", ip, self.node_port),
            credentials,
        ))
    }
}

#[async_trait]
impl MembershipDiscovery for DockerDiscovery {
    async fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        let filters = serde_json::json!({
            "name": [query.pattern],
            "status": ["running"],
        });
        let containers: Vec<ContainerSummary> =
            self.get_json("/containers/json", Some(filters)).await?;
        tracing::debug!(count = containers.len(), pattern = %query.pattern, "listed containers");

        let mut nodes = Vec::with_capacity(containers.len());
        for container in &containers {
            let details = self.inspect(&container.id).await?;
            if let Some(node) = self.descriptor(container, details, query) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}
