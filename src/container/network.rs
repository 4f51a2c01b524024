//! Container addressing and network management.
//!
//! A container is reachable two ways: from another container on the same
//! Docker network (the *internal* address) and from the test process itself
//! (the *external* address). The resolver computes both on demand from the
//! container's current network settings; nothing is cached.

use crate::container::{ContainerError, DockerClient, Result};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// A container's endpoint on one Docker network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Container IP on the network
    pub ip_address: String,
    /// Network gateway IP
    pub gateway: String,
}

/// A host and port pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `http://host:port` base URL.
    pub fn http_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolves container addresses on a given network.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    client: DockerClient,
    network: String,
}

impl AddressResolver {
    pub fn new<S: Into<String>>(client: DockerClient, network: S) -> Self {
        Self {
            client,
            network: network.into(),
        }
    }

    /// Look up the container's endpoint on the resolver's network.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotAttached`] if the container has no
    /// endpoint (or no IP yet) on the network.
    pub async fn endpoint(&self, container: &str) -> Result<Endpoint> {
        let inspect = self.client.inspect_container(container).await?;
        let networks = inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default();

        endpoint_from(&networks, &self.network).ok_or_else(|| ContainerError::NotAttached {
            container: container.to_string(),
            network: self.network.clone(),
        })
    }

    /// Host under which other containers on the network reach this one.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotAttached`] if the container is not on the network.
    pub async fn internal_host(&self, container: &str) -> Result<String> {
        Ok(self.endpoint(container).await?.ip_address)
    }

    /// Address under which the test process reaches `container_port`,
    /// published on the host as `published_port`.
    ///
    /// # Errors
    ///
    /// Returns error if the container must be looked up and is not attached.
    pub async fn external_address(
        &self,
        container: &str,
        container_port: u16,
        published_port: u16,
    ) -> Result<HostPort> {
        let daemon_host = self.client.daemon_host();
        let in_container =
            DockerClient::inside_container() && !self.client.remote_host_configured();

        if !in_container {
            return Ok(select_external_address(
                daemon_host.as_deref(),
                None,
                container_port,
                published_port,
            ));
        }

        let endpoint = self.endpoint(container).await?;
        let address = select_external_address(
            daemon_host.as_deref(),
            Some(&endpoint),
            container_port,
            published_port,
        );
        debug!("Resolved external address {} for {} from inside a container", address, container);
        Ok(address)
    }
}

/// Pick the external address.
///
/// `endpoint` is given only when the test process runs inside a container
/// without a remote daemon. Published ports are then reached through the
/// network gateway. If the gateway is the daemon host itself, the container
/// is reached directly on its own IP and unpublished port. Otherwise the
/// daemon host is used, or `localhost` if the daemon reports none.
pub(crate) fn select_external_address(
    daemon_host: Option<&str>,
    endpoint: Option<&Endpoint>,
    container_port: u16,
    published_port: u16,
) -> HostPort {
    let daemon_host = daemon_host.filter(|h| !h.is_empty()).unwrap_or("localhost");

    match endpoint {
        Some(endpoint) if endpoint.gateway.is_empty() || endpoint.gateway == daemon_host => {
            HostPort::new(&endpoint.ip_address, container_port)
        }
        Some(endpoint) => HostPort::new(&endpoint.gateway, published_port),
        None => HostPort::new(daemon_host, published_port),
    }
}

fn endpoint_from(
    networks: &HashMap<String, bollard::models::EndpointSettings>,
    network: &str,
) -> Option<Endpoint> {
    let settings = networks.get(network)?;
    let ip_address = settings.ip_address.clone().filter(|ip| !ip.is_empty())?;
    Some(Endpoint {
        ip_address,
        gateway: settings.gateway.clone().unwrap_or_default(),
    })
}

/// Creates and removes Docker networks.
pub struct NetworkManager {
    client: DockerClient,
}

impl NetworkManager {
    /// Create a new network manager.
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }

    /// Create a bridge network and return its ID.
    ///
    /// # Errors
    ///
    /// Returns error if network creation fails.
    pub async fn create(&self, name: &str) -> Result<String> {
        debug!("Creating network: {}", name);

        let response = self
            .client
            .docker()
            .create_network(bollard::network::CreateNetworkOptions {
                name,
                driver: "bridge",
                ..Default::default()
            })
            .await?;

        info!("Created network: {} ({})", name, response.id);
        Ok(response.id)
    }

    /// Make sure a network exists, creating it if needed.
    ///
    /// Predefined networks (`bridge`, `host`, `none`) are never created.
    ///
    /// # Errors
    ///
    /// Returns error if the network cannot be inspected or created. A
    /// concurrent creation by another worker is not an error.
    pub async fn ensure(&self, name: &str) -> Result<()> {
        if matches!(name, "bridge" | "host" | "none") || self.exists(name).await? {
            return Ok(());
        }
        match self.create(name).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_status(409) => {
                debug!("Network {} created concurrently", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Check if a network exists.
    ///
    /// # Errors
    ///
    /// Returns error if network inspection fails.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .client
            .docker()
            .inspect_network(name, None::<bollard::network::InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    /// Remove a network. An already removed network is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if network removal fails.
    pub async fn remove(&self, name: &str) -> Result<()> {
        match self.client.docker().remove_network(name).await {
            Ok(()) => {
                info!("Removed network: {}", name);
                Ok(())
            }
            Err(e) => {
                let e = ContainerError::ApiError(e);
                if e.is_benign_cleanup() {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::EndpointSettings;

    fn endpoint(ip: &str, gateway: &str) -> Endpoint {
        Endpoint {
            ip_address: ip.to_string(),
            gateway: gateway.to_string(),
        }
    }

    #[test]
    fn test_external_address_on_the_host() {
        assert_eq!(
            select_external_address(None, None, 5432, 49153),
            HostPort::new("localhost", 49153)
        );
        assert_eq!(
            select_external_address(Some(""), None, 5432, 49153),
            HostPort::new("localhost", 49153)
        );
        assert_eq!(
            select_external_address(Some("192.168.99.100"), None, 5432, 49153),
            HostPort::new("192.168.99.100", 49153)
        );
    }

    #[test]
    fn test_external_address_inside_container_uses_gateway() {
        // Side-car on a user network, daemon reached through the default bridge
        let ep = endpoint("172.18.0.3", "172.18.0.1");
        assert_eq!(
            select_external_address(Some("172.17.0.1"), Some(&ep), 5432, 49153),
            HostPort::new("172.18.0.1", 49153)
        );
    }

    #[test]
    fn test_external_address_inside_container_gateway_is_daemon_host() {
        let ep = endpoint("172.17.0.3", "172.17.0.1");
        assert_eq!(
            select_external_address(Some("172.17.0.1"), Some(&ep), 5432, 49153),
            HostPort::new("172.17.0.3", 5432)
        );

        let no_gateway = endpoint("10.0.0.7", "");
        assert_eq!(
            select_external_address(Some("172.17.0.1"), Some(&no_gateway), 8080, 49200),
            HostPort::new("10.0.0.7", 8080)
        );
    }

    #[test]
    fn test_endpoint_from_network_settings() {
        let mut networks = HashMap::new();
        networks.insert(
            "bridge".to_string(),
            EndpointSettings {
                ip_address: Some("172.17.0.2".to_string()),
                gateway: Some("172.17.0.1".to_string()),
                ..Default::default()
            },
        );
        networks.insert(
            "starting".to_string(),
            EndpointSettings {
                ip_address: Some(String::new()),
                ..Default::default()
            },
        );

        assert_eq!(
            endpoint_from(&networks, "bridge"),
            Some(endpoint("172.17.0.2", "172.17.0.1"))
        );
        assert_eq!(endpoint_from(&networks, "starting"), None);
        assert_eq!(endpoint_from(&networks, "missing"), None);
    }

    #[test]
    fn test_host_port_url() {
        let hp = HostPort::new("localhost", 9000);
        assert_eq!(hp.to_string(), "localhost:9000");
        assert_eq!(hp.http_url(), "http://localhost:9000");
    }
}
