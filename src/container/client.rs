//! Docker client handle.
//!
//! Provides a thin wrapper around the bollard Docker API. The handle is
//! constructed once by the test session and passed to every component that
//! needs the daemon, rather than living in a process-wide global.

use crate::container::{ContainerError, Result};
use crate::env;
use bollard::Docker;
use bollard::models::ContainerInspectResponse;
use futures::stream::StreamExt;
use std::path::Path;
use tracing::{debug, info};

/// Docker client configuration.
#[derive(Debug, Clone)]
pub struct DockerClientConfig {
    /// Connection timeout in seconds
    pub timeout: u64,
}

impl Default for DockerClientConfig {
    fn default() -> Self {
        Self { timeout: 120 }
    }
}

/// How the daemon connection was established, so it can be re-opened from
/// another runtime (see the drop guard in the lifecycle controller).
#[derive(Debug, Clone)]
enum Connection {
    Defaults,
    Socket(String),
}

/// Docker API client handle.
///
/// Cheap to clone; clones share the same underlying connection pool.
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
    connection: Connection,
    config: DockerClientConfig,
}

impl std::fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerClient")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .finish()
    }
}

impl DockerClient {
    /// Connect to the Docker daemon with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the daemon is unreachable.
    pub async fn new() -> Result<Self> {
        Self::with_config(DockerClientConfig::default()).await
    }

    /// Connect to the Docker daemon with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the daemon is unreachable.
    pub async fn with_config(config: DockerClientConfig) -> Result<Self> {
        let (docker, connection) = Self::connect(&config)?;
        let client = Self {
            docker,
            connection,
            config,
        };

        client.ping().await?;

        Ok(client)
    }

    /// Connect to the daemon.
    ///
    /// Tries, in order:
    /// 1. `DOCKER_HOST` or the platform default socket
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    fn connect(config: &DockerClientConfig) -> Result<(Docker, Connection)> {
        debug!("Attempting to connect to Docker daemon...");

        match Docker::connect_with_defaults() {
            Ok(docker) => {
                info!("Connected to Docker daemon via defaults");
                return Ok((docker, Connection::Defaults));
            }
            Err(e) => {
                debug!("Default connection failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(
                    &socket,
                    config.timeout,
                    bollard::API_DEFAULT_VERSION,
                ) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok((docker, Connection::Socket(socket)));
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(ContainerError::Other(
            "Failed to connect to Docker. Please ensure Docker is installed and running."
                .to_string(),
        ))
    }

    /// Open a fresh connection to the same daemon.
    ///
    /// Used when the original connection cannot be driven, e.g. from a drop
    /// handler running on a throwaway runtime.
    pub(crate) fn reconnect(&self) -> Result<Docker> {
        let docker = match &self.connection {
            Connection::Defaults => Docker::connect_with_defaults()?,
            Connection::Socket(socket) => {
                Docker::connect_with_socket(socket, self.config.timeout, bollard::API_DEFAULT_VERSION)?
            }
        };
        Ok(docker)
    }

    /// Ping the daemon to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::Other(format!("Failed to ping Docker daemon: {}", e)))?;
        debug!("Docker daemon ping successful");
        Ok(())
    }

    /// Get the underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Inspect a container by name or ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] if the container does not exist.
    pub async fn inspect_container(&self, name_or_id: &str) -> Result<ContainerInspectResponse> {
        self.docker
            .inspect_container(
                name_or_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => ContainerError::NotFound(name_or_id.to_string()),
                e => ContainerError::ApiError(e),
            })
    }

    /// Check if a container exists by name or ID.
    ///
    /// # Errors
    ///
    /// Returns error if inspection fails for reasons other than not found.
    pub async fn container_exists(&self, name_or_id: &str) -> Result<bool> {
        match self.inspect_container(name_or_id).await {
            Ok(_) => Ok(true),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get container state (running, stopped, etc.) by name or ID.
    ///
    /// # Errors
    ///
    /// Returns error if container is not found or inspection fails.
    pub async fn container_state(&self, name_or_id: &str) -> Result<ContainerState> {
        let inspect = self.inspect_container(name_or_id).await?;

        let state = inspect.state.ok_or_else(|| {
            ContainerError::Other(format!("Container {} has no state", name_or_id))
        })?;

        if state.running.unwrap_or(false) {
            Ok(ContainerState::Running)
        } else if state.paused.unwrap_or(false) {
            Ok(ContainerState::Paused)
        } else if state.restarting.unwrap_or(false) {
            Ok(ContainerState::Restarting)
        } else if state.dead.unwrap_or(false) {
            Ok(ContainerState::Dead)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    /// Check if an image exists locally.
    ///
    /// # Errors
    ///
    /// Returns error if image inspection fails.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    /// Get combined stdout and stderr of a container.
    ///
    /// # Errors
    ///
    /// Returns error if log retrieval fails.
    pub async fn logs(&self, container_id: &str) -> Result<String> {
        let mut stream = self.docker.logs(
            container_id,
            Some(bollard::container::LogsOptions::<String> {
                stdout: true,
                stderr: true,
                timestamps: false,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );
        let mut output = String::new();

        while let Some(result) = stream.next().await {
            match result {
                Ok(log) => {
                    output.push_str(&log.to_string());
                }
                Err(e) => {
                    return Err(ContainerError::ApiError(e));
                }
            }
        }

        Ok(output)
    }

    /// Host name under which the daemon publishes container ports.
    ///
    /// Derived from `DOCKER_HOST`. A local socket publishes on `localhost`,
    /// or on the default gateway when this process runs inside a container.
    /// Returns `None` if `DOCKER_HOST` cannot be parsed.
    pub fn daemon_host(&self) -> Option<String> {
        let docker_host = env::var(env::DOCKER_HOST);
        if is_local_socket(docker_host.as_deref()) && Self::inside_container() {
            let gateway = std::fs::read_to_string(ROUTE_TABLE)
                .ok()
                .and_then(|table| default_gateway(&table));
            if let Some(gateway) = gateway {
                return Some(gateway);
            }
            debug!("No default gateway in {}, using localhost", ROUTE_TABLE);
        }
        daemon_host_from(docker_host.as_deref())
    }

    /// Whether `DOCKER_HOST` points at a daemon other than a local socket.
    pub fn remote_host_configured(&self) -> bool {
        !is_local_socket(env::var(env::DOCKER_HOST).as_deref())
    }

    /// Whether the current process itself runs inside a container.
    pub fn inside_container() -> bool {
        Path::new("/.dockerenv").exists()
    }
}

const ROUTE_TABLE: &str = "/proc/net/route";

/// Whether a `DOCKER_HOST` value (or its absence) means a local socket.
pub(crate) fn is_local_socket(docker_host: Option<&str>) -> bool {
    match docker_host {
        None => true,
        Some(host) => host.starts_with("unix://") || host.starts_with("npipe://"),
    }
}

/// Default gateway from a Linux `/proc/net/route` table.
///
/// Addresses in the table are little-endian hex.
pub(crate) fn default_gateway(route_table: &str) -> Option<String> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_, "00000000", gateway, ..] => {
                let raw = u32::from_str_radix(gateway, 16).ok()?;
                Some(std::net::Ipv4Addr::from(raw.to_le_bytes()).to_string())
            }
            _ => None,
        }
    })
}

/// Resolve the daemon's published host from a `DOCKER_HOST` value.
pub(crate) fn daemon_host_from(docker_host: Option<&str>) -> Option<String> {
    let Some(docker_host) = docker_host else {
        return Some("localhost".to_string());
    };

    let url = url::Url::parse(docker_host).ok()?;
    match url.scheme() {
        "tcp" | "http" | "https" | "ssh" => url.host_str().map(str::to_string),
        "unix" | "npipe" => Some("localhost".to_string()),
        _ => None,
    }
}

/// Container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is stopped
    Stopped,
    /// Container is dead
    Dead,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_host_local_socket() {
        assert_eq!(daemon_host_from(None), Some("localhost".to_string()));
        assert_eq!(
            daemon_host_from(Some("unix:///var/run/docker.sock")),
            Some("localhost".to_string())
        );
        assert_eq!(
            daemon_host_from(Some("npipe:////./pipe/docker_engine")),
            Some("localhost".to_string())
        );
    }

    #[test]
    fn test_daemon_host_remote() {
        assert_eq!(
            daemon_host_from(Some("tcp://192.168.99.100:2376")),
            Some("192.168.99.100".to_string())
        );
        assert_eq!(
            daemon_host_from(Some("http://docker.internal:2375")),
            Some("docker.internal".to_string())
        );
    }

    #[test]
    fn test_local_socket_detection() {
        assert!(is_local_socket(None));
        assert!(is_local_socket(Some("unix:///var/run/docker.sock")));
        assert!(!is_local_socket(Some("tcp://192.168.99.100:2376")));
    }

    #[test]
    fn test_default_gateway_from_route_table() {
        let table = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT\n\
                     eth0\t00000000\t010011AC\t0003\t0\t0\t0\t00000000\t0\t0\t0\n\
                     eth0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0\n";
        assert_eq!(default_gateway(table), Some("172.17.0.1".to_string()));

        let no_default = "Iface\tDestination\tGateway\n\
                          eth0\t000011AC\t00000000\n";
        assert_eq!(default_gateway(no_default), None);
    }

    #[test]
    fn test_daemon_host_unparsable() {
        assert_eq!(daemon_host_from(Some("not a url")), None);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_client_connection() {
        let client = DockerClient::new().await.unwrap();
        client.ping().await.unwrap();
    }
}
