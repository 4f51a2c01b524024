//! Container spec builder.
//!
//! Provides a fluent API for describing a container before it is created.
//! Everything here is fixed once [`ContainerSpecBuilder::build`] returns; the
//! lifecycle controller never mutates a spec, so port bindings cannot change
//! after construction.

use crate::container::{ContainerError, Result};
use crate::env;
use bollard::service::{HostConfig, PortBinding};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A host path mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Path on the Docker host
    pub host_path: PathBuf,
    /// Path inside the container
    pub container_path: String,
    /// Mount read-only (the default)
    pub read_only: bool,
}

impl VolumeMount {
    /// Docker bind string, `host:container:ro|rw`.
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Container spec builder.
#[derive(Debug, Default)]
pub struct ContainerSpecBuilder {
    image: Option<String>,
    name: Option<String>,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    env: BTreeMap<String, String>,
    labels: HashMap<String, String>,
    ports: BTreeMap<u16, u16>,
    volumes: Vec<VolumeMount>,
    network: Option<String>,
    working_dir: Option<String>,
    user: Option<String>,
    privileged: bool,
}

impl ContainerSpecBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container image (tag or ID).
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the container name. A short random name is generated if unset.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the startup command from a shell-like string.
    ///
    /// The string is split the way a POSIX shell would split it, so
    /// `"sh -c 'echo hi'"` becomes `["sh", "-c", "echo hi"]`.
    pub fn command<S: AsRef<str>>(mut self, command: S) -> Self {
        let command = command.as_ref();
        let args = shell_words::split(command)
            .unwrap_or_else(|_| command.split_whitespace().map(String::from).collect());
        self.command = Some(args);
        self
    }

    /// Set the startup command as separate arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(args.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Override the image entrypoint.
    pub fn entrypoint<I, S>(mut self, entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = Some(entrypoint.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Set an environment variable. A later value for the same key wins.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables.
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in envs {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Add a label to the container.
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Publish a container TCP port on a host port.
    pub fn port_binding(mut self, container_port: u16, host_port: u16) -> Self {
        self.ports.insert(container_port, host_port);
        self
    }

    /// Mount a host path read-only.
    pub fn volume<P: Into<PathBuf>, S: Into<String>>(self, host_path: P, container_path: S) -> Self {
        self.volume_with_mode(host_path, container_path, true)
    }

    /// Mount a host path with an explicit mode.
    pub fn volume_with_mode<P: Into<PathBuf>, S: Into<String>>(
        mut self,
        host_path: P,
        container_path: S,
        read_only: bool,
    ) -> Self {
        self.volumes.push(VolumeMount {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only,
        });
        self
    }

    /// Attach to a Docker network. Defaults to `TESTCONTAINER_DOCKER_NETWORK` or `bridge`.
    pub fn network<S: Into<String>>(mut self, network: S) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Set the working directory in the container.
    pub fn working_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set user to run as in the container.
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run container in privileged mode.
    pub fn privileged(mut self, enable: bool) -> Self {
        self.privileged = enable;
        self
    }

    /// Network the container will attach to.
    pub fn network_name(&self) -> String {
        self.network.clone().unwrap_or_else(|| {
            env::var_or(env::TESTCONTAINER_DOCKER_NETWORK, env::DEFAULT_DOCKER_NETWORK)
        })
    }

    /// Build the spec.
    ///
    /// # Errors
    ///
    /// Returns error if the image is missing or the name is empty.
    pub fn build(self) -> Result<ContainerSpec> {
        let network = self.network_name();
        let image = self
            .image
            .filter(|image| !image.is_empty())
            .ok_or_else(|| ContainerError::ConfigError("Image is required".to_string()))?;

        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ContainerError::ConfigError(
                    "Container name must not be empty".to_string(),
                ));
            }
            Some(name) => name,
            None => generate_name(),
        };

        Ok(ContainerSpec {
            image,
            name,
            command: self.command,
            entrypoint: self.entrypoint,
            env: self.env,
            labels: self.labels,
            ports: self.ports,
            volumes: self.volumes,
            network,
            working_dir: self.working_dir,
            user: self.user,
            privileged: self.privileged,
        })
    }
}

/// Short random container name.
pub(crate) fn generate_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

/// Immutable description of a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    image: String,
    name: String,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    env: BTreeMap<String, String>,
    labels: HashMap<String, String>,
    ports: BTreeMap<u16, u16>,
    volumes: Vec<VolumeMount>,
    network: String,
    working_dir: Option<String>,
    user: Option<String>,
    privileged: bool,
}

impl ContainerSpec {
    /// Create a new spec builder.
    pub fn builder() -> ContainerSpecBuilder {
        ContainerSpecBuilder::new()
    }

    /// Image tag or ID.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network the container attaches to.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Startup command arguments.
    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    /// Environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Container port to host port bindings.
    pub fn ports(&self) -> &BTreeMap<u16, u16> {
        &self.ports
    }

    /// Host port bound to a container port.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports.get(&container_port).copied()
    }

    /// Mounted volumes.
    pub fn volumes(&self) -> &[VolumeMount] {
        &self.volumes
    }

    /// Environment in Docker's `KEY=value` form.
    pub(crate) fn env_list(&self) -> Option<Vec<String>> {
        if self.env.is_empty() {
            return None;
        }
        Some(self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect())
    }

    /// Ports in Docker's `port/tcp` exposed-port form.
    pub(crate) fn exposed_ports(&self) -> Option<HashMap<String, HashMap<(), ()>>> {
        if self.ports.is_empty() {
            return None;
        }
        Some(
            self.ports
                .keys()
                .map(|port| (format!("{}/tcp", port), HashMap::new()))
                .collect(),
        )
    }

    /// Host configuration for container creation.
    pub(crate) fn host_config(&self) -> HostConfig {
        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = self
            .ports
            .iter()
            .map(|(container_port, host_port)| {
                (
                    format!("{}/tcp", container_port),
                    Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let binds: Vec<String> = self.volumes.iter().map(VolumeMount::to_bind).collect();

        HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            network_mode: Some(self.network.clone()),
            privileged: Some(self.privileged),
            ..Default::default()
        }
    }

    /// Bollard container configuration.
    pub(crate) fn to_bollard(&self) -> bollard::container::Config<String> {
        bollard::container::Config {
            image: Some(self.image.clone()),
            cmd: self.command.clone(),
            entrypoint: self.entrypoint.clone(),
            env: self.env_list(),
            exposed_ports: self.exposed_ports(),
            labels: if self.labels.is_empty() {
                None
            } else {
                Some(self.labels.clone())
            },
            working_dir: self.working_dir.clone(),
            user: self.user.clone(),
            host_config: Some(self.host_config()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_spec() {
        let spec = ContainerSpec::builder()
            .image("alpine:latest")
            .name("my-container")
            .network("bridge")
            .build()
            .unwrap();

        assert_eq!(spec.image(), "alpine:latest");
        assert_eq!(spec.name(), "my-container");
        assert_eq!(spec.network(), "bridge");
    }

    #[test]
    fn test_generated_name() {
        let first = ContainerSpec::builder().image("alpine").build().unwrap();
        let second = ContainerSpec::builder().image("alpine").build().unwrap();

        assert_eq!(first.name().len(), 16);
        assert_ne!(first.name(), second.name());
    }

    #[test]
    fn test_command_string_is_split_like_a_shell() {
        let spec = ContainerSpec::builder()
            .image("alpine")
            .command(r#"server /data --address ":9000" --console-address ":9001""#)
            .build()
            .unwrap();

        assert_eq!(
            spec.command().unwrap(),
            &["server", "/data", "--address", ":9000", "--console-address", ":9001"]
        );

        let spec = ContainerSpec::builder()
            .image("alpine")
            .command("sh -c 'echo hello && sleep infinity'")
            .build()
            .unwrap();
        assert_eq!(
            spec.command().unwrap(),
            &["sh", "-c", "echo hello && sleep infinity"]
        );
    }

    #[test]
    fn test_env_keys_are_unique() {
        let spec = ContainerSpec::builder()
            .image("alpine")
            .env("FOO", "bar")
            .env("BAZ", "qux")
            .env("FOO", "overridden")
            .build()
            .unwrap();

        let env = spec.env_list().unwrap();
        assert_eq!(env.len(), 2);
        assert!(env.contains(&"FOO=overridden".to_string()));
        assert!(env.contains(&"BAZ=qux".to_string()));
    }

    #[test]
    fn test_port_bindings() {
        let spec = ContainerSpec::builder()
            .image("minio/minio")
            .port_binding(9000, 49000)
            .port_binding(9001, 49001)
            .build()
            .unwrap();

        assert_eq!(spec.host_port(9000), Some(49000));
        assert_eq!(spec.host_port(9001), Some(49001));
        assert_eq!(spec.host_port(22), None);

        let host_config = spec.host_config();
        let bindings = host_config.port_bindings.unwrap();
        let binding = bindings["9000/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("49000"));

        let exposed = spec.exposed_ports().unwrap();
        assert!(exposed.contains_key("9001/tcp"));
    }

    #[test]
    fn test_volumes_default_to_read_only() {
        let spec = ContainerSpec::builder()
            .image("motoserver/moto")
            .volume("/var/run/docker.sock", "/var/run/docker.sock")
            .volume_with_mode("/tmp/data", "/data", false)
            .build()
            .unwrap();

        let binds = spec.host_config().binds.unwrap();
        assert_eq!(
            binds,
            vec![
                "/var/run/docker.sock:/var/run/docker.sock:ro".to_string(),
                "/tmp/data:/data:rw".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_image_error() {
        let result = ContainerSpec::builder().command("echo").build();

        assert!(result.is_err());
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }

    #[test]
    fn test_empty_name_error() {
        let result = ContainerSpec::builder().image("alpine").name("  ").build();
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }
}
