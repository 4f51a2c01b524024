//! Side-car profiles.
//!
//! A [`Profile`] is the fixed configuration of one kind of side-car: image,
//! ports, environment, credentials, startup command and readiness check.
//! [`Sidecar`] runs any profile through the one lifecycle controller,
//! [`DockerContainer`], so every side-car gets the same startup cleanup,
//! log forwarding and scoped teardown.
//!
//! Images are overridable with `<PREFIX>_TESTCONTAINER_IMAGE_ID` and log
//! forwarding is disabled with `<PREFIX>_TESTCONTAINER_DISABLE_LOGGING`.
//! Credentials fall back to well-known test defaults when unset.

use crate::config::Settings;
use crate::container::{
    ContainerError, ContainerSpec, ContainerSpecBuilder, DockerClient, DockerContainer, HostPort,
    ReadinessPolicy, Result,
};
use crate::env;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub mod database;
pub mod dynamodb_admin;
pub mod localstack;
pub mod minio;
pub mod moto;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sftp;
pub mod tomodachi;
pub mod wiremock;

pub use database::DatabaseUrl;
pub use dynamodb_admin::DynamoDbAdmin;
pub use localstack::LocalStack;
pub use minio::Minio;
pub use moto::Moto;
#[cfg(feature = "mysql")]
pub use mysql::MySql;
#[cfg(feature = "postgres")]
pub use postgres::Postgres;
pub use sftp::Sftp;
pub use tomodachi::Tomodachi;
pub use wiremock::WireMock;

/// Configuration of one kind of side-car.
#[async_trait]
pub trait Profile: Send + Sync {
    /// Kind used in log labels, e.g. `MinioContainer`.
    fn kind(&self) -> &'static str;

    /// Main container port, used for the internal and external URLs.
    fn internal_port(&self) -> u16;

    /// Add image, ports, environment and command to a spec.
    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder>;

    fn readiness(&self) -> ReadinessPolicy;

    fn logging_disabled(&self) -> bool {
        false
    }

    /// Setup that needs the running container, e.g. uploads or a DB probe.
    async fn after_start(&self, _container: &DockerContainer) -> Result<()> {
        Ok(())
    }

    /// Message logged once the side-car is ready.
    fn banner(&self, _container: &DockerContainer) -> Option<String> {
        None
    }
}

/// A profile bound to its container.
#[derive(Debug)]
pub struct Sidecar<P: Profile> {
    profile: P,
    container: DockerContainer,
    readiness: ReadinessPolicy,
}

impl<P: Profile> Sidecar<P> {
    /// Prepare a side-car on the network from `TESTCONTAINER_DOCKER_NETWORK`.
    ///
    /// # Errors
    ///
    /// Returns error if the profile cannot produce a valid spec.
    pub fn new(client: DockerClient, profile: P) -> Result<Self> {
        Self::build(client, profile, None)
    }

    /// Prepare a side-car using resolved settings for network and timeouts.
    ///
    /// # Errors
    ///
    /// Returns error if the profile cannot produce a valid spec.
    pub fn with_settings(client: DockerClient, profile: P, settings: &Settings) -> Result<Self> {
        Self::build(client, profile, Some(settings))
    }

    fn build(client: DockerClient, profile: P, settings: Option<&Settings>) -> Result<Self> {
        let mut spec = ContainerSpec::builder();
        let mut readiness = profile.readiness();
        let mut stop_timeout = Settings::default().stop_timeout_secs;

        if let Some(settings) = settings {
            spec = spec.network(&settings.docker_network);
            if let Some(timeout) = settings.readiness_timeout() {
                readiness = readiness.with_timeout(timeout);
            }
            stop_timeout = settings.stop_timeout_secs;
        }

        let spec = profile.configure(spec)?.build()?;
        let container = DockerContainer::new(client, spec)
            .with_kind(profile.kind())
            .disable_logging(profile.logging_disabled())
            .stop_timeout(stop_timeout);

        Ok(Self {
            profile,
            container,
            readiness,
        })
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn container(&self) -> &DockerContainer {
        &self.container
    }

    pub fn readiness(&self) -> &ReadinessPolicy {
        &self.readiness
    }

    /// Start, wait for readiness and run the profile's setup.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; the container is removed
    /// unless the failure was a name collision.
    pub async fn start(&mut self) -> Result<()> {
        self.container.start_and_wait(&self.readiness).await?;
        if let Err(e) = self.profile.after_start(&self.container).await {
            return Err(self.container.abort(e).await);
        }
        if let Some(banner) = self.profile.banner(&self.container) {
            info!(container = %self.container.label(), "{}", banner);
        }
        Ok(())
    }

    /// Stop and remove the container. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if removal fails for a reason other than the container
    /// being gone.
    pub async fn stop(&mut self) -> Result<()> {
        self.container.stop().await
    }

    /// Restart in place.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or the restart fails.
    pub async fn restart(&self) -> Result<()> {
        self.container.restart().await
    }

    /// Run `body` against the ready side-car, then stop it whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the startup or body error. A stop error is returned only if
    /// everything else succeeded.
    pub async fn scoped<T, F>(mut self, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&Sidecar<P>) -> Result<T>,
    {
        self.start().await?;
        let outcome = body(&self).await;
        let stopped = self.stop().await;
        match (outcome, stopped) {
            (Ok(value), stopped) => stopped.map(|()| value),
            (Err(e), _) => Err(e),
        }
    }

    /// In-network address of the main port.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or not attached.
    pub async fn internal_address(&self) -> Result<HostPort> {
        self.container
            .internal_address(self.profile.internal_port())
            .await
    }

    /// Host-side address of the main port.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn external_address(&self) -> Result<HostPort> {
        self.container
            .external_address(self.profile.internal_port())
            .await
    }

    /// `http://` URL of the main port inside the network.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or not attached.
    pub async fn internal_url(&self) -> Result<String> {
        Ok(self.internal_address().await?.http_url())
    }

    /// `http://` URL of the main port from the test process.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn external_url(&self) -> Result<String> {
        Ok(self.external_address().await?.http_url())
    }

    /// Addresses of the running side-car.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or not attached.
    pub async fn connection_info(&self) -> Result<ConnectionInfo> {
        Ok(ConnectionInfo {
            kind: self.profile.kind().to_string(),
            name: self.container.name().to_string(),
            internal: self.internal_address().await?,
            external: self.external_address().await?,
        })
    }
}

/// How to reach a running side-car.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub kind: String,
    pub name: String,
    pub internal: HostPort,
    pub external: HostPort,
}

/// Client settings for the AWS emulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwsClientConfig {
    pub region_name: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub endpoint_url: String,
}

/// Region and static credentials for AWS emulators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl AwsCredentials {
    /// Read `AWS_*` variables, falling back to `default_region` and `testing`.
    pub fn from_env(default_region: &str) -> Self {
        Self {
            region: env::var_or(env::aws::AWS_DEFAULT_REGION, default_region),
            access_key_id: env::var_or(env::aws::AWS_ACCESS_KEY_ID, env::aws::DEFAULT_CREDENTIAL),
            secret_access_key: env::var_or(
                env::aws::AWS_SECRET_ACCESS_KEY,
                env::aws::DEFAULT_CREDENTIAL,
            ),
        }
    }

    pub fn client_config(&self, endpoint_url: String) -> AwsClientConfig {
        AwsClientConfig {
            region_name: self.region.clone(),
            aws_access_key_id: self.access_key_id.clone(),
            aws_secret_access_key: self.secret_access_key.clone(),
            endpoint_url,
        }
    }
}

/// A free TCP port on the host.
///
/// # Errors
///
/// Returns error if no ephemeral port can be bound.
pub fn available_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("0.0.0.0", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Edge port if set, else a free one.
pub(crate) fn edge_port_or_available(edge_port: Option<u16>) -> Result<u16> {
    match edge_port {
        Some(port) => Ok(port),
        None => available_port(),
    }
}

/// Host port a running container publishes for `container_port`.
pub(crate) fn published_port(container: &DockerContainer, container_port: u16) -> Result<u16> {
    container.spec().host_port(container_port).ok_or_else(|| {
        ContainerError::ConfigError(format!(
            "Port {} is not published by {}",
            container_port,
            container.label()
        ))
    })
}
