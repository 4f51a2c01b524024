//! Docker container lifecycle management for integration tests.
//!
//! This module wraps the bollard Docker API with the pieces a test needs to run
//! short-lived side-car containers: image provisioning, container creation with
//! fixed port bindings, readiness probing, address resolution and guaranteed
//! teardown.
//!
//! ## Architecture
//!
//! - [`client`]: Docker client handle, explicitly constructed and passed around
//! - [`image`]: Image provisioning (pull, BuildKit CLI build, classic API build, release)
//! - [`config`]: Container spec builder (image, name, env, ports, volumes, command)
//! - [`network`]: Internal/external address resolution and network helpers
//! - [`lifecycle`]: The container lifecycle controller
//! - [`readiness`]: HTTP and log-pattern readiness probes
//! - [`executor`]: Command execution within running containers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tomodachi_testcontainers::container::{
//!     ContainerSpec, DockerClient, DockerContainer, LogProbe, ReadinessPolicy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DockerClient::new().await?;
//!
//!     let spec = ContainerSpec::builder()
//!         .image("alpine:latest")
//!         .command("sh -c 'echo ready && sleep infinity'")
//!         .build()?;
//!
//!     let policy = ReadinessPolicy::Log(LogProbe::new("ready")?);
//!     let container = DockerContainer::new(client, spec);
//!
//!     container
//!         .scoped(&policy, async |container| {
//!             let output = container.exec(["echo", "hello"]).await?;
//!             println!("{}", output.stdout);
//!             Ok(())
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

mod archive;
mod client;
mod config;
mod executor;
mod image;
mod lifecycle;
mod network;
mod readiness;

pub use client::{ContainerState, DockerClient, DockerClientConfig};
pub use config::{ContainerSpec, ContainerSpecBuilder, VolumeMount};
pub use executor::{ExecConfig, ExecOutput};
pub use image::{BuildBackend, BuildParams, Image, ImageOrigin, ImageProvisioner, ImageSource};
pub use lifecycle::{DockerContainer, LifecycleState};
pub use network::{AddressResolver, Endpoint, HostPort, NetworkManager};
pub use readiness::{
    HttpProbe, LogProbe, ReadinessPolicy, wait_for_http_healthcheck, wait_for_logs,
};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container or image not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// A container with the requested name is already present on the daemon
    #[error("Container with name '{0}' already exists")]
    AlreadyExists(String),

    /// Image build failed; carries the backend's diagnostic output
    #[error("Image build failed with {backend} backend: {output}")]
    BuildError {
        backend: BuildBackend,
        output: String,
    },

    /// Readiness probe gave up; carries the last observed symptom
    #[error("Readiness check for {target} timed out: {symptom}")]
    ReadinessError { target: String, symptom: String },

    /// Container has no endpoint on the requested network
    #[error("Container {container} is not attached to network '{network}'")]
    NotAttached { container: String, network: String },

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Command execution error
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Database connection error
    #[cfg(any(feature = "postgres", feature = "mysql"))]
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Whether the error is a daemon response with the given HTTP status.
    pub fn is_status(&self, code: u16) -> bool {
        matches!(
            self,
            ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) if *status_code == code
        )
    }

    /// Cleanup races with other test workers that are safe to ignore.
    ///
    /// Covers resources that are already gone, removals already in progress,
    /// and images still referenced by another worker's container.
    pub fn is_benign_cleanup(&self) -> bool {
        match self {
            ContainerError::NotFound(_) => true,
            ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }) => true,
            ContainerError::ApiError(bollard::errors::Error::DockerResponseServerError {
                status_code: 409,
                message,
            }) => {
                message.contains("already in progress")
                    || message.contains("is being used by")
                    || message.contains("is using its referenced image")
            }
            _ => false,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
