//! # Tomodachi Testcontainers
//!
//! Ephemeral Docker side-car containers for integration tests: AWS emulators,
//! object storage, relational databases, an HTTP mock server, an SFTP server
//! and the application under test itself.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: Docker client handle, image provisioning, container
//!   lifecycle, readiness probes and address resolution
//! - **[`profiles`]**: Fixed configurations for each kind of side-car
//! - **[`config`]**: Settings from defaults, a TOML file and the environment
//! - **[`probes`]**: Async sampling helpers for eventually-consistent assertions
//! - **[`assertions`]**: Log and timestamp assertions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tomodachi_testcontainers::container::DockerClient;
//! use tomodachi_testcontainers::profiles::{Minio, Sidecar};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DockerClient::new().await?;
//!     let minio = Sidecar::new(client, Minio::from_env()?)?;
//!
//!     minio
//!         .scoped(async |minio| {
//!             let config = minio.aws_client_config().await?;
//!             println!("S3 endpoint: {}", config.endpoint_url);
//!             minio.reset().await
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

/// Docker container management.
///
/// Image provisioning, lifecycle control with guaranteed cleanup, readiness
/// probing and internal/external address resolution.
pub mod container;

/// Side-car profiles and the [`profiles::Sidecar`] runner.
pub mod profiles;

/// Settings discovery and loading.
pub mod config;

/// Environment variable names and defaults.
///
/// Centralizes every variable the crate reads.
pub mod env;

pub mod assertions;
pub mod probes;

// CLI module for the side-car launcher binary
pub mod cli;

pub use config::Settings;
pub use container::{ContainerError, DockerClient, DockerContainer, ReadinessPolicy, Result};
pub use profiles::{Profile, Sidecar, available_port};
