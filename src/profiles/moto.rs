//! Moto AWS emulator.
//!
//! Moto runs Lambda functions in sibling containers, so the daemon socket is
//! mounted and the container's own network is passed through.

use super::{AwsClientConfig, AwsCredentials, Profile, Sidecar, edge_port_or_available};
use crate::container::{
    ContainerError, ContainerSpecBuilder, DockerContainer, HttpProbe, LogProbe, ReadinessPolicy,
    Result,
};
use crate::env;
use tracing::debug;

pub const DEFAULT_IMAGE: &str = "motoserver/moto:latest";
pub const INTERNAL_PORT: u16 = 5000;
pub const ENV_PREFIX: &str = "MOTO";

const DEFAULT_REGION: &str = "us-east-1";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Clone)]
pub struct Moto {
    image: String,
    edge_port: u16,
    credentials: AwsCredentials,
    ready_log: LogProbe,
    logging_disabled: bool,
}

impl Moto {
    /// # Errors
    ///
    /// Returns error if no free port is available.
    pub fn from_env() -> Result<Self> {
        Self::with_edge_port(None)
    }

    /// # Errors
    ///
    /// Returns error if `edge_port` is `None` and no free port is available.
    pub fn with_edge_port(edge_port: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: env::profile_image(ENV_PREFIX, DEFAULT_IMAGE),
            edge_port: edge_port_or_available(edge_port)?,
            credentials: AwsCredentials::from_env(DEFAULT_REGION),
            ready_log: LogProbe::new("Running on all addresses")?,
            logging_disabled: env::profile_logging_disabled(ENV_PREFIX),
        })
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.credentials.region = region.into();
        self
    }

    pub fn edge_port(&self) -> u16 {
        self.edge_port
    }

    pub fn credentials(&self) -> &AwsCredentials {
        &self.credentials
    }
}

#[async_trait::async_trait]
impl Profile for Moto {
    fn kind(&self) -> &'static str {
        "MotoContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        let network = spec.network_name();
        Ok(spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .env(env::aws::AWS_DEFAULT_REGION, &self.credentials.region)
            .env(env::aws::AWS_ACCESS_KEY_ID, &self.credentials.access_key_id)
            .env(
                env::aws::AWS_SECRET_ACCESS_KEY,
                &self.credentials.secret_access_key,
            )
            .env("MOTO_PORT", INTERNAL_PORT.to_string())
            .env("MOTO_DOCKER_NETWORK_NAME", network)
            .volume_with_mode(DOCKER_SOCKET, DOCKER_SOCKET, false))
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::Combined {
            http: HttpProbe::new(INTERNAL_PORT, "/moto-api/"),
            log: self.ready_log.clone(),
        }
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    fn banner(&self, _container: &DockerContainer) -> Option<String> {
        Some(format!(
            "Moto dashboard: http://localhost:{}/moto-api",
            self.edge_port
        ))
    }
}

impl Sidecar<Moto> {
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn aws_client_config(&self) -> Result<AwsClientConfig> {
        let endpoint = self.external_url().await?;
        Ok(self.profile().credentials().client_config(endpoint))
    }

    /// Drop every emulated resource without restarting the container.
    ///
    /// # Errors
    ///
    /// Returns error if the reset endpoint is unreachable or rejects the call.
    pub async fn reset(&self) -> Result<()> {
        let url = format!("{}/moto-api/reset", self.external_url().await?);
        let response = reqwest::Client::new().post(&url).send().await?;
        if !response.status().is_success() {
            return Err(ContainerError::ExecutionError(format!(
                "Moto reset failed with HTTP status code: {}",
                response.status().as_u16()
            )));
        }
        debug!(container = %self.container().label(), "Moto state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_moto_spec() {
        let profile = Moto::with_edge_port(Some(5001)).unwrap().region("us-west-2");
        let spec = profile
            .configure(ContainerSpec::builder().network("tests"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(spec.host_port(INTERNAL_PORT), Some(5001));
        assert_eq!(spec.env()["AWS_DEFAULT_REGION"], "us-west-2");
        assert_eq!(spec.env()["MOTO_PORT"], "5000");
        assert_eq!(spec.env()["MOTO_DOCKER_NETWORK_NAME"], "tests");
        assert!(
            spec.volumes()
                .iter()
                .any(|v| v.container_path == DOCKER_SOCKET && !v.read_only)
        );
    }

    #[test]
    fn test_moto_readiness_checks_http_then_logs() {
        let profile = Moto::with_edge_port(Some(5001)).unwrap();
        match profile.readiness() {
            ReadinessPolicy::Combined { http, log } => {
                assert_eq!(http.path, "/moto-api/");
                assert!(log.pattern.is_match(" * Running on all addresses (0.0.0.0)"));
            }
            other => panic!("unexpected policy {:?}", other),
        }
    }
}
