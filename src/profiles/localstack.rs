//! LocalStack AWS emulator.

use super::{AwsClientConfig, AwsCredentials, Profile, Sidecar, edge_port_or_available};
use crate::container::{ContainerSpecBuilder, LogProbe, ReadinessPolicy, Result};
use crate::env;

pub const DEFAULT_IMAGE: &str = "localstack/localstack:3";
pub const INTERNAL_PORT: u16 = 4566;
pub const ENV_PREFIX: &str = "LOCALSTACK";

const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Debug, Clone)]
pub struct LocalStack {
    image: String,
    edge_port: u16,
    credentials: AwsCredentials,
    ready_log: LogProbe,
    logging_disabled: bool,
}

impl LocalStack {
    /// Image, region and credentials from the environment, on a free host port.
    ///
    /// # Errors
    ///
    /// Returns error if no free port is available.
    pub fn from_env() -> Result<Self> {
        Self::with_edge_port(None)
    }

    /// Like [`LocalStack::from_env`] with a fixed host port.
    ///
    /// # Errors
    ///
    /// Returns error if `edge_port` is `None` and no free port is available.
    pub fn with_edge_port(edge_port: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: env::profile_image(ENV_PREFIX, DEFAULT_IMAGE),
            edge_port: edge_port_or_available(edge_port)?,
            credentials: AwsCredentials::from_env(DEFAULT_REGION),
            ready_log: LogProbe::new(r"Ready\.")?,
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
impl Profile for LocalStack {
    fn kind(&self) -> &'static str {
        "LocalStackContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        Ok(spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .env("AWS_DEFAULT_REGION", &self.credentials.region))
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::Log(self.ready_log.clone())
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }
}

impl Sidecar<LocalStack> {
    /// Client settings pointing at the emulator's external URL.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn aws_client_config(&self) -> Result<AwsClientConfig> {
        let endpoint = self.external_url().await?;
        Ok(self.profile().credentials().client_config(endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_localstack_spec() {
        let profile = LocalStack::with_edge_port(Some(4566))
            .unwrap()
            .region("eu-central-1");
        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();

        assert_eq!(spec.host_port(INTERNAL_PORT), Some(4566));
        assert_eq!(spec.env()["AWS_DEFAULT_REGION"], "eu-central-1");

        let probe = profile.readiness();
        let log = probe.log().unwrap();
        assert!(log.pattern.is_match("Ready.\n"));
        assert!(probe.http().is_none());
    }
}
