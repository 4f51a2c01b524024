//! MinIO object storage emulator.

use super::{
    AwsClientConfig, AwsCredentials, Profile, Sidecar, edge_port_or_available, published_port,
};
use crate::container::{
    ContainerSpecBuilder, DockerContainer, ExecConfig, HostPort, HttpProbe, ReadinessPolicy,
    Result,
};
use crate::env;
use tracing::debug;

pub const DEFAULT_IMAGE: &str = "minio/minio:latest";
pub const S3_API_PORT: u16 = 9000;
pub const CONSOLE_PORT: u16 = 9001;
pub const ENV_PREFIX: &str = "MINIO";

pub const MINIO_ROOT_USER: &str = "MINIO_ROOT_USER";
pub const MINIO_ROOT_PASSWORD: &str = "MINIO_ROOT_PASSWORD";

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ROOT_CREDENTIAL: &str = "minioadmin";
const HEALTH_PATH: &str = "/minio/health/live";

#[derive(Debug, Clone)]
pub struct Minio {
    image: String,
    s3_api_edge_port: u16,
    console_edge_port: u16,
    region: String,
    root_user: String,
    root_password: String,
    logging_disabled: bool,
}

impl Minio {
    /// # Errors
    ///
    /// Returns error if no free ports are available.
    pub fn from_env() -> Result<Self> {
        Self::with_edge_ports(None, None)
    }

    /// # Errors
    ///
    /// Returns error if a port is `None` and no free port is available.
    pub fn with_edge_ports(s3_api: Option<u16>, console: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: env::profile_image(ENV_PREFIX, DEFAULT_IMAGE),
            s3_api_edge_port: edge_port_or_available(s3_api)?,
            console_edge_port: edge_port_or_available(console)?,
            region: env::var_or(env::aws::AWS_DEFAULT_REGION, DEFAULT_REGION),
            root_user: env::var_or(MINIO_ROOT_USER, DEFAULT_ROOT_CREDENTIAL),
            root_password: env::var_or(MINIO_ROOT_PASSWORD, DEFAULT_ROOT_CREDENTIAL),
            logging_disabled: env::profile_logging_disabled(ENV_PREFIX),
        })
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn root_user(&self) -> &str {
        &self.root_user
    }

    pub fn root_password(&self) -> &str {
        &self.root_password
    }

    /// MinIO takes the root user and password as S3 credentials.
    pub fn credentials(&self) -> AwsCredentials {
        AwsCredentials {
            region: self.region.clone(),
            access_key_id: self.root_user.clone(),
            secret_access_key: self.root_password.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Profile for Minio {
    fn kind(&self) -> &'static str {
        "MinioContainer"
    }

    fn internal_port(&self) -> u16 {
        S3_API_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        Ok(spec
            .image(&self.image)
            .port_binding(S3_API_PORT, self.s3_api_edge_port)
            .port_binding(CONSOLE_PORT, self.console_edge_port)
            .env(MINIO_ROOT_USER, &self.root_user)
            .env(MINIO_ROOT_PASSWORD, &self.root_password)
            .command(format!(
                r#"server /data --address ":{}" --console-address ":{}""#,
                S3_API_PORT, CONSOLE_PORT
            )))
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::Http(HttpProbe::new(S3_API_PORT, HEALTH_PATH))
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let s3 = published_port(container, S3_API_PORT).ok()?;
        let console = published_port(container, CONSOLE_PORT).ok()?;
        Some(format!(
            "Minio started: S3-API: http://localhost:{}/; console: http://localhost:{}/",
            s3, console
        ))
    }
}

impl Sidecar<Minio> {
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn aws_client_config(&self) -> Result<AwsClientConfig> {
        let endpoint = self.external_url().await?;
        Ok(self.profile().credentials().client_config(endpoint))
    }

    /// Host-side address of the web console.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn console_address(&self) -> Result<HostPort> {
        self.container().external_address(CONSOLE_PORT).await
    }

    /// Delete every bucket and object without restarting the container.
    ///
    /// # Errors
    ///
    /// Returns error if the removal command fails.
    pub async fn reset(&self) -> Result<()> {
        self.container()
            .exec(
                ExecConfig::new(["mc", "rm", "--recursive", "--dangerous", "--force", "data/"])
                    .working_dir("/"),
            )
            .await?
            .check()?;
        debug!(container = %self.container().label(), "MinIO data removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_minio_spec() {
        let profile = Minio::with_edge_ports(Some(9100), Some(9101)).unwrap();
        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();

        assert_eq!(spec.host_port(S3_API_PORT), Some(9100));
        assert_eq!(spec.host_port(CONSOLE_PORT), Some(9101));
        assert_eq!(
            spec.command().unwrap(),
            ["server", "/data", "--address", ":9000", "--console-address", ":9001"]
        );
        assert!(spec.env().contains_key(MINIO_ROOT_USER));
        assert!(spec.env().contains_key(MINIO_ROOT_PASSWORD));
    }

    #[test]
    fn test_minio_readiness_and_credentials() {
        let profile = Minio::with_edge_ports(Some(9100), Some(9101))
            .unwrap()
            .region("eu-west-1");

        let http = profile.readiness().http().cloned().unwrap();
        assert_eq!(http.port, S3_API_PORT);
        assert_eq!(http.path, HEALTH_PATH);

        let credentials = profile.credentials();
        assert_eq!(credentials.region, "eu-west-1");
        assert_eq!(credentials.access_key_id, profile.root_user());
        assert_eq!(credentials.secret_access_key, profile.root_password());
    }
}
