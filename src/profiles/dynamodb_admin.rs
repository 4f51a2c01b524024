//! DynamoDB Admin web UI, pointed at an emulated DynamoDB endpoint.

use super::{AwsCredentials, Profile, edge_port_or_available, published_port};
use crate::container::{ContainerSpecBuilder, DockerContainer, HttpProbe, ReadinessPolicy, Result};
use crate::env;

pub const DEFAULT_IMAGE: &str = "aaronshaf/dynamodb-admin:latest";
pub const INTERNAL_PORT: u16 = 8001;
pub const ENV_PREFIX: &str = "DYNAMODB_ADMIN";

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct DynamoDbAdmin {
    image: String,
    edge_port: u16,
    dynamo_endpoint: String,
    credentials: AwsCredentials,
    logging_disabled: bool,
}

impl DynamoDbAdmin {
    /// Admin UI for `dynamo_endpoint`, usually an emulator's internal URL.
    ///
    /// # Errors
    ///
    /// Returns error if no free port is available.
    pub fn new(dynamo_endpoint: impl Into<String>) -> Result<Self> {
        Self::with_edge_port(dynamo_endpoint, None)
    }

    /// # Errors
    ///
    /// Returns error if `edge_port` is `None` and no free port is available.
    pub fn with_edge_port(dynamo_endpoint: impl Into<String>, edge_port: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: env::profile_image(ENV_PREFIX, DEFAULT_IMAGE),
            edge_port: edge_port_or_available(edge_port)?,
            dynamo_endpoint: dynamo_endpoint.into(),
            credentials: AwsCredentials::from_env(DEFAULT_REGION),
            logging_disabled: env::profile_logging_disabled(ENV_PREFIX),
        })
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.credentials.region = region.into();
        self
    }
}

#[async_trait::async_trait]
impl Profile for DynamoDbAdmin {
    fn kind(&self) -> &'static str {
        "DynamoDBAdminContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        Ok(spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .env("AWS_REGION", &self.credentials.region)
            .env(env::aws::AWS_ACCESS_KEY_ID, &self.credentials.access_key_id)
            .env(
                env::aws::AWS_SECRET_ACCESS_KEY,
                &self.credentials.secret_access_key,
            )
            .env("DYNAMO_ENDPOINT", &self.dynamo_endpoint))
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::Http(HttpProbe::new(INTERNAL_PORT, "/"))
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let port = published_port(container, INTERNAL_PORT).ok()?;
        Some(format!("DynamoDB Admin: http://localhost:{}", port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_dynamodb_admin_spec() {
        let profile = DynamoDbAdmin::with_edge_port("http://172.17.0.2:4566", Some(8002))
            .unwrap()
            .region("eu-west-1");
        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();

        assert_eq!(spec.host_port(INTERNAL_PORT), Some(8002));
        assert_eq!(spec.env()["AWS_REGION"], "eu-west-1");
        assert_eq!(spec.env()["DYNAMO_ENDPOINT"], "http://172.17.0.2:4566");
        assert!(spec.env().contains_key("AWS_ACCESS_KEY_ID"));
        assert_eq!(profile.readiness().http().unwrap().path, "/");
    }
}
