//! The application under test, a tomodachi service.
//!
//! The HTTP transport may come up before messaging transports, so the service
//! is only considered ready once it logs that it started.

use super::{Profile, edge_port_or_available, published_port};
use crate::container::{
    ContainerSpecBuilder, DockerContainer, HttpProbe, LogProbe, ReadinessPolicy, Result,
};
use std::collections::BTreeMap;
use std::time::Duration;

pub const INTERNAL_PORT: u16 = 9700;

// "Started service" before tomodachi 0.26, "started service successfully" after
const STARTED_PATTERN: &str = "(?i)started service";

const HEALTHCHECK_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTHCHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Tomodachi {
    image: String,
    edge_port: u16,
    healthcheck_path: Option<String>,
    command: Option<String>,
    env: BTreeMap<String, String>,
    ready_log: LogProbe,
    logging_disabled: bool,
}

impl Tomodachi {
    /// A service image, usually the ID from an
    /// [`ImageProvisioner`](crate::container::ImageProvisioner).
    ///
    /// # Errors
    ///
    /// Returns error if no free port is available.
    pub fn new(image: impl Into<String>) -> Result<Self> {
        Self::with_edge_port(image, None)
    }

    /// # Errors
    ///
    /// Returns error if `edge_port` is `None` and no free port is available.
    pub fn with_edge_port(image: impl Into<String>, edge_port: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: image.into(),
            edge_port: edge_port_or_available(edge_port)?,
            healthcheck_path: None,
            command: None,
            env: BTreeMap::new(),
            ready_log: LogProbe::new(STARTED_PATTERN)?.timeout(HEALTHCHECK_TIMEOUT),
            logging_disabled: false,
        })
    }

    /// Wait for `GET path` to return 200 before checking the logs.
    pub fn healthcheck_path(mut self, path: impl Into<String>) -> Self {
        self.healthcheck_path = Some(path.into());
        self
    }

    /// Run `tomodachi run <path> --production` instead of the image command.
    pub fn service(mut self, path: &str) -> Self {
        self.command = Some(format!(
            "tomodachi run {} --production",
            shell_escape::escape(path.into())
        ));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn disable_logging(mut self, disable: bool) -> Self {
        self.logging_disabled = disable;
        self
    }
}

#[async_trait::async_trait]
impl Profile for Tomodachi {
    fn kind(&self) -> &'static str {
        "TomodachiContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        let spec = spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .envs(self.env.clone());
        Ok(match &self.command {
            Some(command) => spec.command(command),
            None => spec,
        })
    }

    fn readiness(&self) -> ReadinessPolicy {
        match &self.healthcheck_path {
            Some(path) => ReadinessPolicy::Combined {
                http: HttpProbe::new(INTERNAL_PORT, path.clone())
                    .interval(HEALTHCHECK_INTERVAL)
                    .timeout(HEALTHCHECK_TIMEOUT),
                log: self.ready_log.clone(),
            },
            None => ReadinessPolicy::Log(self.ready_log.clone()),
        }
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let port = published_port(container, INTERNAL_PORT).ok()?;
        Some(format!("Tomodachi service: http://localhost:{}", port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_tomodachi_service_command() {
        let profile = Tomodachi::with_edge_port("orders:latest", Some(9701))
            .unwrap()
            .service("src/orders.py")
            .env("AWS_REGION", "eu-west-1");
        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();

        assert_eq!(spec.image(), "orders:latest");
        assert_eq!(spec.host_port(INTERNAL_PORT), Some(9701));
        assert_eq!(
            spec.command().unwrap(),
            ["tomodachi", "run", "src/orders.py", "--production"]
        );
        assert_eq!(spec.env()["AWS_REGION"], "eu-west-1");
    }

    #[test]
    fn test_tomodachi_readiness() {
        let plain = Tomodachi::with_edge_port("orders:latest", Some(9701)).unwrap();
        let policy = plain.readiness();
        assert!(policy.http().is_none());
        let log = policy.log().unwrap();
        assert!(log.pattern.is_match("Started service \"orders\""));
        assert!(log.pattern.is_match("started service successfully"));

        let with_health = plain.healthcheck_path("/health").readiness();
        let http = with_health.http().unwrap();
        assert_eq!(http.path, "/health");
        assert_eq!(http.interval, HEALTHCHECK_INTERVAL);
        assert_eq!(http.timeout, HEALTHCHECK_TIMEOUT);
        assert!(with_health.log().is_some());
    }
}
