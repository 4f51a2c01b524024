//! PostgreSQL.

use super::database::{self, DatabaseUrl};
use super::{Profile, Sidecar, edge_port_or_available, published_port};
use crate::container::{ContainerSpecBuilder, DockerContainer, ReadinessPolicy, Result};
use crate::env;

pub const DEFAULT_IMAGE: &str = "postgres:16";
pub const INTERNAL_PORT: u16 = 5432;
pub const ENV_PREFIX: &str = "POSTGRES";

#[derive(Debug, Clone)]
pub struct Postgres {
    image: String,
    edge_port: u16,
    drivername: String,
    username: String,
    password: String,
    database: String,
    logging_disabled: bool,
}

impl Postgres {
    /// Credentials from `POSTGRES_*` variables, on a free host port.
    ///
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
            drivername: env::var_or("POSTGRES_DRIVERNAME", "postgresql+psycopg2"),
            username: env::var_or("POSTGRES_USER", "username"),
            password: env::var_or("POSTGRES_PASSWORD", "password"),
            database: env::var_or("POSTGRES_DB", "db"),
            logging_disabled: env::profile_logging_disabled(ENV_PREFIX),
        })
    }

    pub fn drivername(mut self, drivername: impl Into<String>) -> Self {
        self.drivername = drivername.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    fn url(&self, host: String, port: u16) -> DatabaseUrl {
        DatabaseUrl {
            drivername: self.drivername.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            host,
            port,
            database: self.database.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Profile for Postgres {
    fn kind(&self) -> &'static str {
        "PostgreSQLContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        // fsync off: test data never needs to survive a crash
        Ok(spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .env("POSTGRES_USER", &self.username)
            .env("POSTGRES_PASSWORD", &self.password)
            .env("POSTGRES_DB", &self.database)
            .command("-c fsync=off"))
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::None
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    async fn after_start(&self, container: &DockerContainer) -> Result<()> {
        let address = container.external_address(INTERNAL_PORT).await?;
        database::wait_for_postgres(&self.url(address.host, address.port)).await
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let port = published_port(container, INTERNAL_PORT).ok()?;
        Some(format!(
            "PostgreSQL started: {}",
            self.url("localhost".to_string(), port)
        ))
    }
}

impl Sidecar<Postgres> {
    /// Connection string for other containers on the network.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or not attached.
    pub async fn internal_database_url(&self) -> Result<DatabaseUrl> {
        let address = self.internal_address().await?;
        Ok(self.profile().url(address.host, address.port))
    }

    /// Connection string for the test process.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn external_database_url(&self) -> Result<DatabaseUrl> {
        let address = self.external_address().await?;
        Ok(self.profile().url(address.host, address.port))
    }
}
