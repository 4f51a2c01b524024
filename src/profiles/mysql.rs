//! MySQL.

use super::database::{self, DatabaseUrl};
use super::{Profile, Sidecar, edge_port_or_available, published_port};
use crate::container::{ContainerSpecBuilder, DockerContainer, ReadinessPolicy, Result};
use crate::env;

pub const DEFAULT_IMAGE: &str = "mysql:8";
pub const INTERNAL_PORT: u16 = 3306;
pub const ENV_PREFIX: &str = "MYSQL";

#[derive(Debug, Clone)]
pub struct MySql {
    image: String,
    edge_port: u16,
    drivername: String,
    username: String,
    root_password: String,
    password: String,
    database: String,
    logging_disabled: bool,
}

impl MySql {
    /// Credentials from `MYSQL_*` variables, on a free host port.
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
            drivername: env::var_or("MYSQL_DRIVERNAME", "mysql+pymysql"),
            username: env::var_or("MYSQL_USER", "username"),
            root_password: env::var_or("MYSQL_ROOT_PASSWORD", "root"),
            password: env::var_or("MYSQL_PASSWORD", "password"),
            database: env::var_or("MYSQL_DATABASE", "db"),
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

    pub fn root_password(mut self, root_password: impl Into<String>) -> Self {
        self.root_password = root_password.into();
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

    /// Root password the server is started with. Connecting as `root` uses
    /// the regular password for both.
    pub fn effective_root_password(&self) -> &str {
        if self.username == "root" {
            &self.password
        } else {
            &self.root_password
        }
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
impl Profile for MySql {
    fn kind(&self) -> &'static str {
        "MySQLContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        let mut spec = spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port)
            .env("MYSQL_ROOT_PASSWORD", self.effective_root_password())
            .env("MYSQL_DATABASE", &self.database)
            .command("--innodb_flush_method=O_DIRECT_NO_FSYNC");
        // The image rejects MYSQL_USER=root; root is configured by the root password
        if self.username != "root" {
            spec = spec
                .env("MYSQL_USER", &self.username)
                .env("MYSQL_PASSWORD", &self.password);
        }
        Ok(spec)
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::None
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    async fn after_start(&self, container: &DockerContainer) -> Result<()> {
        let address = container.external_address(INTERNAL_PORT).await?;
        database::wait_for_mysql(&self.url(address.host, address.port)).await
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let port = published_port(container, INTERNAL_PORT).ok()?;
        Some(format!(
            "MySQL started: {}",
            self.url("localhost".to_string(), port)
        ))
    }
}

impl Sidecar<MySql> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerSpec;

    #[test]
    fn test_mysql_spec() {
        let profile = MySql::with_edge_port(Some(3307))
            .unwrap()
            .username("orders")
            .password("secret")
            .root_password("rootpw")
            .database("orders");
        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();

        assert_eq!(spec.host_port(INTERNAL_PORT), Some(3307));
        assert_eq!(spec.env()["MYSQL_USER"], "orders");
        assert_eq!(spec.env()["MYSQL_PASSWORD"], "secret");
        assert_eq!(spec.env()["MYSQL_ROOT_PASSWORD"], "rootpw");
        assert_eq!(spec.env()["MYSQL_DATABASE"], "orders");
        assert_eq!(
            spec.command().unwrap(),
            ["--innodb_flush_method=O_DIRECT_NO_FSYNC"]
        );
    }

    #[test]
    fn test_mysql_root_user_shares_password() {
        let profile = MySql::with_edge_port(Some(3307))
            .unwrap()
            .username("root")
            .password("secret")
            .root_password("ignored");
        assert_eq!(profile.effective_root_password(), "secret");

        let spec = profile.configure(ContainerSpec::builder()).unwrap().build().unwrap();
        assert_eq!(spec.env()["MYSQL_ROOT_PASSWORD"], "secret");
        assert!(!spec.env().contains_key("MYSQL_USER"));
    }
}
