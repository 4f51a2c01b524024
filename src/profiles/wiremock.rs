//! WireMock HTTP mock server.
//!
//! Mapping stubs and response bodies are copied from host folders after
//! startup, then the server is told to reload its mappings.

use super::{Profile, Sidecar, edge_port_or_available, published_port};
use crate::container::{
    ContainerError, ContainerSpecBuilder, DockerContainer, HttpProbe, LogProbe, ReadinessPolicy,
    Result,
};
use crate::env;
use reqwest::Method;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_IMAGE: &str = "wiremock/wiremock:latest";
pub const INTERNAL_PORT: u16 = 8080;
pub const ENV_PREFIX: &str = "WIREMOCK";

pub const MAPPINGS_DIR: &str = "/home/wiremock/mappings/";
pub const FILES_DIR: &str = "/home/wiremock/__files/";

pub const MAPPING_STUBS_VAR: &str = "WIREMOCK_TESTCONTAINER_MAPPING_STUBS";
pub const MAPPING_FILES_VAR: &str = "WIREMOCK_TESTCONTAINER_MAPPING_FILES";
pub const VERBOSE_VAR: &str = "WIREMOCK_TESTCONTAINER_VERBOSE";

#[derive(Debug, Clone)]
pub struct WireMock {
    image: String,
    edge_port: u16,
    mapping_stubs: Option<PathBuf>,
    mapping_files: Option<PathBuf>,
    verbose: bool,
    ready_log: LogProbe,
    logging_disabled: bool,
}

impl WireMock {
    /// Image, folders and verbosity from `WIREMOCK_TESTCONTAINER_*` variables.
    ///
    /// # Errors
    ///
    /// Returns error if no free port is available.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_edge_port(None)?.apply_env())
    }

    /// Take folders and verbosity from `WIREMOCK_TESTCONTAINER_*` variables
    /// where set.
    pub fn apply_env(mut self) -> Self {
        if let Some(stubs) = env::var(MAPPING_STUBS_VAR) {
            self.mapping_stubs = Some(PathBuf::from(stubs));
        }
        if let Some(files) = env::var(MAPPING_FILES_VAR) {
            self.mapping_files = Some(PathBuf::from(files));
        }
        if env::flag(VERBOSE_VAR) {
            self.verbose = true;
        }
        self
    }

    /// # Errors
    ///
    /// Returns error if `edge_port` is `None` and no free port is available.
    pub fn with_edge_port(edge_port: Option<u16>) -> Result<Self> {
        Ok(Self {
            image: env::profile_image(ENV_PREFIX, DEFAULT_IMAGE),
            edge_port: edge_port_or_available(edge_port)?,
            mapping_stubs: None,
            mapping_files: None,
            verbose: false,
            ready_log: LogProbe::new("port:")?,
            logging_disabled: env::profile_logging_disabled(ENV_PREFIX),
        })
    }

    /// Host folder with JSON mapping stubs.
    pub fn mapping_stubs(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_stubs = Some(path.into());
        self
    }

    /// Host folder with response body files.
    pub fn mapping_files(mut self, path: impl Into<PathBuf>) -> Self {
        self.mapping_files = Some(path.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn edge_port(&self) -> u16 {
        self.edge_port
    }
}

#[async_trait::async_trait]
impl Profile for WireMock {
    fn kind(&self) -> &'static str {
        "WireMockContainer"
    }

    fn internal_port(&self) -> u16 {
        INTERNAL_PORT
    }

    fn configure(&self, spec: ContainerSpecBuilder) -> Result<ContainerSpecBuilder> {
        let spec = spec
            .image(&self.image)
            .port_binding(INTERNAL_PORT, self.edge_port);
        Ok(if self.verbose {
            spec.command("--verbose")
        } else {
            spec
        })
    }

    fn readiness(&self) -> ReadinessPolicy {
        ReadinessPolicy::Combined {
            http: HttpProbe::new(INTERNAL_PORT, "/__admin/mappings"),
            log: self.ready_log.clone(),
        }
    }

    fn logging_disabled(&self) -> bool {
        self.logging_disabled
    }

    async fn after_start(&self, container: &DockerContainer) -> Result<()> {
        let mut copied = false;
        for (source, target) in [
            (&self.mapping_stubs, MAPPINGS_DIR),
            (&self.mapping_files, FILES_DIR),
        ] {
            if let Some(source) = source {
                container.copy_folder(source, target).await?;
                copied = true;
            }
        }
        if copied {
            let base = container.external_address(INTERNAL_PORT).await?.http_url();
            admin_request(&base, Method::POST, "mappings/reset").await?;
        }
        Ok(())
    }

    fn banner(&self, container: &DockerContainer) -> Option<String> {
        let port = published_port(container, INTERNAL_PORT).ok()?;
        Some(format!("Wiremock admin: http://localhost:{}/__admin", port))
    }
}

impl Sidecar<WireMock> {
    /// Base URL of the admin API for the test process.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running.
    pub async fn admin_url(&self) -> Result<String> {
        Ok(format!("{}/__admin", self.external_url().await?))
    }

    /// Copy a folder of mapping stubs into the running server.
    ///
    /// # Errors
    ///
    /// Returns error if the folder cannot be uploaded.
    pub async fn copy_mappings(&self, source: &Path) -> Result<()> {
        self.container().copy_folder(source, MAPPINGS_DIR).await
    }

    /// Copy a folder of response bodies into the running server.
    ///
    /// # Errors
    ///
    /// Returns error if the folder cannot be uploaded.
    pub async fn copy_files(&self, source: &Path) -> Result<()> {
        self.container().copy_folder(source, FILES_DIR).await
    }

    /// Reset to the mappings on disk, dropping any added over HTTP.
    ///
    /// # Errors
    ///
    /// Returns error if the admin API rejects the call.
    pub async fn reload_mappings(&self) -> Result<()> {
        admin_request(&self.external_url().await?, Method::POST, "mappings/reset").await
    }

    /// Delete every stub mapping.
    ///
    /// # Errors
    ///
    /// Returns error if the admin API rejects the call.
    pub async fn delete_mappings(&self) -> Result<()> {
        admin_request(&self.external_url().await?, Method::DELETE, "mappings").await
    }
}

async fn admin_request(base_url: &str, method: Method, path: &str) -> Result<()> {
    let url = format!("{}/__admin/{}", base_url.trim_end_matches('/'), path);
    let response = reqwest::Client::new()
        .request(method.clone(), &url)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ContainerError::ExecutionError(format!(
            "{} {} failed with HTTP status code: {}",
            method,
            url,
            response.status().as_u16()
        )));
    }
    debug!("{} {}", method, url);
    Ok(())
}
