//! Settings discovery and loading
//!
//! Settings are resolved in three layers, later layers winning:
//! 1. Built-in defaults
//! 2. A TOML file: `$TESTCONTAINER_CONFIG`, or `./testcontainers.toml`
//! 3. Environment variables

use crate::container::{BuildBackend, ContainerError, Result};
use crate::env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Application image parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Use this image as-is instead of building
    pub image_id: Option<String>,
    /// Dockerfile path, defaults to `Dockerfile` in the context
    pub dockerfile: Option<PathBuf>,
    /// Build context directory, defaults to the current directory
    pub context: Option<PathBuf>,
    /// Multi-stage build target
    pub target: Option<String>,
    /// Build with the BuildKit CLI instead of the daemon API
    pub buildkit: bool,
}

impl ImageSettings {
    pub fn backend(&self) -> BuildBackend {
        if self.buildkit {
            BuildBackend::BuildKit
        } else {
            BuildBackend::Classic
        }
    }
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Network side-cars attach to
    pub docker_network: String,
    /// Several test workers share the daemon; images are not removed on exit
    pub parallel_worker: bool,
    /// Application image parameters
    pub image: ImageSettings,
    /// Overrides every profile's readiness deadline
    pub readiness_timeout_secs: Option<u64>,
    /// Grace period before a stopped container is killed
    pub stop_timeout_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_network: env::DEFAULT_DOCKER_NETWORK.to_string(),
            parallel_worker: false,
            image: ImageSettings::default(),
            readiness_timeout_secs: None,
            stop_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns error if a settings file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Settings::load`], reading `path` instead of searching for a file.
    ///
    /// # Errors
    ///
    /// Returns error if the settings file cannot be read or parsed.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path.map(Path::to_path_buf).or_else(Self::find_config_file) {
            Some(path) => {
                info!("Loading settings from: {:?}", path);
                Self::from_toml_file(path)?
            }
            None => {
                debug!("No settings file found, using defaults");
                Self::default()
            }
        };
        settings.apply_env_with(env::var);
        Ok(settings)
    }

    /// Locate the settings file.
    ///
    /// An explicit `TESTCONTAINER_CONFIG` path is returned even if missing,
    /// so that a typo surfaces as a read error.
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(path) = env::var(env::TESTCONTAINER_CONFIG) {
            return Some(PathBuf::from(path));
        }
        let candidate = std::env::current_dir().ok()?.join(env::CONFIG_FILE_NAME);
        candidate.is_file().then_some(candidate)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContainerError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ContainerError::ConfigError(format!("Invalid settings: {}", e)))
    }

    /// Serialize to a TOML string
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ContainerError::ConfigError(format!("Failed to serialize settings: {}", e)))
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = lookup(env::TESTCONTAINER_DOCKER_NETWORK) {
            self.docker_network = network;
        }
        if env::PARALLEL_WORKER_MARKERS
            .iter()
            .any(|name| lookup(name).is_some())
        {
            self.parallel_worker = true;
        }
        if let Some(buildkit) = lookup(env::DOCKER_BUILDKIT) {
            self.image.buildkit = env::is_truthy(&buildkit);
        }
        if let Some(image_id) = lookup(env::image::TESTCONTAINER_IMAGE_ID) {
            self.image.image_id = Some(image_id);
        }
        if let Some(dockerfile) = lookup(env::image::TESTCONTAINER_DOCKERFILE_PATH) {
            self.image.dockerfile = Some(PathBuf::from(dockerfile));
        }
        if let Some(context) = lookup(env::image::TESTCONTAINER_DOCKER_BUILD_CONTEXT) {
            self.image.context = Some(PathBuf::from(context));
        }
        if let Some(target) = lookup(env::image::TESTCONTAINER_DOCKER_BUILD_TARGET) {
            self.image.target = Some(target);
        }
    }

    /// Readiness deadline override, if configured.
    pub fn readiness_timeout(&self) -> Option<Duration> {
        self.readiness_timeout_secs.map(Duration::from_secs)
    }
}
