//! Image provisioning.
//!
//! Resolves the image a container runs from: either an externally supplied
//! reference (pulled if missing) or a fresh build from a Dockerfile. Builds go
//! through one of two backends:
//!
//! - **BuildKit**: the `docker build` CLI, whose quiet output is the image ID.
//!   Supports BuildKit-only syntax such as `RUN --mount=type=secret`.
//! - **Classic**: the daemon's build API fed with a tarred build context.
//!
//! Built images are removed on [`ImageProvisioner::release`]. When test workers
//! share an image, the removal succeeds only for the last worker; the others
//! find it still in use and leave it.

use crate::config::Settings;
use crate::container::archive;
use crate::container::{ContainerError, DockerClient, Result};
use crate::env;
use futures::stream::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which builder produces images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildBackend {
    /// `docker build` CLI with BuildKit enabled
    BuildKit,
    /// Daemon build API
    Classic,
}

impl BuildBackend {
    /// Select the backend from `DOCKER_BUILDKIT`.
    pub fn from_env() -> Self {
        if env::flag(env::DOCKER_BUILDKIT) {
            BuildBackend::BuildKit
        } else {
            BuildBackend::Classic
        }
    }
}

impl fmt::Display for BuildBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildBackend::BuildKit => write!(f, "buildkit"),
            BuildBackend::Classic => write!(f, "classic"),
        }
    }
}

/// Dockerfile, context and target for a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    /// Dockerfile path; `Dockerfile` in the context when unset
    pub dockerfile: Option<PathBuf>,
    /// Build context; the current directory when unset
    pub context: Option<PathBuf>,
    /// Multi-stage target
    pub target: Option<String>,
}

impl BuildParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dockerfile<P: Into<PathBuf>>(mut self, dockerfile: P) -> Self {
        self.dockerfile = Some(dockerfile.into());
        self
    }

    pub fn context<P: Into<PathBuf>>(mut self, context: P) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = Some(target.into());
        self
    }

    fn context_dir(&self) -> &Path {
        self.context.as_deref().unwrap_or_else(|| Path::new("."))
    }

    /// Arguments for `docker build`.
    pub(crate) fn cli_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string(), "-q".to_string(), "--rm=true".to_string()];
        if let Some(dockerfile) = &self.dockerfile {
            args.push("-f".to_string());
            args.push(dockerfile.to_string_lossy().to_string());
        }
        if let Some(target) = &self.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        args.push(self.context_dir().to_string_lossy().to_string());
        args
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An existing tag or ID, never built nor removed
    External(String),
    /// Build from a Dockerfile
    Build(BuildParams),
}

impl ImageSource {
    /// Image source from settings: the configured image ID, else a build.
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.image.image_id {
            Some(id) => ImageSource::External(id.clone()),
            None => ImageSource::Build(BuildParams {
                dockerfile: settings.image.dockerfile.clone(),
                context: settings.image.context.clone(),
                target: settings.image.target.clone(),
            }),
        }
    }
}

/// How a provisioned image was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    External,
    Built { backend: BuildBackend, params: BuildParams },
}

/// A provisioned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Image ID or reference
    pub id: String,
    pub origin: ImageOrigin,
    /// Whether [`ImageProvisioner::release`] removes it
    pub remove_on_exit: bool,
}

/// Builds, pulls and removes images.
#[derive(Debug, Clone)]
pub struct ImageProvisioner {
    client: DockerClient,
    backend: BuildBackend,
    remove_on_exit: bool,
    shared: bool,
}

impl ImageProvisioner {
    /// Backend from `DOCKER_BUILDKIT`. Built images are removed on release.
    ///
    /// Under a parallel-worker marker the image is shared: every worker
    /// attempts the removal and only the last one to release it succeeds.
    pub fn new(client: DockerClient) -> Self {
        Self {
            client,
            backend: BuildBackend::from_env(),
            remove_on_exit: true,
            shared: env::is_parallel_worker(),
        }
    }

    /// Provisioner configured from resolved settings.
    pub fn from_settings(client: DockerClient, settings: &Settings) -> Self {
        Self {
            client,
            backend: settings.image.backend(),
            remove_on_exit: true,
            shared: settings.parallel_worker,
        }
    }

    pub fn with_backend(mut self, backend: BuildBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Whether built images are removed on release.
    pub fn remove_on_exit(mut self, remove: bool) -> Self {
        self.remove_on_exit = remove;
        self
    }

    pub fn backend(&self) -> BuildBackend {
        self.backend
    }

    /// Resolve or build an image.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] for a missing external image when
    /// pulling is disabled, or [`ContainerError::BuildError`] if a build fails.
    pub async fn provision(&self, source: ImageSource, pull_if_missing: bool) -> Result<Image> {
        match source {
            ImageSource::External(reference) => self.resolve(&reference, pull_if_missing).await,
            ImageSource::Build(params) => self.build(&params).await,
        }
    }

    /// Resolve an existing image, pulling it if allowed.
    ///
    /// # Errors
    ///
    /// Returns error if the image is absent and cannot be pulled.
    pub async fn resolve(&self, reference: &str, pull_if_missing: bool) -> Result<Image> {
        if !self.client.image_exists(reference).await? {
            if !pull_if_missing {
                return Err(ContainerError::NotFound(format!("image {}", reference)));
            }
            self.pull_image(reference).await?;
        }
        Ok(Image {
            id: reference.to_string(),
            origin: ImageOrigin::External,
            remove_on_exit: false,
        })
    }

    /// Build an image with the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::BuildError`] with the backend's output on failure.
    pub async fn build(&self, params: &BuildParams) -> Result<Image> {
        info!(
            "Building image from {} with {} backend",
            params.context_dir().display(),
            self.backend
        );
        let id = match self.backend {
            BuildBackend::BuildKit => self.build_with_buildkit(params).await?,
            BuildBackend::Classic => self.build_with_classic(params).await?,
        };
        info!("Built image: {}", id);

        Ok(Image {
            id,
            origin: ImageOrigin::Built {
                backend: self.backend,
                params: params.clone(),
            },
            remove_on_exit: self.remove_on_exit,
        })
    }

    async fn build_with_buildkit(&self, params: &BuildParams) -> Result<String> {
        let docker = which::which("docker").map_err(|e| ContainerError::BuildError {
            backend: BuildBackend::BuildKit,
            output: format!("docker CLI not found: {}", e),
        })?;

        let args = params.cli_args();
        debug!("Running {} {}", docker.display(), args.join(" "));

        let output = tokio::process::Command::new(&docker)
            .args(&args)
            .env(env::DOCKER_BUILDKIT, "1")
            .output()
            .await?;

        if !output.status.success() {
            return Err(ContainerError::BuildError {
                backend: BuildBackend::BuildKit,
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ContainerError::BuildError {
                backend: BuildBackend::BuildKit,
                output: "docker build printed no image ID".to_string(),
            });
        }
        Ok(id)
    }

    async fn build_with_classic(&self, params: &BuildParams) -> Result<String> {
        let context = archive::build_context(params.context_dir(), params.dockerfile.as_deref())?;

        let mut options = bollard::query_parameters::BuildImageOptionsBuilder::default()
            .dockerfile(&context.dockerfile)
            .rm(true)
            .forcerm(true);
        if let Some(target) = &params.target {
            options = options.target(target);
        }

        let mut stream = self.client.docker().build_image(
            options.build(),
            None,
            Some(bollard::body_full(bytes::Bytes::from(context.bytes))),
        );

        let mut transcript = String::new();
        let mut image_id = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        debug!("Build: {}", line.trim_end());
                        transcript.push_str(&line);
                    }
                    if let Some(error) = info.error {
                        transcript.push_str(&error);
                        return Err(ContainerError::BuildError {
                            backend: BuildBackend::Classic,
                            output: transcript,
                        });
                    }
                    if let Some(id) = info.aux.and_then(|aux| aux.id) {
                        image_id = Some(id);
                    }
                }
                Err(e) => {
                    transcript.push_str(&e.to_string());
                    return Err(ContainerError::BuildError {
                        backend: BuildBackend::Classic,
                        output: transcript,
                    });
                }
            }
        }

        image_id.ok_or_else(|| ContainerError::BuildError {
            backend: BuildBackend::Classic,
            output: format!("Build finished without an image ID\n{}", transcript),
        })
    }

    /// Remove a built image.
    ///
    /// A no-op for external images and for images built with
    /// `remove_on_exit(false)`. The removal is never forced, so an image still
    /// used by another worker's container stays until that worker releases it.
    ///
    /// # Errors
    ///
    /// Returns error for any other removal failure.
    pub async fn release(&self, image: &Image) -> Result<()> {
        if image.origin == ImageOrigin::External || !image.remove_on_exit {
            debug!("Keeping image {}", image.id);
            return Ok(());
        }

        let removed = self
            .client
            .docker()
            .remove_image(
                &image.id,
                Some(bollard::image::RemoveImageOptions {
                    force: false,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map(|_| ())
            .map_err(ContainerError::ApiError);

        release_outcome(&image.id, removed, self.shared)
    }

    /// Pull an image from a registry.
    ///
    /// # Errors
    ///
    /// Returns error if image pull fails.
    pub async fn pull_image(&self, reference: &str) -> Result<()> {
        info!("Pulling image: {}", reference);

        let mut stream = self.client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: reference,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!("Pull: {}", status);
            }
        }

        info!("Pulled image: {}", reference);
        Ok(())
    }
}

/// Classify the result of an image removal.
///
/// Races with concurrent workers (already removed, or still referenced by
/// another worker's container) are not errors.
fn release_outcome(image: &str, removed: Result<()>, shared: bool) -> Result<()> {
    match removed {
        Ok(()) => {
            info!("Removed image: {}", image);
            Ok(())
        }
        Err(e) if e.is_benign_cleanup() && shared => {
            debug!("Image {} left to the last worker: {}", image, e);
            Ok(())
        }
        Err(e) if e.is_benign_cleanup() => {
            warn!("Image {} not removed: {}", image, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
