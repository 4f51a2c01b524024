//! Container lifecycle controller.
//!
//! [`DockerContainer`] owns one container from creation to removal:
//!
//! ```text
//! Unstarted -> Starting -> Running -> Stopping -> Removed
//!                  |
//!                  +-> Failed -> Removed
//! ```
//!
//! `start` returns once the daemon accepted the process. Application-level
//! readiness is layered on top with [`DockerContainer::wait_until_ready`], and
//! [`DockerContainer::scoped`] ties both to a body whose exit always removes the
//! container. A startup failure forwards the container's logs, force-removes
//! it and returns the original error; a name collision is reported as
//! [`ContainerError::AlreadyExists`] and leaves the other container untouched.

use crate::container::archive;
use crate::container::executor::{self, ExecConfig, ExecOutput};
use crate::container::{
    AddressResolver, ContainerError, ContainerSpec, DockerClient, HostPort, ImageProvisioner,
    ReadinessPolicy, Result, wait_for_http_healthcheck, wait_for_logs,
};
use std::path::Path;
use tracing::{debug, info, warn};

/// Target under which forwarded container output is logged.
pub const CONTAINER_LOGS_TARGET: &str = "tomodachi_testcontainers::container_logs";

/// Lifecycle state of a [`DockerContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Removed,
    /// Startup or removal failed and the container may still exist
    Failed,
}

/// A single container and its lifecycle.
///
/// Dropping a container that was started but not stopped force-removes it.
/// The drop waits for one daemon round-trip on the current thread; on a
/// multi-thread runtime the worker is handed off first. Call
/// [`DockerContainer::stop`] in async code instead of relying on the drop.
pub struct DockerContainer {
    client: DockerClient,
    spec: ContainerSpec,
    kind: String,
    disable_logging: bool,
    stop_timeout: i64,
    state: LifecycleState,
    id: Option<String>,
}

impl std::fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerContainer")
            .field("label", &self.label())
            .field("image", &self.spec.image())
            .field("state", &self.state)
            .field("id", &self.id)
            .finish()
    }
}

impl DockerContainer {
    pub fn new(client: DockerClient, spec: ContainerSpec) -> Self {
        Self {
            client,
            spec,
            kind: "DockerContainer".to_string(),
            disable_logging: false,
            stop_timeout: 10,
            state: LifecycleState::Unstarted,
            id: None,
        }
    }

    /// Kind shown in log labels, e.g. `MinioContainer`.
    pub fn with_kind<S: Into<String>>(mut self, kind: S) -> Self {
        self.kind = kind.into();
        self
    }

    /// Skip log forwarding on a normal stop. Logs are still forwarded on a
    /// startup failure.
    pub fn disable_logging(mut self, disable: bool) -> Self {
        self.disable_logging = disable;
        self
    }

    /// Seconds the daemon waits before killing a stopping container.
    pub fn stop_timeout(mut self, seconds: i64) -> Self {
        self.stop_timeout = seconds;
        self
    }

    /// `Kind (name)`, the label attached to this container's log records.
    pub fn label(&self) -> String {
        format!("{} ({})", self.kind, self.spec.name())
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn client(&self) -> &DockerClient {
        &self.client
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Daemon-assigned container ID, once created.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn require_id(&self) -> Result<&str> {
        match (self.state, self.id.as_deref()) {
            (LifecycleState::Running, Some(id)) => Ok(id),
            _ => Err(ContainerError::Other(format!(
                "{} is not running ({:?})",
                self.label(),
                self.state
            ))),
        }
    }

    /// Create and start the container.
    ///
    /// Missing images are pulled first. On failure the container is cleaned up
    /// before the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::AlreadyExists`] on a name collision, or the
    /// error of the failing step otherwise.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            LifecycleState::Unstarted | LifecycleState::Removed
        ) {
            return Err(ContainerError::Other(format!(
                "{} cannot be started from {:?}",
                self.label(),
                self.state
            )));
        }
        self.state = LifecycleState::Starting;

        match self.create_and_start().await {
            Ok(()) => {
                self.state = LifecycleState::Running;
                info!(container = %self.label(), "Container started: {}", self.name());
                Ok(())
            }
            Err(e @ ContainerError::AlreadyExists(_)) => {
                warn!(container = %self.label(), "{}", e);
                self.id = None;
                self.state = LifecycleState::Removed;
                Err(e)
            }
            Err(e) => Err(self.abort(e).await),
        }
    }

    async fn create_and_start(&mut self) -> Result<()> {
        info!(container = %self.label(), "Pulling image: {}", self.spec.image());
        ImageProvisioner::new(self.client.clone())
            .resolve(self.spec.image(), true)
            .await?;

        let options = bollard::container::CreateContainerOptions {
            name: self.spec.name(),
            ..Default::default()
        };
        let response = self
            .client
            .docker()
            .create_container(Some(options), self.spec.to_bollard())
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 409, ..
                } => ContainerError::AlreadyExists(self.spec.name().to_string()),
                e => ContainerError::ApiError(e),
            })?;

        for warning in &response.warnings {
            warn!(container = %self.label(), "{}", warning);
        }
        debug!(container = %self.label(), "Created container {}", response.id);
        self.id = Some(response.id);

        self.client
            .docker()
            .start_container(
                self.spec.name(),
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;
        Ok(())
    }

    /// Tear down after a failed startup and hand back the cause.
    ///
    /// Logs are forwarded regardless of `disable_logging`. Cleanup errors are
    /// logged, never returned in place of `cause`.
    pub async fn abort(&mut self, cause: ContainerError) -> ContainerError {
        warn!(container = %self.label(), "Failed to start the container: {}", cause);
        self.state = LifecycleState::Failed;

        if self.id.is_none() {
            self.state = LifecycleState::Removed;
            return cause;
        }
        if let Err(e) = self.forward_logs().await {
            debug!(container = %self.label(), "Could not fetch logs: {}", e);
        }
        match self.remove().await {
            Ok(()) => {
                self.id = None;
                self.state = LifecycleState::Removed;
            }
            Err(e) => warn!(container = %self.label(), "Cleanup after failure failed: {}", e),
        }
        cause
    }

    /// Stop and remove the container.
    ///
    /// Idempotent: stopping a container that was never started or is already
    /// gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns error only if the daemon refuses removal for a reason other
    /// than the container being gone already.
    pub async fn stop(&mut self) -> Result<()> {
        if matches!(
            self.state,
            LifecycleState::Unstarted | LifecycleState::Removed
        ) {
            return Ok(());
        }
        self.state = LifecycleState::Stopping;

        if !self.disable_logging {
            if let Err(e) = self.forward_logs().await {
                debug!(container = %self.label(), "Could not fetch logs: {}", e);
            }
        }

        if let Err(e) = self
            .client
            .docker()
            .stop_container(
                self.spec.name(),
                Some(bollard::container::StopContainerOptions {
                    t: self.stop_timeout,
                }),
            )
            .await
        {
            debug!(container = %self.label(), "Stop before removal failed: {}", e);
        }

        match self.remove().await {
            Ok(()) => {
                self.id = None;
                self.state = LifecycleState::Removed;
                info!(container = %self.label(), "Container removed: {}", self.name());
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Failed;
                Err(e)
            }
        }
    }

    async fn remove(&self) -> Result<()> {
        let removed = self
            .client
            .docker()
            .remove_container(
                self.spec.name(),
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(ContainerError::ApiError);

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign_cleanup() => {
                debug!(container = %self.label(), "Already removed: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Restart the process in place; ID, name and port bindings are kept.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or the restart fails.
    pub async fn restart(&self) -> Result<()> {
        let id = self.require_id()?;
        self.client
            .docker()
            .restart_container(id, None::<bollard::query_parameters::RestartContainerOptions>)
            .await?;
        info!(container = %self.label(), "Container restarted");
        Ok(())
    }

    /// Block until the readiness policy is satisfied.
    ///
    /// HTTP probes target the published port on the external address; the log
    /// probe, if any, runs after the HTTP probe passed.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ReadinessError`] when a probe times out.
    pub async fn wait_until_ready(&self, policy: &ReadinessPolicy) -> Result<()> {
        let id = self.require_id()?;

        if let Some(http) = policy.http() {
            let base = self.external_address(http.port).await?;
            wait_for_http_healthcheck(&http.url(&base.http_url()), http).await?;
        }
        if let Some(log) = policy.log() {
            wait_for_logs(&self.client, id, log).await?;
        }
        Ok(())
    }

    /// Start and wait for readiness, cleaning up if either fails.
    ///
    /// # Errors
    ///
    /// Returns the startup or readiness error after cleanup.
    pub async fn start_and_wait(&mut self, policy: &ReadinessPolicy) -> Result<()> {
        self.start().await?;
        if let Err(e) = self.wait_until_ready(policy).await {
            return Err(self.abort(e).await);
        }
        Ok(())
    }

    /// Run `body` against the ready container, then stop it whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the startup, readiness or body error. A stop error is returned
    /// only if everything else succeeded.
    pub async fn scoped<T, F>(mut self, policy: &ReadinessPolicy, body: F) -> Result<T>
    where
        F: AsyncFnOnce(&DockerContainer) -> Result<T>,
    {
        self.start_and_wait(policy).await?;
        let outcome = body(&self).await;
        let stopped = self.stop().await;

        match (outcome, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), stopped) => {
                if let Err(stop_error) = stopped {
                    warn!(container = %self.label(), "Stop after failure failed: {}", stop_error);
                }
                Err(e)
            }
        }
    }

    /// Combined stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns error if the container was not created or logs are unavailable.
    pub async fn logs(&self) -> Result<String> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| ContainerError::NotFound(self.spec.name().to_string()))?;
        self.client.logs(id).await
    }

    /// Emit every log line under [`CONTAINER_LOGS_TARGET`].
    ///
    /// # Errors
    ///
    /// Returns error if logs cannot be fetched.
    pub async fn forward_logs(&self) -> Result<()> {
        let logs = self.logs().await?;
        let label = self.label();
        for line in logs.lines() {
            info!(target: CONTAINER_LOGS_TARGET, container = %label, "{}", line);
        }
        Ok(())
    }

    /// Run a command in the container.
    ///
    /// # Errors
    ///
    /// Returns error if the container is not running or the exec fails.
    pub async fn exec<C: Into<ExecConfig>>(&self, command: C) -> Result<ExecOutput> {
        let id = self.require_id()?;
        executor::execute(self.client.docker(), id, &command.into()).await
    }

    /// Address other containers on the network use for `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotAttached`] if the container has no
    /// endpoint on its network.
    pub async fn internal_address(&self, port: u16) -> Result<HostPort> {
        let id = self.require_id()?;
        let host = self.resolver().internal_host(id).await?;
        Ok(HostPort::new(host, port))
    }

    /// Address the test process uses for container `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] if `port` is not published.
    pub async fn external_address(&self, port: u16) -> Result<HostPort> {
        let id = self.require_id()?;
        let host_port = self.spec.host_port(port).ok_or_else(|| {
            ContainerError::ConfigError(format!(
                "Port {} is not published by {}",
                port,
                self.label()
            ))
        })?;
        self.resolver().external_address(id, port, host_port).await
    }

    fn resolver(&self) -> AddressResolver {
        AddressResolver::new(self.client.clone(), self.spec.network())
    }

    /// Copy a host directory's contents into `container_path`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be archived or uploaded.
    pub async fn copy_folder(&self, source: &Path, container_path: &str) -> Result<()> {
        let id = self
            .id
            .as_deref()
            .ok_or_else(|| ContainerError::NotFound(self.spec.name().to_string()))?;
        let tar = archive::folder_archive(source)?;

        let options = bollard::query_parameters::UploadToContainerOptionsBuilder::default()
            .path(container_path)
            .build();
        self.client
            .docker()
            .upload_to_container(id, Some(options), bollard::body_full(bytes::Bytes::from(tar)))
            .await?;
        debug!(
            container = %self.label(),
            "Copied {} to {}",
            source.display(),
            container_path
        );
        Ok(())
    }

    fn needs_cleanup(&self) -> bool {
        self.id.is_some()
            && matches!(
                self.state,
                LifecycleState::Starting
                    | LifecycleState::Running
                    | LifecycleState::Stopping
                    | LifecycleState::Failed
            )
    }
}

impl Drop for DockerContainer {
    fn drop(&mut self) {
        if !self.needs_cleanup() {
            return;
        }
        let label = self.label();
        warn!(container = %label, "Container dropped without stop, force-removing");

        let docker = match self.client.reconnect() {
            Ok(docker) => docker,
            Err(e) => {
                warn!(container = %label, "Cannot reconnect for cleanup: {}", e);
                return;
            }
        };
        let name = self.spec.name().to_string();

        // The owning runtime may be shutting down, so cleanup runs on its own.
        let cleanup = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => return Err(e.to_string()),
            };
            runtime
                .block_on(docker.remove_container(
                    &name,
                    Some(bollard::container::RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                ))
                .map_err(|e| e.to_string())
        });

        match block_off_runtime(|| cleanup.join()) {
            Ok(Ok(())) => debug!(container = %label, "Removed on drop"),
            Ok(Err(e)) => warn!(container = %label, "Removal on drop failed: {}", e),
            Err(_) => warn!(container = %label, "Cleanup thread panicked"),
        }
    }
}

/// Run a blocking call, moving other tasks off this worker first when
/// called from a multi-thread runtime.
fn block_off_runtime<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}
