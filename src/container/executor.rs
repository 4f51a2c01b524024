//! Command execution inside running containers.
//!
//! Used by profiles for in-container setup (creating SFTP upload folders,
//! emptying MinIO buckets) and exposed on [`DockerContainer::exec`].
//!
//! [`DockerContainer::exec`]: crate::container::DockerContainer::exec

use crate::container::{ContainerError, Result};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::stream::StreamExt;
use tracing::debug;

/// A command to run in a container.
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    cmd: Vec<String>,
    env: Vec<String>,
    working_dir: Option<String>,
    user: Option<String>,
    privileged: bool,
}

impl ExecConfig {
    /// Create a config for the given command arguments.
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(|s| s.into()).collect(),
            ..Default::default()
        }
    }

    /// Run through `sh -c`, for commands that need globbing or `&&`.
    pub fn shell<S: Into<String>>(script: S) -> Self {
        Self::new(["sh".to_string(), "-c".to_string(), script.into()])
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn working_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the user to execute as.
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run with elevated privileges.
    pub fn privileged(mut self, enable: bool) -> Self {
        self.privileged = enable;
        self
    }

    /// Command arguments.
    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for ExecConfig {
    fn from(cmd: [S; N]) -> Self {
        Self::new(cmd)
    }
}

impl<S: Into<String>> From<Vec<S>> for ExecConfig {
    fn from(cmd: Vec<S>) -> Self {
        Self::new(cmd)
    }
}

impl<S: Into<String>> FromIterator<S> for ExecConfig {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Captured result of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (None if the daemon did not report one)
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined stdout and stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    /// Turn a non-zero exit into an error carrying the command's output.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ExecutionError`] unless the command exited with 0.
    pub fn check(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(ContainerError::ExecutionError(format!(
            "Command exited with {}: {}",
            self.exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "unknown status".to_string()),
            self.combined().trim()
        )))
    }
}

/// Execute a command in a running container and wait for it to exit.
///
/// # Errors
///
/// Returns error if the exec cannot be created or its output cannot be read.
/// A non-zero exit code is reported in [`ExecOutput`], not as an error.
pub async fn execute(docker: &Docker, container_id: &str, config: &ExecConfig) -> Result<ExecOutput> {
    if config.cmd.is_empty() {
        return Err(ContainerError::ExecutionError("Empty command".to_string()));
    }
    debug!("Executing in container {}: {:?}", container_id, config.cmd);

    let exec_options = CreateExecOptions {
        cmd: Some(config.cmd.clone()),
        env: if config.env.is_empty() {
            None
        } else {
            Some(config.env.clone())
        },
        working_dir: config.working_dir.clone(),
        user: config.user.clone(),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        privileged: Some(config.privileged),
        ..Default::default()
    };

    let exec = docker.create_exec(container_id, exec_options).await?;
    let started = docker.start_exec(&exec.id, None).await?;

    let mut stdout = String::new();
    let mut stderr = String::new();

    let StartExecResults::Attached { mut output, .. } = started else {
        return Err(ContainerError::ExecutionError(
            "Unexpected detached execution".to_string(),
        ));
    };
    while let Some(chunk) = output.next().await {
        match chunk {
            Ok(LogOutput::StdOut { message }) => stdout.push_str(&String::from_utf8_lossy(&message)),
            Ok(LogOutput::StdErr { message }) => stderr.push_str(&String::from_utf8_lossy(&message)),
            Ok(_) => {}
            Err(e) => {
                return Err(ContainerError::ExecutionError(format!(
                    "Failed to read output: {}",
                    e
                )));
            }
        }
    }

    let exit_code = docker.inspect_exec(&exec.id).await?.exit_code;
    debug!("Command exited with {:?}", exit_code);

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_config() {
        let config = ExecConfig::new(["mkdir", "-p", "/home/userpass/upload"])
            .env("FOO", "bar")
            .working_dir("/")
            .user("root");

        assert_eq!(config.cmd(), &["mkdir", "-p", "/home/userpass/upload"]);
        assert_eq!(config.env, vec!["FOO=bar"]);
        assert_eq!(config.working_dir.as_deref(), Some("/"));
        assert_eq!(config.user.as_deref(), Some("root"));
    }

    #[test]
    fn test_shell_config() {
        let config = ExecConfig::shell("echo a && echo b");
        assert_eq!(config.cmd(), &["sh", "-c", "echo a && echo b"]);
    }

    #[test]
    fn test_conversions() {
        let config: ExecConfig = vec!["echo", "hello"].into_iter().collect();
        assert_eq!(config.cmd(), &["echo", "hello"]);

        let config: ExecConfig = ["ls", "/home"].into();
        assert_eq!(config.cmd(), &["ls", "/home"]);

        let config: ExecConfig = vec!["true".to_string()].into();
        assert_eq!(config.cmd(), &["true"]);
    }

    #[test]
    fn test_exec_output_check() {
        let ok = ExecOutput {
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(ok.success());
        assert_eq!(ok.clone().check().unwrap(), ok);

        let failed = ExecOutput {
            stdout: String::new(),
            stderr: "mc: <ERROR> Unable to remove\n".to_string(),
            exit_code: Some(1),
        };
        assert!(!failed.success());
        let err = failed.check().unwrap_err();
        assert!(err.to_string().contains("exited with 1"));
        assert!(err.to_string().contains("Unable to remove"));
    }
}
