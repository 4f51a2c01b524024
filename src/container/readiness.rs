//! Readiness probes.
//!
//! A started container is not necessarily able to serve requests. Callers
//! block on a [`ReadinessPolicy`] before handing the container to a test:
//! poll an HTTP endpoint until it answers with the expected status, tail the
//! logs until a pattern shows up, or both in that order.

use crate::container::{ContainerError, ContainerState, DockerClient, Result};
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll an HTTP endpoint until it returns the expected status code.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    /// Container port serving the endpoint
    pub port: u16,
    /// Request path, e.g. `/health`
    pub path: String,
    /// Status code that signals readiness
    pub expected_status: u16,
    /// Pause between attempts
    pub interval: Duration,
    /// Timeout for each request
    pub request_timeout: Duration,
    /// Overall deadline
    pub timeout: Duration,
}

impl HttpProbe {
    /// Probe `GET path` on a container port, expecting 200.
    pub fn new<S: Into<String>>(port: u16, path: S) -> Self {
        Self {
            port,
            path: path.into(),
            expected_status: 200,
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(19),
        }
    }

    pub fn expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the endpoint on a given base, e.g. `http://localhost:9000`.
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

/// Tail container logs until a regular expression matches.
#[derive(Debug, Clone)]
pub struct LogProbe {
    /// Pattern searched in the combined stdout and stderr
    pub pattern: Regex,
    /// Pause between log reads
    pub interval: Duration,
    /// Overall deadline
    pub timeout: Duration,
}

impl LogProbe {
    /// Create a log probe from a regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] if the pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            ContainerError::ConfigError(format!("Invalid log pattern '{}': {}", pattern, e))
        })?;
        Ok(Self::from_regex(pattern))
    }

    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            pattern,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How to decide that a container is ready.
#[derive(Debug, Clone, Default)]
pub enum ReadinessPolicy {
    /// Ready as soon as the daemon reports the process started
    #[default]
    None,
    /// HTTP endpoint answers with the expected status
    Http(HttpProbe),
    /// Log output matches a pattern
    Log(LogProbe),
    /// HTTP first, then a log confirmation
    Combined { http: HttpProbe, log: LogProbe },
}

impl ReadinessPolicy {
    /// The HTTP part of the policy, if any.
    pub fn http(&self) -> Option<&HttpProbe> {
        match self {
            ReadinessPolicy::Http(http) | ReadinessPolicy::Combined { http, .. } => Some(http),
            _ => None,
        }
    }

    /// The log part of the policy, if any.
    pub fn log(&self) -> Option<&LogProbe> {
        match self {
            ReadinessPolicy::Log(log) | ReadinessPolicy::Combined { log, .. } => Some(log),
            _ => None,
        }
    }

    /// Override the overall deadline of every probe in the policy.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match &mut self {
            ReadinessPolicy::None => {}
            ReadinessPolicy::Http(http) => http.timeout = timeout,
            ReadinessPolicy::Log(log) => log.timeout = timeout,
            ReadinessPolicy::Combined { http, log } => {
                http.timeout = timeout;
                log.timeout = timeout;
            }
        }
        self
    }
}

/// Poll `url` until it answers with the probe's expected status.
///
/// # Errors
///
/// Returns [`ContainerError::ReadinessError`] carrying the last observed
/// status code or connection error once the deadline passes.
pub async fn wait_for_http_healthcheck(url: &str, probe: &HttpProbe) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(probe.request_timeout)
        .build()?;
    let start = Instant::now();

    loop {
        let symptom = match client.get(url).send().await {
            Ok(response) if response.status().as_u16() == probe.expected_status => {
                debug!("Healthcheck passed: {} after {:?}", url, start.elapsed());
                return Ok(());
            }
            Ok(response) => format!(
                "Healthcheck failed with HTTP status code: {}",
                response.status().as_u16()
            ),
            Err(e) => format!("Healthcheck request failed: {}", e),
        };

        if start.elapsed() + probe.interval >= probe.timeout {
            return Err(ContainerError::ReadinessError {
                target: url.to_string(),
                symptom,
            });
        }
        debug!("{} ({}), retrying", symptom, url);
        tokio::time::sleep(probe.interval).await;
    }
}

/// Read a container's logs until the probe's pattern matches.
///
/// Gives up early if the container stops running.
///
/// # Errors
///
/// Returns [`ContainerError::ReadinessError`] carrying the tail of the logs
/// once the deadline passes or the container exits.
pub async fn wait_for_logs(client: &DockerClient, container: &str, probe: &LogProbe) -> Result<()> {
    let start = Instant::now();

    loop {
        let logs = client.logs(container).await?;
        if probe.pattern.is_match(&logs) {
            debug!(
                "Log pattern '{}' matched in {} after {:?}",
                probe.pattern,
                container,
                start.elapsed()
            );
            return Ok(());
        }

        let state = client.container_state(container).await?;
        let exited = matches!(state, ContainerState::Stopped | ContainerState::Dead);

        if exited || start.elapsed() + probe.interval >= probe.timeout {
            let reason = if exited {
                "container exited before"
            } else {
                "no match for"
            };
            return Err(ContainerError::ReadinessError {
                target: container.to_string(),
                symptom: format!(
                    "{} log pattern '{}'; last output: {}",
                    reason,
                    probe.pattern,
                    tail(&logs, 5)
                ),
            });
        }
        tokio::time::sleep(probe.interval).await;
    }
}

fn tail(text: &str, lines: usize) -> String {
    let collected: Vec<&str> = text.lines().collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve every request with a fixed status line.
    async fn serve_status(status: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn fast_probe() -> HttpProbe {
        HttpProbe::new(80, "/health")
            .interval(Duration::from_millis(50))
            .request_timeout(Duration::from_millis(500))
            .timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_http_probe_passes() {
        let base = serve_status("200 OK").await;
        let probe = fast_probe();
        wait_for_http_healthcheck(&probe.url(&base), &probe)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_probe_surfaces_status_code() {
        let base = serve_status("500 Internal Server Error").await;
        let probe = fast_probe();

        let start = Instant::now();
        let err = wait_for_http_healthcheck(&probe.url(&base), &probe)
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, ContainerError::ReadinessError { .. }));
        assert!(
            err.to_string()
                .contains("Healthcheck failed with HTTP status code: 500")
        );
    }

    #[tokio::test]
    async fn test_http_probe_custom_status() {
        let base = serve_status("204 No Content").await;
        let probe = fast_probe().expected_status(204);
        wait_for_http_healthcheck(&probe.url(&base), &probe)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_probe_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = fast_probe();
        let err = wait_for_http_healthcheck(&probe.url(&format!("http://{}", addr)), &probe)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Healthcheck request failed"));
    }

    #[test]
    fn test_probe_url() {
        let probe = HttpProbe::new(9000, "/minio/health/live");
        assert_eq!(
            probe.url("http://localhost:9000/"),
            "http://localhost:9000/minio/health/live"
        );
        let probe = HttpProbe::new(8001, "");
        assert_eq!(probe.url("http://localhost:8001"), "http://localhost:8001/");
    }

    #[test]
    fn test_invalid_log_pattern() {
        let err = LogProbe::new("(unclosed").unwrap_err();
        assert!(matches!(err, ContainerError::ConfigError(_)));
    }

    #[test]
    fn test_policy_parts() {
        let policy = ReadinessPolicy::Combined {
            http: HttpProbe::new(9700, "/health"),
            log: LogProbe::new("(?i)started service").unwrap(),
        }
        .with_timeout(Duration::from_secs(5));

        assert_eq!(policy.http().unwrap().timeout, Duration::from_secs(5));
        assert!(policy.log().unwrap().pattern.is_match("Started service \"orders\""));
        assert!(ReadinessPolicy::None.http().is_none());
        assert!(ReadinessPolicy::None.log().is_none());
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
        assert_eq!(tail("", 5), "");
    }
}
