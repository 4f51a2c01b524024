//! Integration tests for the container lifecycle controller.
//!
//! These tests run real containers against the local Docker daemon.
//! Tests are skipped if Docker is not available or SKIP_CONTAINER_TESTS=1.

use serial_test::serial;
use test_tag::tag;
use tomodachi_testcontainers::container::{
    ContainerError, ContainerSpec, DockerClient, DockerContainer, ExecConfig, LifecycleState,
    LogProbe, ReadinessPolicy,
};

const IMAGE: &str = "alpine:3.19";

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn sleeper(name: &str) -> ContainerSpec {
    ContainerSpec::builder()
        .image(IMAGE)
        .name(name)
        .command("sleep infinity")
        .build()
        .expect("Failed to build spec")
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_start_then_stop_removes_container() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-sleep";
    let mut container = DockerContainer::new(client.clone(), sleeper(name));

    container.start().await.expect("Failed to start");
    assert_eq!(container.state(), LifecycleState::Running);
    assert!(client.container_exists(name).await.unwrap());

    container.stop().await.expect("Failed to stop");
    assert_eq!(container.state(), LifecycleState::Removed);
    assert!(!client.container_exists(name).await.unwrap());

    // Second stop is a no-op
    container.stop().await.expect("Second stop failed");
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_failed_start_removes_container() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-missing-executable";
    let spec = ContainerSpec::builder()
        .image(IMAGE)
        .name(name)
        .command("foo")
        .build()
        .unwrap();
    let mut container = DockerContainer::new(client.clone(), spec);

    let err = container.start().await.expect_err("Start should fail");
    assert!(
        err.to_string().contains("foo"),
        "Error should name the missing executable: {}",
        err
    );
    assert_eq!(container.state(), LifecycleState::Removed);
    assert!(!client.container_exists(name).await.unwrap());

    container.stop().await.expect("Stop after failure should succeed");
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_name_collision_leaves_other_container_running() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-collision";
    let mut first = DockerContainer::new(client.clone(), sleeper(name));
    first.start().await.expect("Failed to start first container");
    let first_id = first.id().unwrap().to_string();

    let mut second = DockerContainer::new(client.clone(), sleeper(name));
    let err = second.start().await.expect_err("Second start should collide");
    assert!(matches!(err, ContainerError::AlreadyExists(ref n) if n == name));

    // Dropping or stopping the loser must not touch the winner
    second.stop().await.unwrap();
    drop(second);

    let inspect = client.inspect_container(name).await.unwrap();
    assert_eq!(inspect.id.as_deref(), Some(first_id.as_str()));
    assert_eq!(inspect.state.and_then(|s| s.running), Some(true));

    first.stop().await.unwrap();
    assert!(!client.container_exists(name).await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_scoped_removes_container_after_body_error() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-scoped";
    let spec = ContainerSpec::builder()
        .image(IMAGE)
        .name(name)
        .command("sh -c 'echo container is ready && sleep infinity'")
        .env("GREETING", "hello")
        .build()
        .unwrap();
    let policy = ReadinessPolicy::Log(LogProbe::new("container is ready").unwrap());

    let result: Result<(), ContainerError> = DockerContainer::new(client.clone(), spec)
        .scoped(&policy, async |container| {
            let output = container
                .exec(ExecConfig::shell("echo $GREETING"))
                .await?
                .check()?;
            assert_eq!(output.stdout.trim(), "hello");

            let failed = container.exec(["sh", "-c", "exit 3"]).await?;
            assert_eq!(failed.exit_code, Some(3));
            failed.check().map(|_| ())
        })
        .await;

    let err = result.expect_err("Body error should propagate");
    assert!(matches!(err, ContainerError::ExecutionError(_)));
    assert!(!client.container_exists(name).await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_log_readiness_timeout_removes_container() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-never-ready";
    let policy = ReadinessPolicy::Log(
        LogProbe::new("never printed")
            .unwrap()
            .interval(std::time::Duration::from_millis(200))
            .timeout(std::time::Duration::from_secs(2)),
    );

    let mut container = DockerContainer::new(client.clone(), sleeper(name));
    let err = container
        .start_and_wait(&policy)
        .await
        .expect_err("Readiness should time out");

    assert!(matches!(err, ContainerError::ReadinessError { .. }));
    assert!(!client.container_exists(name).await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn test_dropped_container_is_removed() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = DockerClient::new().await.expect("Failed to connect");
    let name = "tc-lifecycle-dropped";
    {
        let mut container = DockerContainer::new(client.clone(), sleeper(name));
        container.start().await.expect("Failed to start");
    }
    assert!(!client.container_exists(name).await.unwrap());
}
