//! Test assertions on container logs and timestamps.
//!
//! The `assert_*` functions panic with the full log output on failure, the
//! way `assert!` does, so they read naturally inside test bodies. The
//! `check_*` variants return the failure message instead.

use crate::container::{DockerContainer, Result};
use chrono::{DateTime, TimeDelta, Utc};

/// Default tolerance for [`assert_datetime_within_range`], ten seconds.
pub fn default_datetime_range() -> TimeDelta {
    TimeDelta::seconds(10)
}

pub fn check_logs_contain(logs: &str, contains: &str) -> std::result::Result<(), String> {
    if logs.contains(contains) {
        Ok(())
    } else {
        Err(format!(
            "Expected logs to contain: '{}'; logs: {}",
            contains, logs
        ))
    }
}

pub fn check_logs_not_contain(logs: &str, contains: &str) -> std::result::Result<(), String> {
    if logs.contains(contains) {
        Err(format!(
            "Expected logs not to contain: '{}'; logs: {}",
            contains, logs
        ))
    } else {
        Ok(())
    }
}

/// Count lines containing `contains` and compare against `count`.
pub fn check_logs_match_line_count(
    logs: &str,
    contains: &str,
    count: usize,
) -> std::result::Result<(), String> {
    let matched = logs.lines().filter(|line| line.contains(contains)).count();
    if matched == count {
        Ok(())
    } else {
        Err(format!(
            "Expected '{}' to be contained in {} lines, found {} lines; logs: {}",
            contains, count, matched, logs
        ))
    }
}

/// Assert the container's logs contain a substring.
///
/// # Errors
///
/// Returns error if the logs cannot be fetched.
///
/// # Panics
///
/// Panics if the substring is absent.
pub async fn assert_logs_contain(container: &DockerContainer, contains: &str) -> Result<()> {
    let logs = container.logs().await?;
    if let Err(message) = check_logs_contain(&logs, contains) {
        panic!("{}", message);
    }
    Ok(())
}

/// Assert the container's logs do not contain a substring.
///
/// # Errors
///
/// Returns error if the logs cannot be fetched.
///
/// # Panics
///
/// Panics if the substring is present.
pub async fn assert_logs_not_contain(container: &DockerContainer, contains: &str) -> Result<()> {
    let logs = container.logs().await?;
    if let Err(message) = check_logs_not_contain(&logs, contains) {
        panic!("{}", message);
    }
    Ok(())
}

/// Assert exactly `count` log lines contain a substring.
///
/// # Errors
///
/// Returns error if the logs cannot be fetched.
///
/// # Panics
///
/// Panics if the number of matching lines differs.
pub async fn assert_logs_match_line_count(
    container: &DockerContainer,
    contains: &str,
    count: usize,
) -> Result<()> {
    let logs = container.logs().await?;
    if let Err(message) = check_logs_match_line_count(&logs, contains, count) {
        panic!("{}", message);
    }
    Ok(())
}

/// Assert `value` lies within `range` of the current time.
///
/// # Panics
///
/// Panics if `value` is outside `[now - range, now + range]`.
#[track_caller]
pub fn assert_datetime_within_range(value: DateTime<Utc>, range: TimeDelta) {
    let now = Utc::now();
    assert!(
        now - range <= value && value <= now + range,
        "Expected {} to be within {} of {}",
        value,
        range,
        now
    );
}
