//! Sampling helpers for asserting on asynchronous systems.
//!
//! A test that publishes a message and expects a side effect cannot assert
//! immediately. [`probe_until`] keeps sampling until the assertion holds;
//! [`probe_during_interval`] checks that it keeps holding for a while.

use std::future::Future;
use std::time::{Duration, Instant};

/// Default pause between samples
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Default sampling window
pub const DEFAULT_STOP_AFTER: Duration = Duration::from_secs(3);

/// Run `probe` until it succeeds, returning its value.
///
/// # Errors
///
/// Returns the last error once `stop_after` has elapsed.
pub async fn probe_until<T, E, F, Fut>(
    mut probe: F,
    interval: Duration,
    stop_after: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    loop {
        match probe().await {
            Ok(value) => return Ok(value),
            Err(e) if start.elapsed() + interval >= stop_after => return Err(e),
            Err(_) => tokio::time::sleep(interval).await,
        }
    }
}

/// Run `probe` repeatedly for `stop_after`, requiring every run to succeed.
///
/// Returns the value of the last run.
///
/// # Errors
///
/// Returns the first error encountered.
pub async fn probe_during_interval<T, E, F, Fut>(
    mut probe: F,
    interval: Duration,
    stop_after: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    loop {
        let value = probe().await?;
        if start.elapsed() + interval >= stop_after {
            return Ok(value);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_probe_until_eventually_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = probe_until(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err("not yet") } else { Ok(n) }
                }
            },
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_until_reraises_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = probe_until(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(format!("attempt {}", n))
                }
            },
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .await;

        let n = calls.load(Ordering::SeqCst);
        assert!(n > 1);
        assert_eq!(result.unwrap_err(), format!("attempt {}", n));
    }

    #[tokio::test]
    async fn test_probe_during_interval_keeps_checking() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let result: Result<u32, ()> = probe_during_interval(
            || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .await;

        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!(calls.load(Ordering::SeqCst) > 3);
        assert_eq!(result.unwrap(), calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_probe_during_interval_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), &str> = probe_during_interval(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                        Err("message was consumed twice")
                    } else {
                        Ok(())
                    }
                }
            },
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(result.unwrap_err(), "message was consumed twice");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
