//! Bounded waiting for a condition.

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `done` every `interval` until it returns true or `timeout` elapses.
///
/// Checks once immediately. Returns whether the condition was met.
pub async fn wait_until_timeout<F>(timeout: Duration, interval: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_immediately_when_already_done() {
        let started = std::time::Instant::now();
        assert!(wait_until_timeout(Duration::from_secs(5), Duration::from_secs(1), || true).await);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn detects_condition_between_polls() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let started = std::time::Instant::now();
        let met = wait_until_timeout(Duration::from_secs(5), Duration::from_millis(10), || {
            flag.load(Ordering::SeqCst)
        })
        .await;
        assert!(met);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn gives_up_at_deadline() {
        let started = std::time::Instant::now();
        let met = wait_until_timeout(Duration::from_millis(80), Duration::from_millis(30), || false).await;
        assert!(!met);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }
}
