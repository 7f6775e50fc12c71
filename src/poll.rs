//! Shared timing primitives.
//!
//! Every bounded wait in the crate funnels through [`poll_until`]: a fixed
//! short interval bounded by an explicit timeout. Host change notifications
//! can supplement this (the bridge forwards them), but polling is the
//! authoritative fallback since notifications are not guaranteed to fire for
//! all mutation kinds.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Default poll interval for element waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll interval for slower readbacks (sidebar text updates).
pub const READBACK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Repeatedly run `op` until it yields `Some`, or `timeout` elapses.
///
/// `op` is always run at least once, so an already-satisfied condition
/// resolves without sleeping.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = op().await {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn resolves_immediately_when_condition_holds() {
        let result = poll_until(Duration::from_secs(1), POLL_INTERVAL, || async {
            Some(42)
        })
        .await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn retries_until_condition_holds() {
        let calls = AtomicU32::new(0);
        let result = poll_until(Duration::from_secs(2), Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 3).then_some(n) }
        })
        .await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let result: Option<()> =
            poll_until(Duration::from_millis(50), Duration::from_millis(10), || async {
                None
            })
            .await;
        assert_eq!(result, None);
    }
}
