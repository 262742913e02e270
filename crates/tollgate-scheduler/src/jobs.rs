//! Periodic background jobs.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Run `job` every `period` until the returned handle is aborted.
///
/// A failed iteration is logged and retried on the next tick; iterations
/// never overlap.
pub fn spawn_periodic<F, Fut, T, E>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Debug,
    E: Display,
{
    tokio::spawn(async move {
        info!(job = name, period_secs = period.as_secs(), "Starting periodic job");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match job().await {
                Ok(report) => debug!(job = name, ?report, "Job finished"),
                Err(e) => warn!(job = name, error = %e, "Job failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = spawn_periodic("flaky", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 { Err("boom") } else { Ok(n) }
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }
}
