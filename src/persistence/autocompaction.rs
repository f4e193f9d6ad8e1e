//! Periodic compaction
//!
//! A background tokio task runs a compaction callback on a fixed interval
//! until it is told to stop or the handle is dropped.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shortest accepted interval
pub const MIN_AUTOCOMPACTION_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running autocompaction task. Dropping it stops the task.
pub struct Autocompaction {
    shutdown: mpsc::UnboundedSender<()>,
    period: Duration,
}

impl Autocompaction {
    /// Spawns the task on the given runtime. The first run happens one
    /// period from now; periods below the minimum are raised to it.
    pub fn spawn<F, Fut>(runtime: &Handle, period: Duration, mut compact: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = period.max(MIN_AUTOCOMPACTION_INTERVAL);
        let (shutdown, mut shutdown_rx) = mpsc::unbounded_channel::<()>();

        runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // the callback reports whether the store is still alive
                        if !compact().await {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("autocompaction stopped");
        });

        Self { shutdown, period }
    }

    /// Effective interval
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stops the task; a compaction already running finishes first
    pub fn stop(self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_period_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = Autocompaction::spawn(&Handle::current(), Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        handle.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_has_a_floor() {
        let handle =
            Autocompaction::spawn(&Handle::current(), Duration::from_millis(10), || async { false });
        assert_eq!(handle.period(), MIN_AUTOCOMPACTION_INTERVAL);
        handle.stop();
    }
}
