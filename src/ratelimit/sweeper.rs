//! Background cleanup of expired rate limit entries.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::duration_millis;
use super::limiter::RateLimiter;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a running sweep task.
///
/// Call [`Sweeper::stop`] for an orderly shutdown. Dropping the handle
/// aborts the task.
pub struct Sweeper {
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a task that sweeps `limiter` every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        info!(interval_ms = duration_millis(interval), "Starting rate limit sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        limiter.cleanup();
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Rate limit sweeper received shutdown");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Some(task),
        }
    }

    /// Ask the task to exit after its current sweep, without waiting.
    pub fn signal_stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Stop the task and wait for it to finish.
    pub async fn stop(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Rate limit sweeper stopped");
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::identity::RequestContext;
    use crate::ratelimit::policy::RateLimitPolicy;

    fn populated_limiter(clock: Arc<ManualClock>) -> Arc<RateLimiter> {
        let limiter = Arc::new(RateLimiter::with_clock(clock));
        let policy = RateLimitPolicy::new(Duration::from_millis(1000), 3);
        for ip in ["192.0.2.1", "192.0.2.2", "192.0.2.3"] {
            limiter.check(&RequestContext::new().with_real_ip(ip), &policy);
        }
        limiter
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = populated_limiter(clock.clone());
        let sweeper = limiter.start_sweeper(Duration::from_millis(10));

        // Nothing has expired yet
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.tracked_identities(), 3);

        clock.advance(Duration::from_millis(1001));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.tracked_identities(), 0);

        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = populated_limiter(clock);
        let sweeper = limiter.start_sweeper(Duration::from_secs(60));
        assert!(sweeper.is_running());

        sweeper.signal_stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sweeper.is_running());
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = populated_limiter(clock.clone());
        let sweeper = limiter.start_sweeper(Duration::from_millis(10));
        drop(sweeper);

        clock.advance(Duration::from_millis(1001));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.tracked_identities(), 3);
        // The task released its handle on the limiter
        assert_eq!(Arc::strong_count(&limiter), 1);
    }
}
