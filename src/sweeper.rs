use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::metrics::TRACKED_KEYS;
use crate::rate_limit::ServerLimiter;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodic cleanup of expired server limiter entries.
///
/// Owned by the process lifecycle: `main` creates one, starts it once and
/// stops it on shutdown. A second `start` is a no-op.
#[derive(Default)]
pub struct Sweeper {
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    // Returns false if a sweep task is already running. `started` only
    // changes while `task` is locked, so it always matches the slot.
    pub async fn start(&self, limiter: Arc<ServerLimiter>, every: Duration) -> bool {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("sweeper already running");
            return false;
        }

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick fires immediately, nothing to sweep yet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
                TRACKED_KEYS.set(limiter.active_records() as f64);
            }
        });
        *task = Some(handle);
        self.started.store(true, Ordering::Release);

        info!(interval = ?every, "rate limit sweeper started");
        true
    }

    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
            let _ = handle.await;
            info!("rate limit sweeper stopped");
        }
        self.started.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::ActionType;
    use crate::security_log::tests::RecordingSink;

    fn limiter(clock: Arc<ManualClock>) -> Arc<ServerLimiter> {
        Arc::new(ServerLimiter::new(clock, Arc::new(RecordingSink::default())))
    }

    #[tokio::test]
    async fn starts_only_once() {
        let sweeper = Sweeper::new();
        let limiter = limiter(Arc::new(ManualClock::new(0)));

        assert!(sweeper.start(limiter.clone(), Duration::from_secs(300)).await);
        assert!(!sweeper.start(limiter.clone(), Duration::from_secs(300)).await);
        assert!(sweeper.is_running());

        sweeper.stop().await;
        assert!(!sweeper.is_running());
        // can be restarted after a clean stop
        assert!(sweeper.start(limiter, Duration::from_secs(300)).await);
        sweeper.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_start_and_stop_agree_on_state() {
        let sweeper = Arc::new(Sweeper::new());
        let limiter = limiter(Arc::new(ManualClock::new(0)));

        for _ in 0..200 {
            let (a, b) = (sweeper.clone(), sweeper.clone());
            let l = limiter.clone();
            let start = tokio::spawn(async move { a.start(l, Duration::from_secs(300)).await });
            let stop = tokio::spawn(async move { b.stop().await });
            start.await.unwrap();
            stop.await.unwrap();

            let has_task = sweeper.task.lock().await.is_some();
            assert_eq!(sweeper.is_running(), has_task);
            sweeper.stop().await;
            assert!(!sweeper.is_running());
        }
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let sweeper = Sweeper::new();
        sweeper.stop().await;
        assert!(!sweeper.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_each_tick() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());
        limiter.check(ActionType::Whatsapp, "a");
        clock.advance(60_000);

        let sweeper = Sweeper::new();
        sweeper.start(limiter.clone(), Duration::from_secs(300)).await;
        assert_eq!(limiter.active_records(), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(limiter.active_records(), 0);
        sweeper.stop().await;
    }
}
