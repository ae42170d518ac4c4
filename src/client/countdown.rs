use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use super::limiter::{ClientLimiter, LimitStatus};
use super::storage::KeyValueStorage;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Live limiter status for a UI control. Publishes changes each tick, so a
/// limited control flips back on its own; the ticker stops on drop.
pub struct Countdown<K> {
    limiter: Arc<ClientLimiter<K>>,
    tx: Arc<watch::Sender<LimitStatus>>,
    task: JoinHandle<()>,
}

fn publish(tx: &watch::Sender<LimitStatus>, status: LimitStatus) -> bool {
    tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    })
}

impl<K: KeyValueStorage + 'static> Countdown<K> {
    pub fn start(limiter: Arc<ClientLimiter<K>>, tick: Duration) -> Self {
        let (tx, _) = watch::channel(limiter.status());
        let tx = Arc::new(tx);

        let task = {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut ticker = interval(tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    publish(&tx, limiter.status());
                }
            })
        };

        Self { limiter, tx, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<LimitStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> LimitStatus {
        *self.tx.borrow()
    }

    // Re-evaluate now instead of waiting for the next tick
    pub fn refresh(&self) -> LimitStatus {
        let status = self.limiter.status();
        publish(&self.tx, status);
        status
    }

    pub fn record_action(&self) -> bool {
        let allowed = self.limiter.record_action();
        self.refresh();
        allowed
    }
}

impl<K> Drop for Countdown<K> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
