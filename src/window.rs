//! Sliding-window action counter.
//!
//! Both the server limiter and the client limiter count actions the same way:
//! a key maps to the timestamps of its recorded actions, and only timestamps
//! younger than the window count toward the limit. Where those timestamps
//! live is up to the [`TimestampStore`] implementation.

use std::sync::Arc;

use tracing::warn;

use crate::clock::Clock;
use crate::models::RateLimit;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode timestamps: {0}")]
    Encode(#[from] serde_json::Error),
}

// Recorded action timestamps (epoch ms) per key. Unknown keys load empty.
pub trait TimestampStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Vec<u64>, StoreError>;
    fn save(&self, key: &str, timestamps: &[u64]) -> Result<(), StoreError>;
}

impl<T: TimestampStore + ?Sized> TimestampStore for Arc<T> {
    fn load(&self, key: &str) -> Result<Vec<u64>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, timestamps: &[u64]) -> Result<(), StoreError> {
        (**self).save(key, timestamps)
    }
}

/// Keeps the timestamps still inside the window, in their original order.
///
/// Does not assume the input is sorted. A timestamp exactly `window_ms` old
/// is already out, and one later than `now` is never valid.
pub fn prune(timestamps: &[u64], now: u64, window_ms: u64) -> Vec<u64> {
    timestamps
        .iter()
        .copied()
        .filter(|&t| t <= now && now - t < window_ms)
        .collect()
}

// ms until the oldest live timestamp leaves the window
pub fn reset_in(live: &[u64], now: u64, window_ms: u64) -> u64 {
    match live.iter().min() {
        Some(&oldest) => window_ms.saturating_sub(now.saturating_sub(oldest)),
        None => 0,
    }
}

pub struct SlidingWindow<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: TimestampStore> SlidingWindow<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn live(&self, key: &str, window_ms: u64) -> Result<(Vec<u64>, u64), StoreError> {
        let now = self.clock.now_ms();
        let stored = self.store.load(key)?;
        Ok((prune(&stored, now, window_ms), now))
    }

    // Read-only: never writes the pruned list back
    pub fn try_is_limited(&self, key: &str, limit: &RateLimit) -> Result<bool, StoreError> {
        let (live, _) = self.live(key, limit.window_ms())?;
        Ok(live.len() >= limit.max_actions() as usize)
    }

    pub fn try_record(&self, key: &str, window_ms: u64) -> Result<(), StoreError> {
        let (mut live, now) = self.live(key, window_ms)?;
        live.push(now);
        self.store.save(key, &live)
    }

    pub fn try_time_until_reset(&self, key: &str, window_ms: u64) -> Result<u64, StoreError> {
        let (live, now) = self.live(key, window_ms)?;
        Ok(reset_in(&live, now, window_ms))
    }

    // Fail-open forms. A broken store never blocks an action.

    pub fn is_limited(&self, key: &str, limit: &RateLimit) -> bool {
        self.try_is_limited(key, limit).unwrap_or_else(|e| {
            warn!(key, error = %e, "rate limit check failed, allowing");
            false
        })
    }

    // true even when the store is unavailable
    pub fn record(&self, key: &str, window_ms: u64) -> bool {
        if let Err(e) = self.try_record(key, window_ms) {
            warn!(key, error = %e, "failed to persist action, allowing");
        }
        true
    }

    pub fn time_until_reset(&self, key: &str, window_ms: u64) -> u64 {
        self.try_time_until_reset(key, window_ms).unwrap_or_else(|e| {
            warn!(key, error = %e, "failed to read reset time");
            0
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use dashmap::DashMap;

    #[derive(Default)]
    pub(crate) struct MapStore(pub DashMap<String, Vec<u64>>);

    impl TimestampStore for MapStore {
        fn load(&self, key: &str) -> Result<Vec<u64>, StoreError> {
            Ok(self.0.get(key).map(|v| v.value().clone()).unwrap_or_default())
        }

        fn save(&self, key: &str, timestamps: &[u64]) -> Result<(), StoreError> {
            self.0.insert(key.to_string(), timestamps.to_vec());
            Ok(())
        }
    }

    pub(crate) struct BrokenStore;

    impl TimestampStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Vec<u64>, StoreError> {
            Err(StoreError::Unavailable("disabled".into()))
        }

        fn save(&self, _key: &str, _timestamps: &[u64]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disabled".into()))
        }
    }

    fn window(start: u64) -> (SlidingWindow<MapStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (SlidingWindow::new(MapStore::default(), clock.clone()), clock)
    }

    fn limit(max: u32, window_ms: u64) -> RateLimit {
        RateLimit::new(max, window_ms).unwrap()
    }

    #[test]
    fn prune_drops_expired_and_keeps_order() {
        assert_eq!(prune(&[5_000, 100, 9_000, 0], 10_000, 6_000), vec![5_000, 9_000]);
        assert!(prune(&[], 10_000, 1).is_empty());
    }

    #[test]
    fn prune_drops_future_timestamps() {
        assert_eq!(prune(&[10_000, 10_001, 99_999_999], 10_000, 6_000), vec![10_000]);
    }

    #[test]
    fn future_dated_action_does_not_lock_the_key() {
        let (w, clock) = window(0);
        let l = limit(1, 60_000);
        w.store().save("k", &[10 * 60_000]).unwrap();
        assert!(!w.is_limited("k", &l));
        assert_eq!(w.time_until_reset("k", 60_000), 0);

        // once the clock passes it the entry just ages out like any other
        clock.set(10 * 60_000 + 1);
        assert!(w.is_limited("k", &l));
        clock.advance(60_000);
        assert!(!w.is_limited("k", &l));
    }

    #[test]
    fn prune_boundary_is_exclusive() {
        assert_eq!(prune(&[0], 999, 1_000), vec![0]);
        assert!(prune(&[0], 1_000, 1_000).is_empty());
    }

    #[test]
    fn limit_is_inclusive_at_max_actions() {
        let (w, _) = window(0);
        let l = limit(3, 60_000);
        for _ in 0..2 {
            assert!(w.record("k", l.window_ms()));
        }
        assert!(!w.is_limited("k", &l));
        w.record("k", l.window_ms());
        assert!(w.is_limited("k", &l));
    }

    #[test]
    fn unknown_key_is_never_limited() {
        let (w, _) = window(42);
        assert!(!w.is_limited("nobody", &limit(1, 1_000)));
        assert_eq!(w.time_until_reset("nobody", 1_000), 0);
    }

    #[test]
    fn checking_does_not_touch_stored_data() {
        let (w, clock) = window(0);
        let l = limit(2, 1_000);
        w.record("k", 1_000);
        clock.advance(2_000);

        let before = w.store().load("k").unwrap();
        for _ in 0..3 {
            assert!(!w.is_limited("k", &l));
        }
        assert_eq!(w.store().load("k").unwrap(), before);
    }

    #[test]
    fn window_slides_past_old_actions() {
        let (w, clock) = window(0);
        let l = limit(2, 60_000);
        w.record("k", l.window_ms());
        w.record("k", l.window_ms());
        assert!(w.is_limited("k", &l));
        assert_eq!(w.time_until_reset("k", l.window_ms()), 60_000);

        clock.set(61_000);
        assert!(!w.is_limited("k", &l));
        assert_eq!(w.time_until_reset("k", l.window_ms()), 0);
    }

    #[test]
    fn action_exactly_window_old_no_longer_counts() {
        let (w, clock) = window(1_000);
        let l = limit(1, 500);
        w.record("k", 500);
        clock.advance(499);
        assert!(w.is_limited("k", &l));
        clock.advance(1);
        assert!(!w.is_limited("k", &l));
    }

    #[test]
    fn reset_time_tracks_oldest_live_action() {
        let (w, clock) = window(0);
        w.record("k", 10_000);
        clock.set(4_000);
        w.record("k", 10_000);
        assert_eq!(w.time_until_reset("k", 10_000), 6_000);
        clock.set(11_000);
        // the first one expired, the second is now the oldest
        assert_eq!(w.time_until_reset("k", 10_000), 3_000);
    }

    #[test]
    fn record_prunes_before_appending() {
        let (w, clock) = window(0);
        w.record("k", 1_000);
        w.record("k", 1_000);
        clock.set(5_000);
        w.record("k", 1_000);
        assert_eq!(w.store().load("k").unwrap(), vec![5_000]);
    }

    #[test]
    fn keys_are_independent() {
        let (w, _) = window(0);
        let l = limit(1, 60_000);
        w.record("key1", l.window_ms());
        assert!(w.is_limited("key1", &l));
        assert!(!w.is_limited("key2", &l));
    }

    #[test]
    fn broken_store_fails_open() {
        let w = SlidingWindow::new(BrokenStore, Arc::new(ManualClock::new(0)));
        let l = limit(1, 1_000);
        assert!(!w.is_limited("k", &l));
        assert!(w.record("k", 1_000));
        assert_eq!(w.time_until_reset("k", 1_000), 0);
        assert!(w.try_is_limited("k", &l).is_err());
    }
}
