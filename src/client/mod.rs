//! Client-side limiter: instant, offline pre-flight checks for UI actions,
//! persisted per device profile, with the server as a second gate.

mod countdown;
mod limiter;
mod remote;
mod storage;

pub use countdown::{Countdown, DEFAULT_TICK};
pub use limiter::{CONTACT_FORM_KEY, ClientLimitConfig, ClientLimiter, LimitStatus};
pub use remote::{RemoteDecision, RemoteLimiter};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, PersistedStore};
