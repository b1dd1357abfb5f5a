//! Wall-clock access and tombstone retention.
//!
//! Every component that stamps `createdAt`/`updatedAt`/`deletedAt` takes a
//! [`SharedClock`] rather than reading the system time directly, so tests can
//! freeze or rewind time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// How long a tombstone is retained before it is physically purged.
pub const TOMBSTONE_RETENTION_MS: i64 = 30 * DAY_MS;

/// A source of device-local wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds.
    fn now_millis(&self) -> i64;
}

/// Clock handle shared between the store, engine and facade.
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock.
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(now),
        })
    }

    /// Set the current time. May move backwards.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `ms`.
    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Get current system time in milliseconds.
///
/// A clock set before the Unix epoch reads as zero.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// True when a tombstone deleted at `deleted_at` is past the retention window.
///
/// The boundary is exclusive: a tombstone exactly `retention_ms` old survives.
pub fn is_expired_tombstone(deleted_at: i64, now: i64, retention_ms: i64) -> bool {
    now.saturating_sub(deleted_at) > retention_ms
}
