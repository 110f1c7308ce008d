//! Rate limiting for data-plane log events.
//!
//! A misconfigured or hostile peer can trigger a denial per packet; the gate
//! lets a burst through and then one event per refill interval, counting what
//! it suppressed so the next emitted line can report it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket gate in front of a noisy log statement.
pub struct LogGate {
    bucket: Mutex<TokenBucket>,
    burst: f64,
    per_second: f64,
    suppressed: AtomicU64,
}

impl LogGate {
    /// Allow `burst` events at once, refilled at `per_second`.
    pub fn new(burst: u32, per_second: f64) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(TokenBucket::new(burst)),
            burst,
            per_second,
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns `Some(n)` when the event may be logged, `n` being the number
    /// of events suppressed since the last one that was let through.
    pub fn allow(&self) -> Option<u64> {
        let allowed = self
            .bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(self.burst, self.per_second);

        if allowed {
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

impl Default for LogGate {
    fn default() -> Self {
        Self::new(10, 1.0)
    }
}
