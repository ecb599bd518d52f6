//! Per-tenant fixed-window rate limiting.
//!
//! Counters reset on wall-clock minute boundaries (UTC). Simple and
//! predictable; bursts across a boundary are accepted as a trade-off
//! for O(1) bookkeeping under a single lock.

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

struct Bucket {
    window_start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window requests-per-minute limiter.
///
/// The bucket map grows with the number of configured tenants and is
/// never evicted.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one request from the tenant's current minute bucket.
    ///
    /// `rpm == 0` means unlimited and touches no state. The caller
    /// supplies `now` so the window is testable.
    pub fn allow(&self, tenant: &str, rpm: u32, now: DateTime<Utc>) -> bool {
        if rpm == 0 {
            return true;
        }
        let window = minute_floor(now);

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(tenant.to_owned()).or_insert(Bucket {
            window_start: window,
            count: 0,
        });
        // Strictly-older window: the newer minute wins at the boundary.
        if bucket.window_start < window {
            bucket.window_start = window;
            bucket.count = 0;
        }
        if bucket.count >= rpm {
            return false;
        }
        bucket.count += 1;
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn minute_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(t.hour(), t.minute(), 0)
        .unwrap()
        .and_utc()
}
