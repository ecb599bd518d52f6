//! Bounded in-memory audit log.
//!
//! Every request that reached the policy stage with a known principal
//! leaves exactly one immutable record here, success or not. The buffer
//! keeps only the most recent events; nothing is written to disk.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Capacity used when the configured maximum is non-positive.
const DEFAULT_MAX_EVENTS: usize = 1000;

/// Listing limit bounds.
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// One admission decision, recorded after the terminal outcome.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub tenant: String,
    pub model: String,
    pub status: String,
    pub deny_reason: Option<String>,
    pub redacted_input: String,
    pub cost_usd: f64,
    pub latency_ms: i64,
}

/// FIFO event buffer with a fixed capacity.
pub struct AuditStore {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl AuditStore {
    pub fn new(max_events: i64) -> Self {
        let max_events = if max_events <= 0 {
            DEFAULT_MAX_EVENTS
        } else {
            max_events as usize
        };
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Append an event, dropping the oldest entries beyond capacity.
    pub fn add(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Up to `limit` events, newest first, filtered by tenant when the
    /// tenant is non-empty. `limit` is clamped to `[1, 500]`; values
    /// ≤ 0 mean the default of 50.
    pub fn list(&self, tenant: &str, limit: i64) -> Vec<AuditEvent> {
        let limit = if limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            (limit as usize).min(MAX_LIST_LIMIT)
        };

        self.events
            .lock()
            .iter()
            .rev()
            .filter(|ev| tenant.is_empty() || ev.tenant == tenant)
            .take(limit)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.lock().len()
    }
}
