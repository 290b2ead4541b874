//! Sync metrics
//!
//! Counts what crossed the session channel. Counters are exported through the
//! `metrics` facade and mirrored in-process for the `/status` command.

use metrics::increment_counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    received: AtomicU64,
    malformed: AtomicU64,
    publish_failures: AtomicU64,
}

/// Shared counters for one terminal
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatsSnapshot {
    pub events_published: u64,
    pub events_received: u64,
    pub events_malformed: u64,
    pub publish_failures: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        increment_counter!("consultsync_events_published_total");
    }

    pub fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
        increment_counter!("consultsync_events_received_total");
    }

    /// Unrecognized type or a data shape that did not decode
    pub fn record_malformed(&self) {
        self.inner.malformed.fetch_add(1, Ordering::Relaxed);
        increment_counter!("consultsync_events_malformed_total");
    }

    pub fn record_publish_failure(&self) {
        self.inner.publish_failures.fetch_add(1, Ordering::Relaxed);
        increment_counter!("consultsync_publish_failures_total");
    }

    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            events_published: self.inner.published.load(Ordering::Relaxed),
            events_received: self.inner.received.load(Ordering::Relaxed),
            events_malformed: self.inner.malformed.load(Ordering::Relaxed),
            publish_failures: self.inner.publish_failures.load(Ordering::Relaxed),
        }
    }
}
