use std::sync::atomic::{AtomicU64, Ordering};

// Global counters (low overhead). These are coarse-grained and process-wide.
static SCHEDULED: AtomicU64 = AtomicU64::new(0);
static DROPPED_NO_SUBSCRIBERS: AtomicU64 = AtomicU64::new(0);
static BACKPRESSURE_STALLS: AtomicU64 = AtomicU64::new(0);
static VANISHED_ENTRIES: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static RETAINED_REPLAYED: AtomicU64 = AtomicU64::new(0);
static RETAINED_ACKS_SUPPRESSED: AtomicU64 = AtomicU64::new(0);
static RETAINED_REPLAY_TRUNCATED: AtomicU64 = AtomicU64::new(0);
static PUBLISHERS_REGISTERED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn inc_scheduled(n: u64) {
    SCHEDULED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_dropped_no_subscribers(n: u64) {
    DROPPED_NO_SUBSCRIBERS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_backpressure_stalls(n: u64) {
    BACKPRESSURE_STALLS.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_vanished_entries(n: u64) {
    VANISHED_ENTRIES.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_send_failures(n: u64) {
    SEND_FAILURES.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_retained_replayed(n: u64) {
    RETAINED_REPLAYED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_retained_acks_suppressed(n: u64) {
    RETAINED_ACKS_SUPPRESSED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_retained_replay_truncated(n: u64) {
    RETAINED_REPLAY_TRUNCATED.fetch_add(n, Ordering::Relaxed);
}
#[inline]
pub fn inc_publishers_registered(n: u64) {
    PUBLISHERS_REGISTERED.fetch_add(n, Ordering::Relaxed);
}

pub fn snapshot() -> String {
    // Simple text format (Prometheus-style without HELP/TYPE lines for brevity)
    format!(
        "tidemq_scheduled {}\ntidemq_dropped_no_subscribers {}\ntidemq_backpressure_stalls {}\ntidemq_vanished_entries {}\ntidemq_send_failures {}\ntidemq_retained_replayed {}\ntidemq_retained_acks_suppressed {}\ntidemq_retained_replay_truncated {}\ntidemq_publishers_registered {}\n",
        SCHEDULED.load(Ordering::Relaxed),
        DROPPED_NO_SUBSCRIBERS.load(Ordering::Relaxed),
        BACKPRESSURE_STALLS.load(Ordering::Relaxed),
        VANISHED_ENTRIES.load(Ordering::Relaxed),
        SEND_FAILURES.load(Ordering::Relaxed),
        RETAINED_REPLAYED.load(Ordering::Relaxed),
        RETAINED_ACKS_SUPPRESSED.load(Ordering::Relaxed),
        RETAINED_REPLAY_TRUNCATED.load(Ordering::Relaxed),
        PUBLISHERS_REGISTERED.load(Ordering::Relaxed),
    )
}
