//! Stage-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Stage-wide metrics
#[derive(Debug, Default)]
pub struct StageMetrics {
    pub actors_created: AtomicU64,
    pub actors_stopped: AtomicU64,
    pub messages_delivered: AtomicU64,
    pub total_delivery_time_ns: AtomicU64,
    pub dead_letters: AtomicU64,

    // Supervision
    pub failures: AtomicU64,
    pub restarts: AtomicU64,
    pub resumes: AtomicU64,

    // Mailbox pressure
    pub messages_stowed: AtomicU64,
    pub mailbox_overflows: AtomicU64,

    pub evictions: AtomicU64,
}

impl StageMetrics {
    pub fn record_actor_created(&self) {
        self.actors_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actor_stopped(&self) {
        self.actors_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_delivered(&self, duration: Duration) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
        self.total_delivery_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stowed(&self) {
        self.messages_stowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a send that did not fit into a bounded mailbox
    pub fn record_overflow(&self) {
        self.mailbox_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_delivery_time_ns(&self) -> f64 {
        let count = self.messages_delivered.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_delivery_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> StageStats {
        let created = self.actors_created.load(Ordering::Relaxed);
        let stopped = self.actors_stopped.load(Ordering::Relaxed);

        StageStats {
            actors_created: created,
            actors_stopped: stopped,
            actors_live: created.saturating_sub(stopped),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            avg_delivery_time_ns: self.avg_delivery_time_ns(),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            messages_stowed: self.messages_stowed.load(Ordering::Relaxed),
            mailbox_overflows: self.mailbox_overflows.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StageMetrics`]
#[derive(Debug, Clone, PartialEq)]
pub struct StageStats {
    pub actors_created: u64,
    pub actors_stopped: u64,
    pub actors_live: u64,
    pub messages_delivered: u64,
    pub avg_delivery_time_ns: f64,
    pub dead_letters: u64,
    pub failures: u64,
    pub restarts: u64,
    pub resumes: u64,
    pub messages_stowed: u64,
    pub mailbox_overflows: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = StageMetrics::default();
        assert_eq!(metrics.avg_delivery_time_ns(), 0.0);

        metrics.record_actor_created();
        metrics.record_actor_created();
        metrics.record_actor_stopped();
        metrics.record_message_delivered(Duration::from_nanos(100));
        metrics.record_message_delivered(Duration::from_nanos(300));
        metrics.record_failure();
        metrics.record_restart();

        let stats = metrics.snapshot();
        assert_eq!(stats.actors_live, 1);
        assert_eq!(stats.messages_delivered, 2);
        assert_eq!(stats.avg_delivery_time_ns, 200.0);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.dead_letters, 0);
    }
}
