//! Directory eviction
//!
//! Periodic sweep that stops idle actors once the directory fills past a
//! watermark. Actors with undelivered work are skipped, never dropped.

use crate::environment::Environment;
use crate::lifecycle::LifeCycleState;
use crate::stage::Stage;
use stage_config::EvictionConfig;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Evictor {
    config: EvictionConfig,
}

impl Evictor {
    pub fn new(config: EvictionConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.config.lru_threshold_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    /// One scheduled pass; evicts only above the fill watermark
    pub fn sweep(&self, stage: &Stage) -> usize {
        let fill_ratio = stage.directory().fill_ratio();
        if fill_ratio < self.config.fill_ratio_high_watermark {
            debug!(
                fill_ratio,
                watermark = self.config.fill_ratio_high_watermark,
                "Eviction sweep skipped"
            );
            return 0;
        }
        Self::evict(stage, self.threshold())
    }

    /// Stop every candidate idle for at least `threshold`
    pub fn evict(stage: &Stage, threshold: Duration) -> usize {
        let mut evicted = 0;
        for cell in stage.directory().eviction_candidates(threshold) {
            let environment = cell.environment();
            if let Some(reason) = Self::busy(environment) {
                debug!(
                    address = %environment.address(),
                    reason,
                    pending = environment.pending_messages(),
                    stowed = environment.stowed_messages(),
                    "Eviction skipped, actor has undelivered work"
                );
                continue;
            }
            cell.stop();
            stage.metrics().record_eviction();
            evicted += 1;
        }

        if evicted > 0 {
            info!(
                stage = %stage.name(),
                evicted,
                remaining = stage.directory().len(),
                "Evicted idle actors"
            );
        }
        evicted
    }

    /// Why an actor cannot be stopped without losing work, if it cannot
    fn busy(environment: &Environment) -> Option<&'static str> {
        let mailbox = environment.mailbox();
        if environment.pending_messages() > 0 {
            Some("pending messages")
        } else if mailbox.is_delivering() {
            Some("delivering")
        } else if mailbox.is_suspended() || mailbox.suspended_messages() > 0 {
            Some("suspended")
        } else if environment.stowed_messages() > 0 {
            Some("stowed messages")
        } else if matches!(
            environment.state(),
            LifeCycleState::Stowing | LifeCycleState::Dispersing
        ) {
            Some("stowing")
        } else {
            None
        }
    }
}
