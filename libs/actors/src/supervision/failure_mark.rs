//! Failure accounting within a rolling period

use super::strategy::Intensity;
use std::time::{Duration, Instant};

/// Failure count of one actor within the current tracking period
///
/// Only touched by the supervision decision path, which runs once per
/// failure while the actor is suspended.
#[derive(Debug, Default, Clone)]
pub struct FailureMark {
    start_of_period: Option<Instant>,
    timed_intensity: u32,
}

impl FailureMark {
    /// Record a failure; true when it exceeds `intensity` within `period`
    pub fn failed_with_excessive_failures(&mut self, period: Duration, intensity: Intensity) -> bool {
        self.failed_at(Instant::now(), period, intensity)
    }

    pub fn failed_at(&mut self, now: Instant, period: Duration, intensity: Intensity) -> bool {
        let limit = match intensity {
            Intensity::Forever => return false,
            Intensity::Limited(limit) if limit <= 1 => return true,
            Intensity::Limited(limit) => limit,
        };

        match self.start_of_period {
            None => {
                self.start_of_period = Some(now);
                self.timed_intensity = 1;
            }
            Some(start) => {
                if now.saturating_duration_since(start) > period {
                    self.reset();
                    return self.failed_at(now, period, intensity);
                }
                self.timed_intensity += 1;
            }
        }

        if self.timed_intensity > limit {
            self.reset();
            return true;
        }
        false
    }

    /// Failures counted in the open period
    pub fn failures(&self) -> u32 {
        self.timed_intensity
    }

    pub fn reset(&mut self) {
        self.start_of_period = None;
        self.timed_intensity = 0;
    }
}
