//! The failed side of a supervision decision

use super::strategy::{Intensity, Scope, SupervisionStrategy};
use super::supervisor::Supervisor;
use crate::address::Address;
use crate::cell::Cell;
use crate::error::ActorError;
use crate::lifecycle::Recovery;
use crate::mailbox::EXCEPTIONAL;
use crate::protocol::Protocol;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A failed actor awaiting a decision
///
/// The actor stays suspended until the decision resumes, restarts or stops
/// it. Only stop requests reach it in the meantime. A handle dropped without
/// a decision, for instance because the report was dead-lettered by a stopped
/// supervisor, escalates on drop.
pub struct Supervised {
    cell: Arc<dyn Cell>,
    error: ActorError,
    protocol: Protocol,
    level: Arc<dyn Supervisor>,
    decided: AtomicBool,
}

impl Supervised {
    pub(crate) fn new(cell: Arc<dyn Cell>, error: ActorError, protocol: Protocol) -> Self {
        let level = Arc::clone(cell.environment().supervisor());
        Self::new_at(cell, error, protocol, level)
    }

    fn new_at(cell: Arc<dyn Cell>, error: ActorError, protocol: Protocol, level: Arc<dyn Supervisor>) -> Self {
        Self {
            cell,
            error,
            protocol,
            level,
            decided: AtomicBool::new(false),
        }
    }

    fn decide(&self) {
        self.decided.store(true, Ordering::SeqCst);
    }

    pub fn address(&self) -> &Address {
        self.cell.address()
    }

    /// What the actor failed with
    pub fn error(&self) -> &ActorError {
        &self.error
    }

    /// Protocol of the message or hook that failed
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Supervisor currently deciding
    pub fn supervisor(&self) -> &Arc<dyn Supervisor> {
        &self.level
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.environment().is_stopped()
    }

    /// Let the supervisor's own supervisor decide
    pub fn escalate(self) {
        self.escalate_from_level();
    }

    fn escalate_from_level(&self) {
        self.decide();
        match self.level.supervisor() {
            Some(next) => {
                debug!(address = %self.address(), error = %self.error, "Escalating failure");
                let escalated = Supervised::new_at(
                    Arc::clone(&self.cell),
                    self.error.clone(),
                    self.protocol,
                    Arc::clone(&next),
                );
                next.inform(escalated);
            }
            None => {
                warn!(address = %self.address(), error = %self.error, "Escalation reached the top, stopping");
                self.stop(Scope::One);
            }
        }
    }

    /// Restart unless the failure count exceeds `intensity` within `period`
    ///
    /// Exceeding it stops the actors in `scope` instead.
    pub fn restart_within(&self, period: Duration, intensity: Intensity, scope: Scope) {
        self.decide();
        let excessive = self
            .cell
            .environment()
            .failure_mark()
            .lock()
            .failed_with_excessive_failures(period, intensity);

        if excessive {
            debug!(
                address = %self.address(),
                intensity = %intensity,
                period_ms = period.as_millis() as u64,
                "Failure threshold reached"
            );
            self.stop(scope);
            return;
        }

        let failed = self.address().clone();
        for target in self.targets(scope) {
            let is_failed = *target.address() == failed;
            target.recover(Recovery::Restart, self.error.clone(), is_failed);
        }
    }

    pub fn restart_with(&self, strategy: &SupervisionStrategy) {
        self.restart_within(strategy.period, strategy.intensity, strategy.scope);
    }

    /// Continue as if the failure never happened
    pub fn resume(&self) {
        self.decide();
        self.cell.recover(Recovery::Resume, self.error.clone(), true);
    }

    pub fn stop(&self, scope: Scope) {
        self.decide();
        for target in self.targets(scope) {
            target.stop();
        }
    }

    /// Hold the actor's mailbox; only stop requests pass
    pub fn suspend(&self) {
        self.cell
            .environment()
            .mailbox()
            .suspend_except_for(EXCEPTIONAL, &[Protocol::stoppable()]);
    }

    /// Actors a decision applies to; siblings are read from the parent now
    fn targets(&self, scope: Scope) -> Vec<Arc<dyn Cell>> {
        match scope {
            Scope::One => vec![Arc::clone(&self.cell)],
            Scope::All => {
                let mut targets = self
                    .cell
                    .environment()
                    .parent()
                    .map(|parent| parent.environment().children())
                    .unwrap_or_default();
                if !targets.iter().any(|target| target.address() == self.address()) {
                    targets.push(Arc::clone(&self.cell));
                }
                targets
            }
        }
    }
}

impl Drop for Supervised {
    fn drop(&mut self) {
        if self.decided.load(Ordering::SeqCst) || self.is_stopped() {
            return;
        }
        warn!(
            address = %self.address(),
            error = %self.error,
            "Failure report dropped without a decision, escalating"
        );
        self.escalate_from_level();
    }
}

impl fmt::Debug for Supervised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervised")
            .field("address", self.address())
            .field("error", &self.error)
            .field("protocol", &self.protocol)
            .finish()
    }
}
