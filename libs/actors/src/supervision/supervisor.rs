//! Supervisors

use super::strategy::SupervisionStrategy;
use super::supervised::Supervised;
use crate::actor::{Actor, ActorRef, Context};
use crate::error::ActorResult;
use crate::protocol::Protocol;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Decides what happens to a failed actor
pub trait Supervisor: Send + Sync + 'static {
    /// Hand a failure over for a decision
    fn inform(&self, supervised: Supervised);

    fn strategy(&self) -> SupervisionStrategy;

    /// Next level up, used by escalation; `None` at the top
    fn supervisor(&self) -> Option<Arc<dyn Supervisor>>;
}

/// An actor that supervises other actors
///
/// `inform` runs as a message of the supervisor, so decisions are
/// serialized with the supervisor's other work.
pub trait Supervising: Actor {
    fn strategy(&self) -> SupervisionStrategy;

    fn inform(&mut self, ctx: &Context<Self>, supervised: Supervised) -> ActorResult;
}

/// [`Supervisor`] backed by a supervising actor
pub struct SupervisorRef<S: Supervising> {
    actor: ActorRef<S>,
    strategy: SupervisionStrategy,
    own_supervisor: Arc<dyn Supervisor>,
}

impl<S: Supervising> SupervisorRef<S> {
    /// Must not be called from the supervising actor's own handlers
    pub fn new(actor: ActorRef<S>) -> Self {
        let strategy = actor.cell().with_state(|state| state.strategy());
        let own_supervisor = Arc::clone(actor.cell().environment().supervisor());
        Self {
            actor,
            strategy,
            own_supervisor,
        }
    }

    pub fn actor(&self) -> &ActorRef<S> {
        &self.actor
    }
}

impl<S: Supervising> Supervisor for SupervisorRef<S> {
    fn inform(&self, supervised: Supervised) {
        if self.actor.is_stopped() {
            debug!(
                supervisor = %self.actor.address(),
                supervised = %supervised.address(),
                "Supervisor stopped, escalating"
            );
            supervised.escalate();
            return;
        }

        let representation = format!("inform({})", supervised.address());
        self.actor
            .tell_as(Protocol::supervision(), representation, move |actor: &mut S, ctx: &Context<S>| {
                actor.inform(ctx, supervised)
            });
    }

    fn strategy(&self) -> SupervisionStrategy {
        self.strategy
    }

    fn supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        Some(Arc::clone(&self.own_supervisor))
    }
}

impl<S: Supervising> fmt::Debug for SupervisorRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorRef")
            .field("actor", self.actor.address())
            .field("strategy", &self.strategy)
            .finish()
    }
}
