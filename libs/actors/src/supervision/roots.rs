//! Stage-owned supervisors
//!
//! Every stage starts a private root, a public root and a default
//! supervisor. The roots end escalation chains: the private root stops,
//! the public root restarts forever.

use super::strategy::SupervisionStrategy;
use super::supervised::Supervised;
use super::supervisor::{Supervising, Supervisor};
use crate::actor::{Actor, Context};
use crate::error::ActorResult;
use std::sync::Arc;
use tracing::error;

/// Supervisor of the private root; sits above every actor
pub(crate) struct RootSupervisor;

impl Supervisor for RootSupervisor {
    fn inform(&self, supervised: Supervised) {
        error!(
            address = %supervised.address(),
            error = %supervised.error(),
            "Root failure, stopping"
        );
        supervised.stop(super::Scope::One);
    }

    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::stopping()
    }

    fn supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        None
    }
}

pub(crate) struct PrivateRootActor;

impl Actor for PrivateRootActor {}

impl Supervising for PrivateRootActor {
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::stopping()
    }

    fn inform(&mut self, _ctx: &Context<Self>, supervised: Supervised) -> ActorResult {
        supervised.stop(super::Scope::One);
        Ok(())
    }
}

pub(crate) struct PublicRootActor;

impl Actor for PublicRootActor {}

impl Supervising for PublicRootActor {
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::forever()
    }

    fn inform(&mut self, _ctx: &Context<Self>, supervised: Supervised) -> ActorResult {
        supervised.restart_with(&SupervisionStrategy::forever());
        Ok(())
    }
}

/// Supervising actor that applies one fixed strategy
///
/// Backs the stage's default supervisor and the configured common
/// supervisors.
pub struct StrategySupervisor {
    strategy: SupervisionStrategy,
}

impl StrategySupervisor {
    pub fn new(strategy: SupervisionStrategy) -> Self {
        Self { strategy }
    }
}

impl Actor for StrategySupervisor {}

impl Supervising for StrategySupervisor {
    fn strategy(&self) -> SupervisionStrategy {
        self.strategy
    }

    fn inform(&mut self, _ctx: &Context<Self>, supervised: Supervised) -> ActorResult {
        supervised.restart_with(&self.strategy);
        Ok(())
    }
}
