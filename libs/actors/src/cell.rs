//! Actor cells
//!
//! A cell owns one actor's state together with its environment. The state
//! sits behind a mutex that only delivery turns, resuming deliveries and
//! lifecycle tasks take, so handlers run one at a time and never on the
//! caller's thread. The untyped [`Cell`] view is what the directory, the
//! family tree and supervision hold on to.

use crate::actor::{Actor, Context};
use crate::address::Address;
use crate::environment::Environment;
use crate::error::{ActorError, ActorResult};
use crate::lifecycle::{Hooks, Recovery};
use crate::message::{Consumer, DeliveryPath, LocalMessage, Message};
use crate::protocol::Protocol;
use crate::supervision::Supervised;
use parking_lot::Mutex;
use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::error;

/// Type-erased view of an actor cell
pub(crate) trait Cell: Send + Sync + 'static {
    fn environment(&self) -> &Environment;

    fn address(&self) -> &Address {
        self.environment().address()
    }

    /// Stop the actor and its children; idempotent
    fn stop(&self);

    /// Schedule a recovery of the actor after a supervised failure
    fn recover(&self, recovery: Recovery, reason: ActorError, resume_mailbox: bool);

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct ActorCell<A: Actor> {
    state: Mutex<A>,
    environment: Environment,
    hooks: Hooks<A>,
    this: Weak<Self>,
}

impl<A: Actor> ActorCell<A> {
    pub(crate) fn new(actor: A, environment: Environment) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(actor),
            environment,
            hooks: A::hooks(),
            this: this.clone(),
        })
    }

    pub(crate) fn environment(&self) -> &Environment {
        &self.environment
    }

    pub(crate) fn hooks(&self) -> &Hooks<A> {
        &self.hooks
    }

    /// Read the actor state outside of a delivery
    pub(crate) fn with_state<R>(&self, read: impl FnOnce(&A) -> R) -> R {
        read(&self.state.lock())
    }

    pub(crate) fn strong(&self) -> Option<Arc<Self>> {
        self.this.upgrade()
    }

    /// Wrap a consumer into a message and hand it to the mailbox
    pub(crate) fn send(&self, protocol: Protocol, representation: Cow<'static, str>, consumer: Consumer<A>) {
        if let Some(cell) = self.strong() {
            let message = LocalMessage::new(cell, protocol, representation, consumer);
            self.environment.mailbox().send(Box::new(message));
        }
    }

    /// Route a message taken off the mailbox
    pub(crate) fn deliver(self: &Arc<Self>, message: LocalMessage<A>, path: DeliveryPath) {
        let environment = &self.environment;
        let stage = environment.stage();

        if environment.is_stopped() {
            stage.dead_letters().failed_delivery(message.to_dead_letter());
            return;
        }

        if path == DeliveryPath::Normal {
            if environment.mailbox().is_suspended() {
                environment.mailbox().stow_suspended(Box::new(message));
                return;
            }
            if environment.is_stowing() && !environment.stowage().is_override(message.protocol()) {
                environment.stowage().stow(Box::new(message.into_stowed()));
                stage.metrics().record_stowed();
                return;
            }
        }

        let (consumer, protocol, stowed) = message.into_consumer();
        let started = Instant::now();
        self.invoke(protocol, consumer);
        environment.touch();
        stage.metrics().record_message_delivered(started.elapsed());

        if stowed {
            self.dispersed_one();
        }
    }

    /// Run `consumer` against the actor state and supervise any failure
    ///
    /// Returns false if the consumer failed or panicked. The failure is
    /// reported to supervision after the state lock is released.
    pub(crate) fn invoke<F>(self: &Arc<Self>, protocol: Protocol, consumer: F) -> bool
    where
        F: FnOnce(&mut A, &Context<A>) -> ActorResult,
    {
        let context = Context::new(Arc::clone(self));
        let outcome = {
            let mut state = self.state.lock();
            panic::catch_unwind(AssertUnwindSafe(|| consumer(&mut *state, &context)))
        };

        let error = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(error)) => error,
            Err(payload) => ActorError::panicked(payload.as_ref()),
        };

        error!(
            address = %self.environment.address(),
            protocol = %protocol,
            category = error.category(),
            error = %error,
            "Actor failed"
        );

        let cell: Arc<dyn Cell> = Arc::clone(self) as Arc<dyn Cell>;
        self.environment
            .stage()
            .handle_failure_of(Supervised::new(cell, error, protocol));
        false
    }
}

impl<A: Actor> Cell for ActorCell<A> {
    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn stop(&self) {
        ActorCell::stop(self);
    }

    fn recover(&self, recovery: Recovery, reason: ActorError, resume_mailbox: bool) {
        self.schedule_recovery(recovery, reason, resume_mailbox);
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
