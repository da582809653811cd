//! Actors, contexts and references
//!
//! An [`Actor`] is plain state. The stage wraps it in a cell that owns its
//! environment and mailbox; everything outside the actor talks to it through
//! an [`ActorRef`] (or a [`Proxy`] built from one), which turns calls into
//! queued messages. Handlers receive the actor state together with a
//! [`Context`] for everything that concerns the actor's place in the stage.

use crate::address::Address;
use crate::cell::{ActorCell, Cell};
use crate::completes::{completes, Completes, CompletesEventually};
use crate::definition::Definition;
use crate::environment::Environment;
use crate::error::{ActorResult, Result};
use crate::lifecycle::Hooks;
use crate::protocol::Protocol;
use crate::stage::Stage;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// User extension point
pub trait Actor: Send + Sized + 'static {
    /// Lifecycle hooks this actor implements
    ///
    /// Built once when the actor is registered. Override to enable the hooks
    /// of the capability traits the type implements:
    ///
    /// ```ignore
    /// fn hooks() -> Hooks<Self> {
    ///     Hooks::new().on_start().on_restart()
    /// }
    /// ```
    fn hooks() -> Hooks<Self> {
        Hooks::new()
    }
}

/// Protocol object bound to an actor reference
///
/// Implementations expose protocol methods that enqueue messages through
/// [`ActorRef::tell`] and [`ActorRef::ask`].
pub trait Proxy<A: Actor>: Clone + Send + Sync + 'static {
    fn bind(actor: ActorRef<A>) -> Self;
}

/// Handle to an actor that enqueues calls as messages
pub struct ActorRef<A: Actor> {
    cell: Arc<ActorCell<A>>,
    protocol: Protocol,
}

impl<A: Actor> ActorRef<A> {
    pub(crate) fn new(cell: Arc<ActorCell<A>>) -> Self {
        Self {
            cell,
            protocol: Protocol::of::<A>(),
        }
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell<A>> {
        &self.cell
    }

    pub(crate) fn as_cell(&self) -> Arc<dyn Cell> {
        self.cell.clone()
    }

    pub fn address(&self) -> &Address {
        self.cell.environment().address()
    }

    /// Protocol attached to messages sent through this reference
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.environment().is_stopped()
    }

    /// Enqueue a fire-and-forget call
    pub fn tell<F>(&self, representation: impl Into<Cow<'static, str>>, consumer: F)
    where
        F: FnOnce(&mut A, &Context<A>) -> ActorResult + Send + 'static,
    {
        self.cell
            .send(self.protocol, representation.into(), Box::new(consumer));
    }

    /// Enqueue a call whose handler completes a result channel
    ///
    /// The handler may complete the channel later, for instance after
    /// dispersing stowed messages. If the message is dead-lettered the
    /// returned [`Completes`] resolves to `ActorError::Abandoned`.
    pub fn ask<T, F>(&self, representation: impl Into<Cow<'static, str>>, consumer: F) -> Completes<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut A, &Context<A>, CompletesEventually<T>) -> ActorResult + Send + 'static,
    {
        let (eventually, completes) = completes();
        self.tell(representation, move |actor, ctx| consumer(actor, ctx, eventually));
        completes
    }

    /// Enqueue a call whose return value completes the result channel
    ///
    /// An error is both reported to the caller and handed to supervision.
    pub fn query<T, F>(&self, representation: impl Into<Cow<'static, str>>, consumer: F) -> Completes<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut A, &Context<A>) -> Result<T> + Send + 'static,
    {
        self.ask(representation, move |actor, ctx, eventually| match consumer(actor, ctx) {
            Ok(value) => {
                eventually.with(value);
                Ok(())
            }
            Err(error) => {
                eventually.fail(error.clone());
                Err(error)
            }
        })
    }

    /// Ask the actor to stop
    ///
    /// Delivered even while the actor is suspended or stowing. Secured actors
    /// ignore the request.
    pub fn stop(&self) {
        self.cell.send(
            Protocol::stoppable(),
            Cow::Borrowed("stop()"),
            Box::new(|_actor: &mut A, ctx: &Context<A>| {
                if ctx.environment().is_secured() {
                    debug!(address = %ctx.address(), "Stop request ignored by secured actor");
                } else {
                    ctx.stop();
                }
                Ok(())
            }),
        );
    }

    /// View the actor through another protocol
    pub fn as_protocol<P: Proxy<A>>(&self) -> P {
        P::bind(self.retagged(Protocol::of::<P>()))
    }

    pub(crate) fn retagged(&self, protocol: Protocol) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            protocol,
        }
    }

    /// Enqueue a call tagged with an explicit protocol
    pub(crate) fn tell_as<F>(&self, protocol: Protocol, representation: impl Into<Cow<'static, str>>, consumer: F)
    where
        F: FnOnce(&mut A, &Context<A>) -> ActorResult + Send + 'static,
    {
        self.cell.send(protocol, representation.into(), Box::new(consumer));
    }
}

impl<A: Actor> Proxy<A> for ActorRef<A> {
    fn bind(actor: ActorRef<A>) -> Self {
        actor
    }
}

impl<A: Actor> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            protocol: self.protocol,
        }
    }
}

impl<A: Actor> PartialEq for ActorRef<A> {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl<A: Actor> Eq for ActorRef<A> {}

impl<A: Actor> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("address", self.address())
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl<A: Actor> fmt::Display for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.protocol, self.address())
    }
}

/// The actor's view of itself, available inside handlers and hooks
pub struct Context<A: Actor> {
    cell: Arc<ActorCell<A>>,
}

impl<A: Actor> Context<A> {
    pub(crate) fn new(cell: Arc<ActorCell<A>>) -> Self {
        Self { cell }
    }

    pub fn address(&self) -> &Address {
        self.cell.environment().address()
    }

    pub fn stage(&self) -> &Stage {
        self.cell.environment().stage()
    }

    pub fn environment(&self) -> &Environment {
        self.cell.environment()
    }

    pub fn parent(&self) -> Option<Address> {
        self.cell.environment().parent_address()
    }

    pub fn children(&self) -> Vec<Address> {
        self.cell.environment().child_addresses()
    }

    /// Reference to this actor for handing out to others
    pub fn self_ref(&self) -> ActorRef<A> {
        ActorRef::new(Arc::clone(&self.cell))
    }

    /// This actor viewed through protocol `P`; built once and cached
    pub fn self_as<P: Proxy<A>>(&self) -> P {
        self.cell
            .environment()
            .proxy(|| P::bind(self.self_ref().retagged(Protocol::of::<P>())))
    }

    /// Create an actor whose parent is this actor
    pub fn child_actor_for<C: Actor>(&self, definition: Definition<C>) -> Result<ActorRef<C>> {
        let parent: Arc<dyn Cell> = self.cell.clone();
        self.stage().actor_for(definition.with_parent_cell(parent))
    }

    /// Buffer incoming messages until [`Context::disperse_stowed_messages`]
    ///
    /// Messages of the `overrides` protocols keep being delivered.
    pub fn stow_messages(&self, overrides: &[Protocol]) {
        self.cell.stow_messages(overrides);
    }

    /// Replay stowed messages, oldest first, ahead of new intake
    pub fn disperse_stowed_messages(&self) {
        self.cell.disperse_stowed_messages();
    }

    /// Hold delivery except for the `overrides` protocols until `resume(name)`
    pub fn suspend_except_for(&self, name: &str, overrides: &[Protocol]) {
        self.cell.environment().mailbox().suspend_except_for(name, overrides);
    }

    /// Remove the suspension frame `name`; returns false if there was none
    pub fn resume(&self, name: &str) -> bool {
        self.cell.environment().mailbox().resume(name)
    }

    /// Stop this actor and its children
    pub fn stop(&self) {
        self.cell.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.environment().is_stopped()
    }
}
