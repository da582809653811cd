//! Messages
//!
//! A message is a deferred, single-shot invocation bound to one actor. The
//! mailbox only sees the object-safe [`Message`] trait; [`LocalMessage`]
//! carries the typed closure and routes itself on delivery.

use crate::actor::{Actor, Context};
use crate::address::Address;
use crate::cell::ActorCell;
use crate::dead_letters::DeadLetter;
use crate::error::ActorResult;
use crate::protocol::Protocol;
use std::borrow::Cow;
use std::sync::Arc;

/// How a message reached delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Dequeued by a regular mailbox turn
    Normal,
    /// Bypassed a suspension through an override
    Resuming,
}

/// Unit of work queued in a mailbox
pub trait Message: Send {
    /// Address of the receiving actor
    fn address(&self) -> &Address;

    fn protocol(&self) -> Protocol;

    /// Diagnostic rendering, e.g. `"deposit(100)"`
    fn representation(&self) -> &str;

    /// Whether the message was buffered by stowage before delivery
    fn is_stowed(&self) -> bool;

    /// Run the message against its target
    fn deliver(self: Box<Self>, path: DeliveryPath);

    fn to_dead_letter(&self) -> DeadLetter {
        DeadLetter {
            address: self.address().clone(),
            representation: self.representation().to_string(),
        }
    }
}

/// Closure run against the actor state
pub type Consumer<A> = Box<dyn FnOnce(&mut A, &Context<A>) -> ActorResult + Send>;

/// Message addressed to an actor in this stage
pub(crate) struct LocalMessage<A: Actor> {
    cell: Arc<ActorCell<A>>,
    consumer: Consumer<A>,
    protocol: Protocol,
    representation: Cow<'static, str>,
    stowed: bool,
}

impl<A: Actor> LocalMessage<A> {
    pub(crate) fn new(
        cell: Arc<ActorCell<A>>,
        protocol: Protocol,
        representation: Cow<'static, str>,
        consumer: Consumer<A>,
    ) -> Self {
        Self {
            cell,
            consumer,
            protocol,
            representation,
            stowed: false,
        }
    }

    /// Wrap the message for stowage
    pub(crate) fn into_stowed(self) -> Self {
        Self {
            stowed: true,
            ..self
        }
    }

    pub(crate) fn into_consumer(self) -> (Consumer<A>, Protocol, bool) {
        (self.consumer, self.protocol, self.stowed)
    }
}

impl<A: Actor> Message for LocalMessage<A> {
    fn address(&self) -> &Address {
        self.cell.environment().address()
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn representation(&self) -> &str {
        &self.representation
    }

    fn is_stowed(&self) -> bool {
        self.stowed
    }

    fn deliver(self: Box<Self>, path: DeliveryPath) {
        let cell = Arc::clone(&self.cell);
        cell.deliver(*self, path);
    }
}
