//! Actor definitions
//!
//! Everything the stage needs to create an actor: how to build it and where
//! it sits in the stage (name, parent, supervisor, mailbox).

use crate::actor::{Actor, ActorRef};
use crate::cell::Cell;
use crate::environment::Environment;
use crate::error::Result;
use crate::supervision::Supervisor;
use std::fmt;
use std::sync::Arc;

pub(crate) type Factory<A> = Box<dyn FnOnce(&Environment) -> Result<A> + Send>;

pub struct Definition<A: Actor> {
    pub(crate) factory: Factory<A>,
    pub(crate) name: Option<String>,
    pub(crate) parent: Option<Arc<dyn Cell>>,
    pub(crate) supervisor: Option<Arc<dyn Supervisor>>,
    pub(crate) mailbox: Option<String>,
    pub(crate) evictable: bool,
    pub(crate) secured: bool,
}

impl<A: Actor> Definition<A> {
    /// Build the actor from its environment
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce(&Environment) -> A + Send + 'static,
    {
        Self::try_new(move |environment| Ok(factory(environment)))
    }

    /// Build the actor from its environment; an error aborts creation
    pub fn try_new<F>(factory: F) -> Self
    where
        F: FnOnce(&Environment) -> Result<A> + Send + 'static,
    {
        Self {
            factory: Box::new(factory),
            name: None,
            parent: None,
            supervisor: None,
            mailbox: None,
            evictable: true,
            secured: false,
        }
    }

    /// Use an already built actor
    pub fn of(actor: A) -> Self {
        Self::new(move |_| actor)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn supervised_by(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Mailbox name resolved against the stage configuration
    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    pub fn evictable(mut self, evictable: bool) -> Self {
        self.evictable = evictable;
        self
    }

    pub fn with_parent<P: Actor>(self, parent: &ActorRef<P>) -> Self {
        self.with_parent_cell(parent.as_cell())
    }

    pub(crate) fn with_parent_cell(mut self, parent: Arc<dyn Cell>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Stage-owned actors ignore stop requests and are never evicted
    pub(crate) fn secured(mut self) -> Self {
        self.secured = true;
        self.evictable = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in logs and the environment
    pub(crate) fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => short_type_name::<A>().to_string(),
        }
    }
}

fn short_type_name<A>() -> &'static str {
    let full = std::any::type_name::<A>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<A: Actor> fmt::Debug for Definition<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("actor", &std::any::type_name::<A>())
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|parent| parent.address().clone()))
            .field("mailbox", &self.mailbox)
            .field("evictable", &self.evictable)
            .field("secured", &self.secured)
            .finish()
    }
}
