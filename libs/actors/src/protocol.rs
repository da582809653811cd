//! Protocol tags
//!
//! A [`Protocol`] names the interface a message arrived through. Mailbox
//! suspension overrides, stowage overrides and common supervisors are all
//! keyed by protocol.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a message protocol
#[derive(Clone, Copy)]
pub struct Protocol {
    id: TypeId,
    name: &'static str,
}

/// Tag of the first message every actor receives
pub struct Startable;

/// Tag of stop requests
pub struct Stoppable;

/// Tag of failure reports sent to supervisors
pub struct Supervision;

/// Tag of restart and resume hooks
pub struct Recovery;

/// Tag of dead letter notifications
pub struct DeadLetters;

impl Protocol {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn startable() -> Self {
        Self::of::<Startable>()
    }

    pub fn stoppable() -> Self {
        Self::of::<Stoppable>()
    }

    pub fn supervision() -> Self {
        Self::of::<Supervision>()
    }

    pub fn recovery() -> Self {
        Self::of::<Recovery>()
    }

    pub fn dead_letters() -> Self {
        Self::of::<DeadLetters>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Protocol {}

impl Hash for Protocol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Protocol").field(&self.name).finish()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Orders;

    #[test]
    fn test_protocol_identity() {
        assert_eq!(Protocol::of::<Orders>(), Protocol::of::<Orders>());
        assert_ne!(Protocol::of::<Orders>(), Protocol::stoppable());
        assert!(Protocol::of::<Orders>().name().ends_with("Orders"));
        assert_eq!(Protocol::startable().to_string(), type_name::<Startable>());
    }
}
