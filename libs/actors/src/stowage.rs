//! Stowage
//!
//! Side buffer used while an actor defers intake. Messages are kept in
//! arrival order and handed back in one batch on dispersal.

use crate::message::Message;
use crate::protocol::Protocol;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct Stowage {
    messages: Mutex<VecDeque<Box<dyn Message>>>,
    overrides: Mutex<Vec<Protocol>>,
    dispersing: AtomicUsize,
}

impl Stowage {
    pub(crate) fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            overrides: Mutex::new(Vec::new()),
            dispersing: AtomicUsize::new(0),
        }
    }

    pub(crate) fn stow(&self, message: Box<dyn Message>) {
        self.messages.lock().push_back(message);
    }

    /// Protocols delivered immediately while stowing; stop requests always are
    pub(crate) fn set_overrides(&self, overrides: &[Protocol]) {
        let mut current = self.overrides.lock();
        current.clear();
        current.extend_from_slice(overrides);
        let stoppable = Protocol::stoppable();
        if !current.contains(&stoppable) {
            current.push(stoppable);
        }
    }

    pub(crate) fn is_override(&self, protocol: Protocol) -> bool {
        self.overrides.lock().contains(&protocol)
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Remove every stowed message, oldest first, and start counting them down
    pub(crate) fn begin_dispersal(&self) -> Vec<Box<dyn Message>> {
        let messages: Vec<_> = self.messages.lock().drain(..).collect();
        self.dispersing.store(messages.len(), Ordering::SeqCst);
        messages
    }

    /// Count one dispersed message as delivered; true when none remain
    pub(crate) fn dispersed_one(&self) -> bool {
        let previous = self
            .dispersing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        previous <= 1
    }

    #[cfg(test)]
    pub(crate) fn remaining_dispersal(&self) -> usize {
        self.dispersing.load(Ordering::SeqCst)
    }

    /// Drop all buffered state, returning the messages that were never delivered
    pub(crate) fn clear(&self) -> Vec<Box<dyn Message>> {
        self.overrides.lock().clear();
        self.dispersing.store(0, Ordering::SeqCst);
        self.messages.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[test]
    fn test_stoppable_is_always_an_override() {
        let stowage = Stowage::new();
        stowage.set_overrides(&[Protocol::of::<Slow>()]);
        assert!(stowage.is_override(Protocol::of::<Slow>()));
        assert!(stowage.is_override(Protocol::stoppable()));
        assert!(!stowage.is_override(Protocol::startable()));

        stowage.clear();
        assert!(!stowage.is_override(Protocol::of::<Slow>()));
    }

    #[test]
    fn test_dispersal_countdown() {
        let stowage = Stowage::new();
        assert!(stowage.begin_dispersal().is_empty());
        assert!(stowage.dispersed_one());

        stowage.dispersing.store(2, Ordering::SeqCst);
        assert!(!stowage.dispersed_one());
        assert_eq!(stowage.remaining_dispersal(), 1);
        assert!(stowage.dispersed_one());
        assert_eq!(stowage.remaining_dispersal(), 0);
    }
}
