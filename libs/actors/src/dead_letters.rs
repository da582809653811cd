//! Dead Letters
//!
//! Messages that reach a stopped actor end up here. Listeners are notified
//! in registration order; a failing listener is logged and never affects the
//! sender or the other listeners.

use crate::address::Address;
use crate::error::ActorResult;
use crate::metrics::StageMetrics;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A message that could not be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Address of the intended receiver
    pub address: Address,
    /// Diagnostic rendering of the message
    pub representation: String,
}

impl fmt::Display for DeadLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeadLetter[{} -> {}]", self.representation, self.address)
    }
}

/// Observer of undeliverable messages
pub trait DeadLettersListener: Send + Sync {
    fn handle(&self, dead_letter: &DeadLetter) -> ActorResult;
}

impl<F> DeadLettersListener for F
where
    F: Fn(&DeadLetter) + Send + Sync,
{
    fn handle(&self, dead_letter: &DeadLetter) -> ActorResult {
        self(dead_letter);
        Ok(())
    }
}

/// Sink for undeliverable messages
pub struct DeadLetters {
    address: Address,
    listeners: RwLock<Vec<Arc<dyn DeadLettersListener>>>,
    metrics: Arc<StageMetrics>,
}

impl DeadLetters {
    pub fn new(address: Address, metrics: Arc<StageMetrics>) -> Self {
        Self {
            address,
            listeners: RwLock::new(Vec::new()),
            metrics,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn register_listener(&self, listener: Arc<dyn DeadLettersListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Record an undeliverable message and notify every listener
    pub fn failed_delivery(&self, dead_letter: DeadLetter) {
        self.metrics.record_dead_letter();
        debug!(
            address = %dead_letter.address,
            representation = %dead_letter.representation,
            "Dead letter"
        );

        // Listeners may register more listeners, so notify from a snapshot
        let listeners = self.listeners.read().clone();
        for (index, listener) in listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener.handle(&dead_letter))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    listener = index,
                    error = %e,
                    "Dead letters listener failed"
                ),
                Err(_) => warn!(listener = index, "Dead letters listener panicked"),
            }
        }
    }
}

impl fmt::Debug for DeadLetters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadLetters")
            .field("address", &self.address)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
