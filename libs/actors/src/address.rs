//! Actor Addresses
//!
//! Every actor is identified by an [`Address`]. Addresses are allocated by the
//! stage's [`AddressFactory`]: ordinary actors draw from a monotonically
//! increasing low range, while a small high range is reserved for the
//! well-known actors every stage owns.

use crate::error::{ActorError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Id of the private root actor
pub const PRIVATE_ROOT_ID: u64 = u64::MAX;

/// Id of the public root actor
pub const PUBLIC_ROOT_ID: u64 = u64::MAX - 1;

/// Id of the dead letters collaborator
pub const DEAD_LETTERS_ID: u64 = u64::MAX - 2;

/// Every id at or above this value is reserved
pub const RESERVED_FLOOR: u64 = u64::MAX - 16;

/// Immutable actor identity, compared and hashed by id only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    id: u64,
    name: Option<String>,
    distributable: bool,
}

impl Address {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_distributable(&self) -> bool {
        self.distributable
    }

    /// Check whether the id lies in the reserved high range
    pub fn is_reserved(&self) -> bool {
        self.id >= RESERVED_FLOOR
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Allocates addresses for one stage
#[derive(Debug)]
pub struct AddressFactory {
    next_id: AtomicU64,
}

impl AddressFactory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an anonymous address
    pub fn unique(&self) -> Address {
        self.allocate(None, false)
    }

    /// Allocate a named address
    pub fn unique_with(&self, name: impl Into<String>) -> Address {
        self.allocate(Some(name.into()), false)
    }

    /// Allocate a named address that may be referenced outside this process
    pub fn unique_distributable(&self, name: impl Into<String>) -> Address {
        self.allocate(Some(name.into()), true)
    }

    /// Wrap a caller supplied id from the low range
    ///
    /// Later allocations skip past `id` so the factory never hands it out again.
    pub fn from_existing(&self, id: u64, name: Option<&str>) -> Result<Address> {
        if id >= RESERVED_FLOOR {
            return Err(ActorError::reserved(id));
        }
        if id == 0 {
            return Err(ActorError::configuration(
                "address id 0 is not a valid actor id",
                Some("id"),
            ));
        }
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        Ok(Address {
            id,
            name: name.map(str::to_string),
            distributable: false,
        })
    }

    /// Build one of the well-known reserved addresses
    pub fn reserved(&self, id: u64, name: &str) -> Result<Address> {
        if id < RESERVED_FLOOR {
            return Err(ActorError::configuration(
                format!("address id {} is outside the reserved range", id),
                Some("id"),
            ));
        }
        Ok(Address {
            id,
            name: Some(name.to_string()),
            distributable: false,
        })
    }

    /// Peek at the id the next allocation will receive
    pub fn test_next_id_value(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    fn allocate(&self, name: Option<String>, distributable: bool) -> Address {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug_assert!(id < RESERVED_FLOOR, "low address range exhausted");
        Address {
            id,
            name,
            distributable,
        }
    }
}

impl Default for AddressFactory {
    fn default() -> Self {
        Self::new()
    }
}
