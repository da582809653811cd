//! Actor Directory
//!
//! Address-keyed lookup of every live actor in a stage. Sharded so that
//! concurrent registration and lookup from many threads stays cheap.

use crate::address::Address;
use crate::cell::Cell;
use crate::error::{ActorError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub struct Directory {
    actors: DashMap<Address, Arc<dyn Cell>>,
    capacity: usize,
}

impl Directory {
    /// `buckets` is rounded up to a power of two as the shard count
    pub fn new(buckets: usize, capacity: usize) -> Self {
        let shards = buckets.next_power_of_two().max(2);
        Self {
            actors: DashMap::with_capacity_and_shard_amount(0, shards),
            capacity: capacity.max(1),
        }
    }

    /// Register an actor; fails if another live actor owns the address
    pub(crate) fn register(&self, cell: Arc<dyn Cell>) -> Result<()> {
        match self.actors.entry(cell.address().clone()) {
            Entry::Occupied(occupied) => Err(ActorError::already_registered(occupied.key())),
            Entry::Vacant(vacant) => {
                vacant.insert(cell);
                Ok(())
            }
        }
    }

    pub(crate) fn remove(&self, address: &Address) -> Option<Arc<dyn Cell>> {
        self.actors.remove(address).map(|(_, cell)| cell)
    }

    pub(crate) fn get(&self, address: &Address) -> Option<Arc<dyn Cell>> {
        self.actors.get(address).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.actors.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registered actors relative to the configured capacity
    pub fn fill_ratio(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.actors.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn all(&self) -> Vec<Arc<dyn Cell>> {
        self.actors.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Evictable leaf actors idle for at least `threshold`
    pub(crate) fn eviction_candidates(&self, threshold: Duration) -> Vec<Arc<dyn Cell>> {
        // Snapshot first so no shard lock is held while inspecting environments
        self.all()
            .into_iter()
            .filter(|cell| {
                let environment = cell.environment();
                environment.is_evictable()
                    && !environment.is_stopped()
                    && !environment.has_children()
                    && environment.idle_for() >= threshold
            })
            .collect()
    }
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("actors", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
