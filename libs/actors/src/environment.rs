//! Actor Environment
//!
//! Per-actor runtime state owned by the actor's cell: identity, family,
//! mailbox, supervisor, stowage, lifecycle state and the failure mark.
//! The environment is built before the actor itself, so definitions can
//! read it from their construction closure.

use crate::address::Address;
use crate::cell::Cell;
use crate::lifecycle::LifeCycleState;
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::stage::Stage;
use crate::stowage::Stowage;
use crate::supervision::{FailureMark, Supervisor};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub struct Environment {
    address: Address,
    definition: String,
    stage: Stage,
    parent: Option<Weak<dyn Cell>>,
    children: Mutex<Vec<Arc<dyn Cell>>>,
    mailbox: Arc<Mailbox>,
    supervisor: Arc<dyn Supervisor>,
    stowage: Stowage,
    state: AtomicU8,
    secured: AtomicBool,
    evictable: bool,
    failure_mark: Mutex<FailureMark>,
    proxies: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    created: Instant,
    last_active_ms: AtomicU64,
}

impl Environment {
    pub(crate) fn new(
        address: Address,
        definition: String,
        stage: Stage,
        mailbox: Arc<Mailbox>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        Self {
            address,
            definition,
            stage,
            parent: None,
            children: Mutex::new(Vec::new()),
            mailbox,
            supervisor,
            stowage: Stowage::new(),
            state: AtomicU8::new(LifeCycleState::Created as u8),
            secured: AtomicBool::new(false),
            evictable: true,
            failure_mark: Mutex::new(FailureMark::default()),
            proxies: Mutex::new(HashMap::new()),
            created: Instant::now(),
            last_active_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn with_parent(mut self, parent: Option<Weak<dyn Cell>>) -> Self {
        self.parent = parent;
        self
    }

    pub(crate) fn with_evictable(mut self, evictable: bool) -> Self {
        self.evictable = evictable;
        self
    }

    pub(crate) fn with_secured(self, secured: bool) -> Self {
        self.secured.store(secured, Ordering::SeqCst);
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Name of the definition the actor was created from
    pub fn definition_name(&self) -> &str {
        &self.definition
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn parent_address(&self) -> Option<Address> {
        self.parent().map(|parent| parent.address().clone())
    }

    pub fn child_addresses(&self) -> Vec<Address> {
        self.children
            .lock()
            .iter()
            .map(|child| child.address().clone())
            .collect()
    }

    /// Supervisor informed when this actor fails
    pub fn supervisor(&self) -> &Arc<dyn Supervisor> {
        &self.supervisor
    }

    pub fn state(&self) -> LifeCycleState {
        LifeCycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == LifeCycleState::Stopped
    }

    pub fn is_stowing(&self) -> bool {
        self.state() == LifeCycleState::Stowing
    }

    pub fn is_dispersing(&self) -> bool {
        self.state() == LifeCycleState::Dispersing
    }

    pub fn is_suspended(&self) -> bool {
        self.mailbox.is_suspended()
    }

    /// Secured actors ignore external stop requests and are never evicted
    pub fn is_secured(&self) -> bool {
        self.secured.load(Ordering::SeqCst)
    }

    pub fn secure(&self) {
        self.secured.store(true, Ordering::SeqCst);
    }

    pub fn is_evictable(&self) -> bool {
        self.evictable && !self.is_secured()
    }

    pub fn pending_messages(&self) -> usize {
        self.mailbox.pending_messages()
    }

    pub fn stowed_messages(&self) -> usize {
        self.stowage.len()
    }

    /// Time since the last delivery (or creation)
    pub fn idle_for(&self) -> Duration {
        let active = Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(active)
    }

    pub(crate) fn touch(&self) {
        let now = self.created.elapsed().as_millis() as u64;
        self.last_active_ms.store(now, Ordering::Relaxed);
    }

    pub(crate) fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub(crate) fn stowage(&self) -> &Stowage {
        &self.stowage
    }

    pub(crate) fn failure_mark(&self) -> &Mutex<FailureMark> {
        &self.failure_mark
    }

    pub(crate) fn parent(&self) -> Option<Arc<dyn Cell>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn children(&self) -> Vec<Arc<dyn Cell>> {
        self.children.lock().clone()
    }

    pub(crate) fn has_children(&self) -> bool {
        !self.children.lock().is_empty()
    }

    pub(crate) fn add_child(&self, child: Arc<dyn Cell>) {
        self.children.lock().push(child);
    }

    pub(crate) fn remove_child(&self, address: &Address) {
        self.children.lock().retain(|child| child.address() != address);
    }

    pub(crate) fn take_children(&self) -> Vec<Arc<dyn Cell>> {
        std::mem::take(&mut *self.children.lock())
    }

    /// Move from `from` to `to`; fails if another transition won
    pub(crate) fn transition(&self, from: LifeCycleState, to: LifeCycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Enter stowing from any live state
    pub(crate) fn enter_stowing(&self) -> bool {
        let mut current = self.state();
        loop {
            if current == LifeCycleState::Stopped {
                return false;
            }
            if current == LifeCycleState::Stowing {
                return true;
            }
            match self.state.compare_exchange(
                current as u8,
                LifeCycleState::Stowing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = LifeCycleState::from_u8(actual),
            }
        }
    }

    /// Mark stopped; true only for the caller that made the change
    pub(crate) fn mark_stopped(&self) -> bool {
        self.state.swap(LifeCycleState::Stopped as u8, Ordering::SeqCst)
            != LifeCycleState::Stopped as u8
    }

    /// Cached proxy of type `P`, built by `make` on first use
    pub(crate) fn proxy<P, F>(&self, make: F) -> P
    where
        P: Clone + Send + Sync + 'static,
        F: FnOnce() -> P,
    {
        let key = TypeId::of::<P>();
        if let Some(cached) = self
            .proxies
            .lock()
            .get(&key)
            .and_then(|proxy| proxy.downcast_ref::<P>())
            .cloned()
        {
            return cached;
        }

        let built = make();
        let mut proxies = self.proxies.lock();
        let entry = proxies
            .entry(key)
            .or_insert_with(|| Arc::new(built.clone()) as Arc<dyn Any + Send + Sync>);
        entry.downcast_ref::<P>().cloned().unwrap_or(built)
    }

    pub(crate) fn clear_proxies(&self) {
        self.proxies.lock().clear();
    }

    pub(crate) fn clear_stowage(&self) -> Vec<Box<dyn Message>> {
        self.stowage.clear()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("address", &self.address)
            .field("definition", &self.definition)
            .field("state", &self.state())
            .field("secured", &self.is_secured())
            .field("mailbox", &self.mailbox)
            .finish()
    }
}
