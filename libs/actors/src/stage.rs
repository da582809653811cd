//! Stage
//!
//! The root object of a running actor system. A stage owns every shared
//! collaborator (address factory, directory, dispatcher, dead letters,
//! scheduler, metrics) and the stage-owned actors: the private root, the
//! public root and the default supervisor. Nothing is process-global; two
//! stages in one process are fully independent.
//!
//! # Family tree
//!
//! ```text
//! private root ─┬─ public root ── top-level actors ── children ...
//!               ├─ default supervisor
//!               └─ common supervisors
//! ```
//!
//! Actors reference the stage and the stage references its actors, so a
//! stage must be [`terminate`](Stage::terminate)d to release them.

use crate::actor::{Actor, ActorRef};
use crate::address::{Address, AddressFactory, DEAD_LETTERS_ID, PRIVATE_ROOT_ID, PUBLIC_ROOT_ID};
use crate::cell::{ActorCell, Cell};
use crate::dead_letters::DeadLetters;
use crate::definition::Definition;
use crate::directory::Directory;
use crate::environment::Environment;
use crate::error::{ActorError, Result};
use crate::evictor::Evictor;
use crate::mailbox::{Dispatcher, Mailbox, MailboxKind};
use crate::metrics::StageMetrics;
use crate::protocol::Protocol;
use crate::scheduler::{Cancellable, Scheduler};
use crate::supervision::{
    PrivateRootActor, PublicRootActor, RootSupervisor, StrategySupervisor, Supervised, Supervising,
    SupervisionStrategy, Supervisor, SupervisorRef,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use stage_config::StageConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stage-owned actors, dropped at termination
struct Roots {
    private_root: Arc<dyn Cell>,
    public_root: Arc<dyn Cell>,
    default_supervisor: Arc<dyn Supervisor>,
    public_supervisor: Arc<dyn Supervisor>,
}

struct StageInner {
    id: Uuid,
    name: String,
    config: StageConfig,
    default_strategy: SupervisionStrategy,
    addresses: AddressFactory,
    directory: Directory,
    dispatcher: Arc<Dispatcher>,
    dead_letters: Arc<DeadLetters>,
    metrics: Arc<StageMetrics>,
    scheduler: Scheduler,
    common_supervisors: DashMap<String, Arc<dyn Supervisor>>,
    roots: RwLock<Option<Arc<Roots>>>,
    evictor: Mutex<Option<Cancellable>>,
    terminated: AtomicBool,
}

/// Handle to a running actor system; cheap to clone
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

impl Stage {
    /// Start a stage: dispatcher, stage-owned actors and the evictor
    pub fn new(config: StageConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ActorError::configuration(e.to_string(), None))?;

        let default_strategy = SupervisionStrategy::from_config(&config.supervision.default)?;
        let metrics = Arc::new(StageMetrics::default());
        let addresses = AddressFactory::new();
        let dead_letters = Arc::new(DeadLetters::new(
            addresses.reserved(DEAD_LETTERS_ID, "dead-letters")?,
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(Dispatcher::new(&config.stage.name, &config.dispatcher)?);
        let directory = Directory::new(config.stage.directory_buckets, config.stage.directory_capacity);

        let stage = Self {
            inner: Arc::new(StageInner {
                id: Uuid::new_v4(),
                name: config.stage.name.clone(),
                scheduler: Scheduler::new(&config.stage.name),
                config,
                default_strategy,
                addresses,
                directory,
                dispatcher,
                dead_letters,
                metrics,
                common_supervisors: DashMap::new(),
                roots: RwLock::new(None),
                evictor: Mutex::new(None),
                terminated: AtomicBool::new(false),
            }),
        };

        if let Err(e) = stage.start_roots().and_then(|_| stage.start_evictor()) {
            stage.terminate();
            return Err(e);
        }

        info!(
            stage = %stage.name(),
            id = %stage.id(),
            workers = stage.inner.dispatcher.size(),
            "Stage started"
        );
        Ok(stage)
    }

    /// Stage with the built-in defaults
    pub fn with_defaults() -> Result<Self> {
        Self::new(StageConfig::default())
    }

    fn start_roots(&self) -> Result<()> {
        let root_supervisor: Arc<dyn Supervisor> = Arc::new(RootSupervisor);
        let private_root = self.create(
            self.inner.addresses.reserved(PRIVATE_ROOT_ID, "private-root")?,
            Definition::of(PrivateRootActor).named("private-root").secured(),
            None,
            root_supervisor,
        )?;
        let private_supervisor: Arc<dyn Supervisor> = Arc::new(SupervisorRef::new(private_root.clone()));

        let public_root = self.create(
            self.inner.addresses.reserved(PUBLIC_ROOT_ID, "public-root")?,
            Definition::of(PublicRootActor).named("public-root").secured(),
            Some(private_root.as_cell()),
            private_supervisor,
        )?;
        let public_supervisor: Arc<dyn Supervisor> = Arc::new(SupervisorRef::new(public_root.clone()));

        let default_supervisor = self.start_strategy_supervisor(
            "default-supervisor",
            self.inner.default_strategy,
            &private_root,
            &public_supervisor,
        )?;

        for common in &self.inner.config.supervision.common {
            let strategy = SupervisionStrategy::from_config(&common.strategy())?;
            let name = common
                .name
                .clone()
                .unwrap_or_else(|| format!("common-supervisor:{}", common.protocol));
            let supervisor = self.start_strategy_supervisor(&name, strategy, &private_root, &public_supervisor)?;
            self.inner
                .common_supervisors
                .insert(common.protocol.clone(), supervisor);
        }

        *self.inner.roots.write() = Some(Arc::new(Roots {
            private_root: private_root.as_cell(),
            public_root: public_root.as_cell(),
            default_supervisor,
            public_supervisor,
        }));
        Ok(())
    }

    fn start_strategy_supervisor(
        &self,
        name: &str,
        strategy: SupervisionStrategy,
        private_root: &ActorRef<PrivateRootActor>,
        public_supervisor: &Arc<dyn Supervisor>,
    ) -> Result<Arc<dyn Supervisor>> {
        let actor = self.create(
            self.inner.addresses.unique_with(name),
            Definition::of(StrategySupervisor::new(strategy)).named(name).secured(),
            Some(private_root.as_cell()),
            Arc::clone(public_supervisor),
        )?;
        Ok(Arc::new(SupervisorRef::new(actor)))
    }

    fn start_evictor(&self) -> Result<()> {
        let config = &self.inner.config.eviction;
        if !config.enabled {
            return Ok(());
        }

        let evictor = Evictor::new(config.clone());
        let interval = evictor.interval();
        let stage: Weak<StageInner> = Arc::downgrade(&self.inner);
        let handle = self.inner.scheduler.schedule(interval, interval, move || {
            if let Some(inner) = stage.upgrade() {
                evictor.sweep(&Stage { inner });
            }
        })?;
        *self.inner.evictor.lock() = Some(handle);

        debug!(
            stage = %self.name(),
            interval_ms = config.interval_ms,
            threshold_ms = config.lru_threshold_ms,
            "Evictor started"
        );
        Ok(())
    }

    /// Create a top-level actor at a newly allocated address
    pub fn actor_for<A: Actor>(&self, definition: Definition<A>) -> Result<ActorRef<A>> {
        let address = match definition.name() {
            Some(name) => self.inner.addresses.unique_with(name),
            None => self.inner.addresses.unique(),
        };
        self.actor_for_at(address, definition)
    }

    /// Create an actor at a caller-chosen address
    ///
    /// Without an explicit parent the actor hangs under the public root.
    /// Without an explicit supervisor it gets the common supervisor of its
    /// protocol, or else the default supervisor.
    pub fn actor_for_at<A: Actor>(&self, address: Address, definition: Definition<A>) -> Result<ActorRef<A>> {
        if address.is_reserved() {
            return Err(ActorError::reserved(address.id()));
        }
        let roots = match self.roots() {
            Some(roots) => roots,
            None => return Err(ActorError::stopped(&address)),
        };

        let parent = definition
            .parent
            .clone()
            .unwrap_or_else(|| Arc::clone(&roots.public_root));
        let supervisor = definition
            .supervisor
            .clone()
            .or_else(|| self.common_supervisor(Protocol::of::<A>()))
            .unwrap_or_else(|| Arc::clone(&roots.default_supervisor));

        self.create(address, definition, Some(parent), supervisor)
    }

    /// Create a supervising actor and return it as a [`Supervisor`]
    pub fn supervisor_for<S: Supervising>(&self, definition: Definition<S>) -> Result<Arc<dyn Supervisor>> {
        let actor = self.actor_for(definition)?;
        Ok(Arc::new(SupervisorRef::new(actor)))
    }

    fn create<A: Actor>(
        &self,
        address: Address,
        definition: Definition<A>,
        parent: Option<Arc<dyn Cell>>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Result<ActorRef<A>> {
        let mailbox_name = definition
            .mailbox
            .clone()
            .unwrap_or_else(|| self.inner.config.mailbox.default.clone());
        let kind = MailboxKind::from_config(&mailbox_name, &self.inner.config.mailbox).ok_or_else(|| {
            ActorError::configuration(format!("unknown mailbox '{mailbox_name}'"), Some("mailbox"))
        })?;

        if self.inner.directory.contains(&address) {
            return Err(ActorError::already_registered(&address));
        }

        let mailbox = Mailbox::new(
            kind,
            Arc::clone(&self.inner.dispatcher),
            Arc::clone(&self.inner.dead_letters),
            Arc::clone(&self.inner.metrics),
        );
        let definition_name = definition.display_name();
        let Definition {
            factory,
            evictable,
            secured,
            ..
        } = definition;

        let environment = Environment::new(
            address.clone(),
            definition_name,
            self.clone(),
            mailbox,
            supervisor,
        )
        .with_parent(parent.as_ref().map(Arc::downgrade))
        .with_evictable(evictable)
        .with_secured(secured);

        let actor = factory(&environment)?;
        let cell = ActorCell::new(actor, environment);
        let untyped: Arc<dyn Cell> = cell.clone();
        self.inner.directory.register(Arc::clone(&untyped))?;

        if let Some(parent) = &parent {
            parent.environment().add_child(Arc::clone(&untyped));
            if parent.environment().is_stopped() {
                cell.stop();
                return Err(ActorError::stopped(parent.address()));
            }
        }

        self.inner.metrics.record_actor_created();
        let actor = ActorRef::new(Arc::clone(&cell));
        cell.start();

        debug!(
            address = %address,
            definition = %cell.environment().definition_name(),
            parent = ?parent.as_ref().map(|parent| parent.address().id()),
            mailbox = %mailbox_name,
            "Actor created"
        );
        Ok(actor)
    }

    /// Live actor of type `A` registered at `address`
    pub fn actor_of<A: Actor>(&self, address: &Address) -> Option<ActorRef<A>> {
        let cell = self.inner.directory.get(address)?;
        cell.as_any().downcast::<ActorCell<A>>().ok().map(ActorRef::new)
    }

    /// Look up the actor at `address`, creating it if it is not registered
    ///
    /// Concurrent callers race on registration; a loser retries the lookup
    /// and receives the winner's actor.
    pub fn actor_of_or_start<A, F>(&self, address: &Address, definition: F) -> Result<ActorRef<A>>
    where
        A: Actor,
        F: Fn() -> Definition<A>,
    {
        let attempts = self.inner.config.stage.registration_attempts.max(1);
        let mut last_error = ActorError::already_registered(address);

        for attempt in 1..=attempts {
            if let Some(cell) = self.inner.directory.get(address) {
                return cell
                    .as_any()
                    .downcast::<ActorCell<A>>()
                    .map(ActorRef::new)
                    .map_err(|_| {
                        ActorError::configuration(
                            format!(
                                "actor at {} is not a {}",
                                address,
                                std::any::type_name::<A>()
                            ),
                            Some("address"),
                        )
                    });
            }

            match self.actor_for_at(address.clone(), definition()) {
                Ok(actor) => return Ok(actor),
                Err(e @ ActorError::AddressAlreadyRegistered { .. }) => {
                    debug!(address = %address, attempt, "Lost registration race, retrying lookup");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Suspend a failed actor and hand it to its supervisor
    pub(crate) fn handle_failure_of(&self, supervised: Supervised) {
        if supervised.is_stopped() {
            debug!(address = %supervised.address(), "Failure of stopped actor ignored");
            return;
        }
        self.inner.metrics.record_failure();
        supervised.suspend();
        let supervisor = Arc::clone(supervised.supervisor());
        supervisor.inform(supervised);
    }

    /// Supervise every actor of `protocol` created from now on
    pub fn register_common_supervisor(&self, protocol: Protocol, supervisor: Arc<dyn Supervisor>) {
        self.inner
            .common_supervisors
            .insert(protocol.name().to_string(), supervisor);
    }

    pub fn common_supervisor(&self, protocol: Protocol) -> Option<Arc<dyn Supervisor>> {
        self.inner
            .common_supervisors
            .get(protocol.name())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Supervisor of actors that were given none
    pub fn default_supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        self.roots().map(|roots| Arc::clone(&roots.default_supervisor))
    }

    /// Supervisor of the stage-owned supervisors
    pub fn public_supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        self.roots().map(|roots| Arc::clone(&roots.public_supervisor))
    }

    fn roots(&self) -> Option<Arc<Roots>> {
        self.inner.roots.read().clone()
    }

    /// Evict idle actors now, whatever the directory fill ratio
    pub fn evict_idle(&self, threshold: Duration) -> usize {
        Evictor::evict(self, threshold)
    }

    /// Live actors, stage-owned ones included
    pub fn count(&self) -> usize {
        self.inner.directory.len()
    }

    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetters> {
        &self.inner.dead_letters
    }

    pub fn metrics(&self) -> &Arc<StageMetrics> {
        &self.inner.metrics
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn address_factory(&self) -> &AddressFactory {
        &self.inner.addresses
    }

    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn config(&self) -> &StageConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Stop every actor and shut the dispatcher down
    ///
    /// Queued after-stop hooks still run. Idempotent.
    pub fn terminate(&self) {
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(stage = %self.name(), actors = self.count(), "Terminating stage");

        if let Some(evictor) = self.inner.evictor.lock().take() {
            evictor.cancel();
        }

        let roots = self.inner.roots.write().take();
        if let Some(roots) = roots {
            roots.public_root.stop();
            roots.private_root.stop();
        }

        let stragglers = self.inner.directory.all();
        if !stragglers.is_empty() {
            warn!(stage = %self.name(), count = stragglers.len(), "Stopping actors outside the family tree");
        }
        for cell in stragglers {
            cell.stop();
        }

        self.inner.common_supervisors.clear();
        self.inner.dispatcher.close();

        info!(
            stage = %self.name(),
            stats = ?self.inner.metrics.snapshot(),
            "Stage terminated"
        );
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("actors", &self.count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
