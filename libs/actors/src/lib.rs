//! Actor Runtime
//!
//! In-process actor runtime: actors are plain state driven by messages that
//! a fixed worker pool delivers one at a time per actor. Failures are
//! contained by supervision; actors can defer intake by stowing messages
//! and by suspending their mailbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Stage                                                        │
//! │                                                              │
//! │  ActorRef ──tell/ask──▶ Mailbox ──turn──▶ Dispatcher workers │
//! │                           │                    │             │
//! │                 suspended │ stowage            ▼             │
//! │                           └──────────▶ ActorCell (state)     │
//! │                                            │ failure         │
//! │                                            ▼                 │
//! │                                   Supervisor decision        │
//! │                          resume / restart / stop / escalate  │
//! │                                                              │
//! │  Directory · AddressFactory · DeadLetters · Scheduler        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one thread delivers to an actor at any time
//! - Messages from one sender to one actor arrive in send order
//! - An undeliverable message always reaches dead letters
//! - Handler failures and panics never escape to the worker thread
//!
//! # Examples
//!
//! ```rust
//! use stage_actors::{Actor, Definition, Stage};
//! use std::time::Duration;
//!
//! struct Counter {
//!     count: u64,
//! }
//!
//! impl Actor for Counter {}
//!
//! let stage = Stage::with_defaults().unwrap();
//! let counter = stage.actor_for(Definition::of(Counter { count: 0 })).unwrap();
//!
//! counter.tell("increment()", |counter, _ctx| {
//!     counter.count += 1;
//!     Ok(())
//! });
//! let count = counter
//!     .query("count()", |counter, _ctx| Ok(counter.count))
//!     .await_timeout(Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(count, 1);
//!
//! stage.terminate();
//! ```

pub mod actor;
pub mod address;
mod cell;
pub mod completes;
pub mod dead_letters;
pub mod definition;
pub mod directory;
pub mod environment;
pub mod error;
pub mod evictor;
pub mod lifecycle;
pub mod logging;
pub mod mailbox;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod scheduler;
pub mod stage;
mod stowage;
pub mod supervision;

pub use actor::{Actor, ActorRef, Context, Proxy};
pub use address::{Address, AddressFactory};
pub use completes::{completes, Completes, CompletesEventually};
pub use dead_letters::{DeadLetter, DeadLetters, DeadLettersListener};
pub use definition::Definition;
pub use directory::Directory;
pub use environment::Environment;
pub use error::{ActorError, ActorResult, Result};
pub use evictor::Evictor;
pub use lifecycle::{Hooks, LifeCycleState, OnRestart, OnResume, OnStart, OnStop};
pub use logging::init_tracing;
pub use mailbox::{Dispatcher, Mailbox, MailboxKind, EXCEPTIONAL};
pub use message::{DeliveryPath, Message};
pub use metrics::{StageMetrics, StageStats};
pub use protocol::Protocol;
pub use scheduler::{Cancellable, Scheduler};
pub use stage::Stage;
pub use supervision::{
    FailureMark, Intensity, Scope, StrategySupervisor, Supervised, Supervising, SupervisionStrategy,
    Supervisor, SupervisorRef,
};

pub use stage_config::StageConfig;
