//! Supervision
//!
//! A failing handler suspends its actor and informs the actor's supervisor,
//! which answers with one decision: resume, restart within an intensity and
//! period, stop, or escalate to the next level. Restart keeps the actor
//! instance; it runs the restart hooks and lifts the suspension.

mod failure_mark;
mod roots;
mod strategy;
mod supervised;
mod supervisor;

pub use failure_mark::FailureMark;
pub(crate) use roots::{PrivateRootActor, PublicRootActor, RootSupervisor};
pub use roots::StrategySupervisor;
pub use strategy::{Intensity, Scope, SupervisionStrategy};
pub use supervised::Supervised;
pub use supervisor::{Supervising, Supervisor, SupervisorRef};
