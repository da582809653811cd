//! Actor LifeCycle
//!
//! Lifecycle states, the capability traits actors implement to receive
//! lifecycle hooks, and the lifecycle transitions the runtime performs on a
//! cell: start, stop, stowing and dispersal, restart and resume.
//!
//! Hooks never run on the caller's thread when they belong to another
//! actor. Start is the first message in the mailbox; stop, restart and
//! resume hooks run as dispatcher tasks under the actor's state lock.

use crate::actor::{Actor, Context};
use crate::cell::ActorCell;
use crate::error::{ActorError, ActorResult};
use crate::mailbox::EXCEPTIONAL;
use crate::protocol::Protocol;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle state held in one atomic
///
/// Suspension is not a state: it lives in the mailbox's suspension stack and
/// may overlap with any live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifeCycleState {
    /// Registered, start message not yet delivered
    Created = 0,
    Running = 1,
    /// Buffering intake into stowage
    Stowing = 2,
    /// Replaying stowed messages
    Dispersing = 3,
    /// Terminal
    Stopped = 4,
}

impl LifeCycleState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LifeCycleState::Created,
            1 => LifeCycleState::Running,
            2 => LifeCycleState::Stowing,
            3 => LifeCycleState::Dispersing,
            _ => LifeCycleState::Stopped,
        }
    }
}

/// Runs before the first message is delivered
pub trait OnStart: Actor {
    fn before_start(&mut self, ctx: &Context<Self>) -> ActorResult;
}

/// Runs once after the actor has stopped
pub trait OnStop: Actor {
    fn after_stop(&mut self, ctx: &Context<Self>) -> ActorResult;
}

/// Runs when a supervisor restarts the actor
///
/// Restart keeps the actor instance; the hooks are the place to reset state.
pub trait OnRestart: Actor {
    fn before_restart(&mut self, _ctx: &Context<Self>, _reason: &ActorError) -> ActorResult {
        Ok(())
    }

    fn after_restart(&mut self, _ctx: &Context<Self>, _reason: &ActorError) -> ActorResult {
        Ok(())
    }
}

/// Runs when a supervisor resumes the actor after a failure
pub trait OnResume: Actor {
    fn before_resume(&mut self, ctx: &Context<Self>, reason: &ActorError) -> ActorResult;
}

pub type LifeCycleHook<A> = fn(&mut A, &Context<A>) -> ActorResult;
pub type RecoveryHook<A> = fn(&mut A, &Context<A>, &ActorError) -> ActorResult;

/// Capability table of an actor type
pub struct Hooks<A: Actor> {
    before_start: Option<LifeCycleHook<A>>,
    after_stop: Option<LifeCycleHook<A>>,
    before_restart: Option<RecoveryHook<A>>,
    after_restart: Option<RecoveryHook<A>>,
    before_resume: Option<RecoveryHook<A>>,
}

impl<A: Actor> Hooks<A> {
    pub fn new() -> Self {
        Self {
            before_start: None,
            after_stop: None,
            before_restart: None,
            after_restart: None,
            before_resume: None,
        }
    }

    pub fn on_start(mut self) -> Self
    where
        A: OnStart,
    {
        self.before_start = Some(<A as OnStart>::before_start);
        self
    }

    pub fn on_stop(mut self) -> Self
    where
        A: OnStop,
    {
        self.after_stop = Some(<A as OnStop>::after_stop);
        self
    }

    pub fn on_restart(mut self) -> Self
    where
        A: OnRestart,
    {
        self.before_restart = Some(<A as OnRestart>::before_restart);
        self.after_restart = Some(<A as OnRestart>::after_restart);
        self
    }

    pub fn on_resume(mut self) -> Self
    where
        A: OnResume,
    {
        self.before_resume = Some(<A as OnResume>::before_resume);
        self
    }

    pub fn has_start(&self) -> bool {
        self.before_start.is_some()
    }

    pub fn has_stop(&self) -> bool {
        self.after_stop.is_some()
    }

    pub fn has_restart(&self) -> bool {
        self.before_restart.is_some()
    }

    pub fn has_resume(&self) -> bool {
        self.before_resume.is_some()
    }
}

impl<A: Actor> Default for Hooks<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Actor> Clone for Hooks<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Actor> Copy for Hooks<A> {}

impl<A: Actor> fmt::Debug for Hooks<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("start", &self.has_start())
            .field("stop", &self.has_stop())
            .field("restart", &self.has_restart())
            .field("resume", &self.has_resume())
            .finish()
    }
}

/// Recovery action chosen by a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    Restart,
    Resume,
}

impl<A: Actor> ActorCell<A> {
    /// Enqueue the start message; always the first message of the actor
    pub(crate) fn start(self: &Arc<Self>) {
        let before_start = self.hooks().before_start;
        self.send(
            Protocol::startable(),
            Cow::Borrowed("start()"),
            Box::new(move |actor: &mut A, ctx: &Context<A>| {
                use crate::lifecycle::LifeCycleState::{Created, Running};
                ctx.environment().transition(Created, Running);
                match before_start {
                    Some(hook) => hook(actor, ctx),
                    None => Ok(()),
                }
            }),
        );
    }

    /// Stop this actor and, depth first, its children
    ///
    /// Idempotent: only the first caller performs the teardown.
    pub(crate) fn stop(&self) {
        let environment = self.environment();
        if !environment.mark_stopped() {
            return;
        }

        let stage = environment.stage();
        for child in environment.take_children() {
            child.stop();
        }
        stage.directory().remove(environment.address());
        if let Some(parent) = environment.parent() {
            parent.environment().remove_child(environment.address());
        }

        environment.mailbox().close();
        for message in environment.clear_stowage() {
            stage.dead_letters().failed_delivery(message.to_dead_letter());
        }
        environment.clear_proxies();
        stage.metrics().record_actor_stopped();

        debug!(
            address = %environment.address(),
            definition = %environment.definition_name(),
            "Actor stopped"
        );

        if let Some(after_stop) = self.hooks().after_stop {
            if let Some(cell) = self.strong() {
                let task = Box::new(move || {
                    cell.invoke(Protocol::stoppable(), after_stop);
                });
                if let Err(e) = stage.dispatcher().execute(task) {
                    warn!(
                        address = %environment.address(),
                        error = %e,
                        "After-stop hook skipped"
                    );
                }
            }
        }
    }

    pub(crate) fn stow_messages(&self, overrides: &[Protocol]) {
        let environment = self.environment();
        if environment.enter_stowing() {
            environment.stowage().set_overrides(overrides);
            debug!(address = %environment.address(), "Stowing messages");
        }
    }

    pub(crate) fn disperse_stowed_messages(&self) {
        use crate::lifecycle::LifeCycleState::{Dispersing, Running, Stowing};

        let environment = self.environment();
        if !environment.transition(Stowing, Dispersing) {
            return;
        }

        let stowed = environment.stowage().begin_dispersal();
        debug!(
            address = %environment.address(),
            stowed = stowed.len(),
            "Dispersing stowed messages"
        );
        if stowed.is_empty() {
            environment.transition(Dispersing, Running);
            return;
        }
        // Delivered ahead of anything that arrived after stowing ended
        environment.mailbox().prepend(stowed);
        environment.mailbox().wake();
    }

    /// Count a stowed message as delivered; leaves dispersal after the last
    pub(crate) fn dispersed_one(&self) {
        use crate::lifecycle::LifeCycleState::{Dispersing, Running};

        let environment = self.environment();
        if environment.is_dispersing() && environment.stowage().dispersed_one() {
            environment.transition(Dispersing, Running);
        }
    }

    /// Queue a recovery task that runs the hooks under the state lock
    pub(crate) fn schedule_recovery(&self, recovery: Recovery, reason: ActorError, resume_mailbox: bool) {
        let cell = match self.strong() {
            Some(cell) => cell,
            None => return,
        };
        let environment = self.environment();
        let task = Box::new(move || cell.run_recovery(recovery, reason, resume_mailbox));
        if let Err(e) = environment.stage().dispatcher().execute(task) {
            warn!(
                address = %environment.address(),
                error = %e,
                "Recovery not scheduled"
            );
        }
    }

    fn run_recovery(self: &Arc<Self>, recovery: Recovery, reason: ActorError, resume_mailbox: bool) {
        let environment = self.environment();
        if environment.is_stopped() {
            return;
        }

        match recovery {
            Recovery::Restart => {
                environment.stage().metrics().record_restart();
                debug!(address = %environment.address(), reason = %reason, "Restarting actor");
                // A failing before-restart is reported but never skips after-restart
                if let Some(hook) = self.hooks().before_restart {
                    self.invoke(Protocol::recovery(), |actor: &mut A, ctx: &Context<A>| {
                        hook(actor, ctx, &reason)
                    });
                }
                if let Some(hook) = self.hooks().after_restart {
                    self.invoke(Protocol::recovery(), |actor: &mut A, ctx: &Context<A>| {
                        hook(actor, ctx, &reason)
                    });
                }
            }
            Recovery::Resume => {
                environment.stage().metrics().record_resume();
                debug!(address = %environment.address(), reason = %reason, "Resuming actor");
                if let Some(hook) = self.hooks().before_resume {
                    self.invoke(Protocol::recovery(), |actor: &mut A, ctx: &Context<A>| {
                        hook(actor, ctx, &reason)
                    });
                }
            }
        }

        if resume_mailbox {
            environment.mailbox().resume(EXCEPTIONAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Actor for Plain {}

    struct Hooked;

    impl Actor for Hooked {
        fn hooks() -> Hooks<Self> {
            Hooks::new().on_start().on_restart()
        }
    }

    impl OnStart for Hooked {
        fn before_start(&mut self, _ctx: &Context<Self>) -> ActorResult {
            Ok(())
        }
    }

    impl OnRestart for Hooked {}

    #[test]
    fn test_capability_table() {
        let plain = Plain::hooks();
        assert!(!plain.has_start() && !plain.has_stop() && !plain.has_restart());

        let hooked = Hooked::hooks();
        assert!(hooked.has_start());
        assert!(hooked.has_restart());
        assert!(!hooked.has_stop());
        assert!(!hooked.has_resume());
    }

    #[test]
    fn test_state_round_trip() {
        for state in [
            LifeCycleState::Created,
            LifeCycleState::Running,
            LifeCycleState::Stowing,
            LifeCycleState::Dispersing,
            LifeCycleState::Stopped,
        ] {
            assert_eq!(LifeCycleState::from_u8(state as u8), state);
        }
    }
}
