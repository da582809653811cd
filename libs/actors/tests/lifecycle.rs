//! Lifecycle Tests
//!
//! Start and stop hooks, the family tree, message stowing and dispersal,
//! and mailbox suspension with overrides.

mod common;

use common::*;
use stage_actors::{
    Actor, ActorRef, ActorResult, Context, Definition, Hooks, LifeCycleState, OnStart, OnStop,
    Protocol, Proxy,
};

/// Records every event in order
struct Recorder {
    log: Log<String>,
    stopped: Counter,
}

impl Recorder {
    fn definition(log: &Log<String>, stopped: &Counter) -> Definition<Recorder> {
        let (log, stopped) = (log.clone(), stopped.clone());
        Definition::new(move |_| Recorder { log, stopped })
    }
}

impl Actor for Recorder {
    fn hooks() -> Hooks<Self> {
        Hooks::new().on_start().on_stop()
    }
}

impl OnStart for Recorder {
    fn before_start(&mut self, _ctx: &Context<Self>) -> ActorResult {
        self.log.push("start".to_string());
        Ok(())
    }
}

impl OnStop for Recorder {
    fn after_stop(&mut self, _ctx: &Context<Self>) -> ActorResult {
        self.stopped.increment();
        self.log.push("stop".to_string());
        Ok(())
    }
}

fn record(actor: &ActorRef<Recorder>, entry: &str) {
    let entry = entry.to_string();
    actor.tell(format!("record({entry})"), move |recorder: &mut Recorder, _ctx: &Context<Recorder>| {
        recorder.log.push(entry);
        Ok(())
    });
}

/// Control protocol that keeps flowing while the recorder stows or suspends
#[derive(Clone)]
struct Control(ActorRef<Recorder>);

impl Proxy<Recorder> for Control {
    fn bind(actor: ActorRef<Recorder>) -> Self {
        Control(actor)
    }
}

impl Control {
    fn record(&self, entry: &str) {
        record(&self.0, entry);
    }

    fn stow(&self) {
        self.0.tell("stow()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.stow_messages(&[Protocol::of::<Control>()]);
            Ok(())
        });
    }

    fn disperse(&self) {
        self.0.tell("disperse()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.disperse_stowed_messages();
            Ok(())
        });
    }

    fn suspend(&self, name: &'static str) {
        self.0.tell("suspend()", move |recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.suspend_except_for(name, &[Protocol::of::<Control>()]);
            recorder.log.push(format!("suspended:{name}"));
            Ok(())
        });
    }

    fn resume(&self, name: &'static str) {
        self.0.tell("resume()", move |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.resume(name);
            Ok(())
        });
    }
}

fn state_of(actor: &ActorRef<Recorder>) -> LifeCycleState {
    actor
        .query("state()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            Ok(ctx.environment().state())
        })
        .await_timeout(PATIENCE)
        .unwrap()
}

#[test_log::test]
fn test_start_hook_runs_before_first_message() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();

    record(&actor, "first");
    assert!(log.reaches(2));
    assert_eq!(log.entries(), vec!["start", "first"]);
    assert_eq!(state_of(&actor), LifeCycleState::Running);
    stage.terminate();
}

#[test]
fn test_stop_is_idempotent() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let actors = stage.count();

    actor.stop();
    actor.stop();
    actor.tell("stopAgain()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
        ctx.stop();
        Ok(())
    });

    assert!(wait_until(|| actor.is_stopped()));
    assert!(stopped.reaches(1));
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(stopped.get(), 1);
    assert_eq!(stage.count(), actors - 1);
    assert_eq!(stage.metrics().snapshot().actors_stopped, 1);
    stage.terminate();
}

#[test_log::test]
fn test_stopping_parent_stops_children() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let parent = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();

    let (child_log, child_stopped) = (log.clone(), stopped.clone());
    let child = parent
        .query("spawn()", move |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.child_actor_for(Recorder::definition(&child_log, &child_stopped).named("child"))
        })
        .await_timeout(PATIENCE)
        .unwrap();

    let child_address = child.address().clone();
    let parent_address = parent.address().clone();
    let child_parent = child
        .query("parent()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| Ok(ctx.parent()))
        .await_timeout(PATIENCE)
        .unwrap();
    assert_eq!(child_parent, Some(parent_address));
    assert_eq!(child_address.name(), Some("child"));

    parent.stop();

    assert!(wait_until(|| child.is_stopped() && parent.is_stopped()));
    assert!(stopped.reaches(2));
    assert!(!stage.directory().contains(&child_address));
    stage.terminate();
}

#[test_log::test]
fn test_stowed_messages_disperse_in_order() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let control: Control = actor.as_protocol();

    control.stow();
    record(&actor, "1");
    record(&actor, "2");
    record(&actor, "3");
    control.record("override");

    assert!(log.reaches(2));
    assert!(wait_until(|| stage.metrics().snapshot().messages_stowed == 3));
    assert_eq!(log.entries(), vec!["start", "override"]);

    control.disperse();
    record(&actor, "4");

    assert!(log.reaches(6));
    assert_eq!(log.entries(), vec!["start", "override", "1", "2", "3", "4"]);
    assert_eq!(state_of(&actor), LifeCycleState::Running);
    stage.terminate();
}

#[test]
fn test_stop_request_passes_stowing() {
    let stage = test_stage();
    let dead_letters = dead_letter_log(&stage);
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let control: Control = actor.as_protocol();

    control.stow();
    record(&actor, "never");
    actor.stop();

    assert!(wait_until(|| actor.is_stopped()));
    assert!(dead_letters.reaches(1));
    assert_eq!(dead_letters.entries()[0].representation, "record(never)");
    assert!(!log.entries().contains(&"never".to_string()));
    stage.terminate();
}

#[test_log::test]
fn test_suspension_passes_only_overrides() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let control: Control = actor.as_protocol();

    control.suspend("paused");
    assert!(log.reaches(2));
    record(&actor, "held");

    // Overrides are delivered past the held message
    control.record("override");
    assert!(log.reaches(3));
    assert_eq!(log.entries(), vec!["start", "suspended:paused", "override"]);

    control.resume("paused");
    assert!(log.reaches(4));
    assert_eq!(
        log.entries(),
        vec!["start", "suspended:paused", "override", "held"]
    );
    stage.terminate();
}

#[test]
fn test_suspension_and_stowing_both_hold_messages() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let control: Control = actor.as_protocol();

    control.stow();
    control.suspend("hold");
    assert!(log.reaches(2));
    record(&actor, "a");
    record(&actor, "b");
    control.record("marker");
    assert!(log.reaches(3));

    // Resuming releases the held messages into stowage, not to the actor
    control.resume("hold");
    assert!(wait_until(|| stage.metrics().snapshot().messages_stowed == 2));
    assert_eq!(log.entries(), vec!["start", "suspended:hold", "marker"]);

    control.disperse();
    assert!(log.reaches(5));
    assert_eq!(
        log.entries(),
        vec!["start", "suspended:hold", "marker", "a", "b"]
    );
    stage.terminate();
}

#[test]
fn test_proxy_messages_carry_their_protocol() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();

    let control: Control = actor.as_protocol();
    assert_eq!(control.0.protocol(), Protocol::of::<Control>());
    assert_eq!(actor.protocol(), Protocol::of::<Recorder>());
    assert_eq!(control.0, actor);

    let cached = actor
        .query("selfAs()", |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            let first: Control = ctx.self_as();
            let second: Control = ctx.self_as();
            Ok(first.0 == second.0 && first.0.protocol() == Protocol::of::<Control>())
        })
        .await_timeout(PATIENCE)
        .unwrap();
    assert!(cached);
    stage.terminate();
}

#[test_log::test]
fn test_terminate_stops_everything() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let first = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let second = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();

    stage.terminate();
    stage.terminate();

    assert!(first.is_stopped() && second.is_stopped());
    assert!(stage.is_terminated());
    assert_eq!(stage.count(), 0);
    assert_eq!(stopped.get(), 2);
    assert!(stage.actor_for(Recorder::definition(&log, &stopped)).is_err());
}

#[test_log::test]
fn test_terminate_from_a_handler_returns() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let actor = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();

    actor.tell("terminate()", |recorder: &mut Recorder, ctx: &Context<Recorder>| {
        ctx.stage().terminate();
        recorder.log.push("terminated".to_string());
        Ok(())
    });

    assert!(wait_until(|| log.entries().contains(&"terminated".to_string())));
    assert!(stopped.reaches(1));
    assert!(stage.is_terminated());
    assert!(actor.is_stopped());
}

#[test]
fn test_parent_stays_registered_while_children_stop() {
    let stage = test_stage();
    let (log, stopped) = (Log::new(), Counter::default());
    let parent = stage.actor_for(Recorder::definition(&log, &stopped)).unwrap();
    let parent_address = parent.address().clone();

    let (child_log, child_stopped) = (log.clone(), stopped.clone());
    let child = parent
        .query("spawn()", move |_recorder: &mut Recorder, ctx: &Context<Recorder>| {
            ctx.child_actor_for(Recorder::definition(&child_log, &child_stopped))
        })
        .await_timeout(PATIENCE)
        .unwrap();

    // Held messages are dead-lettered while the child's mailbox closes
    let registered = Log::new();
    let (sink, observer) = (registered.clone(), stage.clone());
    stage.dead_letters().register_listener(std::sync::Arc::new(
        move |_dead_letter: &stage_actors::DeadLetter| {
            sink.push(observer.directory().contains(&parent_address));
        },
    ));

    let control: Control = child.as_protocol();
    control.suspend("hold");
    assert!(wait_until(|| log.entries().contains(&"suspended:hold".to_string())));
    record(&child, "held");

    parent.stop();

    assert!(wait_until(|| child.is_stopped() && parent.is_stopped()));
    assert!(registered.reaches(1));
    assert!(registered.entries()[0]);
    assert!(!stage.directory().contains(parent.address()));
    stage.terminate();
}
