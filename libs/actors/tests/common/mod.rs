//! Shared helpers for the stage integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use stage_actors::{DeadLetter, Stage, StageConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for anything a test waits on
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Small stage with a fixed pool and no background eviction
pub fn test_stage() -> Stage {
    let mut config = StageConfig::default();
    config.stage.name = "test".to_string();
    config.dispatcher.threads = Some(4);
    config.eviction.enabled = false;
    Stage::new(config).expect("stage starts")
}

/// Poll `condition` until it holds or `PATIENCE` runs out
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Shared counter handed to actors
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Wait until the counter reaches `expected`
    pub fn reaches(&self, expected: usize) -> bool {
        wait_until(|| self.get() >= expected)
    }
}

/// Shared, ordered record of events
#[derive(Debug, Clone)]
pub struct Log<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Log<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, entry: T) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<T> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn reaches(&self, expected: usize) -> bool {
        wait_until(|| self.len() >= expected)
    }
}

/// Collect every dead letter the stage produces from now on
pub fn dead_letter_log(stage: &Stage) -> Log<DeadLetter> {
    let log = Log::new();
    let sink = log.clone();
    stage
        .dead_letters()
        .register_listener(Arc::new(move |dead_letter: &DeadLetter| sink.push(dead_letter.clone())));
    log
}
