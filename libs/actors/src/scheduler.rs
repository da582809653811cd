//! Scheduler
//!
//! One-shot and periodic timers, each on its own named thread. A timer waits
//! on its cancellation channel, so cancelling wakes it immediately instead
//! of letting it sleep out the current interval.

use crate::error::{ActorError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Handle to a scheduled timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct Cancellable {
    cancel: Sender<()>,
    fired: Arc<AtomicBool>,
}

impl Cancellable {
    /// Stop the timer; reports whether it fired at least once
    ///
    /// A tick already running when this is called completes.
    pub fn cancel(&self) -> bool {
        let _ = self.cancel.try_send(());
        self.fired.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    name: String,
    next_timer: AtomicU64,
}

impl Scheduler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            next_timer: AtomicU64::new(1),
        }
    }

    /// Run `task` once after `delay`
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> Result<Cancellable>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));
        let timer_fired = Arc::clone(&fired);

        self.spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(delay) {
                timer_fired.store(true, Ordering::SeqCst);
                run_tick(task);
            }
        })?;

        Ok(Cancellable { cancel, fired })
    }

    /// Run `task` after `initial_delay`, then every `interval` until cancelled
    pub fn schedule<F>(&self, initial_delay: Duration, interval: Duration, mut task: F) -> Result<Cancellable>
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));
        let timer_fired = Arc::clone(&fired);

        self.spawn(move || {
            let mut deadline = Instant::now() + initial_delay;
            while wait_until(&cancelled, deadline) {
                timer_fired.store(true, Ordering::SeqCst);
                run_tick(&mut task);
                deadline += interval;
                let now = Instant::now();
                if deadline < now {
                    // Missed ticks are skipped, not replayed
                    deadline = now + interval;
                }
            }
        })?;

        Ok(Cancellable { cancel, fired })
    }

    fn spawn<F>(&self, timer: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("{}-timer-{}", self.name, id))
            .spawn(timer)
            .map_err(|e| ActorError::failure_with_source("failed to spawn timer thread", e))?;
        debug!(scheduler = %self.name, timer = id, "Timer scheduled");
        Ok(())
    }
}

/// Wait for the deadline; false once cancelled or the handle is dropped
fn wait_until(cancelled: &Receiver<()>, deadline: Instant) -> bool {
    matches!(cancelled.recv_deadline(deadline), Err(RecvTimeoutError::Timeout))
}

fn run_tick<F: FnOnce()>(task: F) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Scheduled task panicked");
    }
}
