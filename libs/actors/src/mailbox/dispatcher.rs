//! Dispatcher
//!
//! Fixed pool of named worker threads that run mailbox turns and lifecycle
//! tasks. Work is fed through an unbounded `crossbeam-channel` queue shared
//! by every worker.

use crate::error::{ActorError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use stage_config::DispatcherConfig;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

/// Unit of work run on a worker thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Run(Task),
    Shutdown,
}

/// Worker thread pool
pub struct Dispatcher {
    name: String,
    sender: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_ids: Vec<ThreadId>,
    closed: AtomicBool,
    throttling: usize,
}

impl Dispatcher {
    /// Start a pool sized from the configuration
    pub fn new(name: &str, config: &DispatcherConfig) -> Result<Self> {
        let size = Self::pool_size(config);
        if config.throttling == 0 {
            return Err(ActorError::configuration(
                "throttling must be greater than zero",
                Some("dispatcher.throttling"),
            ));
        }

        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        let mut worker_ids = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-dispatcher-{}", name, index))
                .spawn(move || worker_loop(receiver))
                .map_err(|e| ActorError::failure_with_source("failed to spawn dispatcher worker", e))?;
            worker_ids.push(handle.thread().id());
            workers.push(handle);
        }

        info!(
            dispatcher = %name,
            workers = size,
            throttling = config.throttling,
            "Dispatcher started"
        );

        Ok(Self {
            name: name.to_string(),
            sender,
            workers: Mutex::new(workers),
            worker_ids,
            closed: AtomicBool::new(false),
            throttling: config.throttling,
        })
    }

    /// Worker count for a configuration
    pub fn pool_size(config: &DispatcherConfig) -> usize {
        match config.threads {
            Some(threads) => threads.max(1),
            None => {
                let processors = thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                ((processors as f32 * config.pool_factor).ceil() as usize).max(1)
            }
        }
    }

    /// Queue a task for execution on some worker
    pub fn execute(&self, task: Task) -> Result<()> {
        if self.is_closed() {
            return Err(ActorError::dispatcher_closed(&self.name));
        }
        self.sender
            .send(Job::Run(task))
            .map_err(|_| ActorError::dispatcher_closed(&self.name))
    }

    /// Messages a mailbox may deliver per turn
    pub fn throttling(&self) -> usize {
        self.throttling
    }

    pub fn size(&self) -> usize {
        self.worker_ids.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check whether the calling thread belongs to this pool
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.worker_ids.contains(&current)
    }

    /// Stop accepting work, drain queued tasks and join the workers
    ///
    /// When called from one of the pool's own workers the join happens on a
    /// separate thread and this returns at once: queued tasks may still wait
    /// on locks the calling task holds.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Shutdown jobs queue behind everything already submitted
        for _ in 0..self.worker_ids.len() {
            if self.sender.send(Job::Shutdown).is_err() {
                break;
            }
        }

        let current = thread::current().id();
        let workers: Vec<_> = self
            .workers
            .lock()
            .drain(..)
            .filter(|worker| worker.thread().id() != current)
            .collect();

        if self.is_worker_thread() {
            let name = self.name.clone();
            let joiner = thread::Builder::new()
                .name(format!("{}-dispatcher-close", self.name))
                .spawn(move || join_workers(&name, workers));
            if let Err(e) = joiner {
                warn!(dispatcher = %self.name, error = %e, "Dispatcher workers left detached");
            }
            info!(dispatcher = %self.name, "Dispatcher closing from a worker");
            return;
        }

        join_workers(&self.name, workers);
        info!(dispatcher = %self.name, "Dispatcher closed");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("workers", &self.worker_ids.len())
            .field("throttling", &self.throttling)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

fn join_workers(name: &str, workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            warn!(dispatcher = %name, "Dispatcher worker exited by panic");
        }
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    debug!("Dispatcher worker started");
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Run(task) => {
                // Deliveries catch their own panics; this only guards the worker
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("Dispatcher task panicked");
                }
            }
            Job::Shutdown => break,
        }
    }
    debug!("Dispatcher worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn config(threads: usize) -> DispatcherConfig {
        DispatcherConfig {
            threads: Some(threads),
            ..DispatcherConfig::default()
        }
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(Dispatcher::pool_size(&config(3)), 3);
        assert_eq!(Dispatcher::pool_size(&config(0)), 1);

        let factor = DispatcherConfig {
            threads: None,
            pool_factor: 0.01,
            ..DispatcherConfig::default()
        };
        assert_eq!(Dispatcher::pool_size(&factor), 1);
    }

    #[test]
    fn test_close_drains_queued_tasks() {
        let dispatcher = Dispatcher::new("drain", &config(2)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            dispatcher
                .execute(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        dispatcher.close();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert!(matches!(
            dispatcher.execute(Box::new(|| {})),
            Err(ActorError::DispatcherClosed { .. })
        ));
    }

    #[test]
    fn test_panicking_task_keeps_worker_alive() {
        let dispatcher = Dispatcher::new("panic", &config(1)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher.execute(Box::new(|| panic!("task failure"))).unwrap();
        let after = Arc::clone(&counter);
        dispatcher
            .execute(Box::new(move || {
                after.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        dispatcher.close();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_from_worker_does_not_wait_on_blocked_tasks() {
        let dispatcher = Arc::new(Dispatcher::new("inner", &config(2)).unwrap());
        let lock = Arc::new(Mutex::new(()));
        let ran = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::bounded(1);

        let (pool, held, counter) = (Arc::clone(&dispatcher), Arc::clone(&lock), Arc::clone(&ran));
        dispatcher
            .execute(Box::new(move || {
                let _guard = held.lock();
                let waiting = Arc::clone(&held);
                pool.execute(Box::new(move || {
                    let _guard = waiting.lock();
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
                pool.close();
                let _ = tx.send(pool.is_closed());
            }))
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        let deadline = Instant::now() + Duration::from_secs(5);
        while ran.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_threads_are_named() {
        let dispatcher = Dispatcher::new("named", &config(1)).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        dispatcher
            .execute(Box::new(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            }))
            .unwrap();

        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("named-dispatcher-0"));
        assert!(!dispatcher.is_worker_thread());
    }
}
