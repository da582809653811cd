//! Mailboxes
//!
//! A mailbox buffers messages for one actor and schedules delivery turns on
//! the [`Dispatcher`]. At most one thread drains a mailbox at a time: a turn
//! is only scheduled by the thread that flips `delivering` from false to
//! true, and the flag is released when the turn ends.
//!
//! Suspension is a stack of named frames. While any frame is present the
//! mailbox does not run turns; sends whose protocol is listed in the top
//! frame's overrides are delivered through a single-message resuming run
//! instead, so recovery traffic is never blocked by the suspension it lifts.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, Task};

use crate::dead_letters::DeadLetters;
use crate::message::{DeliveryPath, Message};
use crate::metrics::StageMetrics;
use crate::protocol::Protocol;
use parking_lot::{Condvar, Mutex};
use stage_config::{defaults, MailboxConfig, OverflowPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Name of the suspension frame pushed while a failure is supervised
pub const EXCEPTIONAL: &str = "exceptional";

/// Queue discipline of a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKind {
    /// Unbounded FIFO queue
    Queue,
    /// FIFO queue holding at most `capacity` messages
    Bounded {
        capacity: usize,
        overflow: OverflowPolicy,
        send_timeout: Duration,
    },
}

impl MailboxKind {
    /// Resolve a mailbox name against the configuration
    pub fn from_config(name: &str, config: &MailboxConfig) -> Option<Self> {
        match name {
            defaults::mailbox::QUEUE => Some(MailboxKind::Queue),
            defaults::mailbox::BOUNDED => Some(MailboxKind::Bounded {
                capacity: config.bounded.capacity,
                overflow: config.bounded.overflow,
                send_timeout: Duration::from_millis(config.bounded.send_timeout_ms),
            }),
            _ => None,
        }
    }
}

/// One level of the suspension stack
#[derive(Debug, Clone)]
pub struct SuspensionFrame {
    pub name: String,
    pub overrides: Vec<Protocol>,
}

/// Message buffer and delivery trigger for one actor
pub struct Mailbox {
    queue: Mutex<VecDeque<Box<dyn Message>>>,
    not_full: Condvar,
    suspended_stowage: Mutex<VecDeque<Box<dyn Message>>>,
    suspensions: Mutex<Vec<SuspensionFrame>>,
    suspended: AtomicBool,
    delivering: AtomicBool,
    closed: AtomicBool,
    kind: MailboxKind,
    throttling: usize,
    dispatcher: Arc<Dispatcher>,
    dead_letters: Arc<DeadLetters>,
    metrics: Arc<StageMetrics>,
    this: Weak<Mailbox>,
}

impl Mailbox {
    pub fn new(
        kind: MailboxKind,
        dispatcher: Arc<Dispatcher>,
        dead_letters: Arc<DeadLetters>,
        metrics: Arc<StageMetrics>,
    ) -> Arc<Self> {
        let throttling = dispatcher.throttling().max(1);
        Arc::new_cyclic(|this| Self {
            queue: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            suspended_stowage: Mutex::new(VecDeque::new()),
            suspensions: Mutex::new(Vec::new()),
            suspended: AtomicBool::new(false),
            delivering: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            kind,
            throttling,
            dispatcher,
            dead_letters,
            metrics,
            this: this.clone(),
        })
    }

    pub fn kind(&self) -> MailboxKind {
        self.kind
    }

    /// Enqueue a message and schedule a delivery turn
    pub fn send(&self, message: Box<dyn Message>) {
        if self.is_closed() {
            self.dead_letter(message);
            return;
        }

        if self.is_suspended_for(message.protocol()) {
            self.deliver_resuming(message);
            return;
        }

        if let Err(rejected) = self.enqueue(message) {
            self.metrics.record_overflow();
            warn!(
                address = %rejected.address(),
                representation = %rejected.representation(),
                "Mailbox full, message dead-lettered"
            );
            self.dead_letter(rejected);
            return;
        }

        self.schedule();
    }

    /// Dequeue the next message
    pub fn receive(&self) -> Option<Box<dyn Message>> {
        let message = self.queue.lock().pop_front();
        if message.is_some() && matches!(self.kind, MailboxKind::Bounded { .. }) {
            self.not_full.notify_one();
        }
        message
    }

    /// Deliver up to the throttling count of messages, then yield the worker
    pub fn run(&self) {
        for _ in 0..self.throttling {
            if self.is_suspended() || self.is_closed() {
                break;
            }
            match self.receive() {
                Some(message) => message.deliver(DeliveryPath::Normal),
                None => break,
            }
        }

        self.delivering.store(false, Ordering::SeqCst);

        // A sender that lost the race for `delivering` relies on this recheck
        if self.pending_messages() > 0 {
            self.schedule();
        }
    }

    /// Push a suspension frame; only `overrides` get through until it is resumed
    pub fn suspend_except_for(&self, name: &str, overrides: &[Protocol]) {
        let mut suspensions = self.suspensions.lock();
        suspensions.push(SuspensionFrame {
            name: name.to_string(),
            overrides: overrides.to_vec(),
        });
        self.suspended.store(true, Ordering::SeqCst);
        trace!(frame = name, depth = suspensions.len(), "Mailbox suspended");
    }

    /// Pop the top-most frame named `name`
    ///
    /// When the stack empties, messages stowed during suspension move to the
    /// front of the queue and delivery resumes.
    pub fn resume(&self, name: &str) -> bool {
        let emptied = {
            let mut suspensions = self.suspensions.lock();
            let position = match suspensions.iter().rposition(|frame| frame.name == name) {
                Some(position) => position,
                None => return false,
            };
            suspensions.remove(position);
            let emptied = suspensions.is_empty();
            if emptied {
                self.suspended.store(false, Ordering::SeqCst);
            }
            emptied
        };

        if emptied {
            let stowed: Vec<_> = self.suspended_stowage.lock().drain(..).collect();
            if !stowed.is_empty() {
                self.prepend(stowed);
            }
            self.schedule();
        }
        true
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Check whether a message of `protocol` would take the resuming path
    pub fn is_suspended_for(&self, protocol: Protocol) -> bool {
        if !self.is_suspended() {
            return false;
        }
        self.suspensions
            .lock()
            .last()
            .map(|frame| frame.overrides.contains(&protocol))
            .unwrap_or(false)
    }

    /// Names of the current suspension frames, bottom first
    pub fn suspension_frames(&self) -> Vec<String> {
        self.suspensions
            .lock()
            .iter()
            .map(|frame| frame.name.clone())
            .collect()
    }

    /// Hold a message taken off the queue while the mailbox was suspended
    pub(crate) fn stow_suspended(&self, message: Box<dyn Message>) {
        if self.is_closed() {
            self.dead_letter(message);
            return;
        }
        self.suspended_stowage.lock().push_back(message);
        // A resume may have slipped in between the suspension check and here
        if !self.is_suspended() {
            let stowed: Vec<_> = self.suspended_stowage.lock().drain(..).collect();
            self.prepend(stowed);
            self.schedule();
        }
    }

    /// Put messages ahead of everything queued, preserving their order
    pub fn prepend(&self, messages: Vec<Box<dyn Message>>) {
        if self.is_closed() {
            for message in messages {
                self.dead_letter(message);
            }
            return;
        }
        let mut queue = self.queue.lock();
        for message in messages.into_iter().rev() {
            queue.push_front(message);
        }
    }

    /// Schedule a turn for messages placed without a send
    pub(crate) fn wake(&self) {
        self.schedule();
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.lock().len()
    }

    /// Messages held back by suspension, waiting for the last resume
    pub fn suspended_messages(&self) -> usize {
        self.suspended_stowage.lock().len()
    }

    pub fn is_delivering(&self) -> bool {
        self.delivering.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Refuse further messages and dead-letter everything still buffered
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut remaining: Vec<_> = self.suspended_stowage.lock().drain(..).collect();
        remaining.extend(self.queue.lock().drain(..));
        self.not_full.notify_all();

        if !remaining.is_empty() {
            debug!(remaining = remaining.len(), "Mailbox closed with pending messages");
        }
        for message in remaining {
            self.dead_letter(message);
        }
    }

    /// Schedule a turn unless one is already running or the mailbox is held
    fn schedule(&self) {
        if self.is_suspended() || self.is_closed() {
            return;
        }
        if self
            .delivering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mailbox = match self.this.upgrade() {
            Some(mailbox) => mailbox,
            None => {
                self.delivering.store(false, Ordering::SeqCst);
                return;
            }
        };

        if let Err(e) = self.dispatcher.execute(Box::new(move || mailbox.run())) {
            self.delivering.store(false, Ordering::SeqCst);
            warn!(error = %e, "Mailbox turn not scheduled");
        }
    }

    fn deliver_resuming(&self, message: Box<dyn Message>) {
        let task: Task = Box::new(move || message.deliver(DeliveryPath::Resuming));
        if let Err(e) = self.dispatcher.execute(task) {
            warn!(error = %e, "Resuming delivery not scheduled");
        }
    }

    fn enqueue(&self, message: Box<dyn Message>) -> std::result::Result<(), Box<dyn Message>> {
        let mut queue = self.queue.lock();
        match self.kind {
            MailboxKind::Queue => {}
            MailboxKind::Bounded {
                capacity,
                overflow,
                send_timeout,
            } => {
                if queue.len() >= capacity {
                    match overflow {
                        OverflowPolicy::DeadLetter => return Err(message),
                        OverflowPolicy::Block => {
                            let deadline = Instant::now() + send_timeout;
                            while queue.len() >= capacity {
                                if self.is_closed() {
                                    return Err(message);
                                }
                                if self.not_full.wait_until(&mut queue, deadline).timed_out()
                                    && queue.len() >= capacity
                                {
                                    return Err(message);
                                }
                            }
                        }
                    }
                }
            }
        }
        queue.push_back(message);
        Ok(())
    }

    fn dead_letter(&self, message: Box<dyn Message>) {
        self.dead_letters.failed_delivery(message.to_dead_letter());
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("kind", &self.kind)
            .field("pending", &self.pending_messages())
            .field("suspended", &self.is_suspended())
            .field("delivering", &self.is_delivering())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, AddressFactory, DEAD_LETTERS_ID};
    use crate::dead_letters::DeadLetter;
    use stage_config::DispatcherConfig;
    use std::sync::atomic::AtomicUsize;

    /// Message that records its sequence number into a shared log
    struct Tagged {
        address: Address,
        protocol: Protocol,
        seq: usize,
        log: Arc<Mutex<Vec<(usize, DeliveryPath)>>>,
        active: Arc<AtomicUsize>,
        overlap: Arc<AtomicBool>,
    }

    impl Message for Tagged {
        fn address(&self) -> &Address {
            &self.address
        }

        fn protocol(&self) -> Protocol {
            self.protocol
        }

        fn representation(&self) -> &str {
            "tagged()"
        }

        fn is_stowed(&self) -> bool {
            false
        }

        fn deliver(self: Box<Self>, path: DeliveryPath) {
            if self.active.fetch_add(1, Ordering::SeqCst) > 0 && path == DeliveryPath::Normal {
                self.overlap.store(true, Ordering::SeqCst);
            }
            std::thread::yield_now();
            self.log.lock().push((self.seq, path));
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        mailbox: Arc<Mailbox>,
        dispatcher: Arc<Dispatcher>,
        dead: Arc<Mutex<Vec<DeadLetter>>>,
        address: Address,
        log: Arc<Mutex<Vec<(usize, DeliveryPath)>>>,
        active: Arc<AtomicUsize>,
        overlap: Arc<AtomicBool>,
    }

    struct Urgent;

    impl Fixture {
        fn new(kind: MailboxKind, threads: usize) -> Self {
            let config = DispatcherConfig {
                threads: Some(threads),
                throttling: 3,
                ..DispatcherConfig::default()
            };
            let dispatcher = Arc::new(Dispatcher::new("mailbox-test", &config).unwrap());
            let factory = AddressFactory::new();
            let metrics = Arc::new(StageMetrics::default());
            let dead_letters = Arc::new(DeadLetters::new(
                factory.reserved(DEAD_LETTERS_ID, "dead-letters").unwrap(),
                Arc::clone(&metrics),
            ));
            let dead = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&dead);
            dead_letters.register_listener(Arc::new(move |d: &DeadLetter| sink.lock().push(d.clone())));

            Self {
                mailbox: Mailbox::new(kind, Arc::clone(&dispatcher), dead_letters, metrics),
                dispatcher,
                dead,
                address: factory.unique_with("tagged"),
                log: Arc::new(Mutex::new(Vec::new())),
                active: Arc::new(AtomicUsize::new(0)),
                overlap: Arc::new(AtomicBool::new(false)),
            }
        }

        fn tagged(&self, seq: usize, protocol: Protocol) -> Box<dyn Message> {
            Box::new(Tagged {
                address: self.address.clone(),
                protocol,
                seq,
                log: Arc::clone(&self.log),
                active: Arc::clone(&self.active),
                overlap: Arc::clone(&self.overlap),
            })
        }

        fn send(&self, seq: usize) {
            self.mailbox.send(self.tagged(seq, Protocol::of::<Tagged>()));
        }

        fn delivered(&self) -> Vec<usize> {
            self.log.lock().iter().map(|(seq, _)| *seq).collect()
        }

        fn wait_for(&self, count: usize) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.log.lock().len() < count && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn test_fifo_with_throttled_turns() {
        let fixture = Fixture::new(MailboxKind::Queue, 2);
        for seq in 0..50 {
            fixture.send(seq);
        }
        fixture.wait_for(50);
        assert_eq!(fixture.delivered(), (0..50).collect::<Vec<_>>());
        assert!(!fixture.overlap.load(Ordering::SeqCst));
        fixture.dispatcher.close();
    }

    #[test]
    fn test_single_deliverer_under_concurrent_senders() {
        let fixture = Arc::new(Fixture::new(MailboxKind::Queue, 4));
        let senders: Vec<_> = (0..4)
            .map(|producer| {
                let fixture = Arc::clone(&fixture);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        fixture.send(producer * 1000 + i);
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        fixture.wait_for(1000);
        assert_eq!(fixture.log.lock().len(), 1000);
        assert!(!fixture.overlap.load(Ordering::SeqCst));

        // Per-producer order survives interleaving
        for producer in 0..4 {
            let seen: Vec<_> = fixture
                .delivered()
                .into_iter()
                .filter(|seq| seq / 1000 == producer)
                .collect();
            assert_eq!(seen, (0..250).map(|i| producer * 1000 + i).collect::<Vec<_>>());
        }
        fixture.dispatcher.close();
    }

    #[test]
    fn test_suspension_holds_messages_and_overrides_pass() {
        let fixture = Fixture::new(MailboxKind::Queue, 2);
        fixture
            .mailbox
            .suspend_except_for("paused", &[Protocol::of::<Urgent>()]);

        fixture.send(1);
        fixture.send(2);
        fixture.mailbox.send(fixture.tagged(99, Protocol::of::<Urgent>()));

        fixture.wait_for(1);
        assert_eq!(*fixture.log.lock(), vec![(99, DeliveryPath::Resuming)]);
        assert_eq!(fixture.mailbox.pending_messages(), 2);

        assert!(fixture.mailbox.resume("paused"));
        fixture.wait_for(3);
        assert_eq!(fixture.delivered(), vec![99, 1, 2]);
        fixture.dispatcher.close();
    }

    #[test]
    fn test_resume_pops_named_frame_only() {
        let fixture = Fixture::new(MailboxKind::Queue, 1);
        fixture.mailbox.suspend_except_for("outer", &[]);
        fixture
            .mailbox
            .suspend_except_for("inner", &[Protocol::of::<Urgent>()]);

        assert!(fixture.mailbox.is_suspended_for(Protocol::of::<Urgent>()));
        assert!(fixture.mailbox.resume("outer"));
        assert_eq!(fixture.mailbox.suspension_frames(), vec!["inner".to_string()]);
        assert!(fixture.mailbox.is_suspended());
        assert!(!fixture.mailbox.resume("missing"));
        assert!(fixture.mailbox.resume("inner"));
        assert!(!fixture.mailbox.is_suspended());
        fixture.dispatcher.close();
    }

    #[test]
    fn test_close_dead_letters_pending() {
        let fixture = Fixture::new(MailboxKind::Queue, 1);
        fixture.mailbox.suspend_except_for("hold", &[]);
        fixture.send(1);
        fixture.send(2);

        fixture.mailbox.close();
        fixture.send(3);

        assert_eq!(fixture.dead.lock().len(), 3);
        assert!(fixture.log.lock().is_empty());
        fixture.dispatcher.close();
    }

    #[test]
    fn test_bounded_dead_letter_overflow() {
        let fixture = Fixture::new(
            MailboxKind::Bounded {
                capacity: 2,
                overflow: OverflowPolicy::DeadLetter,
                send_timeout: Duration::from_millis(10),
            },
            1,
        );
        fixture.mailbox.suspend_except_for("hold", &[]);
        for seq in 0..5 {
            fixture.send(seq);
        }

        assert_eq!(fixture.mailbox.pending_messages(), 2);
        assert_eq!(fixture.dead.lock().len(), 3);
        assert_eq!(fixture.mailbox.metrics.snapshot().mailbox_overflows, 3);
        fixture.dispatcher.close();
    }

    #[test]
    fn test_bounded_block_waits_for_room() {
        let fixture = Arc::new(Fixture::new(
            MailboxKind::Bounded {
                capacity: 1,
                overflow: OverflowPolicy::Block,
                send_timeout: Duration::from_secs(2),
            },
            1,
        ));
        fixture.mailbox.suspend_except_for("hold", &[]);
        fixture.send(1);

        let blocked = {
            let fixture = Arc::clone(&fixture);
            std::thread::spawn(move || fixture.send(2))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(fixture.mailbox.receive().is_some());
        blocked.join().unwrap();

        assert_eq!(fixture.mailbox.pending_messages(), 1);
        assert!(fixture.dead.lock().is_empty());
        fixture.dispatcher.close();
    }

    #[test]
    fn test_bounded_block_times_out_to_dead_letters() {
        let fixture = Fixture::new(
            MailboxKind::Bounded {
                capacity: 1,
                overflow: OverflowPolicy::Block,
                send_timeout: Duration::from_millis(20),
            },
            1,
        );
        fixture.mailbox.suspend_except_for("hold", &[]);
        fixture.send(1);
        fixture.send(2);
        assert_eq!(fixture.dead.lock().len(), 1);
        fixture.dispatcher.close();
    }

    #[test]
    fn test_mailbox_kind_from_config() {
        let config = MailboxConfig::default();
        assert_eq!(MailboxKind::from_config("queue", &config), Some(MailboxKind::Queue));
        assert!(matches!(
            MailboxKind::from_config("bounded", &config),
            Some(MailboxKind::Bounded { capacity: 1024, .. })
        ));
        assert_eq!(MailboxKind::from_config("ring", &config), None);
    }
}
