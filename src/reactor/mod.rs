//! Reactor Module
//!
//! The single thread that owns the connection.
//!
//! ## Architecture
//! ```text
//!  caller threads                       reactor thread
//!  ──────────────                       ──────────────
//!  submit ─► Registry.insert            poll(timeout = min(timer, poll_interval))
//!         └► CommandQueue.enqueue ──►   ├─ read replies
//!                     │ wake            ├─ drain queue ─► submit | arm timer
//!                     └───────────►     ├─ fire timers ─► submit
//!                                       ├─ flush writes
//!                                       └─ route replies ─► dispatch ─► callback
//! ```
//!
//! Everything both sides touch lives in [`Shared`], handed to the reactor as
//! an `Arc` when it is spawned.

mod driver;

pub(crate) use driver::Driver;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::command::{CommandId, CommandQueue, Registry};
use crate::config::Config;
use crate::network::ConnectionMonitor;

/// Lifetime command counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub created: u64,
    pub released: u64,
    pub processed: u64,
    pub abandoned: u64,
}

/// State shared by the client handle and the reactor thread
pub(crate) struct Shared {
    pub config: Config,
    pub registry: Registry,
    pub queue: CommandQueue,
    pub connection: ConnectionMonitor,

    /// Guarded separately from the queue and the registry
    counters: Mutex<Counters>,

    next_id: AtomicU64,

    /// Set once by `stop_signal` or a connection failure
    exit: AtomicBool,

    /// True only while the connection is up and no stop was requested
    accepting: AtomicBool,

    exited: Mutex<bool>,
    exit_cv: Condvar,

    reactor_thread: OnceLock<ThreadId>,
}

impl Shared {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Registry::new(),
            queue: CommandQueue::new(),
            connection: ConnectionMonitor::new(),
            counters: Mutex::new(Counters::default()),
            next_id: AtomicU64::new(1),
            exit: AtomicBool::new(false),
            accepting: AtomicBool::new(false),
            exited: Mutex::new(false),
            exit_cv: Condvar::new(),
            reactor_thread: OnceLock::new(),
        }
    }

    /// Allocate a fresh id; ids are never reused
    pub fn next_id(&self) -> CommandId {
        CommandId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    pub fn count_created(&self) {
        self.counters.lock().created += 1;
    }

    pub fn count_released(&self) {
        self.counters.lock().released += 1;
    }

    pub fn count_processed(&self) {
        self.counters.lock().processed += 1;
    }

    /// Released at shutdown without a reply
    pub fn count_abandoned(&self) {
        let mut counters = self.counters.lock();
        counters.abandoned += 1;
        counters.released += 1;
    }

    // -------------------------------------------------------------------------
    // Lifecycle Flags
    // -------------------------------------------------------------------------

    /// Ask the reactor to shut down; returns immediately
    pub fn request_stop(&self) {
        self.accepting.store(false, Ordering::Release);
        if !self.exit.swap(true, Ordering::AcqRel) {
            tracing::debug!("Stop requested");
        }
        self.queue.wake();
    }

    pub fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Called by the reactor as its very last step
    pub fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exit_cv.notify_all();
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.lock()
    }

    /// Block until the reactor has finished its shutdown sequence
    pub fn wait_exited(&self) {
        let mut exited = self.exited.lock();
        while !*exited {
            self.exit_cv.wait(&mut exited);
        }
    }

    // -------------------------------------------------------------------------
    // Thread Identity
    // -------------------------------------------------------------------------

    pub fn set_reactor_thread(&self) {
        let _ = self.reactor_thread.set(thread::current().id());
    }

    pub fn on_reactor_thread(&self) -> bool {
        self.reactor_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }
}
