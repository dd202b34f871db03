//! Client
//!
//! The application-facing handle: start the reactor, submit commands, stop.
//!
//! ## Usage
//! ```no_run
//! use atlaskv_client::{Client, Config};
//!
//! let client = Client::connect(Config::builder().tcp("127.0.0.1", 6379).build())?;
//!
//! client.set("greeting", "hello")?;
//! assert_eq!(client.get("greeting")?, Some("hello".to_string()));
//!
//! client
//!     .command::<i64>("INCR visits")
//!     .callback(|_, outcome| println!("visits: {:?}", outcome))
//!     .submit()?;
//!
//! client.stop()?;
//! # Ok::<(), atlaskv_client::ClientError>(())
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mio::{Poll, Waker};
use parking_lot::{Condvar, Mutex};

use crate::command::{Command, CommandId, CommandState, Schedule};
use crate::config::Config;
use crate::dispatch::FromReply;
use crate::error::{ClientError, CommandError, Result};
use crate::network::{ConnectionObserver, ConnectionState, WAKER_TOKEN};
use crate::protocol::Request;
use crate::reactor::{Driver, Shared};

/// Extra wait in `start()` on top of the connect timeout
const START_GRACE: Duration = Duration::from_secs(1);

/// How often a blocked caller rechecks that its command is still registered
const RELEASE_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of the client's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Commands accepted by `submit`
    pub created: u64,

    /// Commands released, abandoned ones included
    pub released: u64,

    /// Replies routed to a command
    pub processed: u64,

    /// Commands released at shutdown without their reply
    pub abandoned: u64,

    /// Commands currently registered
    pub registered: usize,

    /// Ids waiting for the reactor
    pub queued: usize,
}

/// Asynchronous client for one server
pub struct Client {
    shared: Arc<Shared>,
    reactor: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,

    /// Set once the reactor thread exists
    spawned: AtomicBool,
}

impl Client {
    /// Create a client; nothing connects until [`start`](Self::start)
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared::new(config)),
            reactor: Mutex::new(None),
            started: AtomicBool::new(false),
            spawned: AtomicBool::new(false),
        })
    }

    /// Create and start a client
    pub fn connect(config: Config) -> Result<Self> {
        let client = Self::new(config)?;
        client.start()?;
        Ok(client)
    }

    /// Register an observer of connection transitions
    ///
    /// Register before `start()` to see the connect handshake.
    pub fn on_connection_state<O>(&self, observer: O)
    where
        O: ConnectionObserver + 'static,
    {
        self.shared.connection.add_observer(Arc::new(observer));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the reactor and block until the handshake settles
    pub fn start(&self) -> Result<()> {
        if self.shared.should_exit() {
            return Err(ClientError::NotRunning);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ClientError::AlreadyStarted);
        }

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        self.shared.queue.set_waker(waker);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("atlaskv-reactor".to_string())
            .spawn(move || Driver::new(shared, poll).run())?;
        *self.reactor.lock() = Some(handle);
        self.spawned.store(true, Ordering::Release);

        let timeout = self.shared.config.connect_timeout + START_GRACE;
        let state = self
            .shared
            .connection
            .wait_until(ConnectionState::is_settled, Some(timeout));

        match state {
            ConnectionState::ConnectError => Err(ClientError::Connect(
                self.shared
                    .connection
                    .last_error()
                    .unwrap_or_else(|| "connect failed".to_string()),
            )),
            ConnectionState::NotConnected | ConnectionState::Connecting => {
                self.stop_signal();
                Err(ClientError::Connect(format!(
                    "handshake did not finish within {:?}",
                    timeout
                )))
            }
            _ => Ok(()),
        }
    }

    /// Ask the reactor to stop without waiting
    pub fn stop_signal(&self) {
        self.shared.request_stop();
    }

    /// Block until the reactor has flushed, disconnected and exited
    ///
    /// Returns immediately if the client was never started or when called
    /// from the reactor thread itself.
    pub fn block_until_stopped(&self) {
        if !self.spawned.load(Ordering::Acquire) {
            return;
        }
        if self.shared.on_reactor_thread() {
            tracing::warn!("block_until_stopped called from the reactor thread");
            return;
        }

        self.shared.wait_exited();

        if let Some(handle) = self.reactor.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Reactor thread panicked");
            }
        }
    }

    /// Stop the reactor and wait for it
    ///
    /// Fails with `Disconnect` if the connection ended in `DisconnectError`.
    /// From a callback this only signals; the reactor finishes on its own.
    pub fn stop(&self) -> Result<()> {
        self.stop_signal();
        if self.shared.on_reactor_thread() {
            return Ok(());
        }
        self.block_until_stopped();

        match self.shared.connection.state() {
            ConnectionState::DisconnectError => Err(ClientError::Disconnect(
                self.shared
                    .connection
                    .last_error()
                    .unwrap_or_else(|| "connection lost".to_string()),
            )),
            _ => Ok(()),
        }
    }

    /// Whether the reactor is up and accepting commands
    pub fn is_running(&self) -> bool {
        self.shared.is_accepting()
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Start building a command whose reply decodes to `T`
    pub fn command<T: FromReply>(&self, text: impl Into<String>) -> CommandBuilder<'_, T> {
        CommandBuilder {
            client: self,
            text: text.into(),
            schedule: Schedule::immediate(),
            callback: None,
            _reply: PhantomData,
        }
    }

    /// Submit a one-shot command with a callback
    pub fn submit<T, F>(&self, text: impl Into<String>, callback: F) -> Result<CommandId>
    where
        T: FromReply,
        F: FnMut(&str, std::result::Result<T, CommandError>) + Send + 'static,
    {
        self.command::<T>(text).callback(callback).submit()
    }

    /// Submit a one-shot command nobody listens to
    pub fn submit_detached<T: FromReply>(&self, text: impl Into<String>) -> Result<CommandId> {
        self.command::<T>(text).submit()
    }

    /// Submit and wait for the outcome, using the configured timeout
    pub fn submit_blocking<T: FromReply>(&self, text: impl Into<String>) -> Result<T> {
        self.submit_blocking_timeout(text, self.shared.config.blocking_timeout)
    }

    /// Submit and wait up to `timeout` (None waits forever)
    ///
    /// A timed out command is canceled.
    pub fn submit_blocking_timeout<T: FromReply>(
        &self,
        text: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        if self.shared.on_reactor_thread() {
            return Err(ClientError::WouldDeadlock);
        }

        let slot = Arc::new(BlockingSlot::<T>::new());
        let filler = Arc::clone(&slot);
        let id = self
            .command::<T>(text)
            .callback(move |_, outcome| filler.fill(outcome))
            .submit()?;

        match slot.wait(&self.shared, id, timeout) {
            Ok(value) => Ok(value),
            Err(CommandError::Timeout) => {
                if let Some(command) = self.shared.registry.get(id) {
                    command.cancel();
                    self.shared.queue.wake();
                }
                Err(CommandError::Timeout.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a command; true if this call canceled it
    ///
    /// False when the command was already canceled or released. A reply
    /// already in flight is still delivered.
    pub fn cancel(&self, id: CommandId) -> bool {
        let Some(command) = self.shared.registry.get(id) else {
            tracing::debug!("Cancel {}: already released", id);
            return false;
        };
        let canceled = command.cancel();
        if canceled {
            tracing::debug!("Canceled {} `{}`", id, command.text());
            self.shared.queue.wake();
        }
        canceled
    }

    fn enqueue(&self, command: Command) -> Result<CommandId> {
        if !self.shared.is_accepting() {
            return Err(ClientError::NotRunning);
        }

        let id = command.id();
        command.transition(CommandState::Queued);
        self.shared.count_created();
        self.shared.registry.insert(Arc::new(command));
        self.shared.queue.enqueue(id);

        // Lost a race with stop(): whoever removes the entry releases it
        if !self.shared.is_accepting() && self.shared.registry.remove(id).is_some() {
            self.shared.count_released();
            return Err(ClientError::NotRunning);
        }

        tracing::trace!("Queued {}", id);
        Ok(id)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// State of a live command; None once released
    pub fn command_state(&self, id: CommandId) -> Option<CommandState> {
        self.shared.registry.get(id).map(|c| c.state())
    }

    /// Last error recorded for a live command
    pub fn command_error(&self, id: CommandId) -> Option<CommandError> {
        self.shared.registry.get(id).and_then(|c| c.last_error())
    }

    /// Replies routed so far
    pub fn commands_processed(&self) -> u64 {
        self.shared.counters().processed
    }

    pub fn stats(&self) -> Stats {
        let counters = self.shared.counters();
        Stats {
            created: counters.created,
            released: counters.released,
            processed: counters.processed,
            abandoned: counters.abandoned,
            registered: self.shared.registry.len(),
            queued: self.shared.queue.len(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// GET a key; None if it does not exist
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.submit_blocking(format!("GET {}", key))
    }

    /// SET a key; the value is sent as a single binary-safe argument
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let reply: String = self.submit_blocking(format!("SET {} \"{}\"", key, value))?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(ClientError::Protocol(format!("unexpected SET reply: {}", reply)))
        }
    }

    /// DEL a key; returns the number of keys removed
    pub fn del(&self, key: &str) -> Result<i64> {
        self.submit_blocking(format!("DEL {}", key))
    }

    pub fn ping(&self) -> Result<String> {
        self.submit_blocking("PING")
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.spawned.load(Ordering::Acquire) && !self.shared.has_exited() {
            self.stop_signal();
            self.block_until_stopped();
        }
    }
}

// =============================================================================
// Command Builder
// =============================================================================

type TypedCallback<T> = Box<dyn FnMut(&str, std::result::Result<T, CommandError>) + Send>;

/// Configures a command before submission
#[must_use = "a command is only sent once submitted"]
pub struct CommandBuilder<'a, T: FromReply> {
    client: &'a Client,
    text: String,
    schedule: Schedule,
    callback: Option<TypedCallback<T>>,
    _reply: PhantomData<fn() -> T>,
}

impl<'a, T: FromReply> CommandBuilder<'a, T> {
    /// Receive the decoded reply or the error
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, std::result::Result<T, CommandError>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Wait before the first send
    pub fn after(mut self, delay: Duration) -> Self {
        self.schedule.delay = delay;
        self
    }

    /// Resend every `interval` until canceled
    pub fn repeat(mut self, interval: Duration) -> Self {
        self.schedule.repeat = interval;
        self
    }

    /// Hand the command to the reactor
    pub fn submit(self) -> Result<CommandId> {
        let shared = &self.client.shared;
        let command = Command::typed::<T, _>(
            shared.next_id(),
            Request::new(self.text),
            self.schedule,
            self.callback,
        );
        self.client.enqueue(command)
    }
}

// =============================================================================
// Blocking Slot
// =============================================================================

/// Where a blocking call's outcome lands
struct BlockingSlot<T> {
    outcome: Mutex<Option<std::result::Result<T, CommandError>>>,
    ready: Condvar,
}

impl<T> BlockingSlot<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn fill(&self, outcome: std::result::Result<T, CommandError>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.ready.notify_all();
        }
    }

    /// Wait for the outcome of `id`
    ///
    /// A command released without an outcome yields `Disconnected`.
    fn wait(
        &self,
        shared: &Shared,
        id: CommandId,
        timeout: Option<Duration>,
    ) -> std::result::Result<T, CommandError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.outcome.lock();

        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            if !shared.registry.contains(id) {
                return Err(CommandError::Disconnected);
            }

            let now = Instant::now();
            let wait = match deadline {
                Some(deadline) if now >= deadline => return Err(CommandError::Timeout),
                Some(deadline) => (deadline - now).min(RELEASE_CHECK_INTERVAL),
                None => RELEASE_CHECK_INTERVAL,
            };
            self.ready.wait_for(&mut slot, wait);
        }
    }
}
