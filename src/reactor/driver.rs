//! Reactor Driver
//!
//! Runs the event loop on the reactor thread.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Events, Poll};

use crate::command::{Command, CommandId, CommandState};
use crate::dispatch::dispatch_reply;
use crate::error::{ClientError, CommandError, Result};
use crate::network::{Connection, ConnectionState, CONNECTION_TOKEN};
use crate::protocol::Reply;
use crate::timer::TimerScheduler;
use super::Shared;

/// Capacity of the readiness buffer; the driver only polls two tokens
const EVENTS_CAPACITY: usize = 64;

/// Owns the connection, the timers and every transport call
pub(crate) struct Driver {
    shared: Arc<Shared>,
    poll: Poll,
    events: Events,
    timers: TimerScheduler,
    connection: Option<Connection>,
}

impl Driver {
    /// `poll` must already carry the queue's waker
    pub fn new(shared: Arc<Shared>, poll: Poll) -> Self {
        Self {
            shared,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            timers: TimerScheduler::new(),
            connection: None,
        }
    }

    /// Connect, loop until stopped, then shut down
    pub fn run(mut self) {
        self.shared.set_reactor_thread();

        if self.connect() {
            self.event_loop();
            self.shutdown();
        }

        self.finish();
    }

    // =========================================================================
    // Connect
    // =========================================================================

    /// Drive the handshake to Connected or ConnectError
    fn connect(&mut self) -> bool {
        let config = &self.shared.config;
        let monitor = &self.shared.connection;

        monitor.transition(ConnectionState::Connecting, None);
        tracing::debug!("Connecting to {}", config.endpoint);

        let mut connection = match Connection::open(config, self.poll.registry()) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("Could not connect to {}: {}", config.endpoint, e);
                monitor.transition(ConnectionState::ConnectError, Some(e.to_string()));
                return false;
            }
        };

        let deadline = Instant::now() + config.connect_timeout;
        loop {
            let failure = match connection.poll_connect(self.poll.registry()) {
                Ok(true) => break,
                Ok(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        Some(format!("timed out after {:?}", config.connect_timeout))
                    } else if self.shared.should_exit() {
                        Some("stopped while connecting".to_string())
                    } else {
                        let wait = (deadline - now).min(config.poll_interval);
                        match self.poll.poll(&mut self.events, Some(wait)) {
                            Ok(()) => None,
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => None,
                            Err(e) => Some(e.to_string()),
                        }
                    }
                }
                Err(e) => Some(e.to_string()),
            };

            if let Some(message) = failure {
                tracing::error!("Could not connect to {}: {}", config.endpoint, message);
                monitor.transition(ConnectionState::ConnectError, Some(message));
                return false;
            }
        }

        tracing::info!("Connected to {}", connection.peer());
        self.connection = Some(connection);

        // Open for submissions before anyone blocked in start() wakes up
        self.shared.set_accepting(true);
        monitor.transition(ConnectionState::Connected, None);
        true
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    fn event_loop(&mut self) {
        let interval = self.shared.config.poll_interval;

        while !self.shared.should_exit() {
            if let Err(e) = self.turn(interval) {
                self.fail_connection(e);
                self.shared.request_stop();
            }
        }
    }

    /// One iteration: poll, read, drain, fire, flush, route
    fn turn(&mut self, max_wait: Duration) -> Result<()> {
        let timeout = match self.timers.time_until_next(Instant::now()) {
            Some(until) => until.min(max_wait),
            None => max_wait,
        };

        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }

        // Waker events need no handling; the queue is drained every turn
        let readable = self.events.iter().any(|event| {
            event.token() == CONNECTION_TOKEN
                && (event.is_readable() || event.is_read_closed() || event.is_error())
        });

        let mut replies = Vec::new();
        let mut closed = false;
        if readable {
            if let Some(connection) = self.connection.as_mut() {
                let outcome = connection.read_replies()?;
                replies = outcome.replies;
                closed = outcome.closed;
            }
        }

        self.process_queued();
        self.fire_timers(Instant::now());
        let flushed = self.flush();

        for (id, reply) in replies {
            self.on_reply(id, reply);
        }

        if closed {
            return Err(ClientError::Disconnect(
                "connection closed by server".to_string(),
            ));
        }
        flushed
    }

    /// Move queued ids into the reactor's hands
    fn process_queued(&mut self) {
        let ids = self.shared.queue.drain();
        if ids.is_empty() {
            return;
        }
        tracing::trace!("Draining {} queued commands", ids.len());

        for id in ids {
            let command = match self.shared.registry.find(id) {
                Ok(command) => command,
                Err(e) => {
                    tracing::error!("{}", e);
                    continue;
                }
            };

            if command.is_canceled() {
                self.release(&command);
                continue;
            }

            command.transition(CommandState::Registered);

            let schedule = command.schedule();
            if schedule.is_immediate() {
                self.submit(&command);
            } else {
                self.timers
                    .arm(id, schedule.delay, schedule.repeat, Instant::now());
                command.transition(CommandState::Armed);
                tracing::trace!(
                    "Armed {} `{}` (delay {:?}, repeat {:?})",
                    id,
                    command.text(),
                    schedule.delay,
                    schedule.repeat
                );
            }
        }
    }

    fn fire_timers(&mut self, now: Instant) {
        for id in self.timers.fire_due(now) {
            let command = match self.shared.registry.find(id) {
                Ok(command) => command,
                Err(e) => {
                    tracing::error!("{}", e);
                    self.timers.disarm(id);
                    continue;
                }
            };

            // The timer stops itself on the first firing after a cancel
            if command.is_canceled() {
                self.timers.disarm(id);
                self.try_release(&command);
                continue;
            }

            // At most one request of a repeating command is in flight
            if command.pending() > 0 {
                tracing::trace!("Skipping tick for {}, reply outstanding", id);
                continue;
            }

            self.submit(&command);
        }
    }

    fn flush(&mut self) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        for id in connection.flush(self.poll.registry())? {
            if let Some(command) = self.shared.registry.get(id) {
                command.transition(CommandState::AwaitingReply);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Hand a command's request to the transport
    fn submit(&mut self, command: &Arc<Command>) {
        let sent = match self.connection.as_mut() {
            Some(connection) => connection.send(command.request(), command.id()),
            None => Err(CommandError::Send("not connected".to_string())),
        };

        match sent {
            Ok(()) => {
                command.mark_sent();
                command.transition(CommandState::Submitted);
                tracing::trace!("Submitted {} `{}`", command.id(), command.text());
            }
            Err(e) => {
                tracing::error!("Could not send {} `{}`: {}", command.id(), command.text(), e);
                self.shared.connection.notify_send_error(command.id(), &e);
                command.invoke(Err(e));
                if !command.is_repeating() {
                    command.transition(CommandState::Completed);
                }
                self.try_release(command);
            }
        }
    }

    /// Deliver one reply to its command
    fn on_reply(&mut self, id: CommandId, reply: Reply) {
        let command = match self.shared.registry.find(id) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("Dropping reply: {}", e);
                return;
            }
        };

        if !command.mark_replied() {
            tracing::warn!("Reply for {} with no request outstanding", id);
        }
        self.shared.count_processed();

        if command.state() == CommandState::Submitted {
            command.transition(CommandState::AwaitingReply);
        }

        let outcome = dispatch_reply(command.text(), command.expected(), reply);
        command.invoke(outcome);

        if command.is_repeating() {
            command.transition(CommandState::Armed);
        } else {
            command.transition(CommandState::Completed);
        }
        self.try_release(&command);
    }

    /// Release `command` if nothing keeps it alive; true if released
    fn try_release(&mut self, command: &Arc<Command>) -> bool {
        let armed = self.timers.is_armed(command.id());
        if command.is_releasable(armed) {
            self.release(command);
            true
        } else {
            false
        }
    }

    fn release(&mut self, command: &Arc<Command>) {
        if self.shared.registry.remove(command.id()).is_some() {
            command.transition(CommandState::Released);
            self.shared.count_released();
            tracing::trace!("Released {} `{}`", command.id(), command.text());
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Drop the connection after an I/O failure while connected
    fn fail_connection(&mut self, error: ClientError) {
        tracing::error!("Connection failed: {}", error);

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.disconnect(self.poll.registry()) {
                tracing::debug!("Closing failed connection: {}", e);
            }
        }
        self.shared
            .connection
            .transition(ConnectionState::DisconnectError, Some(error.to_string()));
    }

    /// Cancel everything, collect trailing replies, then disconnect
    fn shutdown(&mut self) {
        tracing::debug!("Stopping reactor");
        self.shared.set_accepting(false);

        let commands = self.shared.registry.snapshot();
        for command in &commands {
            command.cancel();
        }

        // Ids still queued are released by the drain itself
        self.process_queued();

        for command in &commands {
            self.timers.disarm(command.id());
            self.try_release(command);
        }

        let interval = self.shared.config.poll_interval;
        for _ in 0..self.shared.config.shutdown_flush_iterations {
            if self.connection.is_none() {
                // Nothing more can arrive; just release what was queued
                self.process_queued();
                break;
            }
            if let Err(e) = self.turn(interval) {
                self.fail_connection(e);
                continue;
            }
            if self.shared.registry.is_empty() && self.shared.queue.is_empty() {
                break;
            }
        }

        self.disconnect();
    }

    fn disconnect(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let monitor = &self.shared.connection;

        monitor.transition(ConnectionState::Disconnecting, None);
        match connection.disconnect(self.poll.registry()) {
            Ok(()) => {
                tracing::info!("Disconnected from {}", connection.peer());
                monitor.transition(ConnectionState::Disconnected, None);
            }
            Err(e) => {
                tracing::error!("Could not disconnect from {}: {}", connection.peer(), e);
                monitor.transition(ConnectionState::DisconnectError, Some(e.to_string()));
            }
        }
    }

    /// Leak check, abandon leftovers, wake waiters
    fn finish(&mut self) {
        self.shared.set_accepting(false);
        self.shared.queue.drain();

        let counters = self.shared.counters();
        if counters.created != counters.released {
            tracing::error!(
                "All commands were not freed! {}/{}",
                counters.released,
                counters.created
            );
        }

        for command in self.shared.registry.drain() {
            command.cancel();
            self.timers.disarm(command.id());

            // Only a command still owed a reply gets a final outcome; invoke
            // drops it if the command already settled after a cancel
            if command.pending() > 0 {
                command.invoke(Err(CommandError::Disconnected));
            }
            command.transition(CommandState::Released);
            self.shared.count_abandoned();
            tracing::debug!("Abandoned {} `{}`", command.id(), command.text());
        }

        tracing::debug!(
            "Reactor exited, {} replies processed",
            self.shared.counters().processed
        );
        self.shared.mark_exited();
    }
}
