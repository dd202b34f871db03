//! Connection state
//!
//! State machine for the single server connection, plus the condvar that
//! lets `start()` block until the handshake settles.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::command::CommandId;
use crate::error::CommandError;

/// Connection lifecycle
///
/// ```text
/// NotConnected → Connecting → Connected | ConnectError
/// Connected → Disconnecting → Disconnected | DisconnectError
/// Connected → DisconnectError            (peer closed or socket failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NotConnected,
    Connecting,
    Connected,
    ConnectError,
    Disconnecting,
    Disconnected,
    DisconnectError,
}

impl ConnectionState {
    /// Whether the connect handshake has finished, one way or the other
    pub fn is_settled(self) -> bool {
        !matches!(self, ConnectionState::NotConnected | ConnectionState::Connecting)
    }

    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (NotConnected, Connecting)
                | (NotConnected, ConnectError)
                | (Connecting, Connected)
                | (Connecting, ConnectError)
                | (Connected, Disconnecting)
                | (Connected, DisconnectError)
                | (Disconnecting, Disconnected)
                | (Disconnecting, DisconnectError)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Receives connection events
///
/// Called on the reactor thread; keep it short. Any `Fn(ConnectionState)`
/// closure is an observer.
pub trait ConnectionObserver: Send + Sync {
    /// Called on every state transition
    fn on_state(&self, state: ConnectionState);

    /// Called when the transport refuses a request
    fn on_send_error(&self, _id: CommandId, _error: &CommandError) {}
}

impl<F> ConnectionObserver for F
where
    F: Fn(ConnectionState) + Send + Sync,
{
    fn on_state(&self, state: ConnectionState) {
        self(state)
    }
}

struct Inner {
    state: ConnectionState,
    error: Option<String>,
}

/// Shared view of the connection state
pub struct ConnectionMonitor {
    inner: Mutex<Inner>,
    changed: Condvar,
    observers: Mutex<Vec<Arc<dyn ConnectionObserver>>>,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::NotConnected,
                error: None,
            }),
            changed: Condvar::new(),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Message of the last failed transition
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.lock().push(observer);
    }

    /// Move to `next`, wake waiters and notify observers
    ///
    /// Illegal transitions are logged and leave the state untouched.
    pub fn transition(&self, next: ConnectionState, error: Option<String>) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.state.can_transition_to(next) {
                tracing::warn!("Illegal connection transition {} -> {}", inner.state, next);
                return false;
            }
            tracing::debug!("Connection {} -> {}", inner.state, next);
            inner.state = next;
            if error.is_some() {
                inner.error = error;
            }
        }
        self.changed.notify_all();

        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_state(next);
        }
        true
    }

    /// Forward a send failure to every observer
    pub fn notify_send_error(&self, id: CommandId, error: &CommandError) {
        let observers = self.observers.lock().clone();
        for observer in observers {
            observer.on_send_error(id, error);
        }
    }

    /// Block until `done(state)` holds or `timeout` passes; returns the last state seen
    pub fn wait_until<F>(&self, done: F, timeout: Option<Duration>) -> ConnectionState
    where
        F: Fn(ConnectionState) -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        while !done(inner.state) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                None => self.changed.wait(&mut inner),
            }
        }

        inner.state
    }
}
