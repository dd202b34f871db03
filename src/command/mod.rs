//! Command Module
//!
//! Lifecycle of a single request, from submission to release.
//!
//! ## Responsibilities
//! - Give every command a process-unique id, the only cross-thread handle
//! - Hold the callback, schedule, pending count and cancel flag
//! - Hand ids from caller threads to the reactor thread in FIFO order
//!
//! ## Lifecycle
//! ```text
//! Created ─► Queued ─► Registered ─┬─► Submitted ─► AwaitingReply ─┬─► Completed ─┐
//!                                  │        ▲                      │              │
//!                                  └─► Armed ◄─────────────────────┘              ├─► Released
//!                                                                                 │
//!     (any non-terminal state) ──────────────────────────────► Canceled ──────────┘
//! ```
//!
//! A command is released once it is completed or canceled, has no reply
//! outstanding, and its timer is disarmed.

mod entry;
mod registry;
mod queue;

pub use entry::{Callback, Command};
pub use registry::Registry;
pub use queue::CommandQueue;

use std::fmt;
use std::time::Duration;

/// Process-unique command identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// When a command is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Schedule {
    /// Wait before the first send
    pub delay: Duration,

    /// Interval between sends; zero sends once
    pub repeat: Duration,
}

impl Schedule {
    /// Send once, right away
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Send once after `delay`
    pub fn after(delay: Duration) -> Self {
        Self {
            delay,
            repeat: Duration::ZERO,
        }
    }

    /// Send after `delay`, then every `repeat`
    pub fn repeating(delay: Duration, repeat: Duration) -> Self {
        Self { delay, repeat }
    }

    /// Both zero: submitted directly, no timer
    pub fn is_immediate(&self) -> bool {
        self.delay.is_zero() && self.repeat.is_zero()
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat.is_zero()
    }
}

/// Command lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandState {
    Created,
    Queued,
    Registered,
    Submitted,
    AwaitingReply,
    Armed,
    Completed,
    Canceled,
    Released,
}

impl CommandState {
    pub fn is_terminal(self) -> bool {
        self == CommandState::Released
    }

    /// Whether `self → next` is a legal step
    pub fn can_transition_to(self, next: CommandState) -> bool {
        use CommandState::*;

        match (self, next) {
            (Released, _) => false,
            (Canceled, Canceled) => false,
            (Completed, Canceled) => false,
            (_, Canceled) => true,

            (Created, Queued)
            | (Queued, Registered)
            | (Registered, Submitted)
            | (Registered, Armed)
            | (Submitted, AwaitingReply)
            | (AwaitingReply, Completed)
            | (AwaitingReply, Armed)
            | (Armed, Submitted)
            | (Completed, Released)
            | (Canceled, Released) => true,

            // A send failure completes a one-shot command before it is ever submitted
            (Registered, Completed) | (Armed, Completed) => true,

            // Repeating commands may have several requests in flight
            (AwaitingReply, Submitted) | (Submitted, Armed) => true,

            _ => false,
        }
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
