//! Command entity
//!
//! One logical request with its callback and scheduling parameters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::dispatch::{ExpectedReply, FromReply, ReplyKind, Value};
use crate::error::CommandError;
use crate::protocol::Request;
use super::{CommandId, CommandState, Schedule};

/// Type-erased callback: request text plus decoded outcome
pub type Callback = Box<dyn FnMut(&str, Result<Value, CommandError>) + Send>;

/// A command shared between the registry, the reactor and caller threads
///
/// ## Concurrency:
/// - `canceled`: set from any thread, read by the reactor
/// - `pending`, `state`, `last_error`: written by the reactor only
/// - `callback`: invoked by the reactor only, never under the registry lock
pub struct Command {
    id: CommandId,
    request: Request,
    expected: ExpectedReply,
    schedule: Schedule,
    callback: Mutex<Option<Callback>>,

    /// Requests accepted by the transport whose reply has not arrived yet
    pending: AtomicUsize,

    canceled: AtomicBool,

    /// Set once an outcome has been delivered after cancellation
    settled: AtomicBool,

    state: Mutex<CommandState>,
    last_error: Mutex<Option<CommandError>>,
}

impl Command {
    /// Create a command with an already erased callback
    pub fn new(
        id: CommandId,
        request: Request,
        expected: ExpectedReply,
        schedule: Schedule,
        callback: Option<Callback>,
    ) -> Self {
        Self {
            id,
            request,
            expected,
            schedule,
            callback: Mutex::new(callback),
            pending: AtomicUsize::new(0),
            canceled: AtomicBool::new(false),
            settled: AtomicBool::new(false),
            state: Mutex::new(CommandState::Created),
            last_error: Mutex::new(None),
        }
    }

    /// Create a command whose callback receives `T`
    pub fn typed<T, F>(
        id: CommandId,
        request: Request,
        schedule: Schedule,
        callback: Option<F>,
    ) -> Self
    where
        T: FromReply,
        F: FnMut(&str, Result<T, CommandError>) + Send + 'static,
    {
        Self::new(id, request, T::expected(), schedule, callback.map(erase::<T, F>))
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn text(&self) -> &str {
        self.request.text()
    }

    pub fn expected(&self) -> ExpectedReply {
        self.expected
    }

    pub fn kind(&self) -> ReplyKind {
        self.expected.kind
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn is_repeating(&self) -> bool {
        self.schedule.is_repeating()
    }

    // -------------------------------------------------------------------------
    // Pending replies
    // -------------------------------------------------------------------------

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Record a request accepted by the transport
    pub fn mark_sent(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Record an arrived reply; false if none was outstanding
    pub fn mark_replied(&self) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Flag the command as canceled; true only for the call that flipped it
    pub fn cancel(&self) -> bool {
        let flipped = !self.canceled.swap(true, Ordering::AcqRel);
        if flipped {
            let mut state = self.state.lock();
            if state.can_transition_to(CommandState::Canceled) {
                *state = CommandState::Canceled;
            }
        }
        flipped
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn state(&self) -> CommandState {
        *self.state.lock()
    }

    /// Move to `next`; illegal steps are logged and ignored
    pub fn transition(&self, next: CommandState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return true;
        }
        // A canceled command keeps its state until it is released
        if *state == CommandState::Canceled && next != CommandState::Released {
            return false;
        }
        if !state.can_transition_to(next) {
            tracing::warn!(
                "Command {} ({}): illegal transition {} -> {}",
                self.id,
                self.text(),
                *state,
                next
            );
            return false;
        }
        *state = next;
        true
    }

    /// Whether nothing keeps the command alive any more
    ///
    /// `timer_armed` comes from the scheduler, which the command cannot see.
    pub fn is_releasable(&self, timer_armed: bool) -> bool {
        if timer_armed || self.pending() > 0 {
            return false;
        }
        self.is_canceled() || self.state() == CommandState::Completed
    }

    // -------------------------------------------------------------------------
    // Outcome
    // -------------------------------------------------------------------------

    pub fn last_error(&self) -> Option<CommandError> {
        self.last_error.lock().clone()
    }

    /// Deliver an outcome to the callback, recording any error
    ///
    /// Once canceled, only the first outcome reaches the callback; false
    /// when the outcome was dropped.
    pub fn invoke(&self, outcome: Result<Value, CommandError>) -> bool {
        if self.is_canceled() && self.settled.swap(true, Ordering::AcqRel) {
            tracing::trace!("Dropping outcome for canceled command {}", self.id);
            return false;
        }

        if let Err(e) = &outcome {
            *self.last_error.lock() = Some(e.clone());
        }

        let mut callback = self.callback.lock();
        if let Some(callback) = callback.as_mut() {
            callback(self.request.text(), outcome);
        }
        true
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("text", &self.text())
            .field("expected", &self.expected)
            .field("schedule", &self.schedule)
            .field("pending", &self.pending())
            .field("canceled", &self.is_canceled())
            .field("settled", &self.settled.load(Ordering::Acquire))
            .field("state", &self.state())
            .finish()
    }
}

/// Wrap a typed callback so the registry can hold it
fn erase<T, F>(mut callback: F) -> Callback
where
    T: FromReply,
    F: FnMut(&str, Result<T, CommandError>) + Send + 'static,
{
    Box::new(move |text, outcome| {
        let typed = outcome.and_then(|value| {
            T::from_value(value).ok_or(CommandError::WrongType {
                expected: T::KIND,
                found: "value decoded for another kind",
            })
        });
        callback(text, typed)
    })
}
