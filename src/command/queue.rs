//! Command Queue
//!
//! Hand-off of command ids from caller threads to the reactor thread.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::CommandId;

/// FIFO of ids waiting to be picked up by the reactor
///
/// Producers are arbitrary threads; the reactor is the only consumer. Every
/// enqueue pokes the reactor's waker so a blocked poll returns right away.
/// Without a waker the reactor still sees new ids within one poll interval.
#[derive(Default)]
pub struct CommandQueue {
    ids: Mutex<VecDeque<CommandId>>,
    waker: OnceLock<Arc<mio::Waker>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the reactor's waker; only the first call takes effect
    pub fn set_waker(&self, waker: Arc<mio::Waker>) -> bool {
        self.waker.set(waker).is_ok()
    }

    /// Append an id and wake the reactor
    pub fn enqueue(&self, id: CommandId) {
        self.ids.lock().push_back(id);
        self.wake();
    }

    /// Take every queued id, oldest first
    pub fn drain(&self) -> Vec<CommandId> {
        self.ids.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Interrupt the reactor's poll
    pub fn wake(&self) {
        if let Some(waker) = self.waker.get() {
            if let Err(e) = waker.wake() {
                tracing::warn!("Could not wake reactor: {}", e);
            }
        }
    }
}
