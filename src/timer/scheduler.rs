//! Timer scheduler
//!
//! Min-heap of deadlines with generation-tagged lazy cancellation.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::command::CommandId;

/// A heap slot; ordered by deadline first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Instant,
    generation: u64,
    id: CommandId,
}

/// Live timer for one command
#[derive(Debug, Clone, Copy)]
struct Entry {
    generation: u64,
    repeat: Duration,
}

/// Schedules command ids for later submission
///
/// Not thread-safe; owned by the reactor thread.
#[derive(Debug, Default)]
pub struct TimerScheduler {
    heap: BinaryHeap<Reverse<Deadline>>,
    entries: HashMap<CommandId, Entry>,
    next_generation: u64,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `id` after `delay`, then every `repeat` (zero repeat fires once)
    ///
    /// Re-arming an armed id replaces its timer.
    pub fn arm(&mut self, id: CommandId, delay: Duration, repeat: Duration, now: Instant) {
        self.next_generation += 1;
        let generation = self.next_generation;

        self.entries.insert(id, Entry { generation, repeat });
        self.heap.push(Reverse(Deadline {
            at: now + delay,
            generation,
            id,
        }));
    }

    /// Stop future firings; false if nothing was armed
    pub fn disarm(&mut self, id: CommandId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn is_armed(&self, id: CommandId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|Reverse(d)| d.at)
    }

    /// Time until the next deadline, saturating at zero
    pub fn time_until_next(&mut self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|at| at.saturating_duration_since(now))
    }

    /// Pop every timer due at `now`, in deadline order
    ///
    /// Repeating timers are re-pushed at `deadline + repeat`. A timer that
    /// fell more than one interval behind restarts from `now` instead of
    /// firing a burst of catch-up ticks.
    pub fn fire_due(&mut self, now: Instant) -> Vec<CommandId> {
        let mut fired = Vec::new();

        while let Some(Reverse(top)) = self.heap.peek().copied() {
            if top.at > now {
                break;
            }
            self.heap.pop();

            let entry = match self.entries.get(&top.id) {
                Some(entry) if entry.generation == top.generation => *entry,
                _ => continue, // disarmed or re-armed
            };

            if entry.repeat.is_zero() {
                self.entries.remove(&top.id);
            } else {
                let mut next = top.at + entry.repeat;
                if next <= now {
                    next = now + entry.repeat;
                }
                self.heap.push(Reverse(Deadline { at: next, ..top }));
            }

            fired.push(top.id);
        }

        fired
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            let live = self
                .entries
                .get(&top.id)
                .is_some_and(|e| e.generation == top.generation);
            if live {
                break;
            }
            self.heap.pop();
        }
    }
}
