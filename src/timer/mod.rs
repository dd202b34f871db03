//! Timer Module
//!
//! Delayed and repeating submissions.
//!
//! ## Design
//! One scheduler per reactor, keyed by command id, instead of one OS timer
//! per command. Deadlines live in a min-heap; cancellation bumps a
//! generation so stale heap entries are skipped when they surface.
//!
//! ```text
//! arm(id, delay, repeat) ──► heap: (deadline, generation, id)
//!                               │
//!   fire_due(now) ◄─────────────┘  pops due entries,
//!        │                         re-pushes repeating ones at deadline + repeat
//!        ▼
//!   [ids to submit]
//! ```

mod scheduler;

pub use scheduler::TimerScheduler;
