//! # AtlasKV Client
//!
//! An asynchronous client for a single Redis-compatible key-value server:
//! - Commands submitted from any thread, executed by one reactor thread
//! - Typed replies matched back to per-command callbacks
//! - Delayed and repeating commands on a shared timer scheduler
//! - Blocking helpers for callers that just want the answer
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Client                               │
//! │          (submit / submit_blocking / cancel / stop)          │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ insert                       │ enqueue + wake
//!                ▼                              ▼
//!         ┌─────────────┐               ┌──────────────┐
//!         │  Registry   │               │ CommandQueue │
//!         │ (id → Cmd)  │               │    (FIFO)    │
//!         └──────┬──────┘               └──────┬───────┘
//!                │                             │ drain
//! ┌──────────────▼─────────────────────────────▼────────────────┐
//! │                   Reactor (one thread)                       │
//! │       mio Poll  ·  TimerScheduler  ·  Connection (RESP)      │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                │ (id, Reply)
//!                                ▼
//!                       ┌─────────────────┐
//!                       │ Reply Dispatcher │ ──► callback
//!                       └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod dispatch;
pub mod command;
pub mod timer;
pub mod network;
mod reactor;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ClientError, CommandError, Result};
pub use config::{Config, ConfigBuilder, Endpoint};
pub use client::{Client, CommandBuilder, Stats};
pub use command::{CommandId, CommandState};
pub use dispatch::{ExpectedReply, FromReply, ReplyKind, Value};
pub use network::{ConnectionObserver, ConnectionState};
pub use protocol::{Reply, Request};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the AtlasKV client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
