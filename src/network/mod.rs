//! Network Module
//!
//! The socket to the server and its connection state.
//!
//! ## Architecture
//! - One non-blocking connection, owned by the reactor thread
//! - Requests are pipelined; replies are matched to ids in send order
//! - State transitions are published to observers on any thread

mod connection;
mod state;

pub use connection::{Connection, ReadOutcome, CONNECTION_TOKEN, WAKER_TOKEN};
pub use state::{ConnectionMonitor, ConnectionObserver, ConnectionState};
