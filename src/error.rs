//! Error types for the AtlasKV client
//!
//! Two layers:
//! - [`CommandError`]: the outcome delivered to a single command's callback.
//!   Cheap to clone so it can be stored as a command's last error and handed
//!   to observers as well.
//! - [`ClientError`]: everything the public API can return.

use thiserror::Error;

use crate::command::CommandId;
use crate::dispatch::ReplyKind;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failure delivered to a command's error path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    // -------------------------------------------------------------------------
    // Reply Errors
    // -------------------------------------------------------------------------
    #[error("Server error reply: {0}")]
    ErrorReply(String),

    #[error("Nil reply")]
    NilReply,

    #[error("Wrong reply type: expected {expected}, got {found}")]
    WrongType {
        expected: ReplyKind,
        found: &'static str,
    },

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Send rejected: {0}")]
    Send(String),

    #[error("Connection closed before a reply arrived")]
    Disconnected,

    // -------------------------------------------------------------------------
    // Blocking Call Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for reply")]
    Timeout,
}

/// Unified error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Connection Errors
    // -------------------------------------------------------------------------
    #[error("Could not connect: {0}")]
    Connect(String),

    #[error("Could not disconnect: {0}")]
    Disconnect(String),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Command {0} not found in registry")]
    CommandNotFound(CommandId),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Client is not running")]
    NotRunning,

    #[error("Client was already started")]
    AlreadyStarted,

    #[error("Blocking call issued from the reactor thread")]
    WouldDeadlock,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// The per-command error wrapped by this error, if any
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            ClientError::Command(e) => Some(e),
            _ => None,
        }
    }
}
