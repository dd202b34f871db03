//! Command Registry
//!
//! Owns id → command for every command between submission and release.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::ReplyKind;
use crate::error::{ClientError, Result};
use super::{Command, CommandId};

/// Registry of live commands
///
/// One map holding commands tagged with their reply kind. Lookups clone the
/// `Arc` and drop the lock right away, so callbacks never run under it.
#[derive(Default)]
pub struct Registry {
    commands: Mutex<HashMap<CommandId, Arc<Command>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command; returns the previous holder of the id, if any
    pub fn insert(&self, command: Arc<Command>) -> Option<Arc<Command>> {
        let id = command.id();
        let previous = self.commands.lock().insert(id, command);
        if previous.is_some() {
            tracing::error!("Command {} registered twice", id);
        }
        previous
    }

    /// Look up a command that must be registered
    pub fn find(&self, id: CommandId) -> Result<Arc<Command>> {
        self.get(id).ok_or(ClientError::CommandNotFound(id))
    }

    /// Look up a command that may already be gone
    pub fn get(&self, id: CommandId) -> Option<Arc<Command>> {
        self.commands.lock().get(&id).cloned()
    }

    /// Look up a command only if it expects `kind`
    pub fn find_of_kind(&self, kind: ReplyKind, id: CommandId) -> Option<Arc<Command>> {
        self.get(id).filter(|c| c.kind() == kind)
    }

    pub fn remove(&self, id: CommandId) -> Option<Arc<Command>> {
        self.commands.lock().remove(&id)
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.commands.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<CommandId> {
        let mut ids: Vec<CommandId> = self.commands.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every registered command
    pub fn snapshot(&self) -> Vec<Arc<Command>> {
        self.commands.lock().values().cloned().collect()
    }

    /// Number of registered commands per reply kind
    pub fn partition_sizes(&self) -> HashMap<ReplyKind, usize> {
        let commands = self.commands.lock();
        let mut sizes = HashMap::new();
        for command in commands.values() {
            *sizes.entry(command.kind()).or_insert(0) += 1;
        }
        sizes
    }

    /// Remove and return everything still registered
    pub fn drain(&self) -> Vec<Arc<Command>> {
        self.commands.lock().drain().map(|(_, c)| c).collect()
    }
}
