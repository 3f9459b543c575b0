//! Error types.
//!
//! | Error | Raised by | Reaches the tick loop? |
//! |-------|-----------|------------------------|
//! | [`RegistryError`] | role lookup | no, agent is reset |
//! | [`TaskError`] | task board operations | no, agent re-polls |
//! | [`MemoryError`] | memory decode / migration | no, memory reinitialized |
//! | [`DispatchError`] | a single agent's state handler | no, isolated and counted |
//! | [`StoreError`] | store encode / decode | logged |
//! | [`ConfigError`] | configuration loading | yes, at startup |

use thiserror::Error;

use crate::memory::StateTag;
use crate::roles::RoleTag;
use crate::types::{AgentId, EntityId, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no strategy registered for role {0}")]
    UnknownRole(RoleTag),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("target {0} does not resolve")]
    InvalidTarget(EntityId),
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory does not decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no migration from version {from}")]
    NoMigration { from: u32 },
    #[error("migration from version {from} failed: {reason}")]
    Migration { from: u32, reason: String },
    #[error("memory version {found} is newer than {current}")]
    FromFuture { found: u32, current: u32 },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{role} has no handler for state {state:?}")]
    UnhandledState { role: RoleTag, state: StateTag },
    /// The handler needed its recorded target and it no longer resolves.
    /// The engine clears the reference; the agent re-polls next tick.
    #[error("{agent}: target {target} no longer resolves")]
    MissingTarget { agent: AgentId, target: EntityId },
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot encode {scope}: {source}")]
    Encode {
        scope: String,
        source: serde_json::Error,
    },
    #[error("cannot decode {scope}: {source}")]
    Decode {
        scope: String,
        source: serde_json::Error,
    },
    #[error("{scope} has version {found}, expected {expected}")]
    Version {
        scope: String,
        found: u32,
        expected: u32,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
