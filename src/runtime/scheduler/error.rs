//! Scheduler errors.

use crate::io::IoError;
use crate::linker::LinkError;
use crate::runtime::ids::{TargetId, ThreadId};
use crate::runtime::primitives::BlockError;
use crate::worker::BridgeError;

/// Errors surfaced by scheduler operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The backend referenced a thread the host does not know.
    #[error("Cannot find thread {0}")]
    NotFound(ThreadId),
    /// The backend referenced an opcode with no implementation.
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("Not a hat: {0}")]
    UnknownHat(String),
    #[error("Cannot find target with id {0}")]
    UnknownTarget(TargetId),
    #[error("Primitive {opcode} failed: {source}")]
    Primitive {
        opcode: String,
        #[source]
        source: BlockError,
    },
    #[error("Scripts reference unregistered opcodes: {}", .0.join(", "))]
    UnregisteredOpcodes(Vec<String>),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl SchedulerError {
    /// Protocol desyncs: the backend and the host disagree about what exists.
    pub fn is_desync(&self) -> bool {
        matches!(self, SchedulerError::NotFound(_) | SchedulerError::UnknownOpcode(_))
    }
}

/// Scheduler result alias.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
