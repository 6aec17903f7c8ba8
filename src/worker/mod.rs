//! Worker bridge: the asynchronous boundary to the execution backend.
//!
//! The scheduler and the backend share no memory. The backend asks for
//! primitives with BlockOP messages carrying its own tokens; the host
//! echoes each token back exactly once in a ResultValue (or ResultError).
//! Host requests use host tokens and are awaited with a deadline.

pub mod backend;
pub mod bridge;
pub mod protocol;
pub mod script;
pub mod tokens;
pub mod transport;

pub use backend::{Backend, ScriptWorker};
pub use bridge::WorkerBridge;
pub use protocol::{FromVm, ThreadStart, ToVm};
pub use tokens::{PendingTokens, TokenError};
pub use transport::{InlineTransport, ThreadTransport, Transport};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// On the scheduler's thread, driven by each send.
    #[default]
    Inline,
    /// On a dedicated OS thread.
    Thread,
}

/// Bridge failures.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Worker disconnected")]
    Disconnected,
    #[error("No reply to {request} within {waited:?}")]
    Timeout {
        request: &'static str,
        waited: Duration,
    },
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("Backend rejected the request: {0}")]
    Rejected(String),
    #[error("Cannot spawn worker thread: {0}")]
    Spawn(String),
}

/// Build a bridge to a [`ScriptWorker`] in the requested mode.
pub fn script_worker_bridge(
    mode: WorkerMode,
    request_timeout: Duration,
    block_timeout: Option<Duration>,
) -> Result<WorkerBridge, BridgeError> {
    let worker = ScriptWorker::new(block_timeout);
    let transport: Box<dyn Transport> = match mode {
        WorkerMode::Inline => Box::new(InlineTransport::new(worker)),
        WorkerMode::Thread => Box::new(ThreadTransport::spawn(worker)?),
    };
    Ok(WorkerBridge::new(transport, request_timeout))
}

#[cfg(test)]
mod tests;
