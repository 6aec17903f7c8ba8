//! Messages exchanged between the scheduler and the worker backend.
//!
//! Both directions are closed enums, serialised with an `id` tag so the wire
//! form stays a flat JSON object:
//!
//! ```text
//! {"id":"BlockOP","targetId":"Sprite1","threadId":"k3...","opCode":"motion_movesteps","args":{"STEPS":10},"token":"w-4"}
//! {"id":"ResultValue","token":"w-4","value":null}
//! ```

use serde::{Deserialize, Serialize};

use crate::linker::LinkedUnit;
use crate::runtime::events::WorkerStatus;
use crate::runtime::ids::{ReplyToken, ScriptId, TargetId, ThreadId};
use crate::runtime::value::{BlockArgs, Value};

/// Instruction to run one registered script on a host-assigned thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStart {
    pub thread_id: ThreadId,
    pub script_id: ScriptId,
    pub target_id: TargetId,
}

/// Backend to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum ToVm {
    EnvironmentLoading,
    EnvironmentLoaded,
    ScriptLoading,
    ScriptRunning,
    ScriptFinished,
    /// Uncaught fault inside a thread body (or while loading, without a thread).
    #[serde(rename_all = "camelCase")]
    ScriptError {
        thread_id: Option<ThreadId>,
        error: String,
    },
    /// Request to run one primitive.
    #[serde(rename = "BlockOP", rename_all = "camelCase")]
    BlockOp {
        target_id: TargetId,
        thread_id: ThreadId,
        op_code: String,
        args: BlockArgs,
        token: ReplyToken,
    },
    /// The thread's body ran to completion.
    #[serde(rename_all = "camelCase")]
    EndOfThread { thread_id: ThreadId },
    /// Reply to `RegisterThreads`.
    ThreadsRegistered {
        token: ReplyToken,
        #[serde(default)]
        error: Option<String>,
    },
    /// Reply to `StartHats` with the threads the backend accepted.
    #[serde(rename_all = "camelCase")]
    HatsStarted {
        token: ReplyToken,
        thread_ids: Vec<ThreadId>,
    },
}

impl ToVm {
    /// Token of a reply to a host request. BlockOP tokens are requests
    /// issued by the backend and are not returned here.
    pub fn reply_token(&self) -> Option<&ReplyToken> {
        match self {
            ToVm::ThreadsRegistered { token, .. } | ToVm::HatsStarted { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Lifecycle status carried by this message, if it is one.
    pub fn status(&self) -> Option<WorkerStatus> {
        match self {
            ToVm::EnvironmentLoading => Some(WorkerStatus::EnvironmentLoading),
            ToVm::EnvironmentLoaded => Some(WorkerStatus::EnvironmentLoaded),
            ToVm::ScriptLoading => Some(WorkerStatus::ScriptLoading),
            ToVm::ScriptRunning => Some(WorkerStatus::ScriptRunning),
            ToVm::ScriptFinished => Some(WorkerStatus::ScriptFinished),
            _ => None,
        }
    }
}

/// Host to backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum FromVm {
    VmConnected,
    /// One-time backend bootstrap.
    #[serde(rename_all = "camelCase")]
    InitBackend { backend_url: String },
    /// Replace the backend's scripts with a linked unit.
    RegisterThreads { token: ReplyToken, unit: LinkedUnit },
    /// Run every script in `source` right away on the given threads.
    AsyncRun {
        source: String,
        targets: Vec<ThreadStart>,
    },
    /// Reply to a BlockOP.
    ResultValue { token: ReplyToken, value: Value },
    /// Failure reply to a BlockOP; the pending call fails.
    ResultError { token: ReplyToken, message: String },
    /// Start scripts for a fired hat.
    StartHats {
        token: ReplyToken,
        hat: String,
        option: Option<String>,
        starts: Vec<ThreadStart>,
    },
    /// Abandon the given threads and any calls they have pending.
    #[serde(rename_all = "camelCase")]
    StopThreads { thread_ids: Vec<ThreadId> },
    /// Abandon everything that is running.
    StopAll,
}

impl FromVm {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FromVm::VmConnected => "VmConnected",
            FromVm::InitBackend { .. } => "InitBackend",
            FromVm::RegisterThreads { .. } => "RegisterThreads",
            FromVm::AsyncRun { .. } => "AsyncRun",
            FromVm::ResultValue { .. } => "ResultValue",
            FromVm::ResultError { .. } => "ResultError",
            FromVm::StartHats { .. } => "StartHats",
            FromVm::StopThreads { .. } => "StopThreads",
            FromVm::StopAll => "StopAll",
        }
    }
}
