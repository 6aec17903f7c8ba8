//! Stack frames and their per-invocation state machine.

use smallvec::SmallVec;

use crate::runtime::ids::{ReplyToken, ThreadId};
use crate::runtime::value::{BlockArgs, Value};

/// Opcode of the body frame every thread starts with.
pub const BODY_OPCODE: &str = "script_body";

/// Progress of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// The primitive has not run at this depth yet.
    #[default]
    NotStarted,
    /// The primitive yielded and will be re-invoked next pass.
    Waiting,
    /// The primitive returned; the frame is about to be discarded.
    Done,
}

/// Fields a multi-tick primitive saves between invocations.
#[derive(Debug, Clone, Default)]
pub struct FrameLocals {
    /// Deadline in project-timer milliseconds, for timed waits.
    pub deadline_ms: Option<f64>,
    /// Sub-threads spawned by this invocation and still awaited.
    pub spawned: SmallVec<[ThreadId; 4]>,
    /// Generic counter (loop iterations, retries).
    pub counter: u32,
    /// Free slot for anything else worth keeping.
    pub scratch: Option<Value>,
}

/// One level of nested primitive execution.
#[derive(Debug, Clone)]
pub struct StackFrame {
    opcode: String,
    /// Arguments the primitive was invoked with; replayed on resume.
    pub args: BlockArgs,
    token: Option<ReplyToken>,
    /// Current state.
    pub state: FrameState,
    /// Saved per-invocation fields.
    pub locals: FrameLocals,
}

impl StackFrame {
    /// Create a frame for `opcode`.
    pub fn new(
        opcode: impl Into<String>,
        args: BlockArgs,
        token: Option<ReplyToken>,
    ) -> Self {
        Self {
            opcode: opcode.into(),
            args,
            token,
            state: FrameState::NotStarted,
            locals: FrameLocals::default(),
        }
    }

    /// Body frame carrying the hat (or plain script) that started a thread.
    pub fn body(opcode: impl Into<String>) -> Self {
        Self::new(opcode, BlockArgs::new(), None)
    }

    #[inline]
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// Reply token of the request that created this frame.
    #[inline]
    pub fn token(&self) -> Option<&ReplyToken> {
        self.token.as_ref()
    }

    /// True on the first invocation at this depth.
    #[inline]
    pub fn is_first_run(&self) -> bool {
        self.state == FrameState::NotStarted
    }
}
