//! Threads: one resumable execution of a script body bound to a target.

pub mod frame;

pub use frame::{FrameLocals, FrameState, StackFrame, BODY_OPCODE};

use crate::runtime::ids::{ScriptId, TargetId, ThreadId};
use crate::runtime::value::Value;

/// Callback fed with every value a thread's blocks produce.
pub type ResultCallback = Box<dyn FnMut(&ThreadId, &Value) + Send>;

/// Thread status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Eligible for a step.
    Running,
    /// Paused until the next scheduling pass re-admits it.
    Yield,
    /// Terminal; evicted on the next sweep.
    Done,
}

/// Back-reference from a hat-started thread to the event that spawned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HatBinding {
    /// Script the thread runs.
    pub script: ScriptId,
    /// Hat opcode that fired.
    pub hat: String,
    /// Event option the hat matched, if any.
    pub option: Option<String>,
}

/// A live thread.
pub struct Thread {
    id: ThreadId,
    target: TargetId,
    status: ThreadStatus,
    stack: Vec<StackFrame>,
    binding: Option<HatBinding>,
    result_callback: Option<ResultCallback>,
}

impl std::fmt::Debug for Thread {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("status", &self.status)
            .field("depth", &self.stack.len())
            .field("binding", &self.binding)
            .field("has_callback", &self.result_callback.is_some())
            .finish()
    }
}

impl Thread {
    /// Create a running thread with a single body frame.
    pub fn new(
        id: ThreadId,
        target: TargetId,
        result_callback: Option<ResultCallback>,
    ) -> Self {
        Self {
            id,
            target,
            status: ThreadStatus::Running,
            stack: vec![StackFrame::body(BODY_OPCODE)],
            binding: None,
            result_callback,
        }
    }

    /// Create a running thread started by a hat.
    pub fn for_hat(
        id: ThreadId,
        target: TargetId,
        binding: HatBinding,
    ) -> Self {
        Self {
            id,
            target,
            status: ThreadStatus::Running,
            stack: vec![StackFrame::body(binding.hat.clone())],
            binding: Some(binding),
            result_callback: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    /// Target the thread runs on. The thread does not own it.
    #[inline]
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    #[inline]
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    #[inline]
    pub fn binding(&self) -> Option<&HatBinding> {
        self.binding.as_ref()
    }

    /// Set the status. A done thread stays done.
    pub fn set_status(
        &mut self,
        status: ThreadStatus,
    ) {
        if self.status != ThreadStatus::Done {
            self.status = status;
        }
    }

    /// Mark the thread done. Idempotent.
    #[inline]
    pub fn end(&mut self) {
        self.status = ThreadStatus::Done;
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.status == ThreadStatus::Done
    }

    /// Live and not finished.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.is_done()
    }

    /// Stack depth, body frame included.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push_frame(
        &mut self,
        frame: StackFrame,
    ) {
        self.stack.push(frame);
    }

    /// Pop the top frame. Popping the last frame finishes the thread.
    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        let frame = self.stack.pop();
        if self.stack.is_empty() {
            self.status = ThreadStatus::Done;
        }
        frame
    }

    /// Detach the topmost block frame, leaving the body frame in place.
    pub fn take_block_frame(&mut self) -> Option<StackFrame> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn peek_frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    /// Whether a frame on this thread still waits for `other`.
    pub fn is_awaiting(
        &self,
        other: &ThreadId,
    ) -> bool {
        self.stack.iter().any(|frame| frame.locals.spawned.contains(other))
    }

    /// Report a value to the spawning caller, if it asked for one.
    pub fn report_result(
        &mut self,
        value: &Value,
    ) {
        if let Some(callback) = self.result_callback.as_mut() {
            callback(&self.id, value);
        }
    }
}

#[cfg(test)]
mod tests;
