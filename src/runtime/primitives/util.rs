//! Per-invocation utility handed to primitives.

use tracing::warn;

use super::BlockError;
use crate::io::IoDevices;
use crate::runtime::events::RuntimeEvent;
use crate::runtime::ids::{TargetId, ThreadId};
use crate::runtime::scheduler::{HatMatch, Scheduler};
use crate::runtime::stage::{Stage, Target};
use crate::runtime::thread::{FrameLocals, StackFrame};
use crate::runtime::value::Value;

/// Restricted view of the scheduler for one primitive call.
///
/// It is bound to the calling thread and to the frame at the current depth;
/// state written through [`BlockUtility::locals`] survives a yield.
pub struct BlockUtility<'a> {
    scheduler: &'a mut Scheduler,
    thread: &'a ThreadId,
    target: &'a TargetId,
    frame: &'a mut StackFrame,
    yielded: bool,
}

impl<'a> BlockUtility<'a> {
    pub(crate) fn new(
        scheduler: &'a mut Scheduler,
        thread: &'a ThreadId,
        target: &'a TargetId,
        frame: &'a mut StackFrame,
    ) -> Self {
        Self {
            scheduler,
            thread,
            target,
            frame,
            yielded: false,
        }
    }

    /// Thread running the primitive.
    #[inline]
    pub fn thread_id(&self) -> &ThreadId {
        self.thread
    }

    /// Target of the running thread.
    #[inline]
    pub fn target_id(&self) -> &TargetId {
        self.target
    }

    /// The target itself, if it still exists.
    pub fn target(&self) -> Option<&Target> {
        self.scheduler.stage().get(self.target)
    }

    /// Like [`BlockUtility::target`] but failing when the target is gone.
    pub fn require_target(&self) -> Result<&Target, BlockError> {
        self.target()
            .ok_or_else(|| BlockError::TargetUnavailable(self.target.to_string()))
    }

    // ========================================================================
    // Frame state
    // ========================================================================

    #[inline]
    pub fn frame(&self) -> &StackFrame {
        &*self.frame
    }

    /// True on the first invocation at this stack depth.
    #[inline]
    pub fn is_first_run(&self) -> bool {
        self.frame.is_first_run()
    }

    /// Saved per-invocation fields.
    #[inline]
    pub fn locals(&mut self) -> &mut FrameLocals {
        &mut self.frame.locals
    }

    /// Pause the thread for this pass, keeping the frame for the next one.
    #[inline]
    pub fn yield_thread(&mut self) {
        self.yielded = true;
    }

    #[inline]
    pub fn is_yielded(&self) -> bool {
        self.yielded
    }

    // ========================================================================
    // Scheduler access
    // ========================================================================

    #[inline]
    pub fn stage(&self) -> &Stage {
        self.scheduler.stage()
    }

    #[inline]
    pub fn stage_mut(&mut self) -> &mut Stage {
        self.scheduler.stage_mut()
    }

    #[inline]
    pub fn io(&self) -> &IoDevices {
        self.scheduler.io()
    }

    #[inline]
    pub fn io_mut(&mut self) -> &mut IoDevices {
        self.scheduler.io_mut()
    }

    /// Project timer in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.scheduler.io().clock.project_timer() * 1000.0
    }

    pub fn request_redraw(&mut self) {
        self.scheduler.stage_mut().request_redraw();
    }

    pub fn emit(
        &self,
        event: RuntimeEvent,
    ) {
        self.scheduler.emit(event);
    }

    /// Start hat scripts, e.g. a broadcast or a procedure body.
    pub fn start_hats(
        &mut self,
        hat: &str,
        matching: &HatMatch,
    ) -> Result<Vec<ThreadId>, BlockError> {
        self.scheduler
            .start_hats(hat, matching)
            .map_err(|e| BlockError::Failed(e.to_string()))
    }

    pub fn is_thread_active(
        &self,
        id: &ThreadId,
    ) -> bool {
        self.scheduler.is_thread_active(id)
    }

    /// Clone a target; `Ok(None)` means no clone was created.
    pub fn make_clone(
        &mut self,
        source: &TargetId,
    ) -> Result<Option<TargetId>, BlockError> {
        self.scheduler
            .make_clone(source)
            .map_err(|e| BlockError::Failed(e.to_string()))
    }

    /// Dispose the current target if it is a clone. Ends this thread too.
    pub fn dispose_this_clone(&mut self) -> bool {
        match self.scheduler.dispose_clone(self.target) {
            Ok(disposed) => disposed,
            Err(e) => {
                warn!("Cannot dispose {}: {}", self.target, e);
                false
            }
        }
    }

    pub fn stop_all(&mut self) {
        self.scheduler.stop_all();
    }

    /// End the running thread.
    pub fn stop_this_thread(&mut self) {
        if let Err(e) = self.scheduler.stop_thread(self.thread) {
            warn!("{}", e);
        }
    }

    /// End the other threads of the running target.
    pub fn stop_other_threads(&mut self) {
        self.scheduler.stop_for_target(self.target, Some(self.thread));
    }

    /// Report a procedure's value to whoever called it.
    pub fn report_return(
        &mut self,
        value: Value,
    ) {
        self.scheduler.set_return_value(self.thread, value);
    }

    /// Value reported by a finished procedure thread.
    pub fn take_return(
        &mut self,
        callee: &ThreadId,
    ) -> Option<Value> {
        self.scheduler.take_return_value(callee)
    }
}
