//! Thread scheduler and execution engine.
//!
//! The [`Scheduler`] owns the live thread set and is driven by one
//! [`Scheduler::step_once`] per tick. Threads advance when the backend asks
//! for a primitive through a BlockOP; yielded primitives are re-invoked on
//! later ticks with their frame state intact.
//!
//! # Tick order
//!
//! ```text
//! step_once
//!   ├─ reset redraw flag
//!   ├─ sweep: evict DONE threads
//!   ├─ resume: re-invoke the top frame of every YIELD thread
//!   ├─ pump: handle queued worker messages (BlockOP, EndOfThread, ...)
//!   └─ draw
//! ```
//!
//! Everything runs on one logical thread; the backend only reaches
//! scheduler state through messages.

pub mod error;
mod hats;
mod loading;
pub mod tick;

pub use error::{SchedulerError, SchedulerResult};
pub use hats::HatMatch;
pub use tick::{StopHandle, TickDriver};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, info, warn};

use crate::io::IoDevices;
use crate::linker::{EventMap, ScriptRegistration};
use crate::render::Renderer;
use crate::runtime::events::{EventSubscriber, RuntimeEvent};
use crate::runtime::ids::{ReplyToken, ScriptId, TargetId, ThreadId};
use crate::runtime::primitives::{BlockUtility, PrimitiveFn, PrimitiveRegistry};
use crate::runtime::stage::{Stage, Target, MAX_CLONES};
use crate::runtime::thread::{FrameState, ResultCallback, StackFrame, Thread, ThreadStatus};
use crate::runtime::uid::SafeIdentifierGenerator;
use crate::runtime::value::{BlockArgs, Value};
use crate::worker::{ToVm, WorkerBridge};

/// Hat fired by the green flag.
pub const GREEN_FLAG_HAT: &str = "event_whenflagclicked";
/// Hat fired when a key goes down.
pub const KEY_PRESSED_HAT: &str = "event_whenkeypressed";
/// Hat fired in a freshly created clone.
pub const START_AS_CLONE_HAT: &str = "control_start_as_clone";

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Clone ceiling.
    pub max_clones: usize,
    /// Nominal tick cadence.
    pub tick_interval: Duration,
    /// Deadline for host requests to the backend.
    pub request_timeout: Duration,
    /// Deadline for a BlockOP on the backend side; `None` disables it.
    pub block_timeout: Option<Duration>,
    /// End a thread whose body reported an uncaught fault.
    pub end_faulted_threads: bool,
    /// Upper bound of worker messages handled per tick.
    pub max_messages_per_tick: usize,
    /// How many ended thread ids are remembered for late messages.
    pub retired_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_clones: MAX_CLONES,
            tick_interval: Duration::from_secs_f64(1.0 / 60.0),
            request_timeout: Duration::from_millis(5000),
            block_timeout: None,
            end_faulted_threads: true,
            max_messages_per_tick: 1024,
            retired_capacity: 4096,
        }
    }
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Ticks run.
    pub ticks: u64,
    /// Threads registered.
    pub threads_registered: u64,
    /// Threads evicted by sweeps.
    pub threads_evicted: u64,
    /// Primitive invocations, resumes included.
    pub blocks_executed: u64,
    /// Host-side faults reported by steps.
    pub faults: u64,
    /// Uncaught faults reported by the backend.
    pub script_errors: u64,
}

impl SchedulerStats {
    #[inline]
    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    #[inline]
    pub fn record_registered(&mut self) {
        self.threads_registered += 1;
    }

    #[inline]
    pub fn record_evicted(
        &mut self,
        count: usize,
    ) {
        self.threads_evicted += count as u64;
    }

    #[inline]
    pub fn record_block(&mut self) {
        self.blocks_executed += 1;
    }
}

/// What a single primitive invocation did.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutcome {
    /// Returned a value; it was posted back with the token.
    Completed(Value),
    /// Yielded; the frame stays on the thread's stack.
    Yielded,
}

/// Summary of one tick.
#[derive(Debug, Default)]
pub struct StepReport {
    pub tick: u64,
    /// Whether a primitive asked for a redraw during the previous tick.
    pub redraw_requested: bool,
    /// Threads evicted by this tick's sweep, in discovery order.
    pub evicted: Vec<ThreadId>,
    /// Yielded frames re-invoked.
    pub resumed: usize,
    /// Worker messages handled.
    pub messages: usize,
    /// Host-side faults (desyncs, primitive failures, bridge errors).
    pub faults: Vec<SchedulerError>,
    /// Uncaught faults reported by the backend.
    pub script_errors: Vec<String>,
}

/// Runtime core.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: Arc<PrimitiveRegistry>,
    bridge: WorkerBridge,
    threads: IndexMap<ThreadId, Thread>,
    retired: IndexSet<ThreadId>,
    uid: SafeIdentifierGenerator,
    stage: Stage,
    io: IoDevices,
    scripts: IndexMap<ScriptId, ScriptRegistration>,
    event_map: EventMap,
    return_values: HashMap<ThreadId, Value>,
    subscribers: Vec<Box<dyn EventSubscriber>>,
    stats: SchedulerStats,
    started: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.threads.len())
            .field("scripts", &self.scripts.len())
            .field("stage", &self.stage)
            .field("bridge", &self.bridge)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler around an injected registry and bridge.
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<PrimitiveRegistry>,
        bridge: WorkerBridge,
    ) -> Self {
        let stage = Stage::new(config.max_clones);
        Self {
            config,
            registry,
            bridge,
            threads: IndexMap::new(),
            retired: IndexSet::new(),
            uid: SafeIdentifierGenerator::new(),
            stage,
            io: IoDevices::default(),
            scripts: IndexMap::new(),
            event_map: IndexMap::new(),
            return_values: HashMap::new(),
            subscribers: Vec::new(),
            stats: SchedulerStats::default(),
            started: false,
        }
    }

    /// Replace the I/O devices (e.g. to use a manual clock).
    pub fn with_io(
        mut self,
        io: IoDevices,
    ) -> Self {
        self.io = io;
        self
    }

    /// Replace the identifier source (e.g. a seeded one).
    pub fn with_uid(
        mut self,
        uid: SafeIdentifierGenerator,
    ) -> Self {
        self.uid = uid;
        self
    }

    /// Attach a renderer.
    pub fn attach_renderer(
        &mut self,
        renderer: Box<dyn Renderer>,
    ) {
        self.stage.attach_renderer(renderer);
    }

    /// Register an observer of runtime events.
    pub fn subscribe(
        &mut self,
        subscriber: Box<dyn EventSubscriber>,
    ) {
        self.subscribers.push(subscriber);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &PrimitiveRegistry {
        &self.registry
    }

    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    #[inline]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    #[inline]
    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    #[inline]
    pub fn io(&self) -> &IoDevices {
        &self.io
    }

    #[inline]
    pub fn io_mut(&mut self) -> &mut IoDevices {
        &mut self.io
    }

    #[inline]
    pub fn bridge_mut(&mut self) -> &mut WorkerBridge {
        &mut self.bridge
    }

    /// Event map of the last registered batch, kept for diagnostics.
    #[inline]
    pub fn event_map(&self) -> &EventMap {
        &self.event_map
    }

    /// Registered scripts by id.
    #[inline]
    pub fn scripts(&self) -> &IndexMap<ScriptId, ScriptRegistration> {
        &self.scripts
    }

    /// Number of threads in the live set, DONE ones included until swept.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Ids of threads in the live set.
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.keys().cloned().collect()
    }

    /// Threads in the live set.
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Whether the tick driver should keep running.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    // ========================================================================
    // Thread operations
    // ========================================================================

    /// Register a running thread for `target` and return its fresh id.
    pub fn register_thread(
        &mut self,
        target: &TargetId,
        result_callback: Option<ResultCallback>,
    ) -> ThreadId {
        let id = self.fresh_thread_id();
        self.threads
            .insert(id.clone(), Thread::new(id.clone(), target.clone(), result_callback));
        self.stats.record_registered();
        debug!("Registered {} on {}", id, target);
        id
    }

    /// Look up a live thread.
    pub fn get_thread(
        &self,
        id: &ThreadId,
    ) -> SchedulerResult<&Thread> {
        self.threads
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    /// Mark a thread done. Ending a done thread is a no-op.
    pub fn end_thread(
        &mut self,
        id: &ThreadId,
    ) -> SchedulerResult<()> {
        let thread = self
            .threads
            .get_mut(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;
        thread.end();
        Ok(())
    }

    /// Live and not done.
    pub fn is_thread_active(
        &self,
        id: &ThreadId,
    ) -> bool {
        self.threads.get(id).is_some_and(Thread::is_active)
    }

    /// Run one primitive on a thread and post its value back under `token`.
    pub fn execute_block(
        &mut self,
        thread_id: &ThreadId,
        opcode: &str,
        args: BlockArgs,
        token: Option<ReplyToken>,
    ) -> SchedulerResult<BlockOutcome> {
        let thread = self.get_thread(thread_id)?;
        if thread.is_done() {
            // Ended but not swept yet; the backend has not caught up.
            return Err(SchedulerError::NotFound(thread_id.clone()));
        }
        let target = thread.target().clone();
        let primitive = self
            .registry
            .primitive(opcode)
            .ok_or_else(|| SchedulerError::UnknownOpcode(opcode.to_string()))?;
        let frame = StackFrame::new(opcode, args, token);
        self.run_frame(thread_id, &target, &primitive, frame)
    }

    fn run_frame(
        &mut self,
        thread_id: &ThreadId,
        target: &TargetId,
        primitive: &PrimitiveFn,
        mut frame: StackFrame,
    ) -> SchedulerResult<BlockOutcome> {
        self.stats.record_block();
        let args = std::mem::take(&mut frame.args);
        let (result, yielded) = {
            let mut util = BlockUtility::new(self, thread_id, target, &mut frame);
            let result = primitive(&args, &mut util);
            (result, util.is_yielded())
        };
        frame.args = args;

        match result {
            Ok(_) if yielded => {
                frame.state = FrameState::Waiting;
                if let Some(thread) = self.threads.get_mut(thread_id) {
                    if thread.is_active() {
                        thread.push_frame(frame);
                        thread.set_status(ThreadStatus::Yield);
                    }
                }
                Ok(BlockOutcome::Yielded)
            }
            Ok(value) => {
                frame.state = FrameState::Done;
                if let Some(thread) = self.threads.get_mut(thread_id) {
                    thread.report_result(&value);
                }
                if let Some(token) = frame.token() {
                    self.bridge.post_result_value(token.clone(), value.clone())?;
                }
                Ok(BlockOutcome::Completed(value))
            }
            Err(source) => {
                if let Some(token) = frame.token() {
                    self.bridge
                        .post_result_error(token.clone(), source.to_string())?;
                }
                Err(SchedulerError::Primitive {
                    opcode: frame.opcode().to_string(),
                    source,
                })
            }
        }
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Run one tick.
    pub fn step_once(&mut self) -> StepReport {
        self.stats.record_tick();
        let mut report = StepReport {
            tick: self.stats.ticks,
            redraw_requested: self.stage.take_redraw_request(),
            ..StepReport::default()
        };

        report.evicted = self.sweep();
        self.resume_yielded(&mut report);
        self.pump(&mut report);
        self.stage.draw();

        self.stats.faults += report.faults.len() as u64;
        report
    }

    /// Run `ticks` ticks back to back and collect the reports.
    pub fn run_ticks(
        &mut self,
        ticks: usize,
    ) -> Vec<StepReport> {
        (0..ticks).map(|_| self.step_once()).collect()
    }

    fn sweep(&mut self) -> Vec<ThreadId> {
        let mut evicted = Vec::new();
        self.threads.retain(|id, thread| {
            if thread.is_done() {
                evicted.push(id.clone());
                false
            } else {
                true
            }
        });
        for id in &evicted {
            debug!("Evicted {}", id);
        }
        self.stats.record_evicted(evicted.len());
        self.drop_uncollected_returns();
        evicted
    }

    /// Forget reported values whose thread is gone and that no live frame
    /// is waiting to collect.
    fn drop_uncollected_returns(&mut self) {
        if self.return_values.is_empty() {
            return;
        }
        let threads = &self.threads;
        self.return_values.retain(|id, _| {
            threads.contains_key(id) || threads.values().any(|t| t.is_awaiting(id))
        });
    }

    fn resume_yielded(
        &mut self,
        report: &mut StepReport,
    ) {
        let yielded: Vec<ThreadId> = self
            .threads
            .values()
            .filter(|t| t.status() == ThreadStatus::Yield)
            .map(|t| t.id().clone())
            .collect();

        for id in yielded {
            let Some(thread) = self.threads.get_mut(&id) else {
                continue;
            };
            // An earlier resume in this pass may have ended it.
            if thread.status() != ThreadStatus::Yield {
                continue;
            }
            thread.set_status(ThreadStatus::Running);
            let target = thread.target().clone();
            let Some(frame) = thread.take_block_frame() else {
                continue;
            };
            let Some(primitive) = self.registry.primitive(frame.opcode()) else {
                report
                    .faults
                    .push(SchedulerError::UnknownOpcode(frame.opcode().to_string()));
                continue;
            };
            report.resumed += 1;
            if let Err(e) = self.run_frame(&id, &target, &primitive, frame) {
                warn!("Resumed block on {} failed: {}", id, e);
                report.faults.push(e);
            }
        }
    }

    fn pump(
        &mut self,
        report: &mut StepReport,
    ) {
        while report.messages < self.config.max_messages_per_tick {
            let message = match self.bridge.next_message() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) => {
                    error!("Worker bridge failed: {}", e);
                    report.faults.push(e.into());
                    break;
                }
            };
            report.messages += 1;
            self.handle_worker_message(message, report);
        }
    }

    fn handle_worker_message(
        &mut self,
        message: ToVm,
        report: &mut StepReport,
    ) {
        if let Some(status) = message.status() {
            info!("Worker status: {:?}", status);
            self.emit(RuntimeEvent::WorkerStatus(status));
            return;
        }

        match message {
            ToVm::BlockOp {
                target_id,
                thread_id,
                op_code,
                args,
                token,
            } => {
                if let Ok(thread) = self.get_thread(&thread_id) {
                    if thread.target() != &target_id {
                        warn!("{} runs on {}, backend says {}", thread_id, thread.target(), target_id);
                    }
                }
                match self.execute_block(&thread_id, &op_code, args, Some(token.clone())) {
                    Ok(_) => {}
                    Err(e) if e.is_desync() => {
                        // Nothing replied yet; fail the call so the backend is not left waiting.
                        if let Err(bridge) = self.bridge.post_result_error(token, e.to_string()) {
                            report.faults.push(bridge.into());
                        }
                        if matches!(&e, SchedulerError::NotFound(id) if self.retired.contains(id)) {
                            debug!("Dropped {} for ended {}", op_code, thread_id);
                        } else {
                            error!("Protocol desync: {}", e);
                            report.faults.push(e);
                        }
                    }
                    Err(e) => {
                        warn!("{}", e);
                        report.faults.push(e);
                    }
                }
            }
            ToVm::EndOfThread { thread_id } => {
                if let Err(e) = self.end_thread(&thread_id) {
                    if !self.retired.contains(&thread_id) {
                        error!("Protocol desync: {}", e);
                        report.faults.push(e);
                    }
                }
            }
            ToVm::ScriptError { thread_id, error } => {
                self.stats.script_errors += 1;
                match &thread_id {
                    Some(id) => warn!("Script fault on {}: {}", id, error),
                    None => warn!("Script fault: {}", error),
                }
                if let (Some(id), true) = (&thread_id, self.config.end_faulted_threads) {
                    if self.threads.contains_key(id) {
                        self.retire(id);
                    }
                }
                report.script_errors.push(error);
            }
            ToVm::ThreadsRegistered { token, .. } | ToVm::HatsStarted { token, .. } => {
                debug!("Discarding late reply {}", token);
            }
            // Status messages were handled above.
            _ => {}
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mark the runtime started.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.emit(RuntimeEvent::RuntimeStarted);
    }

    /// Stop ticking and drop every thread.
    pub fn quit(&mut self) {
        self.started = false;
        self.threads.clear();
        self.return_values.clear();
    }

    /// Stop everything, dispose every target and reset the timer.
    pub fn dispose(&mut self) {
        self.stop_all();
        let ids: Vec<TargetId> = self.stage.targets().map(|t| t.id().clone()).collect();
        for id in ids {
            if self.stage.dispose_target(&id).is_some() {
                self.emit(RuntimeEvent::TargetWasRemoved(id));
            }
        }
        self.scripts.clear();
        self.emit(RuntimeEvent::RuntimeDisposed);
        self.io.clock.reset_project_timer();
    }

    /// Add an original target (sprite or stage).
    pub fn add_target(
        &mut self,
        target: Target,
    ) {
        let original = target.is_original();
        self.stage.add_target(target);
        if original {
            self.emit(RuntimeEvent::TargetsUpdate);
        }
    }

    /// Notify packages and subscribers.
    pub fn emit(
        &self,
        event: RuntimeEvent,
    ) {
        for package in self.registry.packages() {
            package.on_event(&event);
        }
        for subscriber in &self.subscribers {
            subscriber.on_event(&event);
        }
    }

    // ========================================================================
    // Internals shared with primitives
    // ========================================================================

    fn fresh_thread_id(&mut self) -> ThreadId {
        let threads = &self.threads;
        let retired = &self.retired;
        ThreadId::new(
            self.uid
                .generate_unique(|c| threads.contains_key(c) || retired.contains(c)),
        )
    }

    /// End a thread and remember its id so late backend messages are tolerated.
    fn retire(
        &mut self,
        id: &ThreadId,
    ) {
        if let Some(thread) = self.threads.get_mut(id) {
            thread.end();
        }
        self.retired.insert(id.clone());
        while self.retired.len() > self.config.retired_capacity {
            self.retired.shift_remove_index(0);
        }
    }

    /// Store the value a procedure thread reports to its caller.
    pub(crate) fn set_return_value(
        &mut self,
        thread: &ThreadId,
        value: Value,
    ) {
        if self.return_values.insert(thread.clone(), value).is_some() {
            warn!("{} reported more than once; keeping the last value", thread);
        }
    }

    /// Take the value a finished procedure thread reported, if any.
    pub(crate) fn take_return_value(
        &mut self,
        thread: &ThreadId,
    ) -> Option<Value> {
        self.return_values.remove(thread)
    }
}
