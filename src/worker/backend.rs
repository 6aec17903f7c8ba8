//! Execution backends.
//!
//! A backend owns the script bodies and walks them; every block it needs is
//! requested from the scheduler with a BlockOP and resumed when the matching
//! ResultValue arrives. [`ScriptWorker`] is the built-in backend for the
//! line-oriented script language in [`super::script`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::protocol::{FromVm, ThreadStart, ToVm};
use super::script::{parse_unit, ScriptDef};
use super::tokens::PendingTokens;
use crate::runtime::ids::{ReplyToken, ScriptId, TargetId, ThreadId, TokenGenerator};
use crate::runtime::value::Value;

/// Anything that can sit at the far end of a transport.
pub trait Backend: Send {
    /// Handle one message from the host, appending replies to `outbox`.
    fn handle(
        &mut self,
        message: FromVm,
        outbox: &mut Vec<ToVm>,
    );

    /// Periodic housekeeping such as expiring pending calls.
    fn poll(
        &mut self,
        _now: Instant,
        _outbox: &mut Vec<ToVm>,
    ) {
    }
}

/// A script body being executed on one thread.
#[derive(Debug)]
struct RunningScript {
    script: ScriptId,
    target: TargetId,
    pc: usize,
    vars: HashMap<String, Value>,
}

/// Reference backend executing linked units statement by statement.
#[derive(Debug)]
pub struct ScriptWorker {
    scripts: IndexMap<ScriptId, ScriptDef>,
    running: IndexMap<ThreadId, RunningScript>,
    pending: PendingTokens<ThreadId>,
    tokens: TokenGenerator,
    block_timeout: Option<Duration>,
    environment_ready: bool,
}

impl Default for ScriptWorker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ScriptWorker {
    /// Create a worker; `block_timeout` bounds how long a BlockOP may stay unanswered.
    pub fn new(block_timeout: Option<Duration>) -> Self {
        Self {
            scripts: IndexMap::new(),
            running: IndexMap::new(),
            pending: PendingTokens::new(),
            tokens: TokenGenerator::new("w"),
            block_timeout,
            environment_ready: false,
        }
    }

    /// Number of scripts currently executing.
    #[inline]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Number of BlockOPs awaiting a reply.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    fn register(
        &mut self,
        token: ReplyToken,
        source: &str,
        outbox: &mut Vec<ToVm>,
    ) {
        outbox.push(ToVm::ScriptLoading);
        match parse_unit(source) {
            Ok(scripts) => {
                self.stop_everything(outbox);
                self.scripts = scripts.into_iter().map(|s| (s.id.clone(), s)).collect();
                debug!("Registered {} scripts", self.scripts.len());
                outbox.push(ToVm::ThreadsRegistered { token, error: None });
            }
            Err(e) => {
                outbox.push(ToVm::ScriptError {
                    thread_id: None,
                    error: e.to_string(),
                });
                outbox.push(ToVm::ThreadsRegistered {
                    token,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    /// Begin running `starts`; returns the threads that were accepted.
    fn start(
        &mut self,
        starts: Vec<ThreadStart>,
        outbox: &mut Vec<ToVm>,
    ) -> Vec<ThreadId> {
        let was_idle = self.running.is_empty();
        let mut accepted = Vec::with_capacity(starts.len());
        for start in starts {
            if !self.scripts.contains_key(&start.script_id) {
                warn!("Cannot start unknown {}", start.script_id);
                continue;
            }
            self.running.insert(
                start.thread_id.clone(),
                RunningScript {
                    script: start.script_id,
                    target: start.target_id,
                    pc: 0,
                    vars: HashMap::new(),
                },
            );
            accepted.push(start.thread_id);
        }
        if was_idle && !accepted.is_empty() {
            outbox.push(ToVm::ScriptRunning);
        }
        accepted
    }

    /// Issue the next BlockOP of `thread`, or finish it.
    fn advance(
        &mut self,
        thread: &ThreadId,
        outbox: &mut Vec<ToVm>,
    ) {
        let Some(running) = self.running.get(thread) else {
            return;
        };
        let Some(script) = self.scripts.get(&running.script) else {
            let message = format!("{} is no longer registered", running.script);
            self.fail(thread, message, outbox);
            return;
        };

        let Some(statement) = script.body.get(running.pc) else {
            self.running.shift_remove(thread);
            outbox.push(ToVm::EndOfThread {
                thread_id: thread.clone(),
            });
            self.note_if_idle(outbox);
            return;
        };

        let args = match statement.bind_args(|name| running.vars.get(name).cloned()) {
            Ok(args) => args,
            Err(var) => {
                let message = format!("line {}: unknown variable ${var}", statement.line);
                self.fail(thread, message, outbox);
                return;
            }
        };

        let token = self.tokens.next_token();
        let deadline = self.block_timeout.map(|t| Instant::now() + t);
        let message = ToVm::BlockOp {
            target_id: running.target.clone(),
            thread_id: thread.clone(),
            op_code: statement.opcode.clone(),
            args,
            token: token.clone(),
        };
        // Tokens come from a monotonic counter and cannot collide.
        if self.pending.register(token, thread.clone(), deadline).is_ok() {
            outbox.push(message);
        }
    }

    /// Apply a block's value to its thread and move on.
    fn resume(
        &mut self,
        token: &ReplyToken,
        value: Value,
        outbox: &mut Vec<ToVm>,
    ) {
        let Some(thread) = self.pending.resolve(token) else {
            debug!("Ignoring reply for unknown {}", token);
            return;
        };
        let Some(running) = self.running.get_mut(&thread) else {
            return;
        };
        let assign = self
            .scripts
            .get(&running.script)
            .and_then(|s| s.body.get(running.pc))
            .and_then(|st| st.assign.clone());
        if let Some(var) = assign {
            running.vars.insert(var, value);
        }
        running.pc += 1;
        self.advance(&thread, outbox);
    }

    /// Abandon `thread` and report the fault.
    fn fail(
        &mut self,
        thread: &ThreadId,
        error: String,
        outbox: &mut Vec<ToVm>,
    ) {
        self.running.shift_remove(thread);
        self.pending.retain(|t| t != thread);
        outbox.push(ToVm::ScriptError {
            thread_id: Some(thread.clone()),
            error,
        });
        self.note_if_idle(outbox);
    }

    fn stop_threads(
        &mut self,
        threads: &[ThreadId],
        outbox: &mut Vec<ToVm>,
    ) {
        let before = self.running.len();
        for thread in threads {
            self.running.shift_remove(thread);
        }
        self.pending.retain(|t| !threads.contains(t));
        if before > 0 {
            self.note_if_idle(outbox);
        }
    }

    fn stop_everything(
        &mut self,
        outbox: &mut Vec<ToVm>,
    ) {
        let was_running = !self.running.is_empty();
        self.running.clear();
        self.pending.clear();
        if was_running {
            outbox.push(ToVm::ScriptFinished);
        }
    }

    fn note_if_idle(
        &self,
        outbox: &mut Vec<ToVm>,
    ) {
        if self.running.is_empty() {
            outbox.push(ToVm::ScriptFinished);
        }
    }
}

impl Backend for ScriptWorker {
    fn handle(
        &mut self,
        message: FromVm,
        outbox: &mut Vec<ToVm>,
    ) {
        match message {
            FromVm::VmConnected => debug!("Host connected"),
            FromVm::InitBackend { backend_url } => {
                outbox.push(ToVm::EnvironmentLoading);
                if !backend_url.is_empty() {
                    info!("Backend environment from {}", backend_url);
                }
                self.environment_ready = true;
                outbox.push(ToVm::EnvironmentLoaded);
            }
            FromVm::RegisterThreads { token, unit } => {
                self.register(token, &unit.source, outbox);
            }
            FromVm::AsyncRun { source, targets } => match parse_unit(&source) {
                Ok(scripts) => {
                    outbox.push(ToVm::ScriptLoading);
                    for script in scripts {
                        self.scripts.insert(script.id.clone(), script);
                    }
                    let started = self.start(targets, outbox);
                    for thread in &started {
                        self.advance(thread, outbox);
                    }
                }
                Err(e) => outbox.push(ToVm::ScriptError {
                    thread_id: None,
                    error: e.to_string(),
                }),
            },
            FromVm::ResultValue { token, value } => self.resume(&token, value, outbox),
            FromVm::ResultError { token, message } => {
                if let Some(thread) = self.pending.resolve(&token) {
                    self.fail(&thread, message, outbox);
                }
            }
            FromVm::StartHats {
                token,
                hat,
                option,
                starts,
            } => {
                debug!("Starting {} threads for {} {:?}", starts.len(), hat, option);
                let started = self.start(starts, outbox);
                outbox.push(ToVm::HatsStarted {
                    token,
                    thread_ids: started.clone(),
                });
                for thread in &started {
                    self.advance(thread, outbox);
                }
            }
            FromVm::StopThreads { thread_ids } => self.stop_threads(&thread_ids, outbox),
            FromVm::StopAll => self.stop_everything(outbox),
        }
    }

    fn poll(
        &mut self,
        now: Instant,
        outbox: &mut Vec<ToVm>,
    ) {
        for (token, thread) in self.pending.expire(now) {
            let timeout = self.block_timeout.unwrap_or_default();
            self.fail(
                &thread,
                format!("block {} timed out after {}ms", token.as_str(), timeout.as_millis()),
                outbox,
            );
        }
    }
}
