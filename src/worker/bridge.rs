//! Host side of the worker protocol.
//!
//! Requests the host makes (`RegisterThreads`, `StartHats`) carry a fresh
//! token and wait, up to a deadline, for the reply with that token.
//! Anything else that arrives in the meantime is kept in a backlog and
//! handed out by [`WorkerBridge::next_message`] in arrival order.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use super::protocol::{FromVm, ThreadStart, ToVm};
use super::transport::Transport;
use super::BridgeError;
use crate::linker::LinkedUnit;
use crate::runtime::ids::{ReplyToken, ThreadId, TokenGenerator};
use crate::runtime::value::Value;

/// Token-correlated channel to a backend.
pub struct WorkerBridge {
    transport: Box<dyn Transport>,
    backlog: VecDeque<ToVm>,
    tokens: TokenGenerator,
    request_timeout: Duration,
}

impl std::fmt::Debug for WorkerBridge {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WorkerBridge")
            .field("backlog", &self.backlog.len())
            .field("tokens_issued", &self.tokens.issued())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl WorkerBridge {
    pub fn new(
        transport: Box<dyn Transport>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            backlog: VecDeque::new(),
            tokens: TokenGenerator::new("h"),
            request_timeout,
        }
    }

    /// Fire-and-forget message.
    pub fn post(
        &mut self,
        message: FromVm,
    ) -> Result<(), BridgeError> {
        self.transport.send(message)
    }

    /// Next unsolicited message, backlog first.
    pub fn next_message(&mut self) -> Result<Option<ToVm>, BridgeError> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(Some(message));
        }
        self.transport.try_recv()
    }

    /// Messages waiting in the backlog.
    #[inline]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Send a request built around a fresh token and wait for its reply.
    pub fn request(
        &mut self,
        build: impl FnOnce(ReplyToken) -> FromVm,
    ) -> Result<ToVm, BridgeError> {
        let token = self.tokens.next_token();
        let message = build(token.clone());
        let kind = message.kind();
        self.transport.send(message)?;

        let deadline = Instant::now() + self.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.transport.recv_timeout(remaining)? {
                Some(reply) if reply.reply_token() == Some(&token) => return Ok(reply),
                Some(other) => self.backlog.push_back(other),
                None => {
                    return Err(BridgeError::Timeout {
                        request: kind,
                        waited: self.request_timeout,
                    })
                }
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::Timeout {
                    request: kind,
                    waited: self.request_timeout,
                });
            }
        }
    }

    // ========================================================================
    // Typed helpers
    // ========================================================================

    pub fn connect(&mut self) -> Result<(), BridgeError> {
        self.post(FromVm::VmConnected)
    }

    pub fn init_backend(
        &mut self,
        backend_url: &str,
    ) -> Result<(), BridgeError> {
        self.post(FromVm::InitBackend {
            backend_url: backend_url.to_string(),
        })
    }

    /// Hand a linked unit to the backend and wait for the acknowledgement.
    pub fn register_threads(
        &mut self,
        unit: LinkedUnit,
    ) -> Result<(), BridgeError> {
        match self.request(|token| FromVm::RegisterThreads { token, unit })? {
            ToVm::ThreadsRegistered { error: None, .. } => Ok(()),
            ToVm::ThreadsRegistered { error: Some(e), .. } => Err(BridgeError::Rejected(e)),
            other => Err(BridgeError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Ask the backend to run `starts`; returns the ids it accepted.
    pub fn start_hats(
        &mut self,
        hat: &str,
        option: Option<&str>,
        starts: Vec<ThreadStart>,
    ) -> Result<Vec<ThreadId>, BridgeError> {
        let reply = self.request(|token| FromVm::StartHats {
            token,
            hat: hat.to_string(),
            option: option.map(str::to_string),
            starts,
        })?;
        match reply {
            ToVm::HatsStarted { thread_ids, .. } => Ok(thread_ids),
            other => Err(BridgeError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    pub fn async_run(
        &mut self,
        source: String,
        targets: Vec<ThreadStart>,
    ) -> Result<(), BridgeError> {
        self.post(FromVm::AsyncRun { source, targets })
    }

    /// Reply to a BlockOP.
    pub fn post_result_value(
        &mut self,
        token: ReplyToken,
        value: Value,
    ) -> Result<(), BridgeError> {
        self.post(FromVm::ResultValue { token, value })
    }

    /// Failure reply to a BlockOP.
    pub fn post_result_error(
        &mut self,
        token: ReplyToken,
        message: String,
    ) -> Result<(), BridgeError> {
        debug!("Failing {}: {}", token, message);
        self.post(FromVm::ResultError { token, message })
    }

    pub fn stop_threads(
        &mut self,
        thread_ids: Vec<ThreadId>,
    ) -> Result<(), BridgeError> {
        if thread_ids.is_empty() {
            return Ok(());
        }
        self.post(FromVm::StopThreads { thread_ids })
    }

    pub fn stop_all(&mut self) -> Result<(), BridgeError> {
        self.post(FromVm::StopAll)
    }
}
