//! Channels between the scheduler and a backend.
//!
//! Two flavours: [`InlineTransport`] runs the backend on the caller's thread
//! (deterministic, used by tests and single-threaded hosts) and
//! [`ThreadTransport`] gives the backend its own OS thread behind crossbeam
//! channels. Either way every message is moved, never shared.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use super::backend::Backend;
use super::protocol::{FromVm, ToVm};
use super::BridgeError;

/// How often a threaded backend is polled for expired deadlines when idle.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A bidirectional message channel to a backend.
pub trait Transport: Send {
    fn send(
        &mut self,
        message: FromVm,
    ) -> Result<(), BridgeError>;

    /// Next message if one is ready.
    fn try_recv(&mut self) -> Result<Option<ToVm>, BridgeError>;

    /// Wait up to `timeout` for the next message.
    fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ToVm>, BridgeError>;
}

// ============================================================================
// Inline
// ============================================================================

/// Backend driven synchronously on send.
#[derive(Debug)]
pub struct InlineTransport<B> {
    backend: B,
    outbox: VecDeque<ToVm>,
    scratch: Vec<ToVm>,
}

impl<B: Backend> InlineTransport<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            outbox: VecDeque::new(),
            scratch: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn poll_backend(&mut self) {
        self.backend.poll(Instant::now(), &mut self.scratch);
        self.outbox.extend(self.scratch.drain(..));
    }
}

impl<B: Backend> Transport for InlineTransport<B> {
    fn send(
        &mut self,
        message: FromVm,
    ) -> Result<(), BridgeError> {
        self.backend.handle(message, &mut self.scratch);
        self.outbox.extend(self.scratch.drain(..));
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<ToVm>, BridgeError> {
        if self.outbox.is_empty() {
            self.poll_backend();
        }
        Ok(self.outbox.pop_front())
    }

    fn recv_timeout(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<ToVm>, BridgeError> {
        // Nothing can arrive while we wait: the backend only runs on send.
        self.try_recv()
    }
}

// ============================================================================
// Threaded
// ============================================================================

/// Backend running on a dedicated OS thread.
#[derive(Debug)]
pub struct ThreadTransport {
    to_backend: Option<Sender<FromVm>>,
    from_backend: Receiver<ToVm>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadTransport {
    /// Spawn `backend` on its own thread.
    pub fn spawn<B: Backend + 'static>(backend: B) -> Result<Self, BridgeError> {
        let (to_backend, inbox) = channel::unbounded::<FromVm>();
        let (outbox, from_backend) = channel::unbounded::<ToVm>();
        let handle = thread::Builder::new()
            .name("patchvm-worker".to_string())
            .spawn(move || run_backend(backend, inbox, outbox))
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;
        Ok(Self {
            to_backend: Some(to_backend),
            from_backend,
            handle: Some(handle),
        })
    }
}

fn run_backend<B: Backend>(
    mut backend: B,
    inbox: Receiver<FromVm>,
    outbox: Sender<ToVm>,
) {
    let mut produced = Vec::new();
    loop {
        match inbox.recv_timeout(POLL_INTERVAL) {
            Ok(message) => backend.handle(message, &mut produced),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        backend.poll(Instant::now(), &mut produced);
        for message in produced.drain(..) {
            if outbox.send(message).is_err() {
                debug!("Host hung up, stopping worker");
                return;
            }
        }
    }
    debug!("Worker channel closed");
}

impl Transport for ThreadTransport {
    fn send(
        &mut self,
        message: FromVm,
    ) -> Result<(), BridgeError> {
        let sender = self.to_backend.as_ref().ok_or(BridgeError::Disconnected)?;
        sender.send(message).map_err(|_| BridgeError::Disconnected)
    }

    fn try_recv(&mut self) -> Result<Option<ToVm>, BridgeError> {
        match self.from_backend.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BridgeError::Disconnected),
        }
    }

    fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ToVm>, BridgeError> {
        match self.from_backend.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::Disconnected),
        }
    }
}

impl Drop for ThreadTransport {
    fn drop(&mut self) {
        // Closing the sender ends the worker loop.
        self.to_backend.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }
    }
}
