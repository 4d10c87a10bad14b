//! IoServiceLoop: the server's read → dispatch → reply loop.
//!
//! # State machine
//!
//! ```text
//!              transient error (logged)
//!                 ┌────────┐
//!                 ▼        │
//!   ┌──────────────────────┴──┐  peer disconnected   ┌────────────┐
//!   │        Servicing        │ ───────────────────► │ Terminated │
//!   └─────────────────────────┘                      └────────────┘
//! ```
//!
//! Each iteration first releases the reply buffer kept from the previous
//! iteration, then blocks on the channel for one request, dispatches it, and
//! writes the reply.  The reply buffer stays alive until the next iteration
//! begins.
//!
//! A disconnect ends the loop without another read.  The session is
//! unpublished only if the lock is free at that moment; the loop never waits
//! for it.  The caller is expected to exit the process right after.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::application::dispatch::CommandDispatcher;
use crate::application::session::{SessionLock, TearDown};
use crate::infrastructure::channel::{ChannelError, DeviceChannel};

/// State of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Servicing,
    Terminated,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The channel peer disconnected.
    Disconnected,
}

/// Drives one device channel.
pub struct IoServiceLoop<C, D> {
    channel: C,
    dispatcher: D,
    lock: Arc<SessionLock>,
    state: LoopState,
    pending_reply: Option<Vec<u8>>,
    serviced: u64,
}

impl<C: DeviceChannel, D: CommandDispatcher> IoServiceLoop<C, D> {
    pub fn new(channel: C, dispatcher: D, lock: Arc<SessionLock>) -> Self {
        Self {
            channel,
            dispatcher,
            lock,
            state: LoopState::Servicing,
            pending_reply: None,
            serviced: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Number of requests dispatched so far.
    pub fn serviced(&self) -> u64 {
        self.serviced
    }

    /// `true` while the previous reply buffer is still held.
    pub fn holds_reply(&self) -> bool {
        self.pending_reply.is_some()
    }

    /// Runs until the channel disconnects.
    pub fn run(mut self) -> LoopExit {
        info!("service loop started");
        loop {
            if let ControlFlow::Break(exit) = self.step() {
                return exit;
            }
        }
    }

    /// Runs one iteration.
    pub fn step(&mut self) -> ControlFlow<LoopExit> {
        if self.state == LoopState::Terminated {
            return ControlFlow::Break(LoopExit::Disconnected);
        }

        // The previous reply is no longer needed once a new iteration begins.
        self.pending_reply = None;

        let request = match self.channel.read_request() {
            Ok(request) => request,
            Err(ChannelError::Disconnected) => return self.terminate(),
            Err(e) => {
                warn!("device channel read failed: {e}");
                return ControlFlow::Continue(());
            }
        };

        trace!(len = request.len(), "dispatching request");
        let reply = self.dispatcher.dispatch(&request);
        self.serviced += 1;

        match self.channel.write_reply(&reply) {
            Ok(()) => {}
            Err(ChannelError::Disconnected) => return self.terminate(),
            Err(e) => warn!("device channel write failed: {e}"),
        }
        self.pending_reply = Some(reply);
        ControlFlow::Continue(())
    }

    fn terminate(&mut self) -> ControlFlow<LoopExit> {
        info!(serviced = self.serviced, "device channel disconnected");
        self.state = LoopState::Terminated;
        match self.lock.try_tear_down() {
            TearDown::Removed(_) => {}
            TearDown::Empty => debug!("no session to tear down"),
            TearDown::Busy => {
                warn!("session lock busy at disconnect; leaving the session in place")
            }
        }
        ControlFlow::Break(LoopExit::Disconnected)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
