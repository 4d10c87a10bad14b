//! SessionBootstrap: creates the session for the first connecting client.
//!
//! # Allocation sequence
//!
//! ```text
//! acquire SessionLock, wait out any initializing session
//!   ready session? ─► attach, done
//! release
//! resolve configuration            (no lock held)
//! negotiate display scaling        (once per process)
//! acquire SessionLock, wait out any initializing session
//!   ready session? ─► attach, done
//!   window requested?
//!     no  ─► mark NO_WINDOW, publish ready, release, done
//!     yes ─► publish initializing, spawn "console-input" thread
//! release SessionLock              ◄── the input thread needs the lock
//! wait for the ready signal        (bounded by the configured timeout)
//! reacquire SessionLock, revalidate
//!   read the status the input thread left in the session
//!   success ─► mark ready           (wakes waiting Connects)
//!   failure ─► unpublish            (wakes waiting Connects)
//! release
//! ```
//!
//! An initializing session is invisible to every client request, so no
//! client can attach to a session that may still fail.
//!
//! Waiting while still holding the lock would deadlock: the input thread
//! acquires the same lock to finish initializing.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use conhost_core::protocol::messages::{ProcessHandle, StatusCode};
use conhost_core::ConnectInfo;
use tracing::{debug, error, info, warn};

use crate::application::resolve_config::ConfigResolver;
use crate::application::session::{
    Session, SessionError, SessionFlags, SessionGuard, SessionId, SessionLock,
};
use crate::infrastructure::display::ProcessSetup;
use crate::infrastructure::render::RenderTarget;
use crate::infrastructure::window::WindowHost;

/// Name of the thread that owns the terminal window.
pub const INPUT_THREAD_NAME: &str = "console-input";

// ── Handshake ─────────────────────────────────────────────────────────────────

/// One-shot "initialization finished" signal from the input thread.
///
/// Only readiness travels through here; the outcome itself is written into
/// the session under the lock.  Exactly one side wins: either the input
/// thread reports ready, or the waiting bootstrap gives up and marks the
/// handshake abandoned, and the input thread then cleans up after itself.
#[derive(Debug, Default)]
struct InputHandshake {
    state: Mutex<HandshakeState>,
    signal: Condvar,
}

#[derive(Debug, Default)]
struct HandshakeState {
    ready: bool,
    abandoned: bool,
}

impl InputHandshake {
    /// Reports ready.  Returns `false` if the waiter already gave up.
    fn notify_ready(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.abandoned {
            return false;
        }
        state.ready = true;
        self.signal.notify_all();
        true
    }

    /// Blocks until ready.  `None` waits forever.  On timeout the handshake
    /// is marked abandoned and `false` is returned.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut state = match timeout {
            None => self
                .signal
                .wait_while(state, |s| !s.ready)
                .unwrap_or_else(|p| p.into_inner()),
            Some(limit) => {
                self.signal
                    .wait_timeout_while(state, limit, |s| !s.ready)
                    .unwrap_or_else(|p| p.into_inner())
                    .0
            }
        };
        if !state.ready {
            state.abandoned = true;
        }
        state.ready
    }
}

// ── Bootstrap ─────────────────────────────────────────────────────────────────

/// Creates sessions.  Shared by every thread that handles Connect requests.
pub struct SessionBootstrap {
    lock: Arc<SessionLock>,
    resolver: ConfigResolver,
    setup: Arc<ProcessSetup>,
    window_host: Arc<dyn WindowHost>,
    renderer: Arc<dyn RenderTarget>,
    input_init_timeout: Option<Duration>,
}

impl SessionBootstrap {
    /// Creates a bootstrap.  `input_init_timeout` of `None` waits for the
    /// input thread without limit.
    pub fn new(
        lock: Arc<SessionLock>,
        resolver: ConfigResolver,
        setup: Arc<ProcessSetup>,
        window_host: Arc<dyn WindowHost>,
        renderer: Arc<dyn RenderTarget>,
        input_init_timeout: Option<Duration>,
    ) -> Self {
        Self {
            lock,
            resolver,
            setup,
            window_host,
            renderer,
            input_init_timeout,
        }
    }

    /// The lock this bootstrap publishes sessions under.
    pub fn session_lock(&self) -> &Arc<SessionLock> {
        &self.lock
    }

    /// Creates and publishes the session for `process`.
    ///
    /// If a ready session already exists, `process` is attached to it and its
    /// id is returned without resolving any configuration.  If another
    /// allocation is still initializing its session, this call waits for it
    /// to settle first: it attaches if that session becomes ready, and
    /// allocates afresh if it was unpublished.
    ///
    /// # Errors
    ///
    /// - [`SessionError::OutOfResources`] if the input thread cannot start.
    /// - [`SessionError::Timeout`] if the input thread, or the one of a
    ///   concurrent allocation, does not signal ready in time.
    /// - [`SessionError::InputInitFailed`] with the status the input thread
    ///   left, if it is not `Success`.
    /// - [`SessionError::NoSession`] if the session was torn down during the
    ///   handshake.
    ///
    /// A session whose allocation fails is unpublished again.
    pub fn allocate(
        &self,
        process: ProcessHandle,
        info: &ConnectInfo,
    ) -> Result<SessionId, SessionError> {
        let mut guard = self.settled_guard()?;
        if let Some(id) = attach_to_ready(&mut guard, process, info) {
            return Ok(id);
        }
        drop(guard);

        let resolved = self.resolver.resolve(info);
        self.setup.ensure_display_scaling();

        let mut guard = self.settled_guard()?;
        if let Some(id) = attach_to_ready(&mut guard, process, info) {
            debug!(%id, "session published while resolving configuration");
            return Ok(id);
        }

        let mut session = Session::new(
            resolved.config,
            resolved.title,
            resolved.icon,
            process,
            info.process_group_id,
            Arc::clone(&self.renderer),
        );

        if !info.window_visible {
            session.set_flags(session.flags().with(SessionFlags::NO_WINDOW));
            let id = guard.publish(session);
            info!(%id, %process, "session allocated without a window");
            return Ok(id);
        }

        let id = guard.publish_initializing(session);
        let handshake = Arc::new(InputHandshake::default());
        let spawned = {
            let lock = Arc::clone(&self.lock);
            let host = Arc::clone(&self.window_host);
            let handshake = Arc::clone(&handshake);
            thread::Builder::new()
                .name(INPUT_THREAD_NAME.to_string())
                .spawn(move || run_input_thread(&lock, host.as_ref(), &handshake, id))
        };
        if let Err(e) = spawned {
            error!("failed to start the input thread: {e}");
            guard.take();
            return Err(SessionError::OutOfResources);
        }

        drop(guard);
        debug!(%id, "waiting for the input thread");
        if !handshake.wait(self.input_init_timeout) {
            // The input thread may still hold the lock, so it unpublishes the
            // session itself once it notices the handshake was abandoned.
            warn!(%id, timeout = ?self.input_init_timeout, "input thread did not become ready");
            return Err(SessionError::Timeout);
        }

        let mut guard = self.lock.lock();
        let session = guard.revalidate_id(id)?;
        match session.input_init_status() {
            Some(StatusCode::Success) => {
                guard.mark_ready(id)?;
                info!(%id, %process, "session allocated");
                Ok(id)
            }
            status => {
                let status = status.unwrap_or(StatusCode::Unsuccessful);
                warn!(%id, ?status, "input thread initialization failed");
                guard.take();
                Err(SessionError::InputInitFailed(status))
            }
        }
    }

    /// Acquires the lock once no session is initializing.
    fn settled_guard(&self) -> Result<SessionGuard<'_>, SessionError> {
        let guard = self.lock.lock();
        if guard.is_initializing() {
            debug!("waiting for a concurrent allocation to settle");
        }
        guard.wait_until_settled(self.input_init_timeout)
    }
}

/// Attaches `process` to the ready session, if there is one.
fn attach_to_ready(
    guard: &mut SessionGuard<'_>,
    process: ProcessHandle,
    info: &ConnectInfo,
) -> Option<SessionId> {
    let live = guard.revalidate().ok()?;
    live.attach_process(process, info.process_group_id);
    Some(live.id())
}

/// Body of the input thread: create the window under the lock, record the
/// outcome, signal, then pump messages.
fn run_input_thread(
    lock: &SessionLock,
    host: &dyn WindowHost,
    handshake: &InputHandshake,
    id: SessionId,
) {
    let window = {
        let mut guard = lock.lock();
        let session = match guard.revalidate_id(id) {
            Ok(session) => session,
            Err(_) => {
                debug!(%id, "session gone before the input thread started");
                drop(guard);
                let _ = handshake.notify_ready();
                return;
            }
        };

        match host.create_window(session.config(), session.title()) {
            Ok(window) => {
                session.set_window(window);
                if let Err(e) = session.renderer().invalidate_all() {
                    debug!("initial invalidation ignored: {e}");
                }
                session.set_input_init_status(StatusCode::Success);
                Some(window)
            }
            Err(e) => {
                warn!(%id, "window creation failed: {e}");
                session.set_input_init_status(StatusCode::Unsuccessful);
                None
            }
        }
    };
    if !handshake.notify_ready() {
        warn!(%id, "allocation gave up on this input thread; unpublishing its session");
        let mut guard = lock.lock();
        if guard.revalidate_id(id).is_ok() {
            guard.take();
        }
        return;
    }

    if let Some(window) = window {
        host.run_message_loop(window);
    }
    debug!(%id, "input thread exiting");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
