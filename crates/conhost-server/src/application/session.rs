//! The shared session and the lock that guards it.
//!
//! Exactly one [`Session`] exists per server connection.  Client threads, the
//! I/O thread, and the input thread all reach it through the one
//! [`SessionLock`], and always in the same three steps:
//!
//! ```text
//! acquire ─► revalidate ─► act ─► release
//! ```
//!
//! *Revalidate* checks, right after acquiring, that a live session still
//! exists (and, for callers holding a [`SessionId`], that it is still the
//! same one).  A disconnect handled elsewhere can tear the session down
//! between two acquisitions, so every caller must be ready for
//! [`SessionError::NoSession`].
//!
//! A session whose input thread is still starting is *initializing*: it is
//! published so the input thread can find it, but ordinary revalidation does
//! not see it.  Callers that need a settled session wait on the lock's
//! condition variable until the session becomes ready or is unpublished.
//!
//! The lock is coarse on purpose: it covers the session and every process
//! record, not individual fields.  [`SessionGuard`] is the only way to obtain
//! a `&mut Session`, and dropping it is the release, so every exit path
//! (including `?` returns) releases the lock.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use conhost_core::domain::code_page::lang_id_for_code_page;
use conhost_core::protocol::messages::{ProcessHandle, StatusCode};
use conhost_core::SessionConfig;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::resolve_config::IconReference;
use crate::infrastructure::render::RenderTarget;
use crate::infrastructure::window::WindowHandle;

/// Identity of one published session.
pub type SessionId = Uuid;

/// Error type for session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No live session, or not the session the caller expected.
    #[error("no live session")]
    NoSession,

    /// The request names a process that is not attached.
    #[error("{0} is not attached to the session")]
    UnknownProcess(ProcessHandle),

    /// A required thread or buffer could not be allocated.
    #[error("out of resources")]
    OutOfResources,

    /// The input thread did not finish initializing in time.
    #[error("timed out waiting for the input thread")]
    Timeout,

    /// The input thread reported a failed initialization.
    #[error("input thread initialization failed: {0:?}")]
    InputInitFailed(StatusCode),
}

impl SessionError {
    /// The reply status this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            SessionError::NoSession | SessionError::UnknownProcess(_) => StatusCode::InvalidHandle,
            SessionError::OutOfResources => StatusCode::NoMemory,
            SessionError::Timeout => StatusCode::Timeout,
            SessionError::InputInitFailed(status) => *status,
        }
    }
}

// ── Session flags ─────────────────────────────────────────────────────────────

/// Process-global flags of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionFlags(pub u32);

impl SessionFlags {
    /// The session runs without a window and without an input thread.
    pub const NO_WINDOW: u32 = 0x0000_0001;

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }
}

// ── Process records ───────────────────────────────────────────────────────────

/// Per-process command-history reservation.
///
/// Only the sizing is recorded here; the history itself belongs to the
/// command handlers.  The reservation is freed with its process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHistory {
    capacity: usize,
    allow_duplicates: bool,
}

impl CommandHistory {
    fn for_config(config: &SessionConfig) -> Self {
        Self {
            capacity: config.history_buffer_size as usize,
            allow_duplicates: !config.history_no_dup,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn allows_duplicates(&self) -> bool {
        self.allow_duplicates
    }
}

/// One attached client process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    handle: ProcessHandle,
    process_group_id: u32,
    root: bool,
    history: CommandHistory,
}

impl ProcessRecord {
    fn new(handle: ProcessHandle, process_group_id: u32, root: bool, config: &SessionConfig) -> Self {
        Self {
            handle,
            process_group_id,
            root,
            history: CommandHistory::for_config(config),
        }
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }

    pub fn process_group_id(&self) -> u32 {
        self.process_group_id
    }

    /// `true` for the process whose detachment moves window ownership.
    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Lifecycle of a published session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Published for its input thread; not yet visible to clients.
    Initializing,
    /// Fully initialized.
    Ready,
}

/// The server-side state of one terminal.
pub struct Session {
    id: SessionId,
    state: SessionState,
    config: SessionConfig,
    title: String,
    icon: IconReference,
    flags: SessionFlags,
    window: Option<WindowHandle>,
    window_owner: Option<ProcessHandle>,
    processes: Vec<ProcessRecord>,
    renderer: Arc<dyn RenderTarget>,
    input_init_status: Option<StatusCode>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("title", &self.title)
            .field("flags", &self.flags)
            .field("window", &self.window)
            .field("window_owner", &self.window_owner)
            .field("processes", &self.processes)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session whose first process, `root`, owns the window.
    ///
    /// Its state is fixed when it is published.
    pub fn new(
        config: SessionConfig,
        title: String,
        icon: IconReference,
        root: ProcessHandle,
        process_group_id: u32,
        renderer: Arc<dyn RenderTarget>,
    ) -> Self {
        let processes = vec![ProcessRecord::new(root, process_group_id, true, &config)];
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Ready,
            config,
            title,
            icon,
            flags: SessionFlags::default(),
            window: None,
            window_owner: Some(root),
            processes,
            renderer,
            input_init_status: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon(&self) -> &IconReference {
        &self.icon
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: SessionFlags) {
        self.flags = flags;
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    pub fn set_window(&mut self, window: WindowHandle) {
        self.window = Some(window);
    }

    /// The process that currently owns the window, if any.
    pub fn window_owner(&self) -> Option<ProcessHandle> {
        self.window_owner
    }

    pub fn processes(&self) -> &[ProcessRecord] {
        &self.processes
    }

    pub fn renderer(&self) -> &dyn RenderTarget {
        self.renderer.as_ref()
    }

    /// Status the input thread left after initializing, if it has.
    pub fn input_init_status(&self) -> Option<StatusCode> {
        self.input_init_status
    }

    pub fn set_input_init_status(&mut self, status: StatusCode) {
        self.input_init_status = Some(status);
    }

    /// Fails with [`SessionError::UnknownProcess`] unless `handle` is
    /// attached.
    pub fn require_process(&self, handle: ProcessHandle) -> Result<&ProcessRecord, SessionError> {
        self.processes
            .iter()
            .find(|p| p.handle == handle)
            .ok_or(SessionError::UnknownProcess(handle))
    }

    /// Attaches another client process.  Attaching an already attached
    /// process changes nothing.
    pub fn attach_process(&mut self, handle: ProcessHandle, process_group_id: u32) {
        if self.require_process(handle).is_ok() {
            debug!(%handle, "process already attached");
            return;
        }
        let record = ProcessRecord::new(handle, process_group_id, false, &self.config);
        self.processes.push(record);
        if self.window_owner.is_none() {
            self.window_owner = Some(handle);
        }
        debug!(%handle, count = self.processes.len(), "process attached");
    }

    /// Detaches a client process and frees its record.
    ///
    /// When the root process leaves, the next remaining process becomes root
    /// and window owner; with no process left there is no owner.  The session
    /// itself stays alive either way.
    pub fn remove_process(&mut self, handle: ProcessHandle) -> Result<(), SessionError> {
        let index = self
            .processes
            .iter()
            .position(|p| p.handle == handle)
            .ok_or(SessionError::UnknownProcess(handle))?;
        let removed = self.processes.remove(index);

        if removed.root {
            self.window_owner = self.processes.first_mut().map(|next| {
                next.root = true;
                next.handle
            });
            debug!(%handle, owner = ?self.window_owner, "root process detached");
        } else {
            debug!(%handle, "process detached");
        }
        Ok(())
    }

    /// Language id matching the session's output code page.
    pub fn lang_id(&self) -> u16 {
        lang_id_for_code_page(self.config.code_page)
    }
}

// ── SessionLock ───────────────────────────────────────────────────────────────

/// Outcome of [`SessionLock::try_tear_down`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TearDown {
    /// The live session was unpublished.
    Removed(SessionId),
    /// Nothing was published.
    Empty,
    /// Another thread holds the lock; nothing was done.
    Busy,
}

/// The single mutual-exclusion domain around the live [`Session`].
#[derive(Debug, Default)]
pub struct SessionLock {
    slot: Mutex<Option<Session>>,
    /// Signalled whenever an initializing session becomes ready or is
    /// unpublished.
    settled: Condvar,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock.
    ///
    /// A poisoned lock is recovered: every mutation completes before its
    /// guard is dropped, so the data behind a poisoned lock is consistent.
    pub fn lock(&self) -> SessionGuard<'_> {
        let guard = self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("session lock poisoned by a panicking holder; recovering");
            poisoned.into_inner()
        });
        SessionGuard {
            guard,
            settled: &self.settled,
        }
    }

    /// Runs `op` against the ready session: acquire, revalidate, act, release.
    pub fn with_session<R>(
        &self,
        op: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut guard = self.lock();
        let session = guard.revalidate()?;
        Ok(op(session))
    }

    /// Like [`with_session`](Self::with_session), but only if the published
    /// session is still `expected`, whatever its state.
    pub fn with_live_session<R>(
        &self,
        expected: SessionId,
        op: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let mut guard = self.lock();
        let session = guard.revalidate_id(expected)?;
        Ok(op(session))
    }

    /// `true` while a session is published.
    pub fn is_live(&self) -> bool {
        self.lock().is_live()
    }

    /// Unpublishes the live session without waiting for the lock.
    ///
    /// Used on the disconnect path, which must not block behind a holder
    /// that may never release.
    pub fn try_tear_down(&self) -> TearDown {
        let slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("session lock poisoned by a panicking holder; recovering");
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => return TearDown::Busy,
        };
        let mut guard = SessionGuard {
            guard: slot,
            settled: &self.settled,
        };
        match guard.take() {
            Some(session) => {
                info!(id = %session.id, "session torn down");
                TearDown::Removed(session.id)
            }
            None => TearDown::Empty,
        }
    }
}

/// Proof of holding the [`SessionLock`].  Dropping it releases the lock.
pub struct SessionGuard<'a> {
    guard: MutexGuard<'a, Option<Session>>,
    settled: &'a Condvar,
}

impl SessionGuard<'_> {
    /// Returns the ready session, or [`SessionError::NoSession`].  An
    /// initializing session is not returned.
    pub fn revalidate(&mut self) -> Result<&mut Session, SessionError> {
        match self.guard.as_mut() {
            Some(session) if session.state == SessionState::Ready => Ok(session),
            _ => Err(SessionError::NoSession),
        }
    }

    /// Returns the published session if it is still `expected`, in any state.
    pub fn revalidate_id(&mut self, expected: SessionId) -> Result<&mut Session, SessionError> {
        match self.guard.as_mut() {
            Some(session) if session.id == expected => Ok(session),
            _ => Err(SessionError::NoSession),
        }
    }

    /// `true` while a session is published, in any state.
    pub fn is_live(&self) -> bool {
        self.guard.is_some()
    }

    /// `true` while the published session is still initializing.
    pub fn is_initializing(&self) -> bool {
        self.guard
            .as_ref()
            .is_some_and(|s| s.state == SessionState::Initializing)
    }

    /// Releases the lock until no initializing session is published, then
    /// reacquires it.  `None` waits forever.
    ///
    /// # Errors
    ///
    /// [`SessionError::Timeout`] if the session is still initializing when
    /// `timeout` elapses.
    pub fn wait_until_settled(self, timeout: Option<Duration>) -> Result<Self, SessionError> {
        let SessionGuard { guard, settled } = self;
        let initializing = |slot: &mut Option<Session>| {
            slot.as_ref()
                .is_some_and(|s| s.state == SessionState::Initializing)
        };
        let guard = match timeout {
            None => settled
                .wait_while(guard, initializing)
                .unwrap_or_else(|p| p.into_inner()),
            Some(limit) => {
                let (guard, result) = settled
                    .wait_timeout_while(guard, limit, initializing)
                    .unwrap_or_else(|p| p.into_inner());
                if result.timed_out() {
                    return Err(SessionError::Timeout);
                }
                guard
            }
        };
        Ok(SessionGuard { guard, settled })
    }

    /// Publishes a ready `session` and returns its id.  Any previous session
    /// is replaced.
    pub fn publish(&mut self, mut session: Session) -> SessionId {
        session.state = SessionState::Ready;
        self.install(session)
    }

    /// Publishes `session` in the initializing state.  It stays invisible to
    /// [`revalidate`](Self::revalidate) until [`mark_ready`](Self::mark_ready).
    pub fn publish_initializing(&mut self, mut session: Session) -> SessionId {
        session.state = SessionState::Initializing;
        self.install(session)
    }

    /// Marks the published session `expected` ready and wakes waiters.
    pub fn mark_ready(&mut self, expected: SessionId) -> Result<(), SessionError> {
        self.revalidate_id(expected)?.state = SessionState::Ready;
        self.settled.notify_all();
        Ok(())
    }

    /// Unpublishes the live session and wakes waiters.
    pub fn take(&mut self) -> Option<Session> {
        let taken = self.guard.take();
        if taken.is_some() {
            self.settled.notify_all();
        }
        taken
    }

    fn install(&mut self, session: Session) -> SessionId {
        let id = session.id;
        if self.guard.replace(session).is_some() {
            warn!("a live session was replaced");
        }
        self.settled.notify_all();
        id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::render::NullRenderer;

    fn make_session(root: u64) -> Session {
        Session::new(
            SessionConfig::default(),
            "test".to_string(),
            IconReference {
                location: "cmd.exe".to_string(),
                index: 0,
            },
            ProcessHandle(root),
            root as u32,
            Arc::new(NullRenderer::new()),
        )
    }

    // ── SessionError ──────────────────────────────────────────────────────────

    #[test]
    fn test_session_errors_map_to_distinct_statuses() {
        assert_eq!(SessionError::NoSession.status(), StatusCode::InvalidHandle);
        assert_eq!(
            SessionError::UnknownProcess(ProcessHandle(1)).status(),
            StatusCode::InvalidHandle
        );
        assert_eq!(SessionError::OutOfResources.status(), StatusCode::NoMemory);
        assert_eq!(SessionError::Timeout.status(), StatusCode::Timeout);
        assert_eq!(
            SessionError::InputInitFailed(StatusCode::NotSupported).status(),
            StatusCode::NotSupported
        );
    }

    // ── Session ───────────────────────────────────────────────────────────────

    #[test]
    fn test_new_session_has_root_owner() {
        let session = make_session(1);
        assert_eq!(session.processes().len(), 1);
        assert!(session.processes()[0].is_root());
        assert_eq!(session.window_owner(), Some(ProcessHandle(1)));
        assert_eq!(session.processes()[0].history().capacity(), 50);
        assert!(session.processes()[0].history().allows_duplicates());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn test_attach_process_adds_non_root_record_once() {
        // Arrange
        let mut session = make_session(1);

        // Act
        session.attach_process(ProcessHandle(2), 2);
        session.attach_process(ProcessHandle(2), 2);

        // Assert
        assert_eq!(session.processes().len(), 2);
        assert!(!session.require_process(ProcessHandle(2)).expect("attached").is_root());
        assert_eq!(session.window_owner(), Some(ProcessHandle(1)));
    }

    #[test]
    fn test_removing_root_transfers_ownership() {
        // Arrange
        let mut session = make_session(1);
        session.attach_process(ProcessHandle(2), 2);
        session.attach_process(ProcessHandle(3), 3);

        // Act
        session.remove_process(ProcessHandle(1)).expect("remove");

        // Assert
        assert_eq!(session.window_owner(), Some(ProcessHandle(2)));
        assert!(session.require_process(ProcessHandle(2)).expect("attached").is_root());
        assert!(session.require_process(ProcessHandle(1)).is_err());
    }

    #[test]
    fn test_removing_last_process_leaves_no_owner() {
        let mut session = make_session(1);
        session.remove_process(ProcessHandle(1)).expect("remove");
        assert_eq!(session.window_owner(), None);
        assert!(session.processes().is_empty());
    }

    #[test]
    fn test_removing_non_root_keeps_owner() {
        let mut session = make_session(1);
        session.attach_process(ProcessHandle(2), 2);
        session.remove_process(ProcessHandle(2)).expect("remove");
        assert_eq!(session.window_owner(), Some(ProcessHandle(1)));
    }

    #[test]
    fn test_removing_unknown_process_fails() {
        let mut session = make_session(1);
        assert_eq!(
            session.remove_process(ProcessHandle(9)),
            Err(SessionError::UnknownProcess(ProcessHandle(9)))
        );
    }

    #[test]
    fn test_lang_id_follows_code_page() {
        let mut session = make_session(1);
        assert_eq!(session.lang_id(), 0x0409);
        session.config.code_page = 932;
        assert_eq!(session.lang_id(), 0x0411);
    }

    // ── SessionLock ───────────────────────────────────────────────────────────

    #[test]
    fn test_empty_lock_revalidates_to_no_session() {
        let lock = SessionLock::new();
        assert!(!lock.is_live());
        assert_eq!(lock.with_session(|_| ()), Err(SessionError::NoSession));
    }

    #[test]
    fn test_with_session_runs_against_published_session() {
        // Arrange
        let lock = SessionLock::new();
        let id = lock.lock().publish(make_session(1));

        // Act
        let title = lock.with_session(|s| s.title().to_string());

        // Assert
        assert_eq!(title, Ok("test".to_string()));
        assert_eq!(lock.with_live_session(id, |s| s.id()), Ok(id));
    }

    #[test]
    fn test_revalidation_rejects_replaced_session() {
        // Arrange
        let lock = SessionLock::new();
        let old = lock.lock().publish(make_session(1));
        assert_eq!(lock.try_tear_down(), TearDown::Removed(old));
        lock.lock().publish(make_session(2));

        // Act / Assert
        assert_eq!(lock.with_live_session(old, |_| ()), Err(SessionError::NoSession));
        assert!(lock.with_session(|_| ()).is_ok());
    }

    #[test]
    fn test_tear_down_removes_session_once() {
        let lock = SessionLock::new();
        let id = lock.lock().publish(make_session(1));
        assert_eq!(lock.try_tear_down(), TearDown::Removed(id));
        assert_eq!(lock.try_tear_down(), TearDown::Empty);
        assert!(!lock.is_live());
    }

    #[test]
    fn test_tear_down_does_not_wait_for_busy_lock() {
        // Arrange
        let lock = SessionLock::new();
        lock.lock().publish(make_session(1));

        // Act
        let guard = lock.lock();
        let outcome = lock.try_tear_down();
        drop(guard);

        // Assert
        assert_eq!(outcome, TearDown::Busy);
        assert!(lock.is_live());
    }

    #[test]
    fn test_initializing_session_is_hidden_from_revalidate() {
        // Arrange
        let lock = SessionLock::new();
        let id = lock.lock().publish_initializing(make_session(1));

        // Act / Assert
        assert!(lock.is_live());
        assert!(lock.lock().is_initializing());
        assert_eq!(lock.with_session(|_| ()), Err(SessionError::NoSession));
        assert!(lock.with_live_session(id, |_| ()).is_ok());

        lock.lock().mark_ready(id).expect("mark ready");
        assert!(lock.with_session(|_| ()).is_ok());
    }

    #[test]
    fn test_waiter_wakes_when_session_becomes_ready() {
        // Arrange
        let lock = Arc::new(SessionLock::new());
        let id = lock.lock().publish_initializing(make_session(1));
        let finisher = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                lock.lock().mark_ready(id).expect("mark ready");
            })
        };

        // Act
        let mut guard = lock
            .lock()
            .wait_until_settled(Some(Duration::from_secs(5)))
            .expect("settled");

        // Assert
        assert_eq!(guard.revalidate().map(|s| s.id()), Ok(id));
        drop(guard);
        finisher.join().expect("finisher");
    }

    #[test]
    fn test_waiter_wakes_when_initializing_session_is_taken() {
        let lock = Arc::new(SessionLock::new());
        lock.lock().publish_initializing(make_session(1));
        let remover = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                lock.lock().take();
            })
        };

        let guard = lock.lock().wait_until_settled(None).expect("settled");

        assert!(!guard.is_live());
        drop(guard);
        remover.join().expect("remover");
    }

    #[test]
    fn test_waiting_on_stuck_initialization_times_out() {
        let lock = SessionLock::new();
        lock.lock().publish_initializing(make_session(1));

        let result = lock.lock().wait_until_settled(Some(Duration::from_millis(20)));

        assert!(matches!(result, Err(SessionError::Timeout)));
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        // Arrange
        let lock = Arc::new(SessionLock::new());
        lock.lock().publish(make_session(1));
        let poisoner = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("holder panics");
        })
        .join();

        // Act / Assert
        assert!(lock.with_session(|s| s.processes().len()).is_ok());
    }
}
