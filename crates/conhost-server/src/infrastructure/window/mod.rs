//! Window host seam used by the input thread.
//!
//! The input thread owns the terminal window: it creates it while holding the
//! session lock during initialization, and afterwards pumps its messages
//! until the window is closed.  [`HeadlessWindowHost`] hands out window
//! handles without any desktop, which is what the server binary and the
//! tests use.

use std::sync::atomic::{AtomicU64, Ordering};

use conhost_core::SessionConfig;
use thiserror::Error;
use tracing::debug;

/// Opaque handle of a terminal window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Error type for window creation.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("window creation failed: {0}")]
    CreateFailed(String),
}

/// Trait abstracting the windowing system.
pub trait WindowHost: Send + Sync {
    /// Creates the terminal window for a session with `config`.
    fn create_window(&self, config: &SessionConfig, title: &str)
        -> Result<WindowHandle, WindowError>;

    /// Pumps window messages; returns once the window is gone.
    fn run_message_loop(&self, window: WindowHandle);
}

/// A [`WindowHost`] with no desktop behind it.
#[derive(Debug)]
pub struct HeadlessWindowHost {
    next_handle: AtomicU64,
}

impl HeadlessWindowHost {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
        }
    }
}

impl Default for HeadlessWindowHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for HeadlessWindowHost {
    fn create_window(
        &self,
        config: &SessionConfig,
        title: &str,
    ) -> Result<WindowHandle, WindowError> {
        let handle = WindowHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        debug!(
            ?handle,
            title,
            width = config.window_size.x,
            height = config.window_size.y,
            "headless window created"
        );
        Ok(handle)
    }

    fn run_message_loop(&self, window: WindowHandle) {
        // No messages ever arrive for a headless window.
        debug!(?window, "headless message loop finished");
    }
}
