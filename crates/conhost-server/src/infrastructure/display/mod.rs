//! One-time, process-wide display-scaling negotiation.
//!
//! A process can declare its DPI awareness only once.  [`ProcessSetup`]
//! remembers the outcome of the first negotiation and never repeats it:
//!
//! 1. Ask for per-monitor v2 awareness.
//! 2. If that mode is unavailable, fall back to per-monitor v1 awareness and
//!    turn on dialog scaling so child dialogs still follow the monitor DPI.

use std::sync::OnceLock;

use tracing::{debug, info};

#[cfg(target_os = "windows")]
pub mod win32;

/// The awareness mode the process ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    PerMonitorV2,
    PerMonitorV1WithDialogScaling,
}

/// Trait abstracting the platform's DPI-awareness API.
///
/// The Windows implementation lives in [`win32`]; every other platform uses
/// [`HeadlessDisplayScaling`].
pub trait DisplayScaling: Send + Sync {
    /// Tries to enter per-monitor v2 awareness; `false` if unavailable.
    fn set_per_monitor_v2(&self) -> bool;

    /// Enters per-monitor v1 awareness.
    fn set_per_monitor_v1(&self);

    /// Lets child dialogs scale with the monitor DPI.
    fn enable_dialog_scaling(&self);
}

/// A [`DisplayScaling`] for hosts without a display.  Every mode is
/// "available" and nothing happens.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessDisplayScaling;

impl DisplayScaling for HeadlessDisplayScaling {
    fn set_per_monitor_v2(&self) -> bool {
        true
    }

    fn set_per_monitor_v1(&self) {}

    fn enable_dialog_scaling(&self) {}
}

/// Returns the display-scaling implementation for the current platform.
pub fn platform_display_scaling() -> Box<dyn DisplayScaling> {
    #[cfg(target_os = "windows")]
    {
        Box::new(win32::Win32DisplayScaling)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(HeadlessDisplayScaling)
    }
}

/// Platform setup that must happen at most once per process lifetime.
pub struct ProcessSetup {
    scaling: Box<dyn DisplayScaling>,
    mode: OnceLock<ScalingMode>,
}

impl ProcessSetup {
    pub fn new(scaling: Box<dyn DisplayScaling>) -> Self {
        Self {
            scaling,
            mode: OnceLock::new(),
        }
    }

    /// Negotiates display scaling on the first call and returns the cached
    /// outcome on every later call.
    pub fn ensure_display_scaling(&self) -> ScalingMode {
        *self.mode.get_or_init(|| {
            let mode = if self.scaling.set_per_monitor_v2() {
                ScalingMode::PerMonitorV2
            } else {
                debug!("per-monitor v2 awareness unavailable, falling back to v1");
                self.scaling.set_per_monitor_v1();
                self.scaling.enable_dialog_scaling();
                ScalingMode::PerMonitorV1WithDialogScaling
            };
            info!(?mode, "display scaling negotiated");
            mode
        })
    }

    /// The negotiated mode, if negotiation already ran.
    pub fn scaling_mode(&self) -> Option<ScalingMode> {
        self.mode.get().copied()
    }
}
