//! Win32 display-scaling negotiation.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use tracing::{debug, warn};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwareness, SetProcessDpiAwarenessContext,
    DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2, PROCESS_PER_MONITOR_DPI_AWARE,
};

use super::DisplayScaling;

/// [`DisplayScaling`] backed by the Win32 HiDpi API.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32DisplayScaling;

impl DisplayScaling for Win32DisplayScaling {
    fn set_per_monitor_v2(&self) -> bool {
        // SAFETY: plain FFI call with a predefined context constant; no
        // pointers are passed.
        unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) }
            .is_ok()
    }

    fn set_per_monitor_v1(&self) {
        // SAFETY: plain FFI call with an enum argument.
        if let Err(e) = unsafe { SetProcessDpiAwareness(PROCESS_PER_MONITOR_DPI_AWARE) } {
            warn!("SetProcessDpiAwareness failed: {e}");
        }
    }

    fn enable_dialog_scaling(&self) {
        // Per-monitor dialog scaling has no public Win32 entry point; v1
        // awareness alone already scales top-level windows.
        debug!("per-monitor dialog scaling not available through the public API");
    }
}
