//! Rendering backend seam.
//!
//! The session notifies its render target whenever part of the terminal
//! surface becomes stale.  Notifications are fire-and-forget: nothing the
//! backend returns changes session state.  Painting itself is supplied by a
//! pluggable backend; [`NullRenderer`] accepts every notification and does
//! nothing.

use std::sync::atomic::{AtomicU64, Ordering};

use conhost_core::Coord;
use thiserror::Error;

/// An inclusive rectangle of character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

/// Error type for render notifications.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait implemented by rendering backends.
pub trait RenderTarget: Send + Sync {
    /// A region was invalidated by the system (e.g. the window was uncovered).
    fn invalidate_system(&self, rect: CellRect) -> Result<(), RenderError>;

    /// The viewport scrolled by `delta` cells.
    fn invalidate_scroll(&self, delta: Coord) -> Result<(), RenderError>;

    /// The selection changed to cover `rects`.
    fn invalidate_selection(&self, rects: &[CellRect]) -> Result<(), RenderError>;

    /// A single region of the buffer changed.
    fn invalidate(&self, region: CellRect) -> Result<(), RenderError>;

    /// The whole frame must be repainted.
    fn invalidate_all(&self) -> Result<(), RenderError>;
}

/// A [`RenderTarget`] that paints nothing.
///
/// It counts the notifications it received so tests can see that a
/// notification happened.
#[derive(Debug, Default)]
pub struct NullRenderer {
    notifications: AtomicU64,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of invalidation notifications received.
    pub fn notification_count(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    fn note(&self) -> Result<(), RenderError> {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl RenderTarget for NullRenderer {
    fn invalidate_system(&self, _rect: CellRect) -> Result<(), RenderError> {
        self.note()
    }

    fn invalidate_scroll(&self, _delta: Coord) -> Result<(), RenderError> {
        self.note()
    }

    fn invalidate_selection(&self, _rects: &[CellRect]) -> Result<(), RenderError> {
        self.note()
    }

    fn invalidate(&self, _region: CellRect) -> Result<(), RenderError> {
        self.note()
    }

    fn invalidate_all(&self) -> Result<(), RenderError> {
        self.note()
    }
}
