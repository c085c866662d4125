//! Layout publication
//!
//! The interaction thread owns the layout rectangle; background threads read
//! it. Every layout pass publishes a brand new rectangle by swapping the
//! pointer, so a reader sees either the old rectangle or the new one, never a
//! mix of both.

use crate::geometry::Rect;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Surface layout state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    /// No layout pass has completed yet
    Unlaid,
    /// At least one layout rectangle has been published
    Laid,
}

/// Atomically swapped layout rectangle
#[derive(Debug, Default)]
pub struct LayoutCell {
    current: ArcSwapOption<Rect>,
}

impl LayoutCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new rectangle, returning the one it replaced
    pub fn publish(&self, rect: Rect) -> Option<Arc<Rect>> {
        self.current.swap(Some(Arc::new(rect)))
    }

    /// Current rectangle, if any layout pass has completed
    pub fn load(&self) -> Option<Arc<Rect>> {
        self.current.load_full()
    }

    /// Current rectangle by value, empty before the first layout
    pub fn get_or_empty(&self) -> Rect {
        self.current.load().as_deref().copied().unwrap_or_default()
    }

    pub fn state(&self) -> LayoutState {
        if self.current.load().is_some() {
            LayoutState::Laid
        } else {
            LayoutState::Unlaid
        }
    }
}
