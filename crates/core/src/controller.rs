//! Document controller capability set
//!
//! The surface never knows the concrete document model. Everything it needs
//! (touch interpretation, layout reactions, current page, zoom, which pages
//! are visible) is reached through [`DocumentController`].

use crate::geometry::{Rect, RectF};
use std::sync::Arc;

/// Identity of a document controller instance, carried in every snapshot so
/// that frames produced for a replaced controller can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub u64);

/// Zero-based page index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(pub u32);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resolvable page and its bounds at zoom 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRef {
    pub id: PageId,
    pub base_bounds: RectF,
}

impl PageRef {
    pub fn new(id: PageId, base_bounds: RectF) -> Self {
        Self { id, base_bounds }
    }

    /// Page bounds in document coordinates at the given zoom
    pub fn bounds(&self, zoom: f32) -> RectF {
        self.base_bounds.scaled(zoom)
    }
}

/// A page that should be drawn for a snapshot, with its bounds already
/// resolved at the snapshot's zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageView {
    pub page: PageId,
    pub bounds: RectF,
}

/// Touch phase reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// A single touch sample in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub action: TouchAction,
    pub x: f32,
    pub y: f32,
    /// Event time in milliseconds, monotonic within one gesture
    pub time_ms: u64,
}

impl TouchEvent {
    pub fn new(action: TouchAction, x: f32, y: f32, time_ms: u64) -> Self {
        Self { action, x, y, time_ms }
    }
}

/// Layout notification forwarded on every layout pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutChange {
    /// The platform reported a size or position change
    pub changed: bool,
    /// The surface's layout lock was held during this pass
    pub locked: bool,
    /// Previous layout, `None` on the first pass
    pub old: Option<Rect>,
    pub new: Rect,
}

/// Injected document controller.
///
/// Implementations must be callable from the interaction thread and from the
/// scroll coordinator thread.
pub trait DocumentController: Send + Sync {
    /// Stable identity of this controller
    fn id(&self) -> ControllerId;

    /// Interpret a touch event. Returns `true` when the event was consumed.
    fn on_touch_event(&self, event: &TouchEvent) -> bool;

    /// React to a layout pass
    fn on_layout_changed(&self, change: LayoutChange);

    /// Coalesced scroll position stream
    fn on_scroll_changed(&self, cur_x: i32, cur_y: i32, old_x: i32, old_y: i32);

    /// Page the user is currently reading, if one is resolvable
    fn current_page(&self) -> Option<PageRef>;

    /// Current zoom factor (1.0 = 100%)
    fn zoom(&self) -> f32;

    /// Pages intersecting `view_rect` at the current zoom
    fn visible_pages(&self, view_rect: &RectF) -> Vec<PageView>;

    /// Render pages with inverted colors (night mode)
    fn inverted(&self) -> bool {
        false
    }

    /// Scroll range used by the default fling fallback
    fn scroll_limits(&self) -> Rect {
        Rect::new(0, 0, i32::MAX, i32::MAX)
    }
}

/// Shared handle to the injected controller
pub type SharedController = Arc<dyn DocumentController>;
