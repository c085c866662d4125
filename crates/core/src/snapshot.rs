//! Immutable render state
//!
//! A [`RenderStateSnapshot`] describes what to draw at one instant. It is
//! built once, wrapped in an `Arc`, and then handed across the interaction,
//! draw and decode threads without further mutation.

use crate::controller::{ControllerId, PageView};
use crate::geometry::{Rect, RectF};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot shared between threads
pub type SharedSnapshot = Arc<RenderStateSnapshot>;

/// Monotonic counter issuing snapshot sequence ids for one surface.
///
/// The first id handed out is 1, so 0 can mean "nothing observed yet".
#[derive(Debug, Default)]
pub struct SnapshotSequencer {
    last: AtomicU64,
}

impl SnapshotSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence id
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last id issued, 0 if none
    pub fn last_id(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

/// What to draw: document position, zoom, layout and controller identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStateSnapshot {
    controller: ControllerId,
    zoom: f32,
    layout: Rect,
    scroll: (i32, i32),
    sequence_id: u64,
    added_to_queue: bool,
    inverted: bool,
    pages: Vec<PageView>,
}

impl RenderStateSnapshot {
    /// Start building a snapshot with the given sequence id
    pub fn builder(controller: ControllerId, sequence_id: u64) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: Self {
                controller,
                zoom: 1.0,
                layout: Rect::default(),
                scroll: (0, 0),
                sequence_id,
                added_to_queue: false,
                inverted: false,
                pages: Vec::new(),
            },
        }
    }

    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn layout(&self) -> Rect {
        self.layout
    }

    pub fn scroll(&self) -> (i32, i32) {
        self.scroll
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// The snapshot was created by the draw call itself rather than picked
    /// up from the scheduler
    pub fn added_to_queue(&self) -> bool {
        self.added_to_queue
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    /// Pages to draw, with bounds resolved at [`zoom`](Self::zoom)
    pub fn pages(&self) -> &[PageView] {
        &self.pages
    }

    /// Viewport in document coordinates
    pub fn view_rect(&self) -> RectF {
        let (x, y) = self.scroll;
        self.layout.placed_at(x, y)
    }

    /// Zoom bucket used to key cached bitmaps (percent, rounded)
    pub fn zoom_key(&self) -> u32 {
        zoom_key(self.zoom)
    }
}

/// Zoom bucket for a zoom factor, in whole percent
pub fn zoom_key(zoom: f32) -> u32 {
    (zoom * 100.0).round().max(0.0) as u32
}

/// Builder for [`RenderStateSnapshot`]
#[derive(Debug)]
pub struct SnapshotBuilder {
    snapshot: RenderStateSnapshot,
}

impl SnapshotBuilder {
    pub fn zoom(mut self, zoom: f32) -> Self {
        self.snapshot.zoom = zoom;
        self
    }

    pub fn layout(mut self, layout: Rect) -> Self {
        self.snapshot.layout = layout;
        self
    }

    pub fn scroll(mut self, x: i32, y: i32) -> Self {
        self.snapshot.scroll = (x, y);
        self
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.snapshot.inverted = inverted;
        self
    }

    pub fn pages(mut self, pages: Vec<PageView>) -> Self {
        self.snapshot.pages = pages;
        self
    }

    pub fn added_to_queue(mut self, added: bool) -> Self {
        self.snapshot.added_to_queue = added;
        self
    }

    pub fn build(self) -> RenderStateSnapshot {
        self.snapshot
    }

    pub fn shared(self) -> SharedSnapshot {
        Arc::new(self.snapshot)
    }
}

/// Something able to synthesize a snapshot of the current state on demand.
///
/// The render scheduler uses this for `take(.., allow_stale = true)` when
/// nothing is pending.
pub trait SnapshotSource: Send + Sync {
    /// Capture the current state, `None` if no snapshot can be built yet
    fn capture(&self) -> Option<SharedSnapshot>;
}
