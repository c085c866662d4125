//! Drawing target abstraction
//!
//! The GUI adapter implements [`Canvas`] over its real surface. The
//! [`RecordingCanvas`] keeps a list of operations instead, which is what the
//! headless driver and the tests draw into.

use leafview_core::{Bitmap, PageId, RectF};

/// Minimal set of drawing primitives the compositor needs
pub trait Canvas {
    /// Fill the whole surface with the background
    fn clear(&mut self);

    /// Draw a decoded page bitmap scaled into `dst` (surface coordinates)
    fn draw_bitmap(&mut self, page: PageId, bitmap: &Bitmap, dst: RectF, inverted: bool);

    /// Draw the fallback tile for a page whose bitmap is missing
    fn draw_placeholder(&mut self, page: PageId, dst: RectF);
}

/// One recorded drawing operation
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    Bitmap { page: PageId, dst: RectF, width: u32, height: u32, inverted: bool },
    Placeholder { page: PageId, dst: RectF },
}

/// Canvas that records operations.
///
/// `clear` drops previously recorded operations but keeps the allocation, so
/// drawing many frames into one recorder reaches a steady state without
/// allocating.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Vec<DrawOp>,
    frames: u64,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Number of frames started (calls to `clear`)
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bitmap_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Bitmap { .. })).count()
    }

    pub fn placeholder_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Placeholder { .. })).count()
    }

    /// Pages drawn with a real bitmap in the last frame
    pub fn drawn_pages(&self) -> Vec<PageId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Bitmap { page, .. } => Some(*page),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
        self.frames += 1;
    }

    fn draw_bitmap(&mut self, page: PageId, bitmap: &Bitmap, dst: RectF, inverted: bool) {
        self.ops.push(DrawOp::Bitmap {
            page,
            dst,
            width: bitmap.width,
            height: bitmap.height,
            inverted,
        });
    }

    fn draw_placeholder(&mut self, page: PageId, dst: RectF) {
        self.ops.push(DrawOp::Placeholder { page, dst });
    }
}
