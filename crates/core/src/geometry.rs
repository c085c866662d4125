//! Viewport geometry
//!
//! Integer rectangles describe the surface layout and scroll limits, float
//! rectangles describe page bounds at a given zoom and the view rectangle in
//! document coordinates.

use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle in surface pixels.
///
/// Edges are stored the way the layout pass reports them: `left`/`top`
/// inclusive, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Create a rectangle from its edges
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Create a rectangle at the origin with the given size
    pub const fn from_size(width: i32, height: i32) -> Self {
        Self { left: 0, top: 0, right: width, bottom: height }
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// This rectangle's size with its top-left corner at `(x, y)`.
    ///
    /// Computed in float so a scroll offset near `i32::MAX` cannot overflow.
    pub fn placed_at(&self, x: i32, y: i32) -> RectF {
        let (left, top) = (x as f32, y as f32);
        RectF::new(left, top, left + self.width() as f32, top + self.height() as f32)
    }

    /// A rectangle with no area
    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Clamp a point into the rectangle, edges inclusive
    pub fn clamp_point(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(self.left, self.right.max(self.left)), y.clamp(self.top, self.bottom.max(self.top)))
    }

    pub fn to_rect_f(self) -> RectF {
        RectF::new(self.left as f32, self.top as f32, self.right as f32, self.bottom as f32)
    }
}

/// Axis-aligned float rectangle in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    /// Create a rectangle from its edges
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Scale every edge by `factor` (page bounds at zoom)
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.left * factor, self.top * factor, self.right * factor, self.bottom * factor)
    }

    /// Move the rectangle by `(dx, dy)`
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    /// Check whether two rectangles overlap with non-zero area
    pub fn intersects(&self, other: &RectF) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Round outwards to the enclosing integer rectangle
    pub fn round_out(&self) -> Rect {
        Rect::new(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

/// Point in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const ORIGIN: PointF = PointF { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
