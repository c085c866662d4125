//! Leafview UI Library
//!
//! The toolkit-independent document surface: layout gating, scrolling with
//! fling physics, touch fallback and the draw call, wired to the draw and
//! scroll threads.

pub mod scroller;
pub mod surface;
pub mod touch;

pub use scroller::{Scroller, DEFAULT_DECELERATION, DEFAULT_SCROLL_DURATION};
pub use surface::{InvalidateHook, SurfaceController};
pub use touch::{DragTracker, TouchResponse, MIN_FLING_VELOCITY};
