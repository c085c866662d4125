//! Leafview Render Library
//!
//! Frame composition from cached page bitmaps onto a canvas, and the pooled
//! draw events that carry a snapshot through one frame without allocating.

pub mod canvas;
pub mod compose;
pub mod pool;

pub use canvas::{Canvas, DrawOp, RecordingCanvas};
pub use compose::{compose, node_key_for, resolve, DrawOutcome};
pub use pool::{DrawEvent, EventPool, PoolStats};
