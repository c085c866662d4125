//! Leafview Core Library
//!
//! Shared types for the render-and-scroll pipeline: geometry, the immutable
//! render state snapshot, layout publication, the one-shot layout gate, the
//! document controller and decoder contracts, errors and configuration.

pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod flag;
pub mod geometry;
pub mod layout;
pub mod snapshot;

pub use config::{
    CacheConfig, ConfigError, PoolConfig, SchedulerConfig, ScrollConfig, SurfaceConfig,
    ViewerConfig,
};
pub use controller::{
    ControllerId, DocumentController, LayoutChange, PageId, PageRef, PageView, SharedController,
    TouchAction, TouchEvent,
};
pub use decode::{
    Bitmap, BitmapRef, DecodeHandle, DecodeReply, DecodeRequest, DecodeResult, DecodeService,
};
pub use error::{DecodeError, ViewerError, ViewerResult};
pub use flag::Flag;
pub use geometry::{PointF, Rect, RectF};
pub use layout::{LayoutCell, LayoutState};
pub use snapshot::{
    zoom_key, RenderStateSnapshot, SharedSnapshot, SnapshotBuilder, SnapshotSequencer,
    SnapshotSource,
};
