//! Leafview Cache Library
//!
//! Per-page bitmap cache with session ownership and LRU eviction.

pub mod bitmaps;

pub use bitmaps::{BitmapCache, BitmapCacheEntry, CacheSession, CacheStats, NodeKey};
