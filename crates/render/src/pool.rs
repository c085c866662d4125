//! Pooled draw events
//!
//! The pool owns a fixed arena of slots. A slot is checked out for the
//! duration of one frame; its vectors keep their capacity across frames, so
//! drawing in steady state allocates nothing. When every slot is checked out
//! the pool degrades to a temporary, non-pooled slot instead of failing the
//! frame.

use leafview_cache::{BitmapCache, BitmapCacheEntry};
use leafview_core::{PoolConfig, SharedSnapshot, ViewerError};
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::canvas::Canvas;
use crate::compose::{compose, resolve, DrawOutcome};

/// Reusable per-frame storage
#[derive(Default)]
struct SlotStorage {
    snapshot: Option<SharedSnapshot>,
    resolved: Vec<Option<Arc<BitmapCacheEntry>>>,
}

impl SlotStorage {
    fn reset(&mut self) {
        self.snapshot = None;
        self.resolved.clear();
    }
}

enum Storage<'a> {
    Pooled { index: usize, guard: MutexGuard<'a, SlotStorage> },
    Temporary(Box<SlotStorage>),
}

impl Deref for Storage<'_> {
    type Target = SlotStorage;

    fn deref(&self) -> &SlotStorage {
        match self {
            Storage::Pooled { guard, .. } => &**guard,
            Storage::Temporary(storage) => &**storage,
        }
    }
}

impl DerefMut for Storage<'_> {
    fn deref_mut(&mut self) -> &mut SlotStorage {
        match self {
            Storage::Pooled { guard, .. } => &mut **guard,
            Storage::Temporary(storage) => &mut **storage,
        }
    }
}

/// Pool usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub acquisitions: u64,
    /// Frames served by a temporary slot because the pool was exhausted
    pub temporaries: u64,
    pub in_use: usize,
}

/// Fixed-size arena of draw event slots.
///
/// # Example
///
/// ```
/// use leafview_cache::BitmapCache;
/// use leafview_core::{ControllerId, RenderStateSnapshot};
/// use leafview_render::{EventPool, RecordingCanvas};
///
/// let pool = EventPool::new(2);
/// let cache = BitmapCache::with_mb_limit(1);
/// let snapshot = RenderStateSnapshot::builder(ControllerId(1), 1).shared();
///
/// let mut canvas = RecordingCanvas::new();
/// let mut event = pool.acquire(snapshot, &mut canvas);
/// event.process(&cache);
/// assert!(event.release_after_draw());
/// assert_eq!(pool.stats().in_use, 0);
/// ```
pub struct EventPool {
    slots: Box<[Mutex<SlotStorage>]>,
    free: Mutex<Vec<usize>>,
    acquisitions: AtomicU64,
    temporaries: AtomicU64,
}

impl EventPool {
    /// Create a pool with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| Mutex::new(SlotStorage::default())).collect();
        // Lowest index is handed out first
        let free = (0..capacity).rev().collect();
        Self {
            slots,
            free: Mutex::new(free),
            acquisitions: AtomicU64::new(0),
            temporaries: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.slots)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Check out a draw event for one frame.
    ///
    /// The returned event holds one reference. If every slot is in use a
    /// temporary slot is allocated and the exhaustion is logged.
    pub fn acquire<'a>(&'a self, snapshot: SharedSnapshot, canvas: &'a mut dyn Canvas) -> DrawEvent<'a> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        let index = self.free.lock().pop();
        let mut storage = match index {
            Some(index) => Storage::Pooled { index, guard: self.slots[index].lock() },
            None => {
                self.temporaries.fetch_add(1, Ordering::Relaxed);
                let error = ViewerError::PoolExhaustion { capacity: self.capacity() };
                warn!(%error, sequence_id = snapshot.sequence_id(), "using a temporary draw event");
                Storage::Temporary(Box::default())
            }
        };
        storage.snapshot = Some(snapshot);

        DrawEvent { pool: self, storage: Some(storage), canvas, refs: 1 }
    }

    pub fn stats(&self) -> PoolStats {
        let in_use = self.capacity() - self.free.lock().len();
        PoolStats {
            capacity: self.capacity(),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            temporaries: self.temporaries.load(Ordering::Relaxed),
            in_use,
        }
    }

    fn give_back(&self, storage: Storage<'_>) {
        match storage {
            Storage::Pooled { index, mut guard } => {
                guard.reset();
                drop(guard);
                self.free.lock().push(index);
            }
            Storage::Temporary(_) => {}
        }
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

/// A checked-out, reference-counted draw event.
///
/// Consumers that need the event beyond the first draw call [`retain`]
/// and later [`release_after_draw`]. The slot goes back to the pool when the
/// count reaches zero, or when the event is dropped.
///
/// [`retain`]: DrawEvent::retain
/// [`release_after_draw`]: DrawEvent::release_after_draw
pub struct DrawEvent<'a> {
    pool: &'a EventPool,
    storage: Option<Storage<'a>>,
    canvas: &'a mut dyn Canvas,
    refs: u32,
}

impl<'a> DrawEvent<'a> {
    /// Pool slot backing this event, `None` for a temporary or released event
    pub fn slot_index(&self) -> Option<usize> {
        match self.storage.as_ref()? {
            Storage::Pooled { index, .. } => Some(*index),
            Storage::Temporary(_) => None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.storage, Some(Storage::Temporary(_)))
    }

    pub fn is_released(&self) -> bool {
        self.storage.is_none()
    }

    pub fn snapshot(&self) -> Option<&SharedSnapshot> {
        self.storage.as_ref()?.snapshot.as_ref()
    }

    pub fn ref_count(&self) -> u32 {
        self.refs
    }

    /// Add a consumer
    pub fn retain(&mut self) -> &mut Self {
        if self.storage.is_some() {
            self.refs += 1;
        }
        self
    }

    /// Compose the snapshot onto the canvas from the bitmap cache
    pub fn process(&mut self, cache: &BitmapCache) -> DrawOutcome {
        let Some(storage) = self.storage.as_mut() else {
            return DrawOutcome::Skipped;
        };
        let SlotStorage { snapshot, resolved } = &mut **storage;
        let Some(snapshot) = snapshot.as_ref() else {
            return DrawOutcome::Skipped;
        };

        resolve(snapshot, cache, resolved);
        compose(snapshot, resolved, &mut *self.canvas)
    }

    /// Drop one reference. Returns `true` once the slot went back to the pool.
    pub fn release_after_draw(&mut self) -> bool {
        if self.storage.is_none() {
            return true;
        }
        self.refs = self.refs.saturating_sub(1);
        if self.refs > 0 {
            return false;
        }
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(storage);
        }
        true
    }
}

impl Drop for DrawEvent<'_> {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(storage);
        }
    }
}
