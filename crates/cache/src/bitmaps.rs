//! Decoded page bitmap cache with LRU eviction
//!
//! Entries are immutable once built. Publishing a new bitmap for a node
//! replaces the whole `Arc<BitmapCacheEntry>`, so the draw thread and the
//! interaction thread only ever hold complete entries.
//!
//! Every entry belongs to a [`CacheSession`] (one open document). Entries
//! keep a weak back-reference to their session; once the session ends they
//! are treated as absent and purged.

use leafview_core::{BitmapRef, CacheConfig, PageId, Rect};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Identity of a cached page region: page, zoom bucket and color inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub page: PageId,
    pub zoom_key: u32,
    pub inverted: bool,
}

impl NodeKey {
    pub fn new(page: PageId, zoom_key: u32, inverted: bool) -> Self {
        Self { page, zoom_key, inverted }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}@{}", self.page, self.zoom_key)?;
        if self.inverted {
            write!(f, "-inv")?;
        }
        Ok(())
    }
}

/// One open document's lifetime in the cache
#[derive(Debug)]
pub struct CacheSession {
    id: u64,
}

impl CacheSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A decoded bitmap for one page region
#[derive(Debug, Clone)]
pub struct BitmapCacheEntry {
    node_id: String,
    key: NodeKey,
    bitmap: BitmapRef,
    bounds: Rect,
    session: Weak<CacheSession>,
}

impl BitmapCacheEntry {
    /// Build an entry owned by `session`. The bitmap is shared, not copied.
    pub fn new(session: &Arc<CacheSession>, key: NodeKey, bitmap: BitmapRef, bounds: Rect) -> Self {
        Self { node_id: key.to_string(), key, bitmap, bounds, session: Arc::downgrade(session) }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn bitmap(&self) -> &BitmapRef {
        &self.bitmap
    }

    /// Page bounds the bitmap was decoded for
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn inverted(&self) -> bool {
        self.key.inverted
    }

    /// The owning session is still open
    pub fn is_live(&self) -> bool {
        self.session.strong_count() > 0
    }

    fn memory_size(&self) -> usize {
        self.bitmap.byte_size()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub entry_count: usize,

    /// Total memory used by cached bitmaps (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Entries evicted due to memory pressure
    pub evictions: u64,

    /// Entries dropped by zoom/page invalidation or session end
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: HashMap<NodeKey, Arc<BitmapCacheEntry>>,

    /// Most recently used at back
    lru_queue: VecDeque<NodeKey>,

    memory_used: usize,
    memory_limit: usize,
    session: Option<Arc<CacheSession>>,
    stats: CacheStats,
}

impl CacheState {
    fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            session: None,
            stats: CacheStats { memory_limit, ..Default::default() },
        }
    }

    fn touch(&mut self, key: NodeKey) {
        if let Some(index) = self.lru_queue.iter().position(|k| *k == key) {
            self.lru_queue.remove(index);
        }
        self.lru_queue.push_back(key);
    }

    fn remove_entry(&mut self, key: &NodeKey) -> Option<Arc<BitmapCacheEntry>> {
        let entry = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
        if let Some(index) = self.lru_queue.iter().position(|k| k == key) {
            self.lru_queue.remove(index);
        }
        self.sync_stats();
        Some(entry)
    }

    fn remove_where<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&BitmapCacheEntry) -> bool,
    {
        let doomed: Vec<NodeKey> =
            self.entries.iter().filter(|(_, e)| predicate(e)).map(|(k, _)| *k).collect();
        for key in &doomed {
            self.remove_entry(key);
        }
        self.stats.invalidations += doomed.len() as u64;
        doomed.len()
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.lru_queue.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(entry.memory_size());
            self.stats.evictions += 1;
            self.sync_stats();
        }
        true
    }

    fn evict_to_fit(&mut self, required_size: usize) {
        while self.memory_used + required_size > self.memory_limit && !self.entries.is_empty() {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Bitmap cache shared by the draw thread and the interaction thread.
///
/// # Example
///
/// ```
/// use leafview_cache::{BitmapCache, BitmapCacheEntry, NodeKey};
/// use leafview_core::{Bitmap, PageId, Rect};
/// use std::sync::Arc;
///
/// let cache = BitmapCache::with_mb_limit(16);
/// let session = cache.begin_session();
///
/// let key = NodeKey::new(PageId(0), 100, false);
/// let bitmap = Arc::new(Bitmap::filled(8, 8, [255; 4]));
/// cache.publish(BitmapCacheEntry::new(&session, key, bitmap, Rect::from_size(8, 8)));
///
/// assert!(cache.get(&key).is_some());
/// ```
pub struct BitmapCache {
    state: Mutex<CacheState>,
    next_session: AtomicU64,
}

impl BitmapCache {
    /// Create a cache with a memory limit in bytes
    pub fn new(memory_limit: usize) -> Self {
        Self { state: Mutex::new(CacheState::new(memory_limit)), next_session: AtomicU64::new(1) }
    }

    /// Create a cache with a memory limit in megabytes
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.memory_limit())
    }

    /// Open a new session, ending the previous one
    pub fn begin_session(&self) -> Arc<CacheSession> {
        let session = Arc::new(CacheSession { id: self.next_session.fetch_add(1, Ordering::Relaxed) });
        let mut state = self.state.lock();
        state.session = Some(session.clone());
        let dropped = state.remove_where(|entry| {
            entry.session.upgrade().map_or(true, |owner| owner.id != session.id)
        });
        debug!(session = session.id, dropped, "bitmap cache session started");
        session
    }

    /// Current session, if one is open
    pub fn session(&self) -> Option<Arc<CacheSession>> {
        self.state.lock().session.clone()
    }

    /// End the current session and drop all of its entries
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        if let Some(session) = state.session.take() {
            let dropped = state.remove_where(|_| true);
            debug!(session = session.id, dropped, "bitmap cache session ended");
        }
    }

    /// Publish an entry, replacing any entry for the same node.
    ///
    /// Entries whose session has ended are rejected. Returns `true` when the
    /// entry was stored.
    pub fn publish(&self, entry: BitmapCacheEntry) -> bool {
        let mut state = self.state.lock();

        let current = state.session.as_ref().map(|s| s.id);
        let owner = entry.session.upgrade().map(|s| s.id);
        if owner.is_none() || owner != current {
            debug!(node = entry.node_id(), "rejecting bitmap from a closed session");
            return false;
        }

        let key = entry.key;
        let size = entry.memory_size();
        state.remove_entry(&key);
        state.evict_to_fit(size);

        state.memory_used += size;
        state.entries.insert(key, Arc::new(entry));
        state.touch(key);
        state.sync_stats();
        true
    }

    /// Look up a node, marking it most recently used
    pub fn get(&self, key: &NodeKey) -> Option<Arc<BitmapCacheEntry>> {
        let mut state = self.state.lock();

        match state.entries.get(key).cloned() {
            Some(entry) if entry.is_live() => {
                state.touch(*key);
                state.stats.hits += 1;
                Some(entry)
            }
            Some(_) => {
                state.remove_entry(key);
                state.stats.invalidations += 1;
                state.stats.misses += 1;
                None
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Check for a live entry without touching LRU order or statistics
    pub fn contains(&self, key: &NodeKey) -> bool {
        let state = self.state.lock();
        state.entries.get(key).is_some_and(|entry| entry.is_live())
    }

    pub fn remove(&self, key: &NodeKey) -> Option<Arc<BitmapCacheEntry>> {
        self.state.lock().remove_entry(key)
    }

    /// Drop every entry of `page`
    pub fn invalidate_page(&self, page: PageId) -> usize {
        self.state.lock().remove_where(|entry| entry.key.page == page)
    }

    /// Drop every entry decoded at a zoom other than `zoom_key`
    pub fn invalidate_zoom_except(&self, zoom_key: u32) -> usize {
        self.state.lock().remove_where(|entry| entry.key.zoom_key != zoom_key)
    }

    /// Drop all entries, keeping the current session open
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.remove_where(|_| true);
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    /// Update the memory limit, evicting down to it if needed
    pub fn set_memory_limit(&self, new_limit: usize) {
        let mut state = self.state.lock();
        state.memory_limit = new_limit;
        state.stats.memory_limit = new_limit;
        if state.memory_used > new_limit {
            state.evict_to_fit(0);
        }
    }

    pub fn memory_used(&self) -> usize {
        self.state.lock().memory_used
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

impl Default for BitmapCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
