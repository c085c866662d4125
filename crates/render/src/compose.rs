//! Snapshot composition
//!
//! Turns a render state snapshot plus whatever the bitmap cache holds into
//! canvas operations. Pages without a cached bitmap are drawn as
//! placeholders; composition itself never fails.

use leafview_cache::{BitmapCache, BitmapCacheEntry, NodeKey};
use leafview_core::{PageView, RenderStateSnapshot};
use std::sync::Arc;

use crate::canvas::Canvas;

/// Result marker of one composed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Every page was drawn from a cached bitmap
    Complete { pages: usize },

    /// At least one page fell back to a placeholder
    Fallback { pages: usize, placeholders: usize },

    /// The draw event had already been released
    Skipped,
}

impl DrawOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, DrawOutcome::Complete { .. })
    }

    pub fn placeholders(&self) -> usize {
        match self {
            DrawOutcome::Fallback { placeholders, .. } => *placeholders,
            _ => 0,
        }
    }
}

/// Cache key for a page as drawn in `snapshot`
pub fn node_key_for(snapshot: &RenderStateSnapshot, page: &PageView) -> NodeKey {
    NodeKey::new(page.page, snapshot.zoom_key(), snapshot.inverted())
}

/// Look up every page of `snapshot` in the cache.
///
/// `out` is cleared and refilled in page order. Holding the entries keeps
/// their bitmaps alive for the rest of the frame even if the cache evicts
/// them meanwhile.
pub fn resolve(
    snapshot: &RenderStateSnapshot,
    cache: &BitmapCache,
    out: &mut Vec<Option<Arc<BitmapCacheEntry>>>,
) {
    out.clear();
    out.extend(snapshot.pages().iter().map(|page| cache.get(&node_key_for(snapshot, page))));
}

/// Draw `snapshot` onto `canvas` using the entries produced by [`resolve`]
pub fn compose(
    snapshot: &RenderStateSnapshot,
    resolved: &[Option<Arc<BitmapCacheEntry>>],
    canvas: &mut dyn Canvas,
) -> DrawOutcome {
    let (scroll_x, scroll_y) = snapshot.scroll();
    let view = snapshot.view_rect();

    canvas.clear();

    let mut pages = 0;
    let mut placeholders = 0;
    for (index, page) in snapshot.pages().iter().enumerate() {
        if !page.bounds.intersects(&view) {
            continue;
        }
        pages += 1;

        let dst = page.bounds.offset(-(scroll_x as f32), -(scroll_y as f32));
        match resolved.get(index).and_then(Option::as_ref) {
            Some(entry) => canvas.draw_bitmap(page.page, entry.bitmap(), dst, entry.inverted()),
            None => {
                placeholders += 1;
                canvas.draw_placeholder(page.page, dst);
            }
        }
    }

    if placeholders == 0 {
        DrawOutcome::Complete { pages }
    } else {
        DrawOutcome::Fallback { pages, placeholders }
    }
}
