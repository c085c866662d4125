//! The viewer surface
//!
//! [`SurfaceController`] is the toolkit-independent half of the document
//! view. The GUI adapter forwards layout passes, touch events, platform
//! scroll changes and draw calls to it, and supplies an optional invalidate
//! hook. Behind it run the draw thread (decode and frame preparation) and the
//! scroll thread (coalesced scroll application).

use crate::scroller::Scroller;
use crate::touch::{DragTracker, TouchResponse};
use leafview_cache::{BitmapCache, BitmapCacheEntry, CacheSession, NodeKey};
use leafview_core::{
    BitmapRef, DecodeService, Flag, LayoutCell, LayoutChange, LayoutState, PointF, Rect, RectF,
    RenderStateSnapshot, SharedController, SharedSnapshot, SnapshotSequencer, SnapshotSource,
    TouchEvent, ViewerConfig, ViewerError, ViewerResult,
};
use leafview_render::{Canvas, DrawOutcome, EventPool, PoolStats};
use leafview_scheduler::{
    CancellationToken, DrawThread, FaultPolicy, FrameRenderer, RenderScheduler, SchedulerStats,
    ScrollCoordinator, ScrollStats, ScrollSurface, SubmitOutcome,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// "Post invalidate": ask the GUI toolkit to schedule a draw call
pub type InvalidateHook = Arc<dyn Fn() + Send + Sync>;

/// State shared with the background threads
struct SurfaceState {
    controller: SharedController,
    layout: LayoutCell,
    position: Mutex<(i32, i32)>,
    sequencer: SnapshotSequencer,
}

impl SurfaceState {
    fn position(&self) -> (i32, i32) {
        *self.position.lock()
    }

    fn snapshot(&self, added_to_queue: bool) -> SharedSnapshot {
        let layout = self.layout.get_or_empty();
        let (x, y) = self.position();
        let view = layout.placed_at(x, y);

        RenderStateSnapshot::builder(self.controller.id(), self.sequencer.next_id())
            .zoom(self.controller.zoom())
            .layout(layout)
            .scroll(x, y)
            .inverted(self.controller.inverted())
            .pages(self.controller.visible_pages(&view))
            .added_to_queue(added_to_queue)
            .shared()
    }
}

impl SnapshotSource for SurfaceState {
    fn capture(&self) -> Option<SharedSnapshot> {
        Some(self.snapshot(true))
    }
}

impl ScrollSurface for SurfaceState {
    fn apply_scroll(&self, x: i32, y: i32) -> (i32, i32) {
        std::mem::replace(&mut *self.position.lock(), (x, y))
    }

    fn scroll_position(&self) -> (i32, i32) {
        self.position()
    }
}

/// Toolkit-independent document view.
///
/// All methods take `&self` and may be called from the interaction thread
/// while the draw and scroll threads run.
pub struct SurfaceController {
    state: Arc<SurfaceState>,
    config: ViewerConfig,
    first_layout: Flag,
    layout_locked: AtomicBool,
    destroyed: AtomicBool,
    scheduler: Arc<RenderScheduler>,
    draw_thread: Mutex<DrawThread>,
    scroll: ScrollCoordinator,
    decoder: Arc<dyn DecodeService>,
    cache: Arc<BitmapCache>,
    session: Mutex<Option<Arc<CacheSession>>>,
    pool: EventPool,
    scroller: Mutex<Scroller>,
    drag: Mutex<DragTracker>,
    /// Latest requested scroll target, ahead of the applied position
    target: Mutex<(i32, i32)>,
    invalidate: Option<InvalidateHook>,
}

impl SurfaceController {
    /// Build the surface and start its draw and scroll threads.
    ///
    /// Opens a new session on `cache`; bitmaps from an earlier session are
    /// dropped.
    pub fn new(
        controller: SharedController,
        decoder: Arc<dyn DecodeService>,
        cache: Arc<BitmapCache>,
        config: ViewerConfig,
        invalidate: Option<InvalidateHook>,
    ) -> ViewerResult<Self> {
        let config = config.validate()?;

        let state = Arc::new(SurfaceState {
            controller: controller.clone(),
            layout: LayoutCell::new(),
            position: Mutex::new((0, 0)),
            sequencer: SnapshotSequencer::new(),
        });
        let session = cache.begin_session();

        let scheduler = Arc::new(
            RenderScheduler::with_policy(FaultPolicy::from_config(&config.scheduler))
                .with_source(state.clone()),
        );

        let mut renderer =
            FrameRenderer::new(scheduler.clone(), decoder.clone(), cache.clone(), &config.scheduler);
        if let Some(hook) = invalidate.clone() {
            renderer = renderer.with_frame_callback(Arc::new(move |_: &SharedSnapshot| hook()));
        }
        let draw_thread = DrawThread::spawn(
            Arc::new(renderer),
            config.scheduler.poll_interval(),
            CancellationToken::new(),
        )?;

        let scroll = ScrollCoordinator::new(controller, state.clone(), &config.scroll);
        scroll.start()?;

        debug!(
            pool_slots = config.pool.slots,
            cache_mb = config.cache.memory_limit_mb,
            "surface created"
        );

        Ok(Self {
            state,
            first_layout: Flag::new(),
            layout_locked: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            scheduler,
            draw_thread: Mutex::new(draw_thread),
            scroll,
            decoder,
            cache,
            session: Mutex::new(Some(session)),
            pool: EventPool::from_config(&config.pool),
            scroller: Mutex::new(Scroller::new(config.surface.fling_deceleration)),
            drag: Mutex::new(DragTracker::new()),
            target: Mutex::new((0, 0)),
            invalidate,
            config,
        })
    }

    // ---- layout ----

    /// A layout pass completed with the given bounds.
    ///
    /// The first pass flips the surface to [`LayoutState::Laid`] and releases
    /// [`wait_for_initialization`](Self::wait_for_initialization). Every pass
    /// is forwarded to the controller.
    pub fn on_layout(&self, changed: bool, bounds: Rect) {
        let old = self.state.layout.publish(bounds);
        self.state.controller.on_layout_changed(LayoutChange {
            changed,
            locked: self.is_layout_locked(),
            old: old.as_deref().copied(),
            new: bounds,
        });

        if old.is_none() && self.first_layout.set() {
            info!(width = bounds.width(), height = bounds.height(), "first layout");
        }
    }

    pub fn layout_state(&self) -> LayoutState {
        self.state.layout.state()
    }

    /// Current layout rectangle, empty before the first layout pass
    pub fn layout(&self) -> Rect {
        self.state.layout.get_or_empty()
    }

    /// Block until the first layout pass, polling at the configured interval
    pub fn wait_for_initialization(&self) {
        let interval = self.config.surface.init_wait_interval();
        while !self.first_layout.get() {
            if !self.first_layout.wait_for(interval) {
                debug!("still waiting for the first layout");
            }
        }
    }

    /// Like [`wait_for_initialization`](Self::wait_for_initialization) but
    /// gives up after `timeout`. Returns whether the flag is set.
    pub fn wait_for_initialization_timeout(&self, timeout: Duration) -> bool {
        self.first_layout.wait_for(timeout)
    }

    pub fn is_initialized(&self) -> bool {
        self.first_layout.get()
    }

    pub fn change_layout_lock(&self, lock: bool) {
        self.layout_locked.store(lock, Ordering::Release);
    }

    pub fn is_layout_locked(&self) -> bool {
        self.layout_locked.load(Ordering::Acquire)
    }

    // ---- geometry ----

    pub fn scroll_x(&self) -> i32 {
        self.state.position().0
    }

    pub fn scroll_y(&self) -> i32 {
        self.state.position().1
    }

    pub fn width(&self) -> i32 {
        self.layout().width()
    }

    pub fn height(&self) -> i32 {
        self.layout().height()
    }

    /// Viewport in document coordinates
    pub fn view_rect(&self) -> RectF {
        let (x, y) = self.state.position();
        self.layout().placed_at(x, y)
    }

    /// Origin of page coordinates relative to the view rectangle
    pub fn base_point(&self, _view_rect: &RectF) -> PointF {
        PointF::ORIGIN
    }

    /// `width * zoom / current page width at zoom`, or 0 when there is no
    /// current page. 0 means "do not rescale".
    pub fn scroll_scale_ratio(&self) -> f32 {
        let Some(page) = self.state.controller.current_page() else {
            return 0.0;
        };
        let zoom = self.state.controller.zoom();
        let page_width = page.bounds(zoom).width();
        if page_width <= 0.0 {
            return 0.0;
        }
        self.width() as f32 * zoom / page_width
    }

    // ---- scrolling ----

    /// Request an absolute scroll position, clamped to the controller's
    /// scroll limits. Applied asynchronously by the scroll thread.
    pub fn scroll_to(&self, x: i32, y: i32) {
        let (x, y) = self.state.controller.scroll_limits().clamp_point(x, y);
        *self.target.lock() = (x, y);
        self.scroll.scroll_to(x, y);
    }

    /// Scroll relative to the latest requested position
    pub fn scroll_by(&self, dx: i32, dy: i32) {
        let (x, y) = *self.target.lock();
        self.scroll_to(x.saturating_add(dx), y.saturating_add(dy));
    }

    /// The platform moved the surface itself
    pub fn on_scroll_changed(&self, cur_x: i32, cur_y: i32, old_x: i32, old_y: i32) {
        *self.state.position.lock() = (cur_x, cur_y);
        *self.target.lock() = (cur_x, cur_y);
        self.scroll.on_scroll_changed(cur_x, cur_y, old_x, old_y);
    }

    /// Rescale the scroll position by [`scroll_scale_ratio`](Self::scroll_scale_ratio)
    pub fn invalidate_scroll(&self) {
        self.stop_scroller();

        let ratio = self.scroll_scale_ratio();
        if ratio == 0.0 {
            return;
        }
        let (x, y) = self.state.position();
        self.scroll_to((x as f32 * ratio) as i32, (y as f32 * ratio) as i32);
    }

    /// Keep the viewport center fixed across a zoom change
    pub fn invalidate_scroll_for_zoom(&self, new_zoom: f32, old_zoom: f32) {
        self.stop_scroller();

        if old_zoom == 0.0 {
            return;
        }
        let ratio = new_zoom / old_zoom;
        let (x, y) = self.state.position();
        let half_width = (self.width() / 2) as f32;
        let half_height = (self.height() / 2) as f32;
        self.scroll_to(
            ((x as f32 + half_width) * ratio - half_width) as i32,
            ((y as f32 + half_height) * ratio - half_height) as i32,
        );
    }

    /// Animated scroll by a delta, then redraw
    pub fn start_page_scroll(&self, dx: i32, dy: i32) {
        let (x, y) = self.state.position();
        self.scroller.lock().start_scroll(x, y, dx, dy, self.config.surface.page_scroll_duration());
        self.redraw_view();
    }

    /// Start a fling from the finger velocity `(velocity_x, velocity_y)`
    pub fn start_fling(&self, velocity_x: f32, velocity_y: f32, limits: Rect) {
        self.start_fling_at(velocity_x, velocity_y, limits, Instant::now());
    }

    pub fn start_fling_at(&self, velocity_x: f32, velocity_y: f32, limits: Rect, now: Instant) {
        let (x, y) = self.state.position();
        self.scroller.lock().fling_at(x, y, -velocity_x, -velocity_y, limits, now);
    }

    /// Advance the running animation; call once per frame.
    ///
    /// Returns `true` while the scroller produced a new position.
    pub fn continue_scroll(&self) -> bool {
        self.continue_scroll_at(Instant::now())
    }

    pub fn continue_scroll_at(&self, now: Instant) -> bool {
        let next = {
            let mut scroller = self.scroller.lock();
            scroller
                .compute_scroll_offset_at(now)
                .then(|| (scroller.curr_x(), scroller.curr_y()))
        };
        match next {
            Some((x, y)) => {
                self.scroll_to(x, y);
                true
            }
            None => false,
        }
    }

    /// Stop a running fling in place (a new touch landed)
    pub fn force_finish_scroll(&self) {
        let mut scroller = self.scroller.lock();
        if !scroller.is_finished() {
            scroller.force_finished(true);
        }
    }

    /// Abort any animation, jumping the scroller to its final position
    pub fn stop_scroller(&self) {
        let mut scroller = self.scroller.lock();
        if !scroller.is_finished() {
            scroller.abort_animation();
        }
    }

    pub fn is_scrolling(&self) -> bool {
        !self.scroller.lock().is_finished()
    }

    // ---- touch ----

    /// Offer the event to the controller; fall back to drag and fling.
    ///
    /// Returns `true` when the event was consumed by either.
    pub fn on_touch_event(&self, event: &TouchEvent) -> bool {
        if self.state.controller.on_touch_event(event) {
            return true;
        }

        let response = self.drag.lock().on_event(event);
        match response {
            TouchResponse::Ignored => false,
            TouchResponse::Stop => {
                self.force_finish_scroll();
                true
            }
            TouchResponse::ScrollBy { dx, dy } => {
                self.scroll_by(dx, dy);
                true
            }
            TouchResponse::Fling { velocity_x, velocity_y } => {
                self.start_fling(velocity_x, velocity_y, self.state.controller.scroll_limits());
                true
            }
        }
    }

    // ---- rendering ----

    /// Snapshot the current state and hand it to the draw thread and the
    /// decoder, then request a draw call
    pub fn redraw_view(&self) -> SharedSnapshot {
        let snapshot = self.state.snapshot(false);
        self.redraw_view_with(snapshot.clone());
        snapshot
    }

    /// Same as [`redraw_view`](Self::redraw_view) for a prepared snapshot
    pub fn redraw_view_with(&self, snapshot: SharedSnapshot) -> SubmitOutcome {
        let outcome = self.scheduler.submit(snapshot.clone());
        if outcome == SubmitOutcome::Closed {
            let error = ViewerError::Misuse { operation: "redraw_view" };
            debug!(%error, "surface already destroyed");
            return outcome;
        }
        self.decoder.update_view_state(&snapshot);
        self.post_invalidate();
        outcome
    }

    /// Draw one frame onto `canvas`.
    ///
    /// Uses the latest ready frame from the draw thread if one arrives
    /// within the draw take timeout, otherwise a snapshot of the current
    /// state, so every call produces a frame.
    pub fn on_draw(&self, canvas: &mut dyn Canvas) -> DrawOutcome {
        let snapshot = self
            .scheduler
            .take_frame(self.config.scheduler.draw_take_timeout(), true)
            .unwrap_or_else(|| self.state.snapshot(true));

        let mut event = self.pool.acquire(snapshot, canvas);
        let outcome = event.process(&self.cache);
        event.release_after_draw();
        outcome
    }

    /// Build a cache entry for a decoded bitmap in the current session
    pub fn create_bitmaps(
        &self,
        node: NodeKey,
        bitmap: BitmapRef,
        bounds: Rect,
        invert: bool,
    ) -> Option<BitmapCacheEntry> {
        let session = self.session.lock().clone()?;
        let key = NodeKey { inverted: invert, ..node };
        Some(BitmapCacheEntry::new(&session, key, bitmap, bounds))
    }

    fn post_invalidate(&self) {
        if let Some(hook) = &self.invalidate {
            hook();
        }
    }

    // ---- faults and lifecycle ----

    /// Leave render degraded mode. Returns whether it was active.
    pub fn reset_render_faults(&self) -> bool {
        self.scheduler.reset_faults()
    }

    pub fn is_render_degraded(&self) -> bool {
        self.scheduler.is_degraded()
    }

    /// Tear down without waiting.
    ///
    /// Releases initialization waiters, closes the scroll inbox and signals
    /// the draw thread, which exits after its current iteration. Bitmaps an
    /// in-flight decode produces afterwards are discarded with the ended
    /// cache session. Idempotent; [`join`](Self::join) waits for the threads.
    pub fn on_destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.first_layout.set();
        self.scroll.close();
        self.draw_thread.lock().cancel();
        self.scheduler.close();

        if self.session.lock().take().is_some() {
            self.cache.end_session();
        }
        info!("surface destroyed");
    }

    /// Destroy if needed, then wait for the draw and scroll threads to exit
    pub fn join(&self) {
        self.on_destroy();
        self.scroll.join();
        self.draw_thread.lock().shutdown();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    // ---- accessors ----

    pub fn controller(&self) -> &SharedController {
        &self.state.controller
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<BitmapCache> {
        &self.cache
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn scroll_stats(&self) -> ScrollStats {
        self.scroll.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl Drop for SurfaceController {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafview_core::{
        Bitmap, ControllerId, DecodeHandle, DecodeRequest, DocumentController, PageId, PageRef,
        PageView, TouchAction,
    };
    use leafview_render::RecordingCanvas;
    use std::sync::atomic::AtomicUsize;

    struct Strip {
        layouts: Mutex<Vec<LayoutChange>>,
        scrolls: Mutex<Vec<(i32, i32)>>,
        consume_touch: AtomicBool,
        has_page: AtomicBool,
    }

    impl Strip {
        fn new() -> Self {
            Self {
                layouts: Mutex::new(Vec::new()),
                scrolls: Mutex::new(Vec::new()),
                consume_touch: AtomicBool::new(false),
                has_page: AtomicBool::new(true),
            }
        }
    }

    impl DocumentController for Strip {
        fn id(&self) -> ControllerId {
            ControllerId(9)
        }
        fn on_touch_event(&self, _event: &TouchEvent) -> bool {
            self.consume_touch.load(Ordering::SeqCst)
        }
        fn on_layout_changed(&self, change: LayoutChange) {
            self.layouts.lock().push(change);
        }
        fn on_scroll_changed(&self, cur_x: i32, cur_y: i32, _old_x: i32, _old_y: i32) {
            self.scrolls.lock().push((cur_x, cur_y));
        }
        fn current_page(&self) -> Option<PageRef> {
            self.has_page
                .load(Ordering::SeqCst)
                .then(|| PageRef::new(PageId(0), RectF::new(0.0, 0.0, 400.0, 600.0)))
        }
        fn zoom(&self) -> f32 {
            1.0
        }
        fn visible_pages(&self, view_rect: &RectF) -> Vec<PageView> {
            (0..10)
                .map(|i| PageView {
                    page: PageId(i),
                    bounds: RectF::new(0.0, i as f32 * 600.0, 400.0, (i + 1) as f32 * 600.0),
                })
                .filter(|page| page.bounds.intersects(view_rect))
                .collect()
        }
    }

    struct SolidDecoder;

    impl DecodeService for SolidDecoder {
        fn decode(&self, request: DecodeRequest) -> DecodeHandle {
            DecodeHandle::ready(request.page, Ok(Arc::new(Bitmap::filled(2, 2, [9; 4]))))
        }
        fn update_view_state(&self, _snapshot: &SharedSnapshot) {}
    }

    fn surface_with(
        strip: Arc<Strip>,
        invalidate: Option<InvalidateHook>,
    ) -> SurfaceController {
        SurfaceController::new(
            strip,
            Arc::new(SolidDecoder),
            Arc::new(BitmapCache::with_mb_limit(4)),
            ViewerConfig::default(),
            invalidate,
        )
        .expect("surface")
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_first_layout_transition() {
        let strip = Arc::new(Strip::new());
        let surface = surface_with(strip.clone(), None);
        assert_eq!(surface.layout_state(), LayoutState::Unlaid);
        assert!(!surface.wait_for_initialization_timeout(Duration::from_millis(5)));

        surface.on_layout(true, Rect::from_size(400, 300));
        surface.change_layout_lock(true);
        surface.on_layout(false, Rect::from_size(400, 320));

        assert_eq!(surface.layout_state(), LayoutState::Laid);
        surface.wait_for_initialization();

        let layouts = strip.layouts.lock();
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[0].old, None);
        assert!(!layouts[0].locked);
        assert_eq!(layouts[1].old, Some(Rect::from_size(400, 300)));
        assert!(layouts[1].locked);
        assert_eq!(surface.height(), 320);
    }

    #[test]
    fn test_scroll_scale_ratio() {
        let strip = Arc::new(Strip::new());
        let surface = surface_with(strip.clone(), None);
        surface.on_layout(true, Rect::from_size(200, 300));

        assert_eq!(surface.scroll_scale_ratio(), 0.5);

        strip.has_page.store(false, Ordering::SeqCst);
        assert_eq!(surface.scroll_scale_ratio(), 0.0);

        // Ratio 0 leaves the position alone
        surface.invalidate_scroll();
        assert_eq!(surface.scroll_stats().requests, 0);
    }

    #[test]
    fn test_invalidate_scroll_for_zoom_keeps_center() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(200, 100));
        surface.scroll_to(100, 100);
        assert!(wait_until(|| surface.scroll_y() == 100));

        surface.invalidate_scroll_for_zoom(2.0, 1.0);
        // Center (200, 150) becomes (400, 300)
        assert!(wait_until(|| (surface.scroll_x(), surface.scroll_y()) == (300, 250)));

        surface.invalidate_scroll_for_zoom(3.0, 0.0);
        assert_eq!(surface.scroll_x(), 300);
    }

    #[test]
    fn test_far_scroll_position_does_not_overflow() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(600, 1000));

        // Default limits allow the whole i32 range
        surface.scroll_by(i32::MAX, i32::MAX);
        assert!(wait_until(|| (surface.scroll_x(), surface.scroll_y()) == (i32::MAX, i32::MAX)));

        assert!(surface.redraw_view().pages().is_empty());
        assert_eq!(surface.view_rect().left, i32::MAX as f32);

        surface.invalidate_scroll_for_zoom(2.0, 1.0);
        surface.scroll_by(1, 1);
        let mut canvas = RecordingCanvas::new();
        assert_eq!(surface.on_draw(&mut canvas), DrawOutcome::Complete { pages: 0 });
    }

    #[test]
    fn test_view_rect_and_base_point() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(400, 300));
        surface.scroll_to(0, 50);
        assert!(wait_until(|| surface.scroll_y() == 50));

        assert_eq!(surface.view_rect(), RectF::new(0.0, 50.0, 400.0, 350.0));
        assert_eq!(surface.base_point(&surface.view_rect()), PointF::ORIGIN);
    }

    #[test]
    fn test_touch_consumed_by_controller() {
        let strip = Arc::new(Strip::new());
        strip.consume_touch.store(true, Ordering::SeqCst);
        let surface = surface_with(strip, None);

        let event = TouchEvent::new(TouchAction::Move, 1.0, 1.0, 0);
        assert!(surface.on_touch_event(&event));
        assert_eq!(surface.scroll_stats().requests, 0);
    }

    #[test]
    fn test_touch_fallback_drag_and_fling() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(400, 300));

        assert!(surface.on_touch_event(&TouchEvent::new(TouchAction::Down, 100.0, 500.0, 0)));
        for step in 1..=5u64 {
            let y = 500.0 - step as f32 * 30.0;
            assert!(surface.on_touch_event(&TouchEvent::new(TouchAction::Move, 100.0, y, step * 10)));
        }
        assert!(wait_until(|| surface.scroll_y() == 150));

        assert!(surface.on_touch_event(&TouchEvent::new(TouchAction::Up, 100.0, 350.0, 60)));
        assert!(surface.is_scrolling());

        // A new touch stops the fling in place
        surface.on_touch_event(&TouchEvent::new(TouchAction::Down, 100.0, 350.0, 70));
        assert!(!surface.is_scrolling());
    }

    #[test]
    fn test_fling_runs_to_rest() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(400, 300));

        let start = Instant::now();
        // Finger moving up flings the content down the document
        surface.start_fling_at(0.0, -2000.0, Rect::new(0, 0, 0, 5400), start);
        let mut frames = 0;
        while surface.continue_scroll_at(start + Duration::from_millis(16 * (frames + 1))) {
            frames += 1;
        }

        assert!(frames > 10);
        assert!(wait_until(|| surface.scroll_y() == 1000));
    }

    #[test]
    fn test_redraw_and_draw_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let hook: InvalidateHook = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let surface = surface_with(Arc::new(Strip::new()), Some(hook));
        surface.on_layout(true, Rect::from_size(400, 300));

        let snapshot = surface.redraw_view();
        assert!(!snapshot.added_to_queue());
        assert_eq!(snapshot.pages().len(), 1);

        assert!(wait_until(|| surface.scheduler_stats().frames_published >= 1));
        let mut canvas = RecordingCanvas::new();
        let outcome = surface.on_draw(&mut canvas);
        assert_eq!(outcome, DrawOutcome::Complete { pages: 1 });
        assert_eq!(canvas.drawn_pages(), vec![PageId(0)]);

        // Redraw and the frame callback both invalidated
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(surface.pool_stats().in_use, 0);
    }

    #[test]
    fn test_draw_without_ready_frame_synthesizes() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        surface.on_layout(true, Rect::from_size(400, 300));

        let mut canvas = RecordingCanvas::new();
        let outcome = surface.on_draw(&mut canvas);
        assert_eq!(outcome, DrawOutcome::Fallback { pages: 1, placeholders: 1 });
        assert_eq!(surface.scheduler_stats().synthesized, 1);
    }

    #[test]
    fn test_create_bitmaps_bound_to_session() {
        let surface = surface_with(Arc::new(Strip::new()), None);
        let key = NodeKey::new(PageId(1), 100, false);
        let entry = surface
            .create_bitmaps(key, Arc::new(Bitmap::filled(1, 1, [0; 4])), Rect::from_size(1, 1), true)
            .unwrap();
        assert!(entry.inverted());
        assert_eq!(entry.node_id(), "page-1@100-inv");
        assert!(surface.cache().publish(entry));

        surface.on_destroy();
        assert!(surface.cache().is_empty());
        assert!(surface
            .create_bitmaps(key, Arc::new(Bitmap::filled(1, 1, [0; 4])), Rect::from_size(1, 1), false)
            .is_none());
    }

    #[test]
    fn test_destroy_releases_waiters_and_is_idempotent() {
        let surface = Arc::new(surface_with(Arc::new(Strip::new()), None));
        let waiter = {
            let surface = surface.clone();
            std::thread::spawn(move || surface.wait_for_initialization())
        };

        surface.on_destroy();
        waiter.join().unwrap();
        surface.on_destroy();

        assert!(surface.is_destroyed());
        assert!(surface.is_initialized());
        // Late work is ignored
        surface.scroll_to(10, 10);
        assert_eq!(surface.redraw_view_with(surface.redraw_view()), SubmitOutcome::Closed);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = SurfaceController::new(
            Arc::new(Strip::new()),
            Arc::new(SolidDecoder),
            Arc::new(BitmapCache::with_mb_limit(1)),
            ViewerConfig::default().with_pool_slots(0),
            None,
        );
        assert!(matches!(result, Err(ViewerError::Config(_))));
    }
}
