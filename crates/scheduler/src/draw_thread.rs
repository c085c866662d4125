//! The draw thread
//!
//! A single named thread pulls the latest snapshot from the
//! [`RenderScheduler`], makes sure the bitmaps for its visible pages are in
//! the cache, and publishes the snapshot as a ready frame. A failed decode
//! leaves the page to be drawn as a placeholder. A panic inside an
//! iteration is caught, counted against the fault policy, and the loop moves
//! on to the next snapshot.

use crate::cancel::CancellationToken;
use crate::faults::FaultVerdict;
use crate::scheduler::RenderScheduler;
use leafview_cache::{BitmapCache, BitmapCacheEntry};
use leafview_core::{
    DecodeRequest, DecodeService, SchedulerConfig, SharedSnapshot, ViewerError, ViewerResult,
};
use leafview_render::node_key_for;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Called after each iteration with the snapshot that became the ready frame
/// (the GUI adapter's "post invalidate")
pub type FrameCallback = Arc<dyn Fn(&SharedSnapshot) + Send + Sync>;

/// Per-iteration page accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub pages: usize,
    /// Pages already in the cache
    pub cached: usize,
    pub decoded: usize,
    /// Pages left as placeholders after a failed or timed out decode
    pub failed: usize,
    /// Decoding was skipped because the scheduler is degraded
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Rendered(FrameReport),
    Faulted(FaultVerdict),
}

/// Body of one draw-thread iteration, usable without the thread
pub struct FrameRenderer {
    scheduler: Arc<RenderScheduler>,
    decoder: Arc<dyn DecodeService>,
    cache: Arc<BitmapCache>,
    decode_timeout: Duration,
    on_frame: Option<FrameCallback>,
}

impl FrameRenderer {
    pub fn new(
        scheduler: Arc<RenderScheduler>,
        decoder: Arc<dyn DecodeService>,
        cache: Arc<BitmapCache>,
        config: &SchedulerConfig,
    ) -> Self {
        Self { scheduler, decoder, cache, decode_timeout: config.decode_timeout(), on_frame: None }
    }

    pub fn with_frame_callback(mut self, callback: FrameCallback) -> Self {
        self.on_frame = Some(callback);
        self
    }

    pub fn scheduler(&self) -> &Arc<RenderScheduler> {
        &self.scheduler
    }

    /// Run one iteration for `snapshot`, absorbing any panic.
    ///
    /// The snapshot is published as the ready frame whether or not the
    /// iteration faulted, so the surface keeps converging on the latest state
    /// with whatever bitmaps are cached.
    pub fn run_iteration(&self, snapshot: SharedSnapshot) -> IterationOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.prepare(&snapshot)));

        let outcome = match result {
            Ok(report) => {
                self.scheduler.record_success();
                IterationOutcome::Rendered(report)
            }
            Err(payload) => {
                let fault = ViewerError::SchedulerFault(panic_message(payload.as_ref()));
                error!(error = %fault, sequence_id = snapshot.sequence_id(), "render iteration faulted");
                IterationOutcome::Faulted(self.scheduler.record_fault())
            }
        };

        self.scheduler.publish_frame(snapshot.clone());
        if let Some(callback) = &self.on_frame {
            callback(&snapshot);
        }
        outcome
    }

    fn prepare(&self, snapshot: &SharedSnapshot) -> FrameReport {
        let mut report = FrameReport { pages: snapshot.pages().len(), ..Default::default() };

        if self.scheduler.is_degraded() {
            report.degraded = true;
            return report;
        }

        let session = self.cache.session();
        for page in snapshot.pages() {
            let key = node_key_for(snapshot, page);
            if self.cache.contains(&key) {
                report.cached += 1;
                continue;
            }

            let request = DecodeRequest {
                page: page.page,
                bounds_at_zoom: page.bounds,
                zoom_key: key.zoom_key,
                invert: key.inverted,
            };
            match self.decoder.decode(request).wait(self.decode_timeout) {
                Ok(bitmap) => {
                    report.decoded += 1;
                    match &session {
                        Some(session) => {
                            self.cache.publish(BitmapCacheEntry::new(
                                session,
                                key,
                                bitmap,
                                page.bounds.round_out(),
                            ));
                        }
                        None => debug!(node = %key, "no cache session, decoded bitmap dropped"),
                    }
                }
                Err(decode_error) => {
                    report.failed += 1;
                    let error = ViewerError::from(decode_error);
                    warn!(%error, node = %key, "drawing placeholder");
                }
            }
        }

        self.cache.invalidate_zoom_except(snapshot.zoom_key());
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to the running draw thread
pub struct DrawThread {
    thread: Option<JoinHandle<()>>,
    token: CancellationToken,
}

impl DrawThread {
    /// Spawn the draw thread. It runs until `token` is cancelled or the
    /// scheduler is closed.
    pub fn spawn(
        renderer: Arc<FrameRenderer>,
        poll_interval: Duration,
        token: CancellationToken,
    ) -> ViewerResult<Self> {
        let loop_token = token.clone();
        let thread = thread::Builder::new()
            .name("leafview-draw".to_string())
            .spawn(move || Self::run(renderer, poll_interval, loop_token))
            .map_err(|source| ViewerError::Spawn { name: "draw", source })?;

        Ok(Self { thread: Some(thread), token })
    }

    /// Main loop.
    ///
    /// Cancellation is checked both before waiting and after a snapshot was
    /// taken, so no iteration starts once the owner cancelled.
    fn run(renderer: Arc<FrameRenderer>, poll_interval: Duration, token: CancellationToken) {
        debug!("draw thread started");
        let scheduler = renderer.scheduler().clone();
        loop {
            if token.is_cancelled() || scheduler.is_closed() {
                break;
            }
            let Some(snapshot) = scheduler.take(poll_interval, false) else {
                continue;
            };
            if token.is_cancelled() {
                debug!(sequence_id = snapshot.sequence_id(), "discarding snapshot after shutdown");
                break;
            }
            renderer.run_iteration(snapshot);
        }
        debug!("draw thread exited");
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Signal shutdown without waiting
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Signal shutdown and wait for the current iteration to finish
    pub fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                error!("draw thread panicked outside an iteration");
            }
        }
    }
}

impl Drop for DrawThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultPolicy;
    use leafview_cache::NodeKey;
    use leafview_core::{
        Bitmap, ControllerId, DecodeError, DecodeHandle, PageId, PageView, Rect, RectF,
        RenderStateSnapshot,
    };
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct ScriptedDecoder {
        failing: Mutex<HashSet<u32>>,
        panicking: Mutex<bool>,
        never_replies: Mutex<bool>,
        calls: AtomicUsize,
    }

    impl DecodeService for ScriptedDecoder {
        fn decode(&self, request: DecodeRequest) -> DecodeHandle {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if *self.panicking.lock() {
                panic!("decoder blew up on page {}", request.page);
            }
            if *self.never_replies.lock() {
                let (handle, reply) = DecodeHandle::pending(request.page);
                // Reply kept alive past the timeout, then dropped
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(200));
                    drop(reply);
                });
                return handle;
            }
            if self.failing.lock().contains(&request.page.0) {
                return DecodeHandle::ready(
                    request.page,
                    Err(DecodeError::Failed { page: request.page, reason: "bad stream".into() }),
                );
            }
            DecodeHandle::ready(request.page, Ok(Arc::new(Bitmap::filled(4, 4, [255; 4]))))
        }

        fn update_view_state(&self, _snapshot: &SharedSnapshot) {}
    }

    fn snapshot(id: u64, pages: u32) -> SharedSnapshot {
        let pages = (0..pages)
            .map(|i| PageView {
                page: PageId(i),
                bounds: RectF::new(0.0, i as f32 * 100.0, 100.0, (i + 1) as f32 * 100.0),
            })
            .collect();
        RenderStateSnapshot::builder(ControllerId(1), id)
            .layout(Rect::from_size(100, 300))
            .pages(pages)
            .shared()
    }

    fn renderer(policy: FaultPolicy) -> (FrameRenderer, Arc<ScriptedDecoder>, Arc<BitmapCache>) {
        let scheduler = Arc::new(RenderScheduler::with_policy(policy));
        let decoder = Arc::new(ScriptedDecoder::default());
        let cache = Arc::new(BitmapCache::new(1024 * 1024));
        cache.begin_session();
        let config = SchedulerConfig { decode_timeout_ms: 20, ..Default::default() };
        let renderer = FrameRenderer::new(scheduler, decoder.clone(), cache.clone(), &config);
        (renderer, decoder, cache)
    }

    #[test]
    fn test_iteration_decodes_missing_pages() {
        let (renderer, decoder, cache) = renderer(FaultPolicy::default());

        let outcome = renderer.run_iteration(snapshot(1, 3));
        assert_eq!(
            outcome,
            IterationOutcome::Rendered(FrameReport { pages: 3, decoded: 3, ..Default::default() })
        );
        assert_eq!(cache.len(), 3);

        // Second pass hits the cache
        let outcome = renderer.run_iteration(snapshot(2, 3));
        assert_eq!(
            outcome,
            IterationOutcome::Rendered(FrameReport { pages: 3, cached: 3, ..Default::default() })
        );
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 3);

        let frame = renderer.scheduler().take_frame(Duration::ZERO, false).unwrap();
        assert_eq!(frame.sequence_id(), 2);
    }

    #[test]
    fn test_decode_failure_then_recovery() {
        let (renderer, decoder, cache) = renderer(FaultPolicy::default());
        decoder.failing.lock().insert(1);

        let outcome = renderer.run_iteration(snapshot(1, 2));
        assert_eq!(
            outcome,
            IterationOutcome::Rendered(FrameReport { pages: 2, decoded: 1, failed: 1, ..Default::default() })
        );
        assert!(!cache.contains(&NodeKey::new(PageId(1), 100, false)));

        decoder.failing.lock().clear();
        renderer.run_iteration(snapshot(2, 2));
        assert!(cache.contains(&NodeKey::new(PageId(1), 100, false)));
        assert_eq!(renderer.scheduler().stats().faults, 0);
    }

    #[test]
    fn test_decode_timeout_becomes_placeholder() {
        let (renderer, decoder, cache) = renderer(FaultPolicy::default());
        *decoder.never_replies.lock() = true;

        let started = Instant::now();
        let outcome = renderer.run_iteration(snapshot(1, 1));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            outcome,
            IterationOutcome::Rendered(FrameReport { pages: 1, failed: 1, ..Default::default() })
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn test_panics_trip_degraded_mode() {
        let (renderer, decoder, _cache) = renderer(FaultPolicy::default());
        *decoder.panicking.lock() = true;

        assert_eq!(
            renderer.run_iteration(snapshot(1, 1)),
            IterationOutcome::Faulted(FaultVerdict::Counted { consecutive: 1 })
        );
        assert_eq!(
            renderer.run_iteration(snapshot(2, 1)),
            IterationOutcome::Faulted(FaultVerdict::Counted { consecutive: 2 })
        );
        assert_eq!(
            renderer.run_iteration(snapshot(3, 1)),
            IterationOutcome::Faulted(FaultVerdict::EnteredDegraded)
        );

        // Degraded: decoder is no longer called
        let calls = decoder.calls.load(Ordering::SeqCst);
        let outcome = renderer.run_iteration(snapshot(4, 1));
        assert_eq!(
            outcome,
            IterationOutcome::Rendered(FrameReport { pages: 1, degraded: true, ..Default::default() })
        );
        assert_eq!(decoder.calls.load(Ordering::SeqCst), calls);

        // Frames keep flowing
        let frame = renderer.scheduler().take_frame(Duration::ZERO, false).unwrap();
        assert_eq!(frame.sequence_id(), 4);

        *decoder.panicking.lock() = false;
        assert!(renderer.scheduler().reset_faults());
        assert_eq!(
            renderer.run_iteration(snapshot(5, 1)),
            IterationOutcome::Rendered(FrameReport { pages: 1, decoded: 1, ..Default::default() })
        );
    }

    #[test]
    fn test_zoom_change_drops_other_zoom_entries() {
        let (renderer, _decoder, cache) = renderer(FaultPolicy::default());
        renderer.run_iteration(snapshot(1, 2));
        assert_eq!(cache.len(), 2);

        let zoomed = RenderStateSnapshot::builder(ControllerId(1), 2)
            .zoom(2.0)
            .pages(vec![PageView { page: PageId(0), bounds: RectF::new(0.0, 0.0, 200.0, 200.0) }])
            .shared();
        renderer.run_iteration(zoomed);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&NodeKey::new(PageId(0), 200, false)));
    }

    #[test]
    fn test_frame_callback_invoked() {
        let (renderer, _decoder, _cache) = renderer(FaultPolicy::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let renderer = renderer.with_frame_callback(Arc::new(move |_: &SharedSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        renderer.run_iteration(snapshot(1, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_draw_thread_processes_latest_and_stops() {
        let (renderer, _decoder, cache) = renderer(FaultPolicy::default());
        let renderer = Arc::new(renderer);
        let scheduler = renderer.scheduler().clone();

        let mut draw = DrawThread::spawn(renderer, Duration::from_millis(10), CancellationToken::new())
            .expect("spawn draw thread");
        assert!(draw.is_running());

        scheduler.submit(snapshot(1, 2));
        let frame = scheduler.take_frame(Duration::from_secs(5), false).unwrap();
        assert_eq!(frame.sequence_id(), 1);
        assert_eq!(cache.len(), 2);

        draw.shutdown();
        assert!(!draw.is_running());
        assert!(draw.token().is_cancelled());
    }
}
