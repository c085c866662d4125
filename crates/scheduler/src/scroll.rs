//! Scroll coordinator
//!
//! The interaction thread reports scroll changes at display refresh rate and
//! requests absolute scroll targets. Both land in a single-slot inbox; a
//! dedicated thread drains it, moves the physical surface to the latest
//! target, and republishes a coalesced sample stream to the document
//! controller. The stream never repeats a position back to back and never
//! goes back in time.

use crate::mailbox::{Mailbox, Take};
use leafview_core::{ScrollConfig, SharedController, ViewerError, ViewerResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// The physical scrollable surface the coordinator drives
pub trait ScrollSurface: Send + Sync {
    /// Move to `(x, y)` and return the previous position
    fn apply_scroll(&self, x: i32, y: i32) -> (i32, i32);

    fn scroll_position(&self) -> (i32, i32);
}

/// One position emitted to the document controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSample {
    pub x: i32,
    pub y: i32,
    /// Order of the request that produced this sample
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target {
    x: i32,
    y: i32,
    stamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Change {
    cur: (i32, i32),
    old: (i32, i32),
    stamp: u64,
}

/// Pending work: the latest target and the latest reported change
#[derive(Debug, Default)]
struct Inbox {
    target: Option<Target>,
    change: Option<Change>,
}

/// Coordinator statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollStats {
    /// Requests accepted (targets and changes)
    pub requests: u64,
    /// Drain cycles that found work
    pub drains: u64,
    /// Targets applied to the surface
    pub applied: u64,
    /// Samples delivered to the controller
    pub emitted: u64,
    /// Samples suppressed as duplicates or out of order
    pub suppressed: u64,
    /// Requests ignored after `finish()`
    pub ignored: u64,
}

struct Shared {
    inbox: Mailbox<Inbox>,
    stamps: AtomicU64,
    controller: SharedController,
    surface: Arc<dyn ScrollSurface>,
    last: Mutex<Option<ScrollSample>>,
    stats: Mutex<ScrollStats>,
}

impl Shared {
    fn post(&self, operation: &'static str, edit: impl FnOnce(&mut Inbox, u64)) {
        let result = self.inbox.update(|slot| {
            let stamp = self.stamps.fetch_add(1, Ordering::AcqRel) + 1;
            edit(slot.get_or_insert_with(Inbox::default), stamp);
        });
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => stats.requests += 1,
            Err(_) => {
                stats.ignored += 1;
                let error = ViewerError::Misuse { operation };
                debug!(%error, "ignoring scroll request");
            }
        }
    }

    fn process(&self, inbox: Inbox) -> Option<ScrollSample> {
        self.stats.lock().drains += 1;

        let mut candidate: Option<(ScrollSample, (i32, i32))> = None;
        if let Some(target) = inbox.target {
            let old = self.surface.apply_scroll(target.x, target.y);
            self.stats.lock().applied += 1;
            candidate = Some((ScrollSample { x: target.x, y: target.y, sequence: target.stamp }, old));
        }
        if let Some(change) = inbox.change {
            let newer = candidate.map_or(true, |(sample, _)| change.stamp > sample.sequence);
            if newer {
                let (x, y) = change.cur;
                candidate = Some((ScrollSample { x, y, sequence: change.stamp }, change.old));
            }
        }

        let (sample, reported_old) = candidate?;
        self.emit(sample, reported_old)
    }

    fn emit(&self, sample: ScrollSample, reported_old: (i32, i32)) -> Option<ScrollSample> {
        let old = {
            let mut last = self.last.lock();
            if let Some(previous) = *last {
                if sample.sequence <= previous.sequence
                    || (sample.x, sample.y) == (previous.x, previous.y)
                {
                    drop(last);
                    self.stats.lock().suppressed += 1;
                    return None;
                }
            }
            let old = last.map_or(reported_old, |previous| (previous.x, previous.y));
            *last = Some(sample);
            old
        };

        self.controller.on_scroll_changed(sample.x, sample.y, old.0, old.1);
        self.stats.lock().emitted += 1;
        Some(sample)
    }
}

/// Coalescing scroll thread.
///
/// Created idle; [`start`](Self::start) spawns the thread. Without a thread,
/// [`drain_once`](Self::drain_once) runs one cycle on the caller's thread.
pub struct ScrollCoordinator {
    shared: Arc<Shared>,
    poll_interval: Duration,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ScrollCoordinator {
    pub fn new(
        controller: SharedController,
        surface: Arc<dyn ScrollSurface>,
        config: &ScrollConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inbox: Mailbox::new(),
                stamps: AtomicU64::new(0),
                controller,
                surface,
                last: Mutex::new(None),
                stats: Mutex::new(ScrollStats::default()),
            }),
            poll_interval: config.poll_interval(),
            thread: Mutex::new(None),
        }
    }

    /// Spawn the scroll thread. Calling it again while running does nothing.
    pub fn start(&self) -> ViewerResult<()> {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            return Ok(());
        }

        let shared = self.shared.clone();
        let poll_interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name("leafview-scroll".to_string())
            .spawn(move || {
                debug!("scroll thread started");
                loop {
                    match shared.inbox.take(poll_interval) {
                        Take::Item(inbox) => {
                            shared.process(inbox);
                        }
                        Take::Empty => continue,
                        Take::Closed => break,
                    }
                }
                debug!("scroll thread exited");
            })
            .map_err(|source| ViewerError::Spawn { name: "scroll", source })?;

        *thread = Some(handle);
        Ok(())
    }

    /// Request an absolute scroll position. Never blocks.
    pub fn scroll_to(&self, x: i32, y: i32) {
        self.shared.post("scroll_to", |inbox, stamp| {
            inbox.target = Some(Target { x, y, stamp });
        });
    }

    /// Report a scroll change made by the platform. Never blocks.
    pub fn on_scroll_changed(&self, cur_x: i32, cur_y: i32, old_x: i32, old_y: i32) {
        self.shared.post("on_scroll_changed", |inbox, stamp| {
            let old = match inbox.change {
                // Keep the oldest origin across coalesced changes
                Some(pending) => pending.old,
                None => (old_x, old_y),
            };
            inbox.change = Some(Change { cur: (cur_x, cur_y), old, stamp });
        });
    }

    /// Run one drain cycle on the calling thread.
    ///
    /// Returns the sample delivered to the controller, if any.
    pub fn drain_once(&self) -> Option<ScrollSample> {
        let inbox = self.shared.inbox.try_take()?;
        self.shared.process(inbox)
    }

    /// Stop accepting requests without waiting.
    ///
    /// A running thread drains what is pending exactly once and exits on its
    /// own; without one the pending request is drained on the caller.
    pub fn close(&self) {
        self.shared.inbox.close();

        let started = self.thread.lock().is_some();
        if !started {
            self.drain_once();
        }
    }

    /// Wait for the scroll thread to exit. Returns at once if it never ran.
    pub fn join(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("scroll thread panicked");
        }
    }

    /// [`close`](Self::close), then [`join`](Self::join). Idempotent.
    pub fn finish(&self) {
        self.close();
        self.join();
    }

    pub fn is_finished(&self) -> bool {
        self.shared.inbox.is_closed()
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Last sample delivered to the controller
    pub fn last_sample(&self) -> Option<ScrollSample> {
        *self.shared.last.lock()
    }

    pub fn stats(&self) -> ScrollStats {
        *self.shared.stats.lock()
    }
}

impl Drop for ScrollCoordinator {
    fn drop(&mut self) {
        self.finish();
    }
}
