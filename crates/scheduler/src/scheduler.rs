//! Render scheduler
//!
//! Hands the latest render state snapshot from any thread to the draw
//! thread. Nothing is queued: a pending snapshot is replaced by a newer one,
//! and a snapshot whose sequence id is not above the highest one seen is
//! rejected. Processed snapshots come back through a second slot, the ready
//! frame, which the surface's draw call consumes.

use crate::faults::{FaultPolicy, FaultTracker, FaultVerdict};
use crate::mailbox::{Mailbox, Take};
use leafview_core::{SharedSnapshot, SnapshotSource};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Render scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Snapshots accepted by `submit`
    pub submitted: u64,

    /// Pending snapshots replaced before the draw thread picked them up
    pub coalesced: u64,

    /// Snapshots rejected because a newer sequence id had been seen
    pub stale_rejected: u64,

    /// Snapshots handed to the draw thread
    pub taken: u64,

    /// Snapshots synthesized because nothing was pending
    pub synthesized: u64,

    /// Processed snapshots published as ready frames
    pub frames_published: u64,

    pub iterations: u64,
    pub faults: u64,
    pub degraded: bool,
}

/// What `submit` did with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Slot was empty
    Accepted,
    /// Replaced a pending, older snapshot
    Coalesced { dropped_sequence_id: u64 },
    /// Sequence id not above the highest seen
    Stale { highest_seen: u64 },
    /// Scheduler was closed
    Closed,
}

struct SchedulerState {
    stats: SchedulerStats,
    faults: FaultTracker,
}

/// Latest-wins hand-off between the interaction thread and the draw thread.
///
/// # Example
///
/// ```
/// use leafview_core::{ControllerId, RenderStateSnapshot};
/// use leafview_scheduler::RenderScheduler;
/// use std::time::Duration;
///
/// let scheduler = RenderScheduler::new();
/// for id in 1..=3 {
///     scheduler.submit(RenderStateSnapshot::builder(ControllerId(1), id).shared());
/// }
///
/// let taken = scheduler.take(Duration::from_millis(10), false).unwrap();
/// assert_eq!(taken.sequence_id(), 3);
/// ```
pub struct RenderScheduler {
    pending: Mailbox<SharedSnapshot>,
    frames: Mailbox<SharedSnapshot>,
    highest_seen: AtomicU64,
    source: Option<Arc<dyn SnapshotSource>>,
    state: Mutex<SchedulerState>,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::with_policy(FaultPolicy::default())
    }

    pub fn with_policy(policy: FaultPolicy) -> Self {
        Self {
            pending: Mailbox::new(),
            frames: Mailbox::new(),
            highest_seen: AtomicU64::new(0),
            source: None,
            state: Mutex::new(SchedulerState {
                stats: SchedulerStats::default(),
                faults: FaultTracker::new(policy),
            }),
        }
    }

    /// Set the source used to synthesize a snapshot when `allow_stale` is
    /// requested and nothing is pending
    pub fn with_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Publish `snapshot` as the most recent target. Never blocks.
    pub fn submit(&self, snapshot: SharedSnapshot) -> SubmitOutcome {
        let sequence_id = snapshot.sequence_id();
        let outcome = self.pending.update(|slot| {
            let highest = self.highest_seen.load(Ordering::Acquire);
            if sequence_id <= highest {
                return SubmitOutcome::Stale { highest_seen: highest };
            }
            self.highest_seen.store(sequence_id, Ordering::Release);
            match slot.replace(snapshot) {
                Some(dropped) => {
                    SubmitOutcome::Coalesced { dropped_sequence_id: dropped.sequence_id() }
                }
                None => SubmitOutcome::Accepted,
            }
        });
        let outcome = outcome.unwrap_or(SubmitOutcome::Closed);

        let mut state = self.state.lock();
        match outcome {
            SubmitOutcome::Accepted => state.stats.submitted += 1,
            SubmitOutcome::Coalesced { .. } => {
                state.stats.submitted += 1;
                state.stats.coalesced += 1;
            }
            SubmitOutcome::Stale { .. } => state.stats.stale_rejected += 1,
            SubmitOutcome::Closed => {}
        }
        outcome
    }

    /// Wait up to `timeout` for a pending snapshot.
    ///
    /// With `allow_stale`, a snapshot of the current state is synthesized
    /// when nothing arrives in time. Returns `None` once closed.
    pub fn take(&self, timeout: Duration, allow_stale: bool) -> Option<SharedSnapshot> {
        match self.pending.take(timeout) {
            Take::Item(snapshot) => {
                self.state.lock().stats.taken += 1;
                Some(snapshot)
            }
            Take::Empty if allow_stale => self.synthesize(true),
            Take::Empty | Take::Closed => None,
        }
    }

    /// Publish a processed snapshot for the draw call, replacing an unread one
    pub fn publish_frame(&self, snapshot: SharedSnapshot) {
        if self.frames.post(snapshot).is_ok() {
            self.state.lock().stats.frames_published += 1;
        }
    }

    /// Wait up to `timeout` for a ready frame; see [`take`](Self::take) for
    /// `allow_stale`.
    ///
    /// A frame synthesized here is only drawn, never decoded, so it does not
    /// raise the sequence floor for submissions.
    pub fn take_frame(&self, timeout: Duration, allow_stale: bool) -> Option<SharedSnapshot> {
        match self.frames.take(timeout) {
            Take::Item(snapshot) => Some(snapshot),
            Take::Empty if allow_stale => self.synthesize(false),
            Take::Empty | Take::Closed => None,
        }
    }

    fn synthesize(&self, raise_floor: bool) -> Option<SharedSnapshot> {
        let snapshot = self.source.as_ref()?.capture()?;
        if raise_floor {
            self.highest_seen.fetch_max(snapshot.sequence_id(), Ordering::AcqRel);
        }
        self.state.lock().stats.synthesized += 1;
        Some(snapshot)
    }

    /// Highest sequence id observed so far
    pub fn highest_seen(&self) -> u64 {
        self.highest_seen.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.has_pending()
    }

    /// Stop accepting snapshots and wake the draw thread
    pub fn close(&self) {
        self.pending.close();
        self.frames.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Count a completed iteration
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.stats.iterations += 1;
        state.faults.record_success();
    }

    /// Count a faulted iteration
    pub fn record_fault(&self) -> FaultVerdict {
        let mut state = self.state.lock();
        state.stats.iterations += 1;
        state.stats.faults += 1;
        let verdict = state.faults.record_fault(Instant::now());
        if verdict == FaultVerdict::EnteredDegraded {
            state.stats.degraded = true;
            warn!(
                consecutive = state.faults.consecutive(),
                "render scheduler entered degraded mode, decoding disabled"
            );
        }
        verdict
    }

    /// Degraded mode check, applying an automatic reset if one is due
    pub fn is_degraded(&self) -> bool {
        let mut state = self.state.lock();
        let (degraded, auto_reset) = state.faults.check(Instant::now());
        if auto_reset {
            state.stats.degraded = false;
            info!("render scheduler left degraded mode after quiet period");
        }
        degraded
    }

    /// Explicit reset of degraded mode by the owning surface
    pub fn reset_faults(&self) -> bool {
        let mut state = self.state.lock();
        let was_degraded = state.faults.reset();
        state.stats.degraded = false;
        if was_degraded {
            info!("render scheduler degraded mode reset");
        }
        was_degraded
    }

    pub fn stats(&self) -> SchedulerStats {
        self.state.lock().stats
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafview_core::{ControllerId, RenderStateSnapshot, SnapshotSequencer};
    use rand::seq::SliceRandom;
    use std::thread;

    fn snapshot(id: u64) -> SharedSnapshot {
        RenderStateSnapshot::builder(ControllerId(1), id).shared()
    }

    struct FixedSource(SnapshotSequencer);

    impl SnapshotSource for FixedSource {
        fn capture(&self) -> Option<SharedSnapshot> {
            Some(
                RenderStateSnapshot::builder(ControllerId(1), self.0.next_id() + 100)
                    .added_to_queue(true)
                    .shared(),
            )
        }
    }

    #[test]
    fn test_take_returns_latest_of_burst() {
        let scheduler = RenderScheduler::new();
        assert_eq!(scheduler.submit(snapshot(1)), SubmitOutcome::Accepted);
        assert_eq!(
            scheduler.submit(snapshot(2)),
            SubmitOutcome::Coalesced { dropped_sequence_id: 1 }
        );
        assert_eq!(
            scheduler.submit(snapshot(3)),
            SubmitOutcome::Coalesced { dropped_sequence_id: 2 }
        );

        let taken = scheduler.take(Duration::from_millis(10), false).unwrap();
        assert_eq!(taken.sequence_id(), 3);
        assert!(scheduler.take(Duration::from_millis(1), false).is_none());

        let stats = scheduler.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(stats.taken, 1);
    }

    #[test]
    fn test_stale_snapshot_is_rejected() {
        let scheduler = RenderScheduler::new();
        scheduler.submit(snapshot(5));
        assert_eq!(scheduler.submit(snapshot(4)), SubmitOutcome::Stale { highest_seen: 5 });
        assert_eq!(scheduler.submit(snapshot(5)), SubmitOutcome::Stale { highest_seen: 5 });

        assert_eq!(scheduler.take(Duration::ZERO, false).unwrap().sequence_id(), 5);

        // Still rejected after the newer one was consumed
        assert_eq!(scheduler.submit(snapshot(3)), SubmitOutcome::Stale { highest_seen: 5 });
        assert_eq!(scheduler.stats().stale_rejected, 3);
    }

    #[test]
    fn test_random_order_takes_maximum() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let scheduler = RenderScheduler::new();
            let mut ids: Vec<u64> = (1..=20).collect();
            ids.shuffle(&mut rng);
            for id in &ids {
                scheduler.submit(snapshot(*id));
            }
            assert_eq!(scheduler.take(Duration::ZERO, false).unwrap().sequence_id(), 20);
        }
    }

    #[test]
    fn test_allow_stale_synthesizes() {
        let scheduler =
            RenderScheduler::new().with_source(Arc::new(FixedSource(SnapshotSequencer::new())));

        assert!(scheduler.take(Duration::from_millis(1), false).is_none());
        let synthesized = scheduler.take(Duration::from_millis(1), true).unwrap();
        assert!(synthesized.added_to_queue());
        assert_eq!(scheduler.highest_seen(), synthesized.sequence_id());
        assert_eq!(scheduler.stats().synthesized, 1);
    }

    #[test]
    fn test_allow_stale_without_source() {
        let scheduler = RenderScheduler::new();
        assert!(scheduler.take(Duration::from_millis(1), true).is_none());
    }

    #[test]
    fn test_ready_frames_keep_latest() {
        let scheduler = RenderScheduler::new();
        scheduler.publish_frame(snapshot(1));
        scheduler.publish_frame(snapshot(2));
        assert_eq!(scheduler.take_frame(Duration::from_millis(1), false).unwrap().sequence_id(), 2);
        assert!(scheduler.take_frame(Duration::from_millis(1), false).is_none());
        assert_eq!(scheduler.stats().frames_published, 2);
    }

    #[test]
    fn test_closed_scheduler() {
        let scheduler = RenderScheduler::new();
        scheduler.close();
        assert_eq!(scheduler.submit(snapshot(1)), SubmitOutcome::Closed);
        assert!(scheduler.take(Duration::from_secs(1), true).is_none());
        assert!(scheduler.is_closed());
    }

    #[test]
    fn test_concurrent_submitters_converge_to_maximum() {
        let scheduler = Arc::new(RenderScheduler::new());
        let sequencer = Arc::new(SnapshotSequencer::new());

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let sequencer = sequencer.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        scheduler.submit(snapshot(sequencer.next_id()));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let last = scheduler.take(Duration::ZERO, false).unwrap();
        assert_eq!(last.sequence_id(), 1000);
        assert_eq!(scheduler.highest_seen(), 1000);
    }

    #[test]
    fn test_fault_accounting_and_reset() {
        let scheduler = RenderScheduler::with_policy(FaultPolicy { max_consecutive: 2, auto_reset: None });

        assert_eq!(scheduler.record_fault(), FaultVerdict::Counted { consecutive: 1 });
        assert!(!scheduler.is_degraded());
        assert_eq!(scheduler.record_fault(), FaultVerdict::EnteredDegraded);
        assert!(scheduler.is_degraded());
        assert!(scheduler.stats().degraded);

        assert!(scheduler.reset_faults());
        assert!(!scheduler.is_degraded());

        scheduler.record_success();
        let stats = scheduler.stats();
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.faults, 2);
        assert!(!stats.degraded);
    }
}
