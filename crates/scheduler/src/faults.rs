//! Consecutive fault accounting for the draw thread
//!
//! A run of faulted iterations at least `max_consecutive` long puts the
//! scheduler into degraded mode, where decode attempts are skipped. Degraded
//! mode is left by an explicit reset, or after a quiet period when one is
//! configured.

use leafview_core::SchedulerConfig;
use std::time::{Duration, Instant};

/// When to enter and leave degraded mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    pub max_consecutive: u32,
    pub auto_reset: Option<Duration>,
}

impl FaultPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_consecutive: config.max_consecutive_faults.max(1),
            auto_reset: config.degraded_auto_reset(),
        }
    }
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// What a recorded fault did to the scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    /// Still healthy, `consecutive` faults in a row so far
    Counted { consecutive: u32 },
    /// This fault tripped degraded mode
    EnteredDegraded,
    /// Already degraded
    StillDegraded,
}

#[derive(Debug)]
pub struct FaultTracker {
    policy: FaultPolicy,
    consecutive: u32,
    degraded_since: Option<Instant>,
}

impl FaultTracker {
    pub fn new(policy: FaultPolicy) -> Self {
        Self { policy, consecutive: 0, degraded_since: None }
    }

    /// A completed iteration breaks the fault run
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn record_fault(&mut self, now: Instant) -> FaultVerdict {
        self.consecutive = self.consecutive.saturating_add(1);

        if self.degraded_since.is_some() {
            return FaultVerdict::StillDegraded;
        }
        if self.consecutive >= self.policy.max_consecutive {
            self.degraded_since = Some(now);
            return FaultVerdict::EnteredDegraded;
        }
        FaultVerdict::Counted { consecutive: self.consecutive }
    }

    /// Check degraded mode, applying the automatic reset if it is due.
    ///
    /// Returns `(degraded, auto_reset_happened)`.
    pub fn check(&mut self, now: Instant) -> (bool, bool) {
        match (self.degraded_since, self.policy.auto_reset) {
            (Some(since), Some(quiet)) if now.saturating_duration_since(since) >= quiet => {
                self.reset();
                (false, true)
            }
            (Some(_), _) => (true, false),
            (None, _) => (false, false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_since.is_some()
    }

    /// Leave degraded mode and clear the fault run
    pub fn reset(&mut self) -> bool {
        self.consecutive = 0;
        self.degraded_since.take().is_some()
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

impl Default for FaultTracker {
    fn default() -> Self {
        Self::new(FaultPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_consecutive: u32, auto_reset: Option<Duration>) -> FaultPolicy {
        FaultPolicy { max_consecutive, auto_reset }
    }

    #[test]
    fn test_three_consecutive_faults_degrade() {
        let mut tracker = FaultTracker::default();
        let now = Instant::now();

        assert_eq!(tracker.record_fault(now), FaultVerdict::Counted { consecutive: 1 });
        assert_eq!(tracker.record_fault(now), FaultVerdict::Counted { consecutive: 2 });
        assert_eq!(tracker.record_fault(now), FaultVerdict::EnteredDegraded);
        assert!(tracker.is_degraded());
        assert_eq!(tracker.record_fault(now), FaultVerdict::StillDegraded);
        assert_eq!(tracker.consecutive(), 4);
    }

    #[test]
    fn test_success_breaks_the_run() {
        let mut tracker = FaultTracker::new(policy(3, None));
        let now = Instant::now();

        tracker.record_fault(now);
        tracker.record_fault(now);
        tracker.record_success();
        assert_eq!(tracker.consecutive(), 0);
        assert_eq!(tracker.record_fault(now), FaultVerdict::Counted { consecutive: 1 });
        assert!(!tracker.is_degraded());
    }

    #[test]
    fn test_manual_reset_only_by_default() {
        let mut tracker = FaultTracker::new(policy(1, None));
        let start = Instant::now();
        tracker.record_fault(start);

        assert_eq!(tracker.check(start + Duration::from_secs(3600)), (true, false));
        assert!(tracker.reset());
        assert!(!tracker.is_degraded());
        assert!(!tracker.reset());
    }

    #[test]
    fn test_auto_reset_after_quiet_period() {
        let mut tracker = FaultTracker::new(policy(2, Some(Duration::from_millis(500))));
        let start = Instant::now();
        tracker.record_fault(start);
        tracker.record_fault(start);

        assert_eq!(tracker.check(start + Duration::from_millis(100)), (true, false));
        assert_eq!(tracker.check(start + Duration::from_millis(500)), (false, true));
        assert_eq!(tracker.consecutive(), 0);
    }

    #[test]
    fn test_policy_from_config_clamps_zero() {
        let config = SchedulerConfig { max_consecutive_faults: 0, ..Default::default() };
        assert_eq!(FaultPolicy::from_config(&config).max_consecutive, 1);
    }
}
