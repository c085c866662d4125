//! One-shot gate
//!
//! [`Flag`] starts cleared and is set exactly once. Waiters block with a
//! bounded timeout so callers can poll it in a loop.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// One-shot boolean gate. Never resets once set.
#[derive(Debug, Default)]
pub struct Flag {
    set: Mutex<bool>,
    cond: Condvar,
}

impl Flag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    ///
    /// Returns `true` for the call that performed the false→true transition.
    pub fn set(&self) -> bool {
        let mut set = self.set.lock();
        if *set {
            return false;
        }
        *set = true;
        self.cond.notify_all();
        true
    }

    pub fn get(&self) -> bool {
        *self.set.lock()
    }

    /// Wait up to `timeout` for the flag to be set. Returns the flag value.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut set = self.set.lock();
        if !*set {
            let _ = self.cond.wait_for(&mut set, timeout);
        }
        *set
    }
}
