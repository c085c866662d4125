//! Single-slot mailbox
//!
//! Producers replace the pending value instead of queueing behind it, so a
//! consumer that falls behind only ever sees the latest value. Both render
//! submission and scroll targets go through this.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// The mailbox no longer accepts values
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("mailbox is closed")]
pub struct Closed;

/// Result of waiting on a mailbox
#[derive(Debug, PartialEq, Eq)]
pub enum Take<T> {
    Item(T),
    /// Timed out with nothing pending
    Empty,
    /// Closed and fully drained
    Closed,
}

impl<T> Take<T> {
    pub fn into_item(self) -> Option<T> {
        match self {
            Take::Item(item) => Some(item),
            Take::Empty | Take::Closed => None,
        }
    }
}

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// Single-slot, coalescing hand-off between threads
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self { slot: Mutex::new(Slot { value: None, closed: false }), ready: Condvar::new() }
    }

    /// Replace the pending value. Returns the value it superseded, if any.
    pub fn post(&self, value: T) -> Result<Option<T>, Closed> {
        self.update(|slot| slot.replace(value))
    }

    /// Edit the pending slot under the lock.
    ///
    /// A waiting consumer is woken if the slot holds a value afterwards.
    pub fn update<R>(&self, f: impl FnOnce(&mut Option<T>) -> R) -> Result<R, Closed> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(Closed);
        }
        let result = f(&mut slot.value);
        let notify = slot.value.is_some();
        drop(slot);
        if notify {
            self.ready.notify_one();
        }
        Ok(result)
    }

    /// Wait up to `timeout` for a value.
    ///
    /// After [`close`](Self::close) a value that was still pending is handed
    /// out once; later calls return [`Take::Closed`] immediately.
    ///
    /// A `timeout` too large to express as a deadline waits without one.
    pub fn take(&self, timeout: Duration) -> Take<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.value.take() {
                return Take::Item(value);
            }
            if slot.closed {
                return Take::Closed;
            }
            let Some(deadline) = deadline else {
                self.ready.wait(&mut slot);
                continue;
            };
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return match slot.value.take() {
                    Some(value) => Take::Item(value),
                    None if slot.closed => Take::Closed,
                    None => Take::Empty,
                };
            }
        }
    }

    /// Take the pending value without waiting
    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().value.take()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().value.is_some()
    }

    /// Stop accepting values and wake every waiter
    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_replaces_pending() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.post(1), Ok(None));
        assert_eq!(mailbox.post(2), Ok(Some(1)));
        assert_eq!(mailbox.post(3), Ok(Some(2)));

        assert_eq!(mailbox.take(Duration::ZERO), Take::Item(3));
        assert_eq!(mailbox.take(Duration::from_millis(1)), Take::Empty);
    }

    #[test]
    fn test_take_wakes_on_post() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                mailbox.post("latest").unwrap();
            })
        };

        assert_eq!(mailbox.take(Duration::from_secs(5)), Take::Item("latest"));
        producer.join().unwrap();
    }

    #[test]
    fn test_close_drains_pending_once() {
        let mailbox = Mailbox::new();
        mailbox.post(7).unwrap();
        mailbox.close();

        assert_eq!(mailbox.post(8), Err(Closed));
        assert_eq!(mailbox.take(Duration::from_secs(1)), Take::Item(7));
        assert_eq!(mailbox.take(Duration::from_secs(1)), Take::Closed);
    }

    #[test]
    fn test_close_wakes_waiter() {
        let mailbox: Arc<Mailbox<u32>> = Arc::new(Mailbox::new());
        let waiter = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.take(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        mailbox.close();
        assert_eq!(waiter.join().unwrap(), Take::Closed);
        assert!(mailbox.is_closed());
    }

    #[test]
    fn test_take_without_representable_deadline() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                mailbox.post(5).unwrap();
                thread::sleep(Duration::from_millis(20));
                mailbox.close();
            })
        };

        assert_eq!(mailbox.take(Duration::MAX), Take::Item(5));
        assert_eq!(mailbox.take(Duration::MAX), Take::Closed);
        producer.join().unwrap();
    }

    #[test]
    fn test_update_sees_pending_value() {
        let mailbox = Mailbox::new();
        mailbox.post(10).unwrap();
        let seen = mailbox.update(|slot| slot.map(|v| v * 2)).unwrap();
        assert_eq!(seen, Some(20));
        assert!(mailbox.has_pending());
        assert_eq!(mailbox.try_take(), Some(10));
        assert!(!mailbox.has_pending());
    }
}
