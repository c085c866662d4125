//! Shutdown token for the background loops
//!
//! The owning surface cancels the token on destroy. Loops check it between
//! iterations; work already in progress is allowed to finish.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation shared by a loop and its owner
///
/// # Example
///
/// ```
/// use leafview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let loop_token = token.clone();
///
/// token.cancel();
/// assert!(loop_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
