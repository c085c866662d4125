//! Error taxonomy
//!
//! Nothing here escapes the surface at runtime. Decode failures become
//! placeholder tiles, iteration faults are counted by the draw thread, pool
//! exhaustion falls back to a temporary draw event, and misuse after
//! `finish()` is ignored. The types exist so those events can be logged and
//! tested uniformly, and so construction-time failures can be returned.

use crate::config::ConfigError;
use crate::controller::PageId;
use std::time::Duration;

/// A single page decode did not produce a bitmap
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("decode failed for page {page}: {reason}")]
    Failed { page: PageId, reason: String },

    #[error("decode of page {page} did not finish within {timeout:?}")]
    TimedOut { page: PageId, timeout: Duration },

    #[error("decoder dropped the request for page {page}")]
    Disconnected { page: PageId },
}

impl DecodeError {
    pub fn page(&self) -> PageId {
        match self {
            DecodeError::Failed { page, .. }
            | DecodeError::TimedOut { page, .. }
            | DecodeError::Disconnected { page } => *page,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Transient decode failure; rendered as a placeholder
    #[error("transient decode failure: {0}")]
    Decode(#[from] DecodeError),

    /// Unhandled failure inside one render iteration
    #[error("render iteration faulted: {0}")]
    SchedulerFault(String),

    /// No pooled draw event was free
    #[error("event pool exhausted: all {capacity} slots are checked out")]
    PoolExhaustion { capacity: usize },

    /// Work submitted after a coordinator was finished
    #[error("{operation} called after finish()")]
    Misuse { operation: &'static str },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
