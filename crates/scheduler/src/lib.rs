//! Leafview Scheduler Library
//!
//! Background coordination for the viewer surface: the render scheduler and
//! its draw thread, the scroll coordinator and its scroll thread, and the
//! single-slot mailbox both are built on.
//!
//! # Example
//!
//! ```
//! use leafview_core::{ControllerId, RenderStateSnapshot};
//! use leafview_scheduler::{RenderScheduler, SubmitOutcome};
//! use std::time::Duration;
//!
//! let scheduler = RenderScheduler::new();
//!
//! // Submissions made while the draw thread is busy collapse to the newest
//! scheduler.submit(RenderStateSnapshot::builder(ControllerId(1), 1).shared());
//! let outcome = scheduler.submit(RenderStateSnapshot::builder(ControllerId(1), 2).shared());
//! assert_eq!(outcome, SubmitOutcome::Coalesced { dropped_sequence_id: 1 });
//!
//! let next = scheduler.take(Duration::from_millis(10), false).unwrap();
//! assert_eq!(next.sequence_id(), 2);
//! ```

mod cancel;
mod draw_thread;
mod faults;
mod mailbox;
mod scheduler;
mod scroll;

// Re-export public API
pub use cancel::CancellationToken;
pub use draw_thread::{DrawThread, FrameCallback, FrameRenderer, FrameReport, IterationOutcome};
pub use faults::{FaultPolicy, FaultTracker, FaultVerdict};
pub use mailbox::{Closed, Mailbox, Take};
pub use scheduler::{RenderScheduler, SchedulerStats, SubmitOutcome};
pub use scroll::{ScrollCoordinator, ScrollSample, ScrollStats, ScrollSurface};
