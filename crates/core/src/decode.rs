//! Decode collaborator contract
//!
//! The page decoder lives outside this workspace. The surface only asks it to
//! decode one page region at one zoom and waits a bounded time for the reply.
//! Replies travel over a one-shot channel so the caller can impose its own
//! timeout regardless of how the decoder schedules its work.

use crate::controller::PageId;
use crate::error::DecodeError;
use crate::geometry::RectF;
use crate::snapshot::SharedSnapshot;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Decoded page pixels (RGBA, row-major)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }

    /// Solid-color bitmap, handy for synthetic decoders
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat((width as usize) * (height as usize));
        Self { width, height, pixels }
    }

    /// Memory footprint of the pixel buffer in bytes
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Bitmaps are shared between the cache, the compositor and the decoder
pub type BitmapRef = Arc<Bitmap>;

/// One decode request: a page, its bounds at the requested zoom, and whether
/// colors should be inverted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeRequest {
    pub page: PageId,
    pub bounds_at_zoom: RectF,
    pub zoom_key: u32,
    pub invert: bool,
}

/// Result of a single decode
pub type DecodeResult = Result<BitmapRef, DecodeError>;

/// Receiving half of a pending decode
#[derive(Debug)]
pub struct DecodeHandle {
    page: PageId,
    reply: Receiver<DecodeResult>,
}

/// Sending half of a pending decode, held by the decoder
#[derive(Debug)]
pub struct DecodeReply {
    reply: Sender<DecodeResult>,
}

impl DecodeHandle {
    /// Create a connected handle/reply pair for `page`
    pub fn pending(page: PageId) -> (DecodeHandle, DecodeReply) {
        let (tx, rx) = bounded(1);
        (DecodeHandle { page, reply: rx }, DecodeReply { reply: tx })
    }

    /// Handle that already carries its result (synchronous decoders)
    pub fn ready(page: PageId, result: DecodeResult) -> DecodeHandle {
        let (handle, reply) = Self::pending(page);
        reply.send(result);
        handle
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    /// Wait at most `timeout` for the decoder's answer.
    ///
    /// Expiry and a dropped reply are both reported as errors; a result that
    /// arrives after expiry is discarded with the handle.
    pub fn wait(self, timeout: Duration) -> DecodeResult {
        match self.reply.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(DecodeError::TimedOut { page: self.page, timeout })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(DecodeError::Disconnected { page: self.page })
            }
        }
    }
}

impl DecodeReply {
    /// Deliver the result. A caller that already gave up is ignored.
    pub fn send(self, result: DecodeResult) {
        let _ = self.reply.send(result);
    }
}

/// Injected page decoder.
///
/// Both methods are called from the draw thread and must not block beyond a
/// bounded time; heavy work belongs on the decoder's own workers.
pub trait DecodeService: Send + Sync {
    /// Start decoding one page region
    fn decode(&self, request: DecodeRequest) -> DecodeHandle;

    /// Priority hint: the visible state changed. Fire-and-forget.
    fn update_view_state(&self, snapshot: &SharedSnapshot);
}
