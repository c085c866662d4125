//! Default touch behavior
//!
//! Used only for events the document controller did not consume: a drag
//! scrolls the surface, and releasing with enough speed starts a fling.

use leafview_core::{TouchAction, TouchEvent};

/// Below this release speed (pixels per second) no fling is started
pub const MIN_FLING_VELOCITY: f32 = 50.0;

/// Weight of the newest sample in the velocity estimate
const VELOCITY_SMOOTHING: f32 = 0.8;

/// What the surface should do in response to a touch event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchResponse {
    /// Nothing to do
    Ignored,
    /// A new touch landed; stop any running fling
    Stop,
    /// Scroll the content by this delta
    ScrollBy { dx: i32, dy: i32 },
    /// Finger velocity at release, in pixels per second
    Fling { velocity_x: f32, velocity_y: f32 },
}

/// Tracks one drag gesture
#[derive(Debug, Clone, Default)]
pub struct DragTracker {
    last: Option<(f32, f32, u64)>,
    velocity_x: f32,
    velocity_y: f32,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.last.is_some()
    }

    /// Smoothed finger velocity in pixels per second
    pub fn velocity(&self) -> (f32, f32) {
        (self.velocity_x, self.velocity_y)
    }

    pub fn on_event(&mut self, event: &TouchEvent) -> TouchResponse {
        match event.action {
            TouchAction::Down => {
                self.last = Some((event.x, event.y, event.time_ms));
                self.velocity_x = 0.0;
                self.velocity_y = 0.0;
                TouchResponse::Stop
            }
            TouchAction::Move => {
                let Some((last_x, last_y, last_time)) = self.last else {
                    return TouchResponse::Ignored;
                };
                let delta_x = event.x - last_x;
                let delta_y = event.y - last_y;

                let elapsed_ms = event.time_ms.saturating_sub(last_time);
                if elapsed_ms > 0 {
                    let seconds = elapsed_ms as f32 / 1000.0;
                    self.velocity_x = smooth(self.velocity_x, delta_x / seconds);
                    self.velocity_y = smooth(self.velocity_y, delta_y / seconds);
                }
                self.last = Some((event.x, event.y, event.time_ms));

                // Content follows the finger, so the scroll offset moves the other way
                let dx = -delta_x.round() as i32;
                let dy = -delta_y.round() as i32;
                if dx == 0 && dy == 0 {
                    TouchResponse::Ignored
                } else {
                    TouchResponse::ScrollBy { dx, dy }
                }
            }
            TouchAction::Up => {
                if self.last.take().is_none() {
                    return TouchResponse::Ignored;
                }
                let (velocity_x, velocity_y) = self.velocity();
                if velocity_x.hypot(velocity_y) >= MIN_FLING_VELOCITY {
                    TouchResponse::Fling { velocity_x, velocity_y }
                } else {
                    TouchResponse::Ignored
                }
            }
            TouchAction::Cancel => {
                self.last = None;
                self.velocity_x = 0.0;
                self.velocity_y = 0.0;
                TouchResponse::Ignored
            }
        }
    }
}

fn smooth(previous: f32, sample: f32) -> f32 {
    VELOCITY_SMOOTHING * sample + (1.0 - VELOCITY_SMOOTHING) * previous
}
