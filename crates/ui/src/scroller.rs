//! Scroll animation model
//!
//! Two kinds of motion are supported: a fixed-duration animated scroll by a
//! delta (page scrolling) and a fling that starts at a given velocity and
//! decelerates at a constant rate until it comes to rest or hits the limits.
//! The model is polled once per frame with [`Scroller::compute_scroll_offset`].
//!
//! Every time-dependent method has an `_at` variant taking the current
//! [`Instant`], so animations can be stepped deterministically.

use leafview_core::Rect;
use std::time::{Duration, Instant};

/// Default fling deceleration in pixels per second squared
pub const DEFAULT_DECELERATION: f32 = 2000.0;

/// Default duration of an animated scroll
pub const DEFAULT_SCROLL_DURATION: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    /// Eased scroll by a delta
    Scroll,
    /// Constant-deceleration fling along a unit direction
    Fling { speed: f32, dir_x: f32, dir_y: f32, limits: Rect },
}

#[derive(Debug, Clone)]
pub struct Scroller {
    motion: Motion,
    deceleration: f32,
    start_x: i32,
    start_y: i32,
    final_x: i32,
    final_y: i32,
    curr_x: i32,
    curr_y: i32,
    start_time: Instant,
    duration: Duration,
    finished: bool,
}

impl Scroller {
    /// Create an idle scroller with the given fling deceleration
    pub fn new(deceleration: f32) -> Self {
        let deceleration = if deceleration > 0.0 { deceleration } else { DEFAULT_DECELERATION };
        Self {
            motion: Motion::Scroll,
            deceleration,
            start_x: 0,
            start_y: 0,
            final_x: 0,
            final_y: 0,
            curr_x: 0,
            curr_y: 0,
            start_time: Instant::now(),
            duration: Duration::ZERO,
            finished: true,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop in place (`true`) or mark the animation as running again (`false`)
    pub fn force_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    /// Stop and jump to the final position
    pub fn abort_animation(&mut self) {
        self.curr_x = self.final_x;
        self.curr_y = self.final_y;
        self.finished = true;
    }

    pub fn curr_x(&self) -> i32 {
        self.curr_x
    }

    pub fn curr_y(&self) -> i32 {
        self.curr_y
    }

    pub fn final_x(&self) -> i32 {
        self.final_x
    }

    pub fn final_y(&self) -> i32 {
        self.final_y
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn start_scroll(&mut self, start_x: i32, start_y: i32, dx: i32, dy: i32, duration: Duration) {
        self.start_scroll_at(start_x, start_y, dx, dy, duration, Instant::now());
    }

    /// Animated scroll from `(start_x, start_y)` by `(dx, dy)`, easing out
    pub fn start_scroll_at(
        &mut self,
        start_x: i32,
        start_y: i32,
        dx: i32,
        dy: i32,
        duration: Duration,
        now: Instant,
    ) {
        self.motion = Motion::Scroll;
        self.begin(start_x, start_y, now);
        self.final_x = start_x.saturating_add(dx);
        self.final_y = start_y.saturating_add(dy);
        self.duration = duration;
        self.finished = false;
    }

    pub fn fling(&mut self, start_x: i32, start_y: i32, velocity_x: f32, velocity_y: f32, limits: Rect) {
        self.fling_at(start_x, start_y, velocity_x, velocity_y, limits, Instant::now());
    }

    /// Start a fling at `(velocity_x, velocity_y)` pixels per second.
    ///
    /// The motion decelerates uniformly and never leaves `limits`. A zero
    /// velocity leaves the scroller finished at the start position.
    pub fn fling_at(
        &mut self,
        start_x: i32,
        start_y: i32,
        velocity_x: f32,
        velocity_y: f32,
        limits: Rect,
        now: Instant,
    ) {
        self.begin(start_x, start_y, now);

        let speed = velocity_x.hypot(velocity_y);
        if !speed.is_finite() || speed <= 0.0 {
            self.motion = Motion::Scroll;
            self.final_x = start_x;
            self.final_y = start_y;
            self.duration = Duration::ZERO;
            self.finished = true;
            return;
        }

        let dir_x = velocity_x / speed;
        let dir_y = velocity_y / speed;
        let seconds = speed / self.deceleration;
        let distance = speed * seconds / 2.0;

        self.motion = Motion::Fling { speed, dir_x, dir_y, limits };
        self.duration = Duration::from_secs_f32(seconds);
        let (final_x, final_y) = limits.clamp_point(
            start_x.saturating_add((dir_x * distance).round() as i32),
            start_y.saturating_add((dir_y * distance).round() as i32),
        );
        self.final_x = final_x;
        self.final_y = final_y;
        self.finished = false;
    }

    pub fn compute_scroll_offset(&mut self) -> bool {
        self.compute_scroll_offset_at(Instant::now())
    }

    /// Advance to `now`. Returns `true` while the animation produced a new
    /// position, including the final step.
    pub fn compute_scroll_offset_at(&mut self, now: Instant) -> bool {
        if self.finished {
            return false;
        }

        let elapsed = now.saturating_duration_since(self.start_time);
        if elapsed >= self.duration {
            self.curr_x = self.final_x;
            self.curr_y = self.final_y;
            self.finished = true;
            return true;
        }

        let t = elapsed.as_secs_f32();
        match self.motion {
            Motion::Scroll => {
                let progress = t / self.duration.as_secs_f32();
                let eased = 1.0 - (1.0 - progress) * (1.0 - progress);
                self.curr_x = lerp(self.start_x, self.final_x, eased);
                self.curr_y = lerp(self.start_y, self.final_y, eased);
            }
            Motion::Fling { speed, dir_x, dir_y, limits } => {
                let distance = speed * t - self.deceleration * t * t / 2.0;
                let (x, y) = limits.clamp_point(
                    self.start_x.saturating_add((dir_x * distance).round() as i32),
                    self.start_y.saturating_add((dir_y * distance).round() as i32),
                );
                self.curr_x = x;
                self.curr_y = y;
                if (x, y) == (self.final_x, self.final_y) {
                    self.finished = true;
                }
            }
        }
        true
    }

    fn begin(&mut self, start_x: i32, start_y: i32, now: Instant) {
        self.start_x = start_x;
        self.start_y = start_y;
        self.curr_x = start_x;
        self.curr_y = start_y;
        self.start_time = now;
    }
}

impl Default for Scroller {
    fn default() -> Self {
        Self::new(DEFAULT_DECELERATION)
    }
}

fn lerp(from: i32, to: i32, t: f32) -> i32 {
    let (from, to) = (i64::from(from), i64::from(to));
    let value = from + ((to - from) as f64 * f64::from(t)).round() as i64;
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
