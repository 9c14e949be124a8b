use std::sync::Arc;
use std::time::Instant;

use super::source::{SystemTimeSource, TimeSource};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time elapsed since the previous tick, in seconds.
    pub dt: f32,

    /// Unclamped elapsed time, in seconds.
    pub raw_dt: f32,

    /// Timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// One clock per window loop. Delta time is clamped to `[dt_min, dt_max]` so a
/// debugger pause, a minimized window or a device-reset stall does not turn into
/// one huge simulation step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    source: Arc<dyn TimeSource>,
    last: Instant,
    frame_index: u64,
    dt_min: f32,
    dt_max: f32,
}

impl FrameClock {
    /// System-time clock with a 0.1s maximum step and no minimum.
    pub fn new() -> Self {
        Self::with_source(Arc::new(SystemTimeSource), 0.0, 0.1)
    }

    pub fn with_clamps(dt_min: f32, dt_max: f32) -> Self {
        Self::with_source(Arc::new(SystemTimeSource), dt_min, dt_max)
    }

    pub fn with_source(source: Arc<dyn TimeSource>, dt_min: f32, dt_max: f32) -> Self {
        let last = source.now();
        let (dt_min, dt_max) = normalize_clamps(dt_min, dt_max);
        Self {
            source,
            last,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    pub fn set_clamps(&mut self, dt_min: f32, dt_max: f32) {
        (self.dt_min, self.dt_max) = normalize_clamps(dt_min, dt_max);
    }

    #[inline]
    pub fn max_delta(&self) -> f32 {
        self.dt_max
    }

    /// Resets the baseline so the next tick measures from now.
    ///
    /// Called when focus returns or the loop resumes after suspension.
    pub fn reset(&mut self) {
        self.last = self.source.now();
    }

    /// Advances the clock and returns a new `FrameTime`.
    pub fn tick(&mut self) -> FrameTime {
        let now = self.source.now();
        let raw_dt = now.saturating_duration_since(self.last).as_secs_f32();
        let dt = raw_dt.clamp(self.dt_min, self.dt_max);

        self.last = now;

        let ft = FrameTime {
            dt,
            raw_dt,
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);

        ft
    }
}

/// Orders the clamp bounds so `f32::clamp` never sees `min > max` or NaN.
/// An inverted pair collapses to the minimum.
fn normalize_clamps(dt_min: f32, dt_max: f32) -> (f32, f32) {
    let dt_min = if dt_min.is_nan() { 0.0 } else { dt_min.max(0.0) };
    let dt_max = if dt_max.is_nan() { f32::INFINITY } else { dt_max.max(dt_min) };
    (dt_min, dt_max)
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;
    use std::time::Duration;

    fn clock(min: f32, max: f32) -> (ManualTimeSource, FrameClock) {
        let source = ManualTimeSource::new();
        let clock = FrameClock::with_source(Arc::new(source.clone()), min, max);
        (source, clock)
    }

    #[test]
    fn stall_is_clamped_to_max() {
        let (source, mut clock) = clock(0.0, 0.2);
        source.advance(Duration::from_secs(2));
        let ft = clock.tick();
        assert_eq!(ft.dt, 0.2);
        approx::assert_relative_eq!(ft.raw_dt, 2.0);
    }

    #[test]
    fn short_frames_pass_through() {
        let (source, mut clock) = clock(0.0, 0.2);
        source.advance(Duration::from_millis(16));
        approx::assert_relative_eq!(clock.tick().dt, 0.016, epsilon = 1e-6);
    }

    #[test]
    fn minimum_clamp_applies() {
        let (_source, mut clock) = clock(0.001, 0.2);
        assert_eq!(clock.tick().dt, 0.001);
    }

    #[test]
    fn inverted_clamps_collapse_to_the_minimum() {
        let (source, mut clock) = clock(0.5, 0.2);
        source.advance(Duration::from_secs(2));
        assert_eq!(clock.tick().dt, 0.5);
        assert_eq!(clock.max_delta(), 0.5);

        clock.set_clamps(f32::NAN, f32::NAN);
        source.advance(Duration::from_millis(30));
        approx::assert_relative_eq!(clock.tick().dt, 0.03, epsilon = 1e-6);
    }

    #[test]
    fn frame_index_increments_and_reset_rebases() {
        let (source, mut clock) = clock(0.0, 10.0);
        assert_eq!(clock.tick().frame_index, 0);
        source.advance(Duration::from_secs(3));
        clock.reset();
        let ft = clock.tick();
        assert_eq!(ft.frame_index, 1);
        assert_eq!(ft.raw_dt, 0.0);
    }
}
