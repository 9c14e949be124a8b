use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time provider used by frame clocks.
pub trait TimeSource: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall-clock source backed by `Instant::now`.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced source for deterministic frame deltas.
///
/// Clones share the same underlying instant, so a test can keep one handle and
/// hand another to a `FrameClock`.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<Instant>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_secs(&self, secs: f32) {
        self.advance(Duration::from_secs_f32(secs));
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_instant() {
        let a = ManualTimeSource::new();
        let b = a.clone();
        let start = b.now();
        a.advance(Duration::from_millis(40));
        assert_eq!(b.now() - start, Duration::from_millis(40));
    }
}
