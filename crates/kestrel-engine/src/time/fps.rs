/// Frames-per-second counter sampled over a fixed resolution window.
///
/// The reported value only changes once per `resolution` seconds.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    resolution: f32,
    elapsed: f32,
    frames: u32,
    fps: u32,
}

impl FpsCounter {
    pub fn new(resolution: f32) -> Self {
        Self {
            resolution: resolution.max(f32::EPSILON),
            elapsed: 0.0,
            frames: 0,
            fps: 0,
        }
    }

    #[inline]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: f32) {
        self.resolution = resolution.max(f32::EPSILON);
    }

    /// Records one frame. Uses the unclamped delta so stalls show up as low fps.
    pub fn frame(&mut self, dt: f32) {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed >= self.resolution {
            self.fps = (self.frames as f32 / self.elapsed).round() as u32;
            self.frames = 0;
            self.elapsed = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_after_each_window() {
        let mut c = FpsCounter::new(1.0);
        for _ in 0..7 {
            c.frame(0.125);
        }
        assert_eq!(c.fps(), 0);
        c.frame(0.125);
        assert_eq!(c.fps(), 8);
        c.frame(0.5);
        c.frame(0.5);
        assert_eq!(c.fps(), 2);
    }
}
