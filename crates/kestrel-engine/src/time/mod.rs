//! Frame timing.
//!
//! - one `FrameClock` per window loop; `tick()` once per frame
//! - `TimeSource` decouples the clock from `Instant::now` for tests

mod fps;
mod frame_clock;
mod source;

pub use fps::FpsCounter;
pub use frame_clock::{FrameClock, FrameTime};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};
