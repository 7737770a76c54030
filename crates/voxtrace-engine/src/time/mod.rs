//! Time subsystem.
//!
//! - one `FrameClock` per render loop; call `tick()` once per presented frame
//! - `FrameStats` turns frame times into periodic ms/frame + fps reports

mod frame_clock;
mod stats;

pub use frame_clock::{FrameClock, FrameTime};
pub use stats::{FrameReport, FrameStats};
