//! voxtrace engine crate.
//!
//! Platform + GPU runtime pieces used by the viewer: device bring-up, the
//! window loop, input, frame timing, logging and shader programs.

pub mod core;
pub mod device;
pub mod input;
pub mod logging;
pub mod render;
pub mod shader;
pub mod time;
pub mod window;
