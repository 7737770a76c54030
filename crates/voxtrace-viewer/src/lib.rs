//! Interactive progressive voxel path tracer.
//!
//! The viewer is an [`voxtrace_engine::core::App`]: [`session`] decides per
//! frame whether samples accumulate, [`tracer`] records the GPU work and
//! [`camera`] turns pointer drags into an orbit around the volume.

pub mod app;
pub mod camera;
pub mod config;
pub mod session;
pub mod settings_panel;
pub mod tracer;
pub mod volume;

pub use app::Viewer;
pub use config::ViewerConfig;
