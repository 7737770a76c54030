//! GPU device and surface bring-up.
//!
//! [`Gpu`] owns the wgpu adapter, device, queue and the window surface.
//! Surface formats, present modes and resize handling live in `surface`.

mod context;
mod error;
mod init;
mod surface;

pub use context::{Gpu, GpuFrame};
pub use error::{DeviceError, SurfaceErrorAction};
pub use init::GpuInit;
