//! Renderer-facing frame types handed to application draw callbacks.

mod ctx;

pub use ctx::{RenderCtx, RenderTarget};
