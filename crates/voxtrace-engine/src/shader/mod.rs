//! Shader programs.
//!
//! Resources are composed (include directives inlined), compiled per stage,
//! linked into one program and finally uploaded as a wgpu pipeline:
//! - `source`: loaders and include composition
//! - `stage`: per-stage parse + validation
//! - `link`: cross-stage checks and the binding table
//! - `program`: builder and the device-side program

mod error;
mod link;
mod program;
mod source;
mod stage;

pub use error::ShaderError;
pub use link::{
    link, BindingInfo, BindingSlot, BindingTable, LinkedProgram, LinkedStage, ProgramKind,
    ResourceKind,
};
pub use program::{ProgramBuilder, RasterTargets, ShaderProgram};
pub use source::{compose, FileLoader, MemoryLoader, ShaderSource, SourceLoader, INCLUDE_MARKER};
pub use stage::{CompiledStage, ShaderStage};
