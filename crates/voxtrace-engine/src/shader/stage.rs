use std::fmt;
use std::path::{Path, PathBuf};

use super::error::ShaderError;
use super::source::ShaderSource;

/// Pipeline role of a compiled stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
            ShaderStage::Compute => naga::ShaderStage::Compute,
        }
    }

    pub fn is_graphics(self) -> bool {
        !matches!(self, ShaderStage::Compute)
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// One stage that parsed and validated.
///
/// Holds the IR used for linking and the composed text later handed to the
/// device. A stage that failed to compile never exists.
#[derive(Debug)]
pub struct CompiledStage {
    pub(crate) path: PathBuf,
    pub(crate) stage: ShaderStage,
    pub(crate) text: String,
    pub(crate) module: naga::Module,
    pub(crate) info: naga::valid::ModuleInfo,
}

impl CompiledStage {
    /// Parses and validates composed WGSL as `stage`.
    ///
    /// Diagnostics are the front end's rendered report, labelled with the
    /// resource path.
    pub fn compile(source: ShaderSource, stage: ShaderStage) -> Result<Self, ShaderError> {
        let ShaderSource { path, text } = source;
        let label = path.display().to_string();

        let module = naga::front::wgsl::parse_str(&text).map_err(|e| ShaderError::Compile {
            diagnostic: e.emit_to_string_with_path(&text, &label),
            path: path.clone(),
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| ShaderError::Compile {
                diagnostic: e.emit_to_string_with_path(&text, &label),
                path: path.clone(),
            })?;

        log::debug!("compiled {stage} stage {label}");

        Ok(Self {
            path,
            stage,
            text,
            module,
            info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Composed text exactly as it was compiled.
    pub fn text(&self) -> &str {
        &self.text
    }
}
