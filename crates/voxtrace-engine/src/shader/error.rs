use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while composing, compiling or linking shader programs.
///
/// All variants are configuration errors: nothing here is retried, and callers
/// are expected to surface the message and stop.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// A top-level or included resource could not be opened.
    #[error("shader resource not found: {}", path.display())]
    ResourceNotFound { path: PathBuf },

    /// A resource exists but could not be read.
    #[error("failed to read shader resource {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An include line without a quoted path.
    #[error("{}:{line}: malformed include directive", path.display())]
    MalformedInclude { path: PathBuf, line: usize },

    /// A resource includes itself, directly or through other resources.
    #[error("circular include: {}", format_chain(chain))]
    CircularInclude { chain: Vec<PathBuf> },

    /// The stage failed to compile. `diagnostic` is the compiler output verbatim.
    #[error("{}:\n{diagnostic}", path.display())]
    Compile { path: PathBuf, diagnostic: String },

    /// The compiled stages could not be linked into one program.
    #[error("program link failed:\n{diagnostic}")]
    Link { diagnostic: String },

    /// A resource name expected by the host is not used by the program.
    #[error("program has no resource named `{name}`")]
    MissingBinding { name: String },

    /// A member expected by the host is absent from a uniform block.
    #[error("resource `{binding}` has no member named `{member}`")]
    MissingMember { binding: String, member: String },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
