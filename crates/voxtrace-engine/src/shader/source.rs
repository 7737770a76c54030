use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::error::ShaderError;

/// Marker that starts an include line.
pub const INCLUDE_MARKER: &str = "#include";

/// Fully composed shader text plus the resource it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub path: PathBuf,
    pub text: String,
}

/// Read access to named shader resources.
///
/// Paths handed to the loader are already lexically normalized and relative to
/// whatever root the loader represents.
pub trait SourceLoader {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Loads resources from the filesystem, optionally below a root directory.
#[derive(Debug, Clone, Default)]
pub struct FileLoader {
    root: Option<PathBuf>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl SourceLoader for FileLoader {
    fn read(&self, path: &Path) -> io::Result<String> {
        match &self.root {
            Some(root) => std::fs::read_to_string(root.join(path)),
            None => std::fs::read_to_string(path),
        }
    }
}

/// In-memory resource table.
///
/// Used for shaders embedded with `include_str!` so the binary does not depend
/// on its working directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> &mut Self {
        self.files.insert(normalize(path.as_ref()), text.into());
        self
    }

    pub fn with(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no embedded resource {}", path.display()),
            )
        })
    }
}

/// Loads `path` and recursively inlines every include directive.
///
/// Includes are resolved relative to the directory of the including resource.
/// Each emitted line ends with exactly one `\n`, so CRLF input is normalized.
/// A resource that reappears on its own include path yields
/// [`ShaderError::CircularInclude`]; including the same file from two
/// different branches is fine.
pub fn compose<L>(loader: &L, path: impl AsRef<Path>) -> Result<ShaderSource, ShaderError>
where
    L: SourceLoader + ?Sized,
{
    let path = normalize(path.as_ref());
    let mut stack = Vec::new();
    let mut text = String::new();

    compose_into(loader, &path, &mut stack, &mut text)?;

    log::trace!("composed {} ({} bytes)", path.display(), text.len());
    Ok(ShaderSource { path, text })
}

fn compose_into<L>(
    loader: &L,
    path: &Path,
    stack: &mut Vec<PathBuf>,
    out: &mut String,
) -> Result<(), ShaderError>
where
    L: SourceLoader + ?Sized,
{
    if let Some(start) = stack.iter().position(|p| p == path) {
        let mut chain = stack[start..].to_vec();
        chain.push(path.to_path_buf());
        return Err(ShaderError::CircularInclude { chain });
    }

    let raw = loader.read(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ShaderError::ResourceNotFound {
            path: path.to_path_buf(),
        },
        _ => ShaderError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    stack.push(path.to_path_buf());
    let dir = path.parent().unwrap_or_else(|| Path::new(""));

    for (index, line) in raw.lines().enumerate() {
        match parse_include(line) {
            None => {
                out.push_str(line);
                out.push('\n');
            }
            Some(Some(target)) => {
                let child = normalize(&dir.join(target));
                compose_into(loader, &child, stack, out)?;
            }
            Some(None) => {
                return Err(ShaderError::MalformedInclude {
                    path: path.to_path_buf(),
                    line: index + 1,
                });
            }
        }
    }

    stack.pop();
    Ok(())
}

/// `None`: not an include line. `Some(None)`: include marker without a quoted path.
fn parse_include(line: &str) -> Option<Option<&str>> {
    let rest = line.trim().strip_prefix(INCLUDE_MARKER)?;

    // `#includes` or `#include_foo` are not include directives.
    if !rest.is_empty() && !rest.starts_with(|c: char| c.is_whitespace() || c == '"') {
        return None;
    }

    let quoted = rest.trim_start().strip_prefix('"');
    let target = quoted.and_then(|q| q.find('"').map(|end| &q[..end]));

    Some(target.filter(|t| !t.is_empty()))
}

/// Lexically resolves `.` and `..` so the same file always has one key.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
