use std::path::PathBuf;

use clap::Parser;

/// Command line of the `voxtrace` binary.
#[derive(Parser, Debug)]
#[command(name = "voxtrace")]
#[command(about = "Progressive path tracer for MagicaVoxel models", long_about = None)]
#[command(version)]
pub struct Cli {
    /// MagicaVoxel model to render; a procedural demo scene when omitted
    #[arg(value_name = "MODEL.vox")]
    pub model: Option<PathBuf>,

    /// Present frames as fast as they are traced instead of at display rate
    #[arg(long)]
    pub no_vsync: bool,
}

/// Startup configuration for the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub title: String,
    /// Window and accumulation target size in physical pixels.
    pub size: (u32, u32),
    pub vsync: bool,
    /// `.vox` model to load; the procedural demo scene when absent.
    pub model: Option<PathBuf>,
    pub ray_bounces: i32,
    pub max_traversal_depth: i32,
    pub accumulate: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "voxtrace".to_string(),
            size: (1920, 1010),
            vsync: true,
            model: None,
            ray_bounces: 3,
            max_traversal_depth: 300,
            accumulate: true,
        }
    }
}

impl From<Cli> for ViewerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            vsync: !cli.no_vsync,
            model: cli.model,
            ..Self::default()
        }
    }
}
