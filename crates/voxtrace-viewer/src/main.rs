use anyhow::Result;
use clap::Parser;
use winit::dpi::PhysicalSize;

use voxtrace_engine::device::GpuInit;
use voxtrace_engine::logging::{init_logging, LoggingConfig};
use voxtrace_engine::window::{Runtime, RuntimeConfig};
use voxtrace_viewer::config::Cli;
use voxtrace_viewer::{Viewer, ViewerConfig};

fn main() {
    let cli = Cli::parse();
    init_logging(LoggingConfig::default());

    if let Err(e) = run(ViewerConfig::from(cli)) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(config: ViewerConfig) -> Result<()> {
    log::info!("starting {} (vsync {})", config.title, config.vsync);

    let runtime = RuntimeConfig {
        title: config.title.clone(),
        initial_size: PhysicalSize::new(config.size.0, config.size.1),
        resizable: false,
    };
    let gpu_init = GpuInit::default().with_vsync(config.vsync);

    Runtime::run(runtime, gpu_init, Viewer::new(config))
}
