use anyhow::{Context, Result};

use voxtrace_engine::core::{App, AppControl, FrameCtx};
use voxtrace_engine::device::Gpu;
use voxtrace_engine::input::{InputEvent, InputFrame, MouseButton, MouseButtonState};

use crate::camera::Camera;
use crate::config::ViewerConfig;
use crate::session::{RenderState, Session, Settings};
use crate::settings_panel::{PanelAction, SettingsPanel};
use crate::tracer::Tracer;
use crate::volume::VoxelVolume;

/// GPU-backed state that exists once the window is up.
struct Scene {
    camera: Camera,
    tracer: Tracer,
}

/// The viewer application: orbit camera, progressive tracer and settings.
pub struct Viewer {
    config: ViewerConfig,
    session: Session,
    panel: SettingsPanel,
    scene: Option<Scene>,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        let session = Session::new(
            RenderState::new(config.ray_bounces, config.max_traversal_depth),
            Settings {
                accumulate: config.accumulate,
            },
        );
        let panel = SettingsPanel::new(config.title.clone());

        Self {
            config,
            session,
            panel,
            scene: None,
        }
    }

    fn load_volume(&self) -> Result<VoxelVolume> {
        match &self.config.model {
            Some(path) => VoxelVolume::from_vox_file(path)
                .with_context(|| format!("failed to load model {}", path.display())),
            None => {
                log::info!("no model given, using the demo scene");
                Ok(VoxelVolume::demo())
            }
        }
    }

    /// Routes primary-button transitions to the session in arrival order.
    ///
    /// Focus loss ends a drag; the matching release goes to another window.
    fn apply_pointer(&mut self, frame: &InputFrame) {
        for ev in &frame.events {
            match ev {
                InputEvent::PointerButton(b) if b.button == MouseButton::Left => match b.state {
                    MouseButtonState::Pressed => self.session.pointer_pressed((b.x, b.y)),
                    MouseButtonState::Released => self.session.pointer_released(),
                },
                InputEvent::Focused(false) => self.session.pointer_released(),
                _ => {}
            }
        }
    }
}

impl App for Viewer {
    fn on_init(&mut self, gpu: &Gpu<'_>) -> Result<()> {
        let volume = self.load_volume()?;
        let size = volume.size();
        log::info!(
            "volume {}x{}x{}, {} solid voxels",
            size.x,
            size.y,
            size.z,
            volume.solid_count()
        );

        let surface = gpu.size();
        let camera = Camera::framing(size, surface.width, surface.height)
            .context("failed to place the camera")?;
        let tracer = Tracer::new(
            gpu.device(),
            gpu.surface_format(),
            &volume,
            (surface.width, surface.height),
        )?;

        self.scene = Some(Scene { camera, tracer });
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.panel.apply_keys(&ctx.input_frame.keys_pressed, &mut self.session)
            == PanelAction::Exit
        {
            ctx.runtime.exit();
            return AppControl::Continue;
        }
        self.apply_pointer(ctx.input_frame);

        let Some(scene) = self.scene.as_mut() else {
            return AppControl::Continue;
        };

        let decision =
            self.session
                .begin_frame(ctx.input.pointer_pos, &mut scene.camera, scene.tracer.resolution());

        let session = &self.session;
        let mut drawn = false;
        let control = ctx.render(|rctx, target| {
            scene
                .tracer
                .render(rctx, target, &decision, session.render_state(), &scene.camera);
            drawn = true;
        });

        // A skipped frame dispatched nothing, so it adds no sample.
        if drawn {
            self.session.end_frame();
        }

        if let Some(title) = self.panel.record_frame(ctx.time.elapsed, &self.session) {
            ctx.window.set_title(&title);
        }

        control
    }
}
