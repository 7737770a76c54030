//! Per-frame progressive sampling decisions.
//!
//! The session owns interaction state (is the primary button held, where was
//! the pointer last sampled) and the render state fed to the tracer. It holds
//! no GPU objects, so the whole accumulate/reset state machine is testable
//! on its own.

use crate::camera::Camera;

/// Per-run render parameters, mutated every frame and by the settings panel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RenderState {
    /// Monotonic frame index, wraps at `u32::MAX`. Seeds GPU-side randomness.
    pub frame_counter: u32,
    /// Samples the next dispatch accounts for, including its own.
    pub sample_count: u32,
    pub ray_bounces: i32,
    pub max_traversal_depth: i32,
}

impl RenderState {
    pub fn new(ray_bounces: i32, max_traversal_depth: i32) -> Self {
        Self {
            frame_counter: 0,
            sample_count: 1,
            ray_bounces,
            max_traversal_depth,
        }
    }
}

/// User-facing toggles that are not part of [`RenderState`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Settings {
    /// Blend successive samples; when off every frame starts over.
    pub accumulate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { accumulate: true }
    }
}

/// What the tracer needs to know about the frame being rendered.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameDecision {
    pub frame_counter: u32,
    pub sample_count: u32,
    /// The camera rotated this frame.
    pub camera_moved: bool,
    /// Accumulated samples were discarded this frame.
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    dragging: bool,
    last_pointer: (f32, f32),
    render: RenderState,
    settings: Settings,
}

impl Session {
    pub fn new(render: RenderState, settings: Settings) -> Self {
        Self {
            dragging: false,
            last_pointer: (0.0, 0.0),
            render,
            settings,
        }
    }

    /// Starts a drag; later deltas are measured from `pos`.
    pub fn pointer_pressed(&mut self, pos: (f32, f32)) {
        self.dragging = true;
        self.last_pointer = pos;
    }

    pub fn pointer_released(&mut self) {
        self.dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Advances the frame counter and decides between accumulating and resetting.
    ///
    /// While dragging, the delta from the last sampled pointer position
    /// (`last - current`) rotates the camera. Any nonzero delta resets the
    /// accumulation, even when the camera refused to move at the pole.
    pub fn begin_frame(
        &mut self,
        pointer: Option<(f32, f32)>,
        camera: &mut Camera,
        viewport: (u32, u32),
    ) -> FrameDecision {
        self.render.frame_counter = self.render.frame_counter.wrapping_add(1);

        let mut reset = false;
        let mut camera_moved = false;

        if let (true, Some(current)) = (self.dragging, pointer) {
            let dx = self.last_pointer.0 - current.0;
            let dy = self.last_pointer.1 - current.1;

            if dx != 0.0 || dy != 0.0 {
                camera_moved = camera.rotate(dx, dy, viewport.0, viewport.1);
                self.last_pointer = current;
                reset = true;
            }
        }

        if !self.settings.accumulate {
            reset = true;
        }

        if reset {
            self.render.sample_count = 1;
        }

        FrameDecision {
            frame_counter: self.render.frame_counter,
            sample_count: self.render.sample_count,
            camera_moved,
            reset,
        }
    }

    /// Counts the sample dispatched this frame.
    pub fn end_frame(&mut self) {
        self.render.sample_count = self.render.sample_count.saturating_add(1);
    }

    /// Samples blended into the accumulation target so far.
    pub fn accumulated_samples(&self) -> u32 {
        self.render.sample_count.saturating_sub(1)
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render
    }

    pub fn render_state_mut(&mut self) -> &mut RenderState {
        &mut self.render
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
