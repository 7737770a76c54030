//! GPU side of the progressive renderer.
//!
//! A compute program traces one sample per pixel into an accumulation buffer,
//! then a full-viewport quad displays that buffer. Both passes are recorded
//! into the frame encoder; wgpu orders the storage write before the read.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::UVec3;
use wgpu::util::DeviceExt;

use voxtrace_engine::render::{RenderCtx, RenderTarget};
use voxtrace_engine::shader::{MemoryLoader, ProgramBuilder, RasterTargets, ShaderProgram};

use crate::camera::Camera;
use crate::session::{FrameDecision, RenderState};
use crate::volume::VoxelVolume;

pub const TRACE_SHADER: &str = "voxel.comp.wgsl";
pub const QUAD_VERTEX_SHADER: &str = "quad.vert.wgsl";
pub const QUAD_FRAGMENT_SHADER: &str = "quad.frag.wgsl";

/// Resources bundled into the binary, keyed by their path below `shaders/`.
pub fn shader_loader() -> MemoryLoader {
    MemoryLoader::new()
        .with(TRACE_SHADER, include_str!("../shaders/voxel.comp.wgsl"))
        .with(QUAD_VERTEX_SHADER, include_str!("../shaders/quad.vert.wgsl"))
        .with(QUAD_FRAGMENT_SHADER, include_str!("../shaders/quad.frag.wgsl"))
        .with("common/params.wgsl", include_str!("../shaders/common/params.wgsl"))
        .with("common/random.wgsl", include_str!("../shaders/common/random.wgsl"))
        .with("common/dda.wgsl", include_str!("../shaders/common/dda.wgsl"))
        .with("common/quad_io.wgsl", include_str!("../shaders/common/quad_io.wgsl"))
}

/// Uniform block read by the trace program (240 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct TraceParams {
    pub inv_view: [[f32; 4]; 4],
    pub inv_centered_view: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub map_size: [u32; 3],
    pub frame_count: u32,
    pub resolution: [u32; 2],
    pub num_samples: u32,
    pub num_ray_bounces: i32,
    pub max_dda_depth: i32,
    pub _pad: [u32; 3],
}

impl TraceParams {
    pub fn new(
        decision: &FrameDecision,
        state: &RenderState,
        camera: &Camera,
        map_size: UVec3,
        resolution: (u32, u32),
    ) -> Self {
        Self {
            inv_view: camera.inv_view().to_cols_array_2d(),
            inv_centered_view: camera.inv_centered_view().to_cols_array_2d(),
            inv_projection: camera.inv_projection().to_cols_array_2d(),
            map_size: map_size.to_array(),
            frame_count: decision.frame_counter,
            resolution: [resolution.0, resolution.1],
            num_samples: decision.sample_count,
            num_ray_bounces: state.ray_bounces,
            max_dda_depth: state.max_traversal_depth,
            _pad: [0; 3],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct DisplayParams {
    pub resolution: [u32; 2],
    pub _pad: [u32; 2], // 16-byte alignment
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadPosition {
    pos: [f32; 3],
}

impl QuadPosition {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadPosition>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadUv {
    uv: [f32; 2],
}

impl QuadUv {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadUv>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

// Two triangles covering clip space; uv origin is the top-left pixel.
const QUAD_POSITIONS: [QuadPosition; 6] = [
    QuadPosition { pos: [-1.0, 1.0, 0.0] },
    QuadPosition { pos: [-1.0, -1.0, 0.0] },
    QuadPosition { pos: [1.0, -1.0, 0.0] },
    QuadPosition { pos: [-1.0, 1.0, 0.0] },
    QuadPosition { pos: [1.0, -1.0, 0.0] },
    QuadPosition { pos: [1.0, 1.0, 0.0] },
];

const QUAD_UVS: [QuadUv; 6] = [
    QuadUv { uv: [0.0, 0.0] },
    QuadUv { uv: [0.0, 1.0] },
    QuadUv { uv: [1.0, 1.0] },
    QuadUv { uv: [0.0, 0.0] },
    QuadUv { uv: [1.0, 1.0] },
    QuadUv { uv: [1.0, 0.0] },
];

const ACCUMULATION_TEXEL: u64 = 16; // vec4<f32>

/// Pipelines, buffers and bind groups for the voxel tracer.
///
/// Everything is sized once at creation; the accumulation buffer covers
/// `resolution` and is never reallocated.
pub struct Tracer {
    trace_pipeline: wgpu::ComputePipeline,
    display_pipeline: wgpu::RenderPipeline,
    workgroup: (u32, u32),

    quad_positions: wgpu::Buffer,
    quad_uvs: wgpu::Buffer,
    trace_ubo: wgpu::Buffer,

    trace_bind_group: wgpu::BindGroup,
    display_bind_group: wgpu::BindGroup,

    map_size: UVec3,
    resolution: (u32, u32),
}

impl Tracer {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        volume: &VoxelVolume,
        resolution: (u32, u32),
    ) -> Result<Self> {
        let resolution = (resolution.0.max(1), resolution.1.max(1));
        let loader = shader_loader();

        let trace = build_trace_program(device, &loader)?;
        let display = build_display_program(device, &loader, surface_format)?;
        log::info!("built programs [{}] and [{}]", trace.label(), display.label());

        let trace_pipeline = trace
            .compute_pipeline()
            .cloned()
            .context("trace program has no compute pipeline")?;
        let display_pipeline = display
            .render_pipeline()
            .cloned()
            .context("display program has no render pipeline")?;
        let [wx, wy, _] = trace.workgroup_size();

        let quad_positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxtrace quad positions"),
            contents: bytemuck::cast_slice(&QUAD_POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_uvs = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxtrace quad uvs"),
            contents: bytemuck::cast_slice(&QUAD_UVS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let accumulation = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("voxtrace accumulation"),
            size: u64::from(resolution.0) * u64::from(resolution.1) * ACCUMULATION_TEXEL,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let voxel_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxtrace voxel indices"),
            contents: bytemuck::cast_slice(&volume.packed_indices()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let palette = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxtrace palette"),
            contents: bytemuck::cast_slice(volume.palette()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let trace_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("voxtrace trace params"),
            size: std::mem::size_of::<TraceParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Resolution is fixed, so the display uniform never changes.
        let display_ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("voxtrace display params"),
            contents: bytemuck::bytes_of(&DisplayParams {
                resolution: [resolution.0, resolution.1],
                _pad: [0; 2],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let trace_bind_group = trace
            .bind_group(
                device,
                0,
                &[
                    ("params", trace_ubo.as_entire_binding()),
                    ("accumulation", accumulation.as_entire_binding()),
                    ("voxel_indices", voxel_indices.as_entire_binding()),
                    ("palette", palette.as_entire_binding()),
                ],
            )
            .context("failed to bind trace resources")?;

        let display_bind_group = display
            .bind_group(
                device,
                0,
                &[
                    ("display", display_ubo.as_entire_binding()),
                    ("accumulation", accumulation.as_entire_binding()),
                ],
            )
            .context("failed to bind display resources")?;

        Ok(Self {
            trace_pipeline,
            display_pipeline,
            workgroup: (wx, wy),
            quad_positions,
            quad_uvs,
            trace_ubo,
            trace_bind_group,
            display_bind_group,
            map_size: volume.size(),
            resolution,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Workgroups covering the accumulation target.
    pub fn dispatch_size(&self) -> (u32, u32) {
        dispatch_size(self.resolution, self.workgroup)
    }

    /// Records one progressive sample followed by the display pass.
    pub fn render(
        &self,
        ctx: &RenderCtx<'_>,
        target: &mut RenderTarget<'_>,
        decision: &FrameDecision,
        state: &RenderState,
        camera: &Camera,
    ) {
        let params = TraceParams::new(decision, state, camera, self.map_size, self.resolution);
        ctx.queue
            .write_buffer(&self.trace_ubo, 0, bytemuck::bytes_of(&params));

        {
            let mut cpass = target
                .encoder
                .begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("voxtrace trace pass"),
                    timestamp_writes: None,
                });
            cpass.set_pipeline(&self.trace_pipeline);
            cpass.set_bind_group(0, &self.trace_bind_group, &[]);
            let (gx, gy) = self.dispatch_size();
            cpass.dispatch_workgroups(gx, gy, 1);
        }

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("voxtrace display pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.display_pipeline);
        rpass.set_bind_group(0, &self.display_bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_positions.slice(..));
        rpass.set_vertex_buffer(1, self.quad_uvs.slice(..));
        rpass.draw(0..QUAD_POSITIONS.len() as u32, 0..1);
    }
}

fn build_trace_program(device: &wgpu::Device, loader: &MemoryLoader) -> Result<ShaderProgram> {
    let linked = ProgramBuilder::new(loader)
        .compute(TRACE_SHADER)
        .link()
        .context("failed to build the trace program")?;

    linked.require(&["params", "accumulation", "voxel_indices", "palette"])?;
    linked.require_members(
        "params",
        &[
            "inv_view",
            "inv_centered_view",
            "inv_projection",
            "map_size",
            "frame_count",
            "num_samples",
            "num_ray_bounces",
            "max_dda_depth",
        ],
    )?;

    Ok(ShaderProgram::compute(device, linked)?)
}

fn build_display_program(
    device: &wgpu::Device,
    loader: &MemoryLoader,
    surface_format: wgpu::TextureFormat,
) -> Result<ShaderProgram> {
    let linked = ProgramBuilder::new(loader)
        .vertex(QUAD_VERTEX_SHADER)
        .fragment(QUAD_FRAGMENT_SHADER)
        .link()
        .context("failed to build the display program")?;

    linked.require(&["display", "accumulation"])?;

    let buffers = [QuadPosition::layout(), QuadUv::layout()];
    Ok(ShaderProgram::raster(
        device,
        linked,
        &RasterTargets {
            color_format: surface_format,
            vertex_buffers: &buffers,
            blend: None,
        },
    )?)
}

/// `ceil(w / wx) × ceil(h / wy)`; the shader discards the overhang.
pub fn dispatch_size(resolution: (u32, u32), workgroup: (u32, u32)) -> (u32, u32) {
    (
        resolution.0.div_ceil(workgroup.0.max(1)),
        resolution.1.div_ceil(workgroup.1.max(1)),
    )
}
