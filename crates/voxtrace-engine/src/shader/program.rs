use std::path::{Path, PathBuf};

use super::error::ShaderError;
use super::link::{self, BindingSlot, LinkedProgram, LinkedStage, ProgramKind};
use super::source::{compose, SourceLoader};
use super::stage::{CompiledStage, ShaderStage};

/// Collects stage paths and produces a linked program.
///
/// Every call to [`ProgramBuilder::link`] reads, composes and compiles all
/// stages again, so a failed build followed by a fixed resource simply works
/// on the next attempt.
pub struct ProgramBuilder<'a, L: SourceLoader + ?Sized> {
    loader: &'a L,
    stages: Vec<(PathBuf, ShaderStage)>,
}

impl<'a, L: SourceLoader + ?Sized> ProgramBuilder<'a, L> {
    pub fn new(loader: &'a L) -> Self {
        Self {
            loader,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, path: impl AsRef<Path>, stage: ShaderStage) -> Self {
        self.stages.push((path.as_ref().to_path_buf(), stage));
        self
    }

    pub fn vertex(self, path: impl AsRef<Path>) -> Self {
        self.stage(path, ShaderStage::Vertex)
    }

    pub fn fragment(self, path: impl AsRef<Path>) -> Self {
        self.stage(path, ShaderStage::Fragment)
    }

    pub fn compute(self, path: impl AsRef<Path>) -> Self {
        self.stage(path, ShaderStage::Compute)
    }

    /// Composes and compiles each stage in order, then links.
    ///
    /// Stops at the first failing stage; earlier stages are dropped.
    pub fn link(&self) -> Result<LinkedProgram, ShaderError> {
        let mut compiled = Vec::with_capacity(self.stages.len());
        for (path, stage) in &self.stages {
            let source = compose(self.loader, path)?;
            compiled.push(CompiledStage::compile(source, *stage)?);
        }

        let program = link::link(compiled)?;
        log::debug!(
            "linked program [{}] with {} bindings",
            program
                .stages()
                .iter()
                .map(|s| s.path.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            program.bindings().len()
        );
        Ok(program)
    }
}

/// Render target description needed to build a graphics pipeline.
pub struct RasterTargets<'a> {
    pub color_format: wgpu::TextureFormat,
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub blend: Option<wgpu::BlendState>,
}

enum Pipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

/// A linked program uploaded to the device.
///
/// The pipeline layout is derived from the shaders, so bind group layouts are
/// obtained by group index and only cover resources the stages actually use.
pub struct ShaderProgram {
    label: String,
    linked: LinkedProgram,
    pipeline: Pipeline,
}

impl ShaderProgram {
    /// Creates a compute pipeline from a linked compute program.
    pub fn compute(
        device: &wgpu::Device,
        linked: LinkedProgram,
    ) -> Result<Self, ShaderError> {
        let stage = required_stage(&linked, ShaderStage::Compute)?;
        let label = stage.path.display().to_string();

        let pipeline = capture_validation(device, || {
            let module = create_module(device, stage);
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: None,
                module: &module,
                entry_point: Some(&stage.entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        Ok(Self {
            label,
            linked,
            pipeline: Pipeline::Compute(pipeline),
        })
    }

    /// Creates a render pipeline from a linked vertex + fragment program.
    pub fn raster(
        device: &wgpu::Device,
        linked: LinkedProgram,
        targets: &RasterTargets<'_>,
    ) -> Result<Self, ShaderError> {
        let vs = required_stage(&linked, ShaderStage::Vertex)?;
        let fs = required_stage(&linked, ShaderStage::Fragment)?;
        let label = format!("{} + {}", vs.path.display(), fs.path.display());

        let pipeline = capture_validation(device, || {
            let vs_module = create_module(device, vs);
            let fs_module = create_module(device, fs);

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&label),
                layout: None,

                vertex: wgpu::VertexState {
                    module: &vs_module,
                    entry_point: Some(&vs.entry_point),
                    compilation_options: Default::default(),
                    buffers: targets.vertex_buffers,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &fs_module,
                    entry_point: Some(&fs.entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: targets.color_format,
                        blend: targets.blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })?;

        Ok(Self {
            label,
            linked,
            pipeline: Pipeline::Render(pipeline),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Looks up a resource by name in the table resolved at link time.
    pub fn slot(&self, name: &str) -> Result<BindingSlot, ShaderError> {
        self.linked.bindings().slot(name)
    }

    pub fn bind_group_layout(&self, group: u32) -> wgpu::BindGroupLayout {
        match &self.pipeline {
            Pipeline::Compute(p) => p.get_bind_group_layout(group),
            Pipeline::Render(p) => p.get_bind_group_layout(group),
        }
    }

    /// Builds a bind group for `group` from `(name, resource)` pairs.
    ///
    /// Names are resolved through the binding table, so a renamed or unused
    /// resource is reported instead of silently binding the wrong slot.
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        group: u32,
        resources: &[(&str, wgpu::BindingResource<'_>)],
    ) -> Result<wgpu::BindGroup, ShaderError> {
        let mut entries = Vec::with_capacity(resources.len());
        for (name, resource) in resources {
            let slot = self.slot(name)?;
            if slot.group != group {
                return Err(ShaderError::MissingBinding {
                    name: format!("{name} (in group {group})"),
                });
            }
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: resource.clone(),
            });
        }

        let layout = self.bind_group_layout(group);
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &layout,
            entries: &entries,
        }))
    }

    /// Workgroup size of the compute entry point; `[1, 1, 1]` for graphics programs.
    pub fn workgroup_size(&self) -> [u32; 3] {
        self.linked
            .stage(ShaderStage::Compute)
            .map_or([1, 1, 1], |s| s.workgroup_size)
    }

    pub fn compute_pipeline(&self) -> Option<&wgpu::ComputePipeline> {
        match &self.pipeline {
            Pipeline::Compute(p) => Some(p),
            Pipeline::Render(_) => None,
        }
    }

    pub fn render_pipeline(&self) -> Option<&wgpu::RenderPipeline> {
        match &self.pipeline {
            Pipeline::Render(p) => Some(p),
            Pipeline::Compute(_) => None,
        }
    }
}

fn required_stage(
    linked: &LinkedProgram,
    stage: ShaderStage,
) -> Result<&LinkedStage, ShaderError> {
    linked.stage(stage).ok_or_else(|| ShaderError::Link {
        diagnostic: format!(
            "a {} program has no {stage} stage",
            match linked.kind() {
                ProgramKind::Compute => "compute",
                ProgramKind::Graphics => "graphics",
            }
        ),
    })
}

/// Runs `create` inside a validation error scope.
///
/// Pipeline creation reports layout and limit violations naga cannot see
/// through the device; without a scope they reach the uncaptured handler.
fn capture_validation<T>(
    device: &wgpu::Device,
    create: impl FnOnce() -> T,
) -> Result<T, ShaderError> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(scope.pop()) {
        Some(err) => Err(ShaderError::Link {
            diagnostic: err.to_string(),
        }),
        None => Ok(value),
    }
}

fn create_module(device: &wgpu::Device, stage: &LinkedStage) -> wgpu::ShaderModule {
    let label = stage.path.display().to_string();
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(stage.text.as_str().into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::source::MemoryLoader;

    const PARAMS: &str = "struct Params {\n    scale: f32,\n    count: u32,\n}\n";

    const GOOD: &str = r#"#include "params.wgsl"
@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> data: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < params.count) {
        data[id.x] = data[id.x] * params.scale;
    }
}
"#;

    #[test]
    fn builder_composes_compiles_and_links() {
        let loader = MemoryLoader::new()
            .with("k/params.wgsl", PARAMS)
            .with("k/scale.wgsl", GOOD);

        let program = ProgramBuilder::new(&loader).compute("k/scale.wgsl").link().unwrap();

        assert_eq!(program.kind(), ProgramKind::Compute);
        assert_eq!(
            program.bindings().slot("data").unwrap(),
            BindingSlot {
                group: 0,
                binding: 1
            }
        );
        program.require_members("params", &["scale", "count"]).unwrap();
    }

    #[test]
    fn failed_build_then_fixed_resource_links() {
        let broken = GOOD.replace("params.count", "params.count +");
        let mut loader = MemoryLoader::new();
        loader.insert("params.wgsl", PARAMS).insert("scale.wgsl", broken);

        let err = ProgramBuilder::new(&loader).compute("scale.wgsl").link().unwrap_err();
        match err {
            ShaderError::Compile { path, .. } => assert_eq!(path, PathBuf::from("scale.wgsl")),
            other => panic!("unexpected error: {other:?}"),
        }

        loader.insert("scale.wgsl", GOOD);
        let program = ProgramBuilder::new(&loader).compute("scale.wgsl").link().unwrap();
        assert_eq!(program.stage(ShaderStage::Compute).unwrap().workgroup_size, [64, 1, 1]);
    }

    #[test]
    fn first_failing_stage_is_reported() {
        let loader = MemoryLoader::new().with(
            "a.frag",
            "@fragment fn fs() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }\n",
        );

        let err = ProgramBuilder::new(&loader)
            .vertex("missing.vert")
            .fragment("a.frag")
            .link()
            .unwrap_err();
        assert!(matches!(
            err,
            ShaderError::ResourceNotFound { path } if path == PathBuf::from("missing.vert")
        ));
    }

    fn headless_device() -> Option<wgpu::Device> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .ok()?;
        let (device, _queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some(device)
    }

    #[test]
    fn pipeline_validation_errors_are_link_errors() {
        let Some(device) = headless_device() else {
            return;
        };

        let loader = MemoryLoader::new()
            .with(
                "two.vert",
                "struct VsOut { @builtin(position) pos: vec4<f32>, @location(0) uv: vec2<f32>, }\n\
                 @vertex fn vs(@location(0) p: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {\n\
                 \x20   return VsOut(vec4<f32>(p, 0.0, 1.0), uv);\n}\n",
            )
            .with(
                "two.frag",
                "@fragment fn fs(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {\n\
                 \x20   return vec4<f32>(uv, 0.0, 1.0);\n}\n",
            );
        let linked = ProgramBuilder::new(&loader)
            .vertex("two.vert")
            .fragment("two.frag")
            .link()
            .unwrap();

        // Only location 0 is fed; the vertex stage also reads location 1.
        let attrs = wgpu::vertex_attr_array![0 => Float32x2];
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: 8,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attrs,
        }];
        let targets = RasterTargets {
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            vertex_buffers: &buffers,
            blend: None,
        };

        let result = ShaderProgram::raster(&device, linked, &targets);
        assert!(matches!(result, Err(ShaderError::Link { .. })));
    }

    #[test]
    fn empty_builder_fails_to_link() {
        let loader = MemoryLoader::new();
        assert!(matches!(
            ProgramBuilder::new(&loader).link(),
            Err(ShaderError::Link { .. })
        ));
    }
}
