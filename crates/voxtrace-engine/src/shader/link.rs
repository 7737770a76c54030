//! Linking of compiled stages into one program description.
//!
//! wgpu has no separate link step, so the checks a GL linker would perform
//! happen here on the IR: stage combination, entry points, vertex/fragment
//! interface and resource bindings. What survives linking is only what the
//! device needs: composed text, entry point names and the binding table.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::error::ShaderError;
use super::stage::{CompiledStage, ShaderStage};

/// `(group, binding)` location of a resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

/// Address space of a bound resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceKind {
    Uniform,
    Storage { read_only: bool },
    /// Textures and samplers.
    Handle,
}

/// One named resource used by at least one stage.
#[derive(Debug, Clone)]
pub struct BindingInfo {
    pub name: String,
    pub slot: BindingSlot,
    pub kind: ResourceKind,
    pub stages: Vec<ShaderStage>,
    /// Member names when the resource is a struct, in declaration order.
    pub members: Vec<String>,
    signature: String,
}

/// Name → slot map, resolved once when the program links.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: BTreeMap<String, BindingInfo>,
}

impl BindingTable {
    pub fn get(&self, name: &str) -> Option<&BindingInfo> {
        self.entries.get(name)
    }

    pub fn slot(&self, name: &str) -> Result<BindingSlot, ShaderError> {
        self.get(name)
            .map(|b| b.slot)
            .ok_or_else(|| ShaderError::MissingBinding {
                name: name.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingInfo> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What remains of a stage after linking.
#[derive(Debug, Clone)]
pub struct LinkedStage {
    pub stage: ShaderStage,
    pub path: PathBuf,
    pub text: String,
    pub entry_point: String,
    pub workgroup_size: [u32; 3],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProgramKind {
    Compute,
    Graphics,
}

/// Stages that passed linking plus their shared binding table.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    stages: Vec<LinkedStage>,
    bindings: BindingTable,
}

impl LinkedProgram {
    pub fn kind(&self) -> ProgramKind {
        if self.stage(ShaderStage::Compute).is_some() {
            ProgramKind::Compute
        } else {
            ProgramKind::Graphics
        }
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&LinkedStage> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn stages(&self) -> &[LinkedStage] {
        &self.stages
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Fails on the first name the program does not use.
    pub fn require(&self, names: &[&str]) -> Result<(), ShaderError> {
        for name in names {
            self.bindings.slot(name)?;
        }
        Ok(())
    }

    /// Fails on the first member missing from the struct behind `binding`.
    pub fn require_members(&self, binding: &str, members: &[&str]) -> Result<(), ShaderError> {
        let info = self
            .bindings
            .get(binding)
            .ok_or_else(|| ShaderError::MissingBinding {
                name: binding.to_string(),
            })?;

        for member in members {
            if !info.members.iter().any(|m| m == member) {
                return Err(ShaderError::MissingMember {
                    binding: binding.to_string(),
                    member: member.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Links compiled stages. The stage objects are consumed either way.
pub fn link(stages: Vec<CompiledStage>) -> Result<LinkedProgram, ShaderError> {
    check_stage_set(&stages)?;

    let mut entry_indices = Vec::with_capacity(stages.len());
    for s in &stages {
        entry_indices.push(find_entry_point(s)?);
    }

    let vertex = stages
        .iter()
        .zip(&entry_indices)
        .find(|(s, _)| s.stage == ShaderStage::Vertex);
    let fragment = stages
        .iter()
        .zip(&entry_indices)
        .find(|(s, _)| s.stage == ShaderStage::Fragment);
    if let (Some((vs, vi)), Some((fs, fi))) = (vertex, fragment) {
        check_interface(vs, *vi, fs, *fi)?;
    }

    let mut bindings = BindingTable::default();
    for (s, &index) in stages.iter().zip(&entry_indices) {
        collect_bindings(s, index, &mut bindings)?;
    }

    let linked = stages
        .into_iter()
        .zip(entry_indices)
        .map(|(s, index)| {
            let ep = &s.module.entry_points[index];
            LinkedStage {
                stage: s.stage,
                entry_point: ep.name.clone(),
                workgroup_size: ep.workgroup_size,
                path: s.path,
                text: s.text,
            }
        })
        .collect();

    Ok(LinkedProgram {
        stages: linked,
        bindings,
    })
}

fn link_error(diagnostic: impl Into<String>) -> ShaderError {
    ShaderError::Link {
        diagnostic: diagnostic.into(),
    }
}

fn check_stage_set(stages: &[CompiledStage]) -> Result<(), ShaderError> {
    if stages.is_empty() {
        return Err(link_error("program has no stages"));
    }

    for (i, a) in stages.iter().enumerate() {
        if let Some(b) = stages[i + 1..].iter().find(|b| b.stage == a.stage) {
            return Err(link_error(format!(
                "duplicate {} stage: {} and {}",
                a.stage,
                a.path.display(),
                b.path.display()
            )));
        }
    }

    let has = |kind: ShaderStage| stages.iter().any(|s| s.stage == kind);

    if has(ShaderStage::Compute) && stages.iter().any(|s| s.stage.is_graphics()) {
        return Err(link_error(
            "compute stage cannot be linked with vertex or fragment stages",
        ));
    }
    if has(ShaderStage::Fragment) && !has(ShaderStage::Vertex) {
        return Err(link_error("fragment stage requires a vertex stage"));
    }
    Ok(())
}

fn find_entry_point(s: &CompiledStage) -> Result<usize, ShaderError> {
    let wanted = s.stage.to_naga();
    let mut found = s
        .module
        .entry_points
        .iter()
        .enumerate()
        .filter(|(_, ep)| ep.stage == wanted);

    match (found.next(), found.next()) {
        (Some((index, _)), None) => Ok(index),
        (None, _) => Err(link_error(format!(
            "{}: no {} entry point",
            s.path.display(),
            s.stage
        ))),
        (Some(_), Some(_)) => Err(link_error(format!(
            "{}: more than one {} entry point",
            s.path.display(),
            s.stage
        ))),
    }
}

fn check_interface(
    vs: &CompiledStage,
    vs_entry: usize,
    fs: &CompiledStage,
    fs_entry: usize,
) -> Result<(), ShaderError> {
    let mut outputs = BTreeMap::new();
    if let Some(result) = &vs.module.entry_points[vs_entry].function.result {
        io_locations(&vs.module, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut inputs = BTreeMap::new();
    for arg in &fs.module.entry_points[fs_entry].function.arguments {
        io_locations(&fs.module, arg.ty, arg.binding.as_ref(), &mut inputs);
    }

    let mut report = String::new();
    for (location, input) in &inputs {
        match outputs.get(location) {
            None => {
                let _ = writeln!(
                    report,
                    "{}: input @location({location}) is not written by {}",
                    fs.path.display(),
                    vs.path.display()
                );
            }
            Some(output) if output != input => {
                let _ = writeln!(
                    report,
                    "@location({location}): {} writes {} but {} reads {}",
                    vs.path.display(),
                    inner_name(output),
                    fs.path.display(),
                    inner_name(input)
                );
            }
            Some(_) => {}
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        Err(link_error(report.trim_end()))
    }
}

fn io_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut BTreeMap<u32, naga::TypeInner>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for m in members {
                    io_locations(module, m.ty, m.binding.as_ref(), out);
                }
            }
        }
    }
}

fn collect_bindings(
    s: &CompiledStage,
    entry: usize,
    table: &mut BindingTable,
) -> Result<(), ShaderError> {
    let uses = s.info.get_entry_point(entry);

    for (handle, var) in s.module.global_variables.iter() {
        let Some(rb) = &var.binding else { continue };
        if uses[handle].is_empty() {
            continue;
        }

        let name = var
            .name
            .clone()
            .unwrap_or_else(|| format!("group{}_binding{}", rb.group, rb.binding));
        let slot = BindingSlot {
            group: rb.group,
            binding: rb.binding,
        };
        let kind = match var.space {
            naga::AddressSpace::Uniform => ResourceKind::Uniform,
            naga::AddressSpace::Storage { access } => ResourceKind::Storage {
                read_only: !access.contains(naga::StorageAccess::STORE),
            },
            _ => ResourceKind::Handle,
        };
        let signature = type_signature(&s.module, var.ty);
        let members = match &s.module.types[var.ty].inner {
            naga::TypeInner::Struct { members, .. } => {
                members.iter().filter_map(|m| m.name.clone()).collect()
            }
            _ => Vec::new(),
        };

        if let Some(other) = table.iter().find(|b| b.slot == slot && b.name != name) {
            return Err(link_error(format!(
                "@group({}) @binding({}) is `{}` in one stage and `{}` in {}",
                slot.group,
                slot.binding,
                other.name,
                name,
                s.path.display()
            )));
        }

        match table.entries.get_mut(&name) {
            Some(existing) => {
                if existing.slot != slot
                    || existing.kind != kind
                    || existing.signature != signature
                {
                    return Err(link_error(format!(
                        "`{name}` is declared differently in {} than in an earlier stage",
                        s.path.display()
                    )));
                }
                existing.stages.push(s.stage);
            }
            None => {
                table.entries.insert(
                    name.clone(),
                    BindingInfo {
                        name,
                        slot,
                        kind,
                        stages: vec![s.stage],
                        members,
                        signature,
                    },
                );
            }
        }
    }
    Ok(())
}

fn type_signature(module: &naga::Module, ty: naga::Handle<naga::Type>) -> String {
    match &module.types[ty].inner {
        naga::TypeInner::Struct { members, .. } => {
            let fields: Vec<String> = members
                .iter()
                .map(|m| {
                    format!(
                        "{}: {}",
                        m.name.as_deref().unwrap_or("_"),
                        type_signature(module, m.ty)
                    )
                })
                .collect();
            format!("struct {{ {} }}", fields.join(", "))
        }
        naga::TypeInner::Array { base, size, .. } => {
            let size = match size {
                naga::ArraySize::Constant(n) => n.to_string(),
                _ => "runtime".to_string(),
            };
            format!("array<{}, {size}>", type_signature(module, *base))
        }
        other => inner_name(other),
    }
}

fn inner_name(inner: &naga::TypeInner) -> String {
    match inner {
        naga::TypeInner::Scalar(s) => scalar_name(*s),
        naga::TypeInner::Vector { size, scalar } => {
            format!("vec{}<{}>", *size as u8, scalar_name(*scalar))
        }
        naga::TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!(
            "mat{}x{}<{}>",
            *columns as u8,
            *rows as u8,
            scalar_name(*scalar)
        ),
        other => format!("{other:?}"),
    }
}

fn scalar_name(s: naga::Scalar) -> String {
    match (s.kind, s.width) {
        (naga::ScalarKind::Float, 4) => "f32".to_string(),
        (naga::ScalarKind::Float, 2) => "f16".to_string(),
        (naga::ScalarKind::Sint, 4) => "i32".to_string(),
        (naga::ScalarKind::Uint, 4) => "u32".to_string(),
        (naga::ScalarKind::Bool, _) => "bool".to_string(),
        (kind, width) => format!("{kind:?}{}", u32::from(width) * 8),
    }
}

impl LinkedStage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::source::ShaderSource;

    fn stage(path: &str, stage: ShaderStage, text: &str) -> CompiledStage {
        CompiledStage::compile(
            ShaderSource {
                path: PathBuf::from(path),
                text: text.to_string(),
            },
            stage,
        )
        .unwrap()
    }

    const VS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) p: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(p, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FS: &str = r#"
struct Params {
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0) * params.tint;
}
"#;

    const CS: &str = r#"
struct Params {
    scale: f32,
    count: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read_write> data: array<f32>;
@group(0) @binding(2) var<storage, read> unused: array<f32>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x < params.count) {
        data[id.x] = data[id.x] * params.scale;
    }
}
"#;

    #[test]
    fn vertex_fragment_program_links() {
        let p = link(vec![
            stage("q.vert", ShaderStage::Vertex, VS),
            stage("q.frag", ShaderStage::Fragment, FS),
        ])
        .unwrap();

        assert_eq!(p.kind(), ProgramKind::Graphics);
        assert_eq!(p.stage(ShaderStage::Vertex).unwrap().entry_point, "vs_main");
        assert_eq!(p.stage(ShaderStage::Fragment).unwrap().entry_point, "fs_main");
        assert_eq!(
            p.bindings().slot("params").unwrap(),
            BindingSlot {
                group: 0,
                binding: 0
            }
        );
    }

    #[test]
    fn compute_program_collects_only_used_bindings() {
        let p = link(vec![stage("c.comp", ShaderStage::Compute, CS)]).unwrap();

        assert_eq!(p.kind(), ProgramKind::Compute);
        assert_eq!(p.stage(ShaderStage::Compute).unwrap().workgroup_size, [8, 8, 1]);
        assert_eq!(p.bindings().len(), 2);
        assert_eq!(
            p.bindings().get("data").unwrap().kind,
            ResourceKind::Storage { read_only: false }
        );
        assert!(p.bindings().get("unused").is_none());
        p.require(&["params", "data"]).unwrap();
        p.require_members("params", &["scale", "count"]).unwrap();
    }

    #[test]
    fn missing_names_fail_fast() {
        let p = link(vec![stage("c.comp", ShaderStage::Compute, CS)]).unwrap();

        assert!(matches!(
            p.require(&["params", "palette"]),
            Err(ShaderError::MissingBinding { name }) if name == "palette"
        ));
        assert!(matches!(
            p.require_members("params", &["scale", "offset"]),
            Err(ShaderError::MissingMember { member, .. }) if member == "offset"
        ));
    }

    #[test]
    fn empty_program_fails_to_link() {
        assert!(matches!(link(Vec::new()), Err(ShaderError::Link { .. })));
    }

    #[test]
    fn compute_cannot_mix_with_graphics() {
        let err = link(vec![
            stage("q.vert", ShaderStage::Vertex, VS),
            stage("c.comp", ShaderStage::Compute, CS),
        ])
        .unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn fragment_alone_fails_to_link() {
        let err = link(vec![stage("q.frag", ShaderStage::Fragment, FS)]).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn duplicate_stage_kind_fails_to_link() {
        let err = link(vec![
            stage("a.comp", ShaderStage::Compute, CS),
            stage("b.comp", ShaderStage::Compute, CS),
        ])
        .unwrap_err();
        match err {
            ShaderError::Link { diagnostic } => assert!(diagnostic.contains("b.comp")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stage_without_matching_entry_point_fails_to_link() {
        // A compute module submitted as the vertex stage.
        let err = link(vec![stage("c.comp", ShaderStage::Vertex, CS)]).unwrap_err();
        match err {
            ShaderError::Link { diagnostic } => {
                assert!(diagnostic.contains("no vertex entry point"), "{diagnostic}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unwritten_fragment_input_fails_to_link() {
        let fs = r#"
@fragment
fn fs_main(@location(3) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
        let err = link(vec![
            stage("q.vert", ShaderStage::Vertex, VS),
            stage("bad.frag", ShaderStage::Fragment, fs),
        ])
        .unwrap_err();
        match err {
            ShaderError::Link { diagnostic } => assert!(diagnostic.contains("@location(3)")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_interface_type_fails_to_link() {
        let fs = r#"
@fragment
fn fs_main(@location(0) uv: vec4<f32>) -> @location(0) vec4<f32> {
    return uv;
}
"#;
        let err = link(vec![
            stage("q.vert", ShaderStage::Vertex, VS),
            stage("bad.frag", ShaderStage::Fragment, fs),
        ])
        .unwrap_err();
        match err {
            ShaderError::Link { diagnostic } => {
                assert!(diagnostic.contains("vec2<f32>"), "{diagnostic}");
                assert!(diagnostic.contains("vec4<f32>"), "{diagnostic}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn conflicting_binding_declarations_fail_to_link() {
        let vs = r#"
@group(0) @binding(0) var<uniform> params: vec4<f32>;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) p: vec3<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(p, 1.0) * params;
    out.uv = p.xy;
    return out;
}
"#;
        let err = link(vec![
            stage("q.vert", ShaderStage::Vertex, vs),
            stage("q.frag", ShaderStage::Fragment, FS),
        ])
        .unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }
}
