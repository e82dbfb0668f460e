// src/gfx/resources/shader.rs
//! Shader programs
//!
//! A program is built from two WGSL sources, one per stage. Each stage is
//! parsed and validated on its own with naga, then the two are linked:
//! entry points are located, the fragment inputs are checked against the
//! vertex outputs, and the uniform blocks of both stages are merged into a
//! single name → location table.
//!
//! Uniforms are addressed by name like in the immediate-mode APIs. Each
//! stage declares its block as `var<uniform>` at `@group(0) @binding(0)`;
//! members are placed by the WGSL layout rules and the program keeps one CPU
//! copy of the block that is uploaded with every draw.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::Path,
};

use cgmath::{Matrix3, Matrix4, Vector3};
use naga::{
    valid::{Capabilities, ValidationFlags, Validator},
    AddressSpace, Binding, Module, ResourceBinding, Scalar, TypeInner, VectorSize,
};

use crate::gfx::device::{Backend, GfxError, GraphicsContext, Handle, Result};

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A parsed and validated single stage.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    stage: ShaderStage,
    module: Module,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// Parses and validates one stage.
///
/// # Errors
/// [`GfxError::Compile`] carrying naga's rendered diagnostic.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| GfxError::Compile {
        stage,
        log: e.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| GfxError::Compile {
            stage,
            log: e.emit_to_string(source),
        })?;
    Ok(CompiledStage { stage, module })
}

/// Value types a uniform member can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Mat4,
    Mat3,
    Vec3,
    Float,
    Int,
    /// Present in the block but not writable through [`UniformValue`].
    Unsupported,
}

impl UniformKind {
    fn of(inner: &TypeInner) -> Self {
        match *inner {
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if scalar == Scalar::F32 => UniformKind::Mat4,
            TypeInner::Matrix {
                columns: VectorSize::Tri,
                rows: VectorSize::Tri,
                scalar,
            } if scalar == Scalar::F32 => UniformKind::Mat3,
            TypeInner::Vector {
                size: VectorSize::Tri,
                scalar,
            } if scalar == Scalar::F32 => UniformKind::Vec3,
            TypeInner::Scalar(scalar) if scalar == Scalar::F32 => UniformKind::Float,
            TypeInner::Scalar(scalar) if scalar == Scalar::I32 => UniformKind::Int,
            _ => UniformKind::Unsupported,
        }
    }
}

/// Resolved position of a named uniform inside the program's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub size: u32,
    pub kind: UniformKind,
}

impl UniformLocation {
    fn end(&self) -> u32 {
        self.offset + self.size
    }

    fn overlaps(&self, other: &UniformLocation) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Merged uniform block of a linked program.
#[derive(Debug, Clone, Default)]
pub struct UniformLayout {
    size: u32,
    members: HashMap<String, UniformLocation>,
}

impl UniformLayout {
    /// Block size rounded up to the 16-byte uniform alignment.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn get(&self, name: &str) -> Option<UniformLocation> {
        self.members.get(name).copied()
    }

    fn merge(&mut self, stage: ShaderStage, name: String, location: UniformLocation) -> Result<()> {
        if let Some(existing) = self.members.get(&name) {
            if *existing != location {
                return Err(GfxError::Link(format!(
                    "uniform '{name}' in the {stage} stage disagrees with the other stage \
                     (offset {} vs {})",
                    location.offset, existing.offset
                )));
            }
            return Ok(());
        }
        if let Some((other, _)) = self.members.iter().find(|(_, l)| l.overlaps(&location)) {
            return Err(GfxError::Link(format!(
                "uniform '{name}' in the {stage} stage overlaps '{other}'"
            )));
        }
        self.size = self.size.max(location.end().next_multiple_of(16));
        self.members.insert(name, location);
        Ok(())
    }
}

/// Two compiled stages that form one program.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    vertex: CompiledStage,
    fragment: CompiledStage,
    vertex_entry: String,
    fragment_entry: String,
    vertex_inputs: Vec<u32>,
    uniforms: UniformLayout,
}

impl LinkedProgram {
    /// Links a vertex and a fragment stage.
    ///
    /// # Errors
    /// [`GfxError::Link`] when an entry point is missing, a fragment input
    /// has no matching vertex output, the uniform blocks disagree, or a
    /// stage declares a resource other than the uniform block.
    pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<Self> {
        let vertex_ep = entry_point(&vertex, ShaderStage::Vertex)?;
        let fragment_ep = entry_point(&fragment, ShaderStage::Fragment)?;

        let vertex_inputs = vertex_ep
            .function
            .arguments
            .iter()
            .flat_map(|arg| locations(&vertex.module, arg.ty, arg.binding.as_ref()))
            .collect::<Vec<_>>();
        let vertex_outputs = vertex_ep
            .function
            .result
            .as_ref()
            .map(|result| locations(&vertex.module, result.ty, result.binding.as_ref()))
            .unwrap_or_default();
        let fragment_inputs = fragment_ep
            .function
            .arguments
            .iter()
            .flat_map(|arg| locations(&fragment.module, arg.ty, arg.binding.as_ref()));
        for location in fragment_inputs {
            if !vertex_outputs.contains(&location) {
                return Err(GfxError::Link(format!(
                    "fragment input @location({location}) is not written by the vertex stage"
                )));
            }
        }

        let mut uniforms = UniformLayout::default();
        reflect_uniforms(&vertex, &mut uniforms)?;
        reflect_uniforms(&fragment, &mut uniforms)?;

        let vertex_entry = vertex_ep.name.clone();
        let fragment_entry = fragment_ep.name.clone();
        Ok(Self {
            vertex,
            fragment,
            vertex_entry,
            fragment_entry,
            vertex_inputs,
            uniforms,
        })
    }

    pub fn vertex_module(&self) -> &Module {
        &self.vertex.module
    }

    pub fn fragment_module(&self) -> &Module {
        &self.fragment.module
    }

    pub fn vertex_entry_point(&self) -> &str {
        &self.vertex_entry
    }

    pub fn fragment_entry_point(&self) -> &str {
        &self.fragment_entry
    }

    /// Vertex input locations the vertex entry point reads.
    pub fn vertex_inputs(&self) -> &[u32] {
        &self.vertex_inputs
    }

    pub fn uniforms(&self) -> &UniformLayout {
        &self.uniforms
    }

    pub fn uniform_block_size(&self) -> u32 {
        self.uniforms.size
    }
}

fn entry_point(stage: &CompiledStage, wanted: ShaderStage) -> Result<&naga::EntryPoint> {
    stage
        .module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted.naga())
        .ok_or_else(|| {
            GfxError::Link(format!(
                "the {} source has no @{} entry point",
                stage.stage, wanted
            ))
        })
}

/// User locations carried by an argument or result, flattening structs.
fn locations(module: &Module, ty: naga::Handle<naga::Type>, binding: Option<&Binding>) -> Vec<u32> {
    match binding {
        Some(Binding::Location { location, .. }) => vec![*location],
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .flat_map(|m| locations(module, m.ty, m.binding.as_ref()))
                .collect(),
            _ => Vec::new(),
        },
    }
}

const UNIFORM_BLOCK: ResourceBinding = ResourceBinding {
    group: 0,
    binding: 0,
};

fn reflect_uniforms(stage: &CompiledStage, layout: &mut UniformLayout) -> Result<()> {
    let module = &stage.module;
    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        if global.space != AddressSpace::Uniform || *binding != UNIFORM_BLOCK {
            return Err(GfxError::Link(format!(
                "the {} stage declares @group({}) @binding({}); only a uniform block at \
                 @group(0) @binding(0) is supported",
                stage.stage, binding.group, binding.binding
            )));
        }

        let ty = &module.types[global.ty];
        match &ty.inner {
            TypeInner::Struct { members, .. } => {
                for member in members {
                    let Some(name) = &member.name else { continue };
                    let inner = &module.types[member.ty].inner;
                    let location = UniformLocation {
                        offset: member.offset,
                        size: inner.size(module.to_ctx()),
                        kind: UniformKind::of(inner),
                    };
                    layout.merge(stage.stage, name.clone(), location)?;
                }
            }
            inner => {
                // A bare `var<uniform> name: T` is one uniform at offset zero.
                let Some(name) = &global.name else { continue };
                let location = UniformLocation {
                    offset: 0,
                    size: inner.size(module.to_ctx()),
                    kind: UniformKind::of(inner),
                };
                layout.merge(stage.stage, name.clone(), location)?;
            }
        }
    }
    Ok(())
}

/// A value that can be written into a uniform block.
pub trait UniformValue {
    const KIND: UniformKind;

    /// Writes the value at the start of `dst` using WGSL uniform layout.
    fn write(&self, dst: &mut [u8]);
}

impl UniformValue for Matrix4<f32> {
    const KIND: UniformKind = UniformKind::Mat4;

    fn write(&self, dst: &mut [u8]) {
        let columns: &[[f32; 4]; 4] = self.as_ref();
        dst[..64].copy_from_slice(bytemuck::cast_slice(columns));
    }
}

impl UniformValue for Matrix3<f32> {
    const KIND: UniformKind = UniformKind::Mat3;

    fn write(&self, dst: &mut [u8]) {
        // mat3x3<f32> columns are padded to 16 bytes
        let columns: &[[f32; 3]; 3] = self.as_ref();
        for (i, column) in columns.iter().enumerate() {
            dst[i * 16..i * 16 + 12].copy_from_slice(bytemuck::cast_slice(column));
        }
    }
}

impl UniformValue for Vector3<f32> {
    const KIND: UniformKind = UniformKind::Vec3;

    fn write(&self, dst: &mut [u8]) {
        let v: &[f32; 3] = self.as_ref();
        dst[..12].copy_from_slice(bytemuck::cast_slice(v));
    }
}

impl UniformValue for f32 {
    const KIND: UniformKind = UniformKind::Float;

    fn write(&self, dst: &mut [u8]) {
        dst[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

impl UniformValue for i32 {
    const KIND: UniformKind = UniformKind::Int;

    fn write(&self, dst: &mut [u8]) {
        dst[..4].copy_from_slice(&self.to_ne_bytes());
    }
}

/// A compiled and linked shader program living on the device.
#[derive(Debug)]
pub struct ShaderProgram {
    handle: Handle,
    uniforms: UniformLayout,
    resolved: HashMap<String, Option<UniformLocation>>,
    warned: HashSet<String>,
}

impl ShaderProgram {
    /// Compiles both stages, links them and creates the device program.
    ///
    /// # Errors
    /// Compile and link failures carry the diagnostic text; callers are
    /// expected to treat them as fatal.
    pub fn new<B: Backend>(
        ctx: &mut GraphicsContext<B>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self> {
        let vertex = compile_stage(ShaderStage::Vertex, vertex_source)?;
        let fragment = compile_stage(ShaderStage::Fragment, fragment_source)?;
        let linked = LinkedProgram::link(vertex, fragment)?;
        let handle = ctx.create_program(&linked)?;
        log::info!(
            "linked program {} ({} uniforms, {}-byte block)",
            handle,
            linked.uniforms.members.len(),
            linked.uniforms.size
        );
        Ok(Self {
            handle,
            uniforms: linked.uniforms,
            resolved: HashMap::new(),
            warned: HashSet::new(),
        })
    }

    /// Reads both stage sources from disk and builds the program.
    ///
    /// # Errors
    /// A missing or unreadable file is [`GfxError::ShaderSource`].
    pub fn from_files<B: Backend>(
        ctx: &mut GraphicsContext<B>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let vertex_source = read_source(vertex_path.as_ref())?;
        let fragment_source = read_source(fragment_path.as_ref())?;
        Self::new(ctx, &vertex_source, &fragment_source)
    }

    /// Makes this the program used by subsequent draws.
    pub fn activate<B: Backend>(&self, ctx: &mut GraphicsContext<B>) {
        ctx.use_program(Some(self.handle));
    }

    /// Resolves `name`, caching the answer whether or not it exists.
    pub fn uniform_location(&mut self, name: &str) -> Option<UniformLocation> {
        if let Some(cached) = self.resolved.get(name) {
            return *cached;
        }
        let location = self.uniforms.get(name);
        self.resolved.insert(name.to_string(), location);
        location
    }

    /// Writes `value` into the uniform called `name`.
    ///
    /// An unknown name, or a value whose type does not match the declared
    /// member, is dropped with a warning logged once per name.
    pub fn set_uniform<B: Backend, T: UniformValue>(
        &mut self,
        ctx: &mut GraphicsContext<B>,
        name: &str,
        value: T,
    ) {
        let location = match self.uniform_location(name) {
            Some(location) if location.kind == T::KIND => location,
            Some(location) => {
                self.warn_once(name, || {
                    format!(
                        "uniform '{name}' is declared as {:?}, not {:?}; value dropped",
                        location.kind,
                        T::KIND
                    )
                });
                return;
            }
            None => {
                self.warn_once(name, || {
                    format!("uniform '{name}' is not active in the program; value dropped")
                });
                return;
            }
        };

        let Some(block) = ctx.uniform_block_mut(self.handle) else {
            return;
        };
        let start = location.offset as usize;
        value.write(&mut block[start..start + location.size as usize]);
    }

    pub fn destroy<B: Backend>(self, ctx: &mut GraphicsContext<B>) {
        ctx.destroy_program(self.handle);
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn uniforms(&self) -> &UniformLayout {
        &self.uniforms
    }

    fn warn_once(&mut self, name: &str, message: impl FnOnce() -> String) {
        if self.warned.insert(name.to_string()) {
            log::warn!("program {}: {}", self.handle, message());
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| GfxError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::device::HeadlessBackend;
    use cgmath::SquareMatrix;

    const VERTEX: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec3<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u.model * vec4<f32>(position, 1.0);
    out.color = u.tint;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    tint: vec3<f32>,
    strength: f32,
    normal_matrix: mat3x3<f32>,
    exponent: i32,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    let shade = u.normal_matrix * color;
    return vec4<f32>(shade * u.strength * f32(u.exponent), 1.0);
}
"#;

    fn context() -> GraphicsContext<HeadlessBackend> {
        GraphicsContext::new(HeadlessBackend::new())
    }

    fn block<'c>(ctx: &'c mut GraphicsContext<HeadlessBackend>, program: &ShaderProgram) -> &'c [u8] {
        ctx.uniform_block_mut(program.handle()).unwrap()
    }

    #[test]
    fn test_program_links_and_reflects_uniforms() {
        let mut ctx = context();
        let program = ShaderProgram::new(&mut ctx, VERTEX, FRAGMENT).unwrap();
        let uniforms = program.uniforms();

        let model = uniforms.get("model").unwrap();
        assert_eq!((model.offset, model.kind), (0, UniformKind::Mat4));
        let tint = uniforms.get("tint").unwrap();
        assert_eq!((tint.offset, tint.kind), (64, UniformKind::Vec3));
        let strength = uniforms.get("strength").unwrap();
        assert_eq!((strength.offset, strength.kind), (76, UniformKind::Float));
        let normal_matrix = uniforms.get("normal_matrix").unwrap();
        assert_eq!(
            (normal_matrix.offset, normal_matrix.size, normal_matrix.kind),
            (80, 48, UniformKind::Mat3)
        );
        let exponent = uniforms.get("exponent").unwrap();
        assert_eq!((exponent.offset, exponent.kind), (128, UniformKind::Int));
        assert_eq!(uniforms.size(), 144);

        assert_eq!(
            ctx.backend().program_entry_points(program.handle()),
            Some(("vs_main", "fs_main"))
        );
        program.destroy(&mut ctx);
    }

    #[test]
    fn test_set_uniform_writes_block() {
        let mut ctx = context();
        let mut program = ShaderProgram::new(&mut ctx, VERTEX, FRAGMENT).unwrap();

        program.set_uniform(&mut ctx, "strength", 0.5f32);
        program.set_uniform(&mut ctx, "exponent", 8i32);
        program.set_uniform(&mut ctx, "tint", Vector3::new(1.0f32, 2.0, 3.0));
        program.set_uniform(&mut ctx, "normal_matrix", Matrix3::<f32>::identity());

        let bytes = block(&mut ctx, &program);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(&floats[16..19], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[19], 0.5);
        // mat3 columns land on 16-byte boundaries
        assert_eq!(&floats[20..23], &[1.0, 0.0, 0.0]);
        assert_eq!(&floats[24..27], &[0.0, 1.0, 0.0]);
        assert_eq!(&floats[28..31], &[0.0, 0.0, 1.0]);
        assert_eq!(i32::from_ne_bytes(bytes[128..132].try_into().unwrap()), 8);

        program.destroy(&mut ctx);
    }

    #[test]
    fn test_unknown_or_mistyped_uniform_is_dropped() {
        let mut ctx = context();
        let mut program = ShaderProgram::new(&mut ctx, VERTEX, FRAGMENT).unwrap();
        let before = block(&mut ctx, &program).to_vec();

        program.set_uniform(&mut ctx, "doesNotExist", 1.0f32);
        program.set_uniform(&mut ctx, "doesNotExist", 2.0f32);
        program.set_uniform(&mut ctx, "strength", 3i32);

        assert_eq!(block(&mut ctx, &program), &before[..]);
        assert_eq!(program.warned.len(), 2);
        assert_eq!(program.resolved.get("doesNotExist"), Some(&None));
        program.destroy(&mut ctx);
    }

    #[test]
    fn test_invalid_fragment_source_fails_to_compile() {
        let mut ctx = context();
        let broken = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0) ";
        let err = ShaderProgram::new(&mut ctx, VERTEX, broken).unwrap_err();
        assert!(matches!(
            err,
            GfxError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(ctx.live_resources(), 0);
    }

    #[test]
    fn test_type_errors_fail_validation() {
        let broken = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        assert!(matches!(
            compile_stage(ShaderStage::Fragment, broken),
            Err(GfxError::Compile { .. })
        ));
    }

    #[test]
    fn test_unmatched_varying_fails_to_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(3) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, fragment).unwrap();
        assert!(matches!(
            LinkedProgram::link(vertex, fragment),
            Err(GfxError::Link(_))
        ));
    }

    #[test]
    fn test_missing_entry_point_fails_to_link() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let not_a_fragment = compile_stage(ShaderStage::Fragment, VERTEX).unwrap();
        let err = LinkedProgram::link(vertex, not_a_fragment).unwrap_err();
        assert!(err.to_string().contains("@fragment"));
    }

    #[test]
    fn test_overlapping_uniform_blocks_fail_to_link() {
        let fragment = r#"
struct Other {
    color: vec4<f32>,
}
@group(0) @binding(0) var<uniform> u: Other;

@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return u.color * vec4<f32>(color, 1.0);
}
"#;
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        let fragment = compile_stage(ShaderStage::Fragment, fragment).unwrap();
        let err = LinkedProgram::link(vertex, fragment).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_missing_source_file() {
        let mut ctx = context();
        let err = ShaderProgram::from_files(&mut ctx, "no/such/vertex.wgsl", "no/such/frag.wgsl")
            .unwrap_err();
        assert!(matches!(err, GfxError::ShaderSource { .. }));
    }
}
