// src/gfx/device/mod.rs
//! # Graphics Device Context
//!
//! Immediate-mode graphics APIs keep "the current program" and "the bound
//! buffer" in ambient global state. Here that state lives in an explicit
//! [`GraphicsContext`], which every resource operation borrows mutably. The
//! context is `!Send` and `!Sync`, so all graphics work stays on the thread
//! that created it.
//!
//! The context owns a [`Backend`] that talks to the actual driver:
//!
//! - [`WgpuBackend`] renders to a window through wgpu
//! - [`HeadlessBackend`] keeps everything in memory and records draw calls,
//!   which is what the test-suite runs against
//!
//! Resources ([`DeviceBuffer`], [`AttributeBindingSet`], [`ShaderProgram`])
//! are thin owning wrappers around a [`Handle`]; the binding bookkeeping they
//! depend on is kept here.
//!
//! [`DeviceBuffer`]: crate::gfx::resources::DeviceBuffer
//! [`AttributeBindingSet`]: crate::gfx::resources::AttributeBindingSet
//! [`ShaderProgram`]: crate::gfx::resources::ShaderProgram

pub mod error;
pub mod headless;
pub mod wgpu_backend;

use std::{collections::HashMap, fmt, marker::PhantomData, num::NonZeroU32};

use crate::gfx::resources::shader::LinkedProgram;

pub use error::{GfxError, Result};
pub use headless::HeadlessBackend;
pub use wgpu_backend::WgpuBackend;

/// Opaque identifier of a device-side resource.
///
/// Handles are allocated monotonically and never reused by a backend, so a
/// stale handle can never alias a newer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU32);

impl Handle {
    /// Raw driver-side value
    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic handle source shared by the backends.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    last: u32,
}

impl HandleAllocator {
    pub fn allocate(&mut self) -> Handle {
        self.last = self
            .last
            .checked_add(1)
            .expect("graphics handle space exhausted");
        // `last` starts at zero and only grows, so it is never zero here.
        Handle(NonZeroU32::new(self.last).unwrap_or(NonZeroU32::MIN))
    }
}

/// What a device buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attribute data
    Vertex,
    /// `u32` triangle indices
    Index,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Vertex => f.write_str("vertex buffer"),
            BufferKind::Index => f.write_str("index buffer"),
        }
    }
}

/// Scalar type of one attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float,
    Int,
    UnsignedInt,
    UnsignedByte,
}

impl ComponentType {
    pub fn size(self) -> u32 {
        match self {
            ComponentType::Float | ComponentType::Int | ComponentType::UnsignedInt => 4,
            ComponentType::UnsignedByte => 1,
        }
    }
}

/// How a span of buffer bytes feeds one shader input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    pub buffer: Handle,
    pub slot: u32,
    pub component_count: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
    /// Distance between consecutive vertices; zero means tightly packed.
    pub stride: u32,
    pub offset: u64,
}

impl AttributeDescriptor {
    /// Size in bytes of one attribute value.
    pub fn byte_size(&self) -> u32 {
        self.component_count * self.component_type.size()
    }

    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.byte_size()
        } else {
            self.stride
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let unsupported = |reason: String| {
            Err(GfxError::UnsupportedAttribute {
                slot: self.slot,
                reason,
            })
        };

        if !(1..=4).contains(&self.component_count) {
            return unsupported(format!(
                "{} components (expected 1 to 4)",
                self.component_count
            ));
        }
        match self.component_type {
            ComponentType::UnsignedByte => {
                if !self.normalized || !matches!(self.component_count, 2 | 4) {
                    return unsupported(
                        "8-bit components must be normalized with a count of 2 or 4".into(),
                    );
                }
            }
            _ if self.normalized => {
                return unsupported("only 8-bit components can be normalized".into());
            }
            _ => {}
        }
        if self.stride != 0 && self.stride < self.byte_size() {
            return unsupported(format!(
                "stride {} is smaller than the {}-byte attribute",
                self.stride,
                self.byte_size()
            ));
        }
        // An interleaved attribute must sit wholly inside one vertex.
        let stride = self.stride as u64;
        if stride != 0 && self.offset % stride + self.byte_size() as u64 > stride {
            return unsupported(format!(
                "offset {} places the {}-byte attribute across the {}-byte vertex boundary",
                self.offset,
                self.byte_size(),
                self.stride
            ));
        }
        Ok(())
    }

    /// Checks that at least one value can be read from a buffer of `len` bytes.
    pub(crate) fn validate_source_len(&self, len: usize) -> Result<()> {
        if self.offset + self.byte_size() as u64 > len as u64 {
            return Err(GfxError::UnsupportedAttribute {
                slot: self.slot,
                reason: format!(
                    "offset {} reads past the end of the {len}-byte source buffer",
                    self.offset
                ),
            });
        }
        Ok(())
    }
}

/// Everything a backend needs to execute one indexed draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: Handle,
    pub binding_set: Handle,
    pub uniforms: &'a [u8],
    pub attributes: &'a [AttributeDescriptor],
    pub index_buffer: Handle,
    pub index_count: u32,
}

/// Driver seam behind [`GraphicsContext`].
///
/// Backends only create, fill and destroy resources and execute draws; all
/// binding rules are enforced by the context before a backend is called.
/// The `destroy_*` entry points must be idempotent.
pub trait Backend {
    fn create_buffer(&mut self, kind: BufferKind) -> Result<Handle>;

    /// Replaces the entire contents of `buffer` with `bytes`.
    fn write_buffer(&mut self, buffer: Handle, kind: BufferKind, bytes: &[u8]) -> Result<()>;

    fn destroy_buffer(&mut self, buffer: Handle);

    fn create_binding_set(&mut self) -> Result<Handle>;

    fn destroy_binding_set(&mut self, binding_set: Handle);

    fn create_program(&mut self, program: &LinkedProgram) -> Result<Handle>;

    fn destroy_program(&mut self, program: Handle);

    fn draw_indexed(&mut self, call: DrawCall<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Buffer,
    BindingSet,
    Program,
}

#[derive(Debug)]
struct BufferState {
    kind: BufferKind,
    len: usize,
}

#[derive(Debug, Default)]
struct BindingSetState {
    attributes: Vec<AttributeDescriptor>,
    index_buffer: Option<Handle>,
}

#[derive(Debug)]
struct ProgramState {
    uniforms: Vec<u8>,
    vertex_inputs: Vec<u32>,
}

/// The currently active binding of each target.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub vertex_buffer: Option<Handle>,
    pub index_buffer: Option<Handle>,
    pub binding_set: Option<Handle>,
    pub program: Option<Handle>,
}

/// Thread-confined graphics state: the backend plus every binding target.
pub struct GraphicsContext<B: Backend> {
    backend: B,
    bindings: Bindings,
    kinds: HashMap<Handle, ResourceKind>,
    buffers: HashMap<Handle, BufferState>,
    binding_sets: HashMap<Handle, BindingSetState>,
    programs: HashMap<Handle, ProgramState>,
    _thread_bound: PhantomData<*const ()>,
}

impl<B: Backend> GraphicsContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            bindings: Bindings::default(),
            kinds: HashMap::new(),
            buffers: HashMap::new(),
            binding_sets: HashMap::new(),
            programs: HashMap::new(),
            _thread_bound: PhantomData,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Snapshot of the active binding targets.
    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    /// Number of resources created and not yet destroyed.
    pub fn live_resources(&self) -> usize {
        self.kinds.len()
    }

    /// Draws `index_count` indices with the active program and binding set.
    ///
    /// The index buffer is the one the binding set captured while it was
    /// bound; uniform values are whatever the program holds right now.
    pub fn draw_indexed(&mut self, index_count: u32) -> Result<()> {
        let program = self.bindings.program.ok_or(GfxError::NotBound {
            what: "a shader program",
            operation: "drawing",
        })?;
        let binding_set = self.bindings.binding_set.ok_or(GfxError::NotBound {
            what: "an attribute binding set",
            operation: "drawing",
        })?;
        let set = &self.binding_sets[&binding_set];
        let index_buffer = set.index_buffer.ok_or(GfxError::NotBound {
            what: "an index buffer",
            operation: "drawing",
        })?;

        let available = self
            .buffers
            .get(&index_buffer)
            .map_or(0, |state| (state.len / std::mem::size_of::<u32>()) as u32);
        if index_count > available {
            return Err(GfxError::IndexRange {
                requested: index_count,
                available,
            });
        }

        let state = &self.programs[&program];
        if let Some(slot) = state
            .vertex_inputs
            .iter()
            .find(|slot| !set.attributes.iter().any(|a| a.slot == **slot))
        {
            return Err(GfxError::MissingAttribute(*slot));
        }

        self.backend.draw_indexed(DrawCall {
            program,
            binding_set,
            uniforms: &state.uniforms,
            attributes: &set.attributes,
            index_buffer,
            index_count,
        })
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    pub(crate) fn create_buffer(&mut self, kind: BufferKind) -> Result<Handle> {
        let handle = self.backend.create_buffer(kind)?;
        self.kinds.insert(handle, ResourceKind::Buffer);
        self.buffers.insert(handle, BufferState { kind, len: 0 });
        Ok(handle)
    }

    pub(crate) fn write_buffer(&mut self, handle: Handle, bytes: &[u8]) -> Result<()> {
        let state = self
            .buffers
            .get_mut(&handle)
            .ok_or(GfxError::NotBound {
                what: "a live buffer",
                operation: "uploading",
            })?;
        if bytes.is_empty() {
            return Err(GfxError::EmptyUpload(handle));
        }
        self.backend.write_buffer(handle, state.kind, bytes)?;
        state.len = bytes.len();
        log::debug!("uploaded {} bytes to {} {}", bytes.len(), state.kind, handle);
        Ok(())
    }

    pub(crate) fn bind_buffer(&mut self, kind: BufferKind, handle: Option<Handle>) {
        match kind {
            BufferKind::Vertex => self.bindings.vertex_buffer = handle,
            BufferKind::Index => {
                self.bindings.index_buffer = handle;
                // The bound binding set captures the element buffer, but
                // unbinding it afterwards leaves the capture in place.
                if let (Some(buffer), Some(set)) = (handle, self.bindings.binding_set) {
                    if let Some(state) = self.binding_sets.get_mut(&set) {
                        state.index_buffer = Some(buffer);
                    }
                }
            }
        }
    }

    pub(crate) fn destroy_buffer(&mut self, handle: Handle) {
        if self.release(handle, ResourceKind::Buffer) {
            self.buffers.remove(&handle);
            if self.bindings.vertex_buffer == Some(handle) {
                self.bindings.vertex_buffer = None;
            }
            if self.bindings.index_buffer == Some(handle) {
                self.bindings.index_buffer = None;
            }
            self.backend.destroy_buffer(handle);
        }
    }

    // ------------------------------------------------------------------
    // Attribute binding sets
    // ------------------------------------------------------------------

    pub(crate) fn create_binding_set(&mut self) -> Result<Handle> {
        let handle = self.backend.create_binding_set()?;
        self.kinds.insert(handle, ResourceKind::BindingSet);
        self.binding_sets.insert(handle, BindingSetState::default());
        Ok(handle)
    }

    pub(crate) fn bind_binding_set(&mut self, handle: Option<Handle>) {
        self.bindings.binding_set = handle;
    }

    pub(crate) fn link_attribute(
        &mut self,
        binding_set: Handle,
        descriptor: AttributeDescriptor,
    ) -> Result<()> {
        if self.bindings.binding_set != Some(binding_set) {
            return Err(GfxError::NotBound {
                what: "the attribute binding set",
                operation: "linking an attribute",
            });
        }
        if self.bindings.vertex_buffer != Some(descriptor.buffer) {
            return Err(GfxError::NotBound {
                what: "the source vertex buffer",
                operation: "linking an attribute",
            });
        }
        descriptor.validate()?;
        let source_len = self
            .buffers
            .get(&descriptor.buffer)
            .map_or(0, |state| state.len);
        descriptor.validate_source_len(source_len)?;

        let state = self
            .binding_sets
            .get_mut(&binding_set)
            .ok_or(GfxError::NotBound {
                what: "a live attribute binding set",
                operation: "linking an attribute",
            })?;
        state.attributes.retain(|a| a.slot != descriptor.slot);
        state.attributes.push(descriptor);
        state.attributes.sort_by_key(|a| a.slot);
        Ok(())
    }

    pub(crate) fn attributes(&self, binding_set: Handle) -> &[AttributeDescriptor] {
        self.binding_sets
            .get(&binding_set)
            .map_or(&[], |state| state.attributes.as_slice())
    }

    pub(crate) fn captured_index_buffer(&self, binding_set: Handle) -> Option<Handle> {
        self.binding_sets
            .get(&binding_set)
            .and_then(|state| state.index_buffer)
    }

    pub(crate) fn destroy_binding_set(&mut self, handle: Handle) {
        if self.release(handle, ResourceKind::BindingSet) {
            self.binding_sets.remove(&handle);
            if self.bindings.binding_set == Some(handle) {
                self.bindings.binding_set = None;
            }
            self.backend.destroy_binding_set(handle);
        }
    }

    // ------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------

    pub(crate) fn create_program(&mut self, program: &LinkedProgram) -> Result<Handle> {
        let handle = self.backend.create_program(program)?;
        self.kinds.insert(handle, ResourceKind::Program);
        self.programs.insert(
            handle,
            ProgramState {
                uniforms: vec![0; program.uniform_block_size() as usize],
                vertex_inputs: program.vertex_inputs().to_vec(),
            },
        );
        Ok(handle)
    }

    pub(crate) fn use_program(&mut self, handle: Option<Handle>) {
        self.bindings.program = handle;
    }

    pub(crate) fn uniform_block_mut(&mut self, program: Handle) -> Option<&mut [u8]> {
        self.programs
            .get_mut(&program)
            .map(|state| state.uniforms.as_mut_slice())
    }

    pub(crate) fn destroy_program(&mut self, handle: Handle) {
        if self.release(handle, ResourceKind::Program) {
            self.programs.remove(&handle);
            if self.bindings.program == Some(handle) {
                self.bindings.program = None;
            }
            self.backend.destroy_program(handle);
        }
    }

    /// Forgets a live handle; false when it was already released.
    fn release(&mut self, handle: Handle, kind: ResourceKind) -> bool {
        match self.kinds.get(&handle) {
            Some(live) if *live == kind => {
                self.kinds.remove(&handle);
                true
            }
            _ => {
                log::debug!("ignoring release of {:?} {} (not live)", kind, handle);
                false
            }
        }
    }
}

impl<B: Backend> Drop for GraphicsContext<B> {
    fn drop(&mut self) {
        if self.kinds.is_empty() {
            return;
        }
        let mut leaked: Vec<_> = self.kinds.iter().collect();
        leaked.sort_by_key(|(handle, _)| **handle);
        for (handle, kind) in leaked {
            log::warn!("{:?} {} was never destroyed", kind, handle);
        }
    }
}

impl<B: Backend> fmt::Debug for GraphicsContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("bindings", &self.bindings)
            .field("live_resources", &self.kinds.len())
            .finish()
    }
}
