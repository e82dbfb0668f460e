// src/gfx/device/headless.rs
//! In-memory backend
//!
//! Keeps buffer payloads on the CPU and records every draw instead of
//! rasterising it. Shader programs still go through the full compile and
//! link path before they reach a backend, so this is enough to validate a
//! scene setup without a GPU.

use std::collections::{HashMap, HashSet};

use crate::gfx::resources::shader::LinkedProgram;

use super::{
    AttributeDescriptor, Backend, BufferKind, DrawCall, GfxError, Handle, HandleAllocator, Result,
};

/// A draw captured by [`HeadlessBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: Handle,
    pub binding_set: Handle,
    pub index_buffer: Handle,
    pub index_count: u32,
    pub uniforms: Vec<u8>,
    pub attributes: Vec<AttributeDescriptor>,
}

#[derive(Debug)]
struct StoredBuffer {
    kind: BufferKind,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct StoredProgram {
    vertex_entry: String,
    fragment_entry: String,
}

/// CPU-side [`Backend`] used for tests and offscreen validation.
#[derive(Debug)]
pub struct HeadlessBackend {
    /// Creations left before the device runs out; `None` is unlimited.
    creation_budget: Option<usize>,
    handles: HandleAllocator,
    buffers: HashMap<Handle, StoredBuffer>,
    binding_sets: HashSet<Handle>,
    programs: HashMap<Handle, StoredProgram>,
    draws: Vec<RecordedDraw>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            creation_budget: None,
            handles: HandleAllocator::default(),
            buffers: HashMap::new(),
            binding_sets: HashSet::new(),
            programs: HashMap::new(),
            draws: Vec::new(),
        }
    }

    /// A backend whose device is gone; every creation fails.
    pub fn without_device() -> Self {
        Self::with_creation_limit(0)
    }

    /// A backend that creates `limit` objects and then fails like a lost device.
    pub fn with_creation_limit(limit: usize) -> Self {
        Self {
            creation_budget: Some(limit),
            ..Self::new()
        }
    }

    /// Current payload of a live buffer.
    pub fn buffer_contents(&self, buffer: Handle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.bytes.as_slice())
    }

    pub fn buffer_kind(&self, buffer: Handle) -> Option<BufferKind> {
        self.buffers.get(&buffer).map(|b| b.kind)
    }

    pub fn is_binding_set_live(&self, binding_set: Handle) -> bool {
        self.binding_sets.contains(&binding_set)
    }

    /// Entry point names of a live program, vertex first.
    pub fn program_entry_points(&self, program: Handle) -> Option<(&str, &str)> {
        self.programs
            .get(&program)
            .map(|p| (p.vertex_entry.as_str(), p.fragment_entry.as_str()))
    }

    pub fn live_handles(&self) -> usize {
        self.buffers.len() + self.binding_sets.len() + self.programs.len()
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    /// Drains the recorded draws, typically once per simulated frame.
    pub fn take_draws(&mut self) -> Vec<RecordedDraw> {
        std::mem::take(&mut self.draws)
    }

    fn allocate(&mut self) -> Result<Handle> {
        match self.creation_budget.as_mut() {
            Some(0) => return Err(GfxError::NoDevice("headless backend has no device".into())),
            Some(left) => *left -= 1,
            None => (),
        }
        Ok(self.handles.allocate())
    }
}

impl Backend for HeadlessBackend {
    fn create_buffer(&mut self, kind: BufferKind) -> Result<Handle> {
        let handle = self.allocate()?;
        self.buffers.insert(
            handle,
            StoredBuffer {
                kind,
                bytes: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: Handle, kind: BufferKind, bytes: &[u8]) -> Result<()> {
        let stored = self
            .buffers
            .entry(buffer)
            .or_insert_with(|| StoredBuffer {
                kind,
                bytes: Vec::new(),
            });
        stored.bytes.clear();
        stored.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: Handle) {
        self.buffers.remove(&buffer);
    }

    fn create_binding_set(&mut self) -> Result<Handle> {
        let handle = self.allocate()?;
        self.binding_sets.insert(handle);
        Ok(handle)
    }

    fn destroy_binding_set(&mut self, binding_set: Handle) {
        self.binding_sets.remove(&binding_set);
    }

    fn create_program(&mut self, program: &LinkedProgram) -> Result<Handle> {
        let handle = self.allocate()?;
        self.programs.insert(
            handle,
            StoredProgram {
                vertex_entry: program.vertex_entry_point().to_string(),
                fragment_entry: program.fragment_entry_point().to_string(),
            },
        );
        Ok(handle)
    }

    fn destroy_program(&mut self, program: Handle) {
        self.programs.remove(&program);
    }

    fn draw_indexed(&mut self, call: DrawCall<'_>) -> Result<()> {
        self.draws.push(RecordedDraw {
            program: call.program,
            binding_set: call.binding_set,
            index_buffer: call.index_buffer,
            index_count: call.index_count,
            uniforms: call.uniforms.to_vec(),
            attributes: call.attributes.to_vec(),
        });
        Ok(())
    }
}
