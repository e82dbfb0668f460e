// src/gfx/resources/vertex_array.rs
//! Attribute binding sets
//!
//! A binding set describes how the bytes of one or more vertex buffers map
//! onto shader input slots. It references buffers without owning them, and
//! remembers the index buffer that was bound while it was active.

use crate::gfx::device::{
    AttributeDescriptor, Backend, ComponentType, GraphicsContext, Handle, Result,
};

use super::buffer::DeviceBuffer;

/// Layout of one attribute inside its source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLayout {
    pub slot: u32,
    pub component_count: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u64,
}

impl AttributeLayout {
    /// Non-normalized `f32` components, the common case.
    pub fn float(slot: u32, component_count: u32, stride: u32, offset: u64) -> Self {
        Self {
            slot,
            component_count,
            component_type: ComponentType::Float,
            normalized: false,
            stride,
            offset,
        }
    }
}

/// Vertex-input configuration consumed by indexed draws.
#[derive(Debug)]
pub struct AttributeBindingSet {
    handle: Handle,
}

impl AttributeBindingSet {
    pub fn new<B: Backend>(ctx: &mut GraphicsContext<B>) -> Result<Self> {
        let handle = ctx.create_binding_set()?;
        Ok(Self { handle })
    }

    /// Makes this the active vertex-input configuration.
    pub fn bind<B: Backend>(&self, ctx: &mut GraphicsContext<B>) {
        ctx.bind_binding_set(Some(self.handle));
    }

    pub fn unbind<B: Backend>(&self, ctx: &mut GraphicsContext<B>) {
        ctx.bind_binding_set(None);
    }

    /// Registers `layout` as reading from `buffer` and enables its slot.
    ///
    /// Both this set and `buffer` must currently be bound. Linking a slot
    /// that is already linked replaces the previous descriptor.
    ///
    /// # Errors
    /// [`GfxError::NotBound`] when either side is not bound, and
    /// [`GfxError::UnsupportedAttribute`] when the layout has no matching
    /// vertex format.
    ///
    /// [`GfxError::NotBound`]: crate::gfx::device::GfxError::NotBound
    /// [`GfxError::UnsupportedAttribute`]: crate::gfx::device::GfxError::UnsupportedAttribute
    pub fn link_attribute<B: Backend>(
        &self,
        ctx: &mut GraphicsContext<B>,
        buffer: &DeviceBuffer,
        layout: AttributeLayout,
    ) -> Result<()> {
        ctx.link_attribute(
            self.handle,
            AttributeDescriptor {
                buffer: buffer.handle(),
                slot: layout.slot,
                component_count: layout.component_count,
                component_type: layout.component_type,
                normalized: layout.normalized,
                stride: layout.stride,
                offset: layout.offset,
            },
        )
    }

    /// Descriptors registered so far, ordered by slot.
    pub fn attributes<'c, B: Backend>(&self, ctx: &'c GraphicsContext<B>) -> &'c [AttributeDescriptor] {
        ctx.attributes(self.handle)
    }

    pub fn index_buffer<B: Backend>(&self, ctx: &GraphicsContext<B>) -> Option<Handle> {
        ctx.captured_index_buffer(self.handle)
    }

    pub fn destroy<B: Backend>(self, ctx: &mut GraphicsContext<B>) {
        ctx.destroy_binding_set(self.handle);
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }
}
