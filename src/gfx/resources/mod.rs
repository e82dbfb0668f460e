// src/gfx/resources/mod.rs
//! GPU resource management
//!
//! Buffers, attribute binding sets and shader programs. Every resource is
//! created against a [`GraphicsContext`](crate::gfx::device::GraphicsContext)
//! and released with a consuming `destroy`.

pub mod buffer;
pub mod shader;
pub mod vertex_array;

// Re-export main types
pub use buffer::DeviceBuffer;
pub use shader::{
    compile_stage, CompiledStage, LinkedProgram, ShaderProgram, ShaderStage, UniformKind,
    UniformLayout, UniformLocation, UniformValue,
};
pub use vertex_array::{AttributeBindingSet, AttributeLayout};
