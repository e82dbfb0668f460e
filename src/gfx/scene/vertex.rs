//! # Vertex Data Structures

use std::mem;

use crate::gfx::resources::AttributeLayout;

/// A 3D vertex with position and normal data.
///
/// `#[repr(C)]` keeps the field order, so the byte layout is position at
/// offset 0 and normal at offset 12 within a 24-byte stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex3D {
    pub const STRIDE: u32 = mem::size_of::<Vertex3D>() as u32;
    pub const POSITION_OFFSET: u64 = 0;
    pub const NORMAL_OFFSET: u64 = mem::size_of::<[f32; 3]>() as u64;

    /// Attribute layouts for shader locations 0 (position) and 1 (normal).
    pub fn layouts() -> [AttributeLayout; 2] {
        [
            AttributeLayout::float(0, 3, Self::STRIDE, Self::POSITION_OFFSET),
            AttributeLayout::float(1, 3, Self::STRIDE, Self::NORMAL_OFFSET),
        ]
    }
}
