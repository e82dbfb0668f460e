// src/gfx/device/error.rs
//! Error taxonomy for the graphics layer
//!
//! Fatal startup failures (no device, unreadable or invalid shaders) and
//! misuse of the binding state both surface as [`GfxError`]. Unresolved
//! uniform names are not errors; the shader program logs and drops them.

use std::path::PathBuf;

use crate::gfx::resources::shader::ShaderStage;

use super::Handle;

/// Errors produced by the graphics device and its resources.
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// The context has no usable graphics device behind it.
    #[error("no graphics device available: {0}")]
    NoDevice(String),

    /// A shader source file could not be read.
    #[error("failed to read shader source '{path}': {source}")]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single stage failed to parse or validate.
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },

    /// The two stages compiled but cannot form one program.
    #[error("shader program failed to link: {0}")]
    Link(String),

    /// Buffers are initialised with at least one byte.
    #[error("buffer {0:?} cannot be initialised with an empty payload")]
    EmptyUpload(Handle),

    /// An operation required a resource to be the active binding.
    #[error("{what} must be bound before {operation}")]
    NotBound {
        what: &'static str,
        operation: &'static str,
    },

    /// The attribute descriptor cannot be expressed as a vertex format.
    #[error("unsupported vertex attribute on slot {slot}: {reason}")]
    UnsupportedAttribute { slot: u32, reason: String },

    /// The active program reads a vertex input nobody feeds.
    #[error("vertex input @location({0}) has no linked attribute in the bound binding set")]
    MissingAttribute(u32),

    /// The draw reads past the end of the captured index buffer.
    #[error("draw requested {requested} indices but the index buffer holds {available}")]
    IndexRange { requested: u32, available: u32 },

    /// Presenting to the window surface failed.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

pub type Result<T> = std::result::Result<T, GfxError>;
