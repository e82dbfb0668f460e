//! # Scene
//!
//! The lit ground cube, the light indicator and the parameters the UI edits.
//!
//! - [`Scene`] owns every device resource of the frame and issues the draws
//! - [`SceneParameters`] is the state shared between the UI panel and the
//!   renderer: the panel writes it, [`Scene::render`] reads it in the same frame
//! - [`Vertex3D`] is the interleaved position + normal vertex

pub mod scene;
pub mod vertex;

// Re-export main types
pub use scene::{Scene, SceneParameters};
pub use vertex::Vertex3D;
