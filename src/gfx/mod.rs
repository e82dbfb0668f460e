//! # Graphics Module
//!
//! Everything between the window and the pixels:
//!
//! - **Device** ([`device`]) - explicit graphics context, backends and errors
//! - **Resources** ([`resources`]) - device buffers, attribute binding sets and
//!   shader programs
//! - **Camera** ([`camera`]) - free-fly camera and its input glue
//! - **Geometry** ([`geometry`]) - procedural meshes
//! - **Scene** ([`scene`]) - the lit scene and its editable parameters
//!
//! ## Usage
//!
//! ```no_run
//! use lantern::gfx::{
//!     camera::FlyCamera,
//!     device::{GraphicsContext, HeadlessBackend},
//!     scene::{Scene, SceneParameters},
//! };
//!
//! let mut ctx = GraphicsContext::new(HeadlessBackend::new());
//! let mut scene = Scene::new(&mut ctx, std::path::Path::new("shaders")).unwrap();
//! let camera = FlyCamera::new(cgmath::Point3::new(0.0, 0.0, 3.0));
//! scene
//!     .render(&mut ctx, &camera, &SceneParameters::default(), 1.5)
//!     .unwrap();
//! scene.destroy(&mut ctx);
//! ```

pub mod camera;
pub mod device;
pub mod geometry;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::FlyCamera;
pub use device::{GfxError, GraphicsContext};
pub use scene::{Scene, SceneParameters};
