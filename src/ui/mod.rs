//! # User Interface Module
//!
//! Dear ImGui overlay for editing the scene while it runs.
//!
//! - [`UiManager`] - ImGui integration with winit and wgpu: input capture,
//!   frame timing and the overlay render pass
//! - [`scene_editor_panel`] - the "Scene Editor" window over
//!   [`SceneParameters`](crate::gfx::scene::SceneParameters)
//!
//! ## Input Handling
//!
//! While Left Ctrl is held the camera ignores keys and pointer motion, which
//! frees the mouse for the panel. Events the panel captures never reach the
//! camera.

pub mod manager;
pub mod panel;

// Re-export main types
pub use manager::UiManager;
pub use panel::scene_editor_panel;
