// src/lib.rs
//! Lantern
//!
//! A minimal real-time 3D harness on wgpu and winit: a lit ground slab, a
//! light indicator, a free-fly camera and an ImGui panel for the lighting
//! parameters.

pub mod app;
pub mod config;
pub mod gfx;
pub mod ui;

// Re-export main types for convenience
pub use app::LanternApp;
pub use config::AppConfig;

/// Opens the window and runs until it closes.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    LanternApp::new(config)?.run()
}
