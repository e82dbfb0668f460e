// src/config.rs
//! Application start-up settings

use std::path::{Path, PathBuf};

/// Settings for [`LanternApp`](crate::app::LanternApp).
///
/// ```
/// let config = lantern::AppConfig::default()
///     .with_title("Lighting test")
///     .with_window_size(800, 600);
/// assert_eq!(config.width, 800);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Directory holding `vertex.wgsl`, `object.wgsl` and `light.wgsl`.
    pub shader_dir: PathBuf,
    pub camera_position: [f32; 3],
    pub znear: f32,
    pub zfar: f32,
    pub present_mode: wgpu::PresentMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lighting".to_string(),
            width: 1200,
            height: 800,
            shader_dir: PathBuf::from("shaders"),
            camera_position: [0.0, 0.0, 3.0],
            znear: 0.1,
            zfar: 150.0,
            present_mode: wgpu::PresentMode::AutoVsync,
        }
    }
}

impl AppConfig {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Zero dimensions are raised to one pixel.
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_shader_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.shader_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_camera_position(mut self, position: [f32; 3]) -> Self {
        self.camera_position = position;
        self
    }

    /// Near and far clip distances; ignored unless `0 < znear < zfar`.
    pub fn with_clip_planes(mut self, znear: f32, zfar: f32) -> Self {
        if znear > 0.0 && znear < zfar {
            self.znear = znear;
            self.zfar = zfar;
        } else {
            log::warn!("ignoring clip planes near={znear} far={zfar}");
        }
        self
    }

    pub fn with_present_mode(mut self, present_mode: wgpu::PresentMode) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Builds a config from command line arguments (program name excluded).
    ///
    /// The only recognised argument is an optional shader directory.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(dir) = args.into_iter().next() {
            config = config.with_shader_dir(dir);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.title, "Lighting");
        assert_eq!((config.width, config.height), (1200, 800));
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.camera_position, [0.0, 0.0, 3.0]);
        assert_eq!((config.znear, config.zfar), (0.1, 150.0));
        assert_eq!(config.present_mode, wgpu::PresentMode::AutoVsync);
    }

    #[test]
    fn test_builders() {
        let config = AppConfig::default()
            .with_title("Test")
            .with_window_size(0, 600)
            .with_shader_dir("assets/wgsl")
            .with_camera_position([1.0, 2.0, 3.0])
            .with_present_mode(wgpu::PresentMode::Fifo);
        assert_eq!(config.title, "Test");
        assert_eq!((config.width, config.height), (1, 600));
        assert_eq!(config.shader_dir, PathBuf::from("assets/wgsl"));
        assert_eq!(config.camera_position, [1.0, 2.0, 3.0]);
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
    }

    #[test]
    fn test_invalid_clip_planes_are_ignored() {
        let config = AppConfig::default().with_clip_planes(0.5, 500.0);
        assert_eq!((config.znear, config.zfar), (0.5, 500.0));

        let config = config.with_clip_planes(10.0, 1.0).with_clip_planes(0.0, 5.0);
        assert_eq!((config.znear, config.zfar), (0.5, 500.0));
    }

    #[test]
    fn test_from_args() {
        assert_eq!(AppConfig::from_args(Vec::new()), AppConfig::default());
        let config = AppConfig::from_args(vec!["/opt/shaders".to_string(), "extra".to_string()]);
        assert_eq!(config.shader_dir, PathBuf::from("/opt/shaders"));
    }
}
