// src/gfx/camera/camera_controller.rs
//! winit glue for [`FlyCamera`]
//!
//! Tracks which movement keys are held, turns absolute cursor positions into
//! offsets, and wraps the cursor horizontally so the view can keep turning
//! past the window edge. Holding Left Ctrl hands the pointer to the UI.

use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, KeyEvent, MouseScrollDelta},
    keyboard::{KeyCode, PhysicalKey},
};

use super::fly_camera::{FlyCamera, Movement};

/// Pixel scroll deltas are scaled to roughly one notch per line.
const PIXELS_PER_LINE: f32 = 50.0;

#[derive(Debug, Clone, Default)]
pub struct CameraController {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    suspended: bool,
    width: f32,
}

impl CameraController {
    pub fn new(window_width: u32) -> Self {
        Self {
            width: window_width as f32,
            ..Default::default()
        }
    }

    pub fn set_window_width(&mut self, width: u32) {
        self.width = width as f32;
    }

    /// True while Left Ctrl is held and the camera ignores input.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn process_keyboard_event(&mut self, event: &KeyEvent) -> bool {
        match event.physical_key {
            PhysicalKey::Code(code) => self.process_key(code, event.state),
            PhysicalKey::Unidentified(_) => false,
        }
    }

    /// Updates held-key state; returns whether the key is one the camera uses.
    pub fn process_key(&mut self, code: KeyCode, state: ElementState) -> bool {
        let pressed = state == ElementState::Pressed;
        match code {
            KeyCode::KeyW => self.forward = pressed,
            KeyCode::KeyS => self.backward = pressed,
            KeyCode::KeyA => self.left = pressed,
            KeyCode::KeyD => self.right = pressed,
            KeyCode::ControlLeft => {
                if self.suspended != pressed {
                    log::debug!("camera input {}", if pressed { "suspended" } else { "resumed" });
                }
                self.suspended = pressed;
            }
            _ => return false,
        }
        true
    }

    /// Applies held movement keys for one frame.
    pub fn update_camera(&self, camera: &mut FlyCamera, delta_time: f32) {
        if self.suspended {
            return;
        }
        let held = [
            (self.forward, Movement::Forward),
            (self.backward, Movement::Backward),
            (self.left, Movement::Left),
            (self.right, Movement::Right),
        ];
        for (_, direction) in held.into_iter().filter(|(down, _)| *down) {
            camera.process_keyboard(direction, delta_time);
        }
    }

    /// Feeds an absolute cursor position to the camera.
    ///
    /// Returns the position the cursor should be warped to when it touched
    /// the left or right edge of the window.
    pub fn process_cursor_moved(
        &mut self,
        position: PhysicalPosition<f64>,
        camera: &mut FlyCamera,
    ) -> Option<PhysicalPosition<f64>> {
        let (mut last_x, last_y) = camera.last_pointer();
        let mut x = position.x as f32;
        let y = position.y as f32;

        if self.suspended {
            camera.set_last_pointer(x, y);
            return None;
        }

        let span = self.width - 1.0;
        let mut warp = None;
        if x <= 0.0 {
            x += span;
            last_x += span;
            warp = Some(PhysicalPosition::new(x as f64, position.y));
        } else if x + 0.1 >= self.width {
            x -= span;
            last_x -= span;
            warp = Some(PhysicalPosition::new(x as f64, position.y));
        }

        let x_offset = x - last_x;
        // Window y grows downwards
        let y_offset = last_y - y;
        camera.set_last_pointer(x, y);
        camera.process_mouse_movement(x_offset, y_offset);
        warp
    }

    /// Zooms by the wheel delta; Left Ctrl does not block zooming.
    pub fn process_scroll(&self, delta: &MouseScrollDelta, camera: &mut FlyCamera) {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => *y,
            MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / PIXELS_PER_LINE,
        };
        camera.process_mouse_scroll(lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    fn camera_at_centre() -> FlyCamera {
        let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0));
        camera.set_last_pointer(600.0, 400.0);
        camera
    }

    #[test]
    fn test_cursor_offsets_turn_camera() {
        let mut controller = CameraController::new(1200);
        let mut camera = camera_at_centre();

        let warp = controller.process_cursor_moved(PhysicalPosition::new(610.0, 390.0), &mut camera);
        assert!(warp.is_none());
        assert!((camera.yaw() - (-90.0 + 1.0)).abs() < 1e-5);
        assert!((camera.pitch() - 1.0).abs() < 1e-5);
        assert_eq!(camera.last_pointer(), (610.0, 390.0));
    }

    #[test]
    fn test_cursor_wraps_at_left_edge() {
        let mut controller = CameraController::new(1200);
        let mut camera = camera_at_centre();
        camera.set_last_pointer(3.0, 400.0);

        let warp = controller
            .process_cursor_moved(PhysicalPosition::new(0.0, 400.0), &mut camera)
            .unwrap();
        assert_eq!(warp.x, 1199.0);
        // The jump across the window is not a turn.
        assert!((camera.yaw() - (-90.0 - 0.3)).abs() < 1e-4);
        assert_eq!(camera.last_pointer(), (1199.0, 400.0));
    }

    #[test]
    fn test_cursor_wraps_at_right_edge() {
        let mut controller = CameraController::new(1200);
        let mut camera = camera_at_centre();
        camera.set_last_pointer(1198.0, 400.0);

        let warp = controller
            .process_cursor_moved(PhysicalPosition::new(1199.95, 400.0), &mut camera)
            .unwrap();
        assert!((warp.x - 0.95).abs() < 1e-3);
        assert!((camera.yaw() - (-90.0 + 0.195)).abs() < 1e-3);
    }

    #[test]
    fn test_left_ctrl_suspends_camera_input() {
        let mut controller = CameraController::new(1200);
        let mut camera = camera_at_centre();
        let start = camera;

        controller.process_key(KeyCode::ControlLeft, ElementState::Pressed);
        controller.process_key(KeyCode::KeyW, ElementState::Pressed);
        controller.update_camera(&mut camera, 1.0);
        controller.process_scroll(&MouseScrollDelta::LineDelta(0.0, 5.0), &mut camera);
        let warp = controller.process_cursor_moved(PhysicalPosition::new(0.0, 100.0), &mut camera);

        assert!(warp.is_none());
        assert_eq!(camera.position, start.position);
        assert_eq!(camera.yaw(), start.yaw());
        // Zoom still follows the wheel
        assert_eq!(camera.zoom(), start.zoom() - 5.0);
        // Releasing Ctrl resumes from where the pointer is now.
        assert_eq!(camera.last_pointer(), (0.0, 100.0));

        controller.process_key(KeyCode::ControlLeft, ElementState::Released);
        controller.update_camera(&mut camera, 1.0);
        assert!((camera.position.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_held_keys_combine() {
        let mut controller = CameraController::new(1200);
        let mut camera = camera_at_centre();

        controller.process_key(KeyCode::KeyW, ElementState::Pressed);
        controller.process_key(KeyCode::KeyS, ElementState::Pressed);
        controller.update_camera(&mut camera, 1.0);
        assert!((camera.position.z - 3.0).abs() < 1e-5);

        controller.process_key(KeyCode::KeyS, ElementState::Released);
        controller.process_key(KeyCode::KeyD, ElementState::Pressed);
        controller.update_camera(&mut camera, 0.4);
        assert!((camera.position.x - 1.0).abs() < 1e-5);
        assert!((camera.position.z - 2.0).abs() < 1e-5);

        assert!(!controller.process_key(KeyCode::KeyQ, ElementState::Pressed));
    }

    #[test]
    fn test_scroll_zooms() {
        let controller = CameraController::new(1200);
        let mut camera = camera_at_centre();
        controller.process_scroll(&MouseScrollDelta::LineDelta(0.0, 2.0), &mut camera);
        assert_eq!(camera.zoom(), 43.0);
        controller.process_scroll(
            &MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -100.0)),
            &mut camera,
        );
        assert_eq!(camera.zoom(), 45.0);
    }
}
