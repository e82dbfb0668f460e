// src/gfx/camera/fly_camera.rs
//! Free-fly camera
//!
//! Orientation is kept as yaw and pitch in degrees; the front/right/up basis
//! is derived from them on every query and never stored, so it cannot drift
//! away from orthonormal however many events are applied.

use cgmath::{Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Rad, Vector3};

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_PITCH: f32 = 0.0;
pub const DEFAULT_ZOOM: f32 = 45.0;
pub const DEFAULT_SPEED: f32 = 2.5;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;

/// Pitch limit in degrees; looking straight up or down would flip the basis.
pub const PITCH_LIMIT: f32 = 89.0;
pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 45.0;

/// Direction of a keyboard move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Forward,
    Backward,
    Left,
    Right,
}

/// Orthonormal camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub front: Vector3<f32>,
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyCamera {
    pub position: Point3<f32>,
    world_up: Vector3<f32>,
    yaw: f32,
    pitch: f32,
    zoom: f32,
    pub movement_speed: f32,
    pub mouse_sensitivity: f32,
    last_pointer: (f32, f32),
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Point3::origin())
    }
}

impl FlyCamera {
    /// Camera at `position` looking down -Z with +Y as world up.
    pub fn new(position: Point3<f32>) -> Self {
        Self {
            position,
            world_up: Vector3::unit_y(),
            yaw: DEFAULT_YAW,
            pitch: DEFAULT_PITCH,
            zoom: DEFAULT_ZOOM,
            movement_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
            last_pointer: (0.0, 0.0),
        }
    }

    /// Moves along the current front or right axis.
    ///
    /// `delta_time` is the number of seconds since the previous frame.
    pub fn process_keyboard(&mut self, direction: Movement, delta_time: f32) {
        let Basis { front, right, .. } = self.basis();
        let velocity = self.movement_speed * delta_time;
        match direction {
            Movement::Forward => self.position += front * velocity,
            Movement::Backward => self.position -= front * velocity,
            Movement::Left => self.position -= right * velocity,
            Movement::Right => self.position += right * velocity,
        }
    }

    /// Turns the camera by pointer offsets, in pointer units.
    pub fn process_mouse_movement(&mut self, x_offset: f32, y_offset: f32) {
        self.yaw += x_offset * self.mouse_sensitivity;
        self.pitch =
            (self.pitch + y_offset * self.mouse_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);

        // Long sessions would otherwise grow yaw without bound.
        if !(-180.0..180.0).contains(&self.yaw) {
            self.yaw = (self.yaw + 180.0).rem_euclid(360.0) - 180.0;
            // rem_euclid rounds up to 360 for tiny negative inputs.
            if self.yaw >= 180.0 {
                self.yaw = -180.0;
            }
        }
    }

    /// Narrows (positive offset) or widens the field of view.
    pub fn process_mouse_scroll(&mut self, y_offset: f32) {
        self.zoom = (self.zoom - y_offset).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn basis(&self) -> Basis {
        let (yaw_sin, yaw_cos) = Rad::from(Deg(self.yaw)).0.sin_cos();
        let (pitch_sin, pitch_cos) = Rad::from(Deg(self.pitch)).0.sin_cos();

        let front = Vector3::new(yaw_cos * pitch_cos, pitch_sin, yaw_sin * pitch_cos).normalize();
        let right = front.cross(self.world_up).normalize();
        let up = right.cross(front).normalize();
        Basis { front, right, up }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        let Basis { front, up, .. } = self.basis();
        Matrix4::look_at_rh(self.position, self.position + front, up)
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Vertical field of view in degrees.
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Last absolute pointer position seen by the input glue.
    pub fn last_pointer(&self) -> (f32, f32) {
        self.last_pointer
    }

    pub fn set_last_pointer(&mut self, x: f32, y: f32) {
        self.last_pointer = (x, y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const EPSILON: f32 = 1e-5;

    fn assert_close(actual: Vector3<f32>, expected: Vector3<f32>) {
        assert!(
            (actual - expected).magnitude() < EPSILON,
            "{actual:?} != {expected:?}"
        );
    }

    fn assert_orthonormal(basis: &Basis) {
        for v in [basis.front, basis.right, basis.up] {
            assert!((v.magnitude() - 1.0).abs() < EPSILON, "not unit length: {v:?}");
        }
        assert!(basis.front.dot(basis.right).abs() < EPSILON);
        assert!(basis.front.dot(basis.up).abs() < EPSILON);
        assert!(basis.right.dot(basis.up).abs() < EPSILON);
    }

    #[test]
    fn test_default_orientation_looks_down_negative_z() {
        let camera = FlyCamera::default();
        let basis = camera.basis();
        assert_close(basis.front, Vector3::new(0.0, 0.0, -1.0));
        assert_close(basis.right, Vector3::new(1.0, 0.0, 0.0));
        assert_close(basis.up, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(camera.zoom(), 45.0);
    }

    #[test]
    fn test_basis_is_orthonormal_for_random_orientations() {
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0));
            camera.mouse_sensitivity = 1.0;
            let yaw = rng.random_range(-720.0f32..720.0);
            let pitch = rng.random_range(-88.9f32..88.9);
            camera.process_mouse_movement(yaw, pitch);
            assert_orthonormal(&camera.basis());
        }
    }

    #[test]
    fn test_pitch_lands_exactly_on_limits() {
        let mut camera = FlyCamera::default();
        camera.process_mouse_movement(0.0, 5000.0);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        assert_orthonormal(&camera.basis());

        camera.process_mouse_movement(0.0, -1.0e6);
        assert_eq!(camera.pitch(), -PITCH_LIMIT);
        assert_orthonormal(&camera.basis());
    }

    #[test]
    fn test_pitch_never_leaves_range() {
        let mut rng = rand::rng();
        let mut camera = FlyCamera::default();
        for _ in 0..1000 {
            camera.process_mouse_movement(0.0, rng.random_range(-2000.0f32..2000.0));
            assert!((-PITCH_LIMIT..=PITCH_LIMIT).contains(&camera.pitch()));
        }
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut rng = rand::rng();
        let mut camera = FlyCamera::default();
        camera.process_mouse_scroll(100.0);
        assert_eq!(camera.zoom(), MIN_ZOOM);
        camera.process_mouse_scroll(-100.0);
        assert_eq!(camera.zoom(), MAX_ZOOM);
        for _ in 0..1000 {
            camera.process_mouse_scroll(rng.random_range(-60.0f32..60.0));
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&camera.zoom()));
        }
    }

    #[test]
    fn test_yaw_stays_bounded() {
        let mut camera = FlyCamera::default();
        camera.mouse_sensitivity = 1.0;
        for _ in 0..100 {
            camera.process_mouse_movement(170.0, 0.0);
            assert!((-180.0..180.0).contains(&camera.yaw()));
        }
        // 100 * 170 = 17000 = 47 * 360 + 80
        assert!((camera.yaw() - (-90.0 + 80.0)).abs() < 1e-2);

        // Just below -180 folds onto the closed end of the range
        let mut camera = FlyCamera::default();
        camera.mouse_sensitivity = 1.0;
        camera.process_mouse_movement(-90.00002, 0.0);
        assert!((-180.0..180.0).contains(&camera.yaw()), "{}", camera.yaw());
        assert!((camera.yaw() + 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_view_matrix_is_pure() {
        let mut camera = FlyCamera::new(Point3::new(1.0, 2.0, 3.0));
        camera.process_mouse_movement(123.0, -45.0);
        let first = camera.view_matrix();
        let second = camera.view_matrix();
        let first: &[f32; 16] = first.as_ref();
        let second: &[f32; 16] = second.as_ref();
        assert_eq!(first.map(f32::to_bits), second.map(f32::to_bits));
    }

    #[test]
    fn test_forward_move_from_default_start() {
        let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0));
        camera.process_keyboard(Movement::Forward, 1.0);
        assert_close(camera.position.to_vec(), Vector3::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_strafe_and_backward_moves() {
        let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 0.0));
        camera.process_keyboard(Movement::Right, 2.0);
        assert_close(camera.position.to_vec(), Vector3::new(5.0, 0.0, 0.0));
        camera.process_keyboard(Movement::Left, 2.0);
        camera.process_keyboard(Movement::Backward, 0.4);
        assert_close(camera.position.to_vec(), Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_zero_pointer_offset_changes_nothing() {
        let mut camera = FlyCamera::new(Point3::new(0.0, 0.0, 3.0));
        camera.process_mouse_movement(37.0, -12.5);
        let before = camera;

        camera.process_mouse_movement(0.0, 0.0);
        assert_eq!(camera.yaw().to_bits(), before.yaw().to_bits());
        assert_eq!(camera.pitch().to_bits(), before.pitch().to_bits());
        assert_eq!(camera.basis(), before.basis());
    }
}
