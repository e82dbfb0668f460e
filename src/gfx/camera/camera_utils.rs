// src/gfx/camera/camera_utils.rs
use cgmath::{perspective, Deg, Matrix4};

/// Maps OpenGL clip-space depth [-1, 1] onto wgpu's [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Perspective projection for a vertical field of view in degrees.
pub fn projection_matrix(fov_degrees: f32, aspect: f32, znear: f32, zfar: f32) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX * perspective(Deg(fov_degrees), aspect, znear, zfar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Transform};

    #[test]
    fn test_depth_range_is_zero_to_one() {
        let projection = projection_matrix(45.0, 1.5, 0.1, 150.0);
        let near = projection.transform_point(Point3::new(0.0, 0.0, -0.1));
        let far = projection.transform_point(Point3::new(0.0, 0.0, -150.0));
        assert!(near.z.abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-4);
    }
}
