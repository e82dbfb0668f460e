//! # Primitive Shapes

use super::GeometryData;
use crate::gfx::scene::vertex::Vertex3D;

/// Unit cube centred on the origin, four vertices per face.
///
/// Faces carry flat outward normals, so the cube lights with hard edges.
pub fn generate_cube() -> GeometryData {
    // (normal, the four corners of the face)
    #[rustfmt::skip]
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // Back (-Z)
        ([0.0, 0.0, -1.0], [[-0.5, -0.5, -0.5], [ 0.5, -0.5, -0.5], [ 0.5,  0.5, -0.5], [-0.5,  0.5, -0.5]]),
        // Front (+Z)
        ([0.0, 0.0,  1.0], [[-0.5, -0.5,  0.5], [ 0.5, -0.5,  0.5], [ 0.5,  0.5,  0.5], [-0.5,  0.5,  0.5]]),
        // Left (-X)
        ([-1.0, 0.0, 0.0], [[-0.5,  0.5,  0.5], [-0.5,  0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, -0.5,  0.5]]),
        // Right (+X)
        ([ 1.0, 0.0, 0.0], [[ 0.5,  0.5,  0.5], [ 0.5,  0.5, -0.5], [ 0.5, -0.5, -0.5], [ 0.5, -0.5,  0.5]]),
        // Bottom (-Y)
        ([0.0, -1.0, 0.0], [[-0.5, -0.5, -0.5], [ 0.5, -0.5, -0.5], [ 0.5, -0.5,  0.5], [-0.5, -0.5,  0.5]]),
        // Top (+Y)
        ([0.0,  1.0, 0.0], [[-0.5,  0.5, -0.5], [ 0.5,  0.5, -0.5], [ 0.5,  0.5,  0.5], [-0.5,  0.5,  0.5]]),
    ];

    let mut data = GeometryData::default();
    for (normal, corners) in faces {
        let base = data.vertices.len() as u32;
        data.vertices.extend(corners.map(|position| Vertex3D { position, normal }));
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertex_count()));
        assert_eq!(&cube.indices[..6], &[0, 1, 2, 0, 2, 3]);
        assert_eq!(&cube.indices[30..], &[20, 21, 22, 20, 22, 23]);
    }

    #[test]
    fn test_cube_faces_are_flat_and_outward() {
        let cube = generate_cube();
        for face in cube.vertices.chunks(4) {
            let normal = face[0].normal;
            assert!(face.iter().all(|v| v.normal == normal));
            for vertex in face {
                // Every corner sits on the half-unit plane the normal points at.
                let along: f32 = (0..3).map(|i| vertex.position[i] * normal[i]).sum();
                assert_eq!(along, 0.5);
            }
        }
    }
}
