// Cube geometry and camera
//
// 12 triangles, each vertex carrying a homogeneous position and a texture
// coordinate. Drawn non-indexed.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const POSITION_OFFSET: u32 = 0;
    pub const UV_OFFSET: u32 = 16;
}

const fn v(x: f32, y: f32, z: f32, u: f32, t: f32) -> Vertex {
    Vertex {
        position: [x, y, z, 1.0],
        uv: [u, t],
    }
}

pub const VERTEX_COUNT: u32 = 36;

pub const CUBE_VERTICES: [Vertex; VERTEX_COUNT as usize] = [
    // left
    v(-1.0, -1.0, -1.0, 1.0, 0.0),
    v(-1.0, 1.0, 1.0, 0.0, 1.0),
    v(-1.0, -1.0, 1.0, 0.0, 0.0),
    v(-1.0, 1.0, 1.0, 0.0, 1.0),
    v(-1.0, -1.0, -1.0, 1.0, 0.0),
    v(-1.0, 1.0, -1.0, 1.0, 1.0),
    // front
    v(-1.0, -1.0, -1.0, 0.0, 0.0),
    v(1.0, -1.0, -1.0, 1.0, 0.0),
    v(1.0, 1.0, -1.0, 1.0, 1.0),
    v(-1.0, -1.0, -1.0, 0.0, 0.0),
    v(1.0, 1.0, -1.0, 1.0, 1.0),
    v(-1.0, 1.0, -1.0, 0.0, 1.0),
    // top
    v(-1.0, -1.0, -1.0, 0.0, 1.0),
    v(1.0, -1.0, 1.0, 1.0, 0.0),
    v(1.0, -1.0, -1.0, 1.0, 1.0),
    v(-1.0, -1.0, -1.0, 0.0, 1.0),
    v(-1.0, -1.0, 1.0, 0.0, 0.0),
    v(1.0, -1.0, 1.0, 1.0, 0.0),
    // bottom
    v(-1.0, 1.0, -1.0, 0.0, 0.0),
    v(1.0, 1.0, 1.0, 1.0, 1.0),
    v(-1.0, 1.0, 1.0, 0.0, 1.0),
    v(-1.0, 1.0, -1.0, 0.0, 0.0),
    v(1.0, 1.0, -1.0, 1.0, 0.0),
    v(1.0, 1.0, 1.0, 1.0, 1.0),
    // right
    v(1.0, 1.0, -1.0, 0.0, 1.0),
    v(1.0, -1.0, 1.0, 1.0, 0.0),
    v(1.0, 1.0, 1.0, 1.0, 1.0),
    v(1.0, -1.0, 1.0, 1.0, 0.0),
    v(1.0, 1.0, -1.0, 0.0, 1.0),
    v(1.0, -1.0, -1.0, 0.0, 0.0),
    // back
    v(-1.0, 1.0, 1.0, 1.0, 1.0),
    v(1.0, 1.0, 1.0, 0.0, 1.0),
    v(-1.0, -1.0, 1.0, 1.0, 0.0),
    v(-1.0, -1.0, 1.0, 1.0, 0.0),
    v(1.0, 1.0, 1.0, 0.0, 1.0),
    v(1.0, -1.0, 1.0, 0.0, 0.0),
];

/// Projection * view * model for a fixed camera looking at the origin.
///
/// glam's `perspective_rh` already maps depth to [0, 1]; Vulkan's clip space
/// has Y pointing down, hence the flip.
pub fn model_view_projection(aspect: f32) -> Mat4 {
    let projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0);
    let view = Mat4::look_at_rh(
        Vec3::new(-5.0, 3.0, -10.0),
        Vec3::ZERO,
        Vec3::new(0.0, -1.0, 0.0),
    );
    let model = Mat4::IDENTITY;
    let clip = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0));
    clip * projection * view * model
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&CUBE_VERTICES).len(), 36 * 24);
    }

    #[test]
    fn six_faces_on_the_unit_cube() {
        for vertex in CUBE_VERTICES {
            for c in &vertex.position[..3] {
                assert_eq!(c.abs(), 1.0);
            }
            assert_eq!(vertex.position[3], 1.0);
            assert!((0.0..=1.0).contains(&vertex.uv[0]));
            assert!((0.0..=1.0).contains(&vertex.uv[1]));
        }
    }

    #[test]
    fn cube_is_inside_the_frustum() {
        let mvp = model_view_projection(1.0);
        for vertex in CUBE_VERTICES {
            let clip = mvp * Vec4::from_array(vertex.position);
            assert!(clip.w > 0.0);
            let ndc = clip / clip.w;
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
            assert!((0.0..=1.0).contains(&ndc.z));
        }
    }
}
