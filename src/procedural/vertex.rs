use bytemuck::{Pod, Zeroable};
use glamx::{Vec2, Vec3};

/// Vertex of the scene meshes: position, normal and texture coordinates.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Creates a vertex.
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Vertex {
            position: position.into(),
            normal: normal.into(),
            uv: uv.into(),
        }
    }
}

/// Vertex of the full-screen quad, in clip space.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}
