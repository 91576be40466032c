//! Meshes stored on the GPU.

use crate::error::GpuError;
use crate::gpu::{Buffer, BufferKind, DrawBuffers, Gpu};
use crate::procedural::{Aabb, RenderMesh, SCREEN_QUAD_INDICES, SCREEN_QUAD_VERTICES};

/// A mesh uploaded to the GPU.
///
/// `GpuMesh` is immutable once created: the interleaved vertex buffer and the index buffer
/// are written at upload and only released when the mesh is dropped.
///
/// # Relationship with RenderMesh
/// - [`RenderMesh`](crate::procedural::RenderMesh) is the CPU-side mesh descriptor
/// - `GpuMesh` is the GPU-side representation
pub struct GpuMesh {
    indices: Buffer,
    vertices: Buffer,
    index_count: u32,
    aabb: Option<Aabb>,
}

impl GpuMesh {
    /// Uploads a mesh.
    ///
    /// Fails if the mesh has no vertex or no triangle.
    pub fn from_render_mesh(gpu: &Gpu, label: &str, mesh: &RenderMesh) -> Result<Self, GpuError> {
        let vertices = Buffer::new(
            gpu,
            &format!("{label}_vertices"),
            BufferKind::Vertex,
            bytemuck::cast_slice(&mesh.vertices()),
        )?;
        let flat_indices = mesh.flat_indices();
        let indices = Buffer::new(
            gpu,
            &format!("{label}_indices"),
            BufferKind::Index,
            bytemuck::cast_slice(&flat_indices),
        )?;

        Ok(GpuMesh {
            indices,
            vertices,
            index_count: flat_indices.len() as u32,
            aabb: mesh.aabb(),
        })
    }

    /// Uploads the full-screen quad used by the screen-space passes.
    pub fn screen_quad(gpu: &Gpu) -> Result<Self, GpuError> {
        let vertices = Buffer::new(
            gpu,
            "screen_quad_vertices",
            BufferKind::Vertex,
            bytemuck::cast_slice(&SCREEN_QUAD_VERTICES),
        )?;
        let indices = Buffer::new(
            gpu,
            "screen_quad_indices",
            BufferKind::Index,
            bytemuck::cast_slice(&SCREEN_QUAD_INDICES),
        )?;

        Ok(GpuMesh {
            indices,
            vertices,
            index_count: SCREEN_QUAD_INDICES.len() as u32,
            aabb: None,
        })
    }

    /// Buffers to hand to [`draw_indexed`](crate::gpu::RenderDevice::draw_indexed).
    #[inline]
    pub fn draw_buffers(&self) -> DrawBuffers {
        DrawBuffers {
            vertices: self.vertices.id(),
            indices: self.indices.id(),
            index_count: self.index_count,
        }
    }

    /// Number of indices.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bounding box of the vertices, in model space.
    #[inline]
    pub fn aabb(&self) -> Option<&Aabb> {
        self.aabb.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::procedural;
    use std::rc::Rc;

    #[test]
    fn uploaded_cube_keeps_its_index_count_and_bounds() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(8, 8));
        let mesh = GpuMesh::from_render_mesh(&gpu, "cube", &procedural::unit_cuboid()).unwrap();
        assert_eq!(mesh.index_count(), 36);
        let aabb = mesh.aabb().unwrap();
        assert!(!aabb.is_flat(1.0e-5));
    }

    #[test]
    fn empty_meshes_are_rejected() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(8, 8));
        let empty = RenderMesh::new(vec![], vec![], None, vec![]);
        assert!(GpuMesh::from_render_mesh(&gpu, "empty", &empty).is_err());
    }
}
