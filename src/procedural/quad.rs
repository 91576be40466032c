use super::{QuadVertex, RenderMesh};
use glamx::{Vec2, Vec3};

/// Generates a subdivided plane lying on XZ, centred at the origin and facing +Y.
///
/// `usubdivs` and `vsubdivs` are the number of cells along X and Z; both are at least one.
pub fn plane(width: f32, depth: f32, usubdivs: u32, vsubdivs: u32) -> RenderMesh {
    let usubdivs = usubdivs.max(1);
    let vsubdivs = vsubdivs.max(1);
    let columns = usubdivs + 1;

    let mut coords = Vec::with_capacity((columns * (vsubdivs + 1)) as usize);
    let mut uvs = Vec::with_capacity(coords.capacity());
    for j in 0..=vsubdivs {
        for i in 0..=usubdivs {
            let u = i as f32 / usubdivs as f32;
            let v = j as f32 / vsubdivs as f32;
            coords.push(Vec3::new((u - 0.5) * width, 0.0, (v - 0.5) * depth));
            uvs.push(Vec2::new(u, v));
        }
    }

    let mut indices = Vec::with_capacity((usubdivs * vsubdivs * 2) as usize);
    for j in 0..vsubdivs {
        for i in 0..usubdivs {
            let a = i + j * columns;
            let b = a + columns;
            let c = a + 1;
            let d = b + 1;
            indices.push([a, b, c]);
            indices.push([c, b, d]);
        }
    }

    let normals = vec![Vec3::Y; coords.len()];
    RenderMesh::new(coords, normals, Some(uvs), indices)
}

/// Clip-space corners of the full-screen quad.
pub const SCREEN_QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0] },
    QuadVertex { position: [1.0, -1.0] },
    QuadVertex { position: [1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0] },
];

/// Indices of the full-screen quad.
pub const SCREEN_QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_is_flat_and_faces_up() {
        let plane = plane(4.0, 2.0, 4, 2);
        assert_eq!(plane.coords.len(), 15);
        assert_eq!(plane.num_triangles(), 16);
        let aabb = plane.aabb().unwrap();
        assert!(aabb.is_flat(1.0e-5));
        assert_eq!(aabb.extents(), Vec3::new(4.0, 0.0, 2.0));

        for [a, b, c] in &plane.indices {
            let (pa, pb, pc) = (
                plane.coords[*a as usize],
                plane.coords[*b as usize],
                plane.coords[*c as usize],
            );
            assert!((pb - pa).cross(pc - pa).y > 0.0);
        }
    }

    #[test]
    fn screen_quad_covers_clip_space() {
        for tri in SCREEN_QUAD_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| SCREEN_QUAD_VERTICES[tri[k] as usize].position);
            let winding = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(winding > 0.0);
        }
    }
}
