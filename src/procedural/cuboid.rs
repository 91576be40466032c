use super::RenderMesh;
use glamx::{Vec2, Vec3};

/// Generates a cube of side one, centred at the origin.
///
/// Each face has its own four vertices. Texture coordinates map the faces onto a 2×2 atlas:
/// the side faces use the upper half, the bottom face the lower left quarter and the top
/// face the lower right quarter.
pub fn unit_cuboid() -> RenderMesh {
    // (normal, [4 × (corner, uv)])
    let faces: [(Vec3, [([f32; 3], [f32; 2]); 4]); 6] = [
        (
            Vec3::NEG_Z,
            [
                ([0.5, 0.5, -0.5], [1.0, 1.0]),
                ([0.5, -0.5, -0.5], [1.0, 0.5]),
                ([-0.5, -0.5, -0.5], [0.5, 0.5]),
                ([-0.5, 0.5, -0.5], [0.5, 1.0]),
            ],
        ),
        (
            Vec3::NEG_X,
            [
                ([-0.5, 0.5, -0.5], [0.5, 1.0]),
                ([-0.5, -0.5, -0.5], [0.5, 0.5]),
                ([-0.5, -0.5, 0.5], [0.0, 0.5]),
                ([-0.5, 0.5, 0.5], [0.0, 1.0]),
            ],
        ),
        (
            Vec3::NEG_Y,
            [
                ([0.5, -0.5, -0.5], [0.5, 0.0]),
                ([0.5, -0.5, 0.5], [0.5, 0.5]),
                ([-0.5, -0.5, 0.5], [0.0, 0.5]),
                ([-0.5, -0.5, -0.5], [0.0, 0.0]),
            ],
        ),
        (
            Vec3::Z,
            [
                ([-0.5, 0.5, 0.5], [1.0, 1.0]),
                ([-0.5, -0.5, 0.5], [1.0, 0.5]),
                ([0.5, -0.5, 0.5], [0.5, 0.5]),
                ([0.5, 0.5, 0.5], [0.5, 1.0]),
            ],
        ),
        (
            Vec3::X,
            [
                ([0.5, 0.5, 0.5], [0.5, 1.0]),
                ([0.5, -0.5, 0.5], [0.5, 0.5]),
                ([0.5, -0.5, -0.5], [0.0, 0.5]),
                ([0.5, 0.5, -0.5], [0.0, 1.0]),
            ],
        ),
        (
            Vec3::Y,
            [
                ([0.5, 0.5, 0.5], [1.0, 0.5]),
                ([0.5, 0.5, -0.5], [1.0, 0.0]),
                ([-0.5, 0.5, -0.5], [0.5, 0.0]),
                ([-0.5, 0.5, 0.5], [0.5, 0.5]),
            ],
        ),
    ];

    let mut coords = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(12);

    for (normal, corners) in faces {
        let base = coords.len() as u32;
        for (corner, uv) in corners {
            coords.push(Vec3::from(corner));
            normals.push(normal);
            uvs.push(Vec2::from(uv));
        }
        indices.push([base, base + 1, base + 3]);
        indices.push([base + 3, base + 1, base + 2]);
    }

    RenderMesh::new(coords, normals, Some(uvs), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_counts() {
        let cube = unit_cuboid();
        assert_eq!(cube.coords.len(), 24);
        assert_eq!(cube.flat_indices().len(), 36);
        let aabb = cube.aabb().unwrap();
        assert_eq!(aabb.extents(), Vec3::ONE);
    }

    #[test]
    fn triangles_face_their_normals() {
        let cube = unit_cuboid();
        for [a, b, c] in &cube.indices {
            let (a, b, c) = (*a as usize, *b as usize, *c as usize);
            let winding = (cube.coords[b] - cube.coords[a]).cross(cube.coords[c] - cube.coords[a]);
            assert!(winding.normalize().abs_diff_eq(cube.normals[a], 1.0e-6));
        }
    }
}
