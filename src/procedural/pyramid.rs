use super::RenderMesh;
use glamx::{Vec2, Vec3};

/// Generates a square pyramid of height one standing on a unit base, centred at the origin.
///
/// The four sides are single triangles with flat normals; the base is a quad.
pub fn pyramid() -> RenderMesh {
    let apex = Vec3::new(0.0, 0.5, 0.0);
    let sides: [(Vec3, [f32; 3], [f32; 3]); 4] = [
        (Vec3::new(0.0, 0.5, -0.5), [0.5, -0.5, -0.5], [-0.5, -0.5, -0.5]),
        (Vec3::new(-0.5, 0.5, 0.0), [-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5]),
        (Vec3::new(0.0, 0.5, 0.5), [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5]),
        (Vec3::new(0.5, 0.5, 0.0), [0.5, -0.5, 0.5], [0.5, -0.5, -0.5]),
    ];

    let mut coords = Vec::with_capacity(16);
    let mut normals = Vec::with_capacity(16);
    let mut uvs = Vec::with_capacity(16);
    let mut indices = Vec::with_capacity(6);

    for (normal, left, right) in sides {
        let base = coords.len() as u32;
        let normal = normal.normalize();
        coords.extend([apex, Vec3::from(left), Vec3::from(right)]);
        normals.extend([normal; 3]);
        uvs.extend([Vec2::new(0.5, 1.0), Vec2::new(1.0, 0.5), Vec2::new(0.0, 0.5)]);
        indices.push([base, base + 1, base + 2]);
    }

    let base = coords.len() as u32;
    coords.extend([
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(-0.5, -0.5, -0.5),
    ]);
    normals.extend([Vec3::NEG_Y; 4]);
    uvs.extend([
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 0.5),
        Vec2::new(0.0, 0.5),
        Vec2::new(0.0, 0.0),
    ]);
    indices.push([base, base + 1, base + 3]);
    indices.push([base + 3, base + 1, base + 2]);

    RenderMesh::new(coords, normals, Some(uvs), indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_counts() {
        let pyramid = pyramid();
        assert_eq!(pyramid.coords.len(), 16);
        assert_eq!(pyramid.flat_indices().len(), 18);
    }

    #[test]
    fn triangles_face_their_normals() {
        let pyramid = pyramid();
        for [a, b, c] in &pyramid.indices {
            let (a, b, c) = (*a as usize, *b as usize, *c as usize);
            let winding = (pyramid.coords[b] - pyramid.coords[a])
                .cross(pyramid.coords[c] - pyramid.coords[a]);
            assert!(winding.dot(pyramid.normals[a]) > 0.0);
        }
    }
}
