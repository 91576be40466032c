use super::RenderMesh;
use glamx::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Generates a UV sphere of radius one, centred at the origin.
///
/// `tess_u` is the number of segments around the Y axis and `tess_v` the number of rings
/// from pole to pole. The seam and the poles are duplicated so that texture coordinates
/// stay continuous: the mesh has `(tess_u + 1) × (tess_v + 1)` vertices.
pub fn sphere(tess_u: u32, tess_v: u32) -> RenderMesh {
    let tess_u = tess_u.max(3);
    let tess_v = tess_v.max(2);
    let d_phi = PI / tess_v as f32;
    let d_theta = TAU / tess_u as f32;
    let columns = tess_u + 1;

    let count = (columns * (tess_v + 1)) as usize;
    let mut coords = Vec::with_capacity(count);
    let mut uvs = Vec::with_capacity(count);

    for ring in 0..=tess_v {
        let phi = ring as f32 * d_phi;
        let (sin_phi, cos_phi) = phi.sin_cos();
        for segment in 0..columns {
            let theta = segment as f32 * d_theta;
            let (sin_theta, cos_theta) = theta.sin_cos();
            coords.push(Vec3::new(sin_phi * cos_theta, cos_phi, sin_phi * sin_theta));
            uvs.push(Vec2::new(1.0 - theta / TAU, 1.0 - phi / PI));
        }
    }

    let mut indices = Vec::with_capacity((tess_u * tess_v * 2) as usize);
    for ring in 0..tess_v {
        for segment in 0..tess_u {
            let a = segment + ring * columns;
            let b = a + 1;
            let c = a + columns;
            let d = c + 1;
            indices.push([a, b, c]);
            indices.push([c, b, d]);
        }
    }

    let normals = coords.clone();
    RenderMesh::new(coords, normals, Some(uvs), indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_counts() {
        let sphere = sphere(12, 6);
        assert_eq!(sphere.coords.len(), 13 * 7);
        assert_eq!(sphere.flat_indices().len(), 12 * 6 * 6);
        assert!(sphere.flat_indices().iter().all(|i| (*i as usize) < sphere.coords.len()));
    }

    #[test]
    fn positions_are_normals_on_the_unit_sphere() {
        let sphere = sphere(8, 4);
        for (p, n) in sphere.coords.iter().zip(&sphere.normals) {
            assert_eq!(p, n);
            assert_relative_eq!(p.length(), 1.0, epsilon = 1.0e-6);
        }
        assert!(sphere.uvs[0].abs_diff_eq(Vec2::new(1.0, 1.0), 1.0e-6));
        assert!(sphere.uvs.last().unwrap().abs_diff_eq(Vec2::ZERO, 1.0e-6));
    }

    #[test]
    fn triangles_face_outwards() {
        let sphere = sphere(16, 8);
        for [a, b, c] in &sphere.indices {
            let (pa, pb, pc) = (
                sphere.coords[*a as usize],
                sphere.coords[*b as usize],
                sphere.coords[*c as usize],
            );
            let winding = (pb - pa).cross(pc - pa);
            if winding.length() > 1.0e-6 {
                assert!(winding.dot(pa + pb + pc) > 0.0);
            }
        }
    }
}
