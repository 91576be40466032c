use super::Vertex;
use glamx::{Mat3, Mat4, Vec2, Vec3};

/// Axis-aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl Aabb {
    /// The smallest box containing every point, or `None` if there is none.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Aabb> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(Aabb { mins: first, maxs: first }, |aabb, p| Aabb {
            mins: aabb.mins.min(*p),
            maxs: aabb.maxs.max(*p),
        }))
    }

    /// Centre of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.mins + self.maxs) * 0.5
    }

    /// Size of the box along each axis.
    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.maxs - self.mins
    }

    /// Is the box thinner than `epsilon` along at least one axis?
    #[inline]
    pub fn is_flat(&self, epsilon: f32) -> bool {
        self.extents().min_element() < epsilon
    }
}

/// Geometric description of a mesh.
///
/// Coordinates, normals and texture coordinates are indexed together.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderMesh {
    /// Coordinates of the mesh vertices.
    pub coords: Vec<Vec3>,
    /// Normals of the mesh vertices.
    pub normals: Vec<Vec3>,
    /// Texture coordinates of the mesh vertices.
    pub uvs: Vec<Vec2>,
    /// Counter-clockwise triangles.
    pub indices: Vec<[u32; 3]>,
}

impl RenderMesh {
    /// Creates a new mesh.
    ///
    /// Missing texture coordinates default to zero.
    pub fn new(
        coords: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Option<Vec<Vec2>>,
        indices: Vec<[u32; 3]>,
    ) -> RenderMesh {
        debug_assert_eq!(coords.len(), normals.len());
        let uvs = uvs.unwrap_or_else(|| vec![Vec2::ZERO; coords.len()]);

        RenderMesh {
            coords,
            normals,
            uvs,
            indices,
        }
    }

    /// The number of triangles on this mesh.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.indices.len()
    }

    /// The index buffer, three indices per triangle.
    #[inline]
    pub fn flat_indices(&self) -> Vec<u32> {
        self.indices.iter().flatten().copied().collect()
    }

    /// The interleaved vertex buffer.
    pub fn vertices(&self) -> Vec<Vertex> {
        self.coords
            .iter()
            .zip(&self.normals)
            .zip(&self.uvs)
            .map(|((c, n), uv)| Vertex::new(*c, *n, *uv))
            .collect()
    }

    /// The bounding box of the vertices.
    pub fn aabb(&self) -> Option<Aabb> {
        Aabb::from_points(&self.coords)
    }

    /// Transforms each vertex of this mesh. Normals follow the inverse transpose.
    pub fn transform_by(&mut self, t: &Mat4) {
        for c in self.coords.iter_mut() {
            *c = t.transform_point3(*c);
        }

        let normal_matrix = Mat3::from_mat4(*t).inverse().transpose();
        for n in self.normals.iter_mut() {
            *n = (normal_matrix * *n).normalize();
        }
    }

    /// Scales each vertex of this mesh.
    pub fn scale_by(&mut self, s: Vec3) {
        self.transform_by(&Mat4::from_scale(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_of_points() {
        let points = [
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-1.0, 3.0, 0.0),
            Vec3::new(0.5, 0.0, 0.0),
        ];
        let aabb = Aabb::from_points(&points).unwrap();
        assert_eq!(aabb.mins, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.maxs, Vec3::new(1.0, 3.0, 0.0));
        assert_eq!(aabb.center(), Vec3::new(0.0, 0.5, 0.0));
        assert!(aabb.is_flat(1.0e-5));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn non_uniform_scale_keeps_normals_perpendicular() {
        let mut mesh = RenderMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::new(1.0, 1.0, 0.0).normalize(); 3],
            None,
            vec![[0, 1, 2]],
        );
        mesh.scale_by(Vec3::new(2.0, 1.0, 1.0));

        let tangent = Vec3::new(2.0, -1.0, 0.0);
        assert_relative_eq!(mesh.normals[0].dot(tangent), 0.0, epsilon = 1.0e-6);
        assert_relative_eq!(mesh.normals[0].length(), 1.0, epsilon = 1.0e-6);
    }
}
