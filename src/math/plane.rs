use glamx::{Mat4, Vec3, Vec4};

/// A plane `normal · p + offset = 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane {
    /// Plane normal. Not necessarily unit length.
    pub normal: Vec3,
    /// Signed offset along the normal.
    pub offset: f32,
}

impl Plane {
    /// Creates a plane from its normal and offset.
    pub fn new(normal: Vec3, offset: f32) -> Self {
        Plane { normal, offset }
    }

    /// The plane with normal `normal` passing through `point`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Plane {
            normal,
            offset: normal.dot(-point),
        }
    }

    /// Reads a plane stored as `(normal, offset)`.
    pub fn from_vec4(v: Vec4) -> Self {
        Plane {
            normal: v.truncate(),
            offset: v.w,
        }
    }

    /// The plane as `(normal, offset)`, the form expected by clip-plane math.
    pub fn to_vec4(self) -> Vec4 {
        self.normal.extend(self.offset)
    }

    /// Rescales the equation so that the normal has unit length.
    pub fn normalized(self) -> Self {
        let len = self.normal.length();
        Plane {
            normal: self.normal / len,
            offset: self.offset / len,
        }
    }

    /// Maps a plane through an affine transform.
    ///
    /// Planes are covectors, so they transform by the inverse transpose. This stays exact
    /// under non-uniform scaling.
    pub fn transformed(self, transform: &Mat4) -> Self {
        let v = transform.inverse().transpose() * self.to_vec4();
        Plane::from_vec4(v).normalized()
    }

    /// Signed distance from `point` to the plane, positive on the normal side.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (self.normal.dot(point) + self.offset) / self.normal.length()
    }

    /// Mirror image of a point.
    pub fn reflect_point(&self, point: Vec3) -> Vec3 {
        let n = self.normal.normalize();
        point - 2.0 * self.signed_distance(point) * n
    }

    /// Mirror image of a direction.
    pub fn reflect_vector(&self, v: Vec3) -> Vec3 {
        let n = self.normal.normalize();
        v - 2.0 * v.dot(n) * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glamx::Quat;

    #[test]
    fn translated_plane_keeps_its_normal() {
        let local = Plane::new(Vec3::Y, 0.0);
        let world = local.transformed(&Mat4::from_translation(Vec3::new(3.0, 2.0, -1.0)));

        assert!(world.normal.abs_diff_eq(Vec3::Y, 1.0e-6));
        assert_relative_eq!(world.offset, -2.0, epsilon = 1.0e-6);
        assert_relative_eq!(world.signed_distance(Vec3::new(0.0, 5.0, 0.0)), 3.0, epsilon = 1.0e-5);
    }

    #[test]
    fn rotated_and_scaled_plane_stays_on_the_surface() {
        let local = Plane::from_point_normal(Vec3::new(0.0, 0.5, 0.0), Vec3::Y);
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(4.0, 2.0, 0.5),
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 1.0, 1.0),
        );
        let world = local.transformed(&transform);

        let on_plane = transform.transform_point3(Vec3::new(0.3, 0.5, -0.7));
        assert_relative_eq!(world.signed_distance(on_plane), 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(world.normal.length(), 1.0, epsilon = 1.0e-6);
    }

    #[test]
    fn reflection_flips_across_the_plane() {
        let plane = Plane::new(Vec3::Y, -1.0);
        assert!(plane
            .reflect_point(Vec3::new(2.0, 4.0, 0.0))
            .abs_diff_eq(Vec3::new(2.0, -2.0, 0.0), 1.0e-6));
        assert!(plane
            .reflect_vector(Vec3::new(1.0, -1.0, 0.0))
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1.0e-6));
    }
}
