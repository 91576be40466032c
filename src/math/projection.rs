use super::Plane;
use glamx::{Mat4, Vec3, Vec4};

/// A viewpoint: where a camera is, where it looks and how it projects.
///
/// The main camera hands one of these to the reflection passes, which derive mirrored or
/// cube-face eyes from it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Eye {
    /// Eye position.
    pub position: Vec3,
    /// Viewing direction.
    pub direction: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Vertical field of view, in radians.
    pub fov: f32,
    /// Width over height.
    pub aspect: f32,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Eye {
    /// The view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    /// The projection matrix.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov, self.aspect, self.near, self.far)
    }

    /// The combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// The eye seen in a mirror lying on `plane`.
    pub fn mirrored(&self, plane: &Plane) -> Eye {
        Eye {
            position: plane.reflect_point(self.position),
            direction: plane.reflect_vector(self.direction),
            up: plane.reflect_vector(self.up),
            ..*self
        }
    }
}

/// Replaces the near plane of `projection` by `clip_plane` (given in view space).
///
/// This is Lengyel's oblique frustum: the third row of the projection is overwritten so that
/// clip-space depth `-1` lies on the plane. The eye must be on the negative side of the plane.
pub fn oblique_near_plane(projection: &Mat4, clip_plane: Vec4) -> Mat4 {
    fn sign(v: f32) -> f32 {
        if v > 0.0 {
            1.0
        } else if v < 0.0 {
            -1.0
        } else {
            0.0
        }
    }

    let p = *projection;
    let q = Vec4::new(
        (sign(clip_plane.x) + p.z_axis.x) / p.x_axis.x,
        (sign(clip_plane.y) + p.z_axis.y) / p.y_axis.y,
        -1.0,
        (1.0 + p.z_axis.z) / p.w_axis.z,
    );
    let c = clip_plane * (2.0 / clip_plane.dot(q));

    let mut result = p;
    result.x_axis.z = c.x;
    result.y_axis.z = c.y;
    result.z_axis.z = c.z + 1.0;
    result.w_axis.z = c.w;
    result
}

/// The camera used to render a planar reflection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReflectionCamera {
    /// The mirrored eye.
    pub eye: Eye,
    /// Mirrored view matrix.
    pub view: Mat4,
    /// Projection with its near plane moved onto the mirror.
    pub projection: Mat4,
}

impl ReflectionCamera {
    /// Builds the reflection of `eye` in the world-space mirror `plane`.
    ///
    /// The far plane is doubled: reflected geometry can be up to twice as far as what the
    /// original eye sees.
    pub fn planar(eye: &Eye, plane: &Plane) -> Self {
        let mirrored = Eye {
            far: eye.far * 2.0,
            ..eye.mirrored(plane)
        };
        let view = mirrored.view();
        let clip_plane = view.inverse().transpose() * plane.to_vec4();
        let projection = oblique_near_plane(&mirrored.projection(), clip_plane);

        ReflectionCamera {
            eye: mirrored,
            view,
            projection,
        }
    }

    /// The combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// One face of a cube map, in the GL face order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CubeFace {
    PositiveX = 0,
    NegativeX = 1,
    PositiveY = 2,
    NegativeY = 3,
    PositiveZ = 4,
    NegativeZ = 5,
}

impl CubeFace {
    /// All faces, in layer order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face inside a cube texture.
    pub fn layer(self) -> u32 {
        self as u32
    }

    /// Direction the face looks at.
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Up vector of the face, following the cube-map texel orientation.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveX | CubeFace::NegativeX => Vec3::NEG_Y,
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            CubeFace::PositiveZ | CubeFace::NegativeZ => Vec3::NEG_Y,
        }
    }

    /// The face whose direction is closest to `direction`.
    pub fn closest_to(direction: Vec3) -> CubeFace {
        let mut best = CubeFace::PositiveX;
        let mut best_dot = f32::MIN;
        for face in CubeFace::ALL {
            let dot = face.direction().dot(direction);
            if dot > best_dot {
                best = face;
                best_dot = dot;
            }
        }
        best
    }

    /// The 90° square eye looking through this face from `position`.
    pub fn eye(self, position: Vec3, near: f32, far: f32) -> Eye {
        Eye {
            position,
            direction: self.direction(),
            up: self.up(),
            fov: std::f32::consts::FRAC_PI_2,
            aspect: 1.0,
            near,
            far,
        }
    }
}

/// View-projections of the six faces of a cube map centred on `position`.
pub fn cube_face_view_projections(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    CubeFace::ALL.map(|face| face.eye(position, near, far).view_projection())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ndc(m: &Mat4, p: Vec3) -> Vec3 {
        let clip = *m * p.extend(1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn mirror_below_a_downward_camera() {
        let eye = Eye {
            position: Vec3::new(0.0, 5.0, 0.0),
            direction: Vec3::NEG_Y,
            up: Vec3::Z,
            fov: 1.0,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
        };
        let mirrored = eye.mirrored(&Plane::new(Vec3::Y, 0.0));

        assert!(mirrored.position.abs_diff_eq(Vec3::new(0.0, -5.0, 0.0), 1.0e-6));
        assert!(mirrored.direction.abs_diff_eq(Vec3::Y, 1.0e-6));
        assert!(mirrored.up.abs_diff_eq(Vec3::Z, 1.0e-6));
    }

    #[test]
    fn oblique_plane_on_the_near_plane_keeps_the_projection() {
        let (near, far) = (0.5, 50.0);
        let projection = Mat4::perspective_rh_gl(1.2, 1.5, near, far);
        // View space near plane `-z = near`, facing into the frustum.
        let clip_plane = Vec4::new(0.0, 0.0, -1.0, -near);
        let oblique = oblique_near_plane(&projection, clip_plane);

        assert!(oblique.abs_diff_eq(projection, 1.0e-4));
        let on_near = ndc(&oblique, Vec3::new(0.1, -0.05, -near));
        assert_relative_eq!(on_near.z, -1.0, epsilon = 1.0e-4);
    }

    #[test]
    fn points_on_a_tilted_clip_plane_land_on_the_near_plane() {
        let projection = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let plane = Plane::from_point_normal(
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::new(0.3, 0.2, -1.0).normalize(),
        );
        let oblique = oblique_near_plane(&projection, plane.to_vec4());

        for p in [
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::new(1.0, 0.0, -5.0 + 0.3),
            Vec3::new(0.0, 1.0, -5.0 + 0.2),
        ] {
            assert_relative_eq!(plane.signed_distance(p), 0.0, epsilon = 1.0e-5);
            assert_relative_eq!(ndc(&oblique, p).z, -1.0, epsilon = 1.0e-3);
        }
    }

    #[test]
    fn planar_camera_clips_what_is_behind_the_mirror() {
        let eye = Eye {
            position: Vec3::new(0.0, 3.0, 10.0),
            direction: Vec3::new(0.0, -0.3, -1.0).normalize(),
            up: Vec3::Y,
            fov: 1.0,
            aspect: 1.25,
            near: 0.1,
            far: 100.0,
        };
        let camera = ReflectionCamera::planar(&eye, &Plane::new(Vec3::Y, 0.0));
        let vp = camera.view_projection();

        // Above the mirror: visible. Below: in front of the oblique near plane, clipped.
        assert!(ndc(&vp, Vec3::new(0.0, 1.0, 0.0)).z > -1.0);
        assert!(ndc(&vp, Vec3::new(0.0, -1.0, 0.0)).z < -1.0);
        assert!(camera.eye.position.abs_diff_eq(Vec3::new(0.0, -3.0, 10.0), 1.0e-5));
        assert_eq!(camera.eye.far, 200.0);
    }

    #[test]
    fn cube_faces_look_along_the_six_axes() {
        let views: Vec<Mat4> = CubeFace::ALL
            .iter()
            .map(|face| face.eye(Vec3::new(1.0, 2.0, 3.0), 0.1, 10.0).view())
            .collect();

        let mut seen = Vec::new();
        for (face, view) in CubeFace::ALL.iter().zip(&views) {
            let forward = -view.row(2).truncate();
            let up = view.row(1).truncate();
            assert!(forward.abs_diff_eq(face.direction(), 1.0e-6));
            assert!(up.abs_diff_eq(face.up(), 1.0e-6));
            assert_relative_eq!(forward.dot(up), 0.0);
            seen.push((forward.to_array().map(f32::to_bits), up.to_array().map(f32::to_bits)));
        }

        for i in 0..seen.len() {
            for j in i + 1..seen.len() {
                assert_ne!(seen[i], seen[j]);
            }
        }
    }

    #[test]
    fn closest_face_picks_the_dominant_axis() {
        assert_eq!(
            CubeFace::closest_to(Vec3::new(0.2, -0.9, 0.1)),
            CubeFace::NegativeY
        );
        assert_eq!(CubeFace::closest_to(Vec3::new(-3.0, 1.0, 2.0)), CubeFace::NegativeX);
        assert_eq!(cube_face_view_projections(Vec3::ZERO, 0.1, 10.0).len(), 6);
    }
}
