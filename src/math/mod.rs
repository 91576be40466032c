//! View, projection and attenuation math shared by the shadow and reflection passes.
//!
//! Everything here follows the OpenGL conventions: right-handed view space looking down
//! `-z`, clip-space depth in `[-1, 1]`. The wgpu backend remaps depth in its vertex stages.

pub use self::falloff::{clamped_falloff_distance, falloff_distance, Falloff};
pub use self::plane::Plane;
pub use self::projection::{
    cube_face_view_projections, oblique_near_plane, CubeFace, Eye, ReflectionCamera,
};

mod falloff;
mod plane;
mod projection;
