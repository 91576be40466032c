//! Procedural mesh generation.

pub use self::cuboid::unit_cuboid;
pub use self::pyramid::pyramid;
pub use self::quad::{plane, SCREEN_QUAD_INDICES, SCREEN_QUAD_VERTICES};
pub use self::render_mesh::{Aabb, RenderMesh};
pub use self::sphere::sphere;
pub use self::vertex::{QuadVertex, Vertex};

mod cuboid;
mod pyramid;
mod quad;
mod render_mesh;
mod sphere;
mod vertex;
