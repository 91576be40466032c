//! Scene descriptions and their GPU-side counterpart.

pub use self::description::{
    CameraDescription, MaterialDescription, NodeDescription, SceneDescription, TextureSource,
};
pub use self::scene::{
    Material, Object, ObjectUniform, ReflectionKind, ReflectionTarget, ReflectiveRef, Scene,
};

mod description;
#[allow(clippy::module_inception)]
mod scene;
