//! GPU resources: meshes, textures and render targets.

pub use self::framebuffer_graph::{
    FrameResource, FramebufferGraph, GBuffer, Pass, PassGraph, PostProcessTargets,
    ShadowTargets, BLOOM_LEVELS,
};
pub use self::mesh::GpuMesh;

mod framebuffer_graph;
mod mesh;
pub mod texture;
