//! Error types.
//!
//! Initialisation failures are fatal and propagate to the caller; per-frame problems are
//! reported through the device diagnostic channel instead (see [`crate::gpu::Diagnostic`]).

/// Failures raised by a [`RenderDevice`](crate::gpu::RenderDevice).
#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    #[error("no compatible GPU adapter found: {0}")]
    Adapter(String),
    #[error("failed to acquire a GPU device: {0}")]
    Device(String),
    #[error("failed to create the window surface: {0}")]
    Surface(String),
    #[error("failed to create {what} `{label}`: {reason}")]
    Creation {
        what: &'static str,
        label: String,
        reason: String,
    },
    #[error("invalid texture description for `{label}`: {reason}")]
    InvalidTexture { label: String, reason: String },
}

/// Failures raised while compiling or linking a program.
#[derive(thiserror::Error, Debug)]
pub enum ShaderError {
    #[error("program `{program}` failed to compile:\n{log}")]
    Compile { program: String, log: String },
    #[error("program `{program}` failed to link:\n{log}")]
    Link { program: String, log: String },
}

/// Failures raised while turning a scene description into GPU resources.
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("node {node} references mesh {mesh} but the scene only has {count} meshes")]
    MissingMesh { node: usize, mesh: usize, count: usize },
    #[error("node {node} references material {material} but the scene only has {count} materials")]
    MissingMaterial {
        node: usize,
        material: usize,
        count: usize,
    },
    #[error("mesh {0} has no triangles")]
    EmptyMesh(usize),
    #[error("the scene has {count} {kind} lights, at most {max} are supported")]
    TooManyLights {
        kind: &'static str,
        count: usize,
        max: usize,
    },
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Any error produced by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("pass graph has a dependency cycle through `{0}`")]
    PassCycle(&'static str),
    #[error("failed to read a scene file: {0}")]
    Io(#[from] std::io::Error),
    #[error("event loop error: {0}")]
    EventLoop(String),
}

pub type Result<T> = std::result::Result<T, Error>;
