//! Built-in WGSL sources.
//!
//! Every program is assembled from [`COMMON_SRC`], which declares the binding table and the
//! per-draw constants, followed by its own stages. Quad programs also include [`QUAD_SRC`].

/// Binding table, vertex input and helpers shared by every program.
pub static COMMON_SRC: &str = include_str!("common.wgsl");
/// Full-screen quad vertex stage.
pub static QUAD_SRC: &str = include_str!("quad.wgsl");
/// Geometry pass.
pub static GBUFFER_SRC: &str = include_str!("gbuffer.wgsl");
/// Lighting accumulation pass.
pub static DEFERRED_LIGHTING_SRC: &str = include_str!("deferred_lighting.wgsl");
/// Shadow depth and shadow transparency passes.
pub static SHADOW_SRC: &str = include_str!("shadow.wgsl");
/// Luminance and bloom extraction.
pub static POST_PROCESS_INIT_SRC: &str = include_str!("post_process_init.wgsl");
/// Separable bloom blur.
pub static GAUSSIAN_BLUR_SRC: &str = include_str!("gaussian_blur.wgsl");
/// Tone mapping and composite.
pub static POST_PROCESS_SRC: &str = include_str!("post_process.wgsl");
/// Mipmap downsampling, used by the wgpu backend only.
pub static BLIT_SRC: &str = include_str!("blit.wgsl");
