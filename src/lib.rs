/*!
# deferred3d

A deferred renderer on wgpu: a G-buffer geometry pass, additive lighting from point and spot
lights with shadow maps, planar and cube-map reflections, and an HDR post-process chain with
bloom.

A frame runs four passes, in the order resolved by the render-target graph:

* **shadow**: point lights render to a cube-map array and spot lights to a 2D array, in one
  layered draw per kind. Transparent objects additionally tint a colour array.
* **reflection**: every planar mirror renders the scene through the camera reflected in its
  plane, every cube-mapped object renders the six faces around its centre.
* **deferred**: objects fill the G-buffer, then one full-screen draw accumulates the lights.
* **post-process**: luminance and bloom extraction, a separable blur, tone mapping.

Everything GPU-side goes through the [`RenderDevice`](gpu::RenderDevice) trait. The
[`WgpuDevice`](gpu::WgpuDevice) draws to a window; the [`HeadlessDevice`](gpu::HeadlessDevice)
records the same calls on the CPU and checks the invariants a driver would reject, which is
what the tests run against.

Opening a window on a small scene:

```no_run
use deferred3d::prelude::*;

fn main() -> deferred3d::Result<()> {
    let mut scene = SceneDescription::new();
    let cube = scene.add_mesh(procedural::unit_cuboid());
    let red = scene.add_material(MaterialDescription::solid(Vec3::X, Vec3::ONE, 0.3));
    let _ = scene.add_node(cube, red, Mat4::IDENTITY);
    scene.add_point_light(PointLight::new(Vec3::new(0.0, 3.0, 3.0), Vec3::ONE));

    MainLoop::run(RenderSettings::default().with_title("cube"), scene)
}
```

Keys: `W`/`A`/`S`/`D` move, `Shift+Z` captures the mouse to look around, the wheel zooms,
`1` to `7` pick the displayed buffer and `Escape` quits.
*/
#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]

#[macro_use]
extern crate bitflags;
#[cfg(feature = "serde")]
extern crate serde;

pub use glamx;

pub use crate::error::{Error, Result};

pub mod binding;
pub mod builtin;
pub mod camera;
pub mod context;
pub mod error;
pub mod gpu;
pub mod light;
pub mod math;
pub mod procedural;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod settings;
pub mod shader;
#[cfg(not(target_arch = "wasm32"))]
pub mod window;

pub mod prelude {
    pub use crate::camera::{FirstPersonCamera3d, MoveKey};
    pub use crate::gpu::{Gpu, HeadlessDevice, RenderDevice, Severity, WgpuDevice};
    pub use crate::light::{PointLight, SpotLight};
    pub use crate::math::Falloff;
    pub use crate::procedural;
    pub use crate::renderer::Renderer;
    pub use crate::scene::*;
    pub use crate::settings::RenderSettings;
    pub use crate::shader::OutputView;
    #[cfg(not(target_arch = "wasm32"))]
    pub use crate::window::MainLoop;
    pub use glamx::{Mat4, Quat, Vec3, Vec4};
    pub use std::rc::Rc;
}
