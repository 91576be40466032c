//! The render passes and the frame driver running them.
//!
//! Every pass is a free function taking the [`RenderContext`]: [`render_shadows`],
//! [`render_planar_reflection`] / [`render_environment_reflection`], [`render_deferred`] and
//! [`render_post_process`]. [`Renderer`] runs them in the order resolved by the pass graph.

pub use self::context::{InverseResolution, Placeholders, RenderContext};
pub use self::deferred::render_deferred;
pub use self::frame::Renderer;
pub use self::post_process::render_post_process;
pub use self::reflection::{
    refresh_environment_reflections, refresh_planar_reflections, render_environment_reflection,
    render_planar_reflection,
};
pub use self::shadow::{
    point_light_far, render_shadows, spot_light_far, spot_view_projection, ShadowBuffers,
};

mod context;
mod deferred;
mod frame;
mod post_process;
mod reflection;
mod shadow;

#[cfg(test)]
pub(crate) mod test_scene {
    use super::{RenderContext, Renderer};
    use crate::gpu::{Gpu, HeadlessDevice};
    use crate::light::{PointLight, SpotLight};
    use crate::math::Falloff;
    use crate::procedural;
    use crate::scene::{
        CameraDescription, MaterialDescription, ReflectionKind, Scene, SceneDescription,
    };
    use crate::settings::RenderSettings;
    use glamx::{Mat4, Vec3};
    use std::rc::Rc;

    pub fn settings() -> RenderSettings {
        RenderSettings::default().with_size(32, 16)
    }

    /// A mirror floor, a chrome ball, a lamp, a glass cube and a matte pyramid, lit by one
    /// point and one spot light.
    pub fn description() -> SceneDescription {
        let mut scene = SceneDescription::new();
        let floor = scene.add_mesh(procedural::plane(10.0, 10.0, 2, 2));
        let ball = scene.add_mesh(procedural::sphere(12, 8));
        let cube = scene.add_mesh(procedural::unit_cuboid());
        let pyramid = scene.add_mesh(procedural::pyramid());

        let mirror = scene.add_material(
            MaterialDescription::solid(Vec3::splat(0.8), Vec3::ONE, 0.05).with_reflectivity(1.0),
        );
        let lamp =
            scene.add_material(MaterialDescription::solid(Vec3::ONE, Vec3::ZERO, 1.0).with_emissive(3.0));
        let glass = scene.add_material(MaterialDescription::imported(
            Vec3::new(0.2, 0.6, 0.9),
            Vec3::ONE,
            Vec3::ZERO,
            0.1,
            0.4,
            0.0,
        ));
        let matte = scene.add_material(MaterialDescription::solid(
            Vec3::new(0.7, 0.3, 0.2),
            Vec3::splat(0.2),
            0.6,
        ));

        let _ = scene.add_node(floor, mirror, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
        let _ = scene.add_node(ball, mirror, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        let _ = scene.add_node(cube, lamp, Mat4::from_translation(Vec3::new(0.0, 3.0, -2.0)));
        let _ = scene.add_node(cube, glass, Mat4::from_translation(Vec3::new(-2.0, 0.0, 0.0)));
        let _ = scene.add_node(pyramid, matte, Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0)));

        scene.add_point_light(
            PointLight::new(Vec3::new(0.0, 3.0, 0.0), Vec3::splat(2.0))
                .with_falloff(Falloff::new(1.0, 0.1, 0.05)),
        );
        scene.add_spot_light(SpotLight::looking_at(
            Vec3::new(3.0, 5.0, 3.0),
            Vec3::ZERO,
            Vec3::ONE,
            0.6,
        ));
        scene.set_camera(CameraDescription {
            position: Vec3::new(0.0, 2.0, 10.0),
            direction: Vec3::new(0.0, -0.2, -1.0).normalize(),
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 100.0,
        });
        scene
    }

    fn load(device: &Rc<HeadlessDevice>) -> (Gpu, Scene) {
        let gpu: Gpu = device.clone();
        let scene = Scene::load(&gpu, &description(), &settings()).unwrap();
        (gpu, scene)
    }

    pub fn context(device: &Rc<HeadlessDevice>) -> RenderContext {
        let (gpu, scene) = load(device);
        RenderContext::new(&gpu, scene, settings()).unwrap()
    }

    pub fn renderer(device: &Rc<HeadlessDevice>) -> Renderer {
        let (gpu, scene) = load(device);
        Renderer::new(&gpu, scene, settings()).unwrap()
    }

    /// Index of the mirror floor.
    pub fn planar_object(ctx: &RenderContext) -> usize {
        ctx.scene()
            .reflective()
            .iter()
            .find(|r| r.kind == ReflectionKind::Planar)
            .map(|r| r.object)
            .unwrap()
    }
}
