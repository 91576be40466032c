//! Planar and cube-map reflections.
//!
//! Both kinds render the scene again through [`render_deferred`], with the reflective object
//! itself left out, into the object's reflection texture. Cube passes first refresh the
//! mirrors they can see so that a mirror seen in a cube map is at most one render old.

use super::deferred::render_deferred;
use super::RenderContext;
use crate::binding::UniformSlot;
use crate::camera::CameraUniform;
use crate::gpu::AttachmentTarget;
use crate::math::{CubeFace, Eye, ReflectionCamera};
use crate::scene::{ReflectionKind, ReflectiveRef};

/// Renders the reflection of `eye` in a planar object and stores the view-projection used, so
/// that the geometry pass can project the mirror onto its texture.
///
/// Leaves the reflection camera bound to the camera slot.
pub fn render_planar_reflection(ctx: &RenderContext, reflective: &ReflectiveRef, eye: &Eye) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();
    let object = &scene.objects()[reflective.object];
    let Some(target) = object.reflection() else {
        return;
    };

    let plane = scene.world_plane(reflective);
    let camera = ReflectionCamera::planar(eye, &plane);
    let view_projection = camera.view_projection();
    log::trace!("planar reflection of object {}", reflective.object);

    ctx.reflection_camera_buffer()
        .write_value(&CameraUniform::new(view_projection, camera.eye.position));
    gpu.bind_uniform_buffer(UniformSlot::Camera, ctx.reflection_camera_buffer().id());
    if let Some(buffer) = target.view_projection() {
        buffer.write_value(&view_projection.to_cols_array_2d());
    }

    let texture = target.texture().id();
    render_deferred(
        ctx,
        ctx.targets().primary(),
        Some(reflective.object),
        Some(AttachmentTarget::new(texture)),
    );
    gpu.generate_mipmaps(texture);
}

/// Renders the six faces of a cube-mapped object's reflection from its centre.
///
/// While `depth` is below the configured reflection depth, every mirror is first refreshed
/// through the cube face closest to it. Leaves the reflection camera bound to the camera slot.
pub fn render_environment_reflection(
    ctx: &RenderContext,
    reflective: &ReflectiveRef,
    near: f32,
    far: f32,
    depth: u32,
) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();
    let object = &scene.objects()[reflective.object];
    let Some(target) = object.reflection() else {
        return;
    };
    let position = scene.world_centre(reflective);
    log::trace!("environment reflection of object {} at depth {depth}", reflective.object);

    if depth < ctx.settings().reflection_depth() {
        for mirror in scene
            .reflective()
            .iter()
            .filter(|r| r.kind == ReflectionKind::Planar)
        {
            let mirror_position = scene.objects()[mirror.object]
                .transform()
                .w_axis
                .truncate();
            let face = CubeFace::closest_to((mirror_position - position).normalize_or_zero());
            render_planar_reflection(ctx, mirror, &face.eye(position, near, far));
        }
    }

    gpu.bind_uniform_buffer(UniformSlot::Camera, ctx.reflection_camera_buffer().id());
    let texture = target.texture().id();
    for face in CubeFace::ALL {
        let view_projection = face.eye(position, near, far).view_projection();
        ctx.reflection_camera_buffer()
            .write_value(&CameraUniform::new(view_projection, position));
        render_deferred(
            ctx,
            ctx.targets().environment(),
            Some(reflective.object),
            Some(AttachmentTarget::new(texture).face(face)),
        );
    }
    gpu.generate_mipmaps(texture);
}

/// Refreshes every mirror as seen from `eye`, then rebinds the main camera.
pub fn refresh_planar_reflections(ctx: &RenderContext, eye: &Eye) {
    for reflective in ctx
        .scene()
        .reflective()
        .iter()
        .filter(|r| r.kind == ReflectionKind::Planar)
    {
        render_planar_reflection(ctx, reflective, eye);
    }
    ctx.defaults()
        .restore(ctx.gpu().as_ref(), &[UniformSlot::Camera]);
}

/// Refreshes every cube-mapped reflection, then rebinds the main camera.
pub fn refresh_environment_reflections(ctx: &RenderContext, near: f32, far: f32) {
    for reflective in ctx
        .scene()
        .reflective()
        .iter()
        .filter(|r| r.kind == ReflectionKind::Cube)
    {
        render_environment_reflection(ctx, reflective, near, far, 0);
    }
    ctx.defaults()
        .restore(ctx.gpu().as_ref(), &[UniformSlot::Camera]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Contents, HeadlessDevice, RenderDevice};
    use crate::renderer::test_scene;
    use crate::settings::mip_levels;
    use glamx::{Mat4, Vec3};
    use std::rc::Rc;

    fn eye(position: Vec3, direction: Vec3) -> Eye {
        Eye {
            position,
            direction,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 2.0,
            near: 0.1,
            far: 100.0,
        }
    }

    #[test]
    fn planar_reflection_draws_into_a_mipmapped_texture() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let mirror = ctx.scene().reflective()[0];
        assert_eq!(mirror.kind, ReflectionKind::Planar);
        let texture = ctx.scene().objects()[mirror.object]
            .reflection()
            .unwrap()
            .texture();
        assert_eq!(device.contents(texture.id(), 0, 0), Some(Contents::Undefined));

        let from = eye(Vec3::new(0.0, 2.0, 10.0), Vec3::new(0.0, -0.2, -1.0).normalize());
        refresh_planar_reflections(&ctx, &from);

        assert!(device.contents(texture.id(), 0, 0).unwrap().has_content());
        assert_eq!(texture.levels(), mip_levels(32));
        assert_eq!(texture.levels(), 5);
        for level in 1..texture.levels() {
            assert!(matches!(
                device.contents(texture.id(), level, 0),
                Some(Contents::Downsampled(_))
            ));
        }
        assert_eq!(
            device.uniform_binding(UniformSlot::Camera),
            Some(ctx.camera_buffer().id())
        );
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn planar_reflection_stores_its_view_projection() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let mirror = ctx.scene().reflective()[0];
        let from = eye(Vec3::new(0.0, 3.0, 6.0), Vec3::new(0.0, -0.5, -1.0).normalize());
        render_planar_reflection(&ctx, &mirror, &from);

        let plane = ctx.scene().world_plane(&mirror);
        let expected = ReflectionCamera::planar(&from, &plane).view_projection();
        let buffer = ctx.scene().objects()[mirror.object]
            .reflection()
            .unwrap()
            .view_projection()
            .unwrap();
        let data = device.buffer_data(buffer.id()).unwrap();
        let stored = Mat4::from_cols_array_2d(&bytemuck::pod_read_unaligned(&data));
        assert!(stored.abs_diff_eq(expected, 1.0e-5));

        let gbuffer_draws: Vec<_> = device
            .draws()
            .into_iter()
            .filter(|d| d.program_name == "gbuffer")
            .collect();
        assert_eq!(gbuffer_draws.len(), ctx.scene().objects().len() - 1);
        assert!(gbuffer_draws
            .iter()
            .all(|d| d.uniform_buffer(UniformSlot::Camera)
                == Some(ctx.reflection_camera_buffer().id())));
    }

    #[test]
    fn environment_reflection_renders_every_face() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let cube = *ctx
            .scene()
            .reflective()
            .iter()
            .find(|r| r.kind == ReflectionKind::Cube)
            .unwrap();
        let texture = ctx.scene().objects()[cube.object]
            .reflection()
            .unwrap()
            .texture();
        device.clear_commands();

        refresh_environment_reflections(&ctx, 0.1, 100.0);

        for face in CubeFace::ALL {
            assert!(device.contents(texture.id(), 0, face.layer()).unwrap().has_content());
        }
        let lighting: Vec<_> = device
            .draws()
            .into_iter()
            .filter(|d| d.program_name == "deferred_lighting")
            .collect();
        // One mirror refreshed through its closest face, then the six faces.
        assert_eq!(lighting.len(), 1 + 6);
        assert_eq!(lighting[0].viewport, (32, 16));
        assert!(lighting[1..].iter().all(|d| d.viewport == (16, 16)));
        assert_eq!(
            device.uniform_binding(UniformSlot::Camera),
            Some(ctx.camera_buffer().id())
        );
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn nested_cube_passes_do_not_refresh_mirrors() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let cube = *ctx
            .scene()
            .reflective()
            .iter()
            .find(|r| r.kind == ReflectionKind::Cube)
            .unwrap();
        device.clear_commands();

        render_environment_reflection(&ctx, &cube, 0.1, 100.0, 1);
        let lighting = device
            .draws()
            .iter()
            .filter(|d| d.program_name == "deferred_lighting")
            .count();
        assert_eq!(lighting, 6);
    }
}
