//! End-to-end checks of the passes through the public API, on the CPU-side device.

use deferred3d::binding::UniformSlot;
use deferred3d::gpu::{AttachmentPoint, AttachmentTarget, Contents, HeadlessDevice};
use deferred3d::prelude::*;
use deferred3d::renderer::{
    refresh_planar_reflections, render_deferred, InverseResolution, RenderContext,
};
use deferred3d::resource::{FrameResource, Pass, PassGraph};
use deferred3d::Error;
use std::f32::consts::FRAC_PI_4;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 32;
const EYE: Vec3 = Vec3::new(0.0, 3.0, 10.0);

fn settings() -> RenderSettings {
    RenderSettings::default().with_size(WIDTH, HEIGHT)
}

/// One mirror, one pedestal and a lamp, seen from above the mirror and ten units away.
fn mirror_room() -> SceneDescription {
    let mut scene = SceneDescription::new();
    let floor = scene.add_mesh(procedural::plane(8.0, 8.0, 1, 1));
    let cube = scene.add_mesh(procedural::unit_cuboid());

    let mirror = scene.add_material(
        MaterialDescription::solid(Vec3::splat(0.5), Vec3::ONE, 0.0).with_reflectivity(1.0),
    );
    let matte = scene.add_material(MaterialDescription::solid(
        Vec3::new(0.2, 0.4, 0.8),
        Vec3::splat(0.1),
        0.7,
    ));
    let lamp = scene.add_material(
        MaterialDescription::solid(Vec3::ONE, Vec3::ZERO, 1.0).with_emissive(2.0),
    );

    let _ = scene.add_node(floor, mirror, Mat4::IDENTITY);
    let _ = scene.add_node(cube, matte, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    let _ = scene.add_node(cube, lamp, Mat4::from_translation(Vec3::new(2.0, 3.0, -1.0)));
    scene.add_point_light(
        PointLight::new(Vec3::new(0.0, 4.0, 2.0), Vec3::ONE)
            .with_falloff(Falloff::new(1.0, 0.1, 0.02)),
    );
    scene.add_spot_light(SpotLight::looking_at(
        Vec3::new(-3.0, 5.0, 3.0),
        Vec3::ZERO,
        Vec3::splat(0.8),
        0.5,
    ));
    scene.set_camera(CameraDescription {
        position: EYE,
        direction: (Vec3::ZERO - EYE).normalize(),
        fov: FRAC_PI_4,
        near: 0.1,
        far: 100.0,
    });
    scene
}

fn context(device: &Rc<HeadlessDevice>) -> RenderContext {
    let gpu: Gpu = device.clone();
    let scene = Scene::load(&gpu, &mirror_room(), &settings()).unwrap();
    RenderContext::new(&gpu, scene, settings()).unwrap()
}

fn renderer(device: &Rc<HeadlessDevice>) -> Renderer {
    let gpu: Gpu = device.clone();
    let scene = Scene::load(&gpu, &mirror_room(), &settings()).unwrap();
    Renderer::new(&gpu, scene, settings()).unwrap()
}

#[test]
fn scene_objects_are_classified_by_shape() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let gpu: Gpu = device.clone();
    let scene = Scene::load(&gpu, &mirror_room(), &settings()).unwrap();

    let kinds: Vec<_> = scene
        .objects()
        .iter()
        .map(|o| o.reflection_kind())
        .collect();
    assert_eq!(
        kinds,
        vec![ReflectionKind::Planar, ReflectionKind::None, ReflectionKind::None]
    );
    assert!(scene.objects()[2].is_emissive());
    assert!(scene.transparent().is_empty());
    assert_eq!(scene.reflective().len(), 1);
}

#[test]
fn geometry_pass_is_idempotent() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let ctx = context(&device);
    let gbuffer = ctx.targets().primary();
    let snapshot = || {
        [
            gbuffer.depth().id(),
            gbuffer.accumulation().id(),
            gbuffer.normal().id(),
            gbuffer.diffuse().id(),
            gbuffer.specular_roughness().id(),
        ]
        .map(|texture| device.contents(texture, 0, 0).unwrap())
    };

    render_deferred(&ctx, gbuffer, None, None);
    let first = snapshot();
    render_deferred(&ctx, gbuffer, None, None);
    let second = snapshot();

    assert!(first.iter().all(Contents::has_content));
    assert_eq!(first, second);
    assert_eq!(device.diagnostics(), vec![]);
}

#[test]
fn planar_reflection_fills_a_full_mip_chain() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let ctx = context(&device);
    let mirror = ctx.scene().reflective()[0];
    let texture = ctx.scene().objects()[mirror.object]
        .reflection()
        .unwrap()
        .texture();
    assert_eq!(device.contents(texture.id(), 0, 0), Some(Contents::Undefined));

    let eye = ctx.scene().camera().eye();
    assert!(ctx.scene().world_plane(&mirror).signed_distance(eye.position) > 0.0);
    refresh_planar_reflections(&ctx, &eye);

    let base = device.contents(texture.id(), 0, 0).unwrap();
    assert!(base.has_content());
    assert_ne!(base, Contents::Cleared);
    // ceil(log2(64))
    assert_eq!(texture.levels(), 6);
    for level in 1..texture.levels() {
        assert!(matches!(
            device.contents(texture.id(), level, 0),
            Some(Contents::Downsampled(_))
        ));
    }
}

#[test]
fn mirror_sees_the_pedestal_above_it() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let ctx = context(&device);
    let mirror = ctx.scene().reflective()[0];
    refresh_planar_reflections(&ctx, &ctx.scene().camera().eye());

    let buffer = ctx.scene().objects()[mirror.object]
        .reflection()
        .unwrap()
        .view_projection()
        .unwrap();
    let data = device.buffer_data(buffer.id()).unwrap();
    let view_projection = Mat4::from_cols_array_2d(&bytemuck::pod_read_unaligned(&data));
    let ndc = |point: Vec3| view_projection.project_point3(point);

    // The pedestal centre, one unit above the mirror.
    let pedestal = ndc(Vec3::new(0.0, 1.0, 0.0));
    assert!(pedestal.x.abs() <= 1.0 && pedestal.y.abs() <= 1.0, "{pedestal:?}");
    assert!(pedestal.z > -1.0 && pedestal.z < 1.0, "{pedestal:?}");
    // Anything under the mirror falls in front of the oblique near plane.
    assert!(ndc(Vec3::new(0.0, -1.0, 0.0)).z < -1.0);
}

#[test]
fn output_override_is_undone_after_the_pass() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let ctx = context(&device);
    let gbuffer = ctx.targets().primary();
    let mirror = ctx.scene().reflective()[0];
    let texture = ctx.scene().objects()[mirror.object]
        .reflection()
        .unwrap()
        .texture()
        .id();

    render_deferred(&ctx, gbuffer, Some(mirror.object), Some(AttachmentTarget::new(texture)));

    let lighting = device
        .draws()
        .into_iter()
        .find(|d| d.program_name == "deferred_lighting")
        .unwrap();
    assert!(lighting.writes(texture));
    assert_eq!(
        device.attachment(gbuffer.lighting().id(), AttachmentPoint::Color(0)),
        Some(AttachmentTarget::new(gbuffer.accumulation().id()))
    );
}

#[test]
fn persistent_bindings_survive_a_frame() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let mut renderer = renderer(&device);
    assert!(renderer.render_frame());
    assert!(renderer.render_frame());

    assert_eq!(renderer.verify_bindings(), Ok(()));
    let ctx = renderer.context();
    for (slot, expected) in [
        (UniformSlot::Camera, ctx.camera_buffer().id()),
        (
            UniformSlot::ShadowViewProjection,
            ctx.shadow_buffers().spot_view_projections().id(),
        ),
        (
            UniformSlot::ShadowPositions,
            ctx.shadow_buffers().spot_positions().id(),
        ),
    ] {
        assert_eq!(device.uniform_binding(slot), Some(expected), "{slot:?}");
    }
    assert!(device.surface_contents().has_content());
    assert_eq!(device.diagnostics(), vec![]);
}

#[test]
fn blur_draws_see_half_resolution() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let mut renderer = renderer(&device);
    device.clear_commands();
    assert!(renderer.render_frame());

    let read = |data: &[u8]| bytemuck::pod_read_unaligned::<InverseResolution>(data).value;
    let blur: Vec<_> = device
        .draws()
        .into_iter()
        .filter(|d| d.program_name == "gaussian_blur")
        .collect();
    for draw in &blur {
        assert_eq!(draw.viewport, (WIDTH / 2, HEIGHT / 2));
        let data = draw.uniform(UniformSlot::InverseResolution).unwrap();
        assert_eq!(read(data), [2.0 / WIDTH as f32, 2.0 / HEIGHT as f32]);
    }
    let restored = device
        .buffer_data(renderer.context().inverse_resolution_buffer().id())
        .unwrap();
    assert_eq!(read(&restored), [1.0 / WIDTH as f32, 1.0 / HEIGHT as f32]);
    assert_eq!(blur.len(), 2 * settings().bloom_iterations as usize);
}

#[test]
fn frame_passes_follow_their_dependencies() {
    let order = PassGraph::frame().resolve().unwrap();
    assert_eq!(
        order,
        vec![Pass::Shadow, Pass::Reflection, Pass::Deferred, Pass::PostProcess]
    );

    let mut cyclic = PassGraph::new();
    cyclic
        .declare(Pass::Deferred, &[FrameResource::Bloom], &[FrameResource::Accumulation])
        .declare(Pass::PostProcess, &[FrameResource::Accumulation], &[FrameResource::Bloom]);
    assert!(matches!(cyclic.resolve(), Err(Error::PassCycle(_))));
}

#[test]
fn dropping_the_renderer_releases_every_resource() {
    let device = Rc::new(HeadlessDevice::new(WIDTH, HEIGHT));
    let mut renderer = renderer(&device);
    assert!(renderer.render_frame());
    let (textures, buffers, framebuffers, programs) = device.live_resources();
    assert!(textures > 0 && buffers > 0 && framebuffers > 0 && programs > 0);

    drop(renderer);
    assert_eq!(device.live_resources(), (0, 0, 0, 0));
}
