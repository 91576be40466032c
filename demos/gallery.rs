//! A mirror-floored gallery: a chrome sphere, a glass cube, a glowing lamp and a few pedestals,
//! lit by two point lights and a spot light.
//!
//! Run with `RUST_LOG=deferred3d=debug` to see the pass order and resource creation.

use deferred3d::prelude::*;
use std::f32::consts::FRAC_PI_4;

fn main() -> deferred3d::Result<()> {
    env_logger::init();

    let mut scene = SceneDescription::new();
    let floor = scene.add_mesh(procedural::plane(20.0, 20.0, 4, 4));
    let ball = scene.add_mesh(procedural::sphere(48, 32));
    let cube = scene.add_mesh(procedural::unit_cuboid());
    let pyramid = scene.add_mesh(procedural::pyramid());
    let mut pillar = procedural::unit_cuboid();
    pillar.scale_by(Vec3::new(1.0, 2.0, 1.0));
    let pillar = scene.add_mesh(pillar);

    let mirror = scene.add_material(
        MaterialDescription::solid(Vec3::splat(0.6), Vec3::ONE, 0.05).with_reflectivity(1.0),
    );
    let chrome = scene.add_material(
        MaterialDescription::solid(Vec3::splat(0.9), Vec3::ONE, 0.1).with_reflectivity(1.0),
    );
    let glass = scene.add_material(MaterialDescription::imported(
        Vec3::new(0.3, 0.7, 0.9),
        Vec3::ONE,
        Vec3::ZERO,
        0.1,
        0.35,
        0.0,
    ));
    let lamp = scene.add_material(
        MaterialDescription::solid(Vec3::new(1.0, 0.9, 0.7), Vec3::ZERO, 1.0).with_emissive(4.0),
    );
    let stone = scene.add_material(MaterialDescription::solid(
        Vec3::new(0.55, 0.5, 0.45),
        Vec3::splat(0.15),
        0.8,
    ));
    let brick = scene.add_material(MaterialDescription::solid(
        Vec3::new(0.7, 0.25, 0.15),
        Vec3::splat(0.3),
        0.5,
    ));

    let _ = scene.add_node(floor, mirror, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
    let _ = scene.add_node(ball, chrome, Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)));
    let _ = scene.add_node(
        cube,
        glass,
        Mat4::from_scale_rotation_translation(
            Vec3::splat(1.5),
            Quat::from_rotation_y(FRAC_PI_4),
            Vec3::new(-3.0, -0.25, 1.0),
        ),
    );
    let _ = scene.add_node(
        cube,
        lamp,
        Mat4::from_scale_rotation_translation(
            Vec3::splat(0.4),
            Quat::IDENTITY,
            Vec3::new(0.0, 4.0, -3.0),
        ),
    );
    for (i, x) in [-5.0, 5.0].into_iter().enumerate() {
        let material = if i == 0 { stone } else { brick };
        let _ = scene.add_node(pillar, material, Mat4::from_translation(Vec3::new(x, 0.0, -2.0)));
        let _ = scene.add_node(
            pyramid,
            material,
            Mat4::from_translation(Vec3::new(x, 1.5, -2.0)),
        );
    }

    scene.add_point_light(
        PointLight::new(Vec3::new(0.0, 4.0, -3.0), Vec3::new(2.0, 1.8, 1.4))
            .with_falloff(Falloff::new(1.0, 0.09, 0.032)),
    );
    scene.add_point_light(
        PointLight::new(Vec3::new(4.0, 2.0, 4.0), Vec3::new(0.4, 0.6, 1.2))
            .with_falloff(Falloff::new(1.0, 0.14, 0.07)),
    );
    scene.add_spot_light(SpotLight::looking_at(
        Vec3::new(-6.0, 7.0, 6.0),
        Vec3::ZERO,
        Vec3::splat(1.5),
        0.5,
    ));
    scene.set_camera(CameraDescription {
        position: Vec3::new(0.0, 2.5, 12.0),
        direction: Vec3::new(0.0, -0.15, -1.0).normalize(),
        fov: FRAC_PI_4,
        near: 0.1,
        far: 100.0,
    });

    let settings = RenderSettings::default()
        .with_title("deferred3d: gallery")
        .with_size(1280, 720);
    MainLoop::run(settings, scene)
}
