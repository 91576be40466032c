use super::description::{MaterialDescription, SceneDescription, TextureSource};
use crate::camera::FirstPersonCamera3d;
use crate::error::{Error, SceneError};
use crate::gpu::{Buffer, Filter, Gpu, SamplerDesc, Texture, TextureDesc, TextureFormat, TextureKind};
use crate::light::{
    uniform_array, GpuPointLight, GpuSpotLight, PointLight, SpotLight, MAX_POINT_LIGHTS,
    MAX_SPOT_LIGHTS,
};
use crate::math::{clamped_falloff_distance, Plane};
use crate::resource::{texture, GpuMesh};
use crate::settings::{mip_levels, RenderSettings};
use bytemuck::{Pod, Zeroable};
use glamx::{Mat4, Vec3, Vec4};

/// Side of the procedural sky cube.
const SKY_RESOLUTION: u32 = 64;
/// Any bounding-box extent below this makes a reflective mesh a mirror.
const FLAT_EPSILON: f32 = 1.0e-5;

/// Data bound to the object uniform slot.
///
/// Layout must match `Object` in `common.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub emissive: f32,
    _pad0: [f32; 3],
}

impl ObjectUniform {
    /// Packs a model transform and an emissive factor.
    pub fn new(model: Mat4, emissive: f32) -> Self {
        ObjectUniform {
            model: model.to_cols_array_2d(),
            emissive,
            _pad0: [0.0; 3],
        }
    }
}

const _: () = assert!(std::mem::size_of::<ObjectUniform>() == 80);

/// How an object reflects its surroundings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReflectionKind {
    #[default]
    None,
    /// A flat mirror, rendered from the mirrored eye.
    Planar,
    /// Anything else, rendered into a cube map from its centre.
    Cube,
}

/// Textures and flags of a material.
pub struct Material {
    roughness: Texture,
    specular: Texture,
    diffuse: Texture,
    emissive: f32,
    transparent: bool,
    reflective: bool,
}

impl Material {
    /// The diffuse colour and opacity texture.
    #[inline]
    pub fn diffuse(&self) -> &Texture {
        &self.diffuse
    }

    /// The specular colour texture.
    #[inline]
    pub fn specular(&self) -> &Texture {
        &self.specular
    }

    /// The roughness texture.
    #[inline]
    pub fn roughness(&self) -> &Texture {
        &self.roughness
    }

    /// Emitted light, as a multiple of the diffuse colour.
    #[inline]
    pub fn emissive(&self) -> f32 {
        self.emissive
    }

    /// Does light pass through this material?
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// Does this material reflect its surroundings?
    #[inline]
    pub fn is_reflective(&self) -> bool {
        self.reflective
    }
}

/// The render target of a reflective object.
pub struct ReflectionTarget {
    view_projection: Option<Buffer>,
    texture: Texture,
}

impl ReflectionTarget {
    /// The texture the reflection is rendered into: 2D for mirrors, a cube map otherwise.
    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// View-projection of the last planar reflection render, read by the geometry pass to
    /// project the mirror onto its texture. Only mirrors have one.
    #[inline]
    pub fn view_projection(&self) -> Option<&Buffer> {
        self.view_projection.as_ref()
    }
}

/// A mesh instance with its own transform uniform and, when reflective, its own reflection
/// target.
pub struct Object {
    reflection: Option<ReflectionTarget>,
    uniform: Buffer,
    mesh: usize,
    material: usize,
    transform: Mat4,
    kind: ReflectionKind,
    emissive: bool,
    transparent: bool,
}

impl Object {
    /// Index of the mesh in [`Scene::meshes`].
    #[inline]
    pub fn mesh(&self) -> usize {
        self.mesh
    }

    /// Index of the material in [`Scene::materials`].
    #[inline]
    pub fn material(&self) -> usize {
        self.material
    }

    /// Model to world transform.
    #[inline]
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// The buffer bound to the object slot while this object is drawn.
    #[inline]
    pub fn uniform(&self) -> &Buffer {
        &self.uniform
    }

    /// How the object reflects.
    #[inline]
    pub fn reflection_kind(&self) -> ReflectionKind {
        self.kind
    }

    /// The reflection target, for reflective objects.
    #[inline]
    pub fn reflection(&self) -> Option<&ReflectionTarget> {
        self.reflection.as_ref()
    }

    /// Does the object emit light?
    #[inline]
    pub fn is_emissive(&self) -> bool {
        self.emissive
    }

    /// Does light pass through the object?
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }
}

/// A reflective object and the local-space geometry its reflection is computed from.
///
/// `plane_or_position` holds the mirror plane `(normal, offset)` of planar objects and the
/// bounding-box centre `(centre, 1)` of cube-mapped ones.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ReflectiveRef {
    pub object: usize,
    pub kind: ReflectionKind,
    pub plane_or_position: Vec4,
}

/// The GPU resources of a loaded scene.
///
/// Meshes and materials are shared between objects; objects exclusively own their transform
/// uniform and reflection target. Everything is released when the scene is dropped.
pub struct Scene {
    environment: Texture,
    spot_light_buffer: Buffer,
    point_light_buffer: Buffer,
    objects: Vec<Object>,
    materials: Vec<Material>,
    meshes: Vec<GpuMesh>,
    reflective: Vec<ReflectiveRef>,
    transparent: Vec<usize>,
    point_lights: Vec<PointLight>,
    spot_lights: Vec<SpotLight>,
    camera: FirstPersonCamera3d,
}

impl Scene {
    /// Creates the GPU resources described by `description`.
    pub fn load(
        gpu: &Gpu,
        description: &SceneDescription,
        settings: &RenderSettings,
    ) -> Result<Scene, Error> {
        check_light_count("point", description.point_lights.len(), MAX_POINT_LIGHTS)?;
        check_light_count("spot", description.spot_lights.len(), MAX_SPOT_LIGHTS)?;

        let meshes = description
            .meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| {
                if mesh.num_triangles() == 0 || mesh.coords.is_empty() {
                    return Err(Error::from(SceneError::EmptyMesh(i)));
                }
                Ok(GpuMesh::from_render_mesh(gpu, &format!("mesh{i}"), mesh)?)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let materials = description
            .materials
            .iter()
            .enumerate()
            .map(|(i, material)| load_material(gpu, i, material, settings))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut objects = Vec::with_capacity(description.nodes.len());
        let mut reflective = Vec::new();
        let mut transparent = Vec::new();
        for (i, node) in description.nodes.iter().enumerate() {
            let mesh = meshes.get(node.mesh).ok_or(SceneError::MissingMesh {
                node: i,
                mesh: node.mesh,
                count: meshes.len(),
            })?;
            let material = materials
                .get(node.material)
                .ok_or(SceneError::MissingMaterial {
                    node: i,
                    material: node.material,
                    count: materials.len(),
                })?;

            let uniform = Buffer::uniform(
                gpu,
                &format!("object{i}_transform"),
                &ObjectUniform::new(node.transform, material.emissive),
            )?;

            let mut kind = ReflectionKind::None;
            let mut reflection = None;
            if let (true, Some(aabb)) = (material.reflective, mesh.aabb()) {
                let centre = aabb.center();
                let plane_or_position = if aabb.is_flat(FLAT_EPSILON) {
                    let normal = description.meshes[node.mesh]
                        .normals
                        .first()
                        .copied()
                        .unwrap_or(Vec3::Y);
                    kind = ReflectionKind::Planar;
                    reflection = Some(planar_target(gpu, i, settings)?);
                    normal.extend(normal.dot(-centre))
                } else {
                    kind = ReflectionKind::Cube;
                    reflection = Some(cube_target(gpu, i, settings)?);
                    centre.extend(1.0)
                };
                reflective.push(ReflectiveRef {
                    object: i,
                    kind,
                    plane_or_position,
                });
            }

            if material.transparent {
                transparent.push(i);
            }

            objects.push(Object {
                reflection,
                uniform,
                mesh: node.mesh,
                material: node.material,
                transform: node.transform,
                kind,
                emissive: material.emissive != 0.0,
                transparent: material.transparent,
            });
        }

        let mut camera = match description.camera {
            Some(desc) => {
                let mut camera = FirstPersonCamera3d::looking_along(desc.position, desc.direction);
                camera.set_fov(desc.fov);
                camera.set_clip_planes(desc.near, desc.far);
                camera
            }
            None => FirstPersonCamera3d::default(),
        };
        camera.set_aspect(settings.aspect());

        let far = camera.zfar();
        let point_block: [GpuPointLight; MAX_POINT_LIGHTS] = uniform_array(
            &description
                .point_lights
                .iter()
                .map(|light| {
                    let reach =
                        clamped_falloff_distance(&light.falloff, settings.falloff_threshold, far);
                    GpuPointLight::new(light, 0.1, reach)
                })
                .collect::<Vec<_>>(),
        );
        let spot_block: [GpuSpotLight; MAX_SPOT_LIGHTS] = uniform_array(
            &description
                .spot_lights
                .iter()
                .map(|light| {
                    let reach = clamped_falloff_distance(
                        &light.falloff,
                        settings.falloff_threshold,
                        far * 1.5,
                    );
                    GpuSpotLight::new(light, reach)
                })
                .collect::<Vec<_>>(),
        );
        let point_light_buffer = Buffer::uniform(gpu, "point_lights", &point_block)?;
        let spot_light_buffer = Buffer::uniform(gpu, "spot_lights", &spot_block)?;

        let environment = texture::sky_cube(gpu, SKY_RESOLUTION)?;

        log::info!(
            "loaded scene: {} meshes, {} materials, {} objects ({} reflective, {} transparent), \
             {} point lights, {} spot lights",
            meshes.len(),
            materials.len(),
            objects.len(),
            reflective.len(),
            transparent.len(),
            description.point_lights.len(),
            description.spot_lights.len()
        );

        Ok(Scene {
            environment,
            spot_light_buffer,
            point_light_buffer,
            objects,
            materials,
            meshes,
            reflective,
            transparent,
            point_lights: description.point_lights.clone(),
            spot_lights: description.spot_lights.clone(),
            camera,
        })
    }

    /// Every mesh, in description order.
    #[inline]
    pub fn meshes(&self) -> &[GpuMesh] {
        &self.meshes
    }

    /// Every material, in description order.
    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Every object, in node order.
    #[inline]
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// The mesh drawn by `object`.
    #[inline]
    pub fn mesh_of(&self, object: &Object) -> &GpuMesh {
        &self.meshes[object.mesh]
    }

    /// The material of `object`.
    #[inline]
    pub fn material_of(&self, object: &Object) -> &Material {
        &self.materials[object.material]
    }

    /// The reflective objects, in node order.
    #[inline]
    pub fn reflective(&self) -> &[ReflectiveRef] {
        &self.reflective
    }

    /// Indices of the transparent objects.
    #[inline]
    pub fn transparent(&self) -> &[usize] {
        &self.transparent
    }

    /// The point lights.
    #[inline]
    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    /// The spot lights.
    #[inline]
    pub fn spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights
    }

    /// The point light array bound to its uniform slot.
    #[inline]
    pub fn point_light_buffer(&self) -> &Buffer {
        &self.point_light_buffer
    }

    /// The spot light array bound to its uniform slot.
    #[inline]
    pub fn spot_light_buffer(&self) -> &Buffer {
        &self.spot_light_buffer
    }

    /// The sky cube map refracted by transparent objects.
    #[inline]
    pub fn environment(&self) -> &Texture {
        &self.environment
    }

    /// The camera the scene was described with.
    #[inline]
    pub fn camera(&self) -> &FirstPersonCamera3d {
        &self.camera
    }

    /// Moves an object and rewrites its transform uniform.
    pub fn set_transform(&mut self, object: usize, transform: Mat4) {
        let emissive = self.materials[self.objects[object].material].emissive;
        let object = &mut self.objects[object];
        object.transform = transform;
        object
            .uniform
            .write_value(&ObjectUniform::new(transform, emissive));
    }

    /// The world-space mirror plane of a planar reflective object.
    pub fn world_plane(&self, reflective: &ReflectiveRef) -> Plane {
        let transform = &self.objects[reflective.object].transform;
        Plane::from_vec4(reflective.plane_or_position).transformed(transform)
    }

    /// The world-space centre of a cube-mapped reflective object.
    pub fn world_centre(&self, reflective: &ReflectiveRef) -> Vec3 {
        let transform = &self.objects[reflective.object].transform;
        transform.transform_point3(reflective.plane_or_position.truncate())
    }
}

fn check_light_count(kind: &'static str, count: usize, max: usize) -> Result<(), SceneError> {
    if count > max {
        Err(SceneError::TooManyLights { kind, count, max })
    } else {
        Ok(())
    }
}

fn load_texture(
    gpu: &Gpu,
    label: &str,
    source: &TextureSource,
    settings: &RenderSettings,
) -> Result<(Texture, bool), Error> {
    let image = match source {
        TextureSource::Colour(colour) => {
            let texture = texture::solid_colour(gpu, label, *colour)?;
            return Ok((texture, colour[3] < 1.0));
        }
        TextureSource::File(path) => {
            let bytes = std::fs::read(path)?;
            image::load_from_memory(&bytes).map_err(SceneError::from)?
        }
        TextureSource::Encoded(bytes) => {
            image::load_from_memory(bytes).map_err(SceneError::from)?
        }
    };
    let texture = texture::from_image(gpu, label, &image, settings.anisotropy)?;
    Ok((texture, texture::has_transparency(&image)))
}

fn load_material(
    gpu: &Gpu,
    index: usize,
    material: &MaterialDescription,
    settings: &RenderSettings,
) -> Result<Material, Error> {
    let (diffuse, translucent) = load_texture(
        gpu,
        &format!("material{index}_diffuse"),
        &material.diffuse,
        settings,
    )?;
    let (specular, _) = load_texture(
        gpu,
        &format!("material{index}_specular"),
        &material.specular,
        settings,
    )?;
    let (roughness, _) = load_texture(
        gpu,
        &format!("material{index}_roughness"),
        &material.roughness,
        settings,
    )?;

    Ok(Material {
        roughness,
        specular,
        diffuse,
        emissive: material.emissive,
        transparent: material.transparent || translucent,
        reflective: material.is_reflective(),
    })
}

fn planar_target(
    gpu: &Gpu,
    object: usize,
    settings: &RenderSettings,
) -> Result<ReflectionTarget, Error> {
    let sampler = SamplerDesc::default()
        .with_filter(Filter::Trilinear)
        .with_anisotropy(settings.anisotropy);
    let desc = TextureDesc::new_2d(
        format!("object{object}_planar_reflection"),
        TextureFormat::Rgb8,
        settings.width,
        settings.height,
    )
    .with_levels(mip_levels(settings.width.max(settings.height)))
    .with_sampler(sampler);
    let texture = Texture::new(gpu, desc)?;
    let view_projection = Buffer::uniform(
        gpu,
        &format!("object{object}_reflection_view_projection"),
        &Mat4::IDENTITY.to_cols_array_2d(),
    )?;

    Ok(ReflectionTarget {
        view_projection: Some(view_projection),
        texture,
    })
}

fn cube_target(
    gpu: &Gpu,
    object: usize,
    settings: &RenderSettings,
) -> Result<ReflectionTarget, Error> {
    let sampler = SamplerDesc::default().with_filter(Filter::Trilinear);
    let size = settings.height;
    let desc = TextureDesc::new_2d(
        format!("object{object}_cube_reflection"),
        TextureFormat::Rgb8,
        size,
        size,
    )
    .with_kind(TextureKind::Cube)
    .with_levels(mip_levels(size))
    .with_sampler(sampler);

    Ok(ReflectionTarget {
        view_projection: None,
        texture: Texture::new(gpu, desc)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::procedural;
    use crate::scene::MaterialDescription;
    use approx::assert_relative_eq;
    use std::rc::Rc;

    fn gpu() -> (Rc<HeadlessDevice>, Gpu) {
        let device = Rc::new(HeadlessDevice::new(64, 32));
        let gpu: Gpu = device.clone();
        (device, gpu)
    }

    fn settings() -> RenderSettings {
        RenderSettings::default().with_size(64, 32)
    }

    #[test]
    fn reflective_meshes_are_classified_by_flatness() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let floor = description.add_mesh(procedural::plane(4.0, 4.0, 1, 1));
        let ball = description.add_mesh(procedural::sphere(8, 8));
        let mirror = description.add_material(
            MaterialDescription::solid(Vec3::ONE, Vec3::ONE, 0.1).with_reflectivity(1.0),
        );
        let matte = description.add_material(MaterialDescription::default());
        description.add_node(floor, mirror, Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)));
        description.add_node(ball, mirror, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        description.add_node(ball, matte, Mat4::IDENTITY);

        let scene = Scene::load(&gpu, &description, &settings()).unwrap();
        let kinds: Vec<_> = scene.objects().iter().map(Object::reflection_kind).collect();
        assert_eq!(
            kinds,
            [ReflectionKind::Planar, ReflectionKind::Cube, ReflectionKind::None]
        );
        assert_eq!(scene.reflective().len(), 2);

        let floor = &scene.reflective()[0];
        assert!(floor.plane_or_position.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 0.0), 1.0e-6));
        let plane = scene.world_plane(floor);
        assert_relative_eq!(plane.signed_distance(Vec3::new(3.0, -1.0, 7.0)), 0.0);

        let ball = &scene.reflective()[1];
        assert!(scene.world_centre(ball).abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1.0e-5));
    }

    #[test]
    fn reflection_targets_follow_the_window_size() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let floor = description.add_mesh(procedural::plane(4.0, 4.0, 1, 1));
        let cube = description.add_mesh(procedural::unit_cuboid());
        let mirror =
            description.add_material(MaterialDescription::default().with_reflectivity(0.5));
        description.add_node(floor, mirror, Mat4::IDENTITY);
        description.add_node(cube, mirror, Mat4::IDENTITY);

        let scene = Scene::load(&gpu, &description, &settings()).unwrap();
        let planar = scene.objects()[0].reflection().unwrap();
        assert_eq!(planar.texture().desc().width, 64);
        assert_eq!(planar.texture().desc().height, 32);
        assert_eq!(planar.texture().levels(), 6);
        assert!(planar.view_projection().is_some());

        let cube = scene.objects()[1].reflection().unwrap();
        assert_eq!(cube.texture().desc().kind, TextureKind::Cube);
        assert_eq!(cube.texture().width(), 32);
        assert_eq!(cube.texture().levels(), 5);
        assert!(cube.view_projection().is_none());
    }

    #[test]
    fn transparent_objects_are_listed_separately() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        let glass = description.add_material(MaterialDescription::imported(
            Vec3::ONE,
            Vec3::ONE,
            Vec3::ZERO,
            0.1,
            0.3,
            0.0,
        ));
        let lamp = description.add_material(MaterialDescription::default().with_emissive(4.0));
        description.add_node(cube, lamp, Mat4::IDENTITY);
        description.add_node(cube, glass, Mat4::IDENTITY);

        let scene = Scene::load(&gpu, &description, &settings()).unwrap();
        assert_eq!(scene.transparent(), &[1]);
        assert!(scene.objects()[0].is_emissive());
        assert!(!scene.objects()[1].is_emissive());
    }

    #[test]
    fn bad_references_are_reported() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        description.add_node(cube, 3, Mat4::IDENTITY);

        let error = Scene::load(&gpu, &description, &settings()).err().unwrap();
        assert!(matches!(
            error,
            Error::Scene(SceneError::MissingMaterial { node: 0, material: 3, count: 0 })
        ));
    }

    #[test]
    fn unreadable_texture_files_are_io_errors() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        let missing = MaterialDescription {
            diffuse: TextureSource::File("no/such/diffuse.png".into()),
            ..Default::default()
        };
        let material = description.add_material(missing);
        description.add_node(cube, material, Mat4::IDENTITY);

        let error = Scene::load(&gpu, &description, &settings()).err().unwrap();
        assert!(matches!(&error, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }

    #[test]
    fn undecodable_textures_are_image_errors() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        let garbage = MaterialDescription {
            diffuse: TextureSource::Encoded(vec![0, 1, 2, 3]),
            ..Default::default()
        };
        let material = description.add_material(garbage);
        description.add_node(cube, material, Mat4::IDENTITY);

        let error = Scene::load(&gpu, &description, &settings()).err().unwrap();
        assert!(matches!(error, Error::Scene(SceneError::Image(_))));
    }

    #[test]
    fn too_many_lights_are_rejected() {
        let (_, gpu) = gpu();
        let mut description = SceneDescription::new();
        for i in 0..MAX_SPOT_LIGHTS + 1 {
            description.add_spot_light(SpotLight::new(
                Vec3::new(i as f32, 5.0, 0.0),
                Vec3::Y,
                Vec3::ONE,
                0.9,
            ));
        }
        let error = Scene::load(&gpu, &description, &settings()).err().unwrap();
        assert!(matches!(
            error,
            Error::Scene(SceneError::TooManyLights { kind: "spot", .. })
        ));
    }

    #[test]
    fn moving_an_object_rewrites_its_uniform() {
        let (device, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        let lamp = description.add_material(MaterialDescription::default().with_emissive(2.0));
        description.add_node(cube, lamp, Mat4::IDENTITY);

        let mut scene = Scene::load(&gpu, &description, &settings()).unwrap();
        let moved = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        scene.set_transform(0, moved);

        let data = device.buffer_data(scene.objects()[0].uniform().id()).unwrap();
        let uniform: ObjectUniform = bytemuck::pod_read_unaligned(&data);
        assert_eq!(uniform, ObjectUniform::new(moved, 2.0));
    }

    #[test]
    fn dropping_the_scene_releases_everything() {
        let (device, gpu) = gpu();
        let mut description = SceneDescription::new();
        let cube = description.add_mesh(procedural::unit_cuboid());
        let mirror =
            description.add_material(MaterialDescription::default().with_reflectivity(1.0));
        description.add_node(cube, mirror, Mat4::IDENTITY);

        let scene = Scene::load(&gpu, &description, &settings()).unwrap();
        assert_ne!(device.live_resources(), (0, 0, 0, 0));
        drop(scene);
        assert_eq!(device.live_resources(), (0, 0, 0, 0));
    }
}
