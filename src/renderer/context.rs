//! State shared by every pass.

use super::shadow::ShadowBuffers;
use crate::binding::{DefaultBindings, UniformSlot};
use crate::camera::CameraUniform;
use crate::error::{Error, GpuError};
use crate::gpu::{Buffer, Gpu, ProgramConstant, Texture, TextureKind};
use crate::resource::{texture, FramebufferGraph, GpuMesh};
use crate::scene::Scene;
use crate::settings::RenderSettings;
use crate::shader::{ProgramName, ShaderService};
use bytemuck::{Pod, Zeroable};
use glamx::{Mat4, Vec3};

/// Data bound to the inverse-resolution slot: one over the size of the bound target.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InverseResolution {
    pub value: [f32; 2],
    _pad0: [f32; 2],
}

impl InverseResolution {
    /// One over `width × height`.
    pub fn new(width: u32, height: u32) -> Self {
        InverseResolution {
            value: [1.0 / width as f32, 1.0 / height as f32],
            _pad0: [0.0; 2],
        }
    }
}

/// Stand-ins bound to the reflection inputs of objects without a reflection of that kind.
///
/// Binding them keeps a texture that is being rendered into from ever being sampled by the
/// same draw.
pub struct Placeholders {
    view_projection: Buffer,
    cube: Texture,
    planar: Texture,
}

impl Placeholders {
    fn new(gpu: &Gpu) -> Result<Self, GpuError> {
        let planar = texture::placeholder(gpu, "placeholder_planar", TextureKind::D2)?;
        let cube = texture::placeholder(gpu, "placeholder_cube", TextureKind::Cube)?;
        let view_projection = Buffer::uniform(
            gpu,
            "placeholder_view_projection",
            &Mat4::IDENTITY.to_cols_array_2d(),
        )?;
        Ok(Placeholders {
            view_projection,
            cube,
            planar,
        })
    }

    /// 1×1 black 2D texture.
    #[inline]
    pub fn planar(&self) -> &Texture {
        &self.planar
    }

    /// 1×1 black cube map.
    #[inline]
    pub fn cube(&self) -> &Texture {
        &self.cube
    }

    /// Identity matrix bound to the reflection view-projection slot.
    #[inline]
    pub fn view_projection(&self) -> &Buffer {
        &self.view_projection
    }
}

/// Everything the passes read and write, passed by reference instead of living in globals.
pub struct RenderContext {
    shadow_buffers: ShadowBuffers,
    inverse_resolution: Buffer,
    placeholders: Placeholders,
    quad: GpuMesh,
    reflection_camera: Buffer,
    camera: Buffer,
    targets: FramebufferGraph,
    scene: Scene,
    shaders: ShaderService,
    defaults: DefaultBindings,
    settings: RenderSettings,
    gpu: Gpu,
}

impl RenderContext {
    /// Compiles the programs and creates the resources of every pass.
    ///
    /// Resources are created pass by pass, in the order deferred, post-process, shadow. The
    /// persistent uniform slots are bound to their default buffers before returning.
    pub fn new(gpu: &Gpu, scene: Scene, settings: RenderSettings) -> Result<Self, Error> {
        let shaders = ShaderService::new(gpu)?;
        let targets = FramebufferGraph::new(
            gpu,
            &settings,
            scene.point_lights().len(),
            scene.spot_lights().len(),
        )?;

        let camera_data = scene.camera().uniform();
        let camera = Buffer::uniform(gpu, "camera", &camera_data)?;
        let reflection_camera = Buffer::uniform(gpu, "reflection_camera", &camera_data)?;
        let quad = GpuMesh::screen_quad(gpu)?;
        let placeholders = Placeholders::new(gpu)?;

        let inverse_resolution = Buffer::uniform(
            gpu,
            "inverse_resolution",
            &InverseResolution::new(settings.width, settings.height),
        )?;

        let shadow_buffers = ShadowBuffers::new(gpu)?;

        let mut defaults = DefaultBindings::new();
        let device = gpu.as_ref();
        defaults.register(device, UniformSlot::Camera, camera.id());
        defaults.register(device, UniformSlot::PointLights, scene.point_light_buffer().id());
        defaults.register(device, UniformSlot::SpotLights, scene.spot_light_buffer().id());
        defaults.register(
            device,
            UniformSlot::ShadowViewProjection,
            shadow_buffers.spot_view_projections().id(),
        );
        defaults.register(
            device,
            UniformSlot::ShadowPositions,
            shadow_buffers.spot_positions().id(),
        );
        defaults.register(device, UniformSlot::InverseResolution, inverse_resolution.id());

        shaders.set_constant(
            gpu,
            ProgramName::DeferredLighting,
            ProgramConstant::PointLightCount,
            scene.point_lights().len() as u32,
        );
        shaders.set_constant(
            gpu,
            ProgramName::DeferredLighting,
            ProgramConstant::SpotLightCount,
            scene.spot_lights().len() as u32,
        );

        Ok(RenderContext {
            shadow_buffers,
            inverse_resolution,
            placeholders,
            quad,
            reflection_camera,
            camera,
            targets,
            scene,
            shaders,
            defaults,
            settings,
            gpu: gpu.clone(),
        })
    }

    #[inline]
    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderService {
        &self.shaders
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable access to the scene, to move objects between frames.
    #[inline]
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    #[inline]
    pub fn targets(&self) -> &FramebufferGraph {
        &self.targets
    }

    /// Default buffers of the persistent uniform slots.
    #[inline]
    pub fn defaults(&self) -> &DefaultBindings {
        &self.defaults
    }

    /// The main camera uniform, the default of the camera slot.
    #[inline]
    pub fn camera_buffer(&self) -> &Buffer {
        &self.camera
    }

    /// The camera uniform bound while rendering reflections.
    #[inline]
    pub fn reflection_camera_buffer(&self) -> &Buffer {
        &self.reflection_camera
    }

    #[inline]
    pub fn inverse_resolution_buffer(&self) -> &Buffer {
        &self.inverse_resolution
    }

    #[inline]
    pub fn shadow_buffers(&self) -> &ShadowBuffers {
        &self.shadow_buffers
    }

    #[inline]
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    /// The full-screen quad.
    #[inline]
    pub fn quad(&self) -> &GpuMesh {
        &self.quad
    }

    /// Uploads the main camera.
    pub fn write_camera(&self, view_projection: Mat4, position: Vec3) {
        self.camera
            .write_value(&CameraUniform::new(view_projection, position));
    }
}
