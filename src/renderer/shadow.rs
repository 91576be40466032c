//! Point and spot light shadow maps.
//!
//! Each frame the light arrays are re-uploaded with their falloff-derived far planes, then
//! every opaque object is rendered into the point cube array (one cube per light) and the
//! spot 2D array (one layer per light), and transparent objects tint the spot transparency
//! array. Either pass is skipped when there is no light of its kind.

use super::RenderContext;
use crate::binding::{TextureUnit, UniformSlot};
use crate::error::GpuError;
use crate::gpu::{
    AttachmentPoint, AttachmentTarget, Buffer, ClearFlags, CullFace, Gpu, PolygonOffset,
    ProgramConstant, RenderDeviceExt,
};
use crate::light::{
    uniform_array, GpuPointLight, GpuSpotLight, PointLight, SpotLight, MAX_POINT_LIGHTS,
    MAX_SHADOW_LAYERS, MAX_SPOT_LIGHTS,
};
use crate::math::{clamped_falloff_distance, cube_face_view_projections};
use crate::shader::ProgramName;
use glamx::{Mat4, Vec3};

/// Near plane of every shadow frustum.
pub const SHADOW_NEAR: f32 = 0.1;
/// Spot frusta may reach this far past the camera's far plane.
pub const SPOT_FAR_SCALE: f32 = 1.5;
/// Depth bias of the shadow passes.
pub const SHADOW_POLYGON_OFFSET: PolygonOffset = PolygonOffset {
    factor: 0.9,
    units: 0.0,
};

type ShadowMatrices = [[[f32; 4]; 4]; MAX_SHADOW_LAYERS];
type ShadowPositions = [[f32; 4]; MAX_SHADOW_LAYERS];

/// Per-layer view-projections and light positions of the shadow passes.
///
/// The spot buffers are the defaults of the shadow slots since the lighting pass reads them;
/// the point buffers are only bound while point shadows render.
pub struct ShadowBuffers {
    point_positions: Buffer,
    point_view_projections: Buffer,
    spot_positions: Buffer,
    spot_view_projections: Buffer,
}

impl ShadowBuffers {
    pub(crate) fn new(gpu: &Gpu) -> Result<Self, GpuError> {
        let matrices: ShadowMatrices = [Mat4::IDENTITY.to_cols_array_2d(); MAX_SHADOW_LAYERS];
        let positions: ShadowPositions = [[0.0, 0.0, 0.0, 1.0]; MAX_SHADOW_LAYERS];
        let spot_view_projections =
            Buffer::uniform(gpu, "spot_shadow_view_projections", &matrices)?;
        let spot_positions = Buffer::uniform(gpu, "spot_shadow_positions", &positions)?;
        let point_view_projections =
            Buffer::uniform(gpu, "point_shadow_view_projections", &matrices)?;
        let point_positions = Buffer::uniform(gpu, "point_shadow_positions", &positions)?;

        Ok(ShadowBuffers {
            point_positions,
            point_view_projections,
            spot_positions,
            spot_view_projections,
        })
    }

    #[inline]
    pub fn spot_view_projections(&self) -> &Buffer {
        &self.spot_view_projections
    }

    #[inline]
    pub fn spot_positions(&self) -> &Buffer {
        &self.spot_positions
    }

    #[inline]
    pub fn point_view_projections(&self) -> &Buffer {
        &self.point_view_projections
    }

    #[inline]
    pub fn point_positions(&self) -> &Buffer {
        &self.point_positions
    }
}

/// Far plane of a point light's cube frustum.
pub fn point_light_far(light: &PointLight, threshold: f32, camera_far: f32) -> f32 {
    clamped_falloff_distance(&light.falloff, threshold, camera_far)
}

/// Far plane of a spot light's frustum.
pub fn spot_light_far(light: &SpotLight, threshold: f32, camera_far: f32) -> f32 {
    clamped_falloff_distance(&light.falloff, threshold, camera_far * SPOT_FAR_SCALE)
}

/// View-projection of a spot light: its cone as a square frustum.
///
/// The view looks from the light position towards `position - direction`, matching the
/// convention that `direction` points from the lit surface back to the light.
pub fn spot_view_projection(light: &SpotLight, far: f32) -> Mat4 {
    // Lights pointing straight up or down need another up vector.
    let up = if light.direction.normalize().y.abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(light.position, light.position - light.direction, up);
    let fov = 2.0 * light.cos_angle.clamp(-1.0, 1.0).acos();
    Mat4::perspective_rh_gl(fov, 1.0, SHADOW_NEAR, far) * view
}

/// Renders every shadow map for the current light state.
///
/// On return the rasterizer is back to back-face culling without bias and the shadow slots
/// hold the spot buffers again.
pub fn render_shadows(ctx: &RenderContext, camera_far: f32) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();
    let threshold = ctx.settings().falloff_threshold;
    let point_count = scene.point_lights().len();
    let spot_count = scene.spot_lights().len();

    let point_far: Vec<f32> = scene
        .point_lights()
        .iter()
        .map(|light| point_light_far(light, threshold, camera_far))
        .collect();
    let spot_far: Vec<f32> = scene
        .spot_lights()
        .iter()
        .map(|light| spot_light_far(light, threshold, camera_far))
        .collect();

    let point_block: [GpuPointLight; MAX_POINT_LIGHTS] = uniform_array(
        &scene
            .point_lights()
            .iter()
            .zip(&point_far)
            .map(|(light, far)| GpuPointLight::new(light, SHADOW_NEAR, *far))
            .collect::<Vec<_>>(),
    );
    scene.point_light_buffer().write_value(&point_block);
    let spot_block: [GpuSpotLight; MAX_SPOT_LIGHTS] = uniform_array(
        &scene
            .spot_lights()
            .iter()
            .zip(&spot_far)
            .map(|(light, far)| GpuSpotLight::new(light, *far))
            .collect::<Vec<_>>(),
    );
    scene.spot_light_buffer().write_value(&spot_block);

    let shaders = ctx.shaders();
    shaders.set_constant(
        gpu,
        ProgramName::DeferredLighting,
        ProgramConstant::PointLightCount,
        point_count as u32,
    );
    shaders.set_constant(
        gpu,
        ProgramName::DeferredLighting,
        ProgramConstant::SpotLightCount,
        spot_count as u32,
    );

    if point_count == 0 && spot_count == 0 {
        return;
    }

    let targets = ctx.targets().shadow();
    let resolution = targets.resolution();
    gpu.set_rasterizer(CullFace::Front, Some(SHADOW_POLYGON_OFFSET));
    gpu.set_additive_blend(false);
    gpu.set_viewport(resolution, resolution);
    targets.depth_framebuffer().bind();

    if point_count > 0 {
        log::trace!("point shadows: {point_count} lights");
        render_point_shadows(ctx, &point_far);
    }
    if spot_count > 0 {
        log::trace!("spot shadows: {spot_count} lights");
        render_spot_shadows(ctx, &spot_far);
        render_spot_transparency(ctx);
    }

    gpu.set_rasterizer(CullFace::Back, None);
    gpu.set_depth(true, true);
    ctx.defaults().restore(
        gpu.as_ref(),
        &[UniformSlot::ShadowViewProjection, UniformSlot::ShadowPositions],
    );
}

fn render_point_shadows(ctx: &RenderContext, far: &[f32]) {
    let gpu = ctx.gpu();
    let buffers = ctx.shadow_buffers();
    let lights = ctx.scene().point_lights();

    let mut matrices: ShadowMatrices = [[[0.0; 4]; 4]; MAX_SHADOW_LAYERS];
    let mut positions: ShadowPositions = [[0.0; 4]; MAX_SHADOW_LAYERS];
    for (i, (light, far)) in lights.iter().zip(far).enumerate() {
        let faces = cube_face_view_projections(light.position, SHADOW_NEAR, *far);
        for (face, view_projection) in faces.iter().enumerate() {
            matrices[i * 6 + face] = view_projection.to_cols_array_2d();
            positions[i * 6 + face] = light.position.extend(*far).to_array();
        }
    }
    buffers.point_view_projections().write_value(&matrices);
    buffers.point_positions().write_value(&positions);
    gpu.bind_uniform_buffer(
        UniformSlot::ShadowViewProjection,
        buffers.point_view_projections().id(),
    );
    gpu.bind_uniform_buffer(UniformSlot::ShadowPositions, buffers.point_positions().id());

    let framebuffer = ctx.targets().shadow().depth_framebuffer();
    framebuffer.attach(
        AttachmentPoint::Depth,
        AttachmentTarget::new(ctx.targets().shadow().point().id()),
    );
    render_depth(ctx, (lights.len() * 6) as u32);
}

fn render_spot_shadows(ctx: &RenderContext, far: &[f32]) {
    let gpu = ctx.gpu();
    let buffers = ctx.shadow_buffers();
    let lights = ctx.scene().spot_lights();

    let mut matrices: ShadowMatrices = [[[0.0; 4]; 4]; MAX_SHADOW_LAYERS];
    let mut positions: ShadowPositions = [[0.0; 4]; MAX_SHADOW_LAYERS];
    for (i, (light, far)) in lights.iter().zip(far).enumerate() {
        matrices[i] = spot_view_projection(light, *far).to_cols_array_2d();
        positions[i] = light.position.extend(*far).to_array();
    }
    buffers.spot_view_projections().write_value(&matrices);
    buffers.spot_positions().write_value(&positions);
    gpu.bind_uniform_buffer(
        UniformSlot::ShadowViewProjection,
        buffers.spot_view_projections().id(),
    );
    gpu.bind_uniform_buffer(UniformSlot::ShadowPositions, buffers.spot_positions().id());

    let framebuffer = ctx.targets().shadow().depth_framebuffer();
    framebuffer.attach(
        AttachmentPoint::Depth,
        AttachmentTarget::new(ctx.targets().shadow().spot().id()),
    );
    render_depth(ctx, lights.len() as u32);
}

/// Draws every opaque object into the layers of the depth framebuffer.
fn render_depth(ctx: &RenderContext, layers: u32) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();

    ctx.targets().shadow().depth_framebuffer().bind();
    gpu.set_depth(true, true);
    gpu.clear(ClearFlags::DEPTH);
    ctx.shaders().bind(ProgramName::Shadow);
    ctx.shaders()
        .set_constant(gpu, ProgramName::Shadow, ProgramConstant::LayerCount, layers);

    for object in scene.objects().iter().filter(|o| !o.is_transparent()) {
        gpu.bind_uniform_buffer(UniformSlot::Object, object.uniform().id());
        gpu.draw_indexed(scene.mesh_of(object).draw_buffers());
    }
}

/// Tints the spot transparency layers with the diffuse colour of transparent objects, testing
/// against the opaque depth without writing it.
///
/// The layers start out white so that light nothing transparent stands in front of passes
/// through untouched.
fn render_spot_transparency(ctx: &RenderContext) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();
    let layers = scene.spot_lights().len() as u32;

    ctx.targets().shadow().transparency_framebuffer().bind();
    ctx.shaders().bind(ProgramName::ShadowTransparency);
    ctx.shaders().set_constant(
        gpu,
        ProgramName::ShadowTransparency,
        ProgramConstant::LayerCount,
        layers,
    );
    gpu.clear_to(ClearFlags::COLOR, [1.0; 4]);
    gpu.set_depth(true, false);

    for &i in scene.transparent() {
        let object = &scene.objects()[i];
        gpu.bind_uniform_buffer(UniformSlot::Object, object.uniform().id());
        gpu.bind_texture(TextureUnit::Diffuse, scene.material_of(object).diffuse().id());
        gpu.draw_indexed(scene.mesh_of(object).draw_buffers());
    }

    gpu.set_depth(true, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Command, HeadlessDevice, RenderDevice};
    use crate::math::Falloff;
    use crate::renderer::test_scene;
    use approx::assert_relative_eq;
    use glamx::Vec4;
    use std::rc::Rc;

    #[test]
    fn spot_frustum_matches_the_cone() {
        let light = SpotLight::new(Vec3::ZERO, Vec3::Z, Vec3::ONE, 0.5f32.cos());
        let vp = spot_view_projection(&light, 20.0);

        let ahead = vp * Vec4::new(0.0, 0.0, -3.0, 1.0);
        assert_relative_eq!(ahead.x / ahead.w, 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(ahead.y / ahead.w, 0.0, epsilon = 1.0e-5);

        // A point on the cone boundary lands on the frustum edge.
        let edge = Vec4::new(0.0, 3.0 * 0.5f32.tan(), -3.0, 1.0);
        let clip = vp * edge;
        assert_relative_eq!(clip.y / clip.w, 1.0, epsilon = 1.0e-4);
    }

    #[test]
    fn downward_spot_lights_have_a_valid_frustum() {
        let light = SpotLight::new(Vec3::new(0.0, 5.0, 0.0), Vec3::Y, Vec3::ONE, 0.8);
        let clip = spot_view_projection(&light, 20.0) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(clip.is_finite());
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1.0e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1.0e-5);
    }

    #[test]
    fn far_planes_are_clamped_per_light_kind() {
        let falloff = Falloff::new(1.0, 0.0, 0.0);
        let point = PointLight::new(Vec3::ZERO, Vec3::ONE).with_falloff(falloff);
        let spot = SpotLight::new(Vec3::ZERO, Vec3::Y, Vec3::ONE, 0.8).with_falloff(falloff);
        assert_eq!(point_light_far(&point, 256.0, 100.0), 100.0);
        assert_eq!(spot_light_far(&spot, 256.0, 100.0), 150.0);

        let near = Falloff::new(1.0, 0.0, 1.0);
        let point = point.with_falloff(near);
        assert_relative_eq!(point_light_far(&point, 256.0, 100.0), 255.0f32.sqrt());
    }

    #[test]
    fn shadow_passes_run_in_order_and_restore_state() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        device.clear_commands();

        render_shadows(&ctx, 100.0);

        let draws = device.draws();
        let programs: Vec<_> = draws.iter().map(|d| d.program_name.as_str()).collect();
        let opaque = ctx
            .scene()
            .objects()
            .iter()
            .filter(|o| !o.is_transparent())
            .count();
        let transparent = ctx.scene().transparent().len();
        assert_eq!(programs.len(), opaque * 2 + transparent);
        assert!(programs[..opaque].iter().all(|p| *p == "shadow"));
        assert!(programs[opaque * 2..].iter().all(|p| *p == "shadow_transparency"));

        let shadow = ctx.targets().shadow();
        let point_draw = &draws[0];
        assert_eq!(point_draw.layers, 6 * ctx.scene().point_lights().len() as u32);
        assert!(point_draw.writes(shadow.point().id()));
        assert_eq!(point_draw.state.cull, CullFace::Front);
        assert_eq!(point_draw.state.polygon_offset, Some(SHADOW_POLYGON_OFFSET));
        assert_eq!(
            point_draw.uniform_buffer(UniformSlot::ShadowPositions),
            Some(ctx.shadow_buffers().point_positions().id())
        );

        let transparency = draws.last().unwrap();
        assert!(transparency.state.depth_test);
        assert!(!transparency.state.depth_write);
        assert!(transparency.writes(shadow.spot_transparency().id()));

        let state = device.render_state();
        assert_eq!(state.cull, CullFace::Back);
        assert_eq!(state.polygon_offset, None);
        assert!(ctx.defaults().verify(&*device).is_ok());
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn transparency_layers_are_cleared_to_white() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        device.clear_commands();

        render_shadows(&ctx, 100.0);

        let transparency = ctx.targets().shadow().transparency_framebuffer().id();
        let clears: Vec<_> = device
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                Command::Clear {
                    framebuffer,
                    flags,
                    color,
                } => Some((framebuffer, flags, color)),
                _ => None,
            })
            .collect();
        assert!(clears.contains(&(Some(transparency), ClearFlags::COLOR, [1.0; 4])));
        assert!(clears
            .iter()
            .filter(|(framebuffer, ..)| *framebuffer != Some(transparency))
            .all(|(.., color)| *color == [0.0; 4]));
        assert_eq!(device.clear_color(), [0.0; 4]);
    }

    #[test]
    fn light_far_planes_are_uploaded_every_frame() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        render_shadows(&ctx, 40.0);

        let data = device
            .buffer_data(ctx.scene().point_light_buffer().id())
            .unwrap();
        let lights: Vec<GpuPointLight> = bytemuck::pod_collect_to_vec(&data);
        let expected = point_light_far(&ctx.scene().point_lights()[0], 256.0, 40.0);
        assert_eq!(lights[0].near_far, [SHADOW_NEAR, expected]);
    }
}
