//! Geometry pass followed by additive light accumulation.

use super::RenderContext;
use crate::binding::{TextureUnit, UniformSlot};
use crate::gpu::{AttachmentTarget, ClearFlags, CullFace, RenderDeviceExt, TextureId};
use crate::resource::GBuffer;
use crate::scene::ReflectionKind;
use crate::shader::{gbuffer_subroutines, ProgramName, ReflectionSubroutine};

/// Points the output of a geometry buffer back at its accumulation texture when dropped.
struct OutputOverride<'a> {
    gbuffer: &'a GBuffer,
}

impl<'a> OutputOverride<'a> {
    fn new(gbuffer: &'a GBuffer, target: AttachmentTarget) -> Self {
        gbuffer.redirect_output(target);
        OutputOverride { gbuffer }
    }
}

impl Drop for OutputOverride<'_> {
    fn drop(&mut self) {
        self.gbuffer.restore_output();
    }
}

/// Renders the scene through `gbuffer` with the camera currently bound to the camera slot.
///
/// `skip` is left out of the geometry pass; reflection renders use it to exclude the mirror
/// they render for. When `output` is given the lit image lands there instead of in the
/// accumulation texture, which is reattached before returning. Depth test and write are
/// enabled on return.
pub fn render_deferred(
    ctx: &RenderContext,
    gbuffer: &GBuffer,
    skip: Option<usize>,
    output: Option<AttachmentTarget>,
) {
    let gpu = ctx.gpu();
    let _override = output.map(|target| OutputOverride::new(gbuffer, target));
    let (width, height) = gbuffer.size();
    log::trace!("deferred pass {width}x{height}, skip {skip:?}, output {output:?}");

    gbuffer.geometry().bind();
    gpu.set_viewport(width, height);
    gpu.set_depth(true, true);
    gpu.set_additive_blend(false);
    gpu.set_rasterizer(CullFace::Back, None);
    gpu.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
    render_objects(ctx, skip, output.map(|o| o.texture));

    gbuffer.lighting().bind();
    gpu.set_depth(false, false);
    gpu.set_additive_blend(true);
    gbuffer.bind_textures(gpu);
    ctx.targets().shadow().bind_textures(gpu);
    ctx.shaders().bind(ProgramName::DeferredLighting);
    gpu.draw_indexed(ctx.quad().draw_buffers());

    gpu.set_additive_blend(false);
    gpu.set_depth(true, true);
}

fn render_objects(ctx: &RenderContext, skip: Option<usize>, written: Option<TextureId>) {
    let gpu = ctx.gpu();
    let scene = ctx.scene();
    let placeholders = ctx.placeholders();

    ctx.shaders().bind(ProgramName::GBuffer);
    gpu.bind_texture(TextureUnit::Environment, scene.environment().id());

    for (i, object) in scene.objects().iter().enumerate() {
        if skip == Some(i) {
            continue;
        }
        let material = scene.material_of(object);
        gpu.bind_uniform_buffer(UniformSlot::Object, object.uniform().id());
        gpu.bind_texture(TextureUnit::Diffuse, material.diffuse().id());
        gpu.bind_texture(TextureUnit::Specular, material.specular().id());
        gpu.bind_texture(TextureUnit::Roughness, material.roughness().id());

        let mut planar = placeholders.planar().id();
        let mut cube = placeholders.cube().id();
        let mut view_projection = placeholders.view_projection().id();
        let mut reflection = ReflectionSubroutine::None;
        if let Some(target) = object.reflection() {
            let texture = target.texture().id();
            if written == Some(texture) {
                log::warn!("object {i} samples its own reflection target, using a placeholder");
            } else {
                match object.reflection_kind() {
                    ReflectionKind::Planar => {
                        planar = texture;
                        if let Some(buffer) = target.view_projection() {
                            view_projection = buffer.id();
                        }
                        reflection = ReflectionSubroutine::Planar;
                    }
                    ReflectionKind::Cube => {
                        cube = texture;
                        reflection = ReflectionSubroutine::Cube;
                    }
                    ReflectionKind::None => {}
                }
            }
        }
        gpu.bind_texture(TextureUnit::PlanarReflection, planar);
        gpu.bind_texture(TextureUnit::CubeReflection, cube);
        gpu.bind_uniform_buffer(UniformSlot::ReflectionViewProjection, view_projection);

        gpu.set_subroutines(gbuffer_subroutines(
            object.is_emissive(),
            object.is_transparent(),
            reflection,
        ));
        gpu.draw_indexed(scene.mesh_of(object).draw_buffers());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{AttachmentPoint, Contents, HeadlessDevice, RenderDevice};
    use crate::renderer::test_scene;
    use std::rc::Rc;

    #[test]
    fn lighting_is_additive_without_depth() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        render_deferred(&ctx, ctx.targets().primary(), None, None);

        let draws = device.draws();
        let lighting = draws.last().unwrap();
        assert_eq!(lighting.program_name, "deferred_lighting");
        assert!(lighting.state.additive_blend);
        assert!(!lighting.state.depth_test);
        assert_eq!(
            lighting.color_targets,
            [AttachmentTarget::new(ctx.targets().primary().accumulation().id())]
        );
        assert!(device.render_state().depth_test && device.render_state().depth_write);
        assert!(!device.render_state().additive_blend);
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn skipped_objects_are_not_drawn() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let objects = ctx.scene().objects().len();

        render_deferred(&ctx, ctx.targets().primary(), Some(0), None);
        let geometry = device
            .draws()
            .iter()
            .filter(|d| d.program_name == "gbuffer")
            .count();
        assert_eq!(geometry, objects - 1);
    }

    #[test]
    fn overridden_output_is_written_then_restored() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let gbuffer = ctx.targets().primary();
        let mirror = test_scene::planar_object(&ctx);
        let texture = ctx.scene().objects()[mirror].reflection().unwrap().texture();

        render_deferred(&ctx, gbuffer, Some(mirror), Some(AttachmentTarget::new(texture.id())));

        assert!(device.contents(texture.id(), 0, 0).unwrap().has_content());
        for fb in [gbuffer.geometry(), gbuffer.lighting()] {
            let attached = device.attachment(fb.id(), AttachmentPoint::Color(0));
            assert_eq!(attached, Some(AttachmentTarget::new(gbuffer.accumulation().id())));
        }
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn reflective_objects_sample_their_own_target() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        let mirror = test_scene::planar_object(&ctx);
        let object = &ctx.scene().objects()[mirror];

        render_deferred(&ctx, ctx.targets().primary(), None, None);
        let draw = device
            .draws()
            .into_iter()
            .filter(|d| d.program_name == "gbuffer")
            .nth(mirror)
            .unwrap();
        let target = object.reflection().unwrap();
        assert_eq!(draw.texture(TextureUnit::PlanarReflection), Some(target.texture().id()));
        assert_eq!(
            draw.uniform_buffer(UniformSlot::ReflectionViewProjection),
            target.view_projection().map(|b| b.id())
        );
        assert_eq!(draw.subroutines[2], ReflectionSubroutine::Planar as u32);
        assert!(!matches!(
            device.contents(ctx.targets().primary().normal().id(), 0, 0),
            Some(Contents::Undefined)
        ));
    }
}
