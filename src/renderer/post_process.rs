//! Luminance extraction, bloom and the final composite.

use super::context::InverseResolution;
use super::RenderContext;
use crate::binding::TextureUnit;
use crate::gpu::{ClearFlags, RenderDeviceExt};
use crate::shader::{BlurDirection, OutputView, ProgramName};

/// Runs the post-process chain on the primary accumulation buffer and draws `view` to the
/// window surface.
///
/// The first blur iteration reads bloom level 0 and writes level 1; the following ones filter
/// level 1 in place through the half-resolution scratch texture. The inverse-resolution slot
/// holds the size of the bound target during every blur draw and the full size afterwards.
pub fn render_post_process(ctx: &RenderContext, view: OutputView) {
    let gpu = ctx.gpu();
    let shaders = ctx.shaders();
    let targets = ctx.targets().post_process();
    let gbuffer = ctx.targets().primary();
    let (width, height) = gbuffer.size();
    let quad = ctx.quad().draw_buffers();
    let bloom = targets.bloom().id();

    gpu.set_depth(false, false);
    gpu.set_additive_blend(false);
    gpu.set_viewport(width, height);

    gpu.set_texture_levels(bloom, 0, 0);
    targets.init_framebuffer().bind();
    gpu.bind_texture(TextureUnit::Accumulation, gbuffer.accumulation().id());
    shaders.bind(ProgramName::PostProcessInit);
    gpu.draw_indexed(quad);
    gpu.generate_mipmaps(targets.luminance().id());

    let (half_width, half_height) = (targets.blur().width(), targets.blur().height());
    gpu.set_viewport(half_width, half_height);
    ctx.inverse_resolution_buffer()
        .write_value(&InverseResolution::new(half_width, half_height));
    shaders.bind(ProgramName::GaussianBlur);
    for iteration in 0..ctx.settings().bloom_iterations {
        log::trace!("bloom iteration {iteration}");
        let level = iteration.min(1);
        gpu.set_texture_levels(bloom, level, level);

        targets.blur_framebuffer().bind();
        gpu.bind_texture(TextureUnit::Bloom, bloom);
        gpu.set_subroutines(BlurDirection::Horizontal.selection());
        gpu.draw_indexed(quad);

        targets.bloom_framebuffer().bind();
        gpu.bind_texture(TextureUnit::Bloom, targets.blur().id());
        gpu.set_subroutines(BlurDirection::Vertical.selection());
        gpu.draw_indexed(quad);
    }
    gpu.set_texture_levels(bloom, 1, 1);
    gpu.set_viewport(width, height);
    ctx.inverse_resolution_buffer()
        .write_value(&InverseResolution::new(width, height));

    gpu.bind_framebuffer(None);
    gpu.clear(ClearFlags::COLOR);
    gbuffer.bind_textures(gpu);
    gpu.bind_texture(TextureUnit::Accumulation, gbuffer.accumulation().id());
    gpu.bind_texture(TextureUnit::Luminance, targets.luminance().id());
    gpu.bind_texture(TextureUnit::Bloom, bloom);
    shaders.bind(ProgramName::PostProcess);
    gpu.set_subroutines(view.selection());
    gpu.draw_indexed(quad);

    gpu.set_depth(true, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::UniformSlot;
    use crate::gpu::{HeadlessDevice, RenderDevice};
    use crate::renderer::deferred::render_deferred;
    use crate::renderer::test_scene;
    use std::rc::Rc;

    fn inverse_resolution(data: &[u8]) -> [f32; 2] {
        bytemuck::pod_read_unaligned::<InverseResolution>(data).value
    }

    #[test]
    fn blur_passes_see_the_size_of_their_target() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        render_deferred(&ctx, ctx.targets().primary(), None, None);
        device.clear_commands();

        render_post_process(&ctx, OutputView::Composite);

        let draws = device.draws();
        let blur: Vec<_> = draws
            .iter()
            .filter(|d| d.program_name == "gaussian_blur")
            .collect();
        assert_eq!(blur.len(), 2 * ctx.settings().bloom_iterations as usize);
        for draw in &blur {
            assert_eq!(draw.viewport, (16, 8));
            let data = draw.uniform(UniformSlot::InverseResolution).unwrap();
            assert_eq!(inverse_resolution(data), [1.0 / 16.0, 1.0 / 8.0]);
        }

        let restored = device
            .buffer_data(ctx.inverse_resolution_buffer().id())
            .unwrap();
        assert_eq!(inverse_resolution(&restored), [1.0 / 32.0, 1.0 / 16.0]);
        assert_eq!(device.viewport(), (32, 16));
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn first_blur_iteration_reads_the_bright_pass() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        render_post_process(&ctx, OutputView::Composite);

        let bloom = ctx.targets().post_process().bloom().id();
        let blur: Vec<_> = device
            .draws()
            .into_iter()
            .filter(|d| d.program_name == "gaussian_blur")
            .collect();
        let horizontal_levels = |i: usize| {
            blur[i]
                .textures
                .iter()
                .find(|(unit, _, _)| *unit == TextureUnit::Bloom)
                .map(|(_, texture, levels)| (*texture, *levels))
        };
        assert_eq!(horizontal_levels(0), Some((Some(bloom), (0, 0))));
        assert_eq!(horizontal_levels(2), Some((Some(bloom), (1, 1))));
        assert_eq!(
            blur[1].texture(TextureUnit::Bloom),
            Some(ctx.targets().post_process().blur().id())
        );
    }

    #[test]
    fn composite_reaches_the_surface_with_the_selected_view() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let ctx = test_scene::context(&device);
        render_post_process(&ctx, OutputView::Bloom);

        let last = device.draws().pop().unwrap();
        assert_eq!(last.program_name, "post_process");
        assert_eq!(last.framebuffer, None);
        assert_eq!(last.subroutines, OutputView::Bloom.selection());
        assert!(device.surface_contents().has_content());
        assert!(device.render_state().depth_test);
    }
}
