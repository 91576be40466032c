//! The per-frame driver of the passes.

use super::deferred::render_deferred;
use super::post_process::render_post_process;
use super::reflection::{refresh_environment_reflections, refresh_planar_reflections};
use super::shadow::render_shadows;
use super::RenderContext;
use crate::binding::BindingViolation;
use crate::camera::FirstPersonCamera3d;
use crate::error::Error;
use crate::gpu::Gpu;
use crate::resource::Pass;
use crate::scene::Scene;
use crate::settings::RenderSettings;
use crate::shader::OutputView;

/// Renders a loaded scene frame after frame.
///
/// # Example
///
/// ```no_run
/// # use deferred3d::prelude::*;
/// # use std::rc::Rc;
/// # fn main() -> deferred3d::Result<()> {
/// let gpu: Gpu = Rc::new(HeadlessDevice::new(640, 480));
/// let settings = RenderSettings::default().with_size(640, 480);
/// let scene = Scene::load(&gpu, &SceneDescription::new(), &settings)?;
/// let mut renderer = Renderer::new(&gpu, scene, settings)?;
/// renderer.render_frame();
/// # Ok(())
/// # }
/// ```
pub struct Renderer {
    ctx: RenderContext,
    camera: FirstPersonCamera3d,
    output_view: OutputView,
}

impl Renderer {
    /// Creates the resources of every pass and pre-renders the cube-map reflections.
    pub fn new(gpu: &Gpu, scene: Scene, settings: RenderSettings) -> Result<Self, Error> {
        let camera = *scene.camera();
        let ctx = RenderContext::new(gpu, scene, settings)?;
        log::info!(
            "renderer ready, pass order: {}",
            ctx.targets()
                .order()
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let renderer = Renderer {
            ctx,
            camera,
            output_view: OutputView::default(),
        };
        renderer.refresh_environment_maps();
        Ok(renderer)
    }

    /// Renders one frame to the window surface.
    ///
    /// Returns `false` when the surface was not available and nothing was drawn.
    pub fn render_frame(&mut self) -> bool {
        let gpu = self.ctx.gpu().clone();
        if !gpu.begin_frame() {
            return false;
        }

        self.ctx
            .write_camera(self.camera.view_projection(), self.camera.position());
        let eye = self.camera.eye();
        for pass in self.ctx.targets().order() {
            log::trace!("{} pass", pass.as_str());
            match pass {
                Pass::Shadow => render_shadows(&self.ctx, self.camera.zfar()),
                Pass::Reflection => {
                    if self.ctx.settings().dynamic_environment_maps {
                        self.refresh_environment_maps();
                    }
                    refresh_planar_reflections(&self.ctx, &eye);
                }
                Pass::Deferred => {
                    render_deferred(&self.ctx, self.ctx.targets().primary(), None, None)
                }
                Pass::PostProcess => render_post_process(&self.ctx, self.output_view),
            }
        }

        gpu.end_frame();
        true
    }

    /// Re-renders every cube-map reflection from the current scene state.
    pub fn refresh_environment_maps(&self) {
        refresh_environment_reflections(&self.ctx, self.camera.znear(), self.camera.zfar());
    }

    /// Checks that every persistent uniform slot holds its default buffer.
    pub fn verify_bindings(&self) -> Result<(), Vec<BindingViolation>> {
        self.ctx.defaults().verify(self.ctx.gpu().as_ref())
    }

    /// Selects what the final pass shows.
    pub fn set_output_view(&mut self, view: OutputView) {
        if view != self.output_view {
            log::info!("output view: {view:?}");
        }
        self.output_view = view;
    }

    /// What the final pass shows.
    #[inline]
    pub fn output_view(&self) -> OutputView {
        self.output_view
    }

    #[inline]
    pub fn camera(&self) -> &FirstPersonCamera3d {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut FirstPersonCamera3d {
        &mut self.camera
    }

    /// The state shared by the passes.
    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// Mutable access to the loaded scene.
    #[inline]
    pub fn scene_mut(&mut self) -> &mut Scene {
        self.ctx.scene_mut()
    }

    /// Resizes the window surface. Render targets keep the size they were created with.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.ctx.gpu().resize_surface(width, height);
        self.camera.set_aspect(width as f32 / height as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::UniformSlot;
    use crate::gpu::{HeadlessDevice, RenderDevice};
    use crate::renderer::test_scene;
    use std::rc::Rc;

    #[test]
    fn passes_run_in_resolved_order() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let mut renderer = test_scene::renderer(&device);
        device.clear_commands();
        assert!(renderer.render_frame());

        let programs: Vec<_> = device.draws().into_iter().map(|d| d.program_name).collect();
        let first = |name: &str| programs.iter().position(|p| p == name).unwrap();
        let last = |name: &str| programs.iter().rposition(|p| p == name).unwrap();
        assert!(last("shadow_transparency") < first("gbuffer"));
        assert!(last("deferred_lighting") < first("post_process_init"));
        assert_eq!(programs.last().map(String::as_str), Some("post_process"));
    }

    #[test]
    fn bindings_are_restored_after_a_frame() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let mut renderer = test_scene::renderer(&device);
        assert!(renderer.render_frame());

        assert_eq!(renderer.verify_bindings(), Ok(()));
        let ctx = renderer.context();
        assert_eq!(
            device.uniform_binding(UniformSlot::Camera),
            Some(ctx.camera_buffer().id())
        );
        assert_eq!(
            device.uniform_binding(UniformSlot::ShadowViewProjection),
            Some(ctx.shadow_buffers().spot_view_projections().id())
        );
        assert_eq!(
            device.uniform_binding(UniformSlot::ShadowPositions),
            Some(ctx.shadow_buffers().spot_positions().id())
        );
        assert_eq!(device.diagnostics(), vec![]);
    }

    #[test]
    fn cube_maps_are_rendered_once_unless_dynamic() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let mut renderer = test_scene::renderer(&device);
        device.clear_commands();
        assert!(renderer.render_frame());
        let static_draws = device.draws().len();

        let device = Rc::new(HeadlessDevice::new(32, 16));
        let gpu: Gpu = device.clone();
        let settings = test_scene::settings().with_dynamic_environment_maps(true);
        let scene = Scene::load(&gpu, &test_scene::description(), &settings).unwrap();
        let mut renderer = Renderer::new(&gpu, scene, settings).unwrap();
        device.clear_commands();
        assert!(renderer.render_frame());
        assert!(device.draws().len() > static_draws);
    }

    #[test]
    fn output_view_reaches_the_final_pass() {
        let device = Rc::new(HeadlessDevice::new(32, 16));
        let mut renderer = test_scene::renderer(&device);
        renderer.set_output_view(OutputView::Normal);
        assert!(renderer.render_frame());
        let last = device.draws().pop().unwrap();
        assert_eq!(last.subroutines, OutputView::Normal.selection());
    }
}
