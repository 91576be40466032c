use crate::camera::MoveKey;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::gpu::{Gpu, Severity, WgpuDevice};
use crate::renderer::Renderer;
use crate::scene::{Scene, SceneDescription};
use crate::settings::RenderSettings;
use crate::shader::OutputView;
use std::rc::Rc;
use std::sync::Arc;
use web_time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowAttributes, WindowId};

/// Opens a window and renders a scene in it until the window is closed.
///
/// Escape quits, W/A/S/D move, the mouse looks around while captured (Shift+Z toggles the
/// capture), the wheel zooms and the keys 1 to 7 select the displayed buffer.
///
/// # Example
///
/// ```no_run
/// use deferred3d::prelude::*;
///
/// fn main() -> deferred3d::Result<()> {
///     let settings = RenderSettings::default().with_title("empty room");
///     MainLoop::run(settings, SceneDescription::new())
/// }
/// ```
pub struct MainLoop {
    settings: RenderSettings,
    description: SceneDescription,
    running: Option<Running>,
    error: Option<Error>,
    modifiers: ModifiersState,
    cursor_grabbed: bool,
}

struct Running {
    window: Arc<Window>,
    renderer: Renderer,
    last_frame: Instant,
}

impl MainLoop {
    /// Runs the event loop on the current thread. Returns once the window is closed, or with
    /// the error that prevented the renderer from starting.
    pub fn run(settings: RenderSettings, description: SceneDescription) -> Result<()> {
        let event_loop = EventLoop::new().map_err(|e| Error::EventLoop(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = MainLoop {
            settings,
            description,
            running: None,
            error: None,
            modifiers: ModifiersState::empty(),
            cursor_grabbed: false,
        };
        event_loop
            .run_app(&mut app)
            .map_err(|e| Error::EventLoop(e.to_string()))?;

        match app.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attributes = WindowAttributes::default()
            .with_title(self.settings.title.clone())
            .with_inner_size(PhysicalSize::new(self.settings.width, self.settings.height))
            .with_resizable(false)
            .with_visible(false);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| Error::EventLoop(e.to_string()))?,
        );

        let (ctx, surface) = pollster::block_on(Context::for_window(window.clone()))?;
        let device = WgpuDevice::new(
            ctx,
            surface,
            self.settings.width,
            self.settings.height,
            self.settings.vsync,
        )?;
        let gpu: Gpu = Rc::new(device);

        let started = Instant::now();
        let scene = Scene::load(&gpu, &self.description, &self.settings)?;
        let mut renderer = Renderer::new(&gpu, scene, self.settings.clone())?;
        renderer
            .camera_mut()
            .set_aspect(self.settings.aspect());
        log::info!(
            "scene ready in {:.1} ms: {} objects, {} point lights, {} spot lights",
            started.elapsed().as_secs_f64() * 1000.0,
            renderer.context().scene().objects().len(),
            renderer.context().scene().point_lights().len(),
            renderer.context().scene().spot_lights().len(),
        );

        window.set_visible(true);
        Ok(Running {
            window,
            renderer,
            last_frame: Instant::now(),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn toggle_cursor_grab(&mut self) {
        let Some(running) = &self.running else {
            return;
        };
        let window = &running.window;
        let grab = !self.cursor_grabbed;
        let result = if grab {
            window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        match result {
            Ok(()) => {
                window.set_cursor_visible(!grab);
                self.cursor_grabbed = grab;
            }
            Err(e) => log::warn!("failed to change the cursor grab: {e}"),
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;

        if let Some(key) = move_key(code) {
            if !event.repeat {
                if let Some(running) = &mut self.running {
                    running.renderer.camera_mut().handle_key(key, pressed);
                }
            }
            return;
        }
        if !pressed {
            return;
        }

        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::KeyZ if self.modifiers.shift_key() => self.toggle_cursor_grab(),
            _ => {
                if let (Some(view), Some(running)) =
                    (output_view(code).and_then(OutputView::from_index), &mut self.running)
                {
                    running.renderer.set_output_view(view);
                }
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = &mut self.running else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(running.last_frame).as_secs_f32();
        running.last_frame = now;

        running.renderer.camera_mut().update(dt);
        if !running.renderer.render_frame() {
            log::debug!("surface unavailable, frame skipped");
        }

        let gpu = running.renderer.context().gpu().clone();
        let mut fatal = false;
        for diagnostic in gpu.drain_diagnostics() {
            if diagnostic.severity == Severity::Notification && !self.settings.verbose_diagnostics
            {
                continue;
            }
            diagnostic.log();
            fatal |= diagnostic.severity == Severity::High;
        }
        if fatal {
            log::error!("exiting after a high-severity GPU diagnostic");
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for MainLoop {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(error) => self.fail(event_loop, error),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(running) = &mut self.running {
                    running.renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 20.0) as f32,
                };
                if let Some(running) = &mut self.running {
                    let dt = running.last_frame.elapsed().as_secs_f32();
                    running.renderer.camera_mut().handle_wheel(steps, dt.max(1.0 / 60.0));
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _: &ActiveEventLoop, _: DeviceId, event: DeviceEvent) {
        if !self.cursor_grabbed {
            return;
        }
        if let (DeviceEvent::MouseMotion { delta: (dx, dy) }, Some(running)) =
            (event, &mut self.running)
        {
            let dt = running.last_frame.elapsed().as_secs_f32();
            running
                .renderer
                .camera_mut()
                .handle_mouse_motion(dx as f32, dy as f32, dt.max(1.0 / 60.0));
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}

fn move_key(code: KeyCode) -> Option<MoveKey> {
    match code {
        KeyCode::KeyW => Some(MoveKey::Forward),
        KeyCode::KeyS => Some(MoveKey::Backward),
        KeyCode::KeyA => Some(MoveKey::Left),
        KeyCode::KeyD => Some(MoveKey::Right),
        _ => None,
    }
}

/// Index of the output view bound to a digit key.
fn output_view(code: KeyCode) -> Option<usize> {
    let index = match code {
        KeyCode::Digit1 => 0,
        KeyCode::Digit2 => 1,
        KeyCode::Digit3 => 2,
        KeyCode::Digit4 => 3,
        KeyCode::Digit5 => 4,
        KeyCode::Digit6 => 5,
        KeyCode::Digit7 => 6,
        _ => return None,
    };
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_keys_cover_every_output_view() {
        let digits = [
            KeyCode::Digit1,
            KeyCode::Digit2,
            KeyCode::Digit3,
            KeyCode::Digit4,
            KeyCode::Digit5,
            KeyCode::Digit6,
            KeyCode::Digit7,
        ];
        let views: Vec<_> = digits
            .iter()
            .filter_map(|code| output_view(*code).and_then(OutputView::from_index))
            .collect();
        assert_eq!(views, OutputView::ALL.to_vec());
        assert_eq!(output_view(KeyCode::Digit8), None);
    }

    #[test]
    fn wasd_maps_to_camera_moves() {
        assert_eq!(move_key(KeyCode::KeyW), Some(MoveKey::Forward));
        assert_eq!(move_key(KeyCode::KeyA), Some(MoveKey::Left));
        assert_eq!(move_key(KeyCode::KeyQ), None);
    }
}
