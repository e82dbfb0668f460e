use anyhow::Context as _;
use cgmath::Point3;
use std::{sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalPosition, PhysicalSize},
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{
    config::AppConfig,
    gfx::{
        camera::{CameraController, FlyCamera},
        device::{GfxError, GraphicsContext, WgpuBackend},
        scene::{Scene, SceneParameters},
    },
    ui::{scene_editor_panel, UiManager},
};

/// The lantern window: one lit scene, a free-fly camera and the editor panel.
pub struct LanternApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

/// Everything that exists only once the window and device are up.
struct Runtime {
    ctx: GraphicsContext<WgpuBackend>,
    scene: Option<Scene>,
    ui: UiManager,
}

struct AppState {
    config: AppConfig,
    window: Option<Arc<Window>>,
    runtime: Option<Runtime>,
    camera: FlyCamera,
    controller: CameraController,
    params: SceneParameters,
    last_frame: Instant,
    error: Option<anyhow::Error>,
}

impl LanternApp {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;

        let camera = FlyCamera::new(Point3::from(config.camera_position));
        let controller = CameraController::new(config.width);

        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                config,
                window: None,
                runtime: None,
                camera,
                controller,
                params: SceneParameters::default(),
                last_frame: Instant::now(),
                error: None,
            },
        })
    }

    /// Runs the event loop until the window closes.
    ///
    /// # Errors
    /// Start-up failures (no GPU, missing or invalid shaders) and fatal
    /// frame errors.
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .context("event loop already consumed")?;
        event_loop.set_control_flow(ControlFlow::Poll);

        event_loop
            .run_app(&mut self.app_state)
            .context("event loop terminated abnormally")?;

        match self.app_state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let PhysicalSize { width, height } = window.inner_size();
        let backend = pollster::block_on(WgpuBackend::new(
            window.clone(),
            width.max(1),
            height.max(1),
            self.config.present_mode,
        ))
        .context("failed to initialise the graphics device")?;

        let ui = UiManager::new(
            backend.device(),
            backend.queue(),
            backend.surface_format(),
            &window,
        );

        let mut ctx = GraphicsContext::new(backend);
        let shader_dir = &self.config.shader_dir;
        let scene = Scene::new(&mut ctx, shader_dir)
            .with_context(|| format!("failed to load shaders from {}", shader_dir.display()))?
            .with_clip_planes(self.config.znear, self.config.zfar);
        log::info!("window ready at {width}x{height}");

        // The pointer starts at the window centre, hidden; Left Ctrl shows it.
        let centre = PhysicalPosition::new(width as f64 / 2.0, height as f64 / 2.0);
        self.camera.set_last_pointer(centre.x as f32, centre.y as f32);
        if let Err(err) = window.set_cursor_position(centre) {
            log::debug!("cannot place cursor: {err}");
        }
        window.set_cursor_visible(false);
        self.controller.set_window_width(width);

        self.runtime = Some(Runtime {
            ctx,
            scene: Some(scene),
            ui,
        });
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn redraw(&mut self, window: &Window) -> anyhow::Result<()> {
        let now = Instant::now();
        let delta_time = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.controller.update_camera(&mut self.camera, delta_time);

        let Some(runtime) = self.runtime.as_mut() else {
            return Ok(());
        };
        runtime.frame(window, &self.camera, &mut self.params)
    }

    fn shutdown(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            if let Some(scene) = runtime.scene.take() {
                scene.destroy(&mut runtime.ctx);
            }
            log::info!("shut down");
        }
    }
}

impl Runtime {
    /// UI first so its edits reach this frame's uniforms, then the scene, then
    /// the UI overlay on top.
    fn frame(
        &mut self,
        window: &Window,
        camera: &FlyCamera,
        params: &mut SceneParameters,
    ) -> anyhow::Result<()> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(());
        };

        self.ctx.backend_mut().begin_frame();
        self.ui.update_logic(window, |ui| {
            scene_editor_panel(ui, params);
        });

        let aspect = self.ctx.backend().aspect();
        if let Err(err) = scene.render(&mut self.ctx, camera, params, aspect) {
            self.ui.discard_frame();
            return Err(err).context("failed to record the scene");
        }

        let ui = &mut self.ui;
        let presented = self
            .ctx
            .backend_mut()
            .end_frame(params.clear_color(), |device, queue, encoder, view| {
                ui.render_display_only(device, queue, encoder, view);
            });
        // No-op when the overlay was painted.
        self.ui.discard_frame();

        match presented {
            Err(GfxError::Surface(wgpu::SurfaceError::Timeout)) => {
                log::warn!("surface timed out; frame skipped");
                Ok(())
            }
            other => other.context("failed to present frame"),
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        let ui_captured = runtime.ui.handle_input(&window, window_id, &event);

        match event {
            WindowEvent::KeyboardInput {
                event: key_event, ..
            } => {
                if is_escape_press(&key_event) {
                    event_loop.exit();
                    return;
                }
                // Key releases always reach the controller so no key stays held.
                let was_suspended = self.controller.is_suspended();
                self.controller.process_keyboard_event(&key_event);
                if was_suspended != self.controller.is_suspended() {
                    window.set_cursor_visible(self.controller.is_suspended());
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(warp) = self
                    .controller
                    .process_cursor_moved(position, &mut self.camera)
                {
                    if let Err(err) = window.set_cursor_position(warp) {
                        log::debug!("cannot warp cursor: {err}");
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !ui_captured {
                    self.controller.process_scroll(&delta, &mut self.camera);
                }
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                runtime.ctx.backend_mut().resize(width, height);
                runtime.ui.update_display_size(width, height);
                self.controller.set_window_width(width);
            }
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw(&window) {
                    self.fail(event_loop, err);
                }
            }
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn is_escape_press(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed
        && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
}
