//! Windowed runner: a winit event loop driving a [`Renderer`] over a [`GpuContext`].
//!
//! The setup closure runs once the window and device exist and returns the
//! [`FrameBinding`] to draw. After that every redraw is one
//! [`Renderer::tick`]:
//!
//! - window resizes and scale changes resize the renderer,
//! - left-button drags are forwarded to the renderer's drag control,
//! - a lost device is recreated and the renderer restarts on the next tick,
//! - closing the window stops the renderer and leaves the loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use glam::Vec2;
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::{Camera, CameraParams};
use crate::context::{ContextError, GraphicsContext};
use crate::frame::{FrameBinding, SharedCamera};
use crate::gpu::GpuContext;
use crate::renderer::{RenderError, Renderer, RendererConfig};

/// Failures that end [`run`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("could not create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Configuration for the app window.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub title: String,
    /// Logical window width.
    pub width: u32,
    /// Logical window height.
    pub height: u32,
    /// Whether dragging with the left button rotates the scene.
    pub drag_rotation: bool,
    pub antialias: bool,
    pub alpha: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "xsthree".to_string(),
            width: 500,
            height: 500,
            drag_rotation: true,
            antialias: true,
            alpha: false,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn drag_rotation(mut self, enabled: bool) -> Self {
        self.drag_rotation = enabled;
        self
    }

    pub fn antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn alpha(mut self, alpha: bool) -> Self {
        self.alpha = alpha;
        self
    }

    /// Renderer settings for a window of `width` × `height` logical pixels.
    pub fn renderer_config(&self, width: u32, height: u32, scale_factor: f64) -> RendererConfig {
        RendererConfig::new()
            .size(width, height)
            .device_pixel_ratio(scale_factor as f32)
            .alpha(self.alpha)
            .antialias(self.antialias)
            .drag_rotation(self.drag_rotation)
    }
}

/// Context handed to the setup closure.
pub struct SetupContext<'a> {
    pub config: &'a AppConfig,
    width: u32,
    height: u32,
}

impl SetupContext<'_> {
    /// Logical size of the window.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Build a shared camera, defaulting the aspect ratio to the window's.
    pub fn camera(&self, mut params: CameraParams) -> SharedCamera {
        params.aspect = params.aspect.or(Some(self.aspect()));
        Rc::new(RefCell::new(Camera::new(params)))
    }
}

type SetupFn = Box<dyn FnOnce(&mut SetupContext) -> FrameBinding>;

/// Run an application with the default configuration.
///
/// # Example
/// ```no_run
/// use xsthree::{CameraParams, FrameBinding, Scene, shapes};
///
/// xsthree::run(|ctx| {
///     let camera = ctx.camera(CameraParams::new());
///     camera.borrow_mut().transform.position.z = -8.0;
///
///     let mut scene = Scene::new("demo");
///     scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
///     FrameBinding::silent(scene.into_shared(), camera)
/// })
/// .unwrap();
/// ```
pub fn run<S>(setup: S) -> Result<(), AppError>
where
    S: FnOnce(&mut SetupContext) -> FrameBinding + 'static,
{
    run_with_config(AppConfig::default(), setup)
}

/// Run an application with a custom configuration.
///
/// Blocks until the window is closed or the renderer fails.
pub fn run_with_config<S>(config: AppConfig, setup: S) -> Result<(), AppError>
where
    S: FnOnce(&mut SetupContext) -> FrameBinding + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        state: AppState::Pending {
            config,
            setup: Some(Box::new(setup)),
        },
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct App {
    state: AppState,
    error: Option<AppError>,
}

enum AppState {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn>,
    },
    Running {
        window: Arc<Window>,
        renderer: Renderer<GpuContext>,
        cursor: Vec2,
    },
    Exited,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: AppError) {
        log::error!("{err}");
        self.error = Some(err);
        self.state = AppState::Exited;
        event_loop.exit();
    }

    fn launch(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        setup: SetupFn,
    ) -> Result<AppState, AppError> {
        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let scale_factor = window.scale_factor();
        let size = window.inner_size().to_logical::<u32>(scale_factor);
        let renderer_config = config.renderer_config(size.width, size.height, scale_factor);

        let gpu = GpuContext::new(Arc::clone(&window), &renderer_config)?;
        let mut renderer = Renderer::new(gpu, renderer_config);

        let mut ctx = SetupContext {
            config,
            width: size.width,
            height: size.height,
        };
        renderer.bind(setup(&mut ctx));
        renderer.start()?;
        window.request_redraw();

        Ok(AppState::Running {
            window,
            renderer,
            cursor: Vec2::ZERO,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Pending { config, setup } = &mut self.state else {
            return;
        };
        let Some(setup) = setup.take() else {
            return;
        };
        match Self::launch(event_loop, config, setup) {
            Ok(state) => self.state = state,
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let AppState::Running {
            window,
            renderer,
            cursor,
        } = &mut self.state
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                renderer.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let logical = size.to_logical::<u32>(window.scale_factor());
                renderer.resize(logical.width, logical.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                renderer.set_device_pixel_ratio(scale_factor as f32);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(window.scale_factor());
                *cursor = Vec2::new(logical.x, logical.y);
                renderer.pointer_move(*cursor);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => renderer.pointer_down(*cursor),
                ElementState::Released => renderer.pointer_up(),
            },
            WindowEvent::RedrawRequested => {
                let result = renderer.tick();

                if renderer.context().is_context_lost() {
                    if let Err(err) = renderer.context_mut().recover() {
                        log::warn!("device recovery failed, retrying next frame: {err}");
                    }
                }

                match result {
                    Ok(true) => window.request_redraw(),
                    Ok(false) => event_loop.exit(),
                    Err(RenderError::Context(ContextError::Lost)) => {
                        log::warn!("device lost mid-frame");
                        window.request_redraw();
                    }
                    Err(err) => self.fail(event_loop, err.into()),
                }
            }
            _ => {}
        }
    }
}
