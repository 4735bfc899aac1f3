//! # xsthree
//!
//! **A small retained-scene 3D renderer: build a scene, point a camera at it,
//! and let the frame loop draw it.**
//!
//! A [`Scene`] is an ordered list of [`RenderObject`]s (geometry plus a
//! transform). A [`Renderer`] draws the bound scene through a
//! [`GraphicsContext`] once per tick, spinning the camera by a degree each
//! frame and rotating every object by the shared drag orientation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use xsthree::*;
//!
//! fn main() -> Result<(), AppError> {
//!     init_logging(LoggingConfig::default());
//!
//!     run_with_config(AppConfig::new().title("Plane").size(500, 500), |ctx| {
//!         let camera = ctx.camera(CameraParams::new());
//!         camera.borrow_mut().transform.position = Vec3::new(0.0, 0.0, -8.0);
//!
//!         let mut scene = Scene::new("root");
//!         scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
//!
//!         FrameBinding::new(scene.into_shared(), camera, |stats| {
//!             log::trace!("drew {} objects", stats.draw_calls);
//!         })
//!     })
//! }
//! ```
//!
//! ## Backends
//!
//! - [`GpuContext`] renders into a winit window through wgpu.
//! - [`RecordingContext`] records every call and draws nothing, for tests and
//!   headless runs.

mod app;
mod camera;
mod color;
mod context;
mod frame;
mod geometry;
mod gpu;
mod logging;
mod mouse;
mod object;
mod program;
mod recording;
mod renderer;
mod scene;
pub mod shapes;
mod transform;

pub use app::{AppConfig, AppError, SetupContext, run, run_with_config};
pub use camera::{Camera, CameraParams, ProjectionKind};
pub use color::{Color, Hsl};
pub use context::{
    BufferId, BufferTarget, BufferUsage, Capability, ClearMask, ContextError, ContextGeneration,
    DepthFunc, GraphicsContext, IndexType, Primitive, ProgramId, ShaderError, ShaderId,
    ShaderStage, UniformLocation,
};
pub use frame::{FrameBinding, FrameCallback, FrameStats, SharedCamera};
pub use geometry::{Geometry, GeometryError, MAX_VERTICES};
pub use gpu::GpuContext;
pub use logging::{DEFAULT_FILTER, LoggingConfig, init_logging};
pub use mouse::{DragControl, ViewOrientation};
pub use object::{BufferSet, ObjectHandle, RenderObject};
pub use program::{
    ATTRIBUTES, AttributeLocations, FRAGMENT_SHADER, ShaderProgram, UNIFORMS, UniformLocations,
    VERTEX_SHADER,
};
pub use recording::{Command, DrawCall, RecordingContext};
pub use renderer::{
    ROTATION_STEP, RenderError, Renderer, RendererConfig, RendererState, update_matrices,
};
pub use scene::{Scene, SharedScene};
pub use transform::{MatrixExt, RenderTransform};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
