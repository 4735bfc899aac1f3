//! The renderer and its frame loop.
//!
//! A [`Renderer`] owns a [`GraphicsContext`], compiles the shader program on
//! [`start`](Renderer::start) and then draws the bound scene once per
//! [`tick`](Renderer::tick). Every frame it walks the scene in order and, for
//! each object:
//!
//! 1. creates the object's buffers if it has none for the current context
//!    generation (once per object, not per frame),
//! 2. re-uploads vertices, colors, normals and indices in full,
//! 3. recomputes the camera and object matrices,
//! 4. points the attributes at the object's buffers, uploads the matrices,
//! 5. issues one indexed triangle-list draw and flushes.
//!
//! After the walk the idle-spin angle advances by one degree.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --start--> Running --stop--> Stopped
//!                  ^                            |
//!                  +------------start-----------+
//! ```
//!
//! `start` always re-runs setup, so it doubles as the restart path after a
//! context restore. A setup failure leaves the renderer where it was.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use xsthree::*;
//!
//! let mut scene = Scene::new("demo");
//! scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
//! let camera = Rc::new(RefCell::new(Camera::default().at(0.0, 0.0, -8.0)));
//!
//! let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::new().size(500, 500));
//! renderer.bind(FrameBinding::new(scene.into_shared(), camera, |stats| {
//!     assert_eq!(stats.draw_calls, 1);
//! }));
//! renderer.start().unwrap();
//! assert!(renderer.tick().unwrap());
//! ```

use std::f32::consts::PI;
use std::rc::Rc;

use glam::Vec2;
use thiserror::Error;

use crate::camera::Camera;
use crate::context::{
    BufferId, BufferTarget, BufferUsage, Capability, ClearMask, ContextError, ContextGeneration,
    DepthFunc, GraphicsContext, IndexType, Primitive, ShaderError,
};
use crate::frame::{FrameBinding, FrameStats};
use crate::geometry::GeometryError;
use crate::mouse::{DragControl, ViewOrientation};
use crate::object::{BufferSet, RenderObject};
use crate::program::ShaderProgram;
use crate::scene::Scene;
use crate::transform::{MatrixExt, RenderTransform};

/// Angle the idle spin advances by after every rendered frame.
pub const ROTATION_STEP: f32 = PI / 180.0;

/// Errors surfaced by the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("object `{name}` in slot {slot}: {source}")]
    Geometry {
        slot: usize,
        name: String,
        #[source]
        source: GeometryError,
    },

    #[error("renderer has not been started")]
    NotStarted,

    #[error("no scene and camera bound to the renderer")]
    Unbound,
}

/// Where a renderer is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    /// Setup finished; the frame loop has not been entered.
    Ready,
    Running,
    Stopped,
}

/// Surface and input settings for a renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Logical width in pixels.
    pub width: u32,
    /// Logical height in pixels.
    pub height: u32,
    /// Physical pixels per logical pixel.
    pub device_pixel_ratio: f32,
    /// Whether the surface keeps an alpha channel for compositing.
    pub alpha: bool,
    /// Whether to multisample.
    pub antialias: bool,
    /// Whether pointer drags rotate the scene.
    pub drag_rotation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            device_pixel_ratio: 1.0,
            alpha: false,
            antialias: true,
            drag_rotation: false,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn device_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn alpha(mut self, alpha: bool) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn antialias(mut self, antialias: bool) -> Self {
        self.antialias = antialias;
        self
    }

    pub fn drag_rotation(mut self, enabled: bool) -> Self {
        self.drag_rotation = enabled;
        self
    }
}

/// Draws a bound scene through a [`GraphicsContext`], one frame per tick.
pub struct Renderer<C: GraphicsContext> {
    ctx: C,
    config: RendererConfig,
    width: u32,
    height: u32,
    program: Option<ShaderProgram>,
    /// Generation the current program was built under.
    setup_generation: Option<ContextGeneration>,
    state: RendererState,
    running: bool,
    context_lost: bool,
    binding: Option<FrameBinding>,
    radian: f32,
    drag: DragControl,
    frame: u64,
}

impl<C: GraphicsContext> Renderer<C> {
    pub fn new(ctx: C, config: RendererConfig) -> Self {
        let mut drag = DragControl::new().enabled(config.drag_rotation);
        drag.set_surface(config.width as f32, config.height as f32);

        Self {
            ctx,
            width: config.width,
            height: config.height,
            config,
            program: None,
            setup_generation: None,
            state: RendererState::Uninitialized,
            running: false,
            context_lost: false,
            binding: None,
            radian: 0.0,
            drag,
            frame: 0,
        }
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    /// Current idle-spin angle in radians.
    pub fn rotation(&self) -> f32 {
        self.radian
    }

    /// Logical surface size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Backing surface size in physical pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        let scale = |logical: u32| {
            ((logical as f32 * self.config.device_pixel_ratio).round() as u32).max(1)
        };
        (scale(self.width), scale(self.height))
    }

    pub fn orientation(&self) -> ViewOrientation {
        self.drag.orientation()
    }

    pub fn drag(&self) -> &DragControl {
        &self.drag
    }

    pub fn drag_mut(&mut self) -> &mut DragControl {
        &mut self.drag
    }

    pub fn pointer_down(&mut self, position: Vec2) {
        self.drag.pointer_down(position);
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        self.drag.pointer_move(position);
    }

    pub fn pointer_up(&mut self) {
        self.drag.pointer_up();
    }

    /// Attach the scene, camera and callback to draw, returning the previous binding.
    pub fn bind(&mut self, binding: FrameBinding) -> Option<FrameBinding> {
        log::debug!("bound {binding:?}");
        self.binding.replace(binding)
    }

    pub fn unbind(&mut self) -> Option<FrameBinding> {
        self.binding.take()
    }

    pub fn binding(&self) -> Option<&FrameBinding> {
        self.binding.as_ref()
    }

    /// Run setup, enter the running state and size the surface.
    ///
    /// Setup compiles and links the shader program and enables depth testing
    /// with [`DepthFunc::LessEqual`]. It runs on every call, so `start` is also
    /// how a renderer comes back after a context restore.
    pub fn start(&mut self) -> Result<(), RenderError> {
        self.setup()?;
        self.running = true;
        self.state = RendererState::Running;
        self.resize(self.width, self.height);
        log::info!(
            "renderer running at {}x{} (dpr {})",
            self.width,
            self.height,
            self.config.device_pixel_ratio
        );
        Ok(())
    }

    fn setup(&mut self) -> Result<(), RenderError> {
        let program = ShaderProgram::build(&mut self.ctx).inspect_err(|err| {
            log::error!("could not initialise shader program: {err}");
        })?;

        self.ctx.enable(Capability::DepthTest);
        self.ctx.depth_func(DepthFunc::LessEqual);

        self.program = Some(program);
        self.setup_generation = Some(self.ctx.generation());
        if self.state == RendererState::Uninitialized {
            self.state = RendererState::Ready;
        }
        log::debug!("shader program {:?} ready", program.id);
        Ok(())
    }

    /// Leave the frame loop after the current frame.
    pub fn stop(&mut self) {
        if self.running {
            log::info!("renderer stopping after frame {}", self.frame);
        }
        self.running = false;
        if self.state == RendererState::Running {
            self.state = RendererState::Stopped;
        }
    }

    /// Run one iteration of the frame loop.
    ///
    /// Picks up context loss or restore, lets the drag control coast, renders
    /// the bound scene with the bound camera, hands the stats to the bound
    /// callback and presents. Returns whether the loop should keep going; a
    /// renderer that is not running does nothing and returns `false`.
    pub fn tick(&mut self) -> Result<bool, RenderError> {
        if !self.running {
            return Ok(false);
        }

        self.poll_context()?;
        self.drag.update();

        let (scene, camera) = match &self.binding {
            Some(binding) => (Rc::clone(&binding.scene), Rc::clone(&binding.camera)),
            None => return Err(RenderError::Unbound),
        };

        let stats = self.render(&scene.borrow(), &mut camera.borrow_mut())?;

        if let Some(binding) = self.binding.as_mut() {
            (binding.callback)(&stats);
        }

        if !stats.skipped {
            self.ctx.present()?;
        }

        Ok(self.running)
    }

    /// Tick until the renderer stops or `max_frames` frames have run.
    ///
    /// Returns the number of frames run.
    pub fn run_frames(&mut self, max_frames: u64) -> Result<u64, RenderError> {
        let mut frames = 0;
        while frames < max_frames && self.running {
            frames += 1;
            if !self.tick()? {
                break;
            }
        }
        Ok(frames)
    }

    fn poll_context(&mut self) -> Result<(), RenderError> {
        if self.ctx.is_context_lost() {
            if !self.context_lost {
                self.on_context_lost();
            }
        } else if self.context_lost || self.setup_generation != Some(self.ctx.generation()) {
            self.on_context_restored()?;
        }
        Ok(())
    }

    /// The context went away: stop drawing until it is restored.
    pub fn on_context_lost(&mut self) {
        log::warn!("graphics context lost, rendering suspended");
        self.context_lost = true;
    }

    /// The context is back: rebuild everything.
    ///
    /// The program is recompiled right away; object buffers notice the new
    /// context generation and are recreated the next time they are drawn.
    pub fn on_context_restored(&mut self) -> Result<(), RenderError> {
        log::info!(
            "graphics context restored ({}), restarting",
            self.ctx.generation()
        );
        self.context_lost = false;
        self.start()
    }

    /// Draw every object of `scene` once, as seen from `camera`.
    ///
    /// While the context is lost this is a no-op that returns skipped stats.
    pub fn render(&mut self, scene: &Scene, camera: &mut Camera) -> Result<FrameStats, RenderError> {
        let generation = self.ctx.generation();
        let mut stats = FrameStats {
            frame: self.frame,
            rotation: self.radian,
            generation,
            ..Default::default()
        };
        self.frame += 1;

        if self.context_lost {
            log::trace!("frame {} skipped, context lost", stats.frame);
            stats.skipped = true;
            return Ok(stats);
        }

        let program = self.program.ok_or(RenderError::NotStarted)?;
        let orientation = self.drag.orientation();

        for (slot, child) in scene.children().iter().enumerate() {
            let Some(handle) = child else {
                continue;
            };
            let mut object = handle.borrow_mut();
            object
                .geometry
                .validate()
                .map_err(|source| RenderError::Geometry {
                    slot,
                    name: object.name.clone(),
                    source,
                })?;

            stats.buffers_created += self.draw_object(&program, &mut object, camera, orientation)?;
            stats.draw_calls += 1;
        }

        self.radian += ROTATION_STEP;
        stats.rotation = self.radian;
        log::trace!(
            "frame {}: {} draws, {} new buffers",
            stats.frame,
            stats.draw_calls,
            stats.buffers_created
        );
        Ok(stats)
    }

    fn draw_object(
        &mut self,
        program: &ShaderProgram,
        object: &mut RenderObject,
        camera: &mut Camera,
        orientation: ViewOrientation,
    ) -> Result<usize, RenderError> {
        let (buffers, created) = self.ensure_buffers(object)?;
        let geometry = &object.geometry;
        let normals = buffers.normal.filter(|_| geometry.has_normals());

        self.upload(
            BufferTarget::Array,
            buffers.position,
            bytemuck::cast_slice(&geometry.vertices),
        )?;
        self.upload(
            BufferTarget::Array,
            buffers.color,
            bytemuck::cast_slice(&geometry.colors),
        )?;
        if let Some(normal) = normals {
            self.upload(
                BufferTarget::Array,
                normal,
                bytemuck::cast_slice(&geometry.normals),
            )?;
        }
        self.upload(
            BufferTarget::ElementArray,
            buffers.index,
            bytemuck::cast_slice(&geometry.indices),
        )?;
        let index_count = geometry.indices.len() as u32;

        update_matrices(camera, &mut object.transform, orientation, self.radian);

        let attributes = program.attributes;
        self.ctx.bind_buffer(BufferTarget::Array, buffers.position);
        self.ctx
            .vertex_attrib_pointer(attributes.position, 3, false, 0, 0);
        self.ctx.enable_vertex_attrib_array(attributes.position);

        self.ctx.bind_buffer(BufferTarget::Array, buffers.color);
        self.ctx.vertex_attrib_pointer(attributes.color, 4, false, 0, 0);
        self.ctx.enable_vertex_attrib_array(attributes.color);

        if let Some(location) = attributes.normal {
            match normals {
                Some(normal) => {
                    self.ctx.bind_buffer(BufferTarget::Array, normal);
                    self.ctx.vertex_attrib_pointer(location, 3, false, 0, 0);
                    self.ctx.enable_vertex_attrib_array(location);
                }
                // Don't leave the previous object's normals attached.
                None => self.ctx.disable_vertex_attrib_array(location),
            }
        }

        let uniforms = program.uniforms;
        self.ctx
            .uniform_matrix4(uniforms.model_view, &camera.model_view_matrix);
        self.ctx
            .uniform_matrix4(uniforms.normal, &camera.normal_matrix);
        self.ctx
            .uniform_matrix4(uniforms.projection, &camera.projection_matrix);
        self.ctx
            .uniform_matrix4(uniforms.object3d, &object.transform.local_matrix);

        self.ctx.draw_elements(
            Primitive::Triangles,
            index_count,
            IndexType::UnsignedShort,
            0,
        )?;
        self.ctx.flush();

        Ok(created)
    }

    /// Buffers for `object` under the current generation, creating what is missing.
    fn ensure_buffers(&mut self, object: &mut RenderObject) -> Result<(BufferSet, usize), ContextError> {
        let generation = self.ctx.generation();
        let mut created = 0;

        let mut set = match object.live_buffers(generation) {
            Some(set) => set,
            None => {
                if let Some(stale) = object.buffers() {
                    log::debug!(
                        "`{}` holds buffers from {}, recreating under {generation}",
                        object.name,
                        stale.generation
                    );
                }
                created += 3;
                BufferSet {
                    generation,
                    position: self.ctx.create_buffer()?,
                    color: self.ctx.create_buffer()?,
                    normal: None,
                    index: self.ctx.create_buffer()?,
                }
            }
        };

        if object.geometry.has_normals() && set.normal.is_none() {
            set.normal = Some(self.ctx.create_buffer()?);
            created += 1;
        }

        if created > 0 {
            log::debug!("created {created} buffers for `{}`", object.name);
            object.cache_buffers(set);
        }
        Ok((set, created))
    }

    fn upload(&mut self, target: BufferTarget, buffer: BufferId, bytes: &[u8]) -> Result<(), ContextError> {
        self.ctx.bind_buffer(target, buffer);
        self.ctx.buffer_data(target, bytes, BufferUsage::StaticDraw)
    }

    /// Resize the surface to `width` × `height` logical pixels.
    ///
    /// The backing surface and viewport are scaled by the device pixel ratio.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let (backing_width, backing_height) = self.backing_size();

        self.ctx.resize_surface(backing_width, backing_height);
        self.ctx.viewport(0, 0, backing_width, backing_height);
        self.drag.set_surface(width as f32, height as f32);
        self.clear();
    }

    /// Change the device pixel ratio and resize the backing surface to match.
    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.config.device_pixel_ratio = ratio;
        self.resize(self.width, self.height);
    }

    /// Clear color and depth to opaque black and 1.0.
    pub fn clear(&mut self) {
        self.ctx.clear_color(0.0, 0.0, 0.0, 1.0);
        self.ctx.clear_depth(1.0);
        self.ctx.clear(ClearMask::COLOR | ClearMask::DEPTH);
    }
}

/// Recompute the camera matrices and an object's local matrix for one draw.
///
/// The camera's projection follows its kind, its model-view is
/// `T(position) · R(angle, rotation axis)`, and the object's local matrix is
/// `T(position) · Rx(phi) · Ry(theta)`. The object's own `rotation` is not
/// used: every object shares `orientation`.
pub fn update_matrices(
    camera: &mut Camera,
    object: &mut RenderTransform,
    orientation: ViewOrientation,
    angle: f32,
) {
    camera.update_projection();
    camera.update_view(angle);

    object
        .local_matrix
        .reset()
        .translate(object.position)
        .rotate_x(orientation.phi)
        .rotate_y(orientation.theta);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::frame::SharedCamera;
    use crate::object::ObjectHandle;
    use crate::recording::{Command, DrawCall, RecordingContext};
    use crate::scene::SharedScene;
    use crate::shapes;

    fn started(config: RendererConfig) -> Renderer<RecordingContext> {
        let mut renderer = Renderer::new(RecordingContext::new(), config);
        renderer.start().unwrap();
        renderer.context_mut().clear_commands();
        renderer
    }

    fn camera() -> SharedCamera {
        Rc::new(RefCell::new(Camera::default().at(0.0, 0.0, -8.0)))
    }

    fn bound(scene: &SharedScene) -> Renderer<RecordingContext> {
        let mut renderer = started(RendererConfig::new().size(500, 500));
        renderer.bind(FrameBinding::silent(Rc::clone(scene), camera()));
        renderer
    }

    fn buffer_uploads(ctx: &RecordingContext) -> usize {
        ctx.commands()
            .iter()
            .filter(|command| matches!(command, Command::BufferData { .. }))
            .count()
    }

    #[test]
    fn plane_scene_end_to_end() {
        let mut scene = Scene::new("demo");
        scene.add_object(shapes::plane(2.0, 2.0)).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::new().size(500, 500));
        renderer.bind(FrameBinding::new(scene.into_shared(), camera(), move |stats| {
            sink.borrow_mut().push(*stats)
        }));
        renderer.start().unwrap();
        assert_eq!(renderer.state(), RendererState::Running);
        assert!(renderer.tick().unwrap());

        assert_eq!(
            renderer.context().draw_calls(),
            vec![DrawCall {
                mode: Primitive::Triangles,
                count: 6,
                index_type: IndexType::UnsignedShort,
                offset: 0,
            }]
        );
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].draw_calls, 1);
        assert_eq!(renderer.context().commands().last(), Some(&Command::Present));
    }

    #[test]
    fn start_enables_lequal_depth_and_sizes_the_surface() {
        let mut renderer = Renderer::new(
            RecordingContext::new(),
            RendererConfig::new().size(500, 400).device_pixel_ratio(2.0),
        );
        renderer.start().unwrap();

        let commands = renderer.context().commands();
        assert!(commands.contains(&Command::Enable(Capability::DepthTest)));
        assert!(commands.contains(&Command::DepthFunc(DepthFunc::LessEqual)));
        assert!(commands.contains(&Command::ResizeSurface {
            width: 1000,
            height: 800
        }));
        assert!(commands.contains(&Command::Viewport {
            x: 0,
            y: 0,
            width: 1000,
            height: 800
        }));
        assert_eq!(
            &commands[commands.len() - 3..],
            &[
                Command::ClearColor([0.0, 0.0, 0.0, 1.0]),
                Command::ClearDepth(1.0),
                Command::Clear(ClearMask::COLOR | ClearMask::DEPTH),
            ]
        );
        assert_eq!(renderer.context().surface_size(), (1000, 800));
    }

    #[test]
    fn one_draw_per_occupied_slot() {
        let mut scene = Scene::new("root");
        let plane = scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
        scene.add_empty();
        scene.add(&plane).unwrap();
        scene.add_object(shapes::triangle()).unwrap();
        scene.add_empty();

        let mut renderer = started(RendererConfig::default());
        let stats = renderer.render(&scene, &mut Camera::default()).unwrap();

        assert_eq!(stats.draw_calls, 3);
        let counts: Vec<u32> = renderer
            .context()
            .draw_calls()
            .iter()
            .map(|draw| draw.count)
            .collect();
        assert_eq!(counts, vec![6, 6, 3]);
    }

    #[test]
    fn buffers_are_created_once_and_refilled_every_frame() {
        let mut scene = Scene::new("root");
        let plane = scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
        let mut camera = Camera::default();
        let mut renderer = started(RendererConfig::default());

        let first = renderer.render(&scene, &mut camera).unwrap();
        let cached = *plane.borrow().buffers().unwrap();
        let bytes_after_first = renderer
            .context()
            .buffer_contents(cached.position)
            .unwrap()
            .to_vec();

        let second = renderer.render(&scene, &mut camera).unwrap();
        renderer.render(&scene, &mut camera).unwrap();

        assert_eq!(first.buffers_created, 3);
        assert_eq!(second.buffers_created, 0);
        assert_eq!(renderer.context().created_buffers(), 3);
        assert_eq!(buffer_uploads(renderer.context()), 3 * 3);
        assert_eq!(*plane.borrow().buffers().unwrap(), cached);

        let bytes = renderer.context().buffer_contents(cached.position).unwrap();
        assert_eq!(bytes, bytes_after_first.as_slice());
        assert_eq!(bytes, bytemuck::cast_slice::<f32, u8>(&plane.borrow().geometry.vertices));
    }

    #[test]
    fn changed_vertices_are_picked_up_next_frame() {
        let mut scene = Scene::new("root");
        let plane = scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
        let mut camera = Camera::default();
        let mut renderer = started(RendererConfig::default());
        renderer.render(&scene, &mut camera).unwrap();

        plane.borrow_mut().geometry.vertices[0] = -5.0;
        renderer.render(&scene, &mut camera).unwrap();

        let position = plane.borrow().buffers().unwrap().position;
        let uploaded: &[f32] =
            bytemuck::cast_slice(renderer.context().buffer_contents(position).unwrap());
        assert_eq!(uploaded[0], -5.0);
    }

    #[test]
    fn lost_context_renders_nothing() {
        let mut scene = Scene::new("root");
        scene.add_object(shapes::cube(1.0)).unwrap();
        let mut renderer = started(RendererConfig::default());

        renderer.on_context_lost();
        let stats = renderer.render(&scene, &mut Camera::default()).unwrap();

        assert!(stats.skipped);
        assert_eq!(stats.draw_calls, 0);
        assert!(renderer.context().commands().is_empty());
        assert_eq!(renderer.rotation(), 0.0);
    }

    #[test]
    fn rotation_advances_one_degree_per_render() {
        let scene = Scene::new("empty");
        let mut camera = Camera::default();
        let mut renderer = started(RendererConfig::default());

        let mut previous = renderer.rotation();
        for _ in 0..5 {
            let stats = renderer.render(&scene, &mut camera).unwrap();
            assert!((stats.rotation - previous - ROTATION_STEP).abs() < 1e-6);
            previous = stats.rotation;
        }
        assert!((renderer.rotation() - 5.0 * PI / 180.0).abs() < 1e-5);
    }

    #[test]
    fn render_before_start_is_an_error() {
        let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::default());
        let err = renderer
            .render(&Scene::new("root"), &mut Camera::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::NotStarted));
    }

    #[test]
    fn shader_failure_is_fatal_at_start() {
        let ctx = RecordingContext::new().failing_compile(crate::context::ShaderStage::Vertex);
        let mut renderer = Renderer::new(ctx, RendererConfig::default());

        let err = renderer.start().unwrap_err();
        assert!(matches!(err, RenderError::Shader(ShaderError::Compile { .. })));
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert!(!renderer.is_running());
        assert!(!renderer.tick().unwrap());
    }

    #[test]
    fn tick_without_binding_is_an_error() {
        let mut renderer = started(RendererConfig::default());
        assert!(matches!(renderer.tick(), Err(RenderError::Unbound)));
    }

    #[test]
    fn stopped_renderer_does_not_draw() {
        let scene = Scene::new("root").into_shared();
        scene.borrow_mut().add_object(shapes::plane(1.0, 1.0)).unwrap();
        let mut renderer = bound(&scene);

        renderer.stop();
        assert_eq!(renderer.state(), RendererState::Stopped);
        assert!(!renderer.tick().unwrap());
        assert!(renderer.context().draw_calls().is_empty());
        assert_eq!(renderer.run_frames(10).unwrap(), 0);
    }

    #[test]
    fn run_frames_ticks_until_the_limit() {
        let scene = Scene::new("root").into_shared();
        scene.borrow_mut().add_object(shapes::plane(1.0, 1.0)).unwrap();
        let mut renderer = bound(&scene);

        assert_eq!(renderer.run_frames(4).unwrap(), 4);
        assert_eq!(renderer.context().draw_calls().len(), 4);
    }

    #[test]
    fn scene_changes_between_ticks_are_drawn() {
        let scene = Scene::new("root").into_shared();
        scene.borrow_mut().add_object(shapes::plane(1.0, 1.0)).unwrap();
        let mut renderer = bound(&scene);

        renderer.tick().unwrap();
        scene.borrow_mut().add_object(shapes::triangle()).unwrap();
        renderer.tick().unwrap();

        assert_eq!(renderer.context().draw_calls().len(), 1 + 2);
    }

    #[test]
    fn rebinding_swaps_the_scene() {
        let first = Scene::new("first").into_shared();
        first.borrow_mut().add_object(shapes::plane(1.0, 1.0)).unwrap();
        let second = Scene::new("second").into_shared();
        second.borrow_mut().add_object(shapes::cube(1.0)).unwrap();

        let mut renderer = bound(&first);
        renderer.tick().unwrap();
        let previous = renderer.bind(FrameBinding::silent(Rc::clone(&second), camera()));
        renderer.tick().unwrap();

        assert!(previous.is_some());
        let counts: Vec<u32> = renderer
            .context()
            .draw_calls()
            .iter()
            .map(|draw| draw.count)
            .collect();
        assert_eq!(counts, vec![6, 36]);
    }

    #[test]
    fn restore_recreates_buffers_under_the_new_generation() {
        let scene = Scene::new("root").into_shared();
        let plane = scene
            .borrow_mut()
            .add_object(shapes::plane(2.0, 2.0))
            .unwrap();
        let mut renderer = bound(&scene);

        renderer.tick().unwrap();
        let before = *plane.borrow().buffers().unwrap();

        renderer.context_mut().lose_context();
        renderer.tick().unwrap();
        assert!(renderer.is_context_lost());
        assert_eq!(renderer.context().draw_calls().len(), 1);

        renderer.context_mut().restore_context();
        renderer.tick().unwrap();
        assert!(!renderer.is_context_lost());

        let after = *plane.borrow().buffers().unwrap();
        assert_ne!(after.generation, before.generation);
        assert_ne!(after.position, before.position);
        assert_eq!(renderer.context().created_buffers(), 6);
        assert_eq!(renderer.context().draw_calls().len(), 2);
    }

    #[test]
    fn normals_are_bound_only_for_lit_objects() {
        let mut scene = Scene::new("root");
        let cube = scene.add_object(shapes::cube(1.0)).unwrap();
        scene.add_object(shapes::plane(1.0, 1.0)).unwrap();
        let mut renderer = started(RendererConfig::default());

        let stats = renderer.render(&scene, &mut Camera::default()).unwrap();
        assert_eq!(stats.buffers_created, 4 + 3);
        assert!(cube.borrow().buffers().unwrap().normal.is_some());

        let commands = renderer.context().commands();
        let draws: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, command)| matches!(command, Command::DrawElements { .. }))
            .map(|(i, _)| i)
            .collect();
        assert!(commands[..draws[0]].contains(&Command::EnableAttrib(2)));
        assert!(commands[draws[0]..draws[1]].contains(&Command::DisableAttrib(2)));
    }

    #[test]
    fn objects_share_the_drag_orientation() {
        let mut scene = Scene::new("root");
        let left = scene.add_object(shapes::plane(1.0, 1.0).at(-2.0, 0.0, 0.0)).unwrap();
        let right = scene
            .add_object(
                shapes::triangle()
                    .at(2.0, 0.0, 0.0)
                    .tinted(crate::Color::WHITE),
            )
            .unwrap();
        right.borrow_mut().transform.rotation = Vec3::new(9.0, 9.0, 9.0);

        let mut renderer = started(RendererConfig::new().size(500, 500).drag_rotation(true));
        renderer.pointer_down(Vec2::new(100.0, 100.0));
        renderer.pointer_move(Vec2::new(150.0, 130.0));
        let o = renderer.orientation();
        renderer.render(&scene, &mut Camera::default()).unwrap();

        let expected = |handle: &ObjectHandle| {
            Mat4::from_translation(handle.borrow().transform.position)
                * Mat4::from_rotation_x(o.phi)
                * Mat4::from_rotation_y(o.theta)
        };
        for handle in [&left, &right] {
            let local = handle.borrow().transform.local_matrix;
            assert!(local.abs_diff_eq(expected(handle), 1e-5));
        }
    }

    #[test]
    fn uploads_camera_and_object_matrices() {
        let mut scene = Scene::new("root");
        scene.add_object(shapes::plane(1.0, 1.0).at(1.0, 2.0, 3.0)).unwrap();
        let mut camera = Camera::default().at(0.0, 0.0, -8.0);
        let mut renderer = started(RendererConfig::default());
        renderer.render(&scene, &mut camera).unwrap();

        let uniforms: Vec<_> = renderer
            .context()
            .commands()
            .iter()
            .filter_map(|command| match command {
                Command::UniformMatrix4 { location, value } => Some((location.0, *value)),
                _ => None,
            })
            .collect();

        assert_eq!(uniforms.len(), 4);
        assert_eq!(uniforms[0], (0, camera.model_view_matrix.to_cols_array()));
        assert_eq!(uniforms[1], (1, camera.normal_matrix.to_cols_array()));
        assert_eq!(uniforms[2], (2, camera.projection_matrix.to_cols_array()));
        assert_eq!(
            uniforms[3],
            (
                3,
                Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)).to_cols_array()
            )
        );
    }

    #[test]
    fn geometry_broken_after_add_fails_the_frame() {
        let mut scene = Scene::new("root");
        let plane = scene.add_object(shapes::plane(1.0, 1.0)).unwrap();
        plane.borrow_mut().geometry.indices.push(9);

        let mut renderer = started(RendererConfig::default());
        let err = renderer.render(&scene, &mut Camera::default()).unwrap_err();
        assert!(matches!(err, RenderError::Geometry { slot: 0, .. }));
        assert!(renderer.context().draw_calls().is_empty());
    }

    #[test]
    fn camera_kind_survives_a_setter_across_frames() {
        let mut scene = Scene::new("root");
        scene.add_object(shapes::plane(1.0, 1.0)).unwrap();
        let mut camera = Camera::default();
        camera.orthogonal(-1.0, 1.0, -1.0, 1.0, 0.1, 100.0);

        let mut renderer = started(RendererConfig::default());
        renderer.render(&scene, &mut camera).unwrap();

        assert_eq!(camera.kind(), crate::ProjectionKind::Perspective);
        assert_eq!(
            camera.projection_matrix,
            Mat4::perspective_rh_gl(45f32.to_radians(), 1.0, 0.1, 100.0)
        );
    }
}
