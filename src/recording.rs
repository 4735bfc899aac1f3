//! A headless [`GraphicsContext`] that records every call.
//!
//! `RecordingContext` keeps the same bookkeeping a real GL context would
//! (bound buffers, buffer contents, enabled attributes, the program in use) and
//! appends a [`Command`] for every state-changing call. It backs the test-suite
//! and is handy for running the frame loop without a window.
//!
//! It can also simulate the two failure modes the renderer has to cope with:
//! shader compile/link failures and context loss.
//!
//! ```
//! use xsthree::{Camera, CameraParams, RecordingContext, Renderer, RendererConfig, Scene, shapes};
//!
//! let mut scene = Scene::new("demo");
//! scene.add_object(shapes::plane(2.0, 2.0)).unwrap();
//! let mut camera = Camera::new(CameraParams::default()).at(0.0, 0.0, -8.0);
//!
//! let mut renderer = Renderer::new(RecordingContext::new(), RendererConfig::default());
//! renderer.start().unwrap();
//! renderer.render(&scene, &mut camera).unwrap();
//!
//! assert_eq!(renderer.context().draw_calls().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use glam::Mat4;

use crate::context::{
    BufferId, BufferTarget, BufferUsage, Capability, ClearMask, ContextError, ContextGeneration,
    DepthFunc, GraphicsContext, IndexType, Primitive, ProgramId, ShaderError, ShaderId,
    ShaderStage, UniformLocation,
};
use crate::program;

/// One recorded context call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateBuffer(BufferId),
    BindBuffer(BufferTarget, BufferId),
    BufferData {
        target: BufferTarget,
        buffer: BufferId,
        len: usize,
        usage: BufferUsage,
    },
    CompileShader(ShaderStage, ShaderId),
    LinkProgram(ProgramId),
    UseProgram(ProgramId),
    EnableAttrib(u32),
    DisableAttrib(u32),
    AttribPointer {
        location: u32,
        components: u32,
        buffer: BufferId,
    },
    UniformMatrix4 {
        location: UniformLocation,
        value: [f32; 16],
    },
    Enable(Capability),
    DepthFunc(DepthFunc),
    Viewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    ResizeSurface {
        width: u32,
        height: u32,
    },
    ClearColor([f32; 4]),
    ClearDepth(f32),
    Clear(ClearMask),
    DrawElements {
        mode: Primitive,
        count: u32,
        index_type: IndexType,
        offset: u32,
    },
    Flush,
    Present,
}

/// A draw call pulled out of the command log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub mode: Primitive,
    pub count: u32,
    pub index_type: IndexType,
    pub offset: u32,
}

/// Headless, recording implementation of [`GraphicsContext`].
#[derive(Debug, Default)]
pub struct RecordingContext {
    generation: ContextGeneration,
    lost: bool,
    next_id: u32,
    buffers: HashMap<BufferId, Vec<u8>>,
    bound: HashMap<BufferTarget, BufferId>,
    shaders: HashMap<ShaderId, ShaderStage>,
    programs: HashSet<ProgramId>,
    current_program: Option<ProgramId>,
    enabled_attribs: HashSet<u32>,
    attrib_buffers: HashMap<u32, BufferId>,
    surface: (u32, u32),
    failing_stage: Option<ShaderStage>,
    failing_link: bool,
    commands: Vec<Command>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every compile of `stage` fail with a fake info log.
    pub fn failing_compile(mut self, stage: ShaderStage) -> Self {
        self.failing_stage = Some(stage);
        self
    }

    /// Make every program link fail.
    pub fn failing_link(mut self) -> Self {
        self.failing_link = true;
        self
    }

    /// Stop failing shader compiles and links.
    pub fn heal_shaders(&mut self) {
        self.failing_stage = None;
        self.failing_link = false;
    }

    /// Simulate the context going away.
    ///
    /// Every handle created so far becomes invalid; calls are ignored until
    /// [`restore_context`](Self::restore_context).
    pub fn lose_context(&mut self) {
        log::warn!("recording context {} lost", self.generation);
        self.lost = true;
        self.buffers.clear();
        self.bound.clear();
        self.shaders.clear();
        self.programs.clear();
        self.current_program = None;
        self.enabled_attribs.clear();
        self.attrib_buffers.clear();
    }

    /// Bring a lost context back under a new generation.
    pub fn restore_context(&mut self) {
        self.lost = false;
        self.generation = self.generation.next();
        log::info!("recording context restored as {}", self.generation);
    }

    /// Every command recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drain the command log.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Draw calls recorded so far, in order.
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.commands
            .iter()
            .filter_map(|command| match *command {
                Command::DrawElements {
                    mode,
                    count,
                    index_type,
                    offset,
                } => Some(DrawCall {
                    mode,
                    count,
                    index_type,
                    offset,
                }),
                _ => None,
            })
            .collect()
    }

    /// Number of buffers created so far.
    pub fn created_buffers(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::CreateBuffer(_)))
            .count()
    }

    /// Current contents of a live buffer.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Size of the backing surface in physical pixels.
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn record(&mut self, command: Command) {
        log::trace!("{command:?}");
        self.commands.push(command);
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsContext for RecordingContext {
    fn generation(&self) -> ContextGeneration {
        self.generation
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn create_buffer(&mut self) -> Result<BufferId, ContextError> {
        if self.lost {
            return Err(ContextError::Lost);
        }
        let id = BufferId(self.allocate_id());
        self.buffers.insert(id, Vec::new());
        self.record(Command::CreateBuffer(id));
        Ok(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        if self.lost {
            return;
        }
        self.bound.insert(target, buffer);
        self.record(Command::BindBuffer(target, buffer));
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), ContextError> {
        if self.lost {
            return Err(ContextError::Lost);
        }
        let buffer = *self
            .bound
            .get(&target)
            .ok_or(ContextError::NoBoundBuffer(target))?;
        let contents = self
            .buffers
            .get_mut(&buffer)
            .ok_or(ContextError::UnknownBuffer(buffer))?;
        contents.clear();
        contents.extend_from_slice(data);
        self.record(Command::BufferData {
            target,
            buffer,
            len: data.len(),
            usage,
        });
        Ok(())
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, ShaderError> {
        if self.lost {
            return Err(ContextError::Lost.into());
        }
        if self.failing_stage == Some(stage) {
            return Err(ShaderError::Compile {
                stage,
                log: "ERROR: 0:1: simulated compile failure".to_string(),
            });
        }
        if source.trim().is_empty() {
            return Err(ShaderError::Compile {
                stage,
                log: "empty shader source".to_string(),
            });
        }
        let id = ShaderId(self.allocate_id());
        self.shaders.insert(id, stage);
        self.record(Command::CompileShader(stage, id));
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, ShaderError> {
        if self.lost {
            return Err(ContextError::Lost.into());
        }
        match (self.shaders.get(&vertex), self.shaders.get(&fragment)) {
            (Some(ShaderStage::Vertex), Some(ShaderStage::Fragment)) => {}
            (Some(_), Some(_)) => {
                return Err(ShaderError::Link("stages attached in the wrong slots".into()));
            }
            (None, _) => return Err(ShaderError::UnknownShader(vertex)),
            (_, None) => return Err(ShaderError::UnknownShader(fragment)),
        }
        if self.failing_link {
            return Err(ShaderError::Link("simulated link failure".to_string()));
        }
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id);
        self.record(Command::LinkProgram(id));
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.lost || !self.programs.contains(&program) {
            return;
        }
        self.current_program = Some(program);
        self.record(Command::UseProgram(program));
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        if !self.programs.contains(&program) {
            return None;
        }
        program::attribute_slot(name)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if !self.programs.contains(&program) {
            return None;
        }
        program::uniform_slot(name).map(UniformLocation)
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        if self.lost {
            return;
        }
        self.enabled_attribs.insert(location);
        self.record(Command::EnableAttrib(location));
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        if self.lost {
            return;
        }
        self.enabled_attribs.remove(&location);
        self.record(Command::DisableAttrib(location));
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        components: u32,
        _normalized: bool,
        _stride: u32,
        _offset: u32,
    ) {
        if self.lost {
            return;
        }
        let Some(&buffer) = self.bound.get(&BufferTarget::Array) else {
            log::warn!("vertex_attrib_pointer({location}) with no array buffer bound");
            return;
        };
        self.attrib_buffers.insert(location, buffer);
        self.record(Command::AttribPointer {
            location,
            components,
            buffer,
        });
    }

    fn uniform_matrix4(&mut self, location: UniformLocation, value: &Mat4) {
        if self.lost {
            return;
        }
        self.record(Command::UniformMatrix4 {
            location,
            value: value.to_cols_array(),
        });
    }

    fn enable(&mut self, capability: Capability) {
        if self.lost {
            return;
        }
        self.record(Command::Enable(capability));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        if self.lost {
            return;
        }
        self.record(Command::DepthFunc(func));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        if self.lost {
            return;
        }
        self.record(Command::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
        if !self.lost {
            self.record(Command::ResizeSurface { width, height });
        }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        if self.lost {
            return;
        }
        self.record(Command::ClearColor([r, g, b, a]));
    }

    fn clear_depth(&mut self, depth: f32) {
        if self.lost {
            return;
        }
        self.record(Command::ClearDepth(depth));
    }

    fn clear(&mut self, mask: ClearMask) {
        if self.lost {
            return;
        }
        self.record(Command::Clear(mask));
    }

    fn draw_elements(
        &mut self,
        mode: Primitive,
        count: u32,
        index_type: IndexType,
        offset: u32,
    ) -> Result<(), ContextError> {
        if self.lost {
            return Err(ContextError::Lost);
        }
        if self.current_program.is_none() {
            return Err(ContextError::NoProgram);
        }
        let index_buffer = *self
            .bound
            .get(&BufferTarget::ElementArray)
            .ok_or(ContextError::NoBoundBuffer(BufferTarget::ElementArray))?;
        if !self.buffers.contains_key(&index_buffer) {
            return Err(ContextError::UnknownBuffer(index_buffer));
        }
        for location in &self.enabled_attribs {
            let buffer = self
                .attrib_buffers
                .get(location)
                .ok_or(ContextError::MissingAttribute(*location))?;
            if !self.buffers.contains_key(buffer) {
                return Err(ContextError::UnknownBuffer(*buffer));
            }
        }
        self.record(Command::DrawElements {
            mode,
            count,
            index_type,
            offset,
        });
        Ok(())
    }

    fn flush(&mut self) {
        if self.lost {
            return;
        }
        self.record(Command::Flush);
    }

    fn present(&mut self) -> Result<(), ContextError> {
        if self.lost {
            return Ok(());
        }
        self.record(Command::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_requires_a_bound_buffer() {
        let mut ctx = RecordingContext::new();
        let err = ctx
            .buffer_data(BufferTarget::Array, &[0, 1, 2, 3], BufferUsage::StaticDraw)
            .unwrap_err();
        assert!(matches!(err, ContextError::NoBoundBuffer(BufferTarget::Array)));
    }

    #[test]
    fn upload_replaces_contents() {
        let mut ctx = RecordingContext::new();
        let buffer = ctx.create_buffer().unwrap();
        ctx.bind_buffer(BufferTarget::Array, buffer);
        ctx.buffer_data(BufferTarget::Array, &[1, 2, 3, 4], BufferUsage::StaticDraw)
            .unwrap();
        ctx.buffer_data(BufferTarget::Array, &[9, 9], BufferUsage::StaticDraw)
            .unwrap();
        assert_eq!(ctx.buffer_contents(buffer), Some(&[9u8, 9][..]));
    }

    #[test]
    fn handles_do_not_survive_a_restore() {
        let mut ctx = RecordingContext::new();
        let buffer = ctx.create_buffer().unwrap();
        let before = ctx.generation();

        ctx.lose_context();
        assert!(ctx.is_context_lost());
        assert!(matches!(ctx.create_buffer(), Err(ContextError::Lost)));

        ctx.restore_context();
        assert_ne!(ctx.generation(), before);

        ctx.bind_buffer(BufferTarget::Array, buffer);
        let err = ctx
            .buffer_data(BufferTarget::Array, &[0; 4], BufferUsage::StaticDraw)
            .unwrap_err();
        assert!(matches!(err, ContextError::UnknownBuffer(id) if id == buffer));
    }

    #[test]
    fn simulated_compile_failure_reports_stage() {
        let mut ctx = RecordingContext::new().failing_compile(ShaderStage::Fragment);
        assert!(ctx.compile_shader(ShaderStage::Vertex, "vs").is_ok());
        let err = ctx.compile_shader(ShaderStage::Fragment, "fs").unwrap_err();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn draw_without_program_is_rejected() {
        let mut ctx = RecordingContext::new();
        let err = ctx
            .draw_elements(Primitive::Triangles, 3, IndexType::UnsignedShort, 0)
            .unwrap_err();
        assert!(matches!(err, ContextError::NoProgram));
    }
}
