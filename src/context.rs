//! The graphics context contract the renderer is written against.
//!
//! The renderer never talks to wgpu directly. It drives a small, WebGL shaped
//! immediate-mode API: create and bind buffers, upload bytes, compile and link
//! one program, point attributes at bound buffers, set matrix uniforms and issue
//! indexed draws. Anything implementing [`GraphicsContext`] can sit underneath:
//!
//! - [`GpuContext`](crate::GpuContext) translates the calls into wgpu resources and one
//!   render pass per frame.
//! - [`RecordingContext`](crate::RecordingContext) records every call, which is what the
//!   tests (and headless runs) use.
//!
//! # Context generations
//!
//! Handles handed out by a context are only meaningful for the context that
//! created them. When a context is lost and later restored, every handle from
//! before the loss is garbage. Contexts expose a [`ContextGeneration`] that
//! changes on every restore so callers holding cached handles can tell when to
//! recreate them.

use bitflags::bitflags;
use glam::Mat4;
use thiserror::Error;

/// Identifies one incarnation of a graphics context.
///
/// Bumped every time the underlying device is recreated after a loss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextGeneration(pub u64);

impl ContextGeneration {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ContextGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Handle to a buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle to a compiled shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Handle to a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Location of a uniform inside a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Binding point a buffer is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

/// Usage hint for uploaded buffer contents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    #[default]
    StaticDraw,
    DynamicDraw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Fixed-function state toggled with [`GraphicsContext::enable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
}

/// Depth comparison used when depth testing is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Primitive topology of an indexed draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    Lines,
    Points,
}

/// Element type of the bound index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    UnsignedShort,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            IndexType::UnsignedShort => 2,
        }
    }
}

bitflags! {
    /// Buffers cleared by [`GraphicsContext::clear`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 0b01;
        const DEPTH = 0b10;
    }
}

/// Errors raised by a graphics context.
#[derive(Error, Debug)]
pub enum ContextError {
    /// The context is lost; nothing can be created or drawn until it is restored.
    #[error("graphics context is lost")]
    Lost,

    /// A handle from another context (or another generation) was used.
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    /// An upload or draw needed a buffer bound to `target` and none was.
    #[error("no buffer bound to {0:?}")]
    NoBoundBuffer(BufferTarget),

    /// A draw was issued before any program was in use.
    #[error("no program in use")]
    NoProgram,

    /// A draw referenced an attribute that was never pointed at a buffer.
    #[error("attribute {0} is enabled but has no buffer")]
    MissingAttribute(u32),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(String),

    #[error("device request failed: {0}")]
    Device(String),

    #[error("surface error: {0}")]
    Surface(String),
}

/// Shader compilation and linking failures.
#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("could not link shader program: {0}")]
    Link(String),

    #[error("unknown shader {0:?}")]
    UnknownShader(ShaderId),

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// A WebGL shaped immediate-mode drawing context.
///
/// State set through one call (bound buffers, enabled attributes, uniform
/// values, the program in use) persists until changed, exactly like a GL
/// context. Implementations must keep uploads and draws in call order: a draw
/// observes every upload issued before it.
pub trait GraphicsContext {
    /// The current context generation.
    fn generation(&self) -> ContextGeneration;

    /// Whether the context is currently lost.
    fn is_context_lost(&self) -> bool;

    /// Create a new, empty buffer object.
    fn create_buffer(&mut self) -> Result<BufferId, ContextError>;

    /// Bind `buffer` to `target`.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId);

    /// Replace the whole contents of the buffer bound to `target`.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), ContextError>;

    /// Compile one shader stage.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str)
    -> Result<ShaderId, ShaderError>;

    /// Link a vertex and a fragment stage into a program.
    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId)
    -> Result<ProgramId, ShaderError>;

    /// Make `program` the program used by subsequent draws.
    fn use_program(&mut self, program: ProgramId);

    /// Location of the named vertex attribute, if the program has it.
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Location of the named uniform, if the program has it.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn enable_vertex_attrib_array(&mut self, location: u32);

    fn disable_vertex_attrib_array(&mut self, location: u32);

    /// Point attribute `location` at the buffer currently bound to
    /// [`BufferTarget::Array`], reading `components` floats per vertex.
    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        components: u32,
        normalized: bool,
        stride: u32,
        offset: u32,
    );

    /// Set a 4x4 matrix uniform (column-major, not transposed).
    fn uniform_matrix4(&mut self, location: UniformLocation, value: &Mat4);

    fn enable(&mut self, capability: Capability);

    fn depth_func(&mut self, func: DepthFunc);

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Resize the backing drawing surface, in physical pixels.
    fn resize_surface(&mut self, width: u32, height: u32);

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);

    fn clear_depth(&mut self, depth: f32);

    fn clear(&mut self, mask: ClearMask);

    /// Draw `count` indices from the bound element buffer.
    fn draw_elements(
        &mut self,
        mode: Primitive,
        count: u32,
        index_type: IndexType,
        offset: u32,
    ) -> Result<(), ContextError>;

    fn flush(&mut self);

    /// Hand the finished frame to the display.
    fn present(&mut self) -> Result<(), ContextError>;
}
