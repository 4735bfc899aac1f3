//! wgpu implementation of [`GraphicsContext`].
//!
//! [`GpuContext`] owns the wgpu instance, device, queue and window surface,
//! and translates the immediate-mode calls the renderer makes into wgpu work:
//!
//! - buffer objects are wgpu buffers, (re)allocated on upload and written
//!   through the queue,
//! - "compiling" a stage creates a shader module and "linking" builds a render
//!   pipeline inside a validation error scope, so interface mismatches surface
//!   as [`ShaderError::Link`],
//! - every `draw_elements` snapshots the bound buffers and the four matrix
//!   uniforms into a pending draw with its own 256-byte uniform block,
//! - [`present`](GraphicsContext::present) acquires the surface texture and
//!   replays all pending draws in one render pass.
//!
//! Pipelines are cached per program, primitive, depth state and whether the
//! draw has normals.
//!
//! # Device loss
//!
//! A lost device flips [`is_context_lost`](GraphicsContext::is_context_lost).
//! Call [`GpuContext::recover`] to request a new device; it bumps the
//! [`ContextGeneration`] so cached buffer handles get recreated.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use winit::window::Window;
//! use xsthree::{GpuContext, Renderer, RendererConfig};
//!
//! fn renderer_for(window: Arc<Window>) -> anyhow::Result<Renderer<GpuContext>> {
//!     let config = RendererConfig::new().size(500, 500);
//!     let gpu = GpuContext::new(window, &config)?;
//!     Ok(Renderer::new(gpu, config))
//! }
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Mat4;
use winit::window::Window;

use crate::context::{
    BufferId, BufferTarget, BufferUsage, Capability, ClearMask, ContextError, ContextGeneration,
    DepthFunc, GraphicsContext, IndexType, Primitive, ProgramId, ShaderError, ShaderId,
    ShaderStage, UniformLocation,
};
use crate::program;
use crate::renderer::RendererConfig;

/// Matrix uniforms the scene shaders read, in slot order.
const MATRIX_UNIFORMS: usize = 4;

/// Size of one per-draw uniform block. Four matrices fill it exactly and it
/// matches the default dynamic offset alignment.
const UNIFORM_BLOCK: u64 = 256;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];
const NORMAL_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x3];

/// One per-draw uniform block, laid out like `Uniforms` in the vertex stage.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    model_view: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    object3d: [[f32; 4]; 4],
}

impl SceneUniforms {
    fn from_slots(slots: &[Mat4; MATRIX_UNIFORMS]) -> Self {
        Self {
            model_view: slots[0].to_cols_array_2d(),
            normal: slots[1].to_cols_array_2d(),
            projection: slots[2].to_cols_array_2d(),
            object3d: slots[3].to_cols_array_2d(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AttributeState {
    enabled: bool,
    buffer: Option<BufferId>,
    offset: u64,
}

struct CompiledShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct LinkedProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    primitive: Primitive,
    depth_test: bool,
    depth_func: DepthFunc,
    lit: bool,
}

/// A draw recorded by `draw_elements`, replayed at present.
#[derive(Clone, Copy, Debug)]
struct PendingDraw {
    key: PipelineKey,
    position: (BufferId, u64),
    color: (BufferId, u64),
    normal: Option<(BufferId, u64)>,
    index: BufferId,
    first_index: u32,
    count: u32,
    uniform_offset: u32,
}

/// Depth and multisample attachments sized to the surface.
struct FrameTargets {
    size: (u32, u32),
    depth: wgpu::TextureView,
    msaa: Option<wgpu::TextureView>,
}

impl FrameTargets {
    fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, sample_count: u32) -> Self {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };
        let attachment = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };

        Self {
            size: (size.width, size.height),
            depth: attachment("Scene Depth", DEPTH_FORMAT),
            msaa: (sample_count > 1).then(|| attachment("Scene MSAA Color", config.format)),
        }
    }
}

/// Growable uniform buffer holding one block per pending draw.
struct UniformArena {
    layout: wgpu::BindGroupLayout,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

impl UniformArena {
    fn new(device: &wgpu::Device) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(UNIFORM_BLOCK),
                },
                count: None,
            }],
        });
        let (buffer, bind_group) = Self::allocate(device, &layout, UNIFORM_BLOCK * 16);

        Self {
            layout,
            buffer,
            bind_group,
            capacity: UNIFORM_BLOCK * 16,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniforms"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Uniforms Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(UNIFORM_BLOCK),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Upload `blocks`, growing the buffer first if they don't fit.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, blocks: &[u8]) {
        let needed = blocks.len() as u64;
        if needed > self.capacity {
            let capacity = needed.next_power_of_two();
            log::debug!("growing uniform arena to {capacity} bytes");
            (self.buffer, self.bind_group) = Self::allocate(device, &self.layout, capacity);
            self.capacity = capacity;
        }
        if !blocks.is_empty() {
            queue.write_buffer(&self.buffer, 0, blocks);
        }
    }
}

/// GPU context holding wgpu resources, driven through [`GraphicsContext`].
///
/// The surface, device, queue and surface configuration stay public so a
/// host can reach wgpu directly when it needs to.
pub struct GpuContext {
    /// The surface frames are presented to.
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
    instance: wgpu::Instance,
    sample_count: u32,
    generation: ContextGeneration,
    lost: Arc<AtomicBool>,
    next_id: u32,
    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    bound: HashMap<BufferTarget, BufferId>,
    shaders: HashMap<ShaderId, CompiledShader>,
    programs: HashMap<ProgramId, LinkedProgram>,
    current_program: Option<ProgramId>,
    attributes: [AttributeState; program::ATTRIBUTES.len()],
    uniforms: [Mat4; MATRIX_UNIFORMS],
    depth_test: bool,
    depth_func: DepthFunc,
    viewport: Option<(i32, i32, u32, u32)>,
    clear_color: wgpu::Color,
    clear_depth: f32,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    arena: UniformArena,
    targets: FrameTargets,
    pending: Vec<PendingDraw>,
    staging: Vec<u8>,
}

impl GpuContext {
    /// Create a context rendering into `window`.
    ///
    /// Sets up the instance, surface, adapter, device and queue, then
    /// configures the surface with an sRGB format and Fifo present mode.
    /// `config.alpha` asks for a compositing alpha mode and `config.antialias`
    /// for 4x multisampling.
    pub fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self, ContextError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|err| ContextError::Surface(err.to_string()))?;

        let (adapter, device, queue, lost) = request_device(&instance, &surface)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| ContextError::Surface("surface reports no formats".into()))?;
        let alpha_mode = pick_alpha_mode(&surface_caps.alpha_modes, config.alpha);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let sample_count = if config.antialias { 4 } else { 1 };
        let arena = UniformArena::new(&device);
        let pipeline_layout = create_pipeline_layout(&device, &arena);
        let targets = FrameTargets::new(&device, &surface_config, sample_count);

        log::info!(
            "gpu context on {:?} ({:?}), {format:?} {}x{}, {sample_count}x msaa",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_config.width,
            surface_config.height,
        );

        Ok(Self {
            surface,
            device,
            queue,
            config: surface_config,
            instance,
            sample_count,
            generation: ContextGeneration::default(),
            lost,
            next_id: 0,
            buffers: HashMap::new(),
            bound: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            attributes: Default::default(),
            uniforms: [Mat4::IDENTITY; MATRIX_UNIFORMS],
            depth_test: false,
            depth_func: DepthFunc::default(),
            viewport: None,
            clear_color: wgpu::Color::BLACK,
            clear_depth: 1.0,
            pipeline_layout,
            pipelines: HashMap::new(),
            arena,
            targets,
            pending: Vec::new(),
            staging: Vec::new(),
        })
    }

    /// Request a fresh device after a loss and start a new generation.
    ///
    /// Every handle from the previous generation is dropped. The renderer
    /// notices the new generation on its next tick and rebuilds.
    pub fn recover(&mut self) -> Result<(), ContextError> {
        let (_adapter, device, queue, lost) = request_device(&self.instance, &self.surface)?;
        self.surface.configure(&device, &self.config);

        self.arena = UniformArena::new(&device);
        self.pipeline_layout = create_pipeline_layout(&device, &self.arena);
        self.targets = FrameTargets::new(&device, &self.config, self.sample_count);
        self.device = device;
        self.queue = queue;
        self.lost = lost;

        self.buffers.clear();
        self.bound.clear();
        self.shaders.clear();
        self.programs.clear();
        self.pipelines.clear();
        self.pending.clear();
        self.staging.clear();
        self.current_program = None;
        self.attributes = Default::default();
        self.depth_test = false;
        self.viewport = None;

        self.generation = self.generation.next();
        log::info!("gpu context recovered as {}", self.generation);
        Ok(())
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_pipeline(&self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program)?;

        let mut buffers = vec![
            wgpu::VertexBufferLayout {
                array_stride: 12,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION_ATTRIBUTES,
            },
            wgpu::VertexBufferLayout {
                array_stride: 16,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &COLOR_ATTRIBUTES,
            },
        ];
        if key.lit {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: 12,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &NORMAL_ATTRIBUTES,
            });
        }

        let (depth_write_enabled, depth_compare) = if key.depth_test {
            (true, compare_function(key.depth_func))
        } else {
            (false, wgpu::CompareFunction::Always)
        };

        Some(
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Scene Pipeline"),
                    layout: Some(&self.pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &program.vertex,
                        entry_point: Some(if key.lit { "vs_main" } else { "vs_main_unlit" }),
                        buffers: &buffers,
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &program.fragment,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: self.config.format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: topology(key.primitive),
                        cull_mode: None,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled,
                        depth_compare,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState {
                        count: self.sample_count,
                        ..Default::default()
                    },
                    multiview: None,
                    cache: None,
                }),
        )
    }

    fn attribute_source(&self, location: usize) -> Result<(BufferId, u64), ContextError> {
        let state = self.attributes[location];
        match (state.enabled, state.buffer) {
            (true, Some(buffer)) => Ok((buffer, state.offset)),
            _ => Err(ContextError::MissingAttribute(location as u32)),
        }
    }

    fn surface_texture(&mut self) -> Result<Option<wgpu::SurfaceTexture>, ContextError> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out acquiring a surface texture, dropping frame");
                Ok(None)
            }
            Err(err) => Err(ContextError::Surface(err.to_string())),
        }
    }
}

fn request_device(
    instance: &wgpu::Instance,
    surface: &wgpu::Surface<'static>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue, Arc<AtomicBool>), ContextError> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: Some(surface),
        force_fallback_adapter: false,
    }))
    .map_err(|err| ContextError::Adapter(err.to_string()))?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("XSThree Device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
        experimental_features: Default::default(),
    }))
    .map_err(|err| ContextError::Device(err.to_string()))?;

    let lost = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&lost);
    device.set_device_lost_callback(move |reason, message| {
        // Dropping our own device reports `Destroyed`; that is not a loss.
        if !matches!(reason, wgpu::DeviceLostReason::Destroyed) {
            log::error!("gpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        }
    });

    Ok((adapter, device, queue, lost))
}

fn create_pipeline_layout(device: &wgpu::Device, arena: &UniformArena) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Scene Pipeline Layout"),
        bind_group_layouts: &[&arena.layout],
        push_constant_ranges: &[],
    })
}

fn pick_alpha_mode(modes: &[wgpu::CompositeAlphaMode], alpha: bool) -> wgpu::CompositeAlphaMode {
    let wanted: &[wgpu::CompositeAlphaMode] = if alpha {
        &[
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
    } else {
        &[wgpu::CompositeAlphaMode::Opaque]
    };
    wanted
        .iter()
        .find(|mode| modes.contains(mode))
        .or_else(|| modes.first())
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

fn compare_function(func: DepthFunc) -> wgpu::CompareFunction {
    match func {
        DepthFunc::Never => wgpu::CompareFunction::Never,
        DepthFunc::Less => wgpu::CompareFunction::Less,
        DepthFunc::Equal => wgpu::CompareFunction::Equal,
        DepthFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthFunc::Greater => wgpu::CompareFunction::Greater,
        DepthFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        DepthFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// Copy size rounded up to wgpu's 4-byte buffer alignment.
fn aligned_len(len: usize) -> u64 {
    (len.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64).max(wgpu::COPY_BUFFER_ALIGNMENT)
}

impl GraphicsContext for GpuContext {
    fn generation(&self) -> ContextGeneration {
        self.generation
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn create_buffer(&mut self) -> Result<BufferId, ContextError> {
        if self.is_context_lost() {
            return Err(ContextError::Lost);
        }
        let id = BufferId(self.allocate_id());
        self.buffers.insert(id, None);
        Ok(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        self.bound.insert(target, buffer);
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        _usage: BufferUsage,
    ) -> Result<(), ContextError> {
        if self.is_context_lost() {
            return Err(ContextError::Lost);
        }
        let id = *self
            .bound
            .get(&target)
            .ok_or(ContextError::NoBoundBuffer(target))?;
        let slot = self
            .buffers
            .get_mut(&id)
            .ok_or(ContextError::UnknownBuffer(id))?;

        let size = aligned_len(data.len());
        let buffer = match slot.take().filter(|buffer| buffer.size() >= size) {
            Some(buffer) => slot.insert(buffer),
            None => slot.insert(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Scene Buffer"),
                size,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })),
        };

        if !data.is_empty() {
            let bytes = if data.len() as u64 == size {
                Cow::Borrowed(data)
            } else {
                let mut padded = data.to_vec();
                padded.resize(size as usize, 0);
                Cow::Owned(padded)
            };
            self.queue.write_buffer(buffer, 0, &bytes);
        }
        Ok(())
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, ShaderError> {
        if self.is_context_lost() {
            return Err(ContextError::Lost.into());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "Scene Vertex Shader",
                    ShaderStage::Fragment => "Scene Fragment Shader",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::Compile {
                stage,
                log: error.to_string(),
            });
        }

        let id = ShaderId(self.allocate_id());
        self.shaders.insert(id, CompiledShader { stage, module });
        Ok(id)
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, ShaderError> {
        if self.is_context_lost() {
            return Err(ContextError::Lost.into());
        }
        let module = |id: ShaderId, stage: ShaderStage| match self.shaders.get(&id) {
            Some(shader) if shader.stage == stage => Ok(shader.module.clone()),
            Some(shader) => Err(ShaderError::Link(format!(
                "{id:?} is a {} shader, expected {stage}",
                shader.stage
            ))),
            None => Err(ShaderError::UnknownShader(id)),
        };
        let linked = LinkedProgram {
            vertex: module(vertex, ShaderStage::Vertex)?,
            fragment: module(fragment, ShaderStage::Fragment)?,
        };

        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, linked);

        // Building both pipeline variants checks the stage interfaces.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        for lit in [true, false] {
            let key = PipelineKey {
                program: id,
                primitive: Primitive::Triangles,
                depth_test: self.depth_test,
                depth_func: self.depth_func,
                lit,
            };
            if let Some(pipeline) = self.create_pipeline(key) {
                self.pipelines.insert(key, pipeline);
            }
        }
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            self.programs.remove(&id);
            self.pipelines.retain(|key, _| key.program != id);
            return Err(ShaderError::Link(error.to_string()));
        }

        log::debug!("linked program {id:?}");
        Ok(id)
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program) {
            self.current_program = Some(program);
        } else {
            log::warn!("use_program with unknown program {program:?}");
        }
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .contains_key(&program)
            .then(|| program::attribute_slot(name))
            .flatten()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        // Samplers have no binding in the scene shaders.
        self.programs
            .contains_key(&program)
            .then(|| program::uniform_slot(name))
            .flatten()
            .filter(|slot| (*slot as usize) < MATRIX_UNIFORMS)
            .map(UniformLocation)
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        if let Some(state) = self.attributes.get_mut(location as usize) {
            state.enabled = true;
        }
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        if let Some(state) = self.attributes.get_mut(location as usize) {
            state.enabled = false;
        }
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        components: u32,
        _normalized: bool,
        stride: u32,
        offset: u32,
    ) {
        let buffer = self.bound.get(&BufferTarget::Array).copied();
        let Some(state) = self.attributes.get_mut(location as usize) else {
            log::warn!("attribute location {location} is out of range");
            return;
        };
        if stride != 0 && stride != components * 4 {
            log::warn!("attribute {location}: only tightly packed data is supported, stride {stride} ignored");
        }
        state.buffer = buffer;
        state.offset = offset as u64;
    }

    fn uniform_matrix4(&mut self, location: UniformLocation, value: &Mat4) {
        if let Some(slot) = self.uniforms.get_mut(location.0 as usize) {
            *slot = *value;
        }
    }

    fn enable(&mut self, capability: Capability) {
        match capability {
            Capability::DepthTest => self.depth_test = true,
        }
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.depth_func = func;
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        // Zero sizes happen while minimized and are not valid surface sizes.
        if width == 0 || height == 0 || (width, height) == self.targets.size {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.targets = FrameTargets::new(&self.device, &self.config, self.sample_count);
        log::debug!("surface resized to {width}x{height}");
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
    }

    fn clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    fn clear(&mut self, mask: ClearMask) {
        // Surface textures start undefined, so every frame's pass clears
        // color and depth with the current clear values anyway.
        log::trace!("clear {mask:?} folded into the next frame's pass");
    }

    fn draw_elements(
        &mut self,
        mode: Primitive,
        count: u32,
        index_type: IndexType,
        offset: u32,
    ) -> Result<(), ContextError> {
        if self.is_context_lost() {
            return Err(ContextError::Lost);
        }
        let program = self.current_program.ok_or(ContextError::NoProgram)?;
        let index = *self
            .bound
            .get(&BufferTarget::ElementArray)
            .ok_or(ContextError::NoBoundBuffer(BufferTarget::ElementArray))?;

        let position = self.attribute_source(0)?;
        let color = self.attribute_source(1)?;
        let normal = self.attribute_source(2).ok();

        let uniform_offset = self.staging.len() as u32;
        let block = SceneUniforms::from_slots(&self.uniforms);
        self.staging.extend_from_slice(bytemuck::bytes_of(&block));

        self.pending.push(PendingDraw {
            key: PipelineKey {
                program,
                primitive: mode,
                depth_test: self.depth_test,
                depth_func: self.depth_func,
                lit: normal.is_some(),
            },
            position,
            color,
            normal,
            index,
            first_index: offset / index_type.size(),
            count,
            uniform_offset,
        });
        Ok(())
    }

    fn flush(&mut self) {
        // Draws are batched until present.
    }

    fn present(&mut self) -> Result<(), ContextError> {
        if self.is_context_lost() {
            self.pending.clear();
            self.staging.clear();
            return Ok(());
        }

        let Some(frame) = self.surface_texture()? else {
            self.pending.clear();
            self.staging.clear();
            return Ok(());
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.arena.upload(&self.device, &self.queue, &self.staging);

        let missing: Vec<PipelineKey> = self
            .pending
            .iter()
            .map(|draw| draw.key)
            .filter(|key| !self.pipelines.contains_key(key))
            .collect();
        for key in missing {
            if let Some(pipeline) = self.create_pipeline(key) {
                self.pipelines.insert(key, pipeline);
            }
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });

        {
            let (color_view, resolve_target) = match &self.targets.msaa {
                Some(msaa) => (msaa, Some(&view)),
                None => (&view, None),
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_depth),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (target_width, target_height) = self.targets.size;
            if let Some((x, y, width, height)) = self.viewport {
                let x = x.clamp(0, target_width as i32) as u32;
                let y = y.clamp(0, target_height as i32) as u32;
                let width = width.min(target_width - x);
                let height = height.min(target_height - y);
                if width > 0 && height > 0 {
                    pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
                }
            }

            let buffer = |id: BufferId| self.buffers.get(&id).and_then(Option::as_ref);
            for draw in &self.pending {
                let (Some(pipeline), Some(position), Some(color), Some(index)) = (
                    self.pipelines.get(&draw.key),
                    buffer(draw.position.0),
                    buffer(draw.color.0),
                    buffer(draw.index),
                ) else {
                    log::warn!("dropping draw with missing resources: {draw:?}");
                    continue;
                };

                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &self.arena.bind_group, &[draw.uniform_offset]);
                pass.set_vertex_buffer(0, position.slice(draw.position.1..));
                pass.set_vertex_buffer(1, color.slice(draw.color.1..));
                if let Some((normal, offset)) = draw.normal {
                    let Some(normal) = buffer(normal) else {
                        log::warn!("dropping draw with a missing normal buffer: {draw:?}");
                        continue;
                    };
                    pass.set_vertex_buffer(2, normal.slice(offset..));
                }
                pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(draw.first_index..draw.first_index + draw.count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        log::trace!("presented {} draws", self.pending.len());
        self.pending.clear();
        self.staging.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_are_padded_to_four_bytes() {
        assert_eq!(aligned_len(0), 4);
        assert_eq!(aligned_len(6), 8);
        assert_eq!(aligned_len(12), 12);
    }

    #[test]
    fn matrices_fill_one_uniform_block() {
        assert_eq!(std::mem::size_of::<SceneUniforms>() as u64, UNIFORM_BLOCK);

        let mut slots = [Mat4::IDENTITY; MATRIX_UNIFORMS];
        slots[3] = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let block = SceneUniforms::from_slots(&slots);
        assert_eq!(block.object3d[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn depth_funcs_map_one_to_one() {
        assert_eq!(compare_function(DepthFunc::LessEqual), wgpu::CompareFunction::LessEqual);
        assert_eq!(compare_function(DepthFunc::default()), wgpu::CompareFunction::Less);
        assert_eq!(topology(Primitive::Triangles), wgpu::PrimitiveTopology::TriangleList);
    }

    #[test]
    fn alpha_mode_prefers_compositing_when_asked() {
        let modes = [
            wgpu::CompositeAlphaMode::Opaque,
            wgpu::CompositeAlphaMode::PreMultiplied,
        ];
        assert_eq!(pick_alpha_mode(&modes, true), wgpu::CompositeAlphaMode::PreMultiplied);
        assert_eq!(pick_alpha_mode(&modes, false), wgpu::CompositeAlphaMode::Opaque);
        assert_eq!(
            pick_alpha_mode(&[wgpu::CompositeAlphaMode::Inherit], true),
            wgpu::CompositeAlphaMode::Inherit
        );
    }

    #[test]
    fn scene_shaders_expose_the_backend_entry_points() {
        assert!(program::VERTEX_SHADER.contains("fn vs_main("));
        assert!(program::VERTEX_SHADER.contains("fn vs_main_unlit("));
        assert!(program::FRAGMENT_SHADER.contains("fn fs_main("));
    }
}
