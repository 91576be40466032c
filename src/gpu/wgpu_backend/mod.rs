//! [`RenderDevice`] on top of wgpu.
//!
//! Binding calls only update CPU-side state. Each draw snapshots that state into bind groups
//! and appends itself to the open render pass of the bound framebuffer. Passes are encoded
//! and submitted when the frame ends, or earlier when a resource read by a pending draw is
//! overwritten, so that draws always see the data that was current when they were issued.

mod convert;
mod pipeline;
mod recorder;

use self::pipeline::{CompiledProgram, MipmapBlit, MipmapJob, PipelineKey};
use self::recorder::{Job, RecordedDraw, RenderPassJob};
use super::{
    AttachmentPoint, AttachmentTarget, BufferId, BufferKind, ClearFlags, Diagnostic,
    DiagnosticSource, DrawBuffers, FramebufferId, LayerSelection, ProgramConstant, ProgramDesc,
    ProgramId, RenderDevice, RenderState, SampleKind, Severity, SubroutineSelection, TextureDesc,
    TextureId, ViewDimension, SUBROUTINE_AXES,
};
use crate::binding::{TextureUnit, UniformSlot};
use crate::context::Context;
use crate::error::{GpuError, ShaderError};
use bytemuck::{Pod, Zeroable};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

/// Distance between two draw-constant blocks in the ring buffer.
const CONSTANTS_STRIDE: usize = 256;
/// Draws recorded before the ring buffer forces a submission.
const CONSTANTS_CAPACITY: usize = 4096;
/// Large enough for the biggest uniform block any program declares.
const FALLBACK_UNIFORM_SIZE: u64 = 8192;

/// Per-draw values read by every program at `@group(2) @binding(0)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DrawConstants {
    subroutines: [u32; SUBROUTINE_AXES],
    constants: [u32; 4],
    layer: u32,
    flip_y: f32,
    _padding: [u32; 2],
}

struct GpuTexture {
    texture: Rc<wgpu::Texture>,
    desc: TextureDesc,
    sampler: Rc<wgpu::Sampler>,
    base_level: u32,
    max_level: u32,
}

impl GpuTexture {
    fn visible_levels(&self) -> (u32, u32) {
        let last = self.desc.levels - 1;
        (self.base_level.min(last), self.max_level.min(last))
    }

    fn attachment_view(&self, target: &AttachmentTarget, layer: u32) -> wgpu::TextureView {
        let base_array_layer = match target.layers {
            LayerSelection::All => layer.min(self.desc.kind.layer_count() - 1),
            LayerSelection::Single(layer) => layer,
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&self.desc.label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: target.level,
            mip_level_count: Some(1),
            base_array_layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

struct GpuBuffer {
    buffer: Rc<wgpu::Buffer>,
    size: u64,
}

struct Frame {
    view: Rc<wgpu::TextureView>,
    texture: wgpu::SurfaceTexture,
}

/// The attachments a draw or clear goes to.
struct Target {
    colors: Vec<AttachmentTarget>,
    depth: Option<AttachmentTarget>,
    formats: Vec<wgpu::TextureFormat>,
    depth_format: Option<wgpu::TextureFormat>,
    size: (u32, u32),
    /// Largest layer count among attachments covering every layer.
    layers: u32,
    /// The surface image when drawing to the window.
    screen: Option<Rc<wgpu::TextureView>>,
}

struct State {
    next_handle: u32,
    textures: HashMap<TextureId, GpuTexture>,
    buffers: HashMap<BufferId, GpuBuffer>,
    framebuffers: HashMap<FramebufferId, BTreeMap<AttachmentPoint, AttachmentTarget>>,
    programs: HashMap<ProgramId, CompiledProgram>,
    pipelines: HashMap<PipelineKey, Option<Rc<wgpu::RenderPipeline>>>,
    blit: MipmapBlit,
    fallback_views: HashMap<(ViewDimension, bool), Rc<wgpu::TextureView>>,

    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    subroutines: SubroutineSelection,
    uniform_bindings: BTreeMap<UniformSlot, BufferId>,
    texture_bindings: BTreeMap<TextureUnit, TextureId>,
    render_state: RenderState,
    viewport: (u32, u32),
    clear_color: [f32; 4],

    jobs: Vec<Job>,
    /// Index in `jobs` of the pass receiving draws, per layer.
    open_passes: HashMap<u32, usize>,
    /// Buffers read by recorded draws.
    pending_buffers: HashSet<BufferId>,
    constants: Vec<u8>,
    constants_used: usize,

    surface_config: wgpu::SurfaceConfiguration,
    frame: Option<Frame>,
    diagnostics: Vec<Diagnostic>,
}

impl State {
    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn report(&mut self, severity: Severity, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::application(severity, message));
    }

    fn close_passes(&mut self) {
        self.open_passes.clear();
    }
}

/// A [`RenderDevice`] drawing to a window surface through wgpu.
pub struct WgpuDevice {
    ctx: Context,
    surface: wgpu::Surface<'static>,
    constants_layout: wgpu::BindGroupLayout,
    constants_buffer: wgpu::Buffer,
    constants_group: wgpu::BindGroup,
    fallback_uniform: Rc<wgpu::Buffer>,
    nearest_sampler: Rc<wgpu::Sampler>,
    linear_sampler: Rc<wgpu::Sampler>,
    compare_sampler: Rc<wgpu::Sampler>,
    state: RefCell<State>,
}

impl WgpuDevice {
    /// Configures `surface` to `width × height` and prepares the shared draw resources.
    pub fn new(
        ctx: Context,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self, GpuError> {
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::Surface("the surface supports no format".to_string()))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &surface_config);
        log::info!(
            "surface configured: {}x{} {:?}",
            surface_config.width,
            surface_config.height,
            format
        );

        let constants_size = std::mem::size_of::<DrawConstants>() as u64;
        let constants_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("draw_constants_layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: wgpu::BufferSize::new(constants_size),
                        },
                        count: None,
                    }],
                });
        let constants_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw_constants"),
            size: (CONSTANTS_STRIDE * CONSTANTS_CAPACITY) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let constants_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_constants_bind_group"),
            layout: &constants_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &constants_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(constants_size),
                }),
            }],
        });
        let fallback_uniform = Rc::new(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fallback_uniform"),
            size: FALLBACK_UNIFORM_SIZE,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        }));

        let nearest_sampler = Rc::new(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nearest_sampler"),
            ..Default::default()
        }));
        let linear_sampler = Rc::new(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }));
        let compare_sampler = Rc::new(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("compare_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        }));

        let blit = MipmapBlit::new(&ctx);

        // Errors raised outside any scope would abort, so one scope pair stays open
        // for the whole session and is cycled at the end of every frame.
        ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        Ok(WgpuDevice {
            state: RefCell::new(State {
                next_handle: 1,
                textures: HashMap::new(),
                buffers: HashMap::new(),
                framebuffers: HashMap::new(),
                programs: HashMap::new(),
                pipelines: HashMap::new(),
                blit,
                fallback_views: HashMap::new(),
                bound_framebuffer: None,
                current_program: None,
                subroutines: [0; SUBROUTINE_AXES],
                uniform_bindings: BTreeMap::new(),
                texture_bindings: BTreeMap::new(),
                render_state: RenderState::default(),
                viewport: (surface_config.width, surface_config.height),
                clear_color: [0.0; 4],
                jobs: Vec::new(),
                open_passes: HashMap::new(),
                pending_buffers: HashSet::new(),
                constants: vec![0; CONSTANTS_STRIDE * CONSTANTS_CAPACITY],
                constants_used: 0,
                surface_config,
                frame: None,
                diagnostics: Vec::new(),
            }),
            ctx,
            surface,
            constants_layout,
            constants_buffer,
            constants_group,
            fallback_uniform,
            nearest_sampler,
            linear_sampler,
            compare_sampler,
        })
    }

    /// The wgpu objects this device renders with.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Encodes and submits every recorded job.
    fn flush(&self, state: &mut State) {
        state.close_passes();
        if state.jobs.is_empty() {
            return;
        }

        if state.constants_used > 0 {
            let used = state.constants_used * CONSTANTS_STRIDE;
            self.ctx
                .queue
                .write_buffer(&self.constants_buffer, 0, &state.constants[..used]);
        }

        let mut encoder = self.ctx.create_command_encoder(Some("deferred3d_encoder"));
        for job in state.jobs.drain(..) {
            match job {
                Job::Render(pass) => pass.encode(&mut encoder, &self.constants_group),
                Job::Mipmaps(mipmaps) => state.blit.encode(&self.ctx, &mut encoder, &mipmaps),
            }
        }
        self.ctx.submit(Some(encoder.finish()));

        state.constants_used = 0;
        state.pending_buffers.clear();
    }

    /// Pops the session error scopes, reports what they caught and opens new ones.
    fn cycle_error_scopes(&self, state: &mut State) {
        let device = &self.ctx.device;
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        for (error, source) in [
            (validation, DiagnosticSource::Validation),
            (out_of_memory, DiagnosticSource::OutOfMemory),
        ] {
            if let Some(error) = error {
                state.diagnostics.push(Diagnostic {
                    severity: Severity::High,
                    source,
                    message: error.to_string(),
                });
            }
        }
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
    }

    fn target(&self, state: &State) -> Result<Target, String> {
        let Some(framebuffer) = state.bound_framebuffer else {
            let frame = state
                .frame
                .as_ref()
                .ok_or("drawing to the window outside of a frame")?;
            return Ok(Target {
                colors: vec![],
                depth: None,
                formats: vec![state.surface_config.format],
                depth_format: None,
                size: (state.surface_config.width, state.surface_config.height),
                layers: 1,
                screen: Some(frame.view.clone()),
            });
        };

        let attachments = state
            .framebuffers
            .get(&framebuffer)
            .ok_or_else(|| format!("framebuffer {} was deleted", framebuffer.raw()))?;
        let mut target = Target {
            colors: vec![],
            depth: None,
            formats: vec![],
            depth_format: None,
            size: (0, 0),
            layers: 1,
            screen: None,
        };
        let mut size = None;
        for (point, attachment) in attachments {
            let texture = state.textures.get(&attachment.texture).ok_or_else(|| {
                format!("attachment {:?} refers to a deleted texture", point)
            })?;
            if attachment.level >= texture.desc.levels {
                return Err(format!(
                    "attachment {:?} selects level {} of `{}`",
                    point, attachment.level, texture.desc.label
                ));
            }
            let layer_count = texture.desc.kind.layer_count();
            match attachment.layers {
                LayerSelection::All => target.layers = target.layers.max(layer_count),
                LayerSelection::Single(layer) if layer >= layer_count => {
                    return Err(format!(
                        "attachment {:?} selects layer {} of `{}`",
                        point, layer, texture.desc.label
                    ))
                }
                LayerSelection::Single(_) => {}
            }
            let level_size = texture.desc.level_size(attachment.level);
            match size {
                Some(size) if size != level_size => {
                    return Err(format!(
                        "framebuffer {} mixes attachment sizes {:?} and {:?}",
                        framebuffer.raw(),
                        size,
                        level_size
                    ))
                }
                _ => size = Some(level_size),
            }
            let format = convert::texture_format(texture.desc.format);
            match point {
                AttachmentPoint::Color(_) => {
                    target.colors.push(*attachment);
                    target.formats.push(format);
                }
                AttachmentPoint::Depth => {
                    target.depth = Some(*attachment);
                    target.depth_format = Some(format);
                }
            }
        }
        target.size = size.ok_or_else(|| {
            format!("framebuffer {} has no attachment", framebuffer.raw())
        })?;
        Ok(target)
    }

    /// The pass receiving draws for `layer` of `target`, opened on first use.
    fn open_pass(&self, state: &mut State, target: &Target, layer: u32) -> usize {
        if let Some(&index) = state.open_passes.get(&layer) {
            return index;
        }

        let (label, colors, depth) = match &target.screen {
            Some(view) => ("window".to_string(), vec![view.clone()], None),
            None => {
                let view = |attachment: &AttachmentTarget| {
                    state
                        .textures
                        .get(&attachment.texture)
                        .map(|texture| Rc::new(texture.attachment_view(attachment, layer)))
                };
                let label = format!(
                    "framebuffer_{}_layer_{}",
                    state.bound_framebuffer.map_or(0, |fb| fb.raw()),
                    layer
                );
                (
                    label,
                    target.colors.iter().filter_map(&view).collect(),
                    target.depth.as_ref().and_then(&view),
                )
            }
        };

        state.jobs.push(Job::Render(RenderPassJob {
            label,
            colors,
            depth,
            clear_color: None,
            clear_depth: false,
            draws: Vec::new(),
        }));
        let index = state.jobs.len() - 1;
        state.open_passes.insert(layer, index);
        index
    }

    fn pipeline(
        &self,
        state: &mut State,
        key: PipelineKey,
    ) -> Result<Rc<wgpu::RenderPipeline>, String> {
        if let Some(cached) = state.pipelines.get(&key) {
            return cached
                .clone()
                .ok_or_else(|| "the program has no valid pipeline for this target".to_string());
        }
        let program = state
            .programs
            .get(&key.program)
            .ok_or("the current program was deleted")?;
        let name = program.desc.name.clone();
        let (entry, result) = match pipeline::create_pipeline(&self.ctx, program, &key) {
            Ok(created) => {
                log::debug!("created pipeline for `{}`: {:?}", name, key);
                let created = Rc::new(created);
                (Some(created.clone()), Ok(created))
            }
            Err(e) => (
                None,
                Err(format!("pipeline creation failed for `{}`: {}", name, e)),
            ),
        };
        state.pipelines.insert(key, entry);
        result
    }

    /// A zeroed texture standing in for units that are unbound or unusable.
    fn fallback_view(
        &self,
        state: &mut State,
        dimension: ViewDimension,
        depth: bool,
    ) -> Rc<wgpu::TextureView> {
        state
            .fallback_views
            .entry((dimension, depth))
            .or_insert_with(|| {
                let layers = match dimension {
                    ViewDimension::D2 | ViewDimension::D2Array => 1,
                    ViewDimension::Cube | ViewDimension::CubeArray => 6,
                };
                let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("fallback_texture"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: layers,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: if depth {
                        wgpu::TextureFormat::Depth32Float
                    } else {
                        wgpu::TextureFormat::Rgba8Unorm
                    },
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                Rc::new(texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("fallback_view"),
                    dimension: Some(convert::view_dimension(dimension)),
                    ..Default::default()
                }))
            })
            .clone()
    }

    fn record_draw(&self, state: &mut State, buffers: DrawBuffers) -> Result<(), String> {
        let program_id = state
            .current_program
            .ok_or("draw issued without a current program")?;
        let (desc, constants, uniform_layout, texture_layout) = {
            let program = state
                .programs
                .get(&program_id)
                .ok_or("the current program was deleted")?;
            (
                program.desc.clone(),
                program.constants,
                program.uniform_layout.clone(),
                program.texture_layout.clone(),
            )
        };
        let target = self.target(state)?;

        let layer_count = if desc.layered {
            constants[ProgramConstant::LayerCount.index()].min(target.layers)
        } else {
            1
        };
        if layer_count == 0 || buffers.index_count == 0 {
            return Ok(());
        }

        let vertices = state
            .buffers
            .get(&buffers.vertices)
            .map(|b| b.buffer.clone())
            .ok_or("the vertex buffer was deleted")?;
        let indices = state
            .buffers
            .get(&buffers.indices)
            .map(|b| b.buffer.clone())
            .ok_or("the index buffer was deleted")?;

        let flip_y = target.screen.is_none();
        let render_state = state.render_state;
        let key = PipelineKey {
            program: program_id,
            colors: target.formats.clone(),
            depth: target.depth_format,
            depth_test: render_state.depth_test,
            depth_write: render_state.depth_write,
            additive_blend: render_state.additive_blend,
            cull: render_state.cull,
            depth_bias: render_state
                .polygon_offset
                .map(|offset| (offset.factor.to_bits(), offset.units.to_bits())),
            flip_y,
        };
        let pipeline = self.pipeline(state, key)?;

        let mut uniform_buffers = Vec::with_capacity(desc.uniforms.len());
        for slot in &desc.uniforms {
            let bound = state
                .uniform_bindings
                .get(slot)
                .and_then(|id| state.buffers.get(id).map(|b| (*id, b.buffer.clone())));
            match bound {
                Some((id, buffer)) => {
                    state.pending_buffers.insert(id);
                    uniform_buffers.push((slot.index(), buffer));
                }
                None => {
                    state.report(
                        Severity::Medium,
                        format!("`{}` reads unbound uniform slot {:?}", desc.name, slot),
                    );
                    uniform_buffers.push((slot.index(), self.fallback_uniform.clone()));
                }
            }
        }
        let uniform_entries: Vec<_> = uniform_buffers
            .iter()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniforms = Rc::new(self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &uniform_layout,
            entries: &uniform_entries,
        }));

        let attached: Vec<(TextureId, u32)> = target
            .colors
            .iter()
            .chain(target.depth.iter())
            .map(|attachment| (attachment.texture, attachment.level))
            .collect();
        let mut sampled = Vec::with_capacity(desc.textures.len());
        let mut mismatches = Vec::new();
        for read in &desc.textures {
            let depth = read.sample != SampleKind::Float;
            let resolved = state
                .texture_bindings
                .get(&read.unit)
                .and_then(|id| state.textures.get(id).map(|texture| (*id, texture)))
                .and_then(|(id, texture)| {
                    if convert::dimension_of(texture.desc.kind) != read.dimension
                        || texture.desc.format.is_depth() != depth
                    {
                        mismatches.push(format!(
                            "`{}` cannot sample `{}` at unit {:?}",
                            desc.name, texture.desc.label, read.unit
                        ));
                        return None;
                    }
                    let (base, max) = texture.visible_levels();
                    if attached
                        .iter()
                        .any(|&(t, level)| t == id && (base..=max).contains(&level))
                    {
                        log::trace!(
                            "unit {:?} is attached to the current target; sampling a fallback",
                            read.unit
                        );
                        return None;
                    }
                    let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(&texture.desc.label),
                        dimension: Some(convert::view_dimension(read.dimension)),
                        aspect: if depth {
                            wgpu::TextureAspect::DepthOnly
                        } else {
                            wgpu::TextureAspect::All
                        },
                        base_mip_level: base,
                        mip_level_count: Some(max - base + 1),
                        ..Default::default()
                    });
                    let sampler = match read.sample {
                        SampleKind::Float if texture.desc.sampler.compare => {
                            self.linear_sampler.clone()
                        }
                        SampleKind::Float => texture.sampler.clone(),
                        SampleKind::Depth => self.nearest_sampler.clone(),
                        SampleKind::DepthCompare if texture.desc.sampler.compare => {
                            texture.sampler.clone()
                        }
                        SampleKind::DepthCompare => self.compare_sampler.clone(),
                    };
                    Some((Rc::new(view), sampler))
                });
            let (view, sampler) = match resolved {
                Some(resolved) => resolved,
                None => {
                    let sampler = match read.sample {
                        SampleKind::Float => self.linear_sampler.clone(),
                        SampleKind::Depth => self.nearest_sampler.clone(),
                        SampleKind::DepthCompare => self.compare_sampler.clone(),
                    };
                    (self.fallback_view(state, read.dimension, depth), sampler)
                }
            };
            sampled.push((read.unit.index(), view, sampler));
        }
        for message in mismatches {
            state.report(Severity::Medium, message);
        }
        let texture_entries: Vec<_> = sampled
            .iter()
            .flat_map(|(unit, view, sampler)| {
                [
                    wgpu::BindGroupEntry {
                        binding: pipeline::texture_binding(*unit),
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: pipeline::sampler_binding(*unit),
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();

        let (width, height) = (
            state.viewport.0.min(target.size.0),
            state.viewport.1.min(target.size.1),
        );
        if (width, height) != state.viewport {
            state.report(
                Severity::Medium,
                format!(
                    "viewport {:?} exceeds the {:?} target",
                    state.viewport, target.size
                ),
            );
        }
        let y = if flip_y { 0 } else { target.size.1 - height };
        let viewport = [0.0, y as f32, width as f32, height as f32];

        let textures = Rc::new(self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture_bind_group"),
            layout: &texture_layout,
            entries: &texture_entries,
        }));

        for layer in 0..layer_count {
            if state.constants_used == CONSTANTS_CAPACITY {
                self.flush(state);
            }
            let block = DrawConstants {
                subroutines: state.subroutines,
                constants: [constants[0], constants[1], constants[2], 0],
                layer,
                flip_y: if flip_y { -1.0 } else { 1.0 },
                _padding: [0; 2],
            };
            let offset = state.constants_used * CONSTANTS_STRIDE;
            state.constants[offset..offset + std::mem::size_of::<DrawConstants>()]
                .copy_from_slice(bytemuck::bytes_of(&block));
            state.constants_used += 1;

            let index = self.open_pass(state, &target, layer);
            if let Some(Job::Render(pass)) = state.jobs.get_mut(index) {
                pass.draws.push(RecordedDraw {
                    pipeline: pipeline.clone(),
                    uniforms: uniforms.clone(),
                    textures: textures.clone(),
                    constants_offset: offset as u32,
                    vertices: vertices.clone(),
                    indices: indices.clone(),
                    index_count: buffers.index_count,
                    viewport,
                });
            }
        }
        state.pending_buffers.insert(buffers.vertices);
        state.pending_buffers.insert(buffers.indices);
        Ok(())
    }
}

impl RenderDevice for WgpuDevice {
    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        let invalid = |reason: String| GpuError::InvalidTexture {
            label: desc.label.clone(),
            reason,
        };
        if desc.width == 0 || desc.height == 0 || desc.kind.layer_count() == 0 {
            return Err(invalid(format!(
                "empty extent {}x{}x{}",
                desc.width,
                desc.height,
                desc.kind.layer_count()
            )));
        }
        if desc.kind.is_cube() && desc.width != desc.height {
            return Err(invalid("cube faces must be square".to_string()));
        }
        let max_levels = 32 - desc.width.max(desc.height).leading_zeros();
        if desc.levels > max_levels {
            return Err(invalid(format!(
                "{} levels requested, at most {} fit",
                desc.levels, max_levels
            )));
        }

        let (texture, sampler) = self
            .ctx
            .scoped(|device| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&desc.label),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: desc.kind.layer_count(),
                    },
                    mip_level_count: desc.levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: convert::texture_format(desc.format),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::COPY_DST
                        | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                });
                let sampler =
                    device.create_sampler(&convert::sampler_descriptor(&desc.label, &desc.sampler));
                (texture, sampler)
            })
            .map_err(|e| GpuError::Creation {
                what: "texture",
                label: desc.label.clone(),
                reason: e.to_string(),
            })?;

        let mut state = self.state.borrow_mut();
        let id = TextureId(state.allocate());
        state.textures.insert(
            id,
            GpuTexture {
                texture: Rc::new(texture),
                desc: desc.clone(),
                sampler: Rc::new(sampler),
                base_level: 0,
                max_level: desc.levels - 1,
            },
        );
        Ok(id)
    }

    fn write_texture(&self, texture: TextureId, level: u32, layer: u32, texels: &[u8]) {
        let mut state = self.state.borrow_mut();
        self.flush(&mut state);
        let Some(tex) = state.textures.get(&texture) else {
            state.report(Severity::High, format!("write to deleted texture {}", texture.raw()));
            return;
        };
        let (width, height) = tex.desc.level_size(level);
        let texel_size = tex.desc.format.texel_size();
        let expected = (width * height * texel_size) as usize;
        if level >= tex.desc.levels
            || layer >= tex.desc.kind.layer_count()
            || texels.len() < expected
        {
            let message = format!(
                "invalid upload of {} bytes to level {} layer {} of `{}`",
                texels.len(),
                level,
                layer,
                tex.desc.label
            );
            state.report(Severity::High, message);
            return;
        }
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &texels[..expected],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * texel_size),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn delete_texture(&self, texture: TextureId) {
        self.state.borrow_mut().textures.remove(&texture);
    }

    fn set_texture_levels(&self, texture: TextureId, base: u32, max: u32) {
        let mut state = self.state.borrow_mut();
        match state.textures.get_mut(&texture) {
            Some(tex) => {
                tex.base_level = base;
                tex.max_level = max.max(base);
            }
            None => state.report(
                Severity::High,
                format!("level range set on deleted texture {}", texture.raw()),
            ),
        }
    }

    fn generate_mipmaps(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        state.close_passes();
        let Some(tex) = state.textures.get(&texture) else {
            state.report(
                Severity::High,
                format!("mipmaps requested for deleted texture {}", texture.raw()),
            );
            return;
        };
        if tex.desc.format.is_depth() {
            let message = format!("depth texture `{}` has no mipmaps", tex.desc.label);
            state.report(Severity::Low, message);
            return;
        }
        let (base, _) = tex.visible_levels();
        let max = tex.desc.levels - 1;
        if base >= max {
            return;
        }
        let format = convert::texture_format(tex.desc.format);
        let layers = tex.desc.kind.layer_count();
        let wgpu_texture = tex.texture.clone();
        let pipeline = state.blit.pipeline(&self.ctx, format);
        state.jobs.push(Job::Mipmaps(MipmapJob {
            texture: wgpu_texture,
            pipeline,
            layers,
            base,
            max,
        }));
    }

    fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .map(|t| t.desc.clone())
    }

    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        let usage = match kind {
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        // Uniform blocks are padded to 16 bytes, copies to 4.
        let alignment = if kind == BufferKind::Uniform { 16 } else { 4 };
        let size = contents.len().max(1).next_multiple_of(alignment);
        let mut padded = contents.to_vec();
        padded.resize(size, 0);

        let buffer = self
            .ctx
            .scoped(|_| self.ctx.create_buffer_init(Some(label), &padded, usage))
            .map_err(|e| GpuError::Creation {
                what: "buffer",
                label: label.to_string(),
                reason: e.to_string(),
            })?;

        let mut state = self.state.borrow_mut();
        let id = BufferId(state.allocate());
        state.buffers.insert(
            id,
            GpuBuffer {
                buffer: Rc::new(buffer),
                size: size as u64,
            },
        );
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        if state.pending_buffers.contains(&buffer) {
            self.flush(&mut state);
        }
        let Some(target) = state.buffers.get(&buffer) else {
            state.report(Severity::High, format!("write to deleted buffer {}", buffer.raw()));
            return;
        };
        let padded_len = data.len().next_multiple_of(4);
        if padded_len as u64 > target.size {
            let message = format!(
                "write of {} bytes overflows a {} byte buffer",
                data.len(),
                target.size
            );
            state.report(Severity::High, message);
            return;
        }
        if padded_len == data.len() {
            self.ctx.queue.write_buffer(&target.buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len, 0);
            self.ctx.queue.write_buffer(&target.buffer, 0, &padded);
        }
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn create_framebuffer(&self, label: &str) -> Result<FramebufferId, GpuError> {
        let mut state = self.state.borrow_mut();
        let id = FramebufferId(state.allocate());
        log::debug!("framebuffer `{}` is {}", label, id.raw());
        state.framebuffers.insert(id, BTreeMap::new());
        Ok(id)
    }

    fn attach(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) {
        let mut state = self.state.borrow_mut();
        state.close_passes();
        match state.framebuffers.get_mut(&framebuffer) {
            Some(attachments) => match target {
                Some(target) => {
                    attachments.insert(point, target);
                }
                None => {
                    attachments.remove(&point);
                }
            },
            None => state.report(
                Severity::High,
                format!("attach on deleted framebuffer {}", framebuffer.raw()),
            ),
        }
    }

    fn attachment(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
    ) -> Option<AttachmentTarget> {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .and_then(|attachments| attachments.get(&point).copied())
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        if state.bound_framebuffer == Some(framebuffer) {
            state.bound_framebuffer = None;
            state.close_passes();
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        let mut state = self.state.borrow_mut();
        if state.bound_framebuffer != framebuffer {
            state.close_passes();
            state.bound_framebuffer = framebuffer;
        }
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.state.borrow().bound_framebuffer
    }

    fn compile_program(&self, desc: &ProgramDesc) -> Result<ProgramId, ShaderError> {
        let program = CompiledProgram::compile(&self.ctx, desc, &self.constants_layout)?;
        let mut state = self.state.borrow_mut();
        let id = ProgramId(state.allocate());
        log::debug!("compiled program `{}` as {}", desc.name, id.raw());
        state.programs.insert(id, program);
        Ok(id)
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        state.pipelines.retain(|key, _| key.program != program);
        if state.current_program == Some(program) {
            state.current_program = None;
        }
    }

    fn use_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        if state.programs.contains_key(&program) {
            state.current_program = Some(program);
            state.subroutines = [0; SUBROUTINE_AXES];
        } else {
            state.report(Severity::High, format!("use of deleted program {}", program.raw()));
        }
    }

    fn set_program_constant(&self, program: ProgramId, constant: ProgramConstant, value: u32) {
        let mut state = self.state.borrow_mut();
        match state.programs.get_mut(&program) {
            Some(compiled) => compiled.constants[constant.index()] = value,
            None => state.report(
                Severity::High,
                format!("constant set on deleted program {}", program.raw()),
            ),
        }
    }

    fn set_subroutines(&self, selection: SubroutineSelection) {
        self.state.borrow_mut().subroutines = selection;
    }

    fn bind_uniform_buffer(&self, slot: UniformSlot, buffer: BufferId) {
        self.state.borrow_mut().uniform_bindings.insert(slot, buffer);
    }

    fn uniform_binding(&self, slot: UniformSlot) -> Option<BufferId> {
        self.state.borrow().uniform_bindings.get(&slot).copied()
    }

    fn bind_texture(&self, unit: TextureUnit, texture: TextureId) {
        self.state.borrow_mut().texture_bindings.insert(unit, texture);
    }

    fn texture_binding(&self, unit: TextureUnit) -> Option<TextureId> {
        self.state.borrow().texture_bindings.get(&unit).copied()
    }

    fn set_render_state(&self, render_state: RenderState) {
        self.state.borrow_mut().render_state = render_state;
    }

    fn render_state(&self) -> RenderState {
        self.state.borrow().render_state
    }

    fn set_viewport(&self, width: u32, height: u32) {
        self.state.borrow_mut().viewport = (width, height);
    }

    fn viewport(&self) -> (u32, u32) {
        self.state.borrow().viewport
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        self.state.borrow_mut().clear_color = color;
    }

    fn clear_color(&self) -> [f32; 4] {
        self.state.borrow().clear_color
    }

    fn clear(&self, flags: ClearFlags) {
        let mut state = self.state.borrow_mut();
        state.close_passes();
        let target = match self.target(&state) {
            Ok(target) => target,
            Err(message) => {
                state.report(Severity::High, format!("clear skipped: {}", message));
                return;
            }
        };
        let [r, g, b, a] = state.clear_color.map(f64::from);
        let color = flags
            .contains(ClearFlags::COLOR)
            .then_some(wgpu::Color { r, g, b, a });
        for layer in 0..target.layers {
            let index = self.open_pass(&mut state, &target, layer);
            if let Some(Job::Render(pass)) = state.jobs.get_mut(index) {
                pass.clear_color = color.or(pass.clear_color);
                pass.clear_depth |= flags.contains(ClearFlags::DEPTH);
            }
        }
    }

    fn draw_indexed(&self, buffers: DrawBuffers) {
        let mut state = self.state.borrow_mut();
        if let Err(message) = self.record_draw(&mut state, buffers) {
            state.report(Severity::High, format!("draw skipped: {}", message));
        }
    }

    fn begin_frame(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match self.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                state.frame = Some(Frame {
                    view: Rc::new(view),
                    texture,
                });
                true
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.ctx.device, &state.surface_config);
                false
            }
            Err(e) => {
                log::warn!("failed to acquire a surface image: {}", e);
                false
            }
        }
    }

    fn end_frame(&self) {
        let mut state = self.state.borrow_mut();
        self.flush(&mut state);
        if let Some(Frame { view, texture }) = state.frame.take() {
            drop(view);
            texture.present();
        }
        self.cycle_error_scopes(&mut state);
    }

    fn resize_surface(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        self.flush(&mut state);
        state.frame = None;
        state.surface_config.width = width.max(1);
        state.surface_config.height = height.max(1);
        self.surface.configure(&self.ctx.device, &state.surface_config);
    }

    fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.state.borrow_mut().diagnostics)
    }
}
