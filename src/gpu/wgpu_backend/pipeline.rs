//! Programs, render pipelines and the mipmap blit.

use super::convert;
use crate::context::Context;
use crate::error::ShaderError;
use crate::gpu::{CullFace, ProgramConstant, ProgramDesc, ProgramId, StageKind, VertexLayout};
use std::collections::HashMap;
use std::rc::Rc;

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

/// Binding index of the sampled texture of `unit` inside bind group 1.
pub fn texture_binding(unit: u32) -> u32 {
    unit * 2
}

/// Binding index of the sampler of `unit` inside bind group 1.
pub fn sampler_binding(unit: u32) -> u32 {
    unit * 2 + 1
}

/// A linked program: shader modules plus the layout of its three bind groups
/// (uniform slots, texture units, per-draw constants).
pub struct CompiledProgram {
    pub desc: ProgramDesc,
    pub constants: [u32; ProgramConstant::COUNT],
    pub uniform_layout: Rc<wgpu::BindGroupLayout>,
    pub texture_layout: Rc<wgpu::BindGroupLayout>,
    layout: wgpu::PipelineLayout,
    vertex: Rc<wgpu::ShaderModule>,
    fragment: Option<Rc<wgpu::ShaderModule>>,
}

impl CompiledProgram {
    pub fn compile(
        ctx: &Context,
        desc: &ProgramDesc,
        constants_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, ShaderError> {
        let vertex_stage = desc.stage(StageKind::Vertex).ok_or_else(|| ShaderError::Link {
            program: desc.name.clone(),
            log: "missing vertex stage".to_string(),
        })?;
        let fragment_stage = desc.stage(StageKind::Fragment);

        let (vertex, fragment) = ctx
            .scoped(|device| {
                let module = |source: &str| {
                    Rc::new(device.create_shader_module(wgpu::ShaderModuleDescriptor {
                        label: Some(&desc.name),
                        source: wgpu::ShaderSource::Wgsl(source.to_owned().into()),
                    }))
                };
                let vertex = module(&vertex_stage.source);
                let fragment = fragment_stage.map(|stage| {
                    if stage.source == vertex_stage.source {
                        vertex.clone()
                    } else {
                        module(&stage.source)
                    }
                });
                (vertex, fragment)
            })
            .map_err(|e| ShaderError::Compile {
                program: desc.name.clone(),
                log: e.to_string(),
            })?;

        let (uniform_layout, texture_layout, layout) = ctx
            .scoped(|device| {
                let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
                let uniform_entries: Vec<_> = desc
                    .uniforms
                    .iter()
                    .map(|slot| wgpu::BindGroupLayoutEntry {
                        binding: slot.index(),
                        visibility,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    })
                    .collect();
                let texture_entries: Vec<_> = desc
                    .textures
                    .iter()
                    .flat_map(|sampled| {
                        [
                            wgpu::BindGroupLayoutEntry {
                                binding: texture_binding(sampled.unit.index()),
                                visibility,
                                ty: wgpu::BindingType::Texture {
                                    sample_type: convert::sample_type(sampled.sample),
                                    view_dimension: convert::view_dimension(sampled.dimension),
                                    multisampled: false,
                                },
                                count: None,
                            },
                            wgpu::BindGroupLayoutEntry {
                                binding: sampler_binding(sampled.unit.index()),
                                visibility,
                                ty: wgpu::BindingType::Sampler(convert::sampler_binding(
                                    sampled.sample,
                                )),
                                count: None,
                            },
                        ]
                    })
                    .collect();

                let uniform_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{}_uniforms", desc.name)),
                        entries: &uniform_entries,
                    });
                let texture_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(&format!("{}_textures", desc.name)),
                        entries: &texture_entries,
                    });
                let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&format!("{}_layout", desc.name)),
                    bind_group_layouts: &[&uniform_layout, &texture_layout, constants_layout],
                    push_constant_ranges: &[],
                });
                (uniform_layout, texture_layout, layout)
            })
            .map_err(|e| ShaderError::Link {
                program: desc.name.clone(),
                log: e.to_string(),
            })?;

        Ok(CompiledProgram {
            desc: desc.clone(),
            constants: [0; ProgramConstant::COUNT],
            uniform_layout: Rc::new(uniform_layout),
            texture_layout: Rc::new(texture_layout),
            layout,
            vertex,
            fragment,
        })
    }
}

/// Everything a render pipeline depends on besides the program's layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: ProgramId,
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub additive_blend: bool,
    pub cull: CullFace,
    /// Polygon offset `(factor, units)` as raw bits.
    pub depth_bias: Option<(u32, u32)>,
    /// Off-screen targets are stored bottom row first, which flips the winding.
    pub flip_y: bool,
}

pub fn create_pipeline(
    ctx: &Context,
    program: &CompiledProgram,
    key: &PipelineKey,
) -> Result<wgpu::RenderPipeline, wgpu::Error> {
    let desc = &program.desc;
    let attributes: &[wgpu::VertexAttribute] = match desc.vertex_layout {
        VertexLayout::Mesh => &MESH_ATTRIBUTES,
        VertexLayout::Quad => &QUAD_ATTRIBUTES,
    };
    let stride = match desc.vertex_layout {
        VertexLayout::Mesh => 32,
        VertexLayout::Quad => 8,
    };
    let vertex_buffers = [wgpu::VertexBufferLayout {
        array_stride: stride,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }];

    let additive = wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };
    let targets: Vec<_> = key
        .colors
        .iter()
        .enumerate()
        .map(|(i, format)| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: (i == 0 && key.additive_blend).then_some(additive),
                write_mask: if (i as u32) < desc.color_outputs {
                    wgpu::ColorWrites::ALL
                } else {
                    wgpu::ColorWrites::empty()
                },
            })
        })
        .collect();

    let depth_stencil = key.depth.map(|format| {
        let (slope_scale, constant) = key
            .depth_bias
            .map_or((0.0, 0.0), |(factor, units)| {
                (f32::from_bits(factor), f32::from_bits(units))
            });
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: key.depth_test && key.depth_write,
            depth_compare: if key.depth_test {
                wgpu::CompareFunction::Less
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: constant as i32,
                slope_scale,
                clamp: 0.0,
            },
        }
    });

    let vertex_entry = desc
        .stage(StageKind::Vertex)
        .map(|s| s.entry_point)
        .unwrap_or("vs_main");
    let fragment_entry = desc
        .stage(StageKind::Fragment)
        .map(|s| s.entry_point)
        .unwrap_or("fs_main");

    ctx.scoped(|device| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&desc.name),
            layout: Some(&program.layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(vertex_entry),
                buffers: &vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: program
                .fragment
                .as_ref()
                .map(|module| wgpu::FragmentState {
                    module,
                    entry_point: Some(fragment_entry),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: if key.flip_y {
                    wgpu::FrontFace::Cw
                } else {
                    wgpu::FrontFace::Ccw
                },
                cull_mode: convert::cull_mode(key.cull),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        })
    })
}

/// Box-filter downsampling of colour mip chains.
pub struct MipmapBlit {
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    module: wgpu::ShaderModule,
    pub sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, Rc<wgpu::RenderPipeline>>,
}

impl MipmapBlit {
    pub fn new(ctx: &Context) -> Self {
        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("mipmap_blit_bind_group_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });
        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("mipmap_blit_pipeline_layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let module =
            ctx.create_shader_module(Some("mipmap_blit"), crate::builtin::BLIT_SRC);
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mipmap_blit_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        MipmapBlit {
            layout,
            pipeline_layout,
            module,
            sampler,
            pipelines: HashMap::new(),
        }
    }

    pub fn pipeline(&mut self, ctx: &Context, format: wgpu::TextureFormat) -> Rc<wgpu::RenderPipeline> {
        let MipmapBlit {
            pipeline_layout,
            module,
            pipelines,
            ..
        } = self;
        pipelines
            .entry(format)
            .or_insert_with(|| {
                Rc::new(ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("mipmap_blit_pipeline"),
                    layout: Some(pipeline_layout),
                    vertex: wgpu::VertexState {
                        module,
                        entry_point: Some("vs_main"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                }))
            })
            .clone()
    }

    /// Fills levels `base + 1..=max` of every layer of `texture`.
    pub fn encode(
        &self,
        ctx: &Context,
        encoder: &mut wgpu::CommandEncoder,
        job: &MipmapJob,
    ) {
        for layer in 0..job.layers {
            for level in job.base + 1..=job.max {
                let view = |mip: u32| {
                    job.texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some("mipmap_blit_view"),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                };
                let source = view(level - 1);
                let target = view(level);
                let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mipmap_blit_bind_group"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("mipmap_blit_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&job.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
    }
}

/// A deferred mipmap generation.
pub struct MipmapJob {
    pub texture: Rc<wgpu::Texture>,
    pub pipeline: Rc<wgpu::RenderPipeline>,
    pub layers: u32,
    pub base: u32,
    pub max: u32,
}
