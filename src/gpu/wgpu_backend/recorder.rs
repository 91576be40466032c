//! Render passes recorded between two submissions.

use super::pipeline::MipmapJob;
use std::rc::Rc;

/// A draw with every binding already resolved.
pub struct RecordedDraw {
    pub pipeline: Rc<wgpu::RenderPipeline>,
    pub uniforms: Rc<wgpu::BindGroup>,
    pub textures: Rc<wgpu::BindGroup>,
    pub constants_offset: u32,
    pub vertices: Rc<wgpu::Buffer>,
    pub indices: Rc<wgpu::Buffer>,
    pub index_count: u32,
    /// `x, y, width, height` in framebuffer coordinates.
    pub viewport: [f32; 4],
}

/// Draws sharing the same attachments, one layer each.
pub struct RenderPassJob {
    pub label: String,
    pub colors: Vec<Rc<wgpu::TextureView>>,
    pub depth: Option<Rc<wgpu::TextureView>>,
    pub clear_color: Option<wgpu::Color>,
    pub clear_depth: bool,
    pub draws: Vec<RecordedDraw>,
}

impl RenderPassJob {
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, constants: &wgpu::BindGroup) {
        let color_load = match self.clear_color {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<_> = self
            .colors
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            self.depth
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if self.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &self.draws {
            let [x, y, width, height] = draw.viewport;
            pass.set_viewport(x, y, width, height, 0.0, 1.0);
            pass.set_pipeline(&draw.pipeline);
            pass.set_bind_group(0, &*draw.uniforms, &[]);
            pass.set_bind_group(1, &*draw.textures, &[]);
            pass.set_bind_group(2, constants, &[draw.constants_offset]);
            pass.set_vertex_buffer(0, draw.vertices.slice(..));
            pass.set_index_buffer(draw.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
        }
    }
}

/// Work waiting for the next submission, in issue order.
pub enum Job {
    Render(RenderPassJob),
    Mipmaps(MipmapJob),
}
