//! The GPU boundary.
//!
//! Passes talk to the GPU through [`RenderDevice`], a bind-then-draw interface with global
//! binding points for uniform buffers and textures, framebuffers with layered and cube-face
//! attachments, and per-axis subroutine selection. [`WgpuDevice`] implements it on top of
//! wgpu; [`HeadlessDevice`] tracks the same state on the CPU.

pub use self::headless::{Command, Contents, DrawRecord, HeadlessDevice};
pub use self::program::{
    ProgramDesc, SampleKind, SampledTexture, ShaderStage, StageKind, ViewDimension,
};
pub use self::resource::{Buffer, Framebuffer, Program, Texture};
pub use self::types::*;
pub use self::wgpu_backend::WgpuDevice;

use crate::binding::{TextureUnit, UniformSlot};
use crate::error::{GpuError, ShaderError};
use std::rc::Rc;

mod headless;
mod program;
mod resource;
mod types;
mod wgpu_backend;

/// Shared handle on the device. Owned resources keep one to release themselves.
pub type Gpu = Rc<dyn RenderDevice>;

/// An immediate-mode GPU: state is bound first, then draws consume it.
///
/// Methods take `&self`; implementations use interior mutability so that owned resources
/// can release their handles from `Drop`.
pub trait RenderDevice {
    /// Allocates a texture. Its contents are undefined until cleared, drawn or written.
    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId, GpuError>;
    /// Uploads tightly packed texels to one level of one layer.
    fn write_texture(&self, texture: TextureId, level: u32, layer: u32, texels: &[u8]);
    /// Releases a texture.
    fn delete_texture(&self, texture: TextureId);
    /// Restricts the mip levels visible to samplers to `base..=max`.
    fn set_texture_levels(&self, texture: TextureId, base: u32, max: u32);
    /// Fills every level below the base level by successive downsampling.
    fn generate_mipmaps(&self, texture: TextureId);
    /// The description of a live texture.
    fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc>;

    /// Allocates a buffer initialised with `contents`.
    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError>;
    /// Overwrites the start of a buffer. Draws issued before the write still see the old data.
    fn write_buffer(&self, buffer: BufferId, data: &[u8]);
    /// Releases a buffer.
    fn delete_buffer(&self, buffer: BufferId);

    /// Creates a framebuffer with no attachment.
    fn create_framebuffer(&self, label: &str) -> Result<FramebufferId, GpuError>;
    /// Sets or clears an attachment.
    fn attach(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    );
    /// The current attachment at `point`.
    fn attachment(&self, framebuffer: FramebufferId, point: AttachmentPoint)
        -> Option<AttachmentTarget>;
    /// Releases a framebuffer. Its attachments are left alive.
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    /// Binds a framebuffer for drawing; `None` selects the window surface.
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);
    /// The framebuffer bound for drawing.
    fn bound_framebuffer(&self) -> Option<FramebufferId>;

    /// Compiles and links a program.
    fn compile_program(&self, desc: &ProgramDesc) -> Result<ProgramId, ShaderError>;
    /// Releases a program.
    fn delete_program(&self, program: ProgramId);
    /// Makes a program current.
    fn use_program(&self, program: ProgramId);
    /// Sets a fixed uniform of a program, current or not.
    fn set_program_constant(&self, program: ProgramId, constant: ProgramConstant, value: u32);
    /// Selects the active subroutine of every axis of the current program.
    fn set_subroutines(&self, selection: SubroutineSelection);

    /// Binds a uniform buffer to a slot.
    fn bind_uniform_buffer(&self, slot: UniformSlot, buffer: BufferId);
    /// The buffer bound to a slot.
    fn uniform_binding(&self, slot: UniformSlot) -> Option<BufferId>;
    /// Binds a texture to a unit.
    fn bind_texture(&self, unit: TextureUnit, texture: TextureId);
    /// The texture bound to a unit.
    fn texture_binding(&self, unit: TextureUnit) -> Option<TextureId>;

    /// Sets the fixed-function state of the next draws.
    fn set_render_state(&self, state: RenderState);
    /// The fixed-function state of the next draws.
    fn render_state(&self) -> RenderState;
    /// Sets the viewport size. The origin is always the bottom-left corner.
    fn set_viewport(&self, width: u32, height: u32);
    /// The viewport size.
    fn viewport(&self) -> (u32, u32);

    /// Sets the colour written by the next colour clears. Starts out as transparent black.
    fn set_clear_color(&self, color: [f32; 4]);
    /// The colour written by colour clears.
    fn clear_color(&self) -> [f32; 4];
    /// Clears the attachments of the bound framebuffer (colour to the clear colour, depth to
    /// one).
    fn clear(&self, flags: ClearFlags);
    /// Draws indexed triangles with the current program and bindings.
    fn draw_indexed(&self, buffers: DrawBuffers);

    /// Starts a frame. Returns `false` when no surface image could be acquired, in which
    /// case the frame should be skipped.
    fn begin_frame(&self) -> bool;
    /// Submits pending work and presents the surface.
    fn end_frame(&self);
    /// Resizes the window surface.
    fn resize_surface(&self, width: u32, height: u32);
    /// Takes the diagnostics reported since the last call.
    fn drain_diagnostics(&self) -> Vec<Diagnostic>;
}

/// Convenience wrappers over the fine-grained state setters.
pub trait RenderDeviceExt: RenderDevice {
    /// Enables or disables depth test and depth write together.
    fn set_depth(&self, test: bool, write: bool) {
        let mut state = self.render_state();
        state.depth_test = test;
        state.depth_write = write;
        self.set_render_state(state);
    }

    /// Enables or disables additive blending on attachment 0.
    fn set_additive_blend(&self, enabled: bool) {
        let mut state = self.render_state();
        state.additive_blend = enabled;
        self.set_render_state(state);
    }

    /// Clears with a one-off colour, leaving the clear colour as it was.
    fn clear_to(&self, flags: ClearFlags, color: [f32; 4]) {
        let previous = self.clear_color();
        self.set_clear_color(color);
        self.clear(flags);
        self.set_clear_color(previous);
    }

    /// Sets face culling and polygon offset together.
    fn set_rasterizer(&self, cull: CullFace, polygon_offset: Option<PolygonOffset>) {
        let mut state = self.render_state();
        state.cull = cull;
        state.polygon_offset = polygon_offset;
        self.set_render_state(state);
    }
}

impl<T: RenderDevice + ?Sized> RenderDeviceExt for T {}
