//! Owned GPU resources.
//!
//! Each wrapper acquires its handle on construction and releases it on drop. Aggregates
//! holding several of them declare fields in reverse order of creation so that fields are
//! released in reverse order of acquisition.

use super::{
    AttachmentPoint, AttachmentTarget, BufferId, BufferKind, FramebufferId, Gpu, ProgramDesc,
    ProgramId, TextureDesc, TextureId,
};
use crate::error::{GpuError, ShaderError};
use std::fmt;

/// An owned texture.
pub struct Texture {
    id: TextureId,
    desc: TextureDesc,
    gpu: Gpu,
}

impl Texture {
    /// Allocates a texture.
    pub fn new(gpu: &Gpu, desc: TextureDesc) -> Result<Self, GpuError> {
        let id = gpu.create_texture(&desc)?;
        Ok(Texture {
            id,
            desc,
            gpu: gpu.clone(),
        })
    }

    /// The texture handle.
    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// The description the texture was created with.
    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Number of mip levels.
    #[inline]
    pub fn levels(&self) -> u32 {
        self.desc.levels
    }

    /// Width of mip 0.
    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    /// Height of mip 0.
    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Uploads the texels of one level of one layer.
    pub fn write(&self, level: u32, layer: u32, texels: &[u8]) {
        self.gpu.write_texture(self.id, level, layer, texels)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.gpu.delete_texture(self.id);
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("label", &self.desc.label)
            .finish_non_exhaustive()
    }
}

/// An owned buffer.
pub struct Buffer {
    id: BufferId,
    kind: BufferKind,
    size: usize,
    gpu: Gpu,
}

impl Buffer {
    /// Allocates a buffer initialised with `contents`.
    pub fn new(gpu: &Gpu, label: &str, kind: BufferKind, contents: &[u8]) -> Result<Self, GpuError> {
        let id = gpu.create_buffer(label, kind, contents)?;
        Ok(Buffer {
            id,
            kind,
            size: contents.len(),
            gpu: gpu.clone(),
        })
    }

    /// Allocates a uniform buffer holding `value`.
    pub fn uniform<T: bytemuck::Pod>(gpu: &Gpu, label: &str, value: &T) -> Result<Self, GpuError> {
        Self::new(gpu, label, BufferKind::Uniform, bytemuck::bytes_of(value))
    }

    /// The buffer handle.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// What the buffer is used for.
    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Overwrites the start of the buffer.
    pub fn write(&self, data: &[u8]) {
        debug_assert!(data.len() <= self.size);
        self.gpu.write_buffer(self.id, data)
    }

    /// Overwrites the start of the buffer with `value`.
    pub fn write_value<T: bytemuck::Pod>(&self, value: &T) {
        self.write(bytemuck::bytes_of(value))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.gpu.delete_buffer(self.id);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// An owned framebuffer.
///
/// The framebuffer does not own its attachments.
pub struct Framebuffer {
    id: FramebufferId,
    gpu: Gpu,
}

impl Framebuffer {
    /// Creates a framebuffer with no attachment.
    pub fn new(gpu: &Gpu, label: &str) -> Result<Self, GpuError> {
        let id = gpu.create_framebuffer(label)?;
        Ok(Framebuffer {
            id,
            gpu: gpu.clone(),
        })
    }

    /// The framebuffer handle.
    #[inline]
    pub fn id(&self) -> FramebufferId {
        self.id
    }

    /// Attaches a texture subresource.
    pub fn attach(&self, point: AttachmentPoint, target: AttachmentTarget) {
        self.gpu.attach(self.id, point, Some(target))
    }

    /// Removes an attachment.
    pub fn detach(&self, point: AttachmentPoint) {
        self.gpu.attach(self.id, point, None)
    }

    /// Binds the framebuffer for drawing.
    pub fn bind(&self) {
        self.gpu.bind_framebuffer(Some(self.id))
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.gpu.delete_framebuffer(self.id);
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// An owned, linked program.
pub struct Program {
    id: ProgramId,
    name: String,
    gpu: Gpu,
}

impl Program {
    /// Compiles and links a program.
    pub fn new(gpu: &Gpu, desc: &ProgramDesc) -> Result<Self, ShaderError> {
        let id = gpu.compile_program(desc)?;
        Ok(Program {
            id,
            name: desc.name.clone(),
            gpu: gpu.clone(),
        })
    }

    /// The program handle.
    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// The logical name of the program.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes this program current.
    pub fn bind(&self) {
        self.gpu.use_program(self.id)
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        self.gpu.delete_program(self.id);
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
