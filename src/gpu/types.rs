use crate::math::CubeFace;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// The raw handle value.
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Handle of a texture created by a [`RenderDevice`](super::RenderDevice).
    TextureId
);
handle!(
    /// Handle of a uniform, vertex or index buffer.
    BufferId
);
handle!(
    /// Handle of an off-screen framebuffer.
    FramebufferId
);
handle!(
    /// Handle of a linked program.
    ProgramId
);

/// Texel formats, named after the storage they stand for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGB colour (stored with an unused alpha channel).
    Rgb8,
    /// 8-bit RGBA colour.
    Rgba8,
    /// Two 16-bit float channels.
    Rg16F,
    /// One 16-bit channel.
    R16,
    /// Packed HDR colour.
    R11G11B10F,
    /// Four 16-bit float channels.
    Rgba16F,
    /// 32-bit float depth.
    Depth32F,
}

impl TextureFormat {
    /// Is this a depth format?
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32F)
    }

    /// Size of one texel as uploaded by [`RenderDevice::write_texture`](super::RenderDevice::write_texture).
    pub fn texel_size(self) -> u32 {
        match self {
            TextureFormat::Rgb8 | TextureFormat::Rgba8 => 4,
            TextureFormat::Rg16F => 4,
            TextureFormat::R16 => 2,
            TextureFormat::R11G11B10F | TextureFormat::Rgba16F => 8,
            TextureFormat::Depth32F => 4,
        }
    }
}

/// Shape of a texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    D2Array { layers: u32 },
    Cube,
    CubeArray { cubes: u32 },
}

impl TextureKind {
    /// Number of 2D layers, counting cube faces.
    pub fn layer_count(self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::D2Array { layers } => layers,
            TextureKind::Cube => 6,
            TextureKind::CubeArray { cubes } => cubes * 6,
        }
    }

    /// Is this a cube or cube-array texture?
    pub fn is_cube(self) -> bool {
        matches!(self, TextureKind::Cube | TextureKind::CubeArray { .. })
    }
}

/// Minification/magnification filtering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Nearest texel, no mipmaps.
    Nearest,
    /// Bilinear, no mipmaps.
    Linear,
    /// Bilinear within the nearest mip level.
    LinearMipNearest,
    /// Trilinear.
    Trilinear,
}

/// Behaviour outside `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Wrap {
    Clamp,
    Repeat,
}

/// Sampling parameters attached to a texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: Filter,
    pub wrap: Wrap,
    /// Depth comparison (`<=`) sampling, for shadow maps.
    pub compare: bool,
    pub anisotropy: u16,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        SamplerDesc {
            filter: Filter::Nearest,
            wrap: Wrap::Clamp,
            compare: false,
            anisotropy: 1,
        }
    }
}

impl SamplerDesc {
    /// Sets the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the wrap mode.
    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.wrap = wrap;
        self
    }

    /// Enables depth comparison.
    pub fn with_compare(mut self) -> Self {
        self.compare = true;
        self
    }

    /// Sets the maximum anisotropy.
    pub fn with_anisotropy(mut self, anisotropy: u16) -> Self {
        self.anisotropy = anisotropy.max(1);
        self
    }
}

/// Everything needed to allocate a texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub sampler: SamplerDesc,
}

impl TextureDesc {
    /// A single-level 2D texture.
    pub fn new_2d(label: impl Into<String>, format: TextureFormat, width: u32, height: u32) -> Self {
        TextureDesc {
            label: label.into(),
            kind: TextureKind::D2,
            format,
            width,
            height,
            levels: 1,
            sampler: SamplerDesc::default(),
        }
    }

    /// Sets the shape.
    pub fn with_kind(mut self, kind: TextureKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the number of mip levels.
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels.max(1);
        self
    }

    /// Sets the sampling parameters.
    pub fn with_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.sampler = sampler;
        self
    }

    /// Size of mip `level`.
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

/// What a buffer is used for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Uniform,
    Vertex,
    Index,
}

/// Where a texture is attached inside a framebuffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentPoint {
    Color(u8),
    Depth,
}

/// Which layers of a texture an attachment covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LayerSelection {
    /// Every layer: draws are broadcast to the layers the program asks for.
    All,
    /// A single layer or cube face.
    Single(u32),
}

/// A texture subresource attached to a framebuffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentTarget {
    pub texture: TextureId,
    pub level: u32,
    pub layers: LayerSelection,
}

impl AttachmentTarget {
    /// Mip 0 of every layer of `texture`.
    pub fn new(texture: TextureId) -> Self {
        AttachmentTarget {
            texture,
            level: 0,
            layers: LayerSelection::All,
        }
    }

    /// Selects a mip level.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Selects a single layer.
    pub fn layer(mut self, layer: u32) -> Self {
        self.layers = LayerSelection::Single(layer);
        self
    }

    /// Selects a single cube face.
    pub fn face(self, face: CubeFace) -> Self {
        self.layer(face.layer())
    }
}

bitflags! {
    /// Attachments cleared by [`RenderDevice::clear`](super::RenderDevice::clear).
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 0b01;
        const DEPTH = 0b10;
    }
}

/// Face culling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    None,
    #[default]
    Back,
    Front,
}

/// Depth bias applied while rendering shadow maps.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

/// Fixed-function state in effect for the next draws.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_write: bool,
    /// Additive `one + one` blending on colour attachment 0.
    pub additive_blend: bool,
    pub cull: CullFace,
    pub polygon_offset: Option<PolygonOffset>,
}

impl Default for RenderState {
    fn default() -> Self {
        RenderState {
            depth_test: true,
            depth_write: true,
            additive_blend: false,
            cull: CullFace::Back,
            polygon_offset: None,
        }
    }
}

/// Vertex buffer layouts understood by programs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// [`Vertex`](crate::procedural::Vertex): position, normal, uv.
    Mesh,
    /// [`QuadVertex`](crate::procedural::QuadVertex): clip-space position.
    Quad,
}

/// Buffers of an indexed draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DrawBuffers {
    pub vertices: BufferId,
    pub indices: BufferId,
    pub index_count: u32,
}

/// Per-program fixed uniform locations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProgramConstant {
    /// Number of active point lights.
    PointLightCount = 0,
    /// Number of active spot lights.
    SpotLightCount = 1,
    /// Number of layers a layered draw is broadcast to.
    LayerCount = 2,
}

impl ProgramConstant {
    pub(crate) const COUNT: usize = 3;

    /// Location index of the constant.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Number of independent subroutine axes a program can select from.
pub const SUBROUTINE_AXES: usize = 4;

/// Active subroutine per axis, as set by [`RenderDevice::set_subroutines`](super::RenderDevice::set_subroutines).
pub type SubroutineSelection = [u32; SUBROUTINE_AXES];

/// How serious a diagnostic is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Notification,
    Low,
    Medium,
    High,
}

/// Who produced a diagnostic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticSource {
    /// The GPU API validation layer.
    Validation,
    /// The GPU ran out of memory.
    OutOfMemory,
    /// The renderer itself.
    Application,
}

/// A message reported through the device diagnostic channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub source: DiagnosticSource,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic raised by the renderer.
    pub fn application(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            source: DiagnosticSource::Application,
            message: message.into(),
        }
    }

    /// Logs the diagnostic with the level matching its severity.
    pub fn log(&self) {
        match self.severity {
            Severity::High => log::error!("[{:?}] {}", self.source, self.message),
            Severity::Medium => log::warn!("[{:?}] {}", self.source, self.message),
            Severity::Low => log::info!("[{:?}] {}", self.source, self.message),
            Severity::Notification => log::debug!("[{:?}] {}", self.source, self.message),
        }
    }
}
