use super::VertexLayout;
use crate::binding::{TextureUnit, UniformSlot};
use std::borrow::Cow;

/// Pipeline stage of a shader entry point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

/// One stage of a program: a source text and the entry point to use in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStage {
    pub kind: StageKind,
    pub source: Cow<'static, str>,
    pub entry_point: &'static str,
}

impl ShaderStage {
    /// A vertex stage.
    pub fn vertex(source: impl Into<Cow<'static, str>>, entry_point: &'static str) -> Self {
        ShaderStage {
            kind: StageKind::Vertex,
            source: source.into(),
            entry_point,
        }
    }

    /// A fragment stage.
    pub fn fragment(source: impl Into<Cow<'static, str>>, entry_point: &'static str) -> Self {
        ShaderStage {
            kind: StageKind::Fragment,
            source: source.into(),
            entry_point,
        }
    }
}

/// Dimension of a sampled texture, as declared by the shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    D2,
    D2Array,
    Cube,
    CubeArray,
}

/// How a shader reads a texture unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// Filtered colour reads.
    Float,
    /// Raw depth reads.
    Depth,
    /// Depth comparison reads.
    DepthCompare,
}

/// A texture unit read by a program.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SampledTexture {
    pub unit: TextureUnit,
    pub dimension: ViewDimension,
    pub sample: SampleKind,
}

impl SampledTexture {
    /// A filtered colour texture.
    pub const fn float(unit: TextureUnit, dimension: ViewDimension) -> Self {
        SampledTexture {
            unit,
            dimension,
            sample: SampleKind::Float,
        }
    }

    /// A depth texture read without comparison.
    pub const fn depth(unit: TextureUnit, dimension: ViewDimension) -> Self {
        SampledTexture {
            unit,
            dimension,
            sample: SampleKind::Depth,
        }
    }

    /// A shadow map read with depth comparison.
    pub const fn shadow(unit: TextureUnit, dimension: ViewDimension) -> Self {
        SampledTexture {
            unit,
            dimension,
            sample: SampleKind::DepthCompare,
        }
    }
}

/// A program to compile and link, with the bindings it reads.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramDesc {
    pub name: String,
    pub stages: Vec<ShaderStage>,
    pub vertex_layout: VertexLayout,
    pub uniforms: Vec<UniformSlot>,
    pub textures: Vec<SampledTexture>,
    /// Number of colour attachments written by the fragment stage.
    pub color_outputs: u32,
    /// Draws are broadcast to every layer of layered attachments, up to
    /// [`ProgramConstant::LayerCount`](super::ProgramConstant::LayerCount).
    pub layered: bool,
}

impl ProgramDesc {
    /// The stage of the given kind, if any.
    pub fn stage(&self, kind: StageKind) -> Option<&ShaderStage> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    /// Does this program read `unit`?
    pub fn reads_texture(&self, unit: TextureUnit) -> bool {
        self.textures.iter().any(|t| t.unit == unit)
    }
}
