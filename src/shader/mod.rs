//! The program set used by the render passes.
//!
//! Programs are addressed by [`ProgramName`]. Each name knows its stages and the part of the
//! binding table it reads; [`ShaderService`] compiles them all once at start-up and hands out
//! their handles.

use crate::binding::{TextureUnit, UniformSlot};
use crate::builtin;
use crate::error::ShaderError;
use crate::gpu::{
    Gpu, Program, ProgramConstant, ProgramDesc, ProgramId, SampledTexture, ShaderStage,
    SubroutineSelection, VertexLayout, ViewDimension,
};
use std::borrow::Cow;

/// Logical names of the programs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProgramName {
    GBuffer,
    DeferredLighting,
    Shadow,
    ShadowTransparency,
    PostProcessInit,
    GaussianBlur,
    PostProcess,
}

impl ProgramName {
    /// Every program, in compilation order.
    pub const ALL: [ProgramName; 7] = [
        ProgramName::GBuffer,
        ProgramName::DeferredLighting,
        ProgramName::Shadow,
        ProgramName::ShadowTransparency,
        ProgramName::PostProcessInit,
        ProgramName::GaussianBlur,
        ProgramName::PostProcess,
    ];

    /// The stable name used in logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramName::GBuffer => "gbuffer",
            ProgramName::DeferredLighting => "deferred_lighting",
            ProgramName::Shadow => "shadow",
            ProgramName::ShadowTransparency => "shadow_transparency",
            ProgramName::PostProcessInit => "post_process_init",
            ProgramName::GaussianBlur => "gaussian_blur",
            ProgramName::PostProcess => "post_process",
        }
    }

    /// Stages and bindings of the program.
    pub fn desc(self) -> ProgramDesc {
        use SampledTexture as T;
        use TextureUnit as U;
        use ViewDimension::*;

        let mesh = |program: &str| source(&[builtin::COMMON_SRC, program]);
        let quad = |program: &str| source(&[builtin::COMMON_SRC, builtin::QUAD_SRC, program]);

        match self {
            ProgramName::GBuffer => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(mesh(builtin::GBUFFER_SRC), "fs_main"),
                vertex_layout: VertexLayout::Mesh,
                uniforms: vec![
                    UniformSlot::Object,
                    UniformSlot::Camera,
                    UniformSlot::ReflectionViewProjection,
                ],
                textures: vec![
                    T::float(U::Diffuse, D2),
                    T::float(U::Specular, D2),
                    T::float(U::Roughness, D2),
                    T::float(U::Environment, Cube),
                    T::float(U::PlanarReflection, D2),
                    T::float(U::CubeReflection, Cube),
                ],
                color_outputs: 4,
                layered: false,
            },
            ProgramName::DeferredLighting => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(quad(builtin::DEFERRED_LIGHTING_SRC), "fs_main"),
                vertex_layout: VertexLayout::Quad,
                uniforms: vec![
                    UniformSlot::Camera,
                    UniformSlot::PointLights,
                    UniformSlot::SpotLights,
                    UniformSlot::ShadowViewProjection,
                ],
                textures: vec![
                    T::shadow(U::SpotShadow, D2Array),
                    T::shadow(U::PointShadow, CubeArray),
                    T::float(U::SpotTransparency, D2Array),
                    T::depth(U::GBufferDepth, D2),
                    T::float(U::GBufferNormal, D2),
                    T::float(U::GBufferDiffuse, D2),
                    T::float(U::GBufferSpecularRoughness, D2),
                ],
                color_outputs: 1,
                layered: false,
            },
            ProgramName::Shadow => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(mesh(builtin::SHADOW_SRC), "fs_depth"),
                vertex_layout: VertexLayout::Mesh,
                uniforms: vec![
                    UniformSlot::Object,
                    UniformSlot::ShadowViewProjection,
                    UniformSlot::ShadowPositions,
                ],
                textures: vec![],
                color_outputs: 0,
                layered: true,
            },
            ProgramName::ShadowTransparency => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(mesh(builtin::SHADOW_SRC), "fs_transparency"),
                vertex_layout: VertexLayout::Mesh,
                uniforms: vec![
                    UniformSlot::Object,
                    UniformSlot::ShadowViewProjection,
                    UniformSlot::ShadowPositions,
                ],
                textures: vec![T::float(U::Diffuse, D2)],
                color_outputs: 1,
                layered: true,
            },
            ProgramName::PostProcessInit => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(quad(builtin::POST_PROCESS_INIT_SRC), "fs_main"),
                vertex_layout: VertexLayout::Quad,
                uniforms: vec![],
                textures: vec![T::float(U::Accumulation, D2)],
                color_outputs: 2,
                layered: false,
            },
            ProgramName::GaussianBlur => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(quad(builtin::GAUSSIAN_BLUR_SRC), "fs_main"),
                vertex_layout: VertexLayout::Quad,
                uniforms: vec![UniformSlot::InverseResolution],
                textures: vec![T::float(U::Bloom, D2)],
                color_outputs: 1,
                layered: false,
            },
            ProgramName::PostProcess => ProgramDesc {
                name: self.as_str().to_string(),
                stages: stages(quad(builtin::POST_PROCESS_SRC), "fs_main"),
                vertex_layout: VertexLayout::Quad,
                uniforms: vec![],
                textures: vec![
                    T::float(U::GBufferNormal, D2),
                    T::float(U::GBufferDiffuse, D2),
                    T::float(U::GBufferSpecularRoughness, D2),
                    T::float(U::Accumulation, D2),
                    T::float(U::Luminance, D2),
                    T::float(U::Bloom, D2),
                ],
                color_outputs: 1,
                layered: false,
            },
        }
    }
}

fn source(parts: &[&str]) -> Cow<'static, str> {
    Cow::Owned(parts.join("\n"))
}

fn stages(source: Cow<'static, str>, fragment_entry: &'static str) -> Vec<ShaderStage> {
    vec![
        ShaderStage::vertex(source.clone(), "vs_main"),
        ShaderStage::fragment(source, fragment_entry),
    ]
}

/// Compiles and links one program.
pub fn compile_and_link(gpu: &Gpu, desc: &ProgramDesc) -> Result<Program, ShaderError> {
    let program = Program::new(gpu, desc)?;
    log::info!("compiled program `{}`", desc.name);
    Ok(program)
}

/// Reflection subroutine of the geometry pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ReflectionSubroutine {
    #[default]
    None = 0,
    Planar = 1,
    Cube = 2,
}

/// Subroutine selection of the geometry pass for one object.
pub fn gbuffer_subroutines(
    emissive: bool,
    refractive: bool,
    reflection: ReflectionSubroutine,
) -> SubroutineSelection {
    [emissive as u32, refractive as u32, reflection as u32, 0]
}

/// Direction of one blur pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlurDirection {
    Horizontal = 0,
    Vertical = 1,
}

impl BlurDirection {
    /// Subroutine selection of the blur program.
    pub fn selection(self) -> SubroutineSelection {
        [self as u32, 0, 0, 0]
    }
}

/// What the final pass shows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum OutputView {
    /// Tone-mapped colour with bloom.
    #[default]
    Composite = 0,
    Accumulation = 1,
    Normal = 2,
    Diffuse = 3,
    SpecularRoughness = 4,
    Luminance = 5,
    Bloom = 6,
}

impl OutputView {
    /// Every view, in key order.
    pub const ALL: [OutputView; 7] = [
        OutputView::Composite,
        OutputView::Accumulation,
        OutputView::Normal,
        OutputView::Diffuse,
        OutputView::SpecularRoughness,
        OutputView::Luminance,
        OutputView::Bloom,
    ];

    /// The view bound to the digit key `1 + index`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Subroutine selection of the post-process program.
    pub fn selection(self) -> SubroutineSelection {
        [self as u32, 0, 0, 0]
    }
}

/// The compiled program set.
pub struct ShaderService {
    programs: Vec<Program>,
}

impl ShaderService {
    /// Compiles every program. Any failure is fatal and returned with the compiler log.
    pub fn new(gpu: &Gpu) -> Result<Self, ShaderError> {
        let programs = ProgramName::ALL
            .iter()
            .map(|name| compile_and_link(gpu, &name.desc()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ShaderService { programs })
    }

    /// The program called `name`.
    #[inline]
    pub fn program(&self, name: ProgramName) -> &Program {
        &self.programs[name as usize]
    }

    /// Handle of the program called `name`.
    #[inline]
    pub fn id(&self, name: ProgramName) -> ProgramId {
        self.program(name).id()
    }

    /// Makes `name` the current program.
    pub fn bind(&self, name: ProgramName) {
        self.program(name).bind()
    }

    /// Sets a fixed uniform of `name`.
    pub fn set_constant(&self, gpu: &Gpu, name: ProgramName, constant: ProgramConstant, value: u32) {
        gpu.set_program_constant(self.id(name), constant, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, StageKind};
    use std::rc::Rc;

    #[test]
    fn every_program_links() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(64, 64));
        let shaders = ShaderService::new(&gpu).unwrap();
        for name in ProgramName::ALL {
            assert_eq!(shaders.program(name).name(), name.as_str());
        }
        assert_eq!(gpu.drain_diagnostics(), vec![]);
    }

    #[test]
    fn missing_entry_point_reports_the_program() {
        let gpu: Gpu = Rc::new(HeadlessDevice::new(64, 64));
        let mut desc = ProgramName::GaussianBlur.desc();
        desc.stages[1] = ShaderStage::fragment(builtin::GAUSSIAN_BLUR_SRC, "fs_missing");

        let error = compile_and_link(&gpu, &desc).unwrap_err();
        assert!(matches!(error, ShaderError::Link { ref program, .. } if program == "gaussian_blur"));
        assert!(error.to_string().contains("fs_missing"));
    }

    #[test]
    fn stage_sources_share_the_binding_table() {
        for name in ProgramName::ALL {
            let desc = name.desc();
            let vertex = desc.stage(StageKind::Vertex).unwrap();
            let fragment = desc.stage(StageKind::Fragment).unwrap();
            assert!(vertex.source.starts_with(builtin::COMMON_SRC));
            assert_eq!(vertex.source, fragment.source);
        }
    }

    #[test]
    fn subroutine_axes() {
        assert_eq!(
            gbuffer_subroutines(true, false, ReflectionSubroutine::Cube),
            [1, 0, 2, 0]
        );
        assert_eq!(BlurDirection::Vertical.selection(), [1, 0, 0, 0]);
        assert_eq!(OutputView::from_index(4), Some(OutputView::SpecularRoughness));
        assert_eq!(OutputView::from_index(7), None);
    }
}
