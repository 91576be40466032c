//! A device that tracks GPU state on the CPU.
//!
//! Nothing is rasterised. Every subresource instead carries a digest of the work that
//! produced it, folded from the program, the uniform data, the sampled textures and the
//! buffers of each draw. Two identical sequences of clears and draws therefore produce
//! identical digests, and a target that was drawn to is distinguishable from a cleared one.

use super::{
    AttachmentPoint, AttachmentTarget, BufferId, BufferKind, ClearFlags, Diagnostic,
    DiagnosticSource, DrawBuffers, FramebufferId, LayerSelection, ProgramConstant, ProgramDesc,
    ProgramId, RenderDevice, RenderState, SampleKind, Severity, StageKind, SubroutineSelection,
    TextureDesc, TextureId, TextureKind, ViewDimension, SUBROUTINE_AXES,
};
use crate::binding::{TextureUnit, UniformSlot};
use crate::error::{GpuError, ShaderError};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

/// What a texture subresource holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Contents {
    /// Never written.
    Undefined,
    /// Cleared and not drawn to since.
    Cleared,
    /// Uploaded from the CPU.
    Uploaded(u64),
    /// Drawn to `draws` times since the last clear.
    Drawn { digest: u64, draws: u32 },
    /// Downsampled from the level above.
    Downsampled(u64),
}

impl Contents {
    /// A digest identifying the contents.
    pub fn digest(&self) -> u64 {
        match *self {
            Contents::Undefined => 0,
            Contents::Cleared => 1,
            Contents::Uploaded(d) | Contents::Downsampled(d) => d,
            Contents::Drawn { digest, .. } => digest,
        }
    }

    /// Does the subresource hold anything besides a clear colour?
    pub fn has_content(&self) -> bool {
        !matches!(self, Contents::Undefined | Contents::Cleared)
    }
}

/// A draw as seen by the device.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramId,
    pub program_name: String,
    pub framebuffer: Option<FramebufferId>,
    pub color_targets: Vec<AttachmentTarget>,
    pub depth_target: Option<AttachmentTarget>,
    /// Number of layers the draw was broadcast to.
    pub layers: u32,
    pub viewport: (u32, u32),
    pub state: RenderState,
    pub subroutines: SubroutineSelection,
    pub constants: [u32; ProgramConstant::COUNT],
    /// Contents of every uniform buffer the program reads, at draw time.
    pub uniforms: Vec<(UniformSlot, Option<BufferId>, Vec<u8>)>,
    /// Texture bound to every unit the program reads, with its visible level range.
    pub textures: Vec<(TextureUnit, Option<TextureId>, (u32, u32))>,
    pub buffers: DrawBuffers,
}

impl DrawRecord {
    /// The uniform data visible through `slot`.
    pub fn uniform(&self, slot: UniformSlot) -> Option<&[u8]> {
        self.uniforms
            .iter()
            .find(|(s, _, _)| *s == slot)
            .map(|(_, _, data)| &data[..])
    }

    /// The buffer bound to `slot` at draw time.
    pub fn uniform_buffer(&self, slot: UniformSlot) -> Option<BufferId> {
        self.uniforms
            .iter()
            .find(|(s, _, _)| *s == slot)
            .and_then(|(_, b, _)| *b)
    }

    /// The texture bound to `unit` at draw time.
    pub fn texture(&self, unit: TextureUnit) -> Option<TextureId> {
        self.textures
            .iter()
            .find(|(u, _, _)| *u == unit)
            .and_then(|(_, t, _)| *t)
    }

    /// Does the draw write to `texture`?
    pub fn writes(&self, texture: TextureId) -> bool {
        self.color_targets.iter().any(|t| t.texture == texture)
            || self.depth_target.map(|t| t.texture) == Some(texture)
    }
}

/// One entry of the command log.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    BindFramebuffer(Option<FramebufferId>),
    Attach {
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    },
    UseProgram(ProgramId),
    SetViewport(u32, u32),
    Clear {
        framebuffer: Option<FramebufferId>,
        flags: ClearFlags,
        color: [f32; 4],
    },
    Draw(Box<DrawRecord>),
    GenerateMipmaps(TextureId),
    WriteBuffer(BufferId),
}

struct TextureState {
    desc: TextureDesc,
    base_level: u32,
    max_level: u32,
    contents: Vec<Contents>,
}

impl TextureState {
    fn index(&self, level: u32, layer: u32) -> usize {
        (level * self.desc.kind.layer_count() + layer) as usize
    }

    fn visible_levels(&self) -> (u32, u32) {
        let last = self.desc.levels - 1;
        (self.base_level.min(last), self.max_level.min(last))
    }
}

struct BufferState {
    label: String,
    data: Vec<u8>,
}

struct FramebufferState {
    label: String,
    attachments: BTreeMap<AttachmentPoint, AttachmentTarget>,
}

struct ProgramState {
    desc: ProgramDesc,
    constants: [u32; ProgramConstant::COUNT],
}

struct Inner {
    next_handle: u32,
    textures: HashMap<TextureId, TextureState>,
    buffers: HashMap<BufferId, BufferState>,
    framebuffers: HashMap<FramebufferId, FramebufferState>,
    programs: HashMap<ProgramId, ProgramState>,
    bound_framebuffer: Option<FramebufferId>,
    current_program: Option<ProgramId>,
    subroutines: SubroutineSelection,
    uniform_bindings: BTreeMap<UniformSlot, BufferId>,
    texture_bindings: BTreeMap<TextureUnit, TextureId>,
    state: RenderState,
    viewport: (u32, u32),
    clear_color: [f32; 4],
    surface_size: (u32, u32),
    surface: Contents,
    commands: Vec<Command>,
    diagnostics: Vec<Diagnostic>,
}

/// A [`RenderDevice`] that validates and records instead of rendering.
pub struct HeadlessDevice {
    inner: RefCell<Inner>,
}

fn digest_of<T: Hash>(value: T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn dimension_matches(dimension: ViewDimension, kind: TextureKind) -> bool {
    matches!(
        (dimension, kind),
        (ViewDimension::D2, TextureKind::D2)
            | (ViewDimension::D2Array, TextureKind::D2Array { .. })
            | (ViewDimension::Cube, TextureKind::Cube)
            | (ViewDimension::CubeArray, TextureKind::CubeArray { .. })
    )
}

impl HeadlessDevice {
    /// Creates a device whose window surface is `width × height`.
    pub fn new(width: u32, height: u32) -> Self {
        HeadlessDevice {
            inner: RefCell::new(Inner {
                next_handle: 1,
                textures: HashMap::new(),
                buffers: HashMap::new(),
                framebuffers: HashMap::new(),
                programs: HashMap::new(),
                bound_framebuffer: None,
                current_program: None,
                subroutines: [0; SUBROUTINE_AXES],
                uniform_bindings: BTreeMap::new(),
                texture_bindings: BTreeMap::new(),
                state: RenderState::default(),
                viewport: (width, height),
                clear_color: [0.0; 4],
                surface_size: (width, height),
                surface: Contents::Undefined,
                commands: Vec::new(),
                diagnostics: Vec::new(),
            }),
        }
    }

    /// Contents of one level of one layer of a texture.
    pub fn contents(&self, texture: TextureId, level: u32, layer: u32) -> Option<Contents> {
        let inner = self.inner.borrow();
        let tex = inner.textures.get(&texture)?;
        if level >= tex.desc.levels || layer >= tex.desc.kind.layer_count() {
            return None;
        }
        Some(tex.contents[tex.index(level, layer)])
    }

    /// Contents of the window surface.
    pub fn surface_contents(&self) -> Contents {
        self.inner.borrow().surface
    }

    /// The `(base, max)` mip levels visible to samplers.
    pub fn texture_levels(&self, texture: TextureId) -> Option<(u32, u32)> {
        let inner = self.inner.borrow();
        inner.textures.get(&texture).map(|t| (t.base_level, t.max_level))
    }

    /// Current contents of a buffer.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.inner.borrow().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Debug label of a buffer.
    pub fn buffer_label(&self, buffer: BufferId) -> Option<String> {
        self.inner.borrow().buffers.get(&buffer).map(|b| b.label.clone())
    }

    /// Debug label of a framebuffer.
    pub fn framebuffer_label(&self, framebuffer: FramebufferId) -> Option<String> {
        let inner = self.inner.borrow();
        inner.framebuffers.get(&framebuffer).map(|f| f.label.clone())
    }

    /// Number of live textures, buffers, framebuffers and programs.
    pub fn live_resources(&self) -> (usize, usize, usize, usize) {
        let inner = self.inner.borrow();
        (
            inner.textures.len(),
            inner.buffers.len(),
            inner.framebuffers.len(),
            inner.programs.len(),
        )
    }

    /// The command log.
    pub fn commands(&self) -> Vec<Command> {
        self.inner.borrow().commands.clone()
    }

    /// Every draw in the command log.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.inner
            .borrow()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(draw) => Some((**draw).clone()),
                _ => None,
            })
            .collect()
    }

    /// Empties the command log.
    pub fn clear_commands(&self) {
        self.inner.borrow_mut().commands.clear();
    }

    /// Diagnostics reported so far, without draining them.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.borrow().diagnostics.clone()
    }
}

impl Inner {
    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn report(&mut self, severity: Severity, message: String) {
        let source = if severity == Severity::High {
            DiagnosticSource::Validation
        } else {
            DiagnosticSource::Application
        };
        self.diagnostics.push(Diagnostic {
            severity,
            source,
            message,
        });
    }

    fn attachments(&self) -> (Vec<AttachmentTarget>, Option<AttachmentTarget>) {
        let Some(fb) = self.bound_framebuffer.and_then(|id| self.framebuffers.get(&id)) else {
            return (Vec::new(), None);
        };
        let colors = fb
            .attachments
            .iter()
            .filter(|(point, _)| matches!(point, AttachmentPoint::Color(_)))
            .map(|(_, target)| *target)
            .collect();
        (colors, fb.attachments.get(&AttachmentPoint::Depth).copied())
    }

    fn target_layers(&self, target: &AttachmentTarget) -> u32 {
        match target.layers {
            LayerSelection::Single(_) => 1,
            LayerSelection::All => self
                .textures
                .get(&target.texture)
                .map_or(1, |t| t.desc.kind.layer_count()),
        }
    }

    fn validate_targets(&mut self, targets: &[AttachmentTarget]) -> Option<(u32, u32)> {
        let mut size = None;
        for target in targets {
            let Some(tex) = self.textures.get(&target.texture) else {
                self.report(
                    Severity::High,
                    format!("attachment references deleted texture {:?}", target.texture),
                );
                return None;
            };
            if target.level >= tex.desc.levels {
                let message = format!(
                    "attachment level {} out of range for `{}`",
                    target.level, tex.desc.label
                );
                self.report(Severity::High, message);
                return None;
            }
            if let LayerSelection::Single(layer) = target.layers {
                if layer >= tex.desc.kind.layer_count() {
                    let message =
                        format!("attachment layer {} out of range for `{}`", layer, tex.desc.label);
                    self.report(Severity::High, message);
                    return None;
                }
            }
            let level_size = tex.desc.level_size(target.level);
            match size {
                None => size = Some(level_size),
                Some(s) if s != level_size => {
                    let message = format!(
                        "framebuffer attachments differ in size: {:?} and {:?} (`{}`)",
                        s, level_size, tex.desc.label
                    );
                    self.report(Severity::High, message);
                    return None;
                }
                _ => {}
            }
        }
        size
    }

    fn write_subresource(&mut self, target: &AttachmentTarget, layer: u32, draw_digest: u64) {
        let layer = match target.layers {
            LayerSelection::All => layer,
            LayerSelection::Single(l) => l,
        };
        if let Some(tex) = self.textures.get_mut(&target.texture) {
            let index = tex.index(target.level, layer);
            let previous = tex.contents[index];
            let draws = match previous {
                Contents::Drawn { draws, .. } => draws + 1,
                _ => 1,
            };
            tex.contents[index] = Contents::Drawn {
                digest: digest_of((previous.digest(), draw_digest, layer)),
                draws,
            };
        }
    }

    fn draw(&mut self, buffers: DrawBuffers) {
        let Some(program_id) = self.current_program else {
            self.report(Severity::High, "draw issued without a current program".into());
            return;
        };
        let Some(program) = self.programs.get(&program_id) else {
            self.report(Severity::High, format!("draw uses deleted program {program_id:?}"));
            return;
        };
        let desc = program.desc.clone();
        let constants = program.constants;

        for buffer in [buffers.vertices, buffers.indices] {
            if !self.buffers.contains_key(&buffer) {
                self.report(Severity::High, format!("draw uses deleted buffer {buffer:?}"));
                return;
            }
        }

        let (colors, depth) = self.attachments();
        let target_size = if self.bound_framebuffer.is_some() {
            let all: Vec<_> = colors.iter().copied().chain(depth).collect();
            if all.is_empty() {
                self.report(Severity::High, "draw into a framebuffer without attachments".into());
                return;
            }
            match self.validate_targets(&all) {
                Some(size) => size,
                None => return,
            }
        } else {
            self.surface_size
        };

        let color_count = if self.bound_framebuffer.is_some() {
            colors.len() as u32
        } else {
            1
        };
        if color_count != desc.color_outputs {
            let message = format!(
                "program `{}` writes {} colour outputs but the target has {}",
                desc.name, desc.color_outputs, color_count
            );
            self.report(Severity::Medium, message);
        }
        if self.viewport.0 > target_size.0 || self.viewport.1 > target_size.1 {
            let message = format!(
                "viewport {:?} exceeds the {:?} target of `{}`",
                self.viewport, target_size, desc.name
            );
            self.report(Severity::Medium, message);
        }

        let mut hasher = DefaultHasher::new();
        program_id.hash(&mut hasher);
        self.subroutines.hash(&mut hasher);
        constants.hash(&mut hasher);
        buffers.hash(&mut hasher);
        (
            self.state.depth_test,
            self.state.depth_write,
            self.state.additive_blend,
            self.state.cull,
        )
            .hash(&mut hasher);
        self.viewport.hash(&mut hasher);

        let mut uniforms = Vec::with_capacity(desc.uniforms.len());
        for slot in &desc.uniforms {
            let buffer = self.uniform_bindings.get(slot).copied();
            let data = buffer
                .and_then(|b| self.buffers.get(&b))
                .map(|b| b.data.clone())
                .unwrap_or_default();
            data.hash(&mut hasher);
            uniforms.push((*slot, buffer, data));
        }

        let attached: Vec<_> = colors.iter().copied().chain(depth).collect();
        let mut textures = Vec::with_capacity(desc.textures.len());
        let mut problems = Vec::new();
        for sampled in &desc.textures {
            let bound = self.texture_bindings.get(&sampled.unit).copied();
            let mut levels = (0, 0);
            if let Some(tex) = bound.and_then(|id| self.textures.get(&id)) {
                levels = tex.visible_levels();
                if !dimension_matches(sampled.dimension, tex.desc.kind) {
                    problems.push(format!(
                        "unit {:?} of `{}` expects {:?} but `{}` is {:?}",
                        sampled.unit, desc.name, sampled.dimension, tex.desc.label, tex.desc.kind
                    ));
                }
                let depth_format = tex.desc.format.is_depth();
                if depth_format != (sampled.sample != SampleKind::Float) {
                    problems.push(format!(
                        "unit {:?} of `{}` samples `{}` with {:?}",
                        sampled.unit, desc.name, tex.desc.label, sampled.sample
                    ));
                }
                let sampled_while_attached = attached.iter().any(|a| {
                    bound == Some(a.texture) && a.level >= levels.0 && a.level <= levels.1
                });
                if sampled_while_attached {
                    problems.push(format!(
                        "`{}` is sampled by `{}` while attached to the bound framebuffer",
                        tex.desc.label, desc.name
                    ));
                }
                for level in levels.0..=levels.1 {
                    for layer in 0..tex.desc.kind.layer_count() {
                        tex.contents[tex.index(level, layer)].hash(&mut hasher);
                    }
                }
            }
            bound.hash(&mut hasher);
            textures.push((sampled.unit, bound, levels));
        }
        for problem in problems {
            self.report(Severity::Medium, problem);
        }
        let draw_digest = hasher.finish();

        let layered_targets = attached
            .iter()
            .map(|t| self.target_layers(t))
            .max()
            .unwrap_or(1);
        let layers = if desc.layered {
            constants[ProgramConstant::LayerCount.index()].min(layered_targets)
        } else {
            1
        };

        if self.bound_framebuffer.is_some() {
            let writes_depth = self.state.depth_test && self.state.depth_write;
            for layer in 0..layers {
                for target in &colors {
                    self.write_subresource(target, layer, draw_digest);
                }
                if let (Some(target), true) = (depth, writes_depth) {
                    self.write_subresource(&target, layer, draw_digest);
                }
            }
        } else {
            self.surface = Contents::Drawn {
                digest: digest_of((self.surface.digest(), draw_digest)),
                draws: match self.surface {
                    Contents::Drawn { draws, .. } => draws + 1,
                    _ => 1,
                },
            };
        }

        let record = DrawRecord {
            program: program_id,
            program_name: desc.name,
            framebuffer: self.bound_framebuffer,
            color_targets: colors,
            depth_target: depth,
            layers,
            viewport: self.viewport,
            state: self.state,
            subroutines: self.subroutines,
            constants,
            uniforms,
            textures,
            buffers,
        };
        self.commands.push(Command::Draw(Box::new(record)));
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        if desc.width == 0 || desc.height == 0 || desc.levels == 0 {
            return Err(GpuError::InvalidTexture {
                label: desc.label.clone(),
                reason: format!("{}x{} with {} levels", desc.width, desc.height, desc.levels),
            });
        }
        if desc.kind.is_cube() && desc.width != desc.height {
            return Err(GpuError::InvalidTexture {
                label: desc.label.clone(),
                reason: "cube faces must be square".into(),
            });
        }
        let max_levels = 32 - desc.width.max(desc.height).leading_zeros();
        if desc.levels > max_levels {
            return Err(GpuError::InvalidTexture {
                label: desc.label.clone(),
                reason: format!("{} levels requested, at most {}", desc.levels, max_levels),
            });
        }

        let mut inner = self.inner.borrow_mut();
        let id = TextureId(inner.allocate());
        let subresources = (desc.levels * desc.kind.layer_count()) as usize;
        let _ = inner.textures.insert(
            id,
            TextureState {
                desc: desc.clone(),
                base_level: 0,
                max_level: desc.levels - 1,
                contents: vec![Contents::Undefined; subresources],
            },
        );
        Ok(id)
    }

    fn write_texture(&self, texture: TextureId, level: u32, layer: u32, texels: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let Some(tex) = inner.textures.get_mut(&texture) else {
            inner.report(Severity::High, format!("write to deleted texture {texture:?}"));
            return;
        };
        let (w, h) = tex.desc.level_size(level);
        let expected = (w * h * tex.desc.format.texel_size()) as usize;
        if level >= tex.desc.levels || layer >= tex.desc.kind.layer_count() || texels.len() != expected
        {
            let message = format!(
                "invalid upload to `{}` level {} layer {} ({} bytes, expected {})",
                tex.desc.label,
                level,
                layer,
                texels.len(),
                expected
            );
            inner.report(Severity::High, message);
            return;
        }
        let index = tex.index(level, layer);
        tex.contents[index] = Contents::Uploaded(digest_of(texels));
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut inner = self.inner.borrow_mut();
        let _ = inner.textures.remove(&texture);
        inner.texture_bindings.retain(|_, t| *t != texture);
    }

    fn set_texture_levels(&self, texture: TextureId, base: u32, max: u32) {
        let mut inner = self.inner.borrow_mut();
        match inner.textures.get_mut(&texture) {
            Some(tex) => {
                tex.base_level = base;
                tex.max_level = max;
            }
            None => inner.report(Severity::High, format!("level range of deleted {texture:?}")),
        }
    }

    fn generate_mipmaps(&self, texture: TextureId) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::GenerateMipmaps(texture));
        let Some(tex) = inner.textures.get_mut(&texture) else {
            inner.report(Severity::High, format!("mipmaps of deleted {texture:?}"));
            return;
        };
        let (base, max) = tex.visible_levels();
        for level in base + 1..=max {
            for layer in 0..tex.desc.kind.layer_count() {
                let source = tex.contents[tex.index(level - 1, layer)];
                let index = tex.index(level, layer);
                tex.contents[index] = Contents::Downsampled(digest_of(source));
            }
        }
    }

    fn texture_desc(&self, texture: TextureId) -> Option<TextureDesc> {
        let inner = self.inner.borrow();
        inner.textures.get(&texture).map(|t| t.desc.clone())
    }

    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        if contents.is_empty() {
            return Err(GpuError::Creation {
                what: "buffer",
                label: label.to_string(),
                reason: format!("empty {kind:?} buffer"),
            });
        }
        let mut inner = self.inner.borrow_mut();
        let id = BufferId(inner.allocate());
        let _ = inner.buffers.insert(
            id,
            BufferState {
                label: label.to_string(),
                data: contents.to_vec(),
            },
        );
        Ok(id)
    }

    fn write_buffer(&self, buffer: BufferId, data: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::WriteBuffer(buffer));
        let Some(state) = inner.buffers.get_mut(&buffer) else {
            inner.report(Severity::High, format!("write to deleted buffer {buffer:?}"));
            return;
        };
        if data.len() > state.data.len() {
            let message = format!(
                "write of {} bytes overflows `{}` ({} bytes)",
                data.len(),
                state.label,
                state.data.len()
            );
            inner.report(Severity::High, message);
            return;
        }
        state.data[..data.len()].copy_from_slice(data);
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut inner = self.inner.borrow_mut();
        let _ = inner.buffers.remove(&buffer);
        inner.uniform_bindings.retain(|_, b| *b != buffer);
    }

    fn create_framebuffer(&self, label: &str) -> Result<FramebufferId, GpuError> {
        let mut inner = self.inner.borrow_mut();
        let id = FramebufferId(inner.allocate());
        let _ = inner.framebuffers.insert(
            id,
            FramebufferState {
                label: label.to_string(),
                attachments: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn attach(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
        target: Option<AttachmentTarget>,
    ) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::Attach {
            framebuffer,
            point,
            target,
        });
        let Some(fb) = inner.framebuffers.get_mut(&framebuffer) else {
            inner.report(Severity::High, format!("attach to deleted {framebuffer:?}"));
            return;
        };
        match target {
            Some(target) => {
                let _ = fb.attachments.insert(point, target);
            }
            None => {
                let _ = fb.attachments.remove(&point);
            }
        }
    }

    fn attachment(
        &self,
        framebuffer: FramebufferId,
        point: AttachmentPoint,
    ) -> Option<AttachmentTarget> {
        let inner = self.inner.borrow();
        inner
            .framebuffers
            .get(&framebuffer)
            .and_then(|fb| fb.attachments.get(&point).copied())
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        let mut inner = self.inner.borrow_mut();
        let _ = inner.framebuffers.remove(&framebuffer);
        if inner.bound_framebuffer == Some(framebuffer) {
            inner.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::BindFramebuffer(framebuffer));
        if let Some(id) = framebuffer {
            if !inner.framebuffers.contains_key(&id) {
                inner.report(Severity::High, format!("bind of deleted {id:?}"));
                return;
            }
        }
        inner.bound_framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.inner.borrow().bound_framebuffer
    }

    fn compile_program(&self, desc: &ProgramDesc) -> Result<ProgramId, ShaderError> {
        let mut log = String::new();
        for kind in [StageKind::Vertex, StageKind::Fragment] {
            let stage = desc.stage(kind);
            match stage {
                Some(stage) if !stage.source.contains(&format!("fn {}(", stage.entry_point)) => {
                    log.push_str(&format!(
                        "{:?} entry point `{}` not found\n",
                        kind, stage.entry_point
                    ));
                }
                None if kind == StageKind::Vertex => log.push_str("missing vertex stage\n"),
                None if desc.color_outputs > 0 => log.push_str("missing fragment stage\n"),
                _ => {}
            }
        }
        if !log.is_empty() {
            return Err(ShaderError::Link {
                program: desc.name.clone(),
                log,
            });
        }

        let mut inner = self.inner.borrow_mut();
        let id = ProgramId(inner.allocate());
        let _ = inner.programs.insert(
            id,
            ProgramState {
                desc: desc.clone(),
                constants: [0; ProgramConstant::COUNT],
            },
        );
        Ok(id)
    }

    fn delete_program(&self, program: ProgramId) {
        let mut inner = self.inner.borrow_mut();
        let _ = inner.programs.remove(&program);
        if inner.current_program == Some(program) {
            inner.current_program = None;
        }
    }

    fn use_program(&self, program: ProgramId) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::UseProgram(program));
        inner.current_program = Some(program);
        inner.subroutines = [0; SUBROUTINE_AXES];
    }

    fn set_program_constant(&self, program: ProgramId, constant: ProgramConstant, value: u32) {
        let mut inner = self.inner.borrow_mut();
        match inner.programs.get_mut(&program) {
            Some(state) => state.constants[constant.index()] = value,
            None => inner.report(Severity::High, format!("constant of deleted {program:?}")),
        }
    }

    fn set_subroutines(&self, selection: SubroutineSelection) {
        self.inner.borrow_mut().subroutines = selection;
    }

    fn bind_uniform_buffer(&self, slot: UniformSlot, buffer: BufferId) {
        let _ = self.inner.borrow_mut().uniform_bindings.insert(slot, buffer);
    }

    fn uniform_binding(&self, slot: UniformSlot) -> Option<BufferId> {
        self.inner.borrow().uniform_bindings.get(&slot).copied()
    }

    fn bind_texture(&self, unit: TextureUnit, texture: TextureId) {
        let _ = self.inner.borrow_mut().texture_bindings.insert(unit, texture);
    }

    fn texture_binding(&self, unit: TextureUnit) -> Option<TextureId> {
        self.inner.borrow().texture_bindings.get(&unit).copied()
    }

    fn set_render_state(&self, state: RenderState) {
        self.inner.borrow_mut().state = state;
    }

    fn render_state(&self) -> RenderState {
        self.inner.borrow().state
    }

    fn set_viewport(&self, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.commands.push(Command::SetViewport(width, height));
        inner.viewport = (width, height);
    }

    fn viewport(&self) -> (u32, u32) {
        self.inner.borrow().viewport
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        self.inner.borrow_mut().clear_color = color;
    }

    fn clear_color(&self) -> [f32; 4] {
        self.inner.borrow().clear_color
    }

    fn clear(&self, flags: ClearFlags) {
        let mut inner = self.inner.borrow_mut();
        let framebuffer = inner.bound_framebuffer;
        let color = inner.clear_color;
        inner.commands.push(Command::Clear {
            framebuffer,
            flags,
            color,
        });
        if framebuffer.is_none() {
            if flags.contains(ClearFlags::COLOR) {
                inner.surface = Contents::Cleared;
            }
            return;
        }

        let (colors, depth) = inner.attachments();
        let mut targets = Vec::new();
        if flags.contains(ClearFlags::COLOR) {
            targets.extend(colors);
        }
        if flags.contains(ClearFlags::DEPTH) {
            targets.extend(depth);
        }
        for target in targets {
            let layers = inner.target_layers(&target);
            if let Some(tex) = inner.textures.get_mut(&target.texture) {
                for i in 0..layers {
                    let layer = match target.layers {
                        LayerSelection::All => i,
                        LayerSelection::Single(l) => l,
                    };
                    if target.level < tex.desc.levels && layer < tex.desc.kind.layer_count() {
                        let index = tex.index(target.level, layer);
                        tex.contents[index] = Contents::Cleared;
                    }
                }
            }
        }
    }

    fn draw_indexed(&self, buffers: DrawBuffers) {
        self.inner.borrow_mut().draw(buffers);
    }

    fn begin_frame(&self) -> bool {
        self.inner.borrow_mut().commands.push(Command::BeginFrame);
        true
    }

    fn end_frame(&self) {
        self.inner.borrow_mut().commands.push(Command::EndFrame);
    }

    fn resize_surface(&self, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.surface_size = (width, height);
        inner.surface = Contents::Undefined;
    }

    fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.inner.borrow_mut().diagnostics)
    }
}
