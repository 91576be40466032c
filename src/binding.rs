//! The binding table: every uniform-buffer slot and texture unit used by the renderer.
//!
//! Slots and units form one namespace shared by all passes. A pass that rebinds a
//! persistent slot must put the default buffer back before it returns; [`DefaultBindings`]
//! records those defaults and checks them.

use crate::gpu::{BufferId, RenderDevice};
use std::collections::BTreeMap;

/// Uniform-buffer binding points.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum UniformSlot {
    /// Per-object transform and emissive factor.
    Object = 0,
    /// View-projection, position and inverse view-projection of the current camera.
    Camera = 1,
    /// Point light array.
    PointLights = 2,
    /// View-projection of the planar reflection being sampled.
    ReflectionViewProjection = 3,
    /// Spot light array.
    SpotLights = 5,
    /// Light-space view-projections of the shadow layers being rendered or sampled.
    ShadowViewProjection = 6,
    /// `1 / resolution` of the current render target.
    InverseResolution = 7,
    /// Light positions of the shadow layers being rendered.
    ShadowPositions = 9,
}

impl UniformSlot {
    /// Every slot, in binding order.
    pub const ALL: [UniformSlot; 8] = [
        UniformSlot::Object,
        UniformSlot::Camera,
        UniformSlot::PointLights,
        UniformSlot::ReflectionViewProjection,
        UniformSlot::SpotLights,
        UniformSlot::ShadowViewProjection,
        UniformSlot::InverseResolution,
        UniformSlot::ShadowPositions,
    ];

    /// The binding index used by shaders.
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Texture units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TextureUnit {
    Diffuse = 0,
    Specular = 1,
    Roughness = 2,
    /// Sky cube map refracted by transparent objects.
    Environment = 3,
    PlanarReflection = 4,
    CubeReflection = 5,
    SpotShadow = 6,
    PointShadow = 7,
    /// Colour filtered through transparent objects, co-indexed with the spot shadows.
    SpotTransparency = 8,
    GBufferDepth = 11,
    GBufferNormal = 12,
    GBufferDiffuse = 13,
    GBufferSpecularRoughness = 14,
    Accumulation = 15,
    Luminance = 16,
    /// Input of the blur passes: the bloom chain or the blur scratch texture.
    Bloom = 17,
}

impl TextureUnit {
    /// Every unit, in binding order.
    pub const ALL: [TextureUnit; 16] = [
        TextureUnit::Diffuse,
        TextureUnit::Specular,
        TextureUnit::Roughness,
        TextureUnit::Environment,
        TextureUnit::PlanarReflection,
        TextureUnit::CubeReflection,
        TextureUnit::SpotShadow,
        TextureUnit::PointShadow,
        TextureUnit::SpotTransparency,
        TextureUnit::GBufferDepth,
        TextureUnit::GBufferNormal,
        TextureUnit::GBufferDiffuse,
        TextureUnit::GBufferSpecularRoughness,
        TextureUnit::Accumulation,
        TextureUnit::Luminance,
        TextureUnit::Bloom,
    ];

    /// The unit index used by shaders.
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// A persistent slot found bound to something other than its default buffer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("uniform slot {slot:?} is bound to {found:?} instead of its default {expected:?}")]
pub struct BindingViolation {
    pub slot: UniformSlot,
    pub expected: BufferId,
    pub found: Option<BufferId>,
}

/// Default buffers of the persistent uniform slots.
#[derive(Clone, Debug, Default)]
pub struct DefaultBindings {
    buffers: BTreeMap<UniformSlot, BufferId>,
}

impl DefaultBindings {
    /// Slots that must hold their default buffer between passes.
    pub const PERSISTENT: [UniformSlot; 6] = [
        UniformSlot::Camera,
        UniformSlot::PointLights,
        UniformSlot::SpotLights,
        UniformSlot::ShadowViewProjection,
        UniformSlot::InverseResolution,
        UniformSlot::ShadowPositions,
    ];

    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the default buffer of `slot` and binds it.
    pub fn register(&mut self, gpu: &dyn RenderDevice, slot: UniformSlot, buffer: BufferId) {
        let _ = self.buffers.insert(slot, buffer);
        gpu.bind_uniform_buffer(slot, buffer);
    }

    /// The default buffer of `slot`, if one was registered.
    pub fn get(&self, slot: UniformSlot) -> Option<BufferId> {
        self.buffers.get(&slot).copied()
    }

    /// Rebinds the default buffers of `slots`.
    pub fn restore(&self, gpu: &dyn RenderDevice, slots: &[UniformSlot]) {
        for slot in slots {
            if let Some(buffer) = self.get(*slot) {
                gpu.bind_uniform_buffer(*slot, buffer);
            }
        }
    }

    /// Checks that every registered slot holds its default buffer.
    pub fn verify(&self, gpu: &dyn RenderDevice) -> Result<(), Vec<BindingViolation>> {
        let violations: Vec<_> = self
            .buffers
            .iter()
            .filter_map(|(slot, expected)| {
                let found = gpu.uniform_binding(*slot);
                (found != Some(*expected)).then_some(BindingViolation {
                    slot: *slot,
                    expected: *expected,
                    found,
                })
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
