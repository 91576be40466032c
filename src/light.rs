//! Point and spot lights.
//!
//! Lights live in two fixed-size uniform arrays, one per kind. The lighting pass reads the
//! active count of each kind from a program constant and ignores the remaining slots.

use crate::math::Falloff;
use bytemuck::{Pod, Zeroable};
use glamx::Vec3;

/// Maximum number of point lights.
pub const MAX_POINT_LIGHTS: usize = 16;
/// Maximum number of spot lights.
pub const MAX_SPOT_LIGHTS: usize = 16;
/// Maximum number of shadow layers rendered in one pass: six cube faces per point light.
pub const MAX_SHADOW_LAYERS: usize = MAX_POINT_LIGHTS * 6;

/// A light shining equally in every direction.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointLight {
    pub position: Vec3,
    pub colour: Vec3,
    pub falloff: Falloff,
}

impl PointLight {
    /// A point light with the default falloff.
    pub fn new(position: Vec3, colour: Vec3) -> Self {
        PointLight {
            position,
            colour,
            falloff: Falloff::default(),
        }
    }

    /// Sets the attenuation coefficients.
    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }
}

/// A light shining inside a cone.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpotLight {
    pub position: Vec3,
    pub colour: Vec3,
    pub falloff: Falloff,
    /// Points from the lit area back to the light: the cone axis is `-direction`.
    pub direction: Vec3,
    /// Cosine of the cone half-angle.
    pub cos_angle: f32,
}

impl SpotLight {
    /// A spot light at `position` shining towards `-direction`.
    pub fn new(position: Vec3, direction: Vec3, colour: Vec3, cos_angle: f32) -> Self {
        SpotLight {
            position,
            colour,
            falloff: Falloff::default(),
            direction: direction.normalize(),
            cos_angle,
        }
    }

    /// A spot light at `position` shining at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, colour: Vec3, half_angle: f32) -> Self {
        Self::new(position, position - target, colour, half_angle.cos())
    }

    /// Sets the attenuation coefficients.
    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }
}

/// Layout must match `PointLight` in `common.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuPointLight {
    pub position: [f32; 3],
    _pad0: f32,
    pub colour: [f32; 3],
    _pad1: f32,
    pub falloff: [f32; 3],
    _pad2: f32,
    /// Near and far planes of the shadow cube.
    pub near_far: [f32; 2],
    _pad3: [f32; 2],
}

impl GpuPointLight {
    /// Packs a light with its shadow range.
    pub fn new(light: &PointLight, near: f32, far: f32) -> Self {
        GpuPointLight {
            position: light.position.into(),
            colour: light.colour.into(),
            falloff: light.falloff.to_array(),
            near_far: [near, far],
            ..Zeroable::zeroed()
        }
    }
}

/// Layout must match `SpotLight` in `common.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuSpotLight {
    pub position: [f32; 3],
    _pad0: f32,
    pub colour: [f32; 3],
    _pad1: f32,
    pub falloff: [f32; 3],
    _pad2: f32,
    pub direction: [f32; 3],
    pub cos_angle: f32,
    /// Far plane of the shadow frustum.
    pub falloff_distance: f32,
    _pad3: [f32; 3],
}

impl GpuSpotLight {
    /// Packs a light with its shadow range.
    pub fn new(light: &SpotLight, falloff_distance: f32) -> Self {
        GpuSpotLight {
            position: light.position.into(),
            colour: light.colour.into(),
            falloff: light.falloff.to_array(),
            direction: light.direction.into(),
            cos_angle: light.cos_angle,
            falloff_distance,
            ..Zeroable::zeroed()
        }
    }
}

const _: () = assert!(std::mem::size_of::<GpuPointLight>() == 64);
const _: () = assert!(std::mem::size_of::<GpuSpotLight>() == 80);

/// Copies `items` into a zero-filled array of `N` slots. Extra items are dropped.
pub fn uniform_array<T: Pod, const N: usize>(items: &[T]) -> [T; N] {
    let mut block = [T::zeroed(); N];
    for (slot, item) in block.iter_mut().zip(items) {
        *slot = *item;
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_light_looking_at_a_target() {
        let light = SpotLight::looking_at(Vec3::new(0.0, 4.0, 0.0), Vec3::ZERO, Vec3::ONE, 0.5);
        assert!(light.direction.abs_diff_eq(Vec3::Y, 1.0e-6));
        assert_eq!(light.cos_angle, 0.5f32.cos());
    }

    #[test]
    fn uniform_arrays_are_zero_padded() {
        let light = GpuPointLight::new(&PointLight::new(Vec3::X, Vec3::ONE), 0.1, 20.0);
        let block: [GpuPointLight; MAX_POINT_LIGHTS] = uniform_array(&[light; 20]);
        assert_eq!(block[MAX_POINT_LIGHTS - 1], light);

        let block: [GpuPointLight; MAX_POINT_LIGHTS] = uniform_array(&[light]);
        assert_eq!(block[0].near_far, [0.1, 20.0]);
        assert_eq!(block[1], GpuPointLight::zeroed());
        assert_eq!(bytemuck::bytes_of(&block).len(), 64 * MAX_POINT_LIGHTS);
    }
}
