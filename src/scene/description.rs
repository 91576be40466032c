//! In-memory scene descriptions.
//!
//! A [`SceneDescription`] is what an importer produces: plain CPU data, with meshes,
//! materials and lights referenced by index. [`Scene::load`](super::Scene::load) turns it
//! into GPU resources.

use crate::light::{PointLight, SpotLight};
use crate::procedural::RenderMesh;
use glamx::{Mat4, Vec3};
use std::path::PathBuf;

/// Where the texels of a material texture come from.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureSource {
    /// A single colour, components in `[0, 1]`.
    Colour([f32; 4]),
    /// An image file decoded with the `image` crate.
    File(PathBuf),
    /// An encoded image held in memory.
    Encoded(Vec<u8>),
}

impl Default for TextureSource {
    fn default() -> Self {
        TextureSource::Colour([1.0; 4])
    }
}

/// Surface properties shared by any number of nodes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MaterialDescription {
    pub diffuse: TextureSource,
    pub specular: TextureSource,
    /// Roughness is read from the red channel.
    pub roughness: TextureSource,
    /// Emitted light, as a multiple of the diffuse colour.
    pub emissive: f32,
    /// Forces the material to be treated as transparent, whatever the diffuse alpha.
    pub transparent: bool,
    /// Any value above zero makes objects using this material reflective.
    pub reflectivity: f32,
}

impl Default for MaterialDescription {
    fn default() -> Self {
        MaterialDescription {
            diffuse: TextureSource::default(),
            specular: TextureSource::Colour([0.0, 0.0, 0.0, 1.0]),
            roughness: TextureSource::Colour([0.5, 0.5, 0.5, 1.0]),
            emissive: 0.0,
            transparent: false,
            reflectivity: 0.0,
        }
    }
}

impl MaterialDescription {
    /// A material with solid colour textures.
    pub fn solid(diffuse: Vec3, specular: Vec3, roughness: f32) -> Self {
        MaterialDescription {
            diffuse: TextureSource::Colour([diffuse.x, diffuse.y, diffuse.z, 1.0]),
            specular: TextureSource::Colour([specular.x, specular.y, specular.z, 1.0]),
            roughness: TextureSource::Colour([roughness, roughness, roughness, 1.0]),
            ..Default::default()
        }
    }

    /// A material described the way model importers do: colours, an emissive colour and an
    /// opacity.
    ///
    /// The emissive factor is the ratio of the red emissive and diffuse components, and an
    /// opacity below one marks the material as transparent.
    pub fn imported(
        diffuse: Vec3,
        specular: Vec3,
        emissive: Vec3,
        roughness: f32,
        opacity: f32,
        reflectivity: f32,
    ) -> Self {
        let emissive = if diffuse.x > 0.0 {
            emissive.x / diffuse.x
        } else {
            0.0
        };
        MaterialDescription {
            diffuse: TextureSource::Colour([diffuse.x, diffuse.y, diffuse.z, opacity]),
            emissive,
            transparent: opacity < 1.0,
            reflectivity,
            ..Self::solid(diffuse, specular, roughness)
        }
    }

    /// Sets the diffuse texture.
    pub fn with_diffuse(mut self, diffuse: TextureSource) -> Self {
        self.diffuse = diffuse;
        self
    }

    /// Sets the emissive factor.
    pub fn with_emissive(mut self, emissive: f32) -> Self {
        self.emissive = emissive;
        self
    }

    /// Sets the reflectivity.
    pub fn with_reflectivity(mut self, reflectivity: f32) -> Self {
        self.reflectivity = reflectivity;
        self
    }

    /// Forces transparency.
    pub fn with_transparency(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Are objects using this material reflective?
    pub fn is_reflective(&self) -> bool {
        self.reflectivity > 0.0
    }
}

/// A mesh instance placed in the world.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeDescription {
    pub mesh: usize,
    pub material: usize,
    /// Model to world transform.
    pub transform: Mat4,
}

/// Initial state of the main camera.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraDescription {
    pub position: Vec3,
    pub direction: Vec3,
    /// Vertical field of view, in radians.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

/// Everything needed to build a [`Scene`](super::Scene).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SceneDescription {
    pub meshes: Vec<RenderMesh>,
    pub materials: Vec<MaterialDescription>,
    pub nodes: Vec<NodeDescription>,
    pub point_lights: Vec<PointLight>,
    pub spot_lights: Vec<SpotLight>,
    pub camera: Option<CameraDescription>,
}

impl SceneDescription {
    /// An empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mesh and returns its index.
    pub fn add_mesh(&mut self, mesh: RenderMesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Adds a material and returns its index.
    pub fn add_material(&mut self, material: MaterialDescription) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Places `mesh` with `material` at `transform` and returns the node index.
    pub fn add_node(&mut self, mesh: usize, material: usize, transform: Mat4) -> usize {
        self.nodes.push(NodeDescription {
            mesh,
            material,
            transform,
        });
        self.nodes.len() - 1
    }

    /// Adds a point light.
    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    /// Adds a spot light.
    pub fn add_spot_light(&mut self, light: SpotLight) {
        self.spot_lights.push(light);
    }

    /// Sets the initial camera.
    pub fn set_camera(&mut self, camera: CameraDescription) {
        self.camera = Some(camera);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn imported_materials_derive_emissive_and_transparency() {
        let material = MaterialDescription::imported(
            Vec3::new(0.5, 0.2, 0.2),
            Vec3::splat(0.1),
            Vec3::new(1.0, 0.0, 0.0),
            0.3,
            0.4,
            0.0,
        );
        assert_relative_eq!(material.emissive, 2.0);
        assert!(material.transparent);
        assert!(!material.is_reflective());
        assert_eq!(
            material.diffuse,
            TextureSource::Colour([0.5, 0.2, 0.2, 0.4])
        );
    }

    #[test]
    fn black_diffuse_has_no_emissive_ratio() {
        let material =
            MaterialDescription::imported(Vec3::ZERO, Vec3::ZERO, Vec3::ONE, 0.5, 1.0, 1.0);
        assert_eq!(material.emissive, 0.0);
        assert!(material.is_reflective());
    }
}
