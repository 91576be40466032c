//! The main camera and its GPU layout.

pub use self::first_person3d::{FirstPersonCamera3d, MoveKey};

use bytemuck::{Pod, Zeroable};
use glamx::{Mat4, Vec3};

mod first_person3d;

/// Data bound to the camera uniform slot.
///
/// Layout must match `Camera` in `common.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_projection: [[f32; 4]; 4],
    pub position: [f32; 3],
    _pad0: f32,
    pub inverse_view_projection: [[f32; 4]; 4],
}

impl CameraUniform {
    /// Camera data for a view-projection seen from `position`.
    pub fn new(view_projection: Mat4, position: Vec3) -> Self {
        CameraUniform {
            view_projection: view_projection.to_cols_array_2d(),
            position: position.into(),
            _pad0: 0.0,
            inverse_view_projection: view_projection.inverse().to_cols_array_2d(),
        }
    }
}

const _: () = assert!(std::mem::size_of::<CameraUniform>() == 144);
