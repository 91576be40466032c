use crate::camera::CameraUniform;
use crate::math::Eye;
use glamx::{Mat3, Mat4, Vec3};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Movement keys understood by [`FirstPersonCamera3d`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MoveKey {
    Forward,
    Backward,
    Left,
    Right,
}

/// First-person (FPS-style) camera.
///
/// The camera keeps only a position and two angles. The direction, right and up vectors
/// are derived from them on every [`update`](Self::update), and the view and projection
/// matrices are derived on demand.
///
/// # Default Controls (driven by the main loop)
/// - **W/S**: move forward/backward while held
/// - **A/D**: strafe while held
/// - **Mouse motion**: look around
/// - **Mouse wheel**: zoom (changes the field of view)
#[derive(Copy, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirstPersonCamera3d {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    fov: f32,
    aspect: f32,
    znear: f32,
    zfar: f32,

    move_forward: f32,
    move_strafe: f32,

    direction: Vec3,
    right: Vec3,
}

impl Default for FirstPersonCamera3d {
    fn default() -> Self {
        FirstPersonCamera3d::new(Vec3::new(0.0, 0.0, 12.0), PI, 0.0)
    }
}

impl FirstPersonCamera3d {
    /// Units per second added to the speed by each held movement key.
    pub const MOVE_SPEED: f32 = 2.0;
    /// Radians per pixel per second of mouse motion.
    pub const MOUSE_SENSITIVITY: f32 = 0.05;
    /// Radians per wheel step per second.
    pub const ZOOM_SENSITIVITY: f32 = 0.5;
    /// Largest pitch magnitude.
    pub const PITCH_LIMIT: f32 = FRAC_PI_2 * 0.7;
    /// Narrowest field of view.
    pub const MIN_FOV: f32 = FRAC_PI_2 * 0.1;
    /// Widest field of view.
    pub const MAX_FOV: f32 = PI * 0.9;

    /// Creates a camera at `position` with the given yaw (around Y) and pitch (around X).
    ///
    /// Default frustum: 45° field of view, 1280/1024 aspect, near plane 0.1, far plane 100.
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = FirstPersonCamera3d {
            position,
            yaw,
            pitch: pitch.clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT),
            fov: FRAC_PI_4,
            aspect: 1280.0 / 1024.0,
            znear: 0.1,
            zfar: 100.0,
            move_forward: 0.0,
            move_strafe: 0.0,
            direction: Vec3::Z,
            right: Vec3::NEG_X,
        };
        camera.update_axes();
        camera
    }

    /// Creates a camera at `position` looking along `direction`.
    pub fn looking_along(position: Vec3, direction: Vec3) -> Self {
        let d = direction.normalize();
        Self::new(position, d.x.atan2(d.z), (-d.y).asin())
    }

    /// Sets the width over height ratio of the projection.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Sets the field of view, clamped to the supported range.
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov.clamp(Self::MIN_FOV, Self::MAX_FOV);
    }

    /// Sets the near and far clipping planes.
    pub fn set_clip_planes(&mut self, znear: f32, zfar: f32) {
        self.znear = znear;
        self.zfar = zfar;
    }

    /// Starts or stops moving in the direction of `key`.
    pub fn handle_key(&mut self, key: MoveKey, pressed: bool) {
        let step = if pressed {
            Self::MOVE_SPEED
        } else {
            -Self::MOVE_SPEED
        };
        match key {
            MoveKey::Forward => self.move_forward += step,
            MoveKey::Backward => self.move_forward -= step,
            MoveKey::Right => self.move_strafe += step,
            MoveKey::Left => self.move_strafe -= step,
        }
    }

    /// Turns the camera by a relative mouse motion, in pixels.
    ///
    /// Screen-space `dy` grows downwards, so moving the mouse down pitches the view down.
    pub fn handle_mouse_motion(&mut self, dx: f32, dy: f32, dt: f32) {
        self.yaw += -Self::MOUSE_SENSITIVITY * dt * dx;
        self.pitch = (self.pitch + Self::MOUSE_SENSITIVITY * dt * dy)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Zooms by a number of wheel steps.
    pub fn handle_wheel(&mut self, steps: f32, dt: f32) {
        self.set_fov(self.fov - Self::ZOOM_SENSITIVITY * dt * steps);
    }

    /// Moves the camera by the held keys and refreshes its axes.
    pub fn update(&mut self, dt: f32) {
        self.position += self.move_forward * dt * self.direction;
        self.position += self.move_strafe * dt * self.right;
        self.update_axes();
    }

    fn update_axes(&mut self) {
        let rotation = Mat3::from_rotation_y(self.yaw) * Mat3::from_rotation_x(self.pitch);
        self.direction = rotation * Vec3::Z;
        self.right = rotation * Vec3::NEG_X;
    }

    /// The camera position.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// The viewing direction.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// The right vector.
    #[inline]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// The up vector.
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.right.cross(self.direction)
    }

    /// Rotation around the Y axis.
    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Rotation around the X axis.
    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Vertical field of view, in radians.
    #[inline]
    pub fn fov(&self) -> f32 {
        self.fov
    }

    /// The near clipping plane distance.
    #[inline]
    pub fn znear(&self) -> f32 {
        self.znear
    }

    /// The far clipping plane distance.
    #[inline]
    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    /// The camera as a viewpoint for the reflection passes.
    pub fn eye(&self) -> Eye {
        Eye {
            position: self.position,
            direction: self.direction,
            up: self.up(),
            fov: self.fov,
            aspect: self.aspect,
            near: self.znear,
            far: self.zfar,
        }
    }

    /// The combined projection and view matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.eye().view_projection()
    }

    /// The data uploaded to the camera uniform slot.
    pub fn uniform(&self) -> CameraUniform {
        CameraUniform::new(self.view_projection(), self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_camera_looks_at_the_origin() {
        let camera = FirstPersonCamera3d::default();
        assert!(camera.direction().abs_diff_eq(Vec3::NEG_Z, 1.0e-6));
        assert!(camera.right().abs_diff_eq(Vec3::X, 1.0e-6));
        assert!(camera.up().abs_diff_eq(Vec3::Y, 1.0e-6));
        assert_relative_eq!(camera.fov(), FRAC_PI_4);
    }

    #[test]
    fn looking_along_recovers_the_angles() {
        let direction = Vec3::new(1.0, -0.5, 2.0).normalize();
        let camera = FirstPersonCamera3d::looking_along(Vec3::ZERO, direction);
        assert!(camera.direction().abs_diff_eq(direction, 1.0e-5));
    }

    #[test]
    fn pitch_and_fov_are_clamped() {
        let mut camera = FirstPersonCamera3d::default();
        camera.handle_mouse_motion(0.0, 1.0e6, 1.0);
        assert_relative_eq!(camera.pitch(), FirstPersonCamera3d::PITCH_LIMIT);
        camera.handle_mouse_motion(0.0, -1.0e6, 1.0);
        assert_relative_eq!(camera.pitch(), -FirstPersonCamera3d::PITCH_LIMIT);

        camera.handle_wheel(1.0e6, 1.0);
        assert_relative_eq!(camera.fov(), FirstPersonCamera3d::MIN_FOV);
        camera.handle_wheel(-1.0e6, 1.0);
        assert_relative_eq!(camera.fov(), FirstPersonCamera3d::MAX_FOV);
    }

    #[test]
    fn held_keys_move_the_camera_until_released() {
        let mut camera = FirstPersonCamera3d::default();
        camera.handle_key(MoveKey::Forward, true);
        camera.handle_key(MoveKey::Right, true);
        camera.update(0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 0.0, 11.0), 1.0e-5));

        camera.handle_key(MoveKey::Forward, false);
        camera.handle_key(MoveKey::Right, false);
        camera.update(10.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 0.0, 11.0), 1.0e-5));
    }
}
