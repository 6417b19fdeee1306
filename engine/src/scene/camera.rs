//! Camera Component
//!
//! Projection parameters plus free-look state. Rotation is kept as two
//! independent angles applied in a fixed order: yaw about world Y, then
//! pitch about the resulting local X axis.

use glam::{Mat4, Quat, Vec3};

/// Pitch stays just short of straight up/down to keep the basis stable.
pub const PITCH_LIMIT: f32 = 89.0_f32 * std::f32::consts::PI / 180.0;

#[derive(Clone, Debug)]
pub struct CameraComponent {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    projection: Mat4,
    /// World units per second
    pub movement_speed: f32,
    /// Radians per unit of input delta
    pub rotation_speed: f32,
    yaw: f32,
    pitch: f32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self::new(60f32.to_radians(), 16.0 / 9.0, 0.1, 200.0)
    }
}

impl CameraComponent {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov_y,
            near,
            far,
            aspect,
            projection: Mat4::IDENTITY,
            movement_speed: 5.0,
            rotation_speed: 0.003,
            yaw: 0.0,
            pitch: 0.0,
        };
        camera.update_projection();
        camera
    }

    /// Rebuild the projection matrix from fov / aspect / near / far.
    pub fn update_projection(&mut self) {
        self.projection = Mat4::perspective_rh(self.fov_y, self.aspect.max(1e-4), self.near, self.far);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update_projection();
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Apply a look delta (e.g. mouse motion). Positive `dx` turns right,
    /// positive `dy` looks down.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * self.rotation_speed;
        self.pitch = (self.pitch - dy * self.rotation_speed).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn set_yaw_pitch(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Yaw about Y, then pitch about local X.
    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    fn eye(&self, world: &Mat4) -> (Vec3, Quat) {
        let (_, rotation, position) = world.to_scale_rotation_translation();
        (position, rotation * self.orientation())
    }

    pub fn forward(&self, world: &Mat4) -> Vec3 {
        let (_, rotation) = self.eye(world);
        rotation * Vec3::NEG_Z
    }

    pub fn right(&self, world: &Mat4) -> Vec3 {
        let (_, rotation) = self.eye(world);
        rotation * Vec3::X
    }

    pub fn view_matrix(&self, world: &Mat4) -> Mat4 {
        let (position, rotation) = self.eye(world);
        Mat4::look_to_rh(position, rotation * Vec3::NEG_Z, rotation * Vec3::Y)
    }

    pub fn view_projection(&self, world: &Mat4) -> Mat4 {
        self.projection * self.view_matrix(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = CameraComponent::default();
        let forward = camera.forward(&Mat4::IDENTITY);
        assert!((forward - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = CameraComponent::default();
        camera.rotate(0.0, -1.0e6);
        assert!((camera.pitch() - PITCH_LIMIT).abs() < 1e-6);
        camera.rotate(0.0, 1.0e7);
        assert!((camera.pitch() + PITCH_LIMIT).abs() < 1e-6);
    }

    #[test]
    fn test_yaw_then_pitch_order() {
        let mut camera = CameraComponent::default();
        camera.set_yaw_pitch(std::f32::consts::FRAC_PI_2, 0.5);
        let forward = camera.forward(&Mat4::IDENTITY);
        // Yawed 90 degrees left: horizontal component points along -X
        assert!(forward.x < -0.8);
        assert!(forward.z.abs() < 1e-5);
        assert!(forward.y > 0.4);
    }

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let camera = CameraComponent::default();
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let eye = camera.view_matrix(&world).transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(eye.length() < 1e-5);
    }

    #[test]
    fn test_set_aspect_rebuilds_projection() {
        let mut camera = CameraComponent::default();
        let before = camera.projection();
        camera.set_aspect(1.0);
        assert_ne!(before, camera.projection());
    }
}
