//! The scene camera.
//!
//! One camera per frame is authoritative: its view and projection feed both
//! the camera uniform buffer and every per-draw push constant.

use glam::{Mat4, Vec3};

/// A perspective look-at camera.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// World up direction
    pub up: Vec3,
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Width / height of the output
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y_degrees: 45.0,
            aspect: 1700.0 / 900.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    /// Creates a camera at `position` looking at `target`.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            target,
            up,
            ..Self::default()
        }
    }

    /// Sets the perspective parameters.
    pub fn with_perspective(mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        self.fov_y_degrees = fov_y_degrees;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        self
    }

    /// Update the aspect ratio from an output size. Zero heights are ignored.
    pub fn set_aspect_from_extent(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn test_default_camera() {
        let camera = Camera::default();
        assert_eq!(camera.position, Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(camera.up, Vec3::Z);
        assert_relative_eq!(camera.aspect, 1700.0 / 900.0);
    }

    #[test]
    fn test_view_moves_target_onto_negative_z() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let target_in_view = camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let unflipped = Mat4::perspective_rh(
            camera.fov_y_degrees.to_radians(),
            camera.aspect,
            camera.near,
            camera.far,
        );
        let proj = camera.projection_matrix();
        assert_relative_eq!(proj.y_axis.y, -unflipped.y_axis.y);
        assert_relative_eq!(proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::default();
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_aspect_from_extent() {
        let mut camera = Camera::default();
        camera.set_aspect_from_extent(800, 400);
        assert_relative_eq!(camera.aspect, 2.0);

        camera.set_aspect_from_extent(800, 0);
        assert_relative_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_forward() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        assert_relative_eq!(camera.forward().z, -1.0);
    }
}
