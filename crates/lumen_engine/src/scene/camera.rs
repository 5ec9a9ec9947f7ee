//! Perspective camera with yaw/pitch orientation
//!
//! Right-handed, Y-up. Projections use OpenGL clip-space conventions; the Vulkan
//! shaders remap depth and flip y themselves.

use crate::foundation::math::{deg_to_rad, Mat4, Point3, Vec3};

/// Pitch limit that keeps the view matrix away from the poles
const MAX_PITCH: f32 = 89.0_f32 * std::f32::consts::PI / 180.0;

/// Perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Position in world space
    pub position: Vec3,
    /// Rotation about +Y in radians; zero looks down -Z
    pub yaw: f32,
    /// Rotation above the horizon in radians
    pub pitch: f32,
    /// World up vector
    pub world_up: Vec3,
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clipping plane distance
    pub near: f32,
    /// Far clipping plane distance
    pub far: f32,
    aspect: f32,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::zeros(), 90.0, 0.1, 1024.0)
    }
}

impl Camera {
    /// Camera at `position` looking down -Z with a square projection
    pub fn perspective(position: Vec3, fov_degrees: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            world_up: Vec3::y(),
            fov: deg_to_rad(fov_degrees),
            near,
            far,
            aspect: 1.0,
            projection: Mat4::identity(),
        };
        camera.rebuild_projection();
        camera
    }

    /// Rebuild the projection for a framebuffer of `width` x `height` pixels
    ///
    /// A zero-sized framebuffer (minimized window) keeps the previous projection.
    pub fn create_projection(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let aspect = width as f32 / height as f32;
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {aspect:.3}", self.aspect);
        }
        self.aspect = aspect;
        self.rebuild_projection();
    }

    /// Width over height of the last projection
    pub const fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Projection matrix
    pub const fn projection(&self) -> Mat4 {
        self.projection
    }

    /// World-to-view matrix
    pub fn view(&self) -> Mat4 {
        let eye = Point3::from(self.position);
        Mat4::look_at_rh(&eye, &(eye + self.forward()), &self.world_up)
    }

    /// Unit view direction
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            -self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
    }

    /// Unit vector to the camera's right
    pub fn right(&self) -> Vec3 {
        self.forward().cross(&self.world_up).normalize()
    }

    /// Unit vector above the view direction
    pub fn up(&self) -> Vec3 {
        self.right().cross(&self.forward()).normalize()
    }

    /// Turn by `yaw` and `pitch` radians, clamping pitch short of straight up or down
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Move along the camera's right, up and forward axes
    pub fn translate_local(&mut self, right: f32, up: f32, forward: f32) {
        self.position += self.right() * right + self.world_up * up + self.forward() * forward;
    }

    /// Face `target`
    pub fn look_at(&mut self, target: Vec3) {
        let direction = target - self.position;
        if direction.norm_squared() <= f32::EPSILON {
            return;
        }
        let direction = direction.normalize();
        self.pitch = direction.y.asin().clamp(-MAX_PITCH, MAX_PITCH);
        self.yaw = (-direction.x).atan2(-direction.z);
    }

    fn rebuild_projection(&mut self) {
        self.projection = Mat4::new_perspective(self.aspect, self.fov, self.near, self.far);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_orientation_looks_down_negative_z() {
        let camera = Camera::default();
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(camera.up(), Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(camera.right(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_projection_follows_framebuffer() {
        let mut camera = Camera::default();
        camera.create_projection(1600, 900);
        assert_relative_eq!(camera.aspect(), 16.0 / 9.0);
        let before = camera.projection();

        camera.create_projection(0, 900);
        assert_eq!(camera.projection(), before);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 10.0);
        assert_relative_eq!(camera.pitch, MAX_PITCH);
        assert!(camera.forward().y < 1.0);
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 70.0, 0.1, 100.0);
        camera.look_at(Vec3::new(5.0, 0.0, 5.0));
        assert_relative_eq!(camera.forward(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_view_moves_world_opposite_to_camera() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 70.0, 0.1, 100.0);
        let origin = camera.view().transform_point(&Point3::origin());
        assert_relative_eq!(origin.z, -5.0, epsilon = 1e-5);
    }
}
