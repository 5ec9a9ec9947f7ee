//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics. Projection matrices follow
//! OpenGL clip-space conventions; the Vulkan backend's shaders remap depth and y.

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Linear RGBA color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorRgba {
    /// Red component
    pub r: f32,
    /// Green component
    pub g: f32,
    /// Blue component
    pub b: f32,
    /// Alpha component
    pub a: f32,
}

impl ColorRgba {
    /// Opaque black
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque white
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Create a color from components
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from 8-bit components
    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        let [r, g, b, a] = rgba.map(|c| f32::from(c) / 255.0);
        Self { r, g, b, a }
    }

    /// Color channels scaled by alpha
    #[must_use]
    pub fn premultiplied(self) -> Self {
        Self::new(self.r * self.a, self.g * self.a, self.b * self.a, self.a)
    }

    /// Components as an array
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for ColorRgba {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Direction the transform faces (-Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::z()
    }

    /// Local up direction (+Y in local space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::y()
    }

    /// Combine this transform with a child transform
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            position: self.position + self.rotation * self.scale.component_mul(&other.position),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }
}

/// Convert degrees to radians
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees.to_radians()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_faces_negative_z() {
        let transform = Transform::identity();
        assert_relative_eq!(transform.forward(), Vec3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(transform.up(), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_combine_applies_parent_rotation() {
        let parent = Transform::from_position_rotation(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2),
        );
        let child = Transform::from_position(Vec3::new(0.0, 0.0, -1.0));
        let world = parent.combine(&child);
        assert_relative_eq!(world.position, Vec3::new(0.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_color_from_rgba8() {
        let color = ColorRgba::from_rgba8([255, 0, 51, 255]);
        assert_relative_eq!(color.r, 1.0);
        assert_relative_eq!(color.b, 0.2);
    }
}
