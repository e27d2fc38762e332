//! Math utilities and types
//!
//! Provides the vector, matrix and transform types shared by definitions,
//! entity runtimes, the physics world and the draw queues.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector3, Vector4};

use serde::{Deserialize, Serialize};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// How an entity's transform relates to its parent's
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformSpace {
    /// Local transform composed with the parent's world transform
    #[default]
    Offset,
    /// Transform is already in world space and ignores the parent
    Absolute,
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
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

    /// Build a rotation from Euler angles in degrees (x = roll, y = pitch, z = yaw)
    pub fn rotation_from_euler_degrees(euler: Vec3) -> Quat {
        Quat::from_euler_angles(
            utils::deg_to_rad(euler.x),
            utils::deg_to_rad(euler.y),
            utils::deg_to_rad(euler.z),
        )
    }

    /// Rotation expressed as Euler angles in degrees
    pub fn euler_degrees(&self) -> Vec3 {
        let (roll, pitch, yaw) = self.rotation.euler_angles();
        Vec3::new(
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees(),
        )
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Point3) -> Point3 {
        self.to_matrix().transform_point(&point)
    }

    /// Apply this transform to a vector
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.to_matrix().transform_vector(&vector)
    }

    /// Create a transform from a transformation matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        // Remove scale from the basis before extracting rotation
        let rotation_matrix = Matrix3::new(
            matrix.m11 / scale_x, matrix.m12 / scale_y, matrix.m13 / scale_z,
            matrix.m21 / scale_x, matrix.m22 / scale_y, matrix.m23 / scale_z,
            matrix.m31 / scale_x, matrix.m32 / scale_y, matrix.m33 / scale_z,
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Combine this transform (as parent) with a child transform
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            position: self.position + self.rotation * (self.scale.component_mul(&other.position)),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Self {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_scale.component_mul(&(inv_rotation * -self.position));

        Self {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Interpolate towards `other`; rotation uses spherical interpolation
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        let t = utils::clamp(t, 0.0, 1.0);
        Self {
            position: self.position.lerp(&other.position, t),
            rotation: self
                .rotation
                .try_slerp(&other.rotation, t, 1.0e-6)
                .unwrap_or(other.rotation),
            scale: self.scale.lerp(&other.scale, t),
        }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Clamp a value between min and max
    pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
        if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_combine_with_identity() {
        let parent = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let combined = parent.combine(&Transform::identity());
        assert_relative_eq!(combined.position, parent.position, epsilon = EPSILON);
    }

    #[test]
    fn test_combine_applies_parent_rotation() {
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), constants::PI / 2.0);
        let parent = Transform::from_position_rotation(Vec3::new(10.0, 0.0, 0.0), rotation);
        let child = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));

        let world = parent.combine(&child);
        assert_relative_eq!(world.position, Vec3::new(10.0, 0.0, -1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_inverse_round_trip() {
        let transform = Transform {
            position: Vec3::new(3.0, -2.0, 5.0),
            rotation: Quat::from_axis_angle(&Vec3::z_axis(), 0.7),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let identity = transform.combine(&transform.inverse());
        assert_relative_eq!(identity.position, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(identity.scale, Vec3::new(1.0, 1.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_matrix_round_trip() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::x_axis(), 0.3),
            scale: Vec3::new(1.0, 2.0, 3.0),
        };

        let restored = Transform::from_matrix(transform.to_matrix());
        assert_relative_eq!(restored.position, transform.position, epsilon = EPSILON);
        assert_relative_eq!(restored.scale, transform.scale, epsilon = EPSILON);
        assert_relative_eq!(restored.rotation, transform.rotation, epsilon = EPSILON);
    }

    #[test]
    fn test_euler_degrees() {
        let rotation = Transform::rotation_from_euler_degrees(Vec3::new(0.0, 0.0, 90.0));
        let transform = Transform::from_position_rotation(Vec3::zeros(), rotation);
        assert_relative_eq!(transform.euler_degrees(), Vec3::new(0.0, 0.0, 90.0), epsilon = 1e-3);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Transform::from_position(Vec3::zeros());
        let b = Transform::from_position(Vec3::new(2.0, 4.0, 6.0));
        let mid = a.interpolate(&b, 0.5);
        assert_relative_eq!(mid.position, Vec3::new(1.0, 2.0, 3.0), epsilon = EPSILON);
    }

    #[test]
    fn test_camera_helpers() {
        assert_relative_eq!(utils::deg_to_rad(180.0), constants::PI, epsilon = EPSILON);
        assert_eq!(utils::clamp(120.0, 1.0, 90.0), 90.0);
        assert_eq!(utils::clamp(-5.0, 1.0, 90.0), 1.0);
        assert_eq!(utils::clamp(45.0, 1.0, 90.0), 45.0);
    }
}
