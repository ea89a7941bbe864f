//! Object placement

use glam::{Mat4, Quat, Vec3};

/// Position, rotation and scale of a drawable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, axis: Vec3, angle: f32) -> Self {
        self.rotation = Quat::from_axis_angle(axis.normalize(), angle);
        self
    }

    /// Uniformly grow or shrink around the current origin
    pub fn scaled(mut self, factor: f32) -> Self {
        self.scale *= factor;
        self
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of the model matrix
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_keeps_position() {
        let t = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.2)).scaled(1.2);
        assert!(t.scale.abs_diff_eq(Vec3::splat(0.24), 1e-6));
        assert_eq!(t.matrix().w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_normal_matrix_of_uniform_scale_keeps_direction() {
        let t = Transform::from_position_scale(Vec3::ZERO, Vec3::splat(3.0));
        let n = t.normal_matrix().transform_vector3(Vec3::Y).normalize();
        assert!(n.abs_diff_eq(Vec3::Y, 1e-6));
    }
}
