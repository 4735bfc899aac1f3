//! Placement data shared by cameras and renderable objects.
//!
//! Matrices follow gl-matrix conventions: every mutator post-multiplies, so
//! `m.translate(t); m.rotate_x(a)` yields `m · T · Rx`, i.e. the rotation is
//! applied to the geometry first.

use glam::{Mat4, Vec3};

/// Axes shorter than this are treated as "no axis" by [`MatrixExt::rotate`].
const AXIS_EPSILON: f32 = 1e-6;

/// In-place, post-multiplying matrix mutators.
pub trait MatrixExt {
    fn reset(&mut self) -> &mut Self;
    fn translate(&mut self, offset: Vec3) -> &mut Self;
    /// Rotate `angle` radians around `axis`. A zero-length axis leaves the matrix unchanged.
    fn rotate(&mut self, angle: f32, axis: Vec3) -> &mut Self;
    fn rotate_x(&mut self, angle: f32) -> &mut Self;
    fn rotate_y(&mut self, angle: f32) -> &mut Self;
    fn scale_by(&mut self, factors: Vec3) -> &mut Self;
}

impl MatrixExt for Mat4 {
    fn reset(&mut self) -> &mut Self {
        *self = Mat4::IDENTITY;
        self
    }

    fn translate(&mut self, offset: Vec3) -> &mut Self {
        *self *= Mat4::from_translation(offset);
        self
    }

    fn rotate(&mut self, angle: f32, axis: Vec3) -> &mut Self {
        let len = axis.length();
        if len < AXIS_EPSILON {
            return self;
        }
        *self *= Mat4::from_axis_angle(axis / len, angle);
        self
    }

    fn rotate_x(&mut self, angle: f32) -> &mut Self {
        *self *= Mat4::from_rotation_x(angle);
        self
    }

    fn rotate_y(&mut self, angle: f32) -> &mut Self {
        *self *= Mat4::from_rotation_y(angle);
        self
    }

    fn scale_by(&mut self, factors: Vec3) -> &mut Self {
        *self *= Mat4::from_scale(factors);
        self
    }
}

/// Position, rotation and scale plus the matrices derived from them.
///
/// `rotation` is an axis for cameras (the idle spin rotates around it) and is
/// not read for objects; object orientation comes from the shared
/// [`ViewOrientation`](crate::ViewOrientation).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTransform {
    pub local_matrix: Mat4,
    /// Reserved for parent/child composition; always identity today.
    pub world_matrix: Mat4,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for RenderTransform {
    fn default() -> Self {
        Self {
            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl RenderTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn translate_then_rotate_rotates_geometry_first() {
        let mut m = Mat4::IDENTITY;
        m.translate(Vec3::new(0.0, 0.0, -5.0)).rotate_y(FRAC_PI_2);

        let p = m.transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -6.0), 1e-5), "{p}");
    }

    #[test]
    fn zero_axis_rotation_is_a_no_op() {
        let mut m = Mat4::from_translation(Vec3::ONE);
        let before = m;
        m.rotate(1.0, Vec3::ZERO);
        assert_eq!(m, before);
    }

    #[test]
    fn rotate_normalizes_axis() {
        let mut a = Mat4::IDENTITY;
        let mut b = Mat4::IDENTITY;
        a.rotate(0.5, Vec3::new(0.0, 3.0, 0.0));
        b.rotate_y(0.5);
        assert!(a.abs_diff_eq(b, 1e-6));
    }

    #[test]
    fn default_scale_is_one() {
        let t = RenderTransform::new();
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.local_matrix, Mat4::IDENTITY);
    }
}
