/*!
Core math aliases and transform types shared by every module.

This module intentionally contains no algorithms. It defines the data types
exchanged between:
- the host object model (positions/orientations in presentation units)
- the shape builder and body lifecycle (simulation units)
- joint construction (world-space anchors and axes)
*/

use nalgebra as na;

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Point3 = na::Point3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

/// A rigid transform (isometry) in world space.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Transform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Convert to nalgebra `Isometry3` for use with rapier.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(self.translation.x, self.translation.y, self.translation.z),
            self.rotation,
        )
    }
}

/// Normalize a vector, returning `(direction, length)`.
///
/// Returns a zero direction and zero length when the input is shorter than
/// [`crate::constants::EPSILON`], so callers can branch on degenerate input
/// without dividing by a near-zero norm.
#[inline]
pub fn normalize_or_zero(v: Vec3) -> (Vec3, f32) {
    let length = v.norm();
    if length <= crate::constants::EPSILON {
        (Vec3::zeros(), 0.0)
    } else {
        (v / length, length)
    }
}

/// Compute a unit vector perpendicular to `axis`.
///
/// Tries a cross product with world up first, then falls back to the X axis
/// family when `axis` is parallel to up. Always returns a unit vector.
pub fn perpendicular_axis(axis: Vec3) -> Vec3 {
    let (n, len) = normalize_or_zero(Vec3::new(axis.z, 0.0, -axis.x));
    if len > 0.0 {
        return n;
    }
    let (n, len) = normalize_or_zero(Vec3::new(0.0, -axis.z, axis.y));
    if len > 0.0 {
        return n;
    }
    Vec3::new(1.0, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_or_zero_handles_degenerate_input() {
        let (dir, len) = normalize_or_zero(Vec3::zeros());
        assert_eq!(len, 0.0);
        assert_eq!(dir, Vec3::zeros());

        let (dir, len) = normalize_or_zero(Vec3::new(3.0, 0.0, 4.0));
        assert!((len - 5.0).abs() < 1.0e-6);
        assert!((dir.norm() - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn perpendicular_axis_is_orthogonal_and_unit() {
        let samples = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.3, -0.8, 0.5),
        ];
        for axis in samples {
            let n = perpendicular_axis(axis);
            assert!((n.norm() - 1.0).abs() < 1.0e-5);
            assert!(n.dot(&axis).abs() < 1.0e-5, "not orthogonal to {axis:?}");
        }
    }

    #[test]
    fn transform_round_trips_through_isometry() {
        let t = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_euler_angles(0.1, 0.2, 0.3),
        );
        let iso = t.iso();
        assert!((iso.translation.vector - t.translation).norm() < 1.0e-6);
        assert!(iso.rotation.angle_to(&t.rotation) < 1.0e-6);
    }
}
