//! Presentation/simulation unit conversion.
//!
//! Game objects live in presentation units (pixels); the solver works in
//! meter-like simulation units. Every position or length crossing that
//! boundary goes through a [`UnitScale`], created once per world.

use crate::constants::DEFAULT_WORLD_SCALE;
use crate::types::{Point3, Vec3};

/// Stateless bidirectional scale conversion between presentation units
/// (pixels) and simulation units (meters).
#[derive(Clone, Copy, Debug)]
pub struct UnitScale {
    /// Pixels per meter.
    pub world_scale: f32,
    /// Meters per pixel (`1 / world_scale`).
    pub world_inv_scale: f32,
}

impl Default for UnitScale {
    fn default() -> Self {
        Self::new(DEFAULT_WORLD_SCALE)
    }
}

impl UnitScale {
    /// Create a scale from a pixels-per-meter factor. Non-positive scales
    /// fall back to the default.
    pub fn new(world_scale: f32) -> Self {
        let world_scale = if world_scale > 0.0 {
            world_scale
        } else {
            DEFAULT_WORLD_SCALE
        };
        Self {
            world_scale,
            world_inv_scale: 1.0 / world_scale,
        }
    }

    /// Pixels to meters.
    #[inline]
    pub fn to_sim(&self, value_px: f32) -> f32 {
        value_px * self.world_inv_scale
    }

    /// Meters to pixels.
    #[inline]
    pub fn to_view(&self, value_m: f32) -> f32 {
        value_m * self.world_scale
    }

    /// Pixels to meters, componentwise.
    #[inline]
    pub fn vec_to_sim(&self, v_px: Vec3) -> Vec3 {
        v_px * self.world_inv_scale
    }

    /// Meters to pixels, componentwise.
    #[inline]
    pub fn vec_to_view(&self, v_m: Vec3) -> Vec3 {
        v_m * self.world_scale
    }

    /// Pixels to meters for a point.
    #[inline]
    pub fn point_to_sim(&self, p_px: Point3) -> Point3 {
        Point3::from(p_px.coords * self.world_inv_scale)
    }

    /// Meters to pixels for a point.
    #[inline]
    pub fn point_to_view(&self, p_m: Point3) -> Point3 {
        Point3::from(p_m.coords * self.world_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip_is_identity() {
        let units = UnitScale::new(100.0);
        let value = 123.456;
        assert!((units.to_view(units.to_sim(value)) - value).abs() < 1.0e-4);
    }

    #[test]
    fn vector_conversion_scales_each_component() {
        let units = UnitScale::new(50.0);
        let v = units.vec_to_sim(Vec3::new(100.0, -50.0, 25.0));
        assert!((v - Vec3::new(2.0, -1.0, 0.5)).norm() < 1.0e-6);
    }

    #[test]
    fn non_positive_scale_falls_back_to_default() {
        let units = UnitScale::new(0.0);
        assert_eq!(units.world_scale, DEFAULT_WORLD_SCALE);
        let units = UnitScale::new(-3.0);
        assert_eq!(units.world_scale, DEFAULT_WORLD_SCALE);
    }
}
