/*!
Collision shape derivation.

Builds a rapier `SharedShape` from a behavior's shape configuration and the
owning object's current box dimensions. The rules, in order:

- An orientation remap decides which box dimension maps to the shape's length
  axis (capsules/cylinders are length-along-depth by default; box shapes
  ignore the remap).
- Explicit dimension overrides (pixels) take precedence over box-derived
  values; both are floored at one pixel so degenerate objects still get a
  usable shape.
- A local shape offset and an orientation rotation are applied by wrapping
  the base shape into a single-child compound.
- A non-zero mass-center offset is reported back so the collider's mass
  properties can be shifted without moving the geometry.
- Mesh shapes (static bodies only) read the host model's triangle parts in
  unit-cube-local space, scale them by the box dimensions, and compound
  multiple parts into one static shape. Degenerate meshes fall back to a box
  with a warning.
*/

use rapier3d::prelude::SharedShape;

use crate::body::BodyType;
use crate::object::TriangleMeshPart;
use crate::types::{Point3, Quat, Vec3};
use crate::units::UnitScale;

/// Supported collision shape kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShapeKind {
    #[default]
    Box,
    Sphere,
    Capsule,
    Cylinder,
    /// Triangle mesh, only honored on static bodies.
    Mesh,
}

/// Which world axis the shape's length ("top") is aligned with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ShapeOrientation {
    X,
    Y,
    #[default]
    Z,
}

/// Shape configuration carried by each behavior.
#[derive(Clone, Debug)]
pub struct ShapeConfig {
    pub kind: ShapeKind,
    pub orientation: ShapeOrientation,
    /// Explicit dimension overrides in pixels; values `<= 0` derive from the
    /// object's box instead. A = width/radius, B = height/length, C = depth.
    pub dimension_a: f32,
    pub dimension_b: f32,
    pub dimension_c: f32,
    /// Local shape translation (pixels).
    pub offset: Vec3,
    /// Mass-center shift (pixels), applied to mass properties only.
    pub mass_center_offset: Vec3,
    /// Extra multiplier applied to overrides and offsets.
    pub scale: f32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            kind: ShapeKind::Box,
            orientation: ShapeOrientation::Z,
            dimension_a: 0.0,
            dimension_b: 0.0,
            dimension_c: 0.0,
            offset: Vec3::zeros(),
            mass_center_offset: Vec3::zeros(),
            scale: 1.0,
        }
    }
}

impl ShapeConfig {
    /// Whether any explicit dimension override is active. Shapes with custom
    /// dimensions don't track object resizes.
    pub fn has_custom_dimensions(&self) -> bool {
        self.dimension_a > 0.0 || self.dimension_b > 0.0 || self.dimension_c > 0.0
    }
}

/// Result of shape derivation.
pub struct BuiltShape {
    pub shape: SharedShape,
    /// Half extents of the shape's bounding box (meters), per world axis.
    pub half_extents: Vec3,
    /// Mass-center shift in meters, zero when unconfigured.
    pub com_offset: Vec3,
}

/// Rotation mapping the solver's Y-aligned shapes onto the configured axis.
fn orientation_rotation(orientation: ShapeOrientation) -> Quat {
    match orientation {
        // Top on X axis: rotate +Y onto +X.
        ShapeOrientation::X => Quat::from_axis_angle(&Vec3::z_axis(), -std::f32::consts::FRAC_PI_2),
        ShapeOrientation::Y => Quat::identity(),
        // Top on Z axis: rotate +Y onto +Z.
        ShapeOrientation::Z => Quat::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_2),
    }
}

/// Derive the collision shape for a behavior.
///
/// `dims_px` is the owning object's current box (width, height, depth) in
/// pixels. `triangles` is only consulted for mesh shapes.
pub fn build_shape(
    config: &ShapeConfig,
    body_type: BodyType,
    dims_px: Vec3,
    units: &UnitScale,
    triangles: Option<Vec<TriangleMeshPart>>,
) -> BuiltShape {
    // Box shapes ignore the orientation remap.
    let orientation = if config.kind == ShapeKind::Box {
        ShapeOrientation::Z
    } else {
        config.orientation
    };

    let mut width = units.to_sim(dims_px.x);
    let mut height = units.to_sim(dims_px.y);
    let mut depth = units.to_sim(dims_px.z);
    match orientation {
        ShapeOrientation::X => std::mem::swap(&mut width, &mut depth),
        ShapeOrientation::Y => std::mem::swap(&mut height, &mut depth),
        ShapeOrientation::Z => {}
    }

    let shape_scale = config.scale * units.world_inv_scale;
    let dim_a = config.dimension_a * shape_scale;
    let dim_b = config.dimension_b * shape_scale;
    let dim_c = config.dimension_c * shape_scale;
    let one_pixel = units.world_inv_scale;

    let com_offset = config.mass_center_offset * shape_scale;
    let offset = config.offset * shape_scale;

    if config.kind == ShapeKind::Mesh && body_type == BodyType::Static {
        if let Some(built) = build_mesh_shape(triangles, width, height, depth, offset) {
            return BuiltShape {
                shape: built,
                half_extents: Vec3::new(width * 0.5, height * 0.5, depth * 0.5),
                com_offset,
            };
        }
        log::warn!("mesh shape unavailable or degenerate, falling back to a box");
    }

    let (base, rotation, half_extents) = match config.kind {
        ShapeKind::Capsule => {
            let radius = derive_radius(dim_a, width, height, one_pixel);
            let length = if dim_b > 0.0 {
                dim_b
            } else if depth > 0.0 {
                depth
            } else {
                one_pixel
            };
            let half = (length * 0.5 - radius).max(0.0);
            let shape = SharedShape::capsule(
                Point3::new(0.0, -half, 0.0),
                Point3::new(0.0, half, 0.0),
                radius,
            );
            (
                shape,
                orientation_rotation(orientation),
                oriented_half_extents(orientation, length * 0.5, radius),
            )
        }
        ShapeKind::Cylinder => {
            let radius = derive_radius(dim_a, width, height, one_pixel);
            let length = if dim_b > 0.0 {
                dim_b
            } else if depth > 0.0 {
                depth
            } else {
                one_pixel
            };
            let shape = SharedShape::cylinder(length * 0.5, radius);
            (
                shape,
                orientation_rotation(orientation),
                oriented_half_extents(orientation, length * 0.5, radius),
            )
        }
        ShapeKind::Sphere => {
            let radius = if dim_a > 0.0 {
                dim_a
            } else if width > 0.0 {
                (width * height * depth).cbrt() * 0.5
            } else {
                one_pixel
            };
            (
                SharedShape::ball(radius),
                Quat::identity(),
                Vec3::new(radius, radius, radius),
            )
        }
        // Box, and the mesh fallback path.
        _ => {
            let full_w = pick_dimension(dim_a, width, one_pixel);
            let full_h = pick_dimension(dim_b, height, one_pixel);
            let full_d = pick_dimension(dim_c, depth, one_pixel);
            (
                SharedShape::cuboid(full_w * 0.5, full_h * 0.5, full_d * 0.5),
                Quat::identity(),
                Vec3::new(full_w * 0.5, full_h * 0.5, full_d * 0.5),
            )
        }
    };

    let shape = wrap_with_local_frame(base, offset, rotation);
    BuiltShape {
        shape,
        half_extents,
        com_offset,
    }
}

fn pick_dimension(override_value: f32, derived: f32, one_pixel: f32) -> f32 {
    if override_value > 0.0 {
        override_value
    } else if derived > 0.0 {
        derived
    } else {
        one_pixel
    }
}

fn derive_radius(override_value: f32, width: f32, height: f32, one_pixel: f32) -> f32 {
    if override_value > 0.0 {
        override_value
    } else if width > 0.0 {
        (width * height).sqrt() * 0.5
    } else {
        one_pixel
    }
}

/// Half extents of a Y-aligned length shape after the orientation remap.
fn oriented_half_extents(orientation: ShapeOrientation, half_length: f32, radius: f32) -> Vec3 {
    match orientation {
        ShapeOrientation::X => Vec3::new(half_length, radius, radius),
        ShapeOrientation::Y => Vec3::new(radius, half_length, radius),
        ShapeOrientation::Z => Vec3::new(radius, radius, half_length),
    }
}

/// Apply a local translation/rotation by wrapping the shape into a
/// single-child compound; identity frames return the shape unchanged.
fn wrap_with_local_frame(shape: SharedShape, offset: Vec3, rotation: Quat) -> SharedShape {
    if offset == Vec3::zeros() && rotation == Quat::identity() {
        return shape;
    }
    let frame = crate::types::Transform::new(offset, rotation).iso();
    SharedShape::compound(vec![(frame, shape)])
}

/// Build a static mesh shape from the host model's triangle parts.
fn build_mesh_shape(
    triangles: Option<Vec<TriangleMeshPart>>,
    width: f32,
    height: f32,
    depth: f32,
    offset: Vec3,
) -> Option<SharedShape> {
    let parts = triangles?;
    let scale = Vec3::new(width, height, depth);

    let mut shapes: Vec<SharedShape> = Vec::new();
    for part in parts {
        if part.vertices.len() < 3 {
            continue;
        }
        let vertices: Vec<Point3> = part
            .vertices
            .iter()
            .map(|v| Point3::from(v.coords.component_mul(&scale)))
            .collect();
        let indices: Vec<[u32; 3]> = match part.indices {
            Some(indices) => indices,
            // Sequential triangles for non-indexed parts.
            None => (0..vertices.len() as u32 / 3)
                .map(|i| [i * 3, i * 3 + 1, i * 3 + 2])
                .collect(),
        };
        if indices.is_empty() {
            continue;
        }
        match SharedShape::trimesh(vertices, indices) {
            Ok(shape) => shapes.push(shape),
            Err(error) => {
                log::warn!("skipping invalid collision mesh part: {error}");
            }
        }
    }

    match shapes.len() {
        0 => None,
        1 if offset == Vec3::zeros() => shapes.pop(),
        _ => {
            let frame = crate::types::Transform::new(offset, Quat::identity()).iso();
            Some(SharedShape::compound(
                shapes.into_iter().map(|s| (frame, s)).collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> UnitScale {
        UnitScale::new(100.0)
    }

    #[test]
    fn box_shape_uses_box_dimensions_when_no_override() {
        let built = build_shape(
            &ShapeConfig::default(),
            BodyType::Dynamic,
            Vec3::new(200.0, 100.0, 50.0),
            &units(),
            None,
        );
        assert!((built.half_extents - Vec3::new(1.0, 0.5, 0.25)).norm() < 1.0e-6);
        assert!(built.shape.as_cuboid().is_some());
    }

    #[test]
    fn dimension_overrides_take_precedence() {
        let config = ShapeConfig {
            dimension_a: 300.0,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(200.0, 100.0, 50.0),
            &units(),
            None,
        );
        // Width comes from the override, the rest from the box.
        assert!((built.half_extents.x - 1.5).abs() < 1.0e-6);
        assert!((built.half_extents.y - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn degenerate_box_still_gets_a_one_pixel_shape() {
        let built = build_shape(
            &ShapeConfig::default(),
            BodyType::Dynamic,
            Vec3::zeros(),
            &units(),
            None,
        );
        let one_pixel = units().world_inv_scale;
        assert!((built.half_extents.x - one_pixel * 0.5).abs() < 1.0e-7);
    }

    #[test]
    fn capsule_radius_derives_from_width_and_height() {
        let config = ShapeConfig {
            kind: ShapeKind::Capsule,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(100.0, 100.0, 400.0),
            &units(),
            None,
        );
        // radius = sqrt(1 * 1) / 2, length along Z = 4.
        assert!((built.half_extents - Vec3::new(0.5, 0.5, 2.0)).norm() < 1.0e-6);
        // Oriented shapes are wrapped into a compound.
        assert!(built.shape.as_compound().is_some());
    }

    #[test]
    fn capsule_orientation_swaps_length_axis() {
        let config = ShapeConfig {
            kind: ShapeKind::Capsule,
            orientation: ShapeOrientation::X,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(400.0, 100.0, 100.0),
            &units(),
            None,
        );
        assert!((built.half_extents - Vec3::new(2.0, 0.5, 0.5)).norm() < 1.0e-6);
    }

    #[test]
    fn sphere_radius_from_volume() {
        let config = ShapeConfig {
            kind: ShapeKind::Sphere,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(200.0, 200.0, 200.0),
            &units(),
            None,
        );
        assert!(built.shape.as_ball().is_some());
        assert!((built.half_extents.x - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn mass_center_offset_is_reported_in_meters() {
        let config = ShapeConfig {
            mass_center_offset: Vec3::new(100.0, 0.0, -50.0),
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(100.0, 100.0, 100.0),
            &units(),
            None,
        );
        assert!((built.com_offset - Vec3::new(1.0, 0.0, -0.5)).norm() < 1.0e-6);
    }

    #[test]
    fn mesh_on_dynamic_body_falls_back_to_box() {
        let config = ShapeConfig {
            kind: ShapeKind::Mesh,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Dynamic,
            Vec3::new(100.0, 100.0, 100.0),
            &units(),
            Some(vec![]),
        );
        assert!(built.shape.as_cuboid().is_some());
    }

    #[test]
    fn mesh_shape_scales_unit_cube_triangles() {
        let part = TriangleMeshPart {
            vertices: vec![
                Point3::new(-0.5, -0.5, 0.0),
                Point3::new(0.5, -0.5, 0.0),
                Point3::new(0.0, 0.5, 0.0),
            ],
            indices: None,
        };
        let config = ShapeConfig {
            kind: ShapeKind::Mesh,
            ..ShapeConfig::default()
        };
        let built = build_shape(
            &config,
            BodyType::Static,
            Vec3::new(200.0, 200.0, 200.0),
            &units(),
            Some(vec![part]),
        );
        assert!(built.shape.as_trimesh().is_some());
    }
}
