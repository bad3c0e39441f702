/*!
Closest-hit ray queries against the physics world.

Queries run on a borrowed query pipeline built from the broad phase, so they
reflect the world as of the last step. Inputs and outputs are in
presentation units; the hit carries the surface normal (falling back to the
negated cast direction when the solver cannot supply one) and the reflected
direction around that normal.
*/

use rapier3d::prelude::{QueryFilter, Ray};

use crate::body::BehaviorId;
use crate::types::{Vec3, normalize_or_zero};
use crate::world::PhysicsWorld;

/// Result of a closest-hit ray cast, in presentation units.
#[derive(Clone, Copy, Debug, Default)]
pub struct RaycastHit {
    pub has_hit: bool,
    /// World-space hit point (pixels).
    pub point: Vec3,
    /// Unit surface normal at the hit.
    pub normal: Vec3,
    /// Unit direction of the ray reflected around the normal.
    pub reflection: Vec3,
    /// Distance from the start to the hit point (pixels).
    pub distance: f32,
    /// Fraction of the full cast segment where the hit occurred (0..1).
    pub fraction: f32,
    /// The behavior owning the hit body, if any.
    pub behavior: Option<BehaviorId>,
}

impl PhysicsWorld {
    /// Cast a ray from `start_px` to `end_px` and return the closest hit.
    ///
    /// `ignore` excludes one behavior's body from the query (typically the
    /// caster itself). A degenerate segment returns a "no hit" result.
    pub fn raycast_closest(
        &self,
        start_px: Vec3,
        end_px: Vec3,
        ignore: Option<BehaviorId>,
    ) -> RaycastHit {
        let mut result = RaycastHit::default();

        let (direction, length_px) = normalize_or_zero(end_px - start_px);
        if length_px <= 0.0 {
            return result;
        }

        let mut filter = QueryFilter::default();
        let ignored_body = ignore
            .and_then(|id| self.behaviors.get(&id))
            .and_then(|b| b.body);
        if let Some(body) = ignored_body {
            filter = filter.exclude_rigid_body(body);
        }

        let pipeline = self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        );

        // Cast over the full segment: origin plus an unnormalized direction
        // whose time-of-impact 1.0 lands on the end point.
        let ray = Ray::new(
            self.units.point_to_sim(start_px.into()),
            self.units.vec_to_sim(end_px - start_px),
        );
        let Some((collider_handle, intersection)) = pipeline.cast_ray_and_get_normal(&ray, 1.0, true)
        else {
            return result;
        };

        let fraction = intersection.time_of_impact;
        result.has_hit = true;
        result.fraction = fraction;
        result.distance = length_px * fraction;
        result.point = self
            .units
            .vec_to_view(ray.point_at(fraction).coords);
        result.behavior = self
            .colliders
            .get(collider_handle)
            .map(|c| c.user_data as BehaviorId)
            .filter(|id| self.behaviors.contains_key(id));

        // Fall back to the negated cast direction when the solver cannot
        // supply a usable normal.
        let (normal, normal_length) = normalize_or_zero(intersection.normal);
        result.normal = if normal_length > 0.0 {
            normal
        } else {
            -direction
        };
        let reflected = direction - 2.0 * direction.dot(&result.normal) * result.normal;
        let (reflection, reflection_length) = normalize_or_zero(reflected);
        result.reflection = if reflection_length > 0.0 {
            reflection
        } else {
            result.normal
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BehaviorConfig, BodyType};
    use crate::object::{ObjectKind, SceneObjects};

    fn world_with_wall() -> (PhysicsWorld, SceneObjects, BehaviorId) {
        let mut world = PhysicsWorld::new(Vec3::zeros(), 100.0);
        let mut scene = SceneObjects::new();
        let object = scene.spawn(
            "Wall",
            ObjectKind::Box3D,
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(100.0, 400.0, 400.0),
        );
        let wall = world.register_behavior(
            BehaviorConfig {
                body_type: BodyType::Static,
                ..BehaviorConfig::default()
            },
            object,
        );
        // Two frames: the first is skipped, the second builds and steps.
        world.step(1.0 / 60.0, &mut scene);
        world.finish_frame(&scene);
        world.step(1.0 / 60.0, &mut scene);
        world.finish_frame(&scene);
        (world, scene, wall)
    }

    #[test]
    fn ray_hits_the_closest_surface() {
        let (world, _scene, wall) = world_with_wall();
        let hit = world.raycast_closest(Vec3::zeros(), Vec3::new(1000.0, 0.0, 0.0), None);
        assert!(hit.has_hit);
        assert_eq!(hit.behavior, Some(wall));
        // The wall's near face is at x = 450.
        assert!((hit.point.x - 450.0).abs() < 5.0, "hit at {}", hit.point.x);
        assert!((hit.distance - 450.0).abs() < 5.0);
        assert!((hit.fraction - 0.45).abs() < 0.01);
        // Head-on hit: normal faces back along the ray, reflection too.
        assert!((hit.normal - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-3);
        assert!((hit.reflection - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-3);
    }

    #[test]
    fn oblique_ray_reflects_around_the_surface_normal() {
        let (world, _scene, _) = world_with_wall();
        let start = Vec3::new(0.0, -100.0, 0.0);
        let end = Vec3::new(1000.0, 100.0, 0.0);
        let hit = world.raycast_closest(start, end, None);
        assert!(hit.has_hit);
        // Incoming (+x, +y) reflects to (-x, +y) off a -x facing wall.
        assert!(hit.reflection.x < 0.0);
        assert!(hit.reflection.y > 0.0);
        assert!((hit.reflection.norm() - 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn zero_length_ray_reports_no_hit() {
        let (world, _scene, _) = world_with_wall();
        let start = Vec3::new(100.0, 0.0, 0.0);
        let hit = world.raycast_closest(start, start, None);
        assert!(!hit.has_hit);
        assert_eq!(hit.distance, 0.0);
    }

    #[test]
    fn missing_rays_report_no_hit() {
        let (world, _scene, _) = world_with_wall();
        let hit = world.raycast_closest(Vec3::zeros(), Vec3::new(-1000.0, 0.0, 0.0), None);
        assert!(!hit.has_hit);
        assert_eq!(hit.behavior, None);
    }

    #[test]
    fn ignore_filter_skips_the_caster() {
        let (mut world, mut scene, wall) = world_with_wall();
        // A second box sits between the origin and the wall.
        let object = scene.spawn(
            "Probe",
            ObjectKind::Box3D,
            Vec3::new(200.0, 0.0, 0.0),
            Vec3::new(50.0, 50.0, 50.0),
        );
        let probe = world.register_behavior(
            BehaviorConfig {
                body_type: BodyType::Static,
                ..BehaviorConfig::default()
            },
            object,
        );
        world.step(1.0 / 60.0, &mut scene);
        world.finish_frame(&scene);
        world.step(1.0 / 60.0, &mut scene);
        world.finish_frame(&scene);

        let blocked = world.raycast_closest(Vec3::zeros(), Vec3::new(1000.0, 0.0, 0.0), None);
        assert_eq!(blocked.behavior, Some(probe));
        let through = world.raycast_closest(Vec3::zeros(), Vec3::new(1000.0, 0.0, 0.0), Some(probe));
        assert_eq!(through.behavior, Some(wall));
    }
}
