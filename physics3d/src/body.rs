/*!
Per-object physics behavior: configuration, runtime state and the rapier
body/collider assembly.

Each game object instance with physics enabled owns exactly one
[`PhysicsBehavior`], registered in the scene's
[`crate::world::PhysicsWorld`]. The behavior owns at most one rapier body
(created lazily on first physics-relevant access) and tracks the last pushed
object transform so unchanged objects don't wake the solver. Recreation is
flag-driven: configuration changes mark the body or shape stale and the next
transform push rebuilds it, removing joints that referenced the old body and
carrying the previous velocities over.
*/

use rapier3d::prelude::{
    ActiveEvents, ActiveHooks, Collider, ColliderBuilder, ColliderHandle, RigidBody,
    RigidBodyBuilder, RigidBodyHandle, RigidBodyType,
};
use std::collections::HashMap;

use crate::joint_editor::{JointEditorBinding, JointEditorConfig};
use crate::joints::{JointAutoTuning, JointId};
use crate::layers::CollisionLayers;
use crate::object::{ObjectId, TriangleMeshPart};
use crate::ragdoll::RagdollRole;
use crate::shape::{BuiltShape, ShapeConfig, build_shape};
use crate::types::{Quat, Transform, Vec3};
use crate::units::UnitScale;

/// Identifier of a behavior registered in a world.
pub type BehaviorId = u32;

/// Motion type of the simulated body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BodyType {
    Static,
    Kinematic,
    #[default]
    Dynamic,
}

impl BodyType {
    pub(crate) fn to_rapier(self) -> RigidBodyType {
        match self {
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicPositionBased,
            BodyType::Dynamic => RigidBodyType::Dynamic,
        }
    }
}

/// Full configuration surface of a physics behavior.
#[derive(Clone, Debug)]
pub struct BehaviorConfig {
    pub body_type: BodyType,
    /// Continuous collision detection for fast-moving bodies.
    pub bullet: bool,
    /// Lock all rotational degrees of freedom.
    pub fixed_rotation: bool,
    pub shape: ShapeConfig,
    /// Mass density used when no mass override is set. Floored at 1e-4.
    pub density: f32,
    /// Explicit mass (mass units); `> 0` overrides the density-derived mass
    /// while keeping shape-computed inertia.
    pub mass_override: f32,
    pub friction: f32,
    pub restitution: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub layers: CollisionLayers,
    pub ragdoll_role: RagdollRole,
    pub ragdoll_group_tag: String,
    pub joint_tuning: JointAutoTuning,
    pub joint_editor: JointEditorConfig,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            bullet: false,
            fixed_rotation: false,
            shape: ShapeConfig::default(),
            density: 1.0,
            mass_override: 0.0,
            friction: 0.3,
            restitution: 0.1,
            linear_damping: 0.1,
            angular_damping: 0.1,
            gravity_scale: 1.0,
            layers: CollisionLayers::default(),
            ragdoll_role: RagdollRole::None,
            ragdoll_group_tag: String::new(),
            joint_tuning: JointAutoTuning::default(),
            joint_editor: JointEditorConfig::default(),
        }
    }
}

impl BehaviorConfig {
    /// Clamp the fields whose invalid values would destabilize the solver.
    pub(crate) fn sanitize(&mut self) {
        self.density = self.density.max(1.0e-4);
        self.linear_damping = self.linear_damping.max(0.0);
        self.angular_damping = self.angular_damping.max(0.0);
        self.mass_override = self.mass_override.max(0.0);
    }
}

/// Solver-state snapshot used for remote/replay synchronization.
///
/// All values are in simulation units. Applying a payload forces a full
/// shape+body rebuild before the values land, so layer/mask changes carried
/// alongside take effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySyncState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub awake: bool,
    pub layers: u8,
    pub masks: u8,
}

/// Runtime state of one behavior instance.
pub struct PhysicsBehavior {
    pub config: BehaviorConfig,
    /// The owning game object.
    pub object: ObjectId,
    pub(crate) activated: bool,
    pub(crate) body: Option<RigidBodyHandle>,
    pub(crate) collider: Option<ColliderHandle>,
    /// Rebuild the body before the next step (joints are removed first).
    pub(crate) needs_body_recreate: bool,
    /// Rebuild only the collider shape before the next step.
    pub(crate) needs_shape_recreate: bool,
    /// Shape bounding half-extents (meters), for dependent systems.
    pub(crate) half_extents: Vec3,
    /// Object transform at the last body sync, to skip redundant wake-ups.
    pub(crate) last_position: Vec3,
    pub(crate) last_rotation: Quat,
    pub(crate) last_dims: Vec3,
    pub(crate) contacts_started: Vec<BehaviorId>,
    pub(crate) contacts_ended: Vec<BehaviorId>,
    pub(crate) contacts_current: Vec<BehaviorId>,
    pub(crate) editor: JointEditorBinding,
    /// Sticky joint-target choices, keyed by target object name.
    pub(crate) preferred_targets: HashMap<String, ObjectId>,
}

impl PhysicsBehavior {
    pub(crate) fn new(mut config: BehaviorConfig, object: ObjectId) -> Self {
        config.sanitize();
        Self {
            config,
            object,
            activated: true,
            body: None,
            collider: None,
            needs_body_recreate: false,
            needs_shape_recreate: false,
            half_extents: Vec3::zeros(),
            last_position: Vec3::zeros(),
            last_rotation: Quat::identity(),
            last_dims: Vec3::zeros(),
            contacts_started: Vec::new(),
            contacts_ended: Vec::new(),
            contacts_current: Vec::new(),
            editor: JointEditorBinding::default(),
            preferred_targets: HashMap::new(),
        }
    }

    /// The rapier body handle, if the body was created.
    pub fn body_handle(&self) -> Option<RigidBodyHandle> {
        self.body
    }

    /// Shape bounding half-extents in meters.
    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    /// The joint currently managed by this behavior's joint-editor binding.
    pub fn editor_joint_id(&self) -> JointId {
        self.editor.owned_joint
    }

    /// Record a contact begin reported by the world's collision listener.
    ///
    /// An end immediately followed by a begin for the same pair within the
    /// same frame is a glitch, not a fresh event: the pending end is dropped
    /// instead of recording a new start.
    pub(crate) fn on_contact_begin(&mut self, other: BehaviorId) {
        self.contacts_current.push(other);
        if let Some(index) = self.contacts_ended.iter().position(|&b| b == other) {
            self.contacts_ended.swap_remove(index);
        } else {
            self.contacts_started.push(other);
        }
    }

    /// Record a contact end reported by the world's collision listener.
    pub(crate) fn on_contact_end(&mut self, other: BehaviorId) {
        self.contacts_ended.push(other);
        if let Some(index) = self.contacts_current.iter().position(|&b| b == other) {
            self.contacts_current.swap_remove(index);
        }
    }

    pub(crate) fn clear_frame_contacts(&mut self) {
        self.contacts_started.clear();
        self.contacts_ended.clear();
    }

    pub(crate) fn clear_all_contacts(&mut self) {
        self.contacts_started.clear();
        self.contacts_ended.clear();
        self.contacts_current.clear();
    }

    /// Forget a destroyed peer so stale ids don't linger in contact lists.
    pub(crate) fn forget_contact_peer(&mut self, other: BehaviorId) {
        self.contacts_started.retain(|&b| b != other);
        self.contacts_ended.retain(|&b| b != other);
        self.contacts_current.retain(|&b| b != other);
    }

    /// Remember the object transform that was last pushed to the body.
    pub(crate) fn remember_sync(&mut self, position: Vec3, rotation: Quat, dims: Vec3) {
        self.last_position = position;
        self.last_rotation = rotation;
        self.last_dims = dims;
    }
}

/// Assemble the rapier body and collider for a behavior.
///
/// `behavior_id` lands in both `user_data` fields so world-level contact
/// callbacks can resolve the owning behavior without pointer cycles.
pub(crate) fn build_body_components(
    behavior_id: BehaviorId,
    config: &BehaviorConfig,
    position_px: Vec3,
    rotation: Quat,
    dims_px: Vec3,
    units: &UnitScale,
    triangles: Option<Vec<TriangleMeshPart>>,
) -> (RigidBody, Collider, Vec3) {
    let BuiltShape {
        shape,
        half_extents,
        com_offset,
    } = build_shape(&config.shape, config.body_type, dims_px, units, triangles);

    let pose = Transform::new(units.vec_to_sim(position_px), rotation).iso();
    let mut body_builder = RigidBodyBuilder::new(config.body_type.to_rapier())
        .pose(pose)
        .ccd_enabled(config.bullet)
        .linear_damping(config.linear_damping)
        .angular_damping(config.angular_damping)
        .gravity_scale(config.gravity_scale)
        .user_data(behavior_id as u128);
    if config.fixed_rotation {
        body_builder = body_builder.lock_rotations();
    }
    let body = body_builder.build();

    let mut collider_builder = ColliderBuilder::new(shape.clone())
        .friction(config.friction)
        .restitution(config.restitution)
        .collision_groups(config.layers.interaction_groups(config.body_type))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
        .user_data(behavior_id as u128);

    if config.mass_override > 0.0 || com_offset != Vec3::zeros() {
        // Shape-computed inertia with an overridden mass and/or a shifted
        // center of mass.
        let mut props = shape.mass_properties(config.density);
        props.local_com += com_offset;
        if config.mass_override > 0.0 {
            props.set_mass(config.mass_override, true);
        }
        collider_builder = collider_builder.mass_properties(props);
    } else {
        collider_builder = collider_builder.density(config.density);
    }

    (body, collider_builder.build(), half_extents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_end_then_begin_same_frame_is_a_glitch() {
        let mut behavior = PhysicsBehavior::new(BehaviorConfig::default(), 1);
        behavior.on_contact_begin(7);
        assert_eq!(behavior.contacts_started, vec![7]);
        assert_eq!(behavior.contacts_current, vec![7]);

        behavior.clear_frame_contacts();
        behavior.on_contact_end(7);
        behavior.on_contact_begin(7);
        // The pair never really separated: no started event, no ended event.
        assert!(behavior.contacts_started.is_empty());
        assert!(behavior.contacts_ended.is_empty());
        assert_eq!(behavior.contacts_current, vec![7]);
    }

    #[test]
    fn contact_end_removes_from_current() {
        let mut behavior = PhysicsBehavior::new(BehaviorConfig::default(), 1);
        behavior.on_contact_begin(3);
        behavior.on_contact_begin(4);
        behavior.on_contact_end(3);
        assert_eq!(behavior.contacts_current, vec![4]);
        assert_eq!(behavior.contacts_ended, vec![3]);
    }

    #[test]
    fn config_sanitize_clamps_pathological_values() {
        let mut config = BehaviorConfig {
            density: 0.0,
            linear_damping: -2.0,
            angular_damping: -1.0,
            mass_override: -5.0,
            ..BehaviorConfig::default()
        };
        config.sanitize();
        assert!(config.density > 0.0);
        assert_eq!(config.linear_damping, 0.0);
        assert_eq!(config.angular_damping, 0.0);
        assert_eq!(config.mass_override, 0.0);
    }

    #[test]
    fn body_components_carry_the_behavior_id() {
        let (body, collider, _) = build_body_components(
            42,
            &BehaviorConfig::default(),
            Vec3::new(100.0, 0.0, 0.0),
            Quat::identity(),
            Vec3::new(100.0, 100.0, 100.0),
            &UnitScale::default(),
            None,
        );
        assert_eq!(body.user_data, 42);
        assert_eq!(collider.user_data, 42);
    }

    #[test]
    fn static_body_type_maps_to_fixed() {
        assert_eq!(BodyType::Static.to_rapier(), RigidBodyType::Fixed);
        assert_eq!(
            BodyType::Kinematic.to_rapier(),
            RigidBodyType::KinematicPositionBased
        );
    }
}
