/*!
Typed constraints between behavior bodies.

Joints are created through the world and tracked in a registry keyed by
monotonically increasing integer ids (starting at 1, 0 meaning "no joint").
Creation is idempotent: asking for a joint of a kind that already connects
the same unordered body pair returns the existing id. Runtime state (break
thresholds, last measured reaction force/torque, broken flag) lives beside
the registry, not on the solver constraint, so a broken joint stays
queryable after the constraint is gone.

Every kind maps onto a rapier `GenericJoint`:
- Fixed locks all six axes, Point the three linear ones.
- Hinge/Slider lock all but one angular/linear axis; the joint frames are
  built from the world-space anchor and axis so the coordinate reads zero at
  creation time.
- Distance and Pulley couple the linear axes into a rope with min/max
  limits.
- Cone/SwingTwist are spherical joints with per-axis angular limits around
  the twist axis.
Joint limit springs and friction are expressed through the per-axis motor:
spring = stiffness/damping toward the neutral coordinate, friction = a
zero-velocity motor clamped by max force.

Per-step feedback reads the solver's accumulated impulses: the locked-axes
impulse vector plus the limit and motor impulses of the axes each kind
actually uses, combined into a scalar force and torque by dividing by the
step delta.
*/

use rapier3d::prelude::{
    GenericJoint, GenericJointBuilder, ImpulseJoint, ImpulseJointHandle, JointAxesMask, JointAxis,
    RigidBodyHandle,
};

use crate::body::BehaviorId;
use crate::constants::{
    EPSILON, STABLE_EXTRA_ITERATIONS, STABLE_PRIORITY, ULTRA_STABLE_EXTRA_ITERATIONS,
    ULTRA_STABLE_PRIORITY,
};
use crate::object::ObjectModel;
use crate::types::{Iso, Point3, Quat, Vec3, normalize_or_zero, perpendicular_axis};
use crate::world::PhysicsWorld;

/// Joint identifier, unique within a world. `0` is never a valid id.
pub type JointId = u32;

/// The id returned by failed joint creations; operations on it are no-ops.
pub const INVALID_JOINT: JointId = 0;

/// The closed set of supported constraint kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointKind {
    Fixed,
    Point,
    Hinge,
    Slider,
    Distance,
    Pulley,
    Cone,
    SwingTwist,
}

/// Solver-stability preset applied to a joint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StabilityPreset {
    /// Engine defaults.
    Balanced,
    /// Stronger solving for most gameplay constraints.
    #[default]
    Stable,
    /// Highest stability, more CPU cost.
    UltraStable,
}

/// Per-behavior automatic tuning applied to every joint it creates or adopts.
#[derive(Clone, Copy, Debug)]
pub struct JointAutoTuning {
    /// Wake both endpoint bodies whenever a joint is created or changed.
    pub wake_bodies: bool,
    pub stability: StabilityPreset,
    /// Automatic break threshold; `<= 0` disables.
    pub break_force: f32,
    pub break_torque: f32,
}

impl Default for JointAutoTuning {
    fn default() -> Self {
        Self {
            wake_bodies: true,
            stability: StabilityPreset::Stable,
            break_force: 0.0,
            break_torque: 0.0,
        }
    }
}

/// Motor drive mode for hinge and slider joints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorState {
    Off,
    Velocity,
    Position,
}

/// Runtime data tracked per joint, independent of the solver constraint.
#[derive(Clone, Copy, Debug, Default)]
pub struct JointRuntimeState {
    pub break_force: f32,
    pub break_torque: f32,
    pub last_reaction_force: f32,
    pub last_reaction_torque: f32,
    pub broken: bool,
}

/// Extra bookkeeping for pulley joints (simulation units).
#[derive(Clone, Copy, Debug)]
pub(crate) struct PulleyInfo {
    pub fixed_a: Point3,
    pub fixed_b: Point3,
    pub ratio: f32,
}

/// Registry entry for a live joint.
pub(crate) struct Joint {
    pub kind: JointKind,
    pub handle: ImpulseJointHandle,
    pub body_a: RigidBodyHandle,
    pub body_b: RigidBodyHandle,
    /// Anchors and principal axis in each body's local space, kept for
    /// coordinate queries (hinge angle, slider position).
    pub local_anchor_a: Point3,
    pub local_anchor_b: Point3,
    pub local_axis_a: Vec3,
    /// `qa⁻¹ · qb` at creation; joint coordinates are measured against it.
    pub initial_rel_rotation: Quat,
    /// Solver override bookkeeping (0 = engine defaults).
    pub velocity_steps: u32,
    pub position_steps: u32,
    pub priority: u8,
    pub pulley: Option<PulleyInfo>,
}

/// Per-kind feedback extraction: combine the solver's accumulated impulse
/// channels into scalar reaction force and torque (per second).
fn joint_feedback(kind: JointKind, joint: &ImpulseJoint, inv_dt: f32) -> (f32, f32) {
    let imp = &joint.impulses;
    let lin = Vec3::new(imp[0], imp[1], imp[2]).norm();
    let ang = Vec3::new(imp[3], imp[4], imp[5]).norm();
    let limit = |axis: JointAxis| {
        joint
            .data
            .limits(axis)
            .map(|l| l.impulse.abs())
            .unwrap_or(0.0)
    };
    let motor = |axis: JointAxis| {
        joint
            .data
            .motor(axis)
            .map(|m| m.impulse.abs())
            .unwrap_or(0.0)
    };
    let combine = |parts: &[f32]| parts.iter().map(|p| p * p).sum::<f32>().sqrt();

    let (force, torque) = match kind {
        JointKind::Fixed => (lin, ang),
        JointKind::Point => (lin, 0.0),
        JointKind::Hinge => (
            lin,
            combine(&[ang, limit(JointAxis::AngX), motor(JointAxis::AngX)]),
        ),
        JointKind::Slider => (
            combine(&[lin, limit(JointAxis::LinX), motor(JointAxis::LinX)]),
            ang,
        ),
        JointKind::Distance | JointKind::Pulley => (
            combine(&[lin, limit(JointAxis::LinX), motor(JointAxis::LinX)]),
            0.0,
        ),
        JointKind::Cone => (
            lin,
            combine(&[ang, limit(JointAxis::AngY), limit(JointAxis::AngZ)]),
        ),
        JointKind::SwingTwist => (
            lin,
            combine(&[
                ang,
                limit(JointAxis::AngX),
                limit(JointAxis::AngY),
                limit(JointAxis::AngZ),
                motor(JointAxis::AngX),
            ]),
        ),
    };
    (force * inv_dt, torque * inv_dt)
}

/// A world-space joint frame: anchor plus a rotation mapping local +X onto
/// the joint's principal axis.
fn world_frame(anchor: Point3, axis: Vec3) -> Iso {
    let x = axis;
    let y = perpendicular_axis(axis);
    let z = x.cross(&y);
    let rotation = Quat::from_rotation_matrix(&nalgebra::Rotation3::from_matrix_unchecked(
        nalgebra::Matrix3::from_columns(&[x, y, z]),
    ));
    Iso::from_parts(anchor.coords.into(), rotation)
}

impl PhysicsWorld {
    // ------------------------------------------------------------- registry

    /// Find an existing joint between two behaviors, optionally restricted
    /// to a kind. Operand order does not matter.
    pub fn find_joint_between(
        &self,
        a: BehaviorId,
        b: BehaviorId,
        kind: Option<JointKind>,
    ) -> JointId {
        let (Some(ha), Some(hb)) = (
            self.behaviors.get(&a).and_then(|x| x.body),
            self.behaviors.get(&b).and_then(|x| x.body),
        ) else {
            return INVALID_JOINT;
        };
        self.find_joint_between_bodies(ha, hb, kind)
    }

    pub(crate) fn find_joint_between_bodies(
        &self,
        a: RigidBodyHandle,
        b: RigidBodyHandle,
        kind: Option<JointKind>,
    ) -> JointId {
        for (&id, joint) in &self.joints {
            if let Some(kind) = kind {
                if joint.kind != kind {
                    continue;
                }
            }
            let same = (joint.body_a == a && joint.body_b == b)
                || (joint.body_a == b && joint.body_b == a);
            if same {
                return id;
            }
        }
        INVALID_JOINT
    }

    /// The kind of a live joint; `None` for unknown or removed ids.
    pub fn joint_kind(&self, id: JointId) -> Option<JointKind> {
        self.joints.get(&id).map(|j| j.kind)
    }

    /// Number of live joints in the world.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Whether this behavior's body is the first endpoint of the joint.
    pub fn is_joint_first_body(&self, behavior: BehaviorId, id: JointId) -> bool {
        let Some(body) = self.behaviors.get(&behavior).and_then(|b| b.body) else {
            return false;
        };
        self.joints.get(&id).is_some_and(|j| j.body_a == body)
    }

    /// Whether this behavior's body is the second endpoint of the joint.
    pub fn is_joint_second_body(&self, behavior: BehaviorId, id: JointId) -> bool {
        let Some(body) = self.behaviors.get(&behavior).and_then(|b| b.body) else {
            return false;
        };
        self.joints.get(&id).is_some_and(|j| j.body_b == body)
    }

    /// World position of a joint in pixels (midpoint of the two bodies).
    pub fn joint_world_position(&self, id: JointId) -> Vec3 {
        let Some(joint) = self.joints.get(&id) else {
            return Vec3::zeros();
        };
        let (Some(a), Some(b)) = (self.bodies.get(joint.body_a), self.bodies.get(joint.body_b))
        else {
            return Vec3::zeros();
        };
        let mid = (a.center_of_mass().coords + b.center_of_mass().coords) * 0.5;
        self.units.vec_to_view(mid)
    }

    /// Remove a joint. The runtime state is discarded; see
    /// [`PhysicsWorld::is_joint_broken`] for break-driven removal.
    pub fn remove_joint(&mut self, id: JointId) {
        self.clear_editor_ownership_of(id);
        self.remove_joint_internal(id, false);
    }

    pub(crate) fn remove_joint_internal(&mut self, id: JointId, mark_broken: bool) {
        if let Some(joint) = self.joints.remove(&id) {
            self.impulse_joints.remove(joint.handle, true);
            self.refresh_body_solver_iterations(joint.body_a);
            self.refresh_body_solver_iterations(joint.body_b);
        }
        if mark_broken {
            if let Some(state) = self.joint_states.get_mut(&id) {
                state.broken = true;
                state.break_force = 0.0;
                state.break_torque = 0.0;
            }
        } else {
            self.joint_states.remove(&id);
        }
        for group in self.ragdolls.values_mut() {
            group.joint_ids.retain(|&j| j != id);
        }
    }

    /// Remove every joint referencing a body (called before the body dies).
    pub(crate) fn remove_joints_with_body(&mut self, body: RigidBodyHandle) {
        let ids: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, j)| j.body_a == body || j.body_b == body)
            .map(|(&id, _)| id)
            .collect();
        for id in ids {
            self.clear_editor_ownership_of(id);
            self.remove_joint_internal(id, false);
        }
    }

    // ------------------------------------------------------------- breakage

    /// Configure automatic break thresholds; a value `<= 0` disables that
    /// threshold. Re-arms a previously broken state.
    pub fn set_joint_break_thresholds(&mut self, id: JointId, max_force: f32, max_torque: f32) {
        if !self.joints.contains_key(&id) {
            return;
        }
        if let Some(state) = self.joint_states.get_mut(&id) {
            state.break_force = max_force.max(0.0);
            state.break_torque = max_torque.max(0.0);
            state.broken = false;
        }
    }

    pub fn clear_joint_break_thresholds(&mut self, id: JointId) {
        self.set_joint_break_thresholds(id, 0.0, 0.0);
    }

    /// Whether the joint was removed by exceeding a break threshold.
    pub fn is_joint_broken(&self, id: JointId) -> bool {
        self.joint_states.get(&id).is_some_and(|s| s.broken)
    }

    /// Last measured reaction force for a joint.
    pub fn joint_reaction_force(&self, id: JointId) -> f32 {
        self.joint_states
            .get(&id)
            .map(|s| s.last_reaction_force)
            .unwrap_or(0.0)
    }

    /// Last measured reaction torque for a joint.
    pub fn joint_reaction_torque(&self, id: JointId) -> f32 {
        self.joint_states
            .get(&id)
            .map(|s| s.last_reaction_torque)
            .unwrap_or(0.0)
    }

    /// Refresh feedback for every joint and remove the ones whose reaction
    /// exceeded a configured threshold. Removal is deferred to after the
    /// scan so the registry is never mutated while iterating.
    pub(crate) fn update_joint_feedback_and_breaks(&mut self, dt: f32) {
        if dt <= EPSILON {
            return;
        }
        let inv_dt = 1.0 / dt;
        let mut to_break: Vec<JointId> = Vec::new();
        for (&id, joint) in &self.joints {
            let Some(state) = self.joint_states.get_mut(&id) else {
                continue;
            };
            let Some(impulse_joint) = self.impulse_joints.get(joint.handle) else {
                continue;
            };
            let (force, torque) = joint_feedback(joint.kind, impulse_joint, inv_dt);
            state.last_reaction_force = force;
            state.last_reaction_torque = torque;

            let break_by_force = state.break_force > 0.0 && force >= state.break_force;
            let break_by_torque = state.break_torque > 0.0 && torque >= state.break_torque;
            if break_by_force || break_by_torque {
                to_break.push(id);
            }
        }
        for id in to_break {
            self.remove_joint_internal(id, true);
        }
    }

    // ----------------------------------------------------- stability presets

    /// Override the solver effort spent on a joint. Zero returns to engine
    /// defaults. The overrides translate to additional solver iterations on
    /// both endpoint bodies.
    pub fn set_joint_solver_overrides(
        &mut self,
        id: JointId,
        velocity_steps: u32,
        position_steps: u32,
    ) {
        let Some(joint) = self.joints.get_mut(&id) else {
            return;
        };
        joint.velocity_steps = velocity_steps.min(255);
        joint.position_steps = position_steps.min(255);
        let (a, b) = (joint.body_a, joint.body_b);
        self.refresh_body_solver_iterations(a);
        self.refresh_body_solver_iterations(b);
        self.wake_joint_bodies(id);
    }

    /// Set the solver priority of a joint (registry metadata used to order
    /// constraint handling; higher wins).
    pub fn set_joint_priority(&mut self, id: JointId, priority: u8) {
        if let Some(joint) = self.joints.get_mut(&id) {
            joint.priority = priority;
        }
        self.wake_joint_bodies(id);
    }

    pub fn joint_priority(&self, id: JointId) -> u8 {
        self.joints.get(&id).map(|j| j.priority).unwrap_or(0)
    }

    /// Apply a ready-to-use stability preset on a joint.
    pub fn set_joint_stability_preset(&mut self, id: JointId, preset: StabilityPreset) {
        match preset {
            StabilityPreset::Balanced => {
                self.set_joint_solver_overrides(id, 0, 0);
                self.set_joint_priority(id, 0);
            }
            StabilityPreset::Stable => {
                let (v, p) = STABLE_EXTRA_ITERATIONS;
                self.set_joint_solver_overrides(id, v, p);
                self.set_joint_priority(id, STABLE_PRIORITY);
            }
            StabilityPreset::UltraStable => {
                let (v, p) = ULTRA_STABLE_EXTRA_ITERATIONS;
                self.set_joint_solver_overrides(id, v, p);
                self.set_joint_priority(id, ULTRA_STABLE_PRIORITY);
            }
        }
    }

    /// Re-derive a body's additional solver iterations from the strongest
    /// override among the joints still attached to it.
    fn refresh_body_solver_iterations(&mut self, body: RigidBodyHandle) {
        let extra = self
            .joints
            .values()
            .filter(|j| j.body_a == body || j.body_b == body)
            .map(|j| j.velocity_steps.max(j.position_steps) / 2)
            .max()
            .unwrap_or(0);
        if let Some(body) = self.bodies.get_mut(body) {
            body.set_additional_solver_iterations(extra as usize);
        }
    }

    fn wake_joint_bodies(&mut self, id: JointId) {
        let Some(joint) = self.joints.get(&id) else {
            return;
        };
        let (a, b) = (joint.body_a, joint.body_b);
        if let Some(body) = self.bodies.get_mut(a) {
            body.wake_up(true);
        }
        if let Some(body) = self.bodies.get_mut(b) {
            body.wake_up(true);
        }
    }

    /// Apply the creating behavior's automatic tuning policy to a joint:
    /// stability preset, break thresholds and the wake-on-change rule.
    pub(crate) fn apply_automatic_joint_tuning(&mut self, owner: BehaviorId, id: JointId) {
        if id == INVALID_JOINT || !self.joints.contains_key(&id) {
            return;
        }
        let Some(tuning) = self.behaviors.get(&owner).map(|b| b.config.joint_tuning) else {
            return;
        };
        self.set_joint_stability_preset(id, tuning.stability);
        if tuning.break_force > 0.0 || tuning.break_torque > 0.0 {
            self.set_joint_break_thresholds(id, tuning.break_force, tuning.break_torque);
        } else {
            self.clear_joint_break_thresholds(id);
        }
        if tuning.wake_bodies {
            self.wake_joint_bodies(id);
        }
    }

    // ------------------------------------------------------------- creation

    /// Resolve and lazily create both endpoint bodies for a joint between
    /// two behaviors, rejecting unsupported or degenerate pairs.
    fn joint_endpoints(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        scene: &dyn ObjectModel,
    ) -> Option<(RigidBodyHandle, RigidBodyHandle)> {
        if a == b {
            log::warn!("joint creation failed: both endpoints are behavior {a}");
            return None;
        }
        for &id in &[a, b] {
            let Some(behavior) = self.behaviors.get(&id) else {
                log::warn!("joint creation failed: unknown behavior {id}");
                return None;
            };
            if !scene.kind(behavior.object).supports_joints() {
                log::warn!(
                    "joint creation failed: object \"{}\" does not support joints",
                    scene.name(behavior.object)
                );
                return None;
            }
        }
        let ha = self.ensure_body(a, scene)?;
        let hb = self.ensure_body(b, scene)?;
        if ha == hb {
            log::warn!("joint creation failed: both endpoints resolve to the same body");
            return None;
        }
        Some((ha, hb))
    }

    /// Track a configured constraint and return its new id.
    fn register_joint(
        &mut self,
        kind: JointKind,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        data: GenericJoint,
        anchor_world: Point3,
        axis_world: Vec3,
        pulley: Option<PulleyInfo>,
    ) -> JointId {
        let (Some(a), Some(b)) = (self.bodies.get(body_a), self.bodies.get(body_b)) else {
            return INVALID_JOINT;
        };
        let pose_a = *a.position();
        let pose_b = *b.position();
        let handle = self.impulse_joints.insert(body_a, body_b, data, true);

        let id = self.next_joint_id;
        self.next_joint_id += 1;
        self.joints.insert(
            id,
            Joint {
                kind,
                handle,
                body_a,
                body_b,
                local_anchor_a: pose_a.inverse_transform_point(&anchor_world),
                local_anchor_b: pose_b.inverse_transform_point(&anchor_world),
                local_axis_a: pose_a.rotation.inverse_transform_vector(&axis_world),
                initial_rel_rotation: pose_a.rotation.inverse() * pose_b.rotation,
                velocity_steps: 0,
                position_steps: 0,
                priority: 0,
                pulley,
            },
        );
        self.joint_states.insert(id, JointRuntimeState::default());
        id
    }

    fn body_frames(
        &self,
        body_a: RigidBodyHandle,
        body_b: RigidBodyHandle,
        frame: Iso,
    ) -> Option<(Iso, Iso)> {
        let a = self.bodies.get(body_a)?;
        let b = self.bodies.get(body_b)?;
        Some((a.position().inv_mul(&frame), b.position().inv_mul(&frame)))
    }

    fn bodies_com_midpoint(&self, a: RigidBodyHandle, b: RigidBodyHandle) -> Point3 {
        let (Some(a), Some(b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return Point3::origin();
        };
        Point3::from((a.center_of_mass().coords + b.center_of_mass().coords) * 0.5)
    }

    /// Weld two behaviors together with no relative movement.
    pub fn add_fixed_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Fixed));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let anchor = self.bodies_com_midpoint(ha, hb);
        let frame = world_frame(anchor, Vec3::new(1.0, 0.0, 0.0));
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_X
                | JointAxesMask::LIN_Y
                | JointAxesMask::LIN_Z
                | JointAxesMask::ANG_X
                | JointAxesMask::ANG_Y
                | JointAxesMask::ANG_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;

        let id = self.register_joint(
            JointKind::Fixed,
            ha,
            hb,
            data,
            anchor,
            Vec3::new(1.0, 0.0, 0.0),
            None,
        );
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Ball-and-socket joint: the bodies stay connected at a point but can
    /// rotate freely around it. The anchor is in pixels.
    pub fn add_point_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        anchor_px: Vec3,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Point));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let anchor = self.units.point_to_sim(anchor_px.into());
        let frame = world_frame(anchor, Vec3::new(1.0, 0.0, 0.0));
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;

        let id = self.register_joint(
            JointKind::Point,
            ha,
            hb,
            data,
            anchor,
            Vec3::new(1.0, 0.0, 0.0),
            None,
        );
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Hinge joint rotating around a single axis. Anchor in pixels; the axis
    /// is normalized, defaulting to +Y when degenerate.
    pub fn add_hinge_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        anchor_px: Vec3,
        axis: Vec3,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Hinge));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let (axis, len) = normalize_or_zero(axis);
        let axis = if len > 0.0 { axis } else { Vec3::new(0.0, 1.0, 0.0) };
        let anchor = self.units.point_to_sim(anchor_px.into());
        let frame = world_frame(anchor, axis);
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_X
                | JointAxesMask::LIN_Y
                | JointAxesMask::LIN_Z
                | JointAxesMask::ANG_Y
                | JointAxesMask::ANG_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;

        let id = self.register_joint(JointKind::Hinge, ha, hb, data, anchor, axis, None);
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Prismatic joint translating along a single axis (anchor is derived
    /// from the body midpoint). The axis defaults to +X when degenerate.
    pub fn add_slider_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        axis: Vec3,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Slider));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let (axis, len) = normalize_or_zero(axis);
        let axis = if len > 0.0 { axis } else { Vec3::new(1.0, 0.0, 0.0) };
        let anchor = self.bodies_com_midpoint(ha, hb);
        let frame = world_frame(anchor, axis);
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_Y
                | JointAxesMask::LIN_Z
                | JointAxesMask::ANG_X
                | JointAxesMask::ANG_Y
                | JointAxesMask::ANG_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;

        let id = self.register_joint(JointKind::Slider, ha, hb, data, anchor, axis, None);
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Keep the separation of two bodies inside `[min, max]` pixels,
    /// optionally with a limit spring. The anchors are the centers of mass.
    pub fn add_distance_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        min_distance_px: f32,
        max_distance_px: f32,
        spring_frequency: f32,
        spring_damping: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Distance));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let min = self.units.to_sim(min_distance_px.min(max_distance_px).max(0.0));
        let max = self
            .units
            .to_sim(min_distance_px.max(max_distance_px))
            .max(min + EPSILON);
        let mut data = GenericJointBuilder::new(JointAxesMask::empty()).build();
        data.coupled_axes = JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z;
        data.set_limits(JointAxis::LinX, [min, max]);
        if spring_frequency > 0.0 {
            data.set_motor_position(
                JointAxis::LinX,
                (min + max) * 0.5,
                spring_frequency.max(0.0),
                spring_damping.max(0.0),
            );
        }
        // Anchors at each body's own center of mass.
        let (Some(body_a), Some(body_b)) = (self.bodies.get(ha), self.bodies.get(hb)) else {
            return INVALID_JOINT;
        };
        let com_a = *body_a.center_of_mass();
        let com_b = *body_b.center_of_mass();
        let local_a = body_a.position().inverse_transform_point(&com_a);
        let local_b = body_b.position().inverse_transform_point(&com_b);
        data.local_frame1 = Iso::from_parts(local_a.coords.into(), Quat::identity());
        data.local_frame2 = Iso::from_parts(local_b.coords.into(), Quat::identity());

        let anchor = Point3::from((com_a.coords + com_b.coords) * 0.5);
        let id = self.register_joint(
            JointKind::Distance,
            ha,
            hb,
            data,
            anchor,
            Vec3::new(1.0, 0.0, 0.0),
            None,
        );
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Pulley-style rope between two bodies routed over two fixed world
    /// anchors. The rope length is fixed; `ratio` weights the second side.
    pub fn add_pulley_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        fixed_anchor_a_px: Vec3,
        fixed_anchor_b_px: Vec3,
        total_length_px: f32,
        ratio: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Pulley));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let total = self.units.to_sim(total_length_px.max(EPSILON));
        let ratio = ratio.max(EPSILON);
        let mut data = GenericJointBuilder::new(JointAxesMask::empty()).build();
        data.coupled_axes = JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z;
        data.set_limits(JointAxis::LinX, [EPSILON, total]);

        let anchor = self.bodies_com_midpoint(ha, hb);
        let pulley = PulleyInfo {
            fixed_a: self.units.point_to_sim(fixed_anchor_a_px.into()),
            fixed_b: self.units.point_to_sim(fixed_anchor_b_px.into()),
            ratio,
        };
        let id = self.register_joint(
            JointKind::Pulley,
            ha,
            hb,
            data,
            anchor,
            Vec3::new(1.0, 0.0, 0.0),
            Some(pulley),
        );
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Restrict relative rotation to a cone around the twist axis.
    pub fn add_cone_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        anchor_px: Vec3,
        twist_axis: Vec3,
        half_angle_deg: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::Cone));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let (axis, len) = normalize_or_zero(twist_axis);
        let axis = if len > 0.0 { axis } else { Vec3::new(0.0, 1.0, 0.0) };
        let half = half_angle_deg.clamp(0.0, 179.0).to_radians();
        let anchor = self.units.point_to_sim(anchor_px.into());
        let frame = world_frame(anchor, axis);
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;
        data.set_limits(JointAxis::AngY, [-half, half]);
        data.set_limits(JointAxis::AngZ, [-half, half]);

        let id = self.register_joint(JointKind::Cone, ha, hb, data, anchor, axis, None);
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    /// Shoulder/hip style joint with independent swing cones and twist range.
    #[allow(clippy::too_many_arguments)]
    pub fn add_swing_twist_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        anchor_px: Vec3,
        twist_axis: Vec3,
        normal_half_cone_deg: f32,
        plane_half_cone_deg: f32,
        twist_min_deg: f32,
        twist_max_deg: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let Some((ha, hb)) = self.joint_endpoints(a, b, scene) else {
            return INVALID_JOINT;
        };
        let existing = self.find_joint_between_bodies(ha, hb, Some(JointKind::SwingTwist));
        if existing != INVALID_JOINT {
            self.apply_automatic_joint_tuning(a, existing);
            return existing;
        }

        let (axis, len) = normalize_or_zero(twist_axis);
        let axis = if len > 0.0 { axis } else { Vec3::new(1.0, 0.0, 0.0) };
        let normal_half = normal_half_cone_deg.clamp(0.0, 179.0).to_radians();
        let plane_half = plane_half_cone_deg.clamp(0.0, 179.0).to_radians();
        let twist_min = twist_min_deg
            .min(twist_max_deg)
            .clamp(-179.0, 179.0)
            .to_radians();
        let twist_max = twist_max_deg
            .max(twist_min_deg)
            .clamp(-179.0, 179.0)
            .to_radians();

        let anchor = self.units.point_to_sim(anchor_px.into());
        let frame = world_frame(anchor, axis);
        let Some((f1, f2)) = self.body_frames(ha, hb, frame) else {
            return INVALID_JOINT;
        };
        let mut data = GenericJointBuilder::new(
            JointAxesMask::LIN_X | JointAxesMask::LIN_Y | JointAxesMask::LIN_Z,
        )
        .build();
        data.local_frame1 = f1;
        data.local_frame2 = f2;
        data.set_limits(JointAxis::AngX, [twist_min, twist_max]);
        data.set_limits(JointAxis::AngY, [-plane_half, plane_half]);
        data.set_limits(JointAxis::AngZ, [-normal_half, normal_half]);

        let id = self.register_joint(JointKind::SwingTwist, ha, hb, data, anchor, axis, None);
        self.apply_automatic_joint_tuning(a, id);
        id
    }

    // --------------------------------------------------- kind-specific ops

    /// Run a closure against a joint's constraint when the kind matches.
    /// Mismatched kinds are treated as "unsupported for this joint" and do
    /// nothing.
    fn with_joint_data<T>(
        &mut self,
        id: JointId,
        kinds: &[JointKind],
        fallback: T,
        f: impl FnOnce(&mut GenericJoint, &Joint) -> T,
    ) -> T {
        let Some(joint) = self.joints.get(&id) else {
            return fallback;
        };
        if !kinds.contains(&joint.kind) {
            return fallback;
        }
        let Some(impulse_joint) = self.impulse_joints.get_mut(joint.handle, false) else {
            return fallback;
        };
        f(&mut impulse_joint.data, joint)
    }

    /// Set hinge rotation limits in degrees.
    pub fn set_hinge_limits(&mut self, id: JointId, min_deg: f32, max_deg: f32) {
        let min = min_deg.min(max_deg).to_radians();
        let max = min_deg.max(max_deg).to_radians();
        self.with_joint_data(id, &[JointKind::Hinge], (), |data, _| {
            data.set_limits(JointAxis::AngX, [min, max]);
        });
        self.wake_joint_bodies(id);
    }

    /// Hinge limits in degrees, `None` when absent or not a hinge.
    pub fn hinge_limits(&self, id: JointId) -> Option<(f32, f32)> {
        let joint = self.joints.get(&id)?;
        if joint.kind != JointKind::Hinge {
            return None;
        }
        let impulse_joint = self.impulse_joints.get(joint.handle)?;
        impulse_joint
            .data
            .limits(JointAxis::AngX)
            .map(|l| (l.min.to_degrees(), l.max.to_degrees()))
    }

    /// Drive a hinge motor. Velocity targets are degrees per second,
    /// position targets degrees.
    pub fn set_hinge_motor(&mut self, id: JointId, state: MotorState, target_deg: f32) {
        self.with_joint_data(id, &[JointKind::Hinge], (), |data, _| match state {
            MotorState::Off => {
                data.set_motor(JointAxis::AngX, 0.0, 0.0, 0.0, 0.0);
                data.set_motor_max_force(JointAxis::AngX, 0.0);
            }
            MotorState::Velocity => {
                data.set_motor_velocity(JointAxis::AngX, target_deg.to_radians(), 1.0);
            }
            MotorState::Position => {
                data.set_motor_position(JointAxis::AngX, target_deg.to_radians(), 1.0e3, 20.0);
            }
        });
        self.wake_joint_bodies(id);
    }

    /// Resistance torque opposing hinge rotation.
    pub fn set_hinge_friction(&mut self, id: JointId, max_friction_torque: f32) {
        let friction = max_friction_torque.max(0.0);
        self.with_joint_data(id, &[JointKind::Hinge], (), |data, _| {
            data.set_motor_velocity(JointAxis::AngX, 0.0, 1.0);
            data.set_motor_max_force(JointAxis::AngX, friction);
        });
        self.wake_joint_bodies(id);
    }

    /// Current friction clamp of a hinge motor.
    pub fn hinge_friction(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        if joint.kind != JointKind::Hinge {
            return 0.0;
        }
        self.impulse_joints
            .get(joint.handle)
            .and_then(|j| j.data.motor(JointAxis::AngX))
            .map(|m| m.max_force)
            .unwrap_or(0.0)
    }

    /// Spring pulling the hinge back toward its creation angle.
    pub fn set_hinge_spring(&mut self, id: JointId, frequency: f32, damping: f32) {
        self.with_joint_data(id, &[JointKind::Hinge], (), |data, _| {
            data.set_motor_position(JointAxis::AngX, 0.0, frequency.max(0.0), damping.max(0.0));
        });
        self.wake_joint_bodies(id);
    }

    /// Current hinge angle in degrees, measured from the creation pose.
    pub fn hinge_angle(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        if joint.kind != JointKind::Hinge {
            return 0.0;
        }
        let (Some(a), Some(b)) = (self.bodies.get(joint.body_a), self.bodies.get(joint.body_b))
        else {
            return 0.0;
        };
        let rel = a.position().rotation.inverse() * b.position().rotation;
        let delta = joint.initial_rel_rotation.inverse() * rel;
        // Twist of the delta rotation around the hinge axis.
        let projected = delta.vector().dot(&joint.local_axis_a);
        (2.0 * projected.atan2(delta.scalar())).to_degrees()
    }

    /// Set slider translation limits in pixels.
    pub fn set_slider_limits(&mut self, id: JointId, min_px: f32, max_px: f32) {
        let min = self.units.to_sim(min_px.min(max_px));
        let max = self.units.to_sim(min_px.max(max_px));
        self.with_joint_data(id, &[JointKind::Slider], (), |data, _| {
            data.set_limits(JointAxis::LinX, [min, max]);
        });
        self.wake_joint_bodies(id);
    }

    /// Slider limits in pixels, `None` when absent or not a slider.
    pub fn slider_limits(&self, id: JointId) -> Option<(f32, f32)> {
        let joint = self.joints.get(&id)?;
        if joint.kind != JointKind::Slider {
            return None;
        }
        let impulse_joint = self.impulse_joints.get(joint.handle)?;
        impulse_joint
            .data
            .limits(JointAxis::LinX)
            .map(|l| (self.units.to_view(l.min), self.units.to_view(l.max)))
    }

    /// Drive a slider motor. Velocity targets are pixels per second,
    /// position targets pixels.
    pub fn set_slider_motor(&mut self, id: JointId, state: MotorState, target_px: f32) {
        let target = self.units.to_sim(target_px);
        self.with_joint_data(id, &[JointKind::Slider], (), |data, _| match state {
            MotorState::Off => {
                data.set_motor(JointAxis::LinX, 0.0, 0.0, 0.0, 0.0);
                data.set_motor_max_force(JointAxis::LinX, 0.0);
            }
            MotorState::Velocity => {
                data.set_motor_velocity(JointAxis::LinX, target, 1.0);
            }
            MotorState::Position => {
                data.set_motor_position(JointAxis::LinX, target, 1.0e3, 20.0);
            }
        });
        self.wake_joint_bodies(id);
    }

    /// Resistance force opposing slider translation.
    pub fn set_slider_friction(&mut self, id: JointId, max_friction_force: f32) {
        let friction = max_friction_force.max(0.0);
        self.with_joint_data(id, &[JointKind::Slider], (), |data, _| {
            data.set_motor_velocity(JointAxis::LinX, 0.0, 1.0);
            data.set_motor_max_force(JointAxis::LinX, friction);
        });
        self.wake_joint_bodies(id);
    }

    /// Spring pulling the slider back toward its creation position.
    pub fn set_slider_spring(&mut self, id: JointId, frequency: f32, damping: f32) {
        self.with_joint_data(id, &[JointKind::Slider], (), |data, _| {
            data.set_motor_position(JointAxis::LinX, 0.0, frequency.max(0.0), damping.max(0.0));
        });
        self.wake_joint_bodies(id);
    }

    /// Current slider position in pixels, measured from the creation pose.
    pub fn slider_position(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        if joint.kind != JointKind::Slider {
            return 0.0;
        }
        let (Some(a), Some(b)) = (self.bodies.get(joint.body_a), self.bodies.get(joint.body_b))
        else {
            return 0.0;
        };
        let anchor_a = a.position().transform_point(&joint.local_anchor_a);
        let anchor_b = b.position().transform_point(&joint.local_anchor_b);
        let axis = a.position().rotation * joint.local_axis_a;
        self.units.to_view((anchor_b - anchor_a).dot(&axis))
    }

    /// Update a distance joint's min/max separation in pixels.
    pub fn set_distance_limits(&mut self, id: JointId, min_px: f32, max_px: f32) {
        let min = self.units.to_sim(min_px.min(max_px).max(0.0));
        let max = self.units.to_sim(min_px.max(max_px)).max(min + EPSILON);
        self.with_joint_data(id, &[JointKind::Distance], (), |data, _| {
            data.set_limits(JointAxis::LinX, [min, max]);
        });
        self.wake_joint_bodies(id);
    }

    /// Distance joint min/max separation in pixels.
    pub fn distance_limits(&self, id: JointId) -> Option<(f32, f32)> {
        let joint = self.joints.get(&id)?;
        if joint.kind != JointKind::Distance {
            return None;
        }
        let impulse_joint = self.impulse_joints.get(joint.handle)?;
        impulse_joint
            .data
            .limits(JointAxis::LinX)
            .map(|l| (self.units.to_view(l.min), self.units.to_view(l.max)))
    }

    /// Limit spring of a distance joint.
    pub fn set_distance_spring(&mut self, id: JointId, frequency: f32, damping: f32) {
        self.with_joint_data(id, &[JointKind::Distance], (), |data, _| {
            let target = data
                .limits(JointAxis::LinX)
                .map(|l| (l.min + l.max) * 0.5)
                .unwrap_or(0.0);
            data.set_motor_position(JointAxis::LinX, target, frequency.max(0.0), damping.max(0.0));
        });
        self.wake_joint_bodies(id);
    }

    /// Set a cone joint's half angle in degrees.
    pub fn set_cone_half_angle(&mut self, id: JointId, half_angle_deg: f32) {
        let half = half_angle_deg.clamp(0.0, 179.0).to_radians();
        self.with_joint_data(id, &[JointKind::Cone], (), |data, _| {
            data.set_limits(JointAxis::AngY, [-half, half]);
            data.set_limits(JointAxis::AngZ, [-half, half]);
        });
        self.wake_joint_bodies(id);
    }

    /// Set the total rope length of a pulley joint (pixels).
    pub fn set_pulley_length(&mut self, id: JointId, total_length_px: f32) {
        let total = self.units.to_sim(total_length_px.max(EPSILON));
        self.with_joint_data(id, &[JointKind::Pulley], (), |data, _| {
            data.set_limits(JointAxis::LinX, [EPSILON, total]);
        });
        self.wake_joint_bodies(id);
    }

    /// Current rope length of a pulley joint (pixels): the distance from
    /// each body to its fixed anchor, the far side weighted by the ratio.
    pub fn pulley_current_length(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        let Some(pulley) = joint.pulley else {
            return 0.0;
        };
        let (Some(a), Some(b)) = (self.bodies.get(joint.body_a), self.bodies.get(joint.body_b))
        else {
            return 0.0;
        };
        let la = (a.center_of_mass() - pulley.fixed_a).norm();
        let lb = (b.center_of_mass() - pulley.fixed_b).norm();
        self.units.to_view(la + pulley.ratio * lb)
    }

    /// Configured total rope length of a pulley joint (pixels).
    pub fn pulley_total_length(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        if joint.kind != JointKind::Pulley {
            return 0.0;
        }
        self.impulse_joints
            .get(joint.handle)
            .and_then(|j| j.data.limits(JointAxis::LinX))
            .map(|l| self.units.to_view(l.max))
            .unwrap_or(0.0)
    }

    /// Joint friction for any kind that supports it (hinge, slider,
    /// swing-twist); other kinds skip silently.
    pub(crate) fn set_joint_friction_any(&mut self, id: JointId, friction: f32) {
        let Some(kind) = self.joint_kind(id) else {
            return;
        };
        match kind {
            JointKind::Hinge => self.set_hinge_friction(id, friction),
            JointKind::Slider => self.set_slider_friction(id, friction),
            JointKind::SwingTwist => {
                let friction = friction.max(0.0);
                self.with_joint_data(id, &[JointKind::SwingTwist], (), |data, _| {
                    for axis in [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ] {
                        data.set_motor_velocity(axis, 0.0, 1.0);
                        data.set_motor_max_force(axis, friction);
                    }
                });
                self.wake_joint_bodies(id);
            }
            _ => {}
        }
    }

    /// Joint limit spring for any kind that supports it (hinge, slider,
    /// distance); other kinds skip silently.
    pub(crate) fn set_joint_spring_any(&mut self, id: JointId, frequency: f32, damping: f32) {
        let Some(kind) = self.joint_kind(id) else {
            return;
        };
        match kind {
            JointKind::Hinge => self.set_hinge_spring(id, frequency, damping),
            JointKind::Slider => self.set_slider_spring(id, frequency, damping),
            JointKind::Distance => self.set_distance_spring(id, frequency, damping),
            _ => {}
        }
    }

    /// Motor stiffness currently configured on the joint's principal axis,
    /// used by tests and ragdoll state queries.
    pub fn joint_spring_stiffness(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        let axis = match joint.kind {
            JointKind::Slider | JointKind::Distance => JointAxis::LinX,
            _ => JointAxis::AngX,
        };
        self.impulse_joints
            .get(joint.handle)
            .and_then(|j| j.data.motor(axis))
            .map(|m| m.stiffness)
            .unwrap_or(0.0)
    }

    /// Motor friction clamp currently configured on the joint's principal
    /// axis.
    pub fn joint_friction(&self, id: JointId) -> f32 {
        let Some(joint) = self.joints.get(&id) else {
            return 0.0;
        };
        let axis = match joint.kind {
            JointKind::Slider | JointKind::Distance => JointAxis::LinX,
            _ => JointAxis::AngX,
        };
        self.impulse_joints
            .get(joint.handle)
            .and_then(|j| j.data.motor(axis))
            .map(|m| m.max_force)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BehaviorConfig, BodyType};
    use crate::object::{ObjectKind, SceneObjects};

    const DT: f32 = 1.0 / 60.0;

    fn world_no_gravity() -> PhysicsWorld {
        PhysicsWorld::new(Vec3::zeros(), 100.0)
    }

    fn spawn_box(
        world: &mut PhysicsWorld,
        scene: &mut SceneObjects,
        name: &str,
        position: Vec3,
    ) -> BehaviorId {
        let object = scene.spawn(name, ObjectKind::Box3D, position, Vec3::new(50.0, 50.0, 50.0));
        world.register_behavior(BehaviorConfig::default(), object)
    }

    fn run_frame(world: &mut PhysicsWorld, scene: &mut SceneObjects) {
        world.step(DT, scene);
        world.finish_frame(scene);
    }

    #[test]
    fn joint_creation_is_idempotent_per_pair_and_kind() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));

        let first = world.add_fixed_joint(a, b, &scene);
        assert_ne!(first, INVALID_JOINT);
        let second = world.add_fixed_joint(a, b, &scene);
        assert_eq!(first, second);
        // Operand order does not matter either.
        let reversed = world.add_fixed_joint(b, a, &scene);
        assert_eq!(first, reversed);
        assert_eq!(world.joint_count(), 1);

        // A different kind between the same bodies is a new joint.
        let hinge = world.add_hinge_joint(
            a,
            b,
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            &scene,
        );
        assert_ne!(hinge, first);
        assert_eq!(world.joint_count(), 2);
    }

    #[test]
    fn find_joint_between_ignores_operand_order() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let id = world.add_point_joint(a, b, Vec3::new(50.0, 0.0, 0.0), &scene);
        assert_eq!(world.find_joint_between(a, b, Some(JointKind::Point)), id);
        assert_eq!(world.find_joint_between(b, a, Some(JointKind::Point)), id);
        assert_eq!(world.find_joint_between(b, a, None), id);
        assert_eq!(
            world.find_joint_between(a, b, Some(JointKind::Hinge)),
            INVALID_JOINT
        );
    }

    #[test]
    fn joint_to_self_is_rejected() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        assert_eq!(world.add_fixed_joint(a, a, &scene), INVALID_JOINT);
        assert_eq!(world.joint_count(), 0);
    }

    #[test]
    fn joint_to_unsupported_object_kind_is_rejected() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let text = scene.spawn("Text", ObjectKind::Other, Vec3::zeros(), Vec3::new(10.0, 10.0, 10.0));
        let t = world.register_behavior(BehaviorConfig::default(), text);
        assert_eq!(world.add_fixed_joint(a, t, &scene), INVALID_JOINT);
    }

    #[test]
    fn destroying_a_behavior_removes_its_joints() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let c = spawn_box(&mut world, &mut scene, "C", Vec3::new(200.0, 0.0, 0.0));
        let ab = world.add_fixed_joint(a, b, &scene);
        let bc = world.add_point_joint(b, c, Vec3::new(150.0, 0.0, 0.0), &scene);

        world.destroy_behavior(b);
        assert_eq!(world.joint_kind(ab), None);
        assert_eq!(world.joint_kind(bc), None);
        assert_eq!(world.joint_count(), 0);
        // Stale ids are no-ops, not errors.
        world.remove_joint(ab);
        assert!(!world.is_joint_broken(ab));
    }

    #[test]
    fn break_threshold_removes_joint_and_leaves_broken_state() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let id = world.add_distance_joint(a, b, 90.0, 110.0, 0.0, 0.0, &scene);
        assert_ne!(id, INVALID_JOINT);
        // Any measurable reaction breaks the joint.
        world.set_joint_break_thresholds(id, 1.0e-6, 0.0);

        // Drive the bodies apart so the rope limit develops an impulse.
        world.set_linear_velocity(a, Vec3::new(-500.0, 0.0, 0.0));
        world.set_linear_velocity(b, Vec3::new(500.0, 0.0, 0.0));
        let mut broken = false;
        for _ in 0..60 {
            run_frame(&mut world, &mut scene);
            if world.is_joint_broken(id) {
                broken = true;
                break;
            }
        }
        assert!(broken, "joint should break under load");
        assert_eq!(world.joint_kind(id), None, "broken joint is removed");
    }

    #[test]
    fn distance_joint_keeps_separation_in_band() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let object_a = scene.spawn(
            "A",
            ObjectKind::Box3D,
            Vec3::zeros(),
            Vec3::new(50.0, 50.0, 50.0),
        );
        let object_b = scene.spawn(
            "B",
            ObjectKind::Box3D,
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(50.0, 50.0, 50.0),
        );
        let a = world.register_behavior(BehaviorConfig::default(), object_a);
        let b = world.register_behavior(BehaviorConfig::default(), object_b);
        let id = world.add_distance_joint(a, b, 90.0, 110.0, 0.0, 0.0, &scene);
        assert_ne!(id, INVALID_JOINT);

        // Pull the bodies apart and let the rope arrest them.
        world.set_linear_velocity(a, Vec3::new(-200.0, 0.0, 0.0));
        world.set_linear_velocity(b, Vec3::new(200.0, 0.0, 0.0));
        for _ in 0..90 {
            run_frame(&mut world, &mut scene);
        }
        let separation = (scene.position(object_b) - scene.position(object_a)).norm();
        assert!(
            (80.0..=120.0).contains(&separation),
            "separation {separation} left the constraint band"
        );
    }

    #[test]
    fn hinge_limits_round_trip_in_degrees() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let id = world.add_hinge_joint(
            a,
            b,
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            &scene,
        );
        // Reversed operands are reordered.
        world.set_hinge_limits(id, 60.0, -60.0);
        let (min, max) = world.hinge_limits(id).expect("hinge has limits");
        assert!((min + 60.0).abs() < 1.0e-3);
        assert!((max - 60.0).abs() < 1.0e-3);
        // Kind mismatch: a fixed joint reports no hinge limits.
        let fixed = world.add_fixed_joint(a, b, &scene);
        assert!(world.hinge_limits(fixed).is_none());
    }

    #[test]
    fn static_anchor_holds_dynamic_body_with_fixed_joint() {
        let mut world = PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0), 100.0);
        let mut scene = SceneObjects::new();
        let anchor_object = scene.spawn(
            "Anchor",
            ObjectKind::Box3D,
            Vec3::new(0.0, 500.0, 0.0),
            Vec3::new(50.0, 50.0, 50.0),
        );
        let anchor = world.register_behavior(
            BehaviorConfig {
                body_type: BodyType::Static,
                ..BehaviorConfig::default()
            },
            anchor_object,
        );
        let swinging_object = scene.spawn(
            "Weight",
            ObjectKind::Box3D,
            Vec3::new(0.0, 420.0, 0.0),
            Vec3::new(50.0, 50.0, 50.0),
        );
        let weight = world.register_behavior(BehaviorConfig::default(), swinging_object);
        let id = world.add_fixed_joint(anchor, weight, &scene);
        assert_ne!(id, INVALID_JOINT);

        for _ in 0..120 {
            run_frame(&mut world, &mut scene);
        }
        let y = scene.position(swinging_object).y;
        assert!(
            (y - 420.0).abs() < 20.0,
            "weld should keep the weight near its start, got y = {y}"
        );
    }

    #[test]
    fn stability_presets_scale_body_solver_iterations() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let id = world.add_point_joint(a, b, Vec3::new(50.0, 0.0, 0.0), &scene);

        world.set_joint_stability_preset(id, StabilityPreset::UltraStable);
        assert_eq!(world.joint_priority(id), ULTRA_STABLE_PRIORITY);
        let handle = world.behavior(a).unwrap().body_handle().unwrap();
        let ultra = world.bodies.get(handle).unwrap().additional_solver_iterations();
        assert!(ultra > 0);

        world.set_joint_stability_preset(id, StabilityPreset::Balanced);
        assert_eq!(world.joint_priority(id), 0);
        let balanced = world
            .bodies
            .get(handle)
            .unwrap()
            .additional_solver_iterations();
        assert_eq!(balanced, 0);
    }

    #[test]
    fn joint_friction_and_spring_are_readable_back() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_box(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let id = world.add_hinge_joint(
            a,
            b,
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            &scene,
        );
        world.set_joint_friction_any(id, 25.0);
        assert!((world.joint_friction(id) - 25.0).abs() < 1.0e-4);
        world.set_joint_spring_any(id, 8.0, 0.5);
        assert!((world.joint_spring_stiffness(id) - 8.0).abs() < 1.0e-4);
    }
}
