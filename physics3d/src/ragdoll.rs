/*!
Ragdoll automation: named groups of bodies and joints managed as one
articulated unit.

A group tracks participating behaviors (with optional anatomical roles),
the joints wiring them together, a mode (Dynamic vs. animation-driven
Kinematic) and a state preset. State presets batch-tune body damping, joint
friction and joint springs:

- `Frozen` forces Kinematic mode (animation-driven).
- `Limp` is high damping, zero friction, zero spring (unconscious).
- `Stiff` is low damping, high friction, stiff springs (muscle tension).
- `Active` sits between the two.

Collision between anatomically adjacent parts (head-chest, chest-hips,
limb chains) is disabled through a per-group pair filter implemented as
rapier physics hooks; each member body occupies its own sub-group inside
the shared table. Group removal deletes every owned joint, restores the
default collision grouping and releases the table.

Stale entries are pruned lazily: group accessors drop joint ids whose
joints were removed and de-duplicate behaviors before operating.
*/

use rapier3d::prelude::{ColliderHandle, PairFilterContext, PhysicsHooks, SolverFlags};
use std::collections::{HashMap, HashSet};

use crate::body::{BehaviorId, BodyType};
use crate::constants::{
    DEFAULT_RAGDOLL_TOTAL_MASS, EPSILON, RAGDOLL_ACTIVE_PRESET, RAGDOLL_LIMP_PRESET,
    RAGDOLL_STIFF_PRESET,
};
use crate::joints::{INVALID_JOINT, JointId, StabilityPreset};
use crate::object::ObjectModel;
use crate::types::{Vec3, normalize_or_zero};
use crate::world::PhysicsWorld;

/// Ragdoll group identifier, unique within a world. `0` is never valid.
pub type RagdollId = u32;

/// Anatomical role of a body inside a ragdoll group. Roles are optional
/// metadata used by the humanoid builder and collision filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RagdollRole {
    #[default]
    None,
    Head,
    Chest,
    Hips,
    UpperArmL,
    LowerArmL,
    UpperArmR,
    LowerArmR,
    ThighL,
    ShinL,
    ThighR,
    ShinR,
}

/// Motion mode of a ragdoll group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RagdollMode {
    Dynamic,
    Kinematic,
}

/// Behavior state preset of a ragdoll group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RagdollState {
    Active,
    Limp,
    Stiff,
    Frozen,
}

/// Registry data of one ragdoll group.
pub struct RagdollGroup {
    pub(crate) behaviors: Vec<BehaviorId>,
    pub(crate) roles: HashMap<BehaviorId, RagdollRole>,
    pub(crate) joint_ids: Vec<JointId>,
    pub(crate) has_collision_filter: bool,
    pub(crate) mode: RagdollMode,
    pub(crate) state: RagdollState,
}

impl RagdollGroup {
    fn new() -> Self {
        Self {
            behaviors: Vec::new(),
            roles: HashMap::new(),
            joint_ids: Vec::new(),
            has_collision_filter: false,
            mode: RagdollMode::Kinematic,
            state: RagdollState::Frozen,
        }
    }
}

/// Per-pair collision filter shared by all ragdoll groups of a world.
///
/// Member colliders map to `(group id, sub-group index)`; a pair inside the
/// same group whose sub-group pair was disabled produces no contact.
#[derive(Default)]
pub(crate) struct RagdollPairFilter {
    memberships: HashMap<ColliderHandle, (RagdollId, u32)>,
    disabled: HashMap<RagdollId, HashSet<(u32, u32)>>,
}

impl RagdollPairFilter {
    pub(crate) fn set_membership(
        &mut self,
        collider: ColliderHandle,
        ragdoll: RagdollId,
        sub_group: u32,
    ) {
        self.memberships.insert(collider, (ragdoll, sub_group));
    }

    pub(crate) fn forget_collider(&mut self, collider: ColliderHandle) {
        self.memberships.remove(&collider);
    }

    fn disable_pair(&mut self, ragdoll: RagdollId, a: u32, b: u32) {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.disabled.entry(ragdoll).or_default().insert(key);
    }

    fn release_group(&mut self, ragdoll: RagdollId) {
        self.disabled.remove(&ragdoll);
        self.memberships.retain(|_, (group, _)| *group != ragdoll);
    }

    fn is_pair_disabled(&self, c1: ColliderHandle, c2: ColliderHandle) -> bool {
        let (Some(&(ra, sa)), Some(&(rb, sb))) =
            (self.memberships.get(&c1), self.memberships.get(&c2))
        else {
            return false;
        };
        if ra != rb {
            return false;
        }
        let key = if sa <= sb { (sa, sb) } else { (sb, sa) };
        self.disabled.get(&ra).is_some_and(|set| set.contains(&key))
    }
}

impl PhysicsHooks for RagdollPairFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if self.is_pair_disabled(context.collider1, context.collider2) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

/// The 11 optional parts accepted by the humanoid builder.
#[derive(Clone, Copy, Debug, Default)]
pub struct HumanoidParts {
    pub head: Option<BehaviorId>,
    pub chest: Option<BehaviorId>,
    pub hips: Option<BehaviorId>,
    pub upper_arm_l: Option<BehaviorId>,
    pub lower_arm_l: Option<BehaviorId>,
    pub upper_arm_r: Option<BehaviorId>,
    pub lower_arm_r: Option<BehaviorId>,
    pub thigh_l: Option<BehaviorId>,
    pub shin_l: Option<BehaviorId>,
    pub thigh_r: Option<BehaviorId>,
    pub shin_r: Option<BehaviorId>,
}

/// Anatomically adjacent role pairs whose collision is disabled inside a
/// humanoid group.
const ADJACENT_ROLE_PAIRS: [(RagdollRole, RagdollRole); 10] = [
    (RagdollRole::Head, RagdollRole::Chest),
    (RagdollRole::Chest, RagdollRole::Hips),
    (RagdollRole::Chest, RagdollRole::UpperArmL),
    (RagdollRole::UpperArmL, RagdollRole::LowerArmL),
    (RagdollRole::Chest, RagdollRole::UpperArmR),
    (RagdollRole::UpperArmR, RagdollRole::LowerArmR),
    (RagdollRole::Hips, RagdollRole::ThighL),
    (RagdollRole::ThighL, RagdollRole::ShinL),
    (RagdollRole::Hips, RagdollRole::ThighR),
    (RagdollRole::ThighR, RagdollRole::ShinR),
];

/// Body-part mass ratios of an average humanoid.
const HUMANOID_MASS_RATIOS: [(RagdollRole, f32); 11] = [
    (RagdollRole::Head, 0.08),
    (RagdollRole::Chest, 0.35),
    (RagdollRole::Hips, 0.15),
    (RagdollRole::UpperArmL, 0.04),
    (RagdollRole::LowerArmL, 0.03),
    (RagdollRole::UpperArmR, 0.04),
    (RagdollRole::LowerArmR, 0.03),
    (RagdollRole::ThighL, 0.08),
    (RagdollRole::ShinL, 0.05),
    (RagdollRole::ThighR, 0.08),
    (RagdollRole::ShinR, 0.05),
];

impl PhysicsWorld {
    // -------------------------------------------------------------- registry

    /// Create a new ragdoll group (Frozen/Kinematic) and return its id.
    pub fn create_ragdoll_group(&mut self) -> RagdollId {
        let id = self.next_ragdoll_id;
        self.next_ragdoll_id += 1;
        self.ragdolls.insert(id, RagdollGroup::new());
        id
    }

    /// Prune stale entries and return the group. Stale ids return `None`.
    fn pruned_group(&mut self, id: RagdollId) -> Option<&mut RagdollGroup> {
        let joints = &self.joints;
        let behaviors = &self.behaviors;
        let group = self.ragdolls.get_mut(&id)?;
        let mut seen = HashSet::new();
        group
            .behaviors
            .retain(|b| behaviors.contains_key(b) && seen.insert(*b));
        group.joint_ids.retain(|j| joints.contains_key(j));
        Some(group)
    }

    pub fn ragdoll_exists(&self, id: RagdollId) -> bool {
        self.ragdolls.contains_key(&id)
    }

    pub fn ragdoll_mode(&self, id: RagdollId) -> Option<RagdollMode> {
        self.ragdolls.get(&id).map(|g| g.mode)
    }

    pub fn ragdoll_state(&self, id: RagdollId) -> Option<RagdollState> {
        self.ragdolls.get(&id).map(|g| g.state)
    }

    /// Number of live bodies in a group.
    pub fn ragdoll_body_count(&self, id: RagdollId) -> usize {
        let Some(group) = self.ragdolls.get(&id) else {
            return 0;
        };
        let mut seen = HashSet::new();
        group
            .behaviors
            .iter()
            .filter(|&&b| self.behaviors.contains_key(&b) && seen.insert(b))
            .count()
    }

    /// Number of live joints in a group.
    pub fn ragdoll_joint_count(&self, id: RagdollId) -> usize {
        let Some(group) = self.ragdolls.get(&id) else {
            return 0;
        };
        group
            .joint_ids
            .iter()
            .filter(|&&j| self.joints.contains_key(&j))
            .count()
    }

    /// Add a behavior's body to a group. Its configured role (when not
    /// `None`) is recorded as the group role.
    pub fn add_body_to_ragdoll(&mut self, id: RagdollId, behavior: BehaviorId) {
        let role = self
            .behaviors
            .get(&behavior)
            .map(|b| b.config.ragdoll_role)
            .unwrap_or_default();
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        if !group.behaviors.contains(&behavior) {
            group.behaviors.push(behavior);
        }
        if role != RagdollRole::None {
            group.roles.insert(behavior, role);
        }
    }

    /// Remove a behavior from every group that references it.
    pub(crate) fn remove_body_from_all_ragdolls(&mut self, behavior: BehaviorId) {
        for group in self.ragdolls.values_mut() {
            group.behaviors.retain(|&b| b != behavior);
            group.roles.remove(&behavior);
        }
    }

    /// Set or override a body's role inside a group.
    pub fn set_ragdoll_body_role(&mut self, id: RagdollId, behavior: BehaviorId, role: RagdollRole) {
        self.add_body_to_ragdoll(id, behavior);
        if let Some(group) = self.ragdolls.get_mut(&id) {
            group.roles.insert(behavior, role);
        }
    }

    pub fn ragdoll_body_role(&self, id: RagdollId, behavior: BehaviorId) -> RagdollRole {
        self.ragdolls
            .get(&id)
            .and_then(|g| g.roles.get(&behavior).copied())
            .unwrap_or_default()
    }

    /// Track a joint as part of a group.
    pub fn add_joint_to_ragdoll(&mut self, id: RagdollId, joint: JointId) {
        if !self.joints.contains_key(&joint) {
            return;
        }
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        if !group.joint_ids.contains(&joint) {
            group.joint_ids.push(joint);
        }
    }

    /// Remove a group: every owned joint is removed first, every member body
    /// returns to the default collision grouping, and the shared filter
    /// table is released.
    pub fn remove_ragdoll_group(&mut self, id: RagdollId) {
        let Some(group) = self.ragdolls.get(&id) else {
            return;
        };
        let joint_ids = group.joint_ids.clone();
        let members = group.behaviors.clone();
        for joint in joint_ids {
            self.remove_joint(joint);
        }
        for behavior in members {
            if let Some(collider) = self.behaviors.get(&behavior).and_then(|b| b.collider) {
                self.pair_filter.forget_collider(collider);
            }
        }
        self.pair_filter.release_group(id);
        self.ragdolls.remove(&id);
    }

    // ------------------------------------------------------- mode and state

    /// Switch every member body between Dynamic and Kinematic motion.
    /// Switching to Kinematic zeroes the velocities so residual energy does
    /// not reappear when switching back later.
    pub fn set_ragdoll_mode(&mut self, id: RagdollId, mode: RagdollMode) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        group.mode = mode;
        let members = group.behaviors.clone();
        let kinematic = mode == RagdollMode::Kinematic;
        for behavior_id in members {
            let Some(behavior) = self.behaviors.get_mut(&behavior_id) else {
                continue;
            };
            behavior.config.body_type = if kinematic {
                BodyType::Kinematic
            } else {
                BodyType::Dynamic
            };
            let Some(body) = behavior.body.and_then(|h| self.bodies.get_mut(h)) else {
                continue;
            };
            body.set_body_type(behavior.config.body_type.to_rapier(), true);
            if kinematic {
                body.set_linvel(Vec3::zeros(), false);
                body.set_angvel(Vec3::zeros(), false);
            } else {
                body.wake_up(true);
            }
        }
    }

    /// Apply a behavior state preset to a group.
    pub fn set_ragdoll_state(&mut self, id: RagdollId, state: RagdollState) {
        if !self.ragdolls.contains_key(&id) {
            return;
        }
        if state == RagdollState::Frozen {
            self.set_ragdoll_mode(id, RagdollMode::Kinematic);
            if let Some(group) = self.ragdolls.get_mut(&id) {
                group.state = RagdollState::Frozen;
            }
            return;
        }

        self.set_ragdoll_mode(id, RagdollMode::Dynamic);
        let (linear, angular, friction, spring_frequency, spring_damping) = match state {
            RagdollState::Limp => RAGDOLL_LIMP_PRESET,
            RagdollState::Stiff => RAGDOLL_STIFF_PRESET,
            _ => RAGDOLL_ACTIVE_PRESET,
        };
        self.set_ragdoll_damping(id, linear, angular);
        self.set_ragdoll_friction(id, friction);
        self.set_ragdoll_stiffness(id, spring_frequency, spring_damping);
        if let Some(group) = self.ragdolls.get_mut(&id) {
            group.state = state;
        }
    }

    // --------------------------------------------------------- batch tuning

    /// Set linear and angular damping on every body in a group.
    pub fn set_ragdoll_damping(&mut self, id: RagdollId, linear: f32, angular: f32) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        let members = group.behaviors.clone();
        for behavior in members {
            self.set_linear_damping(behavior, linear);
            self.set_angular_damping(behavior, angular);
        }
    }

    /// Set spring stiffness on every joint in a group (kinds that support
    /// springs only).
    pub fn set_ragdoll_stiffness(&mut self, id: RagdollId, frequency: f32, damping: f32) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        let joints = group.joint_ids.clone();
        for joint in joints {
            self.set_joint_spring_any(joint, frequency.max(0.0), damping.max(0.0));
        }
    }

    /// Set friction on every joint in a group (kinds that support friction
    /// only).
    pub fn set_ragdoll_friction(&mut self, id: RagdollId, friction: f32) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        let joints = group.joint_ids.clone();
        for joint in joints {
            self.set_joint_friction_any(joint, friction.max(0.0));
        }
    }

    /// Apply an impulse (pixel-scaled) to every body in a group, e.g. an
    /// explosion or a hit reaction.
    pub fn apply_ragdoll_impulse(&mut self, id: RagdollId, impulse_px: Vec3) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        let members = group.behaviors.clone();
        for behavior in members {
            self.apply_impulse(behavior, impulse_px);
        }
    }

    /// Set gravity scale on every body in a group.
    pub fn set_ragdoll_gravity_scale(&mut self, id: RagdollId, scale: f32) {
        let Some(group) = self.pruned_group(id) else {
            return;
        };
        let members = group.behaviors.clone();
        for behavior in members {
            self.set_gravity_scale(behavior, scale);
        }
    }

    // --------------------------------------------------- mass redistribution

    /// Rescale each dynamic member's mass to `total * ratio / sum_ratios`,
    /// where `total` is the measured dynamic mass of all parts (falling back
    /// to a fixed default when nothing usable is measured). Bodies are woken
    /// afterward so the new inertia takes effect immediately.
    pub fn distribute_ragdoll_mass(&mut self, parts: &[(BehaviorId, f32)]) {
        if parts.is_empty() {
            return;
        }
        let mut measured_total = 0.0;
        let mut sum_ratios = 0.0;
        for &(behavior, ratio) in parts {
            sum_ratios += ratio;
            let Some(body) = self
                .behaviors
                .get(&behavior)
                .and_then(|b| b.body)
                .and_then(|h| self.bodies.get(h))
            else {
                continue;
            };
            if body.is_dynamic() && body.mass() > EPSILON {
                measured_total += body.mass();
            }
        }
        if sum_ratios <= EPSILON {
            return;
        }
        let total = if measured_total > EPSILON {
            measured_total
        } else {
            DEFAULT_RAGDOLL_TOTAL_MASS
        };

        for &(behavior_id, ratio) in parts {
            let Some(behavior) = self.behaviors.get(&behavior_id) else {
                continue;
            };
            let is_dynamic = behavior
                .body
                .and_then(|h| self.bodies.get(h))
                .is_some_and(|b| b.is_dynamic());
            if !is_dynamic {
                continue;
            }
            let target = (total * ratio / sum_ratios).max(0.01);
            if let Some(collider) = behavior.collider.and_then(|h| self.colliders.get_mut(h)) {
                collider.set_mass(target);
            }
            self.wake_body(behavior_id);
        }
    }

    // ---------------------------------------------------- collision filter

    /// Install the shared collision filter of a humanoid group: every part
    /// gets its own sub-group, and anatomically adjacent role pairs stop
    /// colliding with each other.
    fn configure_ragdoll_collision_filter(
        &mut self,
        id: RagdollId,
        parts: &[(RagdollRole, BehaviorId)],
    ) {
        if parts.is_empty() {
            return;
        }
        let role_to_sub_group: HashMap<RagdollRole, u32> = parts
            .iter()
            .enumerate()
            .map(|(index, &(role, _))| (role, index as u32))
            .collect();
        for &(role_a, role_b) in &ADJACENT_ROLE_PAIRS {
            let (Some(&a), Some(&b)) = (role_to_sub_group.get(&role_a), role_to_sub_group.get(&role_b))
            else {
                continue;
            };
            self.pair_filter.disable_pair(id, a, b);
        }
        for (index, &(_, behavior)) in parts.iter().enumerate() {
            if let Some(collider) = self.behaviors.get(&behavior).and_then(|b| b.collider) {
                self.pair_filter.set_membership(collider, id, index as u32);
            }
        }
        if let Some(group) = self.ragdolls.get_mut(&id) {
            group.has_collision_filter = true;
        }
    }

    // ------------------------------------------------------ humanoid builder

    /// Resolve behaviors sharing a group tag into humanoid parts by their
    /// configured roles, then build the ragdoll. Chest and hips are the
    /// minimal core; without both this returns an invalid id.
    pub fn build_humanoid_ragdoll_from_tag(
        &mut self,
        group_tag: &str,
        scene: &dyn ObjectModel,
    ) -> RagdollId {
        let tag = group_tag.trim();
        if tag.is_empty() {
            return 0;
        }
        let mut by_role: HashMap<RagdollRole, BehaviorId> = HashMap::new();
        for (&id, behavior) in &self.behaviors {
            if behavior.config.ragdoll_group_tag.trim() != tag {
                continue;
            }
            let role = behavior.config.ragdoll_role;
            if role == RagdollRole::None {
                continue;
            }
            by_role.entry(role).or_insert(id);
        }
        if !by_role.contains_key(&RagdollRole::Chest) || !by_role.contains_key(&RagdollRole::Hips) {
            return 0;
        }
        let parts = HumanoidParts {
            head: by_role.get(&RagdollRole::Head).copied(),
            chest: by_role.get(&RagdollRole::Chest).copied(),
            hips: by_role.get(&RagdollRole::Hips).copied(),
            upper_arm_l: by_role.get(&RagdollRole::UpperArmL).copied(),
            lower_arm_l: by_role.get(&RagdollRole::LowerArmL).copied(),
            upper_arm_r: by_role.get(&RagdollRole::UpperArmR).copied(),
            lower_arm_r: by_role.get(&RagdollRole::LowerArmR).copied(),
            thigh_l: by_role.get(&RagdollRole::ThighL).copied(),
            shin_l: by_role.get(&RagdollRole::ShinL).copied(),
            thigh_r: by_role.get(&RagdollRole::ThighR).copied(),
            shin_r: by_role.get(&RagdollRole::ShinR).copied(),
        };
        self.build_humanoid_ragdoll(parts, scene)
    }

    /// Build a complete humanoid ragdoll from up to 11 body parts:
    /// cone neck, fixed torso, swing-twist shoulders and hips, hinge elbows
    /// and knees with one-directional limits. Masses are redistributed over
    /// anatomical ratios, adjacent parts stop colliding, and the group
    /// starts Frozen (animation-driven) until explicitly activated.
    pub fn build_humanoid_ragdoll(
        &mut self,
        parts: HumanoidParts,
        scene: &dyn ObjectModel,
    ) -> RagdollId {
        let part_list = [
            (RagdollRole::Head, parts.head),
            (RagdollRole::Chest, parts.chest),
            (RagdollRole::Hips, parts.hips),
            (RagdollRole::UpperArmL, parts.upper_arm_l),
            (RagdollRole::LowerArmL, parts.lower_arm_l),
            (RagdollRole::UpperArmR, parts.upper_arm_r),
            (RagdollRole::LowerArmR, parts.lower_arm_r),
            (RagdollRole::ThighL, parts.thigh_l),
            (RagdollRole::ShinL, parts.shin_l),
            (RagdollRole::ThighR, parts.thigh_r),
            (RagdollRole::ShinR, parts.shin_r),
        ];

        // Keep parts whose behaviors resolve to distinct live bodies.
        let mut resolved: Vec<(RagdollRole, BehaviorId)> = Vec::new();
        let mut seen = HashSet::new();
        for (role, behavior) in part_list {
            let Some(behavior) = behavior else { continue };
            if !self.behaviors.contains_key(&behavior) || !seen.insert(behavior) {
                continue;
            }
            if self.ensure_body(behavior, scene).is_none() {
                continue;
            }
            resolved.push((role, behavior));
        }
        if resolved.len() < 2 {
            return 0;
        }

        let ragdoll = self.create_ragdoll_group();
        let mut role_of: HashMap<RagdollRole, BehaviorId> = HashMap::new();
        for &(role, behavior) in &resolved {
            role_of.insert(role, behavior);
            self.set_ragdoll_body_role(ragdoll, behavior, role);
        }

        // Keep the total mass but redistribute it per body part.
        let mass_parts: Vec<(BehaviorId, f32)> = resolved
            .iter()
            .filter_map(|&(role, behavior)| {
                HUMANOID_MASS_RATIOS
                    .iter()
                    .find(|(r, _)| *r == role)
                    .map(|&(_, ratio)| (behavior, ratio))
            })
            .collect();
        self.distribute_ragdoll_mass(&mass_parts);

        let part = |role: RagdollRole| role_of.get(&role).copied();

        if let (Some(head), Some(chest)) = (part(RagdollRole::Head), part(RagdollRole::Chest)) {
            // Neck: cone with controlled movement.
            let joint = self.humanoid_cone_joint(head, chest, 35.0, scene);
            self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::Stable);
            self.set_joint_priority(joint, 140);
        }
        if let (Some(chest), Some(hips)) = (part(RagdollRole::Chest), part(RagdollRole::Hips)) {
            // Torso: fixed core, very stable.
            let joint = self.add_fixed_joint(chest, hips, scene);
            self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::UltraStable);
        }
        let shoulders = [
            (RagdollRole::UpperArmL, RagdollRole::LowerArmL),
            (RagdollRole::UpperArmR, RagdollRole::LowerArmR),
        ];
        for (upper_role, lower_role) in shoulders {
            if let (Some(chest), Some(upper)) = (part(RagdollRole::Chest), part(upper_role)) {
                let joint = self.humanoid_swing_twist_joint(chest, upper, 65.0, 50.0, -70.0, 70.0, scene);
                self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::Stable);
                self.set_joint_solver_overrides(joint, 10, 5);
            }
            if let (Some(upper), Some(lower)) = (part(upper_role), part(lower_role)) {
                // Elbow: one-way bend.
                let joint = self.humanoid_hinge_joint(upper, lower, 0.0, 145.0, scene);
                self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::Stable);
                self.set_hinge_friction(joint, 20.0);
            }
        }
        let legs = [
            (RagdollRole::ThighL, RagdollRole::ShinL),
            (RagdollRole::ThighR, RagdollRole::ShinR),
        ];
        for (thigh_role, shin_role) in legs {
            if let (Some(hips), Some(thigh)) = (part(RagdollRole::Hips), part(thigh_role)) {
                let joint = self.humanoid_swing_twist_joint(hips, thigh, 55.0, 40.0, -35.0, 35.0, scene);
                self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::Stable);
                self.set_joint_solver_overrides(joint, 10, 5);
            }
            if let (Some(thigh), Some(shin)) = (part(thigh_role), part(shin_role)) {
                // Knee.
                let joint = self.humanoid_hinge_joint(thigh, shin, 0.0, 145.0, scene);
                self.register_ragdoll_joint(ragdoll, joint, StabilityPreset::Stable);
                self.set_hinge_friction(joint, 25.0);
            }
        }

        self.configure_ragdoll_collision_filter(ragdoll, &resolved);
        self.set_ragdoll_state(ragdoll, RagdollState::Frozen);
        ragdoll
    }

    fn register_ragdoll_joint(
        &mut self,
        ragdoll: RagdollId,
        joint: JointId,
        preset: StabilityPreset,
    ) {
        if joint == INVALID_JOINT {
            return;
        }
        self.add_joint_to_ragdoll(ragdoll, joint);
        self.set_joint_stability_preset(joint, preset);
        self.set_joint_priority(joint, 120);
    }

    /// World-space axis from body A toward body B (pixels), with a fallback
    /// for coincident parts.
    fn limb_axis(&self, a: BehaviorId, b: BehaviorId, fallback: Vec3) -> Vec3 {
        let delta = self.center_of_mass(b) - self.center_of_mass(a);
        let (axis, length) = normalize_or_zero(delta);
        if length > 0.0 { axis } else { fallback }
    }

    fn limb_midpoint(&self, a: BehaviorId, b: BehaviorId) -> Vec3 {
        (self.center_of_mass(a) + self.center_of_mass(b)) * 0.5
    }

    fn humanoid_cone_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        half_angle_deg: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let anchor = self.limb_midpoint(a, b);
        let axis = self.limb_axis(a, b, Vec3::new(0.0, 1.0, 0.0));
        self.add_cone_joint(a, b, anchor, axis, half_angle_deg, scene)
    }

    fn humanoid_hinge_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        min_deg: f32,
        max_deg: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let anchor = self.limb_midpoint(a, b);
        let axis = self.limb_axis(a, b, Vec3::new(0.0, -1.0, 0.0));
        let joint = self.add_hinge_joint(a, b, anchor, axis, scene);
        self.set_hinge_limits(joint, min_deg, max_deg);
        joint
    }

    #[allow(clippy::too_many_arguments)]
    fn humanoid_swing_twist_joint(
        &mut self,
        a: BehaviorId,
        b: BehaviorId,
        normal_half_deg: f32,
        plane_half_deg: f32,
        twist_min_deg: f32,
        twist_max_deg: f32,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let anchor = self.limb_midpoint(a, b);
        let axis = self.limb_axis(a, b, Vec3::new(0.0, -1.0, 0.0));
        self.add_swing_twist_joint(
            a,
            b,
            anchor,
            axis,
            normal_half_deg,
            plane_half_deg,
            twist_min_deg,
            twist_max_deg,
            scene,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BehaviorConfig;
    use crate::object::{ObjectKind, SceneObjects};
    use crate::types::Vec3;

    fn world_no_gravity() -> PhysicsWorld {
        PhysicsWorld::new(Vec3::zeros(), 100.0)
    }

    fn spawn_part(
        world: &mut PhysicsWorld,
        scene: &mut SceneObjects,
        name: &str,
        position: Vec3,
    ) -> BehaviorId {
        let object = scene.spawn(name, ObjectKind::Box3D, position, Vec3::new(30.0, 30.0, 30.0));
        world.register_behavior(BehaviorConfig::default(), object)
    }

    /// Spawn 11 parts laid out roughly like a standing figure.
    fn spawn_humanoid(world: &mut PhysicsWorld, scene: &mut SceneObjects) -> HumanoidParts {
        let mut at = |name: &str, x: f32, y: f32| spawn_part(world, scene, name, Vec3::new(x, y, 0.0));
        HumanoidParts {
            head: Some(at("Head", 0.0, 180.0)),
            chest: Some(at("Chest", 0.0, 120.0)),
            hips: Some(at("Hips", 0.0, 60.0)),
            upper_arm_l: Some(at("UpperArmL", -50.0, 130.0)),
            lower_arm_l: Some(at("LowerArmL", -90.0, 130.0)),
            upper_arm_r: Some(at("UpperArmR", 50.0, 130.0)),
            lower_arm_r: Some(at("LowerArmR", 90.0, 130.0)),
            thigh_l: Some(at("ThighL", -20.0, 20.0)),
            shin_l: Some(at("ShinL", -20.0, -40.0)),
            thigh_r: Some(at("ThighR", 20.0, 20.0)),
            shin_r: Some(at("ShinR", 20.0, -40.0)),
        }
    }

    #[test]
    fn humanoid_builder_wires_the_anatomical_topology() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let parts = spawn_humanoid(&mut world, &mut scene);
        let ragdoll = world.build_humanoid_ragdoll(parts, &scene);
        assert_ne!(ragdoll, 0);
        assert_eq!(world.ragdoll_body_count(ragdoll), 11);
        assert_eq!(world.ragdoll_joint_count(ragdoll), 10);
        // Starts animation-driven.
        assert_eq!(world.ragdoll_state(ragdoll), Some(RagdollState::Frozen));
        assert_eq!(world.ragdoll_mode(ragdoll), Some(RagdollMode::Kinematic));
        let chest = parts.chest.unwrap();
        assert_eq!(
            world.behavior(chest).unwrap().config.body_type,
            BodyType::Kinematic
        );
    }

    #[test]
    fn activating_a_ragdoll_switches_members_to_dynamic() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let parts = spawn_humanoid(&mut world, &mut scene);
        let ragdoll = world.build_humanoid_ragdoll(parts, &scene);

        world.set_ragdoll_state(ragdoll, RagdollState::Active);
        assert_eq!(world.ragdoll_mode(ragdoll), Some(RagdollMode::Dynamic));
        for behavior in [parts.head.unwrap(), parts.chest.unwrap(), parts.shin_r.unwrap()] {
            assert_eq!(
                world.behavior(behavior).unwrap().config.body_type,
                BodyType::Dynamic
            );
        }
    }

    #[test]
    fn state_presets_put_joint_friction_in_ordered_bands() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let parts = spawn_humanoid(&mut world, &mut scene);
        let ragdoll = world.build_humanoid_ragdoll(parts, &scene);
        // An elbow hinge is a friction-capable member joint.
        let elbow = world.find_joint_between(
            parts.upper_arm_l.unwrap(),
            parts.lower_arm_l.unwrap(),
            Some(crate::joints::JointKind::Hinge),
        );
        assert_ne!(elbow, INVALID_JOINT);

        world.set_ragdoll_state(ragdoll, RagdollState::Limp);
        let limp_friction = world.joint_friction(elbow);
        let limp_spring = world.joint_spring_stiffness(elbow);
        world.set_ragdoll_state(ragdoll, RagdollState::Active);
        let active_friction = world.joint_friction(elbow);
        world.set_ragdoll_state(ragdoll, RagdollState::Stiff);
        let stiff_friction = world.joint_friction(elbow);
        let stiff_spring = world.joint_spring_stiffness(elbow);

        assert_eq!(limp_friction, 0.0);
        assert!(stiff_friction > active_friction);
        assert!(active_friction > limp_friction);
        assert_eq!(limp_spring, 0.0);
        assert!(stiff_spring > limp_spring);
    }

    #[test]
    fn mass_redistribution_preserves_total_dynamic_mass() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_part(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_part(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        world.ensure_body(a, &scene);
        world.ensure_body(b, &scene);
        let total_before = world.mass(a) + world.mass(b);
        assert!(total_before > 0.0);

        world.distribute_ragdoll_mass(&[(a, 3.0), (b, 1.0)]);
        let total_after = world.mass(a) + world.mass(b);
        assert!((total_after - total_before).abs() / total_before < 0.01);
        assert!((world.mass(a) / world.mass(b) - 3.0).abs() < 0.05);
    }

    #[test]
    fn mass_redistribution_falls_back_to_default_total() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        // No bodies created: nothing measurable, so nothing to scale, but the
        // call must not panic or misbehave.
        let a = spawn_part(&mut world, &mut scene, "A", Vec3::zeros());
        world.distribute_ragdoll_mass(&[(a, 1.0)]);
        assert_eq!(world.mass(a), 0.0);
    }

    #[test]
    fn removing_a_group_removes_joints_and_restores_collision() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let parts = spawn_humanoid(&mut world, &mut scene);
        let ragdoll = world.build_humanoid_ragdoll(parts, &scene);
        assert_eq!(world.ragdoll_joint_count(ragdoll), 10);

        world.remove_ragdoll_group(ragdoll);
        assert!(!world.ragdoll_exists(ragdoll));
        assert_eq!(world.joint_count(), 0);
        // Stale id: every operation is a no-op.
        world.set_ragdoll_state(ragdoll, RagdollState::Active);
        assert_eq!(world.ragdoll_body_count(ragdoll), 0);
    }

    #[test]
    fn adjacent_part_pairs_are_filtered_inside_one_group_only() {
        let mut filter = RagdollPairFilter::default();
        let c1 = ColliderHandle::from_raw_parts(1, 0);
        let c2 = ColliderHandle::from_raw_parts(2, 0);
        let c3 = ColliderHandle::from_raw_parts(3, 0);
        filter.set_membership(c1, 1, 0);
        filter.set_membership(c2, 1, 1);
        filter.set_membership(c3, 2, 1);
        filter.disable_pair(1, 0, 1);

        assert!(filter.is_pair_disabled(c1, c2));
        assert!(filter.is_pair_disabled(c2, c1), "order must not matter");
        assert!(!filter.is_pair_disabled(c1, c3), "different groups collide");

        filter.release_group(1);
        assert!(!filter.is_pair_disabled(c1, c2));
    }

    #[test]
    fn group_prunes_stale_joints_and_duplicate_bodies() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let a = spawn_part(&mut world, &mut scene, "A", Vec3::zeros());
        let b = spawn_part(&mut world, &mut scene, "B", Vec3::new(100.0, 0.0, 0.0));
        let ragdoll = world.create_ragdoll_group();
        world.add_body_to_ragdoll(ragdoll, a);
        world.add_body_to_ragdoll(ragdoll, a);
        world.add_body_to_ragdoll(ragdoll, b);
        assert_eq!(world.ragdoll_body_count(ragdoll), 2);

        let joint = world.add_fixed_joint(a, b, &scene);
        world.add_joint_to_ragdoll(ragdoll, joint);
        assert_eq!(world.ragdoll_joint_count(ragdoll), 1);
        world.remove_joint(joint);
        assert_eq!(world.ragdoll_joint_count(ragdoll), 0);
    }

    #[test]
    fn tag_resolution_requires_chest_and_hips() {
        let mut world = world_no_gravity();
        let mut scene = SceneObjects::new();
        let object = scene.spawn(
            "Head",
            ObjectKind::Box3D,
            Vec3::zeros(),
            Vec3::new(30.0, 30.0, 30.0),
        );
        let config = BehaviorConfig {
            ragdoll_role: RagdollRole::Head,
            ragdoll_group_tag: "npc".to_string(),
            ..BehaviorConfig::default()
        };
        world.register_behavior(config, object);
        assert_eq!(world.build_humanoid_ragdoll_from_tag("npc", &scene), 0);
        assert_eq!(world.build_humanoid_ragdoll_from_tag("", &scene), 0);
    }
}
