/*!
Per-scene physics world.

One `PhysicsWorld` exists per scene and owns everything the solver needs:
the rapier body/collider/joint sets and pipeline, the behavior registry, the
joint and ragdoll registries, the ragdoll contact-pair filter and the
collision event queue. Behaviors are addressed by stable integer ids; rapier
bodies and colliders carry the owning behavior id in `user_data`, so contact
callbacks resolve both sides without pointer cycles.

Frame protocol
- Call [`PhysicsWorld::step`] once per frame (extra calls are ignored thanks
  to the `stepped` guard, so every behavior may request it).
- Call [`PhysicsWorld::finish_frame`] after the frame's event logic: it
  resets the guard and reconciles every joint-editor binding.

Step ordering: per-frame contact buffers are cleared, every behavior pushes
its object transform into its body, before-step hooks run, the solver steps
(two sub-steps for long frames), contact events are routed, joint feedback
and automatic breakage run, and finally every body's transform is pulled
back into its object. The very first frame of a scene never steps so initial
event logic can resolve overlapping spawns first.
*/

use rapier3d::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::body::{
    BehaviorConfig, BehaviorId, BodySyncState, PhysicsBehavior, build_body_components,
};
use crate::constants::MAX_SINGLE_STEP_DELTA;
use crate::joints::{Joint, JointId, JointRuntimeState};
use crate::object::{ObjectId, ObjectModel};
use crate::ragdoll::{RagdollGroup, RagdollId, RagdollPairFilter};
use crate::shape::ShapeKind;
use crate::types::{Transform, Vec3};
use crate::units::UnitScale;

/// A system that must run right before the solver step (e.g. a character
/// controller that pre-resolves its own motion).
///
/// Hooks are registered once and stay for the lifetime of the world; a hook
/// whose owner was deactivated should check that itself and do nothing.
pub trait BeforeStepHook {
    fn before_step(&mut self, dt: f32, world: &mut PhysicsWorld);
}

/// Collects rapier collision events during the step for routing afterwards.
#[derive(Default)]
struct CollisionEventQueue {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventHandler for CollisionEventQueue {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// The per-scene simulation context.
pub struct PhysicsWorld {
    pub(crate) gravity: Vec3,
    pub(crate) units: UnitScale,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    pub(crate) broad_phase: BroadPhaseBvh,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    pub(crate) impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    pub(crate) pair_filter: RagdollPairFilter,
    event_queue: CollisionEventQueue,
    pub(crate) behaviors: BTreeMap<BehaviorId, PhysicsBehavior>,
    next_behavior_id: BehaviorId,
    pub(crate) joints: BTreeMap<JointId, Joint>,
    pub(crate) joint_states: HashMap<JointId, JointRuntimeState>,
    pub(crate) next_joint_id: JointId,
    pub(crate) ragdolls: BTreeMap<RagdollId, RagdollGroup>,
    pub(crate) next_ragdoll_id: RagdollId,
    hooks: Vec<Box<dyn BeforeStepHook>>,
    stepped: bool,
    first_frame: bool,
}

impl PhysicsWorld {
    /// Create a world with a gravity vector (simulation units) and a
    /// presentation scale in pixels per meter.
    pub fn new(gravity: Vec3, world_scale: f32) -> Self {
        Self {
            gravity,
            units: UnitScale::new(world_scale),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            pair_filter: RagdollPairFilter::default(),
            event_queue: CollisionEventQueue::default(),
            behaviors: BTreeMap::new(),
            next_behavior_id: 0,
            joints: BTreeMap::new(),
            joint_states: HashMap::new(),
            next_joint_id: 1,
            ragdolls: BTreeMap::new(),
            next_ragdoll_id: 1,
            hooks: Vec::new(),
            stepped: false,
            first_frame: true,
        }
    }

    pub fn units(&self) -> UnitScale {
        self.units
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    // ---------------------------------------------------------------- registry

    /// Register a behavior for a game object. The body is created lazily on
    /// first physics-relevant access.
    pub fn register_behavior(&mut self, config: BehaviorConfig, object: ObjectId) -> BehaviorId {
        self.next_behavior_id += 1;
        let id = self.next_behavior_id;
        self.behaviors.insert(id, PhysicsBehavior::new(config, object));
        id
    }

    pub fn behavior(&self, id: BehaviorId) -> Option<&PhysicsBehavior> {
        self.behaviors.get(&id)
    }

    /// Mutable access to a behavior's configuration. Prefer the dedicated
    /// setters for fields that require a shape or body rebuild.
    pub fn behavior_config_mut(&mut self, id: BehaviorId) -> Option<&mut BehaviorConfig> {
        self.behaviors.get_mut(&id).map(|b| &mut b.config)
    }

    pub fn behavior_ids(&self) -> Vec<BehaviorId> {
        self.behaviors.keys().copied().collect()
    }

    /// Deactivate a behavior: its body, joints and contacts are released but
    /// the registration survives for later re-activation.
    pub fn deactivate_behavior(&mut self, id: BehaviorId) {
        self.release_behavior_runtime(id);
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.activated = false;
        }
    }

    pub fn activate_behavior(&mut self, id: BehaviorId) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.activated = true;
        }
    }

    /// Destroy a behavior with its body, joints, ragdoll memberships and any
    /// joint-editor state.
    pub fn destroy_behavior(&mut self, id: BehaviorId) {
        self.release_behavior_runtime(id);
        self.remove_body_from_all_ragdolls(id);
        self.behaviors.remove(&id);
        for behavior in self.behaviors.values_mut() {
            behavior.forget_contact_peer(id);
        }
    }

    /// Tear down a behavior's runtime objects: owned editor joint, joints
    /// touching its body, the body itself and all contact bookkeeping.
    fn release_behavior_runtime(&mut self, id: BehaviorId) {
        self.clear_editor_owned_joint(id);
        let body = self.behaviors.get(&id).and_then(|b| b.body);
        if let Some(handle) = body {
            self.remove_joints_with_body(handle);
        }
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.preferred_targets.clear();
            behavior.editor.reset();
            behavior.clear_all_contacts();
            let collider = behavior.collider.take();
            let body = behavior.body.take();
            if let Some(collider) = collider {
                self.pair_filter.forget_collider(collider);
            }
            if let Some(handle) = body {
                self.bodies.remove(
                    handle,
                    &mut self.islands,
                    &mut self.colliders,
                    &mut self.impulse_joints,
                    &mut self.multibody_joints,
                    true,
                );
            }
        }
    }

    // ---------------------------------------------------------------- lifecycle

    /// Get the behavior's body handle, creating the body if needed.
    pub fn ensure_body(
        &mut self,
        id: BehaviorId,
        scene: &dyn ObjectModel,
    ) -> Option<RigidBodyHandle> {
        if let Some(behavior) = self.behaviors.get(&id) {
            if let Some(handle) = behavior.body {
                return Some(handle);
            }
        }
        self.create_body(id, scene)
    }

    fn create_body(&mut self, id: BehaviorId, scene: &dyn ObjectModel) -> Option<RigidBodyHandle> {
        let behavior = self.behaviors.get(&id)?;
        if !behavior.activated || !scene.contains(behavior.object) {
            return None;
        }
        let object = behavior.object;
        let config = behavior.config.clone();
        let position = scene.position(object);
        let rotation = scene.orientation(object);
        let dims = scene.box_dimensions(object);
        let triangles = if config.shape.kind == ShapeKind::Mesh {
            scene.collision_triangles(object)
        } else {
            None
        };

        let (body, collider, half_extents) =
            build_body_components(id, &config, position, rotation, dims, &self.units, triangles);
        let body_handle = self.bodies.insert(body);
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);

        let behavior = self.behaviors.get_mut(&id)?;
        behavior.body = Some(body_handle);
        behavior.collider = Some(collider_handle);
        behavior.half_extents = half_extents;
        behavior.needs_body_recreate = false;
        behavior.needs_shape_recreate = false;
        behavior.remember_sync(position, rotation, dims);
        Some(body_handle)
    }

    /// Rebuild a behavior's body. Joints cannot survive body replacement
    /// because they reference body identities, so they are removed first; the
    /// prior velocities seed the new body unless overrides are supplied.
    pub(crate) fn recreate_body(
        &mut self,
        id: BehaviorId,
        scene: &dyn ObjectModel,
        velocity_override: Option<(Vec3, Vec3)>,
    ) {
        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        let old_body = behavior.body;
        let velocities = velocity_override.or_else(|| {
            old_body
                .and_then(|h| self.bodies.get(h))
                .map(|b| (*b.linvel(), *b.angvel()))
        });

        if let Some(handle) = old_body {
            self.remove_joints_with_body(handle);
            if let Some(behavior) = self.behaviors.get_mut(&id) {
                behavior.clear_all_contacts();
                if let Some(collider) = behavior.collider.take() {
                    self.pair_filter.forget_collider(collider);
                }
                behavior.body = None;
            }
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }

        let Some(new_handle) = self.create_body(id, scene) else {
            return;
        };
        if let (Some((linvel, angvel)), Some(body)) = (velocities, self.bodies.get_mut(new_handle))
        {
            body.set_linvel(linvel, true);
            body.set_angvel(angvel, true);
        }
    }

    /// Swap only the collider shape, keeping the body (and its joints).
    fn recreate_shape(&mut self, id: BehaviorId, scene: &dyn ObjectModel) {
        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        let Some(collider_handle) = behavior.collider else {
            return;
        };
        let object = behavior.object;
        let config = behavior.config.clone();
        let dims = scene.box_dimensions(object);
        let triangles = if config.shape.kind == ShapeKind::Mesh {
            scene.collision_triangles(object)
        } else {
            None
        };
        let built = crate::shape::build_shape(
            &config.shape,
            config.body_type,
            dims,
            &self.units,
            triangles,
        );
        if let Some(collider) = self.colliders.get_mut(collider_handle) {
            collider.set_shape(built.shape.clone());
            // Mass properties follow the new geometry (and any mass
            // override or shifted center of mass).
            if config.mass_override > 0.0 || built.com_offset != Vec3::zeros() {
                let mut props = built.shape.mass_properties(config.density);
                props.local_com += built.com_offset;
                if config.mass_override > 0.0 {
                    props.set_mass(config.mass_override, true);
                }
                collider.set_mass_properties(props);
            } else {
                collider.set_density(config.density);
            }
        }
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.half_extents = built.half_extents;
            behavior.last_dims = dims;
        }
        if let Some(body) = self
            .behaviors
            .get(&id)
            .and_then(|b| b.body)
            .and_then(|h| self.bodies.get_mut(h))
        {
            body.wake_up(true);
        }
    }

    /// Push the owning object's transform into the body, creating or
    /// rebuilding it first when flagged. Unchanged objects are skipped to
    /// avoid needless wake-ups.
    pub(crate) fn push_body_from_object(&mut self, id: BehaviorId, scene: &dyn ObjectModel) {
        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        if !behavior.activated || !scene.contains(behavior.object) {
            return;
        }
        if behavior.body.is_none() && self.create_body(id, scene).is_none() {
            return;
        }
        if self
            .behaviors
            .get(&id)
            .is_some_and(|b| b.needs_body_recreate)
        {
            self.recreate_body(id, scene, None);
        }

        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        let object = behavior.object;
        let dims = scene.box_dimensions(object);
        let size_changed =
            !behavior.config.shape.has_custom_dimensions() && dims != behavior.last_dims;
        if behavior.needs_shape_recreate || size_changed {
            if let Some(behavior) = self.behaviors.get_mut(&id) {
                behavior.needs_shape_recreate = false;
            }
            self.recreate_shape(id, scene);
        }

        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        let position = scene.position(object);
        let rotation = scene.orientation(object);
        if position == behavior.last_position && rotation == behavior.last_rotation {
            return;
        }
        behavior.remember_sync(position, rotation, dims);
        let Some(body) = behavior.body.and_then(|h| self.bodies.get_mut(h)) else {
            return;
        };
        let pose = Transform::new(self.units.vec_to_sim(position), rotation).iso();
        body.set_position(pose, true);
    }

    /// Pull the solver's resulting transform back into the object. Static
    /// and kinematic bodies are driven by the object, not the other way
    /// around, and sleeping bodies have nothing new to report.
    pub(crate) fn pull_object_from_body(&mut self, id: BehaviorId, scene: &mut dyn ObjectModel) {
        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        if !behavior.activated || !scene.contains(behavior.object) {
            return;
        }
        let object = behavior.object;
        let Some(body) = behavior.body.and_then(|h| self.bodies.get(h)) else {
            return;
        };
        if !body.is_dynamic() || body.is_sleeping() {
            return;
        }
        let pose = body.position();
        let position = self.units.vec_to_view(pose.translation.vector);
        let rotation = pose.rotation;
        scene.set_position(object, position);
        scene.set_orientation(object, rotation);
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.remember_sync(position, rotation, scene.box_dimensions(object));
        }
    }

    // ---------------------------------------------------------------- stepping

    /// Register a before-step hook. Hooks stay registered for the lifetime of
    /// the world to keep their ordering stable.
    pub fn register_hook(&mut self, hook: Box<dyn BeforeStepHook>) {
        self.hooks.push(hook);
    }

    /// Advance the simulation by `dt` seconds, at most once per frame.
    pub fn step(&mut self, dt: f32, scene: &mut dyn ObjectModel) {
        if self.stepped {
            return;
        }
        // Skip the very first frame of the scene so initial event logic can
        // resolve overlapping spawns before the solver sees them.
        if self.first_frame {
            self.first_frame = false;
            self.stepped = true;
            return;
        }
        self.stepped = true;

        let ids = self.behavior_ids();
        for &id in &ids {
            if let Some(behavior) = self.behaviors.get_mut(&id) {
                behavior.clear_frame_contacts();
            }
        }
        for &id in &ids {
            self.push_body_from_object(id, scene);
        }

        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in &mut hooks {
            hook.before_step(dt, self);
        }
        self.hooks = hooks;

        // Two sub-steps preserve stability when the frame ran long.
        let substeps = if dt > MAX_SINGLE_STEP_DELTA { 2 } else { 1 };
        self.params.dt = dt / substeps as f32;
        for _ in 0..substeps {
            self.pipeline.step(
                &self.gravity,
                &self.params,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd,
                &self.pair_filter,
                &self.event_queue,
            );
        }

        self.route_contact_events();
        self.update_joint_feedback_and_breaks(dt);

        for &id in &ids {
            self.pull_object_from_body(id, scene);
        }
    }

    /// End-of-frame bookkeeping: re-arm the step guard and reconcile every
    /// behavior's joint-editor binding against the scene.
    pub fn finish_frame(&mut self, scene: &dyn ObjectModel) {
        self.stepped = false;
        for id in self.behavior_ids() {
            self.sync_joint_editor(id, scene);
        }
    }

    /// Whether the world already stepped this frame.
    pub fn stepped_this_frame(&self) -> bool {
        self.stepped
    }

    fn route_contact_events(&mut self) {
        let events = match self.event_queue.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => return,
        };
        for event in events {
            match event {
                CollisionEvent::Started(c1, c2, _) => {
                    let Some((a, b)) = self.resolve_contact_pair(c1, c2) else {
                        continue;
                    };
                    if let Some(behavior) = self.behaviors.get_mut(&a) {
                        behavior.on_contact_begin(b);
                    }
                    if let Some(behavior) = self.behaviors.get_mut(&b) {
                        behavior.on_contact_begin(a);
                    }
                }
                CollisionEvent::Stopped(c1, c2, _) => {
                    let Some((a, b)) = self.resolve_contact_pair(c1, c2) else {
                        continue;
                    };
                    if let Some(behavior) = self.behaviors.get_mut(&a) {
                        behavior.on_contact_end(b);
                    }
                    if let Some(behavior) = self.behaviors.get_mut(&b) {
                        behavior.on_contact_end(a);
                    }
                }
            }
        }
    }

    fn resolve_contact_pair(
        &self,
        c1: ColliderHandle,
        c2: ColliderHandle,
    ) -> Option<(BehaviorId, BehaviorId)> {
        let a = self.colliders.get(c1)?.user_data as BehaviorId;
        let b = self.colliders.get(c2)?.user_data as BehaviorId;
        if self.behaviors.contains_key(&a) && self.behaviors.contains_key(&b) {
            Some((a, b))
        } else {
            None
        }
    }

    // ---------------------------------------------------------------- queries

    /// Whether the two behaviors are currently in contact (including contacts
    /// that started this frame).
    pub fn are_colliding(&self, a: BehaviorId, b: BehaviorId) -> bool {
        self.behaviors.get(&a).is_some_and(|behavior| {
            behavior.contacts_current.contains(&b) || behavior.contacts_started.contains(&b)
        })
    }

    /// Whether a contact between the two behaviors started this frame.
    pub fn has_collision_started(&self, a: BehaviorId, b: BehaviorId) -> bool {
        self.behaviors
            .get(&a)
            .is_some_and(|behavior| behavior.contacts_started.contains(&b))
    }

    /// Whether a contact between the two behaviors ended this frame.
    pub fn has_collision_stopped(&self, a: BehaviorId, b: BehaviorId) -> bool {
        self.behaviors
            .get(&a)
            .is_some_and(|behavior| behavior.contacts_ended.contains(&b))
    }

    /// Mask test: may `a` collide against `b` at all?
    pub fn can_collide(&self, a: BehaviorId, b: BehaviorId) -> bool {
        let (Some(a), Some(b)) = (self.behaviors.get(&a), self.behaviors.get(&b)) else {
            return false;
        };
        a.config
            .layers
            .can_collide(a.config.body_type, &b.config.layers, b.config.body_type)
    }

    // --------------------------------------------------------- body accessors

    /// Linear velocity in pixels per second. Zero until the body exists.
    pub fn linear_velocity(&self, id: BehaviorId) -> Vec3 {
        self.with_body(id, Vec3::zeros(), |body, units| {
            units.vec_to_view(*body.linvel())
        })
    }

    pub fn set_linear_velocity(&mut self, id: BehaviorId, velocity_px: Vec3) {
        let v = self.units.vec_to_sim(velocity_px);
        self.with_body_mut(id, |body| body.set_linvel(v, true));
    }

    /// Angular velocity in degrees per second.
    pub fn angular_velocity(&self, id: BehaviorId) -> Vec3 {
        self.with_body(id, Vec3::zeros(), |body, _| {
            body.angvel().map(|v| v.to_degrees())
        })
    }

    pub fn set_angular_velocity(&mut self, id: BehaviorId, velocity_deg: Vec3) {
        let v = velocity_deg.map(|c| c.to_radians());
        self.with_body_mut(id, |body| body.set_angvel(v, true));
    }

    /// Apply an impulse (pixel-scaled) at the center of mass.
    pub fn apply_impulse(&mut self, id: BehaviorId, impulse_px: Vec3) {
        let impulse = self.units.vec_to_sim(impulse_px);
        self.with_body_mut(id, |body| body.apply_impulse(impulse, true));
    }

    /// Apply an impulse (pixel-scaled) at a world point (pixels).
    pub fn apply_impulse_at_point(&mut self, id: BehaviorId, impulse_px: Vec3, point_px: Vec3) {
        let impulse = self.units.vec_to_sim(impulse_px);
        let point = self.units.point_to_sim(point_px.into());
        self.with_body_mut(id, |body| body.apply_impulse_at_point(impulse, point, true));
    }

    /// Apply a continuous force (pixel-scaled) at the center of mass. The
    /// force persists until the solver resets it after the step.
    pub fn apply_force(&mut self, id: BehaviorId, force_px: Vec3) {
        let force = self.units.vec_to_sim(force_px);
        self.with_body_mut(id, |body| body.add_force(force, true));
    }

    /// Apply an angular impulse (simulation units).
    pub fn apply_angular_impulse(&mut self, id: BehaviorId, impulse: Vec3) {
        self.with_body_mut(id, |body| body.apply_torque_impulse(impulse, true));
    }

    /// Body mass in mass units; zero until the body exists.
    pub fn mass(&self, id: BehaviorId) -> f32 {
        self.with_body(id, 0.0, |body, _| body.mass())
    }

    /// World-space center of mass in pixels.
    pub fn center_of_mass(&self, id: BehaviorId) -> Vec3 {
        self.with_body(id, Vec3::zeros(), |body, units| {
            units.vec_to_view(body.center_of_mass().coords)
        })
    }

    /// Principal angular inertia around the body's local axes; zero until the
    /// body exists or for axes with locked rotation.
    pub fn principal_inertia(&self, id: BehaviorId) -> Vec3 {
        self.with_body(id, Vec3::zeros(), |body, _| {
            body.mass_properties()
                .local_mprops
                .inv_principal_inertia
                .map(|inv| if inv > 0.0 { 1.0 / inv } else { 0.0 })
        })
    }

    pub fn wake_body(&mut self, id: BehaviorId) {
        self.with_body_mut(id, |body| body.wake_up(true));
    }

    fn with_body<T>(
        &self,
        id: BehaviorId,
        fallback: T,
        f: impl FnOnce(&RigidBody, &UnitScale) -> T,
    ) -> T {
        self.behaviors
            .get(&id)
            .and_then(|b| b.body)
            .and_then(|h| self.bodies.get(h))
            .map(|body| f(body, &self.units))
            .unwrap_or(fallback)
    }

    fn with_body_mut(&mut self, id: BehaviorId, f: impl FnOnce(&mut RigidBody)) {
        if let Some(body) = self
            .behaviors
            .get(&id)
            .and_then(|b| b.body)
            .and_then(|h| self.bodies.get_mut(h))
        {
            f(body);
        }
    }

    // ----------------------------------------------------- material setters

    pub fn set_friction(&mut self, id: BehaviorId, friction: f32) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.friction = friction;
            if let Some(collider) = behavior.collider.and_then(|h| self.colliders.get_mut(h)) {
                collider.set_friction(friction);
            }
        }
        self.wake_body(id);
    }

    pub fn set_restitution(&mut self, id: BehaviorId, restitution: f32) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.restitution = restitution;
            if let Some(collider) = behavior.collider.and_then(|h| self.colliders.get_mut(h)) {
                collider.set_restitution(restitution);
            }
        }
        self.wake_body(id);
    }

    pub fn set_linear_damping(&mut self, id: BehaviorId, damping: f32) {
        let damping = damping.max(0.0);
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.linear_damping = damping;
        }
        self.with_body_mut(id, |body| body.set_linear_damping(damping));
    }

    pub fn set_angular_damping(&mut self, id: BehaviorId, damping: f32) {
        let damping = damping.max(0.0);
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.angular_damping = damping;
        }
        self.with_body_mut(id, |body| body.set_angular_damping(damping));
    }

    pub fn set_gravity_scale(&mut self, id: BehaviorId, scale: f32) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.gravity_scale = scale;
        }
        self.with_body_mut(id, |body| body.set_gravity_scale(scale, true));
    }

    /// Density changes require recomputed mass properties, so the shape is
    /// rebuilt before the next step.
    pub fn set_density(&mut self, id: BehaviorId, density: f32) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.density = density.max(1.0e-4);
            behavior.needs_shape_recreate = true;
        }
    }

    pub fn set_mass_override(&mut self, id: BehaviorId, mass: f32) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.mass_override = mass.max(0.0);
            behavior.needs_body_recreate = true;
        }
    }

    pub fn set_bullet(&mut self, id: BehaviorId, bullet: bool) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            if behavior.config.bullet != bullet {
                behavior.config.bullet = bullet;
                behavior.needs_body_recreate = true;
            }
        }
    }

    pub fn set_fixed_rotation(&mut self, id: BehaviorId, fixed: bool) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            if behavior.config.fixed_rotation != fixed {
                behavior.config.fixed_rotation = fixed;
                behavior.needs_body_recreate = true;
            }
        }
    }

    /// Toggle a layer bit. Layer membership affects broad-phase grouping, so
    /// the body is rebuilt.
    pub fn enable_layer(&mut self, id: BehaviorId, layer: u8, enable: bool) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            if enable {
                behavior.config.layers.layers.add(layer);
            } else {
                behavior.config.layers.layers.remove(layer);
            }
            behavior.needs_body_recreate = true;
        }
    }

    /// Toggle a mask bit. See [`PhysicsWorld::enable_layer`].
    pub fn enable_mask(&mut self, id: BehaviorId, mask: u8, enable: bool) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            if enable {
                behavior.config.layers.masks.add(mask);
            } else {
                behavior.config.layers.masks.remove(mask);
            }
            behavior.needs_body_recreate = true;
        }
    }

    pub fn set_shape_scale(&mut self, id: BehaviorId, scale: f32) {
        if scale <= 0.0 {
            return;
        }
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            if behavior.config.shape.scale != scale {
                behavior.config.shape.scale = scale;
                behavior.needs_shape_recreate = true;
            }
        }
    }

    pub fn set_shape_offset(&mut self, id: BehaviorId, offset_px: Vec3) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.shape.offset = offset_px;
            behavior.needs_shape_recreate = true;
        }
    }

    // ------------------------------------------------------------------ sync

    /// Snapshot the solver state for remote/replay synchronization. `None`
    /// until the body exists.
    pub fn sync_state(&self, id: BehaviorId) -> Option<BodySyncState> {
        let behavior = self.behaviors.get(&id)?;
        let body = behavior.body.and_then(|h| self.bodies.get(h))?;
        let pose = body.position();
        Some(BodySyncState {
            position: pose.translation.vector,
            rotation: pose.rotation,
            linear_velocity: *body.linvel(),
            angular_velocity: *body.angvel(),
            awake: !body.is_sleeping(),
            layers: behavior.config.layers.layers.bits,
            masks: behavior.config.layers.masks.bits,
        })
    }

    /// Apply a sync payload: forces a full shape+body rebuild, then lands the
    /// transform, velocities and activation state on the fresh body.
    pub fn apply_sync_state(
        &mut self,
        id: BehaviorId,
        state: &BodySyncState,
        scene: &dyn ObjectModel,
    ) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.config.layers.layers.bits = state.layers;
            behavior.config.layers.masks.bits = state.masks;
            behavior.needs_shape_recreate = true;
            behavior.needs_body_recreate = true;
        } else {
            return;
        }
        self.recreate_body(
            id,
            scene,
            Some((state.linear_velocity, state.angular_velocity)),
        );
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.needs_body_recreate = false;
            behavior.needs_shape_recreate = false;
        }
        let pose = Transform::new(state.position, state.rotation).iso();
        let awake = state.awake;
        self.with_body_mut(id, |body| {
            body.set_position(pose, awake);
            if awake {
                body.wake_up(true);
            } else {
                body.sleep();
            }
        });
    }

    /// The object owning a behavior, mainly for callers resolving contacts.
    pub fn behavior_object(&self, id: BehaviorId) -> Option<ObjectId> {
        self.behaviors.get(&id).map(|b| b.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyType;
    use crate::object::{ObjectKind, SceneObjects};

    const DT: f32 = 1.0 / 60.0;

    fn world_and_scene() -> (PhysicsWorld, SceneObjects) {
        (
            PhysicsWorld::new(Vec3::new(0.0, -9.81, 0.0), 100.0),
            SceneObjects::new(),
        )
    }

    fn spawn_box(
        world: &mut PhysicsWorld,
        scene: &mut SceneObjects,
        name: &str,
        position: Vec3,
    ) -> (BehaviorId, crate::object::ObjectId) {
        let object = scene.spawn(name, ObjectKind::Box3D, position, Vec3::new(100.0, 100.0, 100.0));
        let behavior = world.register_behavior(BehaviorConfig::default(), object);
        (behavior, object)
    }

    /// Run one full frame: step + finish.
    fn run_frame(world: &mut PhysicsWorld, scene: &mut SceneObjects) {
        world.step(DT, scene);
        world.finish_frame(scene);
    }

    #[test]
    fn first_frame_never_steps() {
        let (mut world, mut scene) = world_and_scene();
        let (id, object) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 500.0, 0.0));
        run_frame(&mut world, &mut scene);
        // The body was not even created: the first frame is a no-op.
        assert!(world.behavior(id).unwrap().body_handle().is_none());
        assert_eq!(scene.position(object), Vec3::new(0.0, 500.0, 0.0));
    }

    #[test]
    fn stepping_twice_per_frame_integrates_once() {
        let (mut world, mut scene) = world_and_scene();
        let (_, object) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 500.0, 0.0));
        run_frame(&mut world, &mut scene);

        world.step(DT, &mut scene);
        let after_first = scene.position(object);
        // A second step request in the same frame must be a no-op.
        world.step(DT, &mut scene);
        assert_eq!(scene.position(object), after_first);
        world.finish_frame(&mut scene);

        world.step(DT, &mut scene);
        assert!(scene.position(object).y < after_first.y, "gravity should act");
    }

    #[test]
    fn dynamic_body_falls_under_gravity() {
        let (mut world, mut scene) = world_and_scene();
        let (_, object) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 500.0, 0.0));
        for _ in 0..30 {
            run_frame(&mut world, &mut scene);
        }
        assert!(scene.position(object).y < 500.0);
    }

    #[test]
    fn static_body_is_never_pulled() {
        let (mut world, mut scene) = world_and_scene();
        let object = scene.spawn(
            "Floor",
            ObjectKind::Box3D,
            Vec3::zeros(),
            Vec3::new(1000.0, 100.0, 1000.0),
        );
        let config = BehaviorConfig {
            body_type: BodyType::Static,
            ..BehaviorConfig::default()
        };
        world.register_behavior(config, object);
        for _ in 0..10 {
            run_frame(&mut world, &mut scene);
        }
        assert_eq!(scene.position(object), Vec3::zeros());
    }

    #[test]
    fn contacts_are_tracked_between_touching_bodies() {
        let (mut world, mut scene) = world_and_scene();
        let floor_object = scene.spawn(
            "Floor",
            ObjectKind::Box3D,
            Vec3::new(0.0, -100.0, 0.0),
            Vec3::new(2000.0, 100.0, 2000.0),
        );
        let floor = world.register_behavior(
            BehaviorConfig {
                body_type: BodyType::Static,
                ..BehaviorConfig::default()
            },
            floor_object,
        );
        let (falling, _) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 80.0, 0.0));

        let mut touched = false;
        for _ in 0..120 {
            run_frame(&mut world, &mut scene);
            if world.are_colliding(falling, floor) {
                touched = true;
                break;
            }
        }
        assert!(touched, "falling box should land on the floor");
        assert!(world.are_colliding(floor, falling), "contact is symmetric");
    }

    #[test]
    fn destroying_a_behavior_releases_its_body() {
        let (mut world, mut scene) = world_and_scene();
        let (id, _) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 100.0, 0.0));
        run_frame(&mut world, &mut scene);
        run_frame(&mut world, &mut scene);
        assert!(world.behavior(id).unwrap().body_handle().is_some());
        world.destroy_behavior(id);
        assert!(world.behavior(id).is_none());
        assert_eq!(world.bodies.len(), 0);
    }

    #[test]
    fn sync_payload_round_trips_body_state() {
        let (mut world, mut scene) = world_and_scene();
        let (source, _) = spawn_box(&mut world, &mut scene, "A", Vec3::new(0.0, 300.0, 0.0));
        let (replica, _) = spawn_box(&mut world, &mut scene, "B", Vec3::new(500.0, 300.0, 0.0));
        for _ in 0..5 {
            run_frame(&mut world, &mut scene);
        }
        world.set_linear_velocity(source, Vec3::new(120.0, -30.0, 40.0));
        world.set_angular_velocity(source, Vec3::new(10.0, 20.0, -5.0));

        let state = world.sync_state(source).expect("source body exists");
        world.apply_sync_state(replica, &state, &scene);
        let applied = world.sync_state(replica).expect("replica body exists");

        assert!((applied.position - state.position).norm() < 1.0e-4);
        assert!(applied.rotation.angle_to(&state.rotation) < 1.0e-4);
        assert!((applied.linear_velocity - state.linear_velocity).norm() < 1.0e-4);
        assert!((applied.angular_velocity - state.angular_velocity).norm() < 1.0e-4);
    }

    #[test]
    fn can_collide_honors_masks() {
        let (mut world, mut scene) = world_and_scene();
        let (a, _) = spawn_box(&mut world, &mut scene, "A", Vec3::zeros());
        let (b, _) = spawn_box(&mut world, &mut scene, "B", Vec3::zeros());
        assert!(world.can_collide(a, b));
        // Clearing every mask bit on A makes the pair incompatible.
        for bit in 0..8 {
            world.enable_mask(a, bit, false);
        }
        assert!(!world.can_collide(a, b));
    }

    #[test]
    fn velocity_accessors_round_trip_in_pixels() {
        let (mut world, mut scene) = world_and_scene();
        let (id, _) = spawn_box(&mut world, &mut scene, "Crate", Vec3::new(0.0, 500.0, 0.0));
        run_frame(&mut world, &mut scene);
        run_frame(&mut world, &mut scene);
        world.set_linear_velocity(id, Vec3::new(250.0, 0.0, 0.0));
        assert!((world.linear_velocity(id).x - 250.0).abs() < 1.0e-3);
        world.set_angular_velocity(id, Vec3::new(0.0, 90.0, 0.0));
        assert!((world.angular_velocity(id).y - 90.0).abs() < 1.0e-3);
    }
}
