/*!
Declarative joint binding driven by behavior configuration.

A behavior whose joint editor is enabled describes a single joint (target
object name, kind, per-side anchor offsets, axis, limits). Once per frame
the binding reconciles itself against the scene:

- With the editor off, an unsupported owner object or no usable
  target/kind configuration, any owned joint is torn down and the preview
  hidden.
- Otherwise the best target instance is resolved by name, preferring the
  previously chosen instance while it stays valid and the nearest one
  otherwise.
- An owned joint that no longer matches the resolved bodies, kind or target
  identity is removed and recreated. A matching joint that already exists
  between the two bodies is adopted instead of duplicated, but ownership is
  only claimed for joints this binding created itself, so it never destroys
  a joint another instance manages.

The debug preview is renderer-agnostic geometry (a link line, an axis
segment and three markers) kept up to date whenever previewing is enabled
and a target resolves, independent of whether the joint is owned.
*/

use crate::body::BehaviorId;
use crate::joints::{INVALID_JOINT, JointId, JointKind};
use crate::object::{ObjectId, ObjectModel};
use crate::types::{Vec3, normalize_or_zero};
use crate::world::PhysicsWorld;

/// Joint-editor configuration carried by each behavior. Distances are in
/// pixels, angles in degrees.
#[derive(Clone, Debug)]
pub struct JointEditorConfig {
    pub enabled: bool,
    /// Name of the object to bind to; empty disables the binding.
    pub target_object: String,
    /// Joint kind to create; `None` disables the binding. `Pulley` is not
    /// supported by the editor.
    pub kind: Option<JointKind>,
    /// Local anchor offset on this behavior's side.
    pub anchor_offset: Vec3,
    /// Local anchor offset on the target's side.
    pub target_anchor_offset: Vec3,
    pub use_custom_axis: bool,
    pub axis: Vec3,
    pub hinge_min_angle: f32,
    pub hinge_max_angle: f32,
    /// Distance-joint band; both zero derives it from the current
    /// separation.
    pub distance_min: f32,
    pub distance_max: f32,
    pub preview_enabled: bool,
    pub preview_size: f32,
}

impl Default for JointEditorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_object: String::new(),
            kind: None,
            anchor_offset: Vec3::zeros(),
            target_anchor_offset: Vec3::zeros(),
            use_custom_axis: false,
            axis: Vec3::new(1.0, 0.0, 0.0),
            hinge_min_angle: -60.0,
            hinge_max_angle: 60.0,
            distance_min: 0.0,
            distance_max: 0.0,
            preview_enabled: true,
            preview_size: 8.0,
        }
    }
}

/// Reconciliation state of a joint-editor binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JointEditorState {
    /// Editor off or the owner object is unsupported.
    #[default]
    Disabled,
    /// Enabled but no target resolved this frame.
    NoTarget,
    /// Bound to a joint another instance (or script) created.
    BoundDiscovered,
    /// Bound to a joint this binding created and owns.
    BoundOwned,
}

/// Preview marker colors (RGBA), in sync with the editor defaults.
pub const PREVIEW_LINK_COLOR: [u8; 4] = [0x3a, 0xa6, 0xff, 204];
pub const PREVIEW_AXIS_COLOR: [u8; 4] = [0xff, 0xa9, 0x3a, 230];
pub const PREVIEW_SOURCE_COLOR: [u8; 4] = [0x2e, 0xcc, 0x71, 230];
pub const PREVIEW_TARGET_COLOR: [u8; 4] = [0xe7, 0x4c, 0x3c, 230];
pub const PREVIEW_ANCHOR_COLOR: [u8; 4] = [0xf1, 0xc4, 0x0f, 242];

/// Renderer-agnostic joint preview geometry (pixels). The host draws a line
/// from `source` to `target`, an axis segment from `anchor` to `axis_end`,
/// and sphere markers at the three points.
#[derive(Clone, Copy, Debug, Default)]
pub struct JointPreview {
    pub visible: bool,
    pub source: Vec3,
    pub target: Vec3,
    pub anchor: Vec3,
    pub axis_end: Vec3,
    /// Radius of the source/target markers.
    pub marker_scale: f32,
    /// Radius of the anchor marker (slightly larger).
    pub anchor_scale: f32,
}

/// Runtime state of one behavior's joint-editor binding.
#[derive(Clone, Debug, Default)]
pub struct JointEditorBinding {
    pub(crate) owned_joint: JointId,
    pub(crate) owned_target: ObjectId,
    pub(crate) owns_joint: bool,
    pub(crate) logged_unsupported: bool,
    pub(crate) state: JointEditorState,
    pub(crate) preview: JointPreview,
}

impl JointEditorBinding {
    /// Drop all references without touching the joint registry.
    pub(crate) fn reset(&mut self) {
        self.owned_joint = INVALID_JOINT;
        self.owned_target = 0;
        self.owns_joint = false;
    }

    pub fn state(&self) -> JointEditorState {
        self.state
    }

    pub fn preview(&self) -> &JointPreview {
        &self.preview
    }
}

/// World-space anchors and axis computed for a binding, in pixels.
struct EditorAnchors {
    source: Vec3,
    target: Vec3,
    anchor: Vec3,
    axis: Vec3,
    distance: f32,
}

impl PhysicsWorld {
    // ------------------------------------------------------- config setters

    pub fn set_joint_editor_enabled(&mut self, id: BehaviorId, enabled: bool) {
        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        behavior.config.joint_editor.enabled = enabled;
        if !enabled {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
        }
    }

    pub fn set_joint_editor_target(&mut self, id: BehaviorId, target_object: &str) {
        let name = target_object.trim().to_string();
        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        if behavior.config.joint_editor.target_object == name {
            return;
        }
        behavior.config.joint_editor.target_object = name;
        self.clear_editor_owned_joint(id);
    }

    pub fn set_joint_editor_kind(&mut self, id: BehaviorId, kind: Option<JointKind>) {
        let kind = match kind {
            Some(JointKind::Pulley) => {
                log::warn!("pulley joints are not supported by the joint editor");
                None
            }
            other => other,
        };
        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        if behavior.config.joint_editor.kind == kind {
            return;
        }
        behavior.config.joint_editor.kind = kind;
        self.clear_editor_owned_joint(id);
    }

    /// Replace the whole editor configuration. Changes that affect the bound
    /// joint (target, kind, anchors, axis, limits) tear the owned joint down
    /// so it is recreated on the next reconciliation.
    pub fn configure_joint_editor(&mut self, id: BehaviorId, config: JointEditorConfig) {
        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        let old = &behavior.config.joint_editor;
        let affects_joint = old.target_object != config.target_object
            || old.kind != config.kind
            || old.anchor_offset != config.anchor_offset
            || old.target_anchor_offset != config.target_anchor_offset
            || old.use_custom_axis != config.use_custom_axis
            || old.axis != config.axis
            || old.hinge_min_angle != config.hinge_min_angle
            || old.hinge_max_angle != config.hinge_max_angle
            || old.distance_min != config.distance_min
            || old.distance_max != config.distance_max
            || (old.enabled && !config.enabled);
        behavior.config.joint_editor = config;
        if affects_joint {
            self.clear_editor_owned_joint(id);
        }
    }

    /// The editor state of a behavior, for tooling and tests.
    pub fn joint_editor_state(&self, id: BehaviorId) -> JointEditorState {
        self.behaviors
            .get(&id)
            .map(|b| b.editor.state)
            .unwrap_or_default()
    }

    /// The joint the binding currently tracks, owned or discovered.
    pub fn joint_editor_joint(&self, id: BehaviorId) -> JointId {
        self.behaviors
            .get(&id)
            .map(|b| b.editor.owned_joint)
            .unwrap_or(INVALID_JOINT)
    }

    pub fn joint_editor_preview(&self, id: BehaviorId) -> Option<&JointPreview> {
        self.behaviors.get(&id).map(|b| &b.editor.preview)
    }

    // ------------------------------------------------------------- teardown

    /// Remove the binding's joint if this binding created it, then drop all
    /// references. A merely discovered joint is left alive.
    pub(crate) fn clear_editor_owned_joint(&mut self, id: BehaviorId) {
        let Some(behavior) = self.behaviors.get_mut(&id) else {
            return;
        };
        let owned = behavior.editor.owned_joint;
        let owns = behavior.editor.owns_joint;
        behavior.editor.reset();
        if owns && owned != INVALID_JOINT {
            self.remove_joint_internal(owned, false);
        }
    }

    /// Forget a joint in every binding referencing it (the joint itself is
    /// being removed elsewhere).
    pub(crate) fn clear_editor_ownership_of(&mut self, joint: JointId) {
        if joint == INVALID_JOINT {
            return;
        }
        for behavior in self.behaviors.values_mut() {
            if behavior.editor.owned_joint == joint {
                behavior.editor.reset();
            }
        }
    }

    fn hide_editor_preview(&mut self, id: BehaviorId) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.editor.preview.visible = false;
        }
    }

    fn set_editor_state(&mut self, id: BehaviorId, state: JointEditorState) {
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.editor.state = state;
        }
    }

    // -------------------------------------------------------- reconciliation

    /// Reconcile one behavior's joint-editor binding against the scene.
    /// Called by [`PhysicsWorld::finish_frame`] for every behavior.
    pub(crate) fn sync_joint_editor(&mut self, id: BehaviorId, scene: &dyn ObjectModel) {
        let Some(behavior) = self.behaviors.get(&id) else {
            return;
        };
        let enabled = behavior.config.joint_editor.enabled && behavior.activated;
        let object = behavior.object;
        if !enabled {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::Disabled);
            return;
        }

        if !scene.contains(object) || !scene.kind(object).supports_joints() {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::Disabled);
            if let Some(behavior) = self.behaviors.get_mut(&id) {
                if !behavior.editor.logged_unsupported {
                    behavior.editor.logged_unsupported = true;
                    log::warn!(
                        "joint editor only supports box and model objects; \"{}\" is ignored",
                        scene.name(object)
                    );
                }
            }
            return;
        }
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.editor.logged_unsupported = false;
        }

        let config = self
            .behaviors
            .get(&id)
            .map(|b| b.config.joint_editor.clone())
            .unwrap_or_default();
        let target_name = config.target_object.trim().to_string();
        let kind = match config.kind {
            Some(JointKind::Pulley) | None => None,
            other => other,
        };
        let Some(kind) = kind else {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        };
        if target_name.is_empty() {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        }

        if self.ensure_body(id, scene).is_none() {
            self.hide_editor_preview(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        }

        let Some(target) = self.find_best_editor_target(id, &target_name, scene) else {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        };
        if self.ensure_body(target, scene).is_none() {
            self.hide_editor_preview(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        }

        let (Some(body_a), Some(body_b)) = (
            self.behaviors.get(&id).and_then(|b| b.body),
            self.behaviors.get(&target).and_then(|b| b.body),
        ) else {
            self.hide_editor_preview(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        };
        if body_a == body_b {
            self.hide_editor_preview(id);
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        }

        let target_object = self.behaviors.get(&target).map(|b| b.object).unwrap_or(0);
        self.update_editor_preview(id, target, &config, scene);

        // Reconcile a previously tracked joint against the resolved pair.
        let (mut tracked, mut owns, tracked_target) = self
            .behaviors
            .get(&id)
            .map(|b| (b.editor.owned_joint, b.editor.owns_joint, b.editor.owned_target))
            .unwrap_or((INVALID_JOINT, false, 0));
        if tracked != INVALID_JOINT {
            let matches = self.joints.get(&tracked).is_some_and(|joint| {
                let same_bodies = (joint.body_a == body_a && joint.body_b == body_b)
                    || (joint.body_a == body_b && joint.body_b == body_a);
                same_bodies && joint.kind == kind && tracked_target == target_object
            });
            if !matches {
                if let Some(behavior) = self.behaviors.get_mut(&id) {
                    behavior.editor.reset();
                }
                if owns && self.joints.contains_key(&tracked) {
                    self.remove_joint_internal(tracked, false);
                }
                tracked = INVALID_JOINT;
                owns = false;
            }
        }
        if tracked != INVALID_JOINT {
            self.apply_automatic_joint_tuning(id, tracked);
            self.set_editor_state(
                id,
                if owns {
                    JointEditorState::BoundOwned
                } else {
                    JointEditorState::BoundDiscovered
                },
            );
            return;
        }

        // Adopt an existing joint of the right kind between the two bodies;
        // ownership stays with whoever created it.
        let existing = self.find_joint_between_bodies(body_a, body_b, Some(kind));
        if existing != INVALID_JOINT {
            if let Some(behavior) = self.behaviors.get_mut(&id) {
                behavior.editor.owned_joint = existing;
                behavior.editor.owned_target = target_object;
                behavior.editor.owns_joint = false;
            }
            self.apply_automatic_joint_tuning(id, existing);
            self.set_editor_state(id, JointEditorState::BoundDiscovered);
            return;
        }

        let created = self.create_editor_joint(id, target, kind, &config, scene);
        if created == INVALID_JOINT {
            self.clear_editor_owned_joint(id);
            self.set_editor_state(id, JointEditorState::NoTarget);
            return;
        }
        if let Some(behavior) = self.behaviors.get_mut(&id) {
            behavior.editor.owned_joint = created;
            behavior.editor.owned_target = target_object;
            behavior.editor.owns_joint = true;
        }
        self.set_editor_state(id, JointEditorState::BoundOwned);
    }

    /// Resolve the best target instance by name: the previously chosen
    /// instance while it stays valid, otherwise the nearest one.
    fn find_best_editor_target(
        &mut self,
        source: BehaviorId,
        target_name: &str,
        scene: &dyn ObjectModel,
    ) -> Option<BehaviorId> {
        let source_object = self.behaviors.get(&source)?.object;
        let source_position = scene.position(source_object);
        let preferred = self
            .behaviors
            .get(&source)
            .and_then(|b| b.preferred_targets.get(target_name).copied());

        let mut best: Option<(BehaviorId, f32)> = None;
        let mut sticky: Option<BehaviorId> = None;
        for (&candidate_id, candidate) in &self.behaviors {
            if candidate_id == source || !candidate.activated {
                continue;
            }
            let object = candidate.object;
            if !scene.contains(object)
                || scene.name(object) != target_name
                || !scene.kind(object).supports_joints()
            {
                continue;
            }
            if preferred == Some(object) {
                sticky = Some(candidate_id);
            }
            let distance = (scene.position(object) - source_position).norm_squared();
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((candidate_id, distance));
            }
        }

        let chosen = sticky.or(best.map(|(id, _)| id))?;
        let chosen_object = self.behaviors.get(&chosen)?.object;
        if let Some(behavior) = self.behaviors.get_mut(&source) {
            behavior
                .preferred_targets
                .insert(target_name.to_string(), chosen_object);
        }
        Some(chosen)
    }

    /// Anchors from per-side local offsets rotated into world space, the
    /// midpoint anchor, and the joint axis (custom or source-to-target).
    fn compute_editor_anchors(
        &self,
        source: BehaviorId,
        target: BehaviorId,
        config: &JointEditorConfig,
        scene: &dyn ObjectModel,
    ) -> EditorAnchors {
        let source_center = self.center_of_mass(source);
        let target_center = self.center_of_mass(target);
        let source_rotation = self
            .behaviors
            .get(&source)
            .map(|b| scene.orientation(b.object))
            .unwrap_or_else(crate::types::Quat::identity);
        let target_rotation = self
            .behaviors
            .get(&target)
            .map(|b| scene.orientation(b.object))
            .unwrap_or_else(crate::types::Quat::identity);

        let source_point = source_center + source_rotation * config.anchor_offset;
        let target_point = target_center + target_rotation * config.target_anchor_offset;
        let anchor = (source_point + target_point) * 0.5;

        let (auto_axis, auto_length) = normalize_or_zero(target_point - source_point);
        let mut axis = auto_axis;
        if config.use_custom_axis {
            let (custom, length) = normalize_or_zero(config.axis);
            if length > 0.0 {
                axis = custom;
            }
        } else if auto_length <= 0.0 {
            axis = Vec3::new(1.0, 0.0, 0.0);
        }

        EditorAnchors {
            source: source_point,
            target: target_point,
            anchor,
            axis,
            distance: (target_point - source_point).norm(),
        }
    }

    /// Create the configured joint with kind-appropriate defaults.
    fn create_editor_joint(
        &mut self,
        source: BehaviorId,
        target: BehaviorId,
        kind: JointKind,
        config: &JointEditorConfig,
        scene: &dyn ObjectModel,
    ) -> JointId {
        let anchors = self.compute_editor_anchors(source, target, config, scene);
        let hinge_min = config.hinge_min_angle.min(config.hinge_max_angle);
        let hinge_max = config.hinge_min_angle.max(config.hinge_max_angle);

        match kind {
            JointKind::Fixed => {
                let joint = self.add_fixed_joint(source, target, scene);
                self.set_joint_priority(joint, 150);
                joint
            }
            JointKind::Point => self.add_point_joint(source, target, anchors.anchor, scene),
            JointKind::Hinge => {
                let joint =
                    self.add_hinge_joint(source, target, anchors.anchor, anchors.axis, scene);
                self.set_hinge_limits(joint, hinge_min, hinge_max);
                self.set_hinge_friction(joint, 8.0);
                joint
            }
            JointKind::Slider => {
                let joint = self.add_slider_joint(source, target, anchors.axis, scene);
                let range = if config.distance_max > 0.0 {
                    config.distance_max
                } else {
                    anchors.distance * 0.5
                }
                .max(10.0);
                self.set_slider_limits(joint, -range, range);
                self.set_slider_friction(joint, 6.0);
                joint
            }
            JointKind::Distance => {
                let (min, max) = if config.distance_min <= 0.0 && config.distance_max <= 0.0 {
                    // Derive the band from the current separation.
                    let min = (anchors.distance * 0.9).max(0.0);
                    (min, (anchors.distance * 1.1).max(min + 0.01))
                } else {
                    let min = config.distance_min.min(config.distance_max).max(0.0);
                    (min, config.distance_min.max(config.distance_max).max(min + 0.01))
                };
                self.add_distance_joint(source, target, min, max, 2.0, 0.35, scene)
            }
            JointKind::Cone => {
                let half = hinge_min.abs().max(hinge_max.abs()).clamp(5.0, 170.0);
                self.add_cone_joint(source, target, anchors.anchor, anchors.axis, half, scene)
            }
            JointKind::SwingTwist => self.add_swing_twist_joint(
                source,
                target,
                anchors.anchor,
                anchors.axis,
                50.0,
                40.0,
                hinge_min,
                hinge_max,
                scene,
            ),
            JointKind::Pulley => INVALID_JOINT,
        }
    }

    /// Refresh the preview geometry for a resolved target.
    fn update_editor_preview(
        &mut self,
        source: BehaviorId,
        target: BehaviorId,
        config: &JointEditorConfig,
        scene: &dyn ObjectModel,
    ) {
        if !config.preview_enabled {
            self.hide_editor_preview(source);
            return;
        }
        let anchors = self.compute_editor_anchors(source, target, config, scene);
        let size = config.preview_size.max(1.0);
        let axis_length = (size * 3.0).max(20.0);
        let marker_scale = size * 0.6;
        if let Some(behavior) = self.behaviors.get_mut(&source) {
            behavior.editor.preview = JointPreview {
                visible: true,
                source: anchors.source,
                target: anchors.target,
                anchor: anchors.anchor,
                axis_end: anchors.anchor + anchors.axis * axis_length,
                marker_scale,
                anchor_scale: marker_scale * 1.25,
            };
        }
    }
}
