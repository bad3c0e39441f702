/*!
Per-scene 3D physics behaviors on top of rapier3d.

This crate binds game objects to a rigid-body simulation: each object with
physics enabled registers one behavior in the scene's [`PhysicsWorld`],
which owns the solver state and drives the per-frame step. On top of that
sit typed joints with automatic tuning and breakage, ragdoll automation,
a declarative joint-editor binding with a debug preview, contact tracking
and closest-hit ray queries.

The host supplies its object model through the [`object::ObjectModel`]
accessor trait (positions, orientations and box dimensions in presentation
units); all unit conversion to simulation space happens inside this crate.
*/

pub mod body;
pub mod constants;
pub mod joint_editor;
pub mod joints;
pub mod layers;
pub mod object;
pub mod ragdoll;
pub mod raycast;
pub mod shape;
pub mod types;
pub mod units;
pub mod world;

pub use body::{BehaviorConfig, BehaviorId, BodySyncState, BodyType, PhysicsBehavior};
pub use joint_editor::{
    JointEditorBinding, JointEditorConfig, JointEditorState, JointPreview,
};
pub use joints::{
    INVALID_JOINT, JointAutoTuning, JointId, JointKind, JointRuntimeState, MotorState,
    StabilityPreset,
};
pub use layers::CollisionLayers;
pub use object::{ObjectId, ObjectKind, ObjectModel, SceneObjects, TriangleMeshPart};
pub use ragdoll::{HumanoidParts, RagdollId, RagdollMode, RagdollRole, RagdollState};
pub use raycast::RaycastHit;
pub use shape::{ShapeConfig, ShapeKind, ShapeOrientation};
pub use types::{Iso, Point3, Quat, Transform, Vec3};
pub use units::UnitScale;
pub use world::{BeforeStepHook, PhysicsWorld};
