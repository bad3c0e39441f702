/*!
Host object-model contract.

The physics layer reads and writes game-object state through this narrow
accessor trait: center position, world orientation, box dimensions, name and
object kind. The host maps its own scene representation to this contract,
then hands a mutable reference to [`crate::world::PhysicsWorld::step`] each
frame.

Conventions
- Positions and dimensions are in presentation units (pixels).
- `ObjectId` is a stable unique identifier; ids are never reused while the
  scene lives.
- Mesh collision data is optional and only consulted for static mesh shapes.
*/

use std::collections::HashMap;

use crate::types::{Point3, Quat, Vec3};

/// Stable unique identifier of a game object within its scene.
pub type ObjectId = u64;

/// Object kinds relevant to the physics layer.
///
/// Joints (and the joint editor) are only supported between box and model
/// objects; everything else is `Other` and is rejected with a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Box3D,
    Model3D,
    Other,
}

impl ObjectKind {
    /// Whether joints may be attached to objects of this kind.
    #[inline]
    pub fn supports_joints(self) -> bool {
        matches!(self, ObjectKind::Box3D | ObjectKind::Model3D)
    }
}

/// One triangle-soup part of a model's collision geometry.
///
/// Vertices are expressed in unit-cube-local space (the model stretched into
/// `[-0.5, 0.5]` on each axis); the shape builder scales them by the object's
/// current box dimensions. Parts without indices are treated as sequential
/// triangles.
#[derive(Clone, Debug, Default)]
pub struct TriangleMeshPart {
    pub vertices: Vec<Point3>,
    pub indices: Option<Vec<[u32; 3]>>,
}

/// Narrow accessor contract the physics layer uses to read/write objects.
pub trait ObjectModel {
    /// Whether the object still exists in the scene.
    fn contains(&self, id: ObjectId) -> bool;

    /// Object name (used to resolve joint-editor targets).
    fn name(&self, id: ObjectId) -> &str;

    /// Object kind, used to gate joint support.
    fn kind(&self, id: ObjectId) -> ObjectKind;

    /// Center position in the scene (pixels).
    fn position(&self, id: ObjectId) -> Vec3;

    /// Move the object so its center lands on `position_px`.
    fn set_position(&mut self, id: ObjectId, position_px: Vec3);

    /// World-space orientation.
    fn orientation(&self, id: ObjectId) -> Quat;

    /// Set the world-space orientation.
    fn set_orientation(&mut self, id: ObjectId, rotation: Quat);

    /// Current box dimensions (width, height, depth) in pixels.
    fn box_dimensions(&self, id: ObjectId) -> Vec3;

    /// Collision triangles for model objects, if any.
    fn collision_triangles(&self, _id: ObjectId) -> Option<Vec<TriangleMeshPart>> {
        None
    }
}

/// A minimal in-memory object store implementing [`ObjectModel`].
///
/// Hosts with their own scene graph implement the trait directly; this store
/// is the reference implementation and the scene used by the crate's tests.
#[derive(Default)]
pub struct SceneObjects {
    objects: HashMap<ObjectId, SceneObject>,
    next_id: ObjectId,
}

struct SceneObject {
    name: String,
    kind: ObjectKind,
    position: Vec3,
    orientation: Quat,
    dimensions: Vec3,
    triangles: Option<Vec<TriangleMeshPart>>,
}

impl SceneObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an object and return its id.
    pub fn spawn(
        &mut self,
        name: &str,
        kind: ObjectKind,
        position_px: Vec3,
        dimensions_px: Vec3,
    ) -> ObjectId {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(
            id,
            SceneObject {
                name: name.to_string(),
                kind,
                position: position_px,
                orientation: Quat::identity(),
                dimensions: dimensions_px,
                triangles: None,
            },
        );
        id
    }

    /// Remove an object from the scene.
    pub fn despawn(&mut self, id: ObjectId) {
        self.objects.remove(&id);
    }

    /// Attach collision triangles to a model object.
    pub fn set_collision_triangles(&mut self, id: ObjectId, parts: Vec<TriangleMeshPart>) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.triangles = Some(parts);
        }
    }

    /// Resize an object's box dimensions.
    pub fn set_box_dimensions(&mut self, id: ObjectId, dimensions_px: Vec3) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.dimensions = dimensions_px;
        }
    }
}

impl ObjectModel for SceneObjects {
    fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    fn name(&self, id: ObjectId) -> &str {
        self.objects.get(&id).map(|o| o.name.as_str()).unwrap_or("")
    }

    fn kind(&self, id: ObjectId) -> ObjectKind {
        self.objects
            .get(&id)
            .map(|o| o.kind)
            .unwrap_or(ObjectKind::Other)
    }

    fn position(&self, id: ObjectId) -> Vec3 {
        self.objects.get(&id).map(|o| o.position).unwrap_or_default()
    }

    fn set_position(&mut self, id: ObjectId, position_px: Vec3) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.position = position_px;
        }
    }

    fn orientation(&self, id: ObjectId) -> Quat {
        self.objects
            .get(&id)
            .map(|o| o.orientation)
            .unwrap_or_else(Quat::identity)
    }

    fn set_orientation(&mut self, id: ObjectId, rotation: Quat) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.orientation = rotation;
        }
    }

    fn box_dimensions(&self, id: ObjectId) -> Vec3 {
        self.objects
            .get(&id)
            .map(|o| o.dimensions)
            .unwrap_or_default()
    }

    fn collision_triangles(&self, id: ObjectId) -> Option<Vec<TriangleMeshPart>> {
        self.objects.get(&id).and_then(|o| o.triangles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_assigns_unique_monotonic_ids() {
        let mut scene = SceneObjects::new();
        let a = scene.spawn("A", ObjectKind::Box3D, Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let b = scene.spawn("B", ObjectKind::Box3D, Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert_ne!(a, b);
        assert!(scene.contains(a));
        assert!(scene.contains(b));
    }

    #[test]
    fn missing_objects_return_defaults() {
        let scene = SceneObjects::new();
        assert!(!scene.contains(42));
        assert_eq!(scene.name(42), "");
        assert_eq!(scene.kind(42), ObjectKind::Other);
        assert_eq!(scene.position(42), Vec3::zeros());
    }

    #[test]
    fn only_box_and_model_objects_support_joints() {
        assert!(ObjectKind::Box3D.supports_joints());
        assert!(ObjectKind::Model3D.supports_joints());
        assert!(!ObjectKind::Other.supports_joints());
    }
}
