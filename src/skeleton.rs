/*! Joint/bone hierarchy built from a declarative archetype.
 *
 * A [Skeleton] owns two parallel trees built in a single pass: scene-graph
 * joint nodes (usable as mesh parents, stored in a [NodeArena]) and a
 * lightweight [Bone] list (the skinning-oriented counterpart). The trees are
 * isomorphic by construction: a definition may only reference a parent that
 * was created earlier, so archetypes must be topologically sorted with the
 * root first.
 */

use crate::errors::RigError;
use crate::scene::{NodeArena, NodeIndex, Transform};
use itertools::Itertools;
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;
use tracing::debug;

/// One entry of a skeleton archetype. Authored once per character class.
#[derive(Debug, Clone, PartialEq)]
pub struct JointDefinition {
    pub name: String,
    /// `None` is only valid for the first (root) definition.
    pub parent: Option<String>,
    pub local_position: Vector3<f32>,
    /// Rest rotation as an XYZ euler triple; identity when omitted.
    pub local_rotation: Option<Vector3<f32>>,
}

impl JointDefinition {
    pub fn new(name: &str, parent: Option<&str>, local_position: Vector3<f32>) -> Self {
        JointDefinition {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            local_position,
            local_rotation: None,
        }
    }
}

/// Skinning-side counterpart of a joint node. Kept isomorphic to the joint
/// tree; `parent` indexes into [Skeleton::bones].
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub rest_position: Vector3<f32>,
    pub rest_rotation: UnitQuaternion<f32>,
    /// Current local rotation, written by pose application and IK.
    pub rotation: UnitQuaternion<f32>,
}

/// A partial pose: joint name to desired local rotation. Joints not listed
/// are left unchanged. Application composes the authored rest rotation with
/// the requested one (`rest * requested`), never replaces it.
#[derive(Debug, Clone, Default)]
pub struct Pose {
    rotations: HashMap<String, UnitQuaternion<f32>>,
}

impl Pose {
    pub fn new() -> Self {
        Pose::default()
    }

    pub fn set(&mut self, joint: &str, rotation: UnitQuaternion<f32>) {
        self.rotations.insert(joint.to_string(), rotation);
    }

    /// Convenience for authoring: XYZ euler triple in radians.
    pub fn set_euler(&mut self, joint: &str, euler: Vector3<f32>) {
        self.set(joint, UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z));
    }

    pub fn get(&self, joint: &str) -> Option<&UnitQuaternion<f32>> {
        self.rotations.get(joint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UnitQuaternion<f32>)> {
        self.rotations.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}

/// The joint/bone hierarchy of one character. Owns all joint nodes and
/// bones exclusively; consumers address joints by name.
#[derive(Debug)]
pub struct Skeleton {
    arena: NodeArena,
    root: NodeIndex,
    joints: HashMap<String, NodeIndex>,
    bones: Vec<Bone>,
    bone_lookup: HashMap<String, usize>,
    disposed: bool,
}

impl Skeleton {
    /// Builds both trees in one pass over a topologically sorted archetype.
    /// The uniform `scale` multiplies every rest offset.
    pub fn build(definitions: &[JointDefinition], scale: f32) -> Result<Skeleton, RigError> {
        let first = definitions.first().ok_or(RigError::EmptyArchetype)?;
        if let Some(parent) = &first.parent {
            return Err(RigError::UnknownParent {
                joint: first.name.clone(),
                parent: parent.clone(),
            });
        }

        let mut skeleton = Skeleton {
            arena: NodeArena::with_capacity(definitions.len()),
            root: NodeIndex(0),
            joints: HashMap::with_capacity(definitions.len()),
            bones: Vec::with_capacity(definitions.len()),
            bone_lookup: HashMap::with_capacity(definitions.len()),
            disposed: false,
        };
        skeleton.root = skeleton.insert_joint_inner(first, scale, true)?;
        for definition in &definitions[1..] {
            skeleton.insert_joint_inner(definition, scale, false)?;
        }
        debug!(
            joints = skeleton.bones.len(),
            names = ?skeleton.bones.iter().map(|b| &b.name).collect_vec(),
            "skeleton built"
        );
        Ok(skeleton)
    }

    /// Adds one joint (and its paired bone) to an existing skeleton. The
    /// parent must already exist. Used by [Skeleton::build] and by callers
    /// that extend an archetype at assembly time.
    pub fn insert_joint(&mut self, definition: &JointDefinition, scale: f32) -> Result<NodeIndex, RigError> {
        self.insert_joint_inner(definition, scale, false)
    }

    fn insert_joint_inner(
        &mut self,
        definition: &JointDefinition,
        scale: f32,
        is_root: bool,
    ) -> Result<NodeIndex, RigError> {
        if self.joints.contains_key(&definition.name) {
            return Err(RigError::DuplicateJoint(definition.name.clone()));
        }
        let (parent_node, parent_bone) = match (&definition.parent, is_root) {
            (Some(parent), _) => {
                let node = *self
                    .joints
                    .get(parent)
                    .ok_or_else(|| RigError::UnknownParent {
                        joint: definition.name.clone(),
                        parent: parent.clone(),
                    })?;
                (Some(node), Some(self.bone_lookup[parent]))
            }
            (None, true) => (None, None),
            (None, false) => return Err(RigError::OrphanJoint(definition.name.clone())),
        };

        let rest_position = definition.local_position * scale;
        let rest_rotation = definition
            .local_rotation
            .map(|euler| UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z))
            .unwrap_or_else(UnitQuaternion::identity);

        let node = self.arena.insert(
            definition.name.clone(),
            Transform {
                position: rest_position,
                rotation: rest_rotation,
                scale: Vector3::new(1.0, 1.0, 1.0),
            },
            parent_node,
        );
        self.joints.insert(definition.name.clone(), node);
        self.bone_lookup.insert(definition.name.clone(), self.bones.len());
        self.bones.push(Bone {
            name: definition.name.clone(),
            parent: parent_bone,
            rest_position,
            rest_rotation,
            rotation: rest_rotation,
        });
        Ok(node)
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn joint(&self, name: &str) -> Option<NodeIndex> {
        self.joints.get(name).copied()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.bones.iter().map(|bone| bone.name.as_str())
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bone_lookup.get(name).map(|&index| &self.bones[index])
    }

    /// Scene arena holding the joint nodes. Customization and geometry
    /// attachments create their nodes here; they keep ownership of what
    /// they create.
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// Composes rest rotation with the requested rotation for every joint
    /// named in the pose and writes the result to both the joint node and
    /// the paired bone. Unknown names are ignored; a pose may target any
    /// subset of the skeleton.
    pub fn apply_pose(&mut self, pose: &Pose) {
        for (name, requested) in pose.iter() {
            let Some(&bone_index) = self.bone_lookup.get(name) else {
                continue;
            };
            let composed = self.bones[bone_index].rest_rotation * requested;
            self.bones[bone_index].rotation = composed;
            let joint = self.joints.get(name).copied();
            if let Some(node) = joint.and_then(|index| self.arena.get_mut(index)) {
                node.transform.rotation = composed;
            }
        }
    }

    /// Writes a local rotation to one joint and its bone outright (used by
    /// the IK solver, which overrides the animated rotation).
    pub fn set_joint_rotation(&mut self, name: &str, rotation: UnitQuaternion<f32>) {
        if let Some(&bone_index) = self.bone_lookup.get(name) {
            self.bones[bone_index].rotation = rotation;
        }
        let joint = self.joints.get(name).copied();
        if let Some(node) = joint.and_then(|index| self.arena.get_mut(index)) {
            node.transform.rotation = rotation;
        }
    }

    /// Restores every joint to its authored rest position and rotation.
    pub fn reset_pose(&mut self) {
        for bone_index in 0..self.bones.len() {
            let (name, rest_position, rest_rotation) = {
                let bone = &self.bones[bone_index];
                (bone.name.clone(), bone.rest_position, bone.rest_rotation)
            };
            self.bones[bone_index].rotation = rest_rotation;
            let joint = self.joints.get(&name).copied();
            if let Some(node) = joint.and_then(|index| self.arena.get_mut(index)) {
                node.transform.position = rest_position;
                node.transform.rotation = rest_rotation;
            }
        }
    }

    /// Joint position after full parent-chain composition. Returns the zero
    /// vector when the joint is absent; animation code probes joints
    /// opportunistically and must not fail per frame.
    pub fn world_position_of(&self, name: &str) -> Vector3<f32> {
        match self.joints.get(name) {
            Some(&index) => self.arena.world_position(index),
            None => Vector3::zeros(),
        }
    }

    pub fn world_transform_of(&self, name: &str) -> Option<Transform> {
        self.joints.get(name).map(|&index| self.arena.world_transform(index))
    }

    /// Releases all bones, joints and the root node. Idempotent; node
    /// indices held elsewhere go stale but resolve harmlessly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.arena.clear();
        self.joints.clear();
        self.bones.clear();
        self.bone_lookup.clear();
        self.disposed = true;
        debug!("skeleton disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Free-function form of [Skeleton::world_position_of] for callers that
/// only hold the skeleton behind a shared reference.
pub fn world_position_of(skeleton: &Skeleton, name: &str) -> Vector3<f32> {
    skeleton.world_position_of(name)
}

/// Creates an attachment node parented to the named joint, offset from it.
/// Returns `None` (after a warning) when the joint is missing; the caller
/// owns the returned node and removes it on teardown.
pub fn attach_to_joint(
    skeleton: &mut Skeleton,
    node_name: &str,
    joint: &str,
    offset: Vector3<f32>,
) -> Option<NodeIndex> {
    let Some(parent) = skeleton.joint(joint) else {
        tracing::warn!(joint, node = node_name, "attach target joint not found");
        return None;
    };
    Some(
        skeleton
            .arena_mut()
            .insert(node_name, Transform::from_position(offset), Some(parent)),
    )
}

/// The default 12-joint humanoid mech archetype with fixed rest offsets.
/// Topologically sorted, root first, as [Skeleton::build] requires.
pub fn humanoid_archetype() -> Vec<JointDefinition> {
    let joint = JointDefinition::new;
    vec![
        joint("root", None, Vector3::zeros()),
        joint("hips", Some("root"), Vector3::new(0.0, 0.9, 0.0)),
        joint("torso", Some("hips"), Vector3::new(0.0, 0.25, 0.0)),
        joint("head", Some("torso"), Vector3::new(0.0, 0.55, 0.0)),
        joint("armL", Some("torso"), Vector3::new(0.35, 0.4, 0.0)),
        joint("armR", Some("torso"), Vector3::new(-0.35, 0.4, 0.0)),
        joint("handL", Some("armL"), Vector3::new(0.0, -0.55, 0.0)),
        joint("handR", Some("armR"), Vector3::new(0.0, -0.55, 0.0)),
        joint("legL", Some("hips"), Vector3::new(0.15, -0.05, 0.0)),
        joint("legR", Some("hips"), Vector3::new(-0.15, -0.05, 0.0)),
        joint("footL", Some("legL"), Vector3::new(0.0, -0.85, 0.0)),
        joint("footR", Some("legR"), Vector3::new(0.0, -0.85, 0.0)),
    ]
}
