/*! Data-driven customization attachment.
 *
 * Characters are decorated from declarative descriptor lists: auxiliary
 * primitives, grouped sub-assemblies (a weapon cluster with its muzzle
 * light), joint scale overrides and point lights. Descriptors come from
 * validated game data, so this module trusts their numeric content; the
 * only per-descriptor failure mode is an unknown joint name, which is
 * reported and skipped without aborting assembly.
 */

use crate::errors::MissingJoint;
use crate::mesh::{self, MeshData};
use crate::scene::{Light, NodeIndex, Transform};
use crate::skeleton::Skeleton;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Position/rotation/scale block shared by descriptor variants. Rotation
/// is an XYZ euler triple in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for TransformSpec {
    fn default() -> Self {
        TransformSpec {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: unit_scale(),
        }
    }
}

impl TransformSpec {
    /// Converts to a scene transform, multiplying the authored scale by
    /// `scale_multiplier` (the character-level scale; applied exactly once).
    fn to_transform(&self, scale_multiplier: f32) -> Transform {
        Transform {
            position: Vector3::from(self.position),
            rotation: UnitQuaternion::from_euler_angles(self.rotation[0], self.rotation[1], self.rotation[2]),
            scale: Vector3::from(self.scale) * scale_multiplier,
        }
    }
}

/// Geometry kind and its dimensions. Closed set: adding a kind is a
/// compile-time checked change, not a stringly-typed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrimitiveKind {
    Box {
        width: f32,
        height: f32,
        depth: f32,
    },
    Sphere {
        diameter: f32,
        #[serde(default = "default_tessellation")]
        segments: u32,
    },
    Cylinder {
        height: f32,
        diameter_top: f32,
        diameter_bottom: f32,
        #[serde(default = "default_tessellation")]
        tessellation: u32,
    },
    Cone {
        height: f32,
        diameter: f32,
        #[serde(default = "default_tessellation")]
        tessellation: u32,
    },
}

fn default_tessellation() -> u32 {
    8
}

impl PrimitiveKind {
    pub fn build(&self) -> MeshData {
        match *self {
            PrimitiveKind::Box { width, height, depth } => mesh::box_mesh(width, height, depth),
            PrimitiveKind::Sphere { diameter, segments } => {
                mesh::uv_sphere(diameter * 0.5, segments, segments)
            }
            PrimitiveKind::Cylinder {
                height,
                diameter_top,
                diameter_bottom,
                tessellation,
            } => mesh::cylinder(height, diameter_top * 0.5, diameter_bottom * 0.5, tessellation),
            PrimitiveKind::Cone {
                height,
                diameter,
                tessellation,
            } => mesh::cylinder(height, 0.0, diameter * 0.5, tessellation),
        }
    }
}

/// Point light parameters (rasterization is external).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightArgs {
    pub color: [f32; 3],
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_range")]
    pub range: f32,
}

fn default_intensity() -> f32 {
    1.0
}

fn default_range() -> f32 {
    2.0
}

/// Child of a group descriptor; its transform is relative to the group
/// node, not the joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupChild {
    Primitive {
        #[serde(flatten)]
        kind: PrimitiveKind,
        material: String,
        #[serde(default)]
        transform: TransformSpec,
    },
    Light {
        #[serde(flatten)]
        args: LightArgs,
        #[serde(default)]
        transform: TransformSpec,
    },
}

/// One declarative customization instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomizationDescriptor {
    /// Instantiate a primitive mesh and parent it to a joint.
    Primitive {
        #[serde(flatten)]
        kind: PrimitiveKind,
        material: String,
        #[serde(default)]
        transform: TransformSpec,
        parent_joint: String,
    },
    /// Intermediate node under a joint with primitives/lights beneath it.
    Group {
        #[serde(default)]
        transform: TransformSpec,
        parent_joint: String,
        children: Vec<GroupChild>,
    },
    /// Mutate the named joint's local scale; creates no geometry.
    Scale {
        parent_joint: String,
        scale: [f32; 3],
    },
    /// Point light parented to a joint.
    Light {
        #[serde(flatten)]
        args: LightArgs,
        #[serde(default)]
        transform: TransformSpec,
        parent_joint: String,
    },
}

/// A mesh created by the customization (or geometry assembly) layer: the
/// data, its material name, and the arena node it hangs from.
#[derive(Debug, Clone)]
pub struct MeshHandle {
    pub mesh: MeshData,
    pub material: String,
    pub node: NodeIndex,
}

/// Everything one [apply] call created. Owns the created nodes (the joints
/// they hang from stay with the skeleton) and removes exactly those on
/// [CustomizationResult::dispose].
#[derive(Debug, Default)]
pub struct CustomizationResult {
    pub meshes: Vec<MeshHandle>,
    pub lights: Vec<Light>,
    pub groups: Vec<NodeIndex>,
    pub warnings: Vec<MissingJoint>,
    created_nodes: Vec<NodeIndex>,
    disposed: bool,
}

impl CustomizationResult {
    /// Removes every node this attachment pass created. Never touches the
    /// skeleton's own joints; idempotent and safe after skeleton disposal.
    pub fn dispose(&mut self, skeleton: &mut Skeleton) {
        if self.disposed {
            return;
        }
        for &node in &self.created_nodes {
            skeleton.arena_mut().remove(node);
        }
        self.meshes.clear();
        self.lights.clear();
        self.groups.clear();
        self.created_nodes.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Folds another result into this one. Used when several descriptor
    /// passes (weapon preset, per-character extras) decorate the same
    /// character and should tear down together.
    pub fn merge(&mut self, mut other: CustomizationResult) {
        self.meshes.append(&mut other.meshes);
        self.lights.append(&mut other.lights);
        self.groups.append(&mut other.groups);
        self.warnings.append(&mut other.warnings);
        self.created_nodes.append(&mut other.created_nodes);
    }
}

/// Walks the descriptor list against an already-built skeleton.
/// `character_scale` is the character-level multiplier applied (once) to
/// primitive and group transforms; lights keep their authored placement.
pub fn apply(
    skeleton: &mut Skeleton,
    descriptors: &[CustomizationDescriptor],
    character_scale: f32,
) -> CustomizationResult {
    let mut result = CustomizationResult::default();

    for descriptor in descriptors {
        match descriptor {
            CustomizationDescriptor::Primitive {
                kind,
                material,
                transform,
                parent_joint,
            } => {
                let Some(parent) = resolve(skeleton, parent_joint, "primitive", &mut result) else {
                    continue;
                };
                attach_primitive(
                    skeleton,
                    &mut result,
                    kind,
                    material,
                    transform.to_transform(character_scale),
                    parent,
                );
            }
            CustomizationDescriptor::Group {
                transform,
                parent_joint,
                children,
            } => {
                let Some(parent) = resolve(skeleton, parent_joint, "group", &mut result) else {
                    continue;
                };
                let group = skeleton.arena_mut().insert(
                    "customization_group",
                    transform.to_transform(character_scale),
                    Some(parent),
                );
                result.groups.push(group);
                result.created_nodes.push(group);
                for child in children {
                    match child {
                        GroupChild::Primitive {
                            kind,
                            material,
                            transform,
                        } => {
                            // Relative to the group; character scale is
                            // already on the group node.
                            attach_primitive(
                                skeleton,
                                &mut result,
                                kind,
                                material,
                                transform.to_transform(1.0),
                                group,
                            );
                        }
                        GroupChild::Light { args, transform } => {
                            attach_light(skeleton, &mut result, args, transform.to_transform(1.0), group);
                        }
                    }
                }
            }
            CustomizationDescriptor::Scale { parent_joint, scale } => {
                let Some(joint) = resolve(skeleton, parent_joint, "scale", &mut result) else {
                    continue;
                };
                if let Some(node) = skeleton.arena_mut().get_mut(joint) {
                    node.transform.scale = Vector3::from(*scale);
                }
            }
            CustomizationDescriptor::Light {
                args,
                transform,
                parent_joint,
            } => {
                let Some(parent) = resolve(skeleton, parent_joint, "light", &mut result) else {
                    continue;
                };
                attach_light(skeleton, &mut result, args, transform.to_transform(1.0), parent);
            }
        }
    }

    debug!(
        meshes = result.meshes.len(),
        lights = result.lights.len(),
        groups = result.groups.len(),
        skipped = result.warnings.len(),
        "customizations applied"
    );
    result
}

fn resolve(
    skeleton: &Skeleton,
    joint: &str,
    context: &'static str,
    result: &mut CustomizationResult,
) -> Option<NodeIndex> {
    match skeleton.joint(joint) {
        Some(index) => Some(index),
        None => {
            warn!(joint, context, "customization references unknown joint, skipping");
            result.warnings.push(MissingJoint {
                joint: joint.to_string(),
                context,
            });
            None
        }
    }
}

fn attach_primitive(
    skeleton: &mut Skeleton,
    result: &mut CustomizationResult,
    kind: &PrimitiveKind,
    material: &str,
    transform: Transform,
    parent: NodeIndex,
) {
    let node = skeleton.arena_mut().insert("customization_mesh", transform, Some(parent));
    result.created_nodes.push(node);
    result.meshes.push(MeshHandle {
        mesh: kind.build(),
        material: material.to_string(),
        node,
    });
}

fn attach_light(
    skeleton: &mut Skeleton,
    result: &mut CustomizationResult,
    args: &LightArgs,
    transform: Transform,
    parent: NodeIndex,
) {
    let node = skeleton.arena_mut().insert("customization_light", transform, Some(parent));
    result.created_nodes.push(node);
    result.lights.push(Light {
        color: args.color,
        intensity: args.intensity,
        range: args.range,
        node,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::humanoid_archetype;
    use approx::assert_relative_eq;

    fn descriptor_json() -> &'static str {
        r#"[
            {"type": "primitive", "kind": "box", "width": 0.2, "height": 0.1, "depth": 0.1,
             "material": "armor", "parent_joint": "torso"},
            {"type": "scale", "parent_joint": "head", "scale": [1.2, 1.2, 1.2]},
            {"type": "group", "parent_joint": "handR",
             "transform": {"position": [0.0, -0.1, 0.0], "rotation": [0, 0, 0], "scale": [1, 1, 1]},
             "children": [
                {"type": "primitive", "kind": "cylinder", "height": 0.4,
                 "diameter_top": 0.04, "diameter_bottom": 0.06, "material": "barrel"},
                {"type": "primitive", "kind": "box", "width": 0.1, "height": 0.08, "depth": 0.25,
                 "material": "receiver"},
                {"type": "light", "color": [1.0, 0.6, 0.1], "intensity": 2.0, "range": 1.5,
                 "transform": {"position": [0.0, 0.0, 0.3]}}
             ]},
            {"type": "light", "color": [0.2, 0.8, 1.0], "parent_joint": "head"}
        ]"#
    }

    #[test_log::test]
    fn descriptors_round_trip_through_serde() {
        let descriptors: Vec<CustomizationDescriptor> = serde_json::from_str(descriptor_json()).unwrap();
        assert_eq!(descriptors.len(), 4);
        let json = serde_json::to_string(&descriptors).unwrap();
        let reparsed: Vec<CustomizationDescriptor> = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptors, reparsed);
    }

    #[test_log::test]
    fn group_yields_child_counts_under_one_node() {
        let mut skeleton = Skeleton::build(&humanoid_archetype(), 1.0).unwrap();
        let descriptors: Vec<CustomizationDescriptor> = serde_json::from_str(descriptor_json()).unwrap();
        let result = apply(&mut skeleton, &descriptors, 1.0);

        // 1 top-level primitive + 2 group primitives; 1 group light + 1
        // top-level light; exactly one group node.
        assert_eq!(result.meshes.len(), 3);
        assert_eq!(result.lights.len(), 2);
        assert_eq!(result.groups.len(), 1);
        assert!(result.warnings.is_empty());

        let group = result.groups[0];
        let grouped_meshes = result
            .meshes
            .iter()
            .filter(|handle| skeleton.arena().get(handle.node).unwrap().parent() == Some(group))
            .count();
        assert_eq!(grouped_meshes, 2);
        let grouped_lights = result
            .lights
            .iter()
            .filter(|light| skeleton.arena().get(light.node).unwrap().parent() == Some(group))
            .count();
        assert_eq!(grouped_lights, 1);
    }

    #[test_log::test]
    fn unknown_joint_is_skipped_with_warning() {
        let mut skeleton = Skeleton::build(&humanoid_archetype(), 1.0).unwrap();
        let descriptors = vec![CustomizationDescriptor::Primitive {
            kind: PrimitiveKind::Sphere {
                diameter: 0.1,
                segments: 6,
            },
            material: "glow".into(),
            transform: TransformSpec::default(),
            parent_joint: "antenna".into(),
        }];
        let result = apply(&mut skeleton, &descriptors, 1.0);
        assert!(result.meshes.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].joint, "antenna");
    }

    #[test_log::test]
    fn scale_descriptor_mutates_joint_without_geometry() {
        let mut skeleton = Skeleton::build(&humanoid_archetype(), 1.0).unwrap();
        let before = skeleton.arena().len();
        let descriptors = vec![CustomizationDescriptor::Scale {
            parent_joint: "head".into(),
            scale: [1.5, 2.0, 1.5],
        }];
        let result = apply(&mut skeleton, &descriptors, 1.0);
        assert_eq!(skeleton.arena().len(), before);
        assert!(result.meshes.is_empty());
        let head = skeleton.arena().get(skeleton.joint("head").unwrap()).unwrap();
        assert_relative_eq!(head.transform.scale, Vector3::new(1.5, 2.0, 1.5));
    }

    #[test_log::test]
    fn primitive_scale_compounds_once() {
        let mut skeleton = Skeleton::build(&humanoid_archetype(), 1.0).unwrap();
        let descriptors = vec![CustomizationDescriptor::Primitive {
            kind: PrimitiveKind::Box {
                width: 0.1,
                height: 0.1,
                depth: 0.1,
            },
            material: "armor".into(),
            transform: TransformSpec {
                scale: [2.0, 2.0, 2.0],
                ..TransformSpec::default()
            },
            parent_joint: "torso".into(),
        }];
        let result = apply(&mut skeleton, &descriptors, 1.5);
        let node = skeleton.arena().get(result.meshes[0].node).unwrap();
        // Authored 2.0 times character 1.5, applied exactly once.
        assert_relative_eq!(node.transform.scale, Vector3::new(3.0, 3.0, 3.0));
    }

    #[test_log::test]
    fn dispose_removes_only_created_nodes() {
        let mut skeleton = Skeleton::build(&humanoid_archetype(), 1.0).unwrap();
        let joint_count = skeleton.arena().len();
        let descriptors: Vec<CustomizationDescriptor> = serde_json::from_str(descriptor_json()).unwrap();
        let mut result = apply(&mut skeleton, &descriptors, 1.0);
        assert!(skeleton.arena().len() > joint_count);

        result.dispose(&mut skeleton);
        result.dispose(&mut skeleton); // idempotent
        assert!(result.is_disposed());
        assert_eq!(skeleton.arena().len(), joint_count);
        assert!(skeleton.joint("handR").is_some());
    }
}
