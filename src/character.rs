/*! Character factory and the per-character runtime handle.
 *
 * Assembly follows a fixed order: build the skeleton from the archetype,
 * generate and parent torso/head/limb geometry, run the customization
 * descriptors (weapon preset first, then per-character extras), then bind
 * the animation controller to the joint map. Teardown runs the same order
 * reversed: customizations and limbs before torso and head, the skeleton
 * last, since attachments are parented to skeleton joints and must not
 * outlive them.
 */

use crate::animation::AnimationController;
use crate::customize::{self, CustomizationDescriptor, CustomizationResult, MeshHandle};
use crate::errors::RigError;
use crate::ik::{create_ik_chain, TwoBoneChain};
use crate::limb::{self, LimbParams};
use crate::mesh;
use crate::scene::{Light, NodeIndex, Transform};
use crate::skeleton::{attach_to_joint, humanoid_archetype, JointDefinition, Skeleton};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Weapon archetype carried on the right hand. Each maps to a grouped
/// sub-assembly descriptor (cluster of primitives plus a muzzle light).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    Rifle,
    Cannon,
    Blaster,
    Unarmed,
}

/// Declarative per-character configuration. Schema-checked before it
/// reaches this subsystem; numeric content is trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub class_id: String,
    pub scale: f32,
    pub color: [f32; 3],
    pub weapon_type: WeaponType,
    #[serde(default = "default_walk_speed")]
    pub walk_speed: f32,
    #[serde(default)]
    pub customizations: Vec<CustomizationDescriptor>,
}

fn default_walk_speed() -> f32 {
    1.0
}

/// Descriptor list for the weapon cluster of a given type. Expressed as
/// ordinary customizations so the attachment layer handles weapons and
/// cosmetics identically.
pub fn weapon_descriptors(weapon: WeaponType) -> Vec<CustomizationDescriptor> {
    use crate::customize::{GroupChild, LightArgs, PrimitiveKind, TransformSpec};

    let (barrel_length, barrel_diameter, muzzle_color) = match weapon {
        WeaponType::Rifle => (0.45, 0.05, [1.0, 0.7, 0.2]),
        WeaponType::Cannon => (0.6, 0.12, [1.0, 0.4, 0.1]),
        WeaponType::Blaster => (0.3, 0.07, [0.3, 0.8, 1.0]),
        WeaponType::Unarmed => return vec![],
    };

    vec![CustomizationDescriptor::Group {
        transform: TransformSpec {
            position: [0.0, -0.05, 0.1],
            rotation: [std::f32::consts::FRAC_PI_2, 0.0, 0.0],
            ..TransformSpec::default()
        },
        parent_joint: "handR".to_string(),
        children: vec![
            GroupChild::Primitive {
                kind: PrimitiveKind::Cylinder {
                    height: barrel_length,
                    diameter_top: barrel_diameter * 0.8,
                    diameter_bottom: barrel_diameter,
                    tessellation: 10,
                },
                material: "weapon".to_string(),
                transform: TransformSpec {
                    position: [0.0, barrel_length * 0.5, 0.0],
                    ..TransformSpec::default()
                },
            },
            GroupChild::Primitive {
                kind: PrimitiveKind::Box {
                    width: barrel_diameter * 2.0,
                    height: 0.12,
                    depth: barrel_diameter * 2.5,
                },
                material: "weapon".to_string(),
                transform: TransformSpec::default(),
            },
            GroupChild::Light {
                args: LightArgs {
                    color: muzzle_color,
                    intensity: 2.5,
                    range: 1.2,
                },
                transform: TransformSpec {
                    position: [0.0, barrel_length + 0.02, 0.0],
                    ..TransformSpec::default()
                },
            },
        ],
    }]
}

/// Limb attachment: which joints a limb spans and how it is generated.
struct LimbPlan {
    joint: &'static str,
    params: LimbParams,
}

fn limb_plans(scale: f32) -> Vec<LimbPlan> {
    let arm = |joint, mirror| LimbPlan {
        joint,
        params: LimbParams {
            upper_length: 0.275,
            lower_length: 0.275,
            joint_radius: 0.06,
            end_radius: 0.045,
            tessellation: 8,
            scale,
            mirror,
        },
    };
    let leg = |joint, mirror| LimbPlan {
        joint,
        params: LimbParams {
            upper_length: 0.425,
            lower_length: 0.425,
            joint_radius: 0.08,
            end_radius: 0.06,
            tessellation: 8,
            scale,
            mirror,
        },
    };
    vec![
        arm("armL", false),
        arm("armR", true),
        leg("legL", false),
        leg("legR", true),
    ]
}

/// A fully assembled character. Owns its skeleton, geometry, attachments
/// and controller; collaborators drive it with per-frame signals.
#[derive(Debug)]
pub struct Character {
    skeleton: Skeleton,
    controller: AnimationController,
    customization: CustomizationResult,
    /// Torso first, then head, then limb pieces.
    body: Vec<MeshHandle>,
    body_nodes: Vec<NodeIndex>,
    root: NodeIndex,
    aim_chain: Option<TwoBoneChain>,
    color: [f32; 3],
    disposed: bool,
}

impl Character {
    /// Builds a character on the default humanoid archetype.
    pub fn build(config: &CharacterConfig) -> Result<Character, RigError> {
        Character::build_with_archetype(config, &humanoid_archetype())
    }

    /// Builds a character on a caller-provided archetype. The archetype
    /// must be topologically sorted, root first.
    pub fn build_with_archetype(
        config: &CharacterConfig,
        archetype: &[JointDefinition],
    ) -> Result<Character, RigError> {
        let mut skeleton = Skeleton::build(archetype, config.scale)?;
        let root = skeleton.root();

        let mut body = vec![];
        let mut body_nodes = vec![];

        // Torso shell is the primary mesh.
        let torso_params = crate::torso::TorsoParams {
            scale: config.scale,
            ..crate::torso::TorsoParams::default()
        };
        if let Some(node) = attach_to_joint(&mut skeleton, "torso_shell", "torso", Vector3::zeros()) {
            body_nodes.push(node);
            body.push(MeshHandle {
                mesh: crate::torso::generate(&torso_params),
                material: "hull".to_string(),
                node,
            });
        }
        if let Some(node) = attach_to_joint(&mut skeleton, "head_shell", "head", Vector3::zeros()) {
            body_nodes.push(node);
            body.push(MeshHandle {
                mesh: mesh::box_mesh(0.28 * config.scale, 0.24 * config.scale, 0.26 * config.scale),
                material: "hull".to_string(),
                node,
            });
        }

        for plan in limb_plans(config.scale) {
            assemble_limb(&mut skeleton, &plan, &mut body, &mut body_nodes);
        }

        // Weapon cluster first, then per-character extras, one pass each.
        let mut customization = customize::apply(
            &mut skeleton,
            &weapon_descriptors(config.weapon_type),
            config.scale,
        );
        let extras = customize::apply(&mut skeleton, &config.customizations, config.scale);
        customization.merge(extras);

        let aim_chain = match create_ik_chain(&skeleton, "torso", "armR", "handR") {
            Ok(chain) => Some(chain),
            Err(missing) => {
                warn!(%missing, "no aim chain for this archetype");
                None
            }
        };

        debug!(
            class = %config.class_id,
            joints = skeleton.joint_count(),
            body_meshes = body.len(),
            attachments = customization.meshes.len(),
            "character assembled"
        );
        Ok(Character {
            skeleton,
            controller: AnimationController::new(config.walk_speed),
            customization,
            body,
            body_nodes,
            root,
            aim_chain,
            color: config.color,
            disposed: false,
        })
    }

    /// Root scene node of the character.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The torso shell.
    pub fn primary_mesh(&self) -> Option<&MeshHandle> {
        self.body.first()
    }

    pub fn body_meshes(&self) -> &[MeshHandle] {
        &self.body
    }

    pub fn attachment_meshes(&self) -> &[MeshHandle] {
        &self.customization.meshes
    }

    pub fn lights(&self) -> &[Light] {
        &self.customization.lights
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn controller(&self) -> &AnimationController {
        &self.controller
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    pub fn joint(&self, name: &str) -> Option<NodeIndex> {
        self.skeleton.joint(name)
    }

    /// Per-frame tick: advances the animation state machine and applies
    /// the sampled pose to the skeleton.
    pub fn update(&mut self, dt: f32, is_moving: bool, is_firing: bool) {
        if self.disposed {
            return;
        }
        let pose = self.controller.update(dt, is_moving, is_firing);
        self.skeleton.apply_pose(&pose);
    }

    /// Aims the weapon arm at a world-space target, overriding the
    /// animated rotations of the chain. Call after [Character::update].
    pub fn aim_at(&mut self, target: Vector3<f32>) {
        if self.disposed {
            return;
        }
        if let Some(chain) = &self.aim_chain {
            chain.solve(&mut self.skeleton, target);
        }
    }

    /// Tears the character down: customizations and limbs first, then
    /// torso and head, the skeleton last. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.customization.dispose(&mut self.skeleton);
        // Limb pieces were attached after torso/head; remove them first.
        for &node in self.body_nodes.iter().rev() {
            self.skeleton.arena_mut().remove(node);
        }
        self.body.clear();
        self.body_nodes.clear();
        self.controller.dispose();
        self.skeleton.dispose();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Character {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Attaches the generated limb pieces under a limb joint: joint sphere and
/// upper tube at the joint, an explicit elbow/knee transform offset by the
/// upper length carrying the mid sphere and lower tube, and the terminal
/// sphere below that.
fn assemble_limb(
    skeleton: &mut Skeleton,
    plan: &LimbPlan,
    body: &mut Vec<MeshHandle>,
    body_nodes: &mut Vec<NodeIndex>,
) {
    let geometry = limb::generate(&plan.params);
    let Some(joint_node) = attach_to_joint(skeleton, "limb_joint", plan.joint, Vector3::zeros()) else {
        return;
    };
    body_nodes.push(joint_node);
    body.push(MeshHandle {
        mesh: geometry.joint_sphere.clone(),
        material: "joint".to_string(),
        node: joint_node,
    });

    let upper_node = skeleton
        .arena_mut()
        .insert("limb_upper", Transform::identity(), Some(joint_node));
    body_nodes.push(upper_node);
    body.push(MeshHandle {
        mesh: geometry.upper.clone(),
        material: "limb".to_string(),
        node: upper_node,
    });

    let mid_node = skeleton.arena_mut().insert(
        "limb_mid",
        Transform::from_position(geometry.mid_offset),
        Some(joint_node),
    );
    body_nodes.push(mid_node);
    body.push(MeshHandle {
        mesh: geometry.mid_sphere.clone(),
        material: "joint".to_string(),
        node: mid_node,
    });

    let lower_node = skeleton
        .arena_mut()
        .insert("limb_lower", Transform::identity(), Some(mid_node));
    body_nodes.push(lower_node);
    body.push(MeshHandle {
        mesh: geometry.lower.clone(),
        material: "limb".to_string(),
        node: lower_node,
    });

    let end_node = skeleton.arena_mut().insert(
        "limb_end",
        Transform::from_position(geometry.end_offset),
        Some(mid_node),
    );
    body_nodes.push(end_node);
    body.push(MeshHandle {
        mesh: geometry.end_sphere,
        material: "joint".to_string(),
        node: end_node,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::ClipId;
    use approx::assert_relative_eq;

    fn config() -> CharacterConfig {
        CharacterConfig {
            class_id: "assault".to_string(),
            scale: 1.0,
            color: [0.8, 0.1, 0.1],
            weapon_type: WeaponType::Rifle,
            walk_speed: 1.0,
            customizations: vec![],
        }
    }

    #[test_log::test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "class_id": "scout",
            "scale": 0.9,
            "color": [0.2, 0.9, 0.4],
            "weapon_type": "blaster"
        }"#;
        let config: CharacterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.weapon_type, WeaponType::Blaster);
        assert_relative_eq!(config.walk_speed, 1.0);
        assert!(config.customizations.is_empty());
    }

    #[test_log::test]
    fn build_assembles_the_full_pipeline() {
        let character = Character::build(&config()).unwrap();

        assert_eq!(character.skeleton().joint_count(), 12);
        // Torso, head and four limbs of five pieces each.
        assert_eq!(character.body_meshes().len(), 2 + 4 * 5);
        assert_eq!(character.primary_mesh().unwrap().material, "hull");
        // Rifle cluster: barrel + receiver meshes and one muzzle light.
        assert_eq!(character.attachment_meshes().len(), 2);
        assert_eq!(character.lights().len(), 1);
        assert_eq!(character.color(), [0.8, 0.1, 0.1]);
    }

    #[test_log::test]
    fn unarmed_characters_carry_no_weapon_cluster() {
        let character = Character::build(&CharacterConfig {
            weapon_type: WeaponType::Unarmed,
            ..config()
        })
        .unwrap();
        assert!(character.attachment_meshes().is_empty());
        assert!(character.lights().is_empty());
    }

    #[test_log::test]
    fn update_drives_the_state_machine_and_pose() {
        let mut character = Character::build(&config()).unwrap();
        let rest_leg = character.skeleton().bone("legL").unwrap().rotation;

        character.update(0.1, true, false);
        assert_eq!(character.controller().current(), ClipId::Walk);
        let walking_leg = character.skeleton().bone("legL").unwrap().rotation;
        assert!(rest_leg.angle_to(&walking_leg) > 1e-3, "walk pose must move the legs");

        character.update(0.016, false, true);
        assert_eq!(character.controller().current(), ClipId::Fire);
    }

    #[test_log::test]
    fn aim_overrides_the_arm_chain() {
        let mut character = Character::build(&config()).unwrap();
        character.update(0.016, false, false);

        let target = character.skeleton().world_position_of("torso") + Vector3::new(-0.6, 0.2, 0.6);
        character.aim_at(target);
        let hand = character.skeleton().world_position_of("handR");
        assert_relative_eq!(hand, target, epsilon = 1e-3);
    }

    #[test_log::test]
    fn customization_warnings_surface_through_assembly() {
        let mut bad = config();
        bad.customizations = vec![CustomizationDescriptor::Scale {
            parent_joint: "tail".to_string(),
            scale: [2.0, 2.0, 2.0],
        }];
        let character = Character::build(&bad).unwrap();
        assert_eq!(character.customization.warnings.len(), 1);
        assert_eq!(character.customization.warnings[0].joint, "tail");
    }

    #[test_log::test]
    fn dispose_is_ordered_and_idempotent() {
        let mut character = Character::build(&config()).unwrap();
        character.dispose();
        character.dispose();
        assert!(character.is_disposed());
        assert!(character.skeleton().is_disposed());
        assert!(character.body_meshes().is_empty());
        // Further updates are inert.
        character.update(0.016, true, true);
    }
}
