//! ## About
//!
//! This crate procedurally builds and animates humanoid mech characters:
//! every mesh, skeleton and pose is generated from code and a declarative
//! per-character configuration, with no authored 3D assets. It covers the
//! joint/bone hierarchy, the parametric torso and limb generators, an
//! analytic two-bone inverse kinematics solver, the idle/walk/fire
//! animation state machine and the data-driven customization layer.
//!
//! Rendering, input, audio and the game state store are external; this
//! crate produces mesh/light/transform data for a host scene graph and is
//! driven with per-frame signals (`dt`, `is_moving`, `is_firing`, aim
//! targets).
//!
//! See [Character] to get started.
//!
//! ## Naming conventions
//! * Structs – substantives that indicate entities implementing a behavior
//! * Methods – imperative forms with the exception of getters and factories,
//!             which use substantives (i.e., omit a `get_` prefix) much like
//!             the standard library.

pub mod animation;
pub mod character;
pub mod customize;
pub mod errors;
pub mod ik;
pub mod limb;
pub mod mesh;
pub mod scene;
pub mod skeleton;
pub mod torso;

pub use animation::{AnimationClip, AnimationController, AnimationState, ClipId, Keyframe};
pub use character::{Character, CharacterConfig, WeaponType};
pub use customize::{CustomizationDescriptor, CustomizationResult, MeshHandle, PrimitiveKind};
pub use errors::{MissingJoint, RigError};
pub use ik::{create_ik_chain, TwoBoneChain};
pub use mesh::MeshData;
pub use scene::{Light, NodeArena, NodeIndex, Transform};
pub use skeleton::{
    attach_to_joint, humanoid_archetype, world_position_of, Bone, JointDefinition, Pose, Skeleton,
};
