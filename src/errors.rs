//! Provides the error type used throughout this crate.

use thiserror::Error;

/// Fatal configuration errors raised while building a [crate::Skeleton]
/// from an archetype. These are never recovered from; a malformed
/// archetype means the character cannot be assembled at all.
#[derive(Error, Debug)]
pub enum RigError {
    #[error("joint name is not unique: {0}")]
    DuplicateJoint(String),
    #[error("joint {joint} references parent {parent} which has not been created yet")]
    UnknownParent { joint: String, parent: String },
    #[error("joint {0} has no parent but is not the first definition")]
    OrphanJoint(String),
    #[error("archetype contains no joint definitions")]
    EmptyArchetype,
}

/// Non-fatal report for a descriptor or chain that names a joint absent
/// from the current skeleton. The affected operation is skipped and
/// assembly continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingJoint {
    /// Name that failed to resolve.
    pub joint: String,
    /// What was being attached or solved when the lookup failed.
    pub context: &'static str,
}

impl std::fmt::Display for MissingJoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: no joint named {:?} in skeleton", self.context, self.joint)
    }
}
