/*! Arena-allocated scene node hierarchy.
 *
 * Joints, attachment groups and mesh anchors all live in one arena and are
 * addressed by stable [NodeIndex] handles. Nodes hold an optional parent
 * index; ownership is strictly tree-shaped (whoever created a node removes
 * it), so there are no owning back-pointers to fight the borrow checker
 * over. World transforms are accumulated by walking the parent chain.
 */

use nalgebra::{UnitQuaternion, Vector3};

/// Stable handle into a [NodeArena]. Remains valid until the node is
/// removed; resolving a removed index yields `None` rather than a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(pub(crate) usize);

/// Local translation/rotation/scale of a scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    pub fn identity() -> Self {
        Transform {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_position(position: Vector3<f32>) -> Self {
        Transform {
            position,
            ..Transform::identity()
        }
    }

    /// Composes `self * child` (apply `child` in the space of `self`).
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&child.position),
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::identity()
    }
}

/// A single node in the arena.
#[derive(Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    parent: Option<NodeIndex>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }
}

/// A point light attached to a scene node. Rasterization is external; this
/// record only carries the parameters and the position in the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: [f32; 3],
    pub intensity: f32,
    pub range: f32,
    pub node: NodeIndex,
}

/// Arena storage for scene nodes. Removal leaves a tombstone so that
/// indices held elsewhere stay stable.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<SceneNode>>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena { slots: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        NodeArena {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Number of live nodes (tombstones excluded).
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        parent: Option<NodeIndex>,
    ) -> NodeIndex {
        let index = NodeIndex(self.slots.len());
        self.slots.push(Some(SceneNode {
            name: name.into(),
            transform,
            parent,
        }));
        index
    }

    pub fn get(&self, index: NodeIndex) -> Option<&SceneNode> {
        self.slots.get(index.0).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut SceneNode> {
        self.slots.get_mut(index.0).and_then(|slot| slot.as_mut())
    }

    /// Removes a node. Children are not touched; callers remove subtrees
    /// they created via [NodeArena::remove_subtree]. Safe on stale indices.
    pub fn remove(&mut self, index: NodeIndex) {
        if let Some(slot) = self.slots.get_mut(index.0) {
            *slot = None;
        }
    }

    /// Removes a node together with every live descendant.
    pub fn remove_subtree(&mut self, root: NodeIndex) {
        let doomed: Vec<NodeIndex> = (0..self.slots.len())
            .map(NodeIndex)
            .filter(|&index| self.is_descendant_or_self(index, root))
            .collect();
        for index in doomed {
            self.remove(index);
        }
    }

    /// Drops every node. Indices handed out earlier resolve to `None`
    /// afterwards.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn is_descendant_or_self(&self, index: NodeIndex, root: NodeIndex) -> bool {
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            if current == root {
                return true;
            }
            cursor = self.get(current).and_then(|node| node.parent);
        }
        false
    }

    /// Accumulated transform from the root down to `index`. Stale indices
    /// yield the identity.
    pub fn world_transform(&self, index: NodeIndex) -> Transform {
        let mut chain = vec![];
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            match self.get(current) {
                Some(node) => {
                    chain.push(current);
                    cursor = node.parent;
                }
                None => break,
            }
        }
        chain
            .iter()
            .rev()
            .fold(Transform::identity(), |accumulated, &node_index| {
                accumulated.compose(&self.get(node_index).expect("collected above").transform)
            })
    }

    pub fn world_position(&self, index: NodeIndex) -> Vector3<f32> {
        self.world_transform(index).position
    }
}
