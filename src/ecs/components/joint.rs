//! Joint graph components.
//!
//! A joint is its own entity carrying one constraint record and a
//! [`JointLink`]. Each body it couples lists it in its [`ConstraintEdges`],
//! so deleting a body's joints never scans the whole world.

use hecs::Entity;

use crate::physics::constraints::ConstraintKind;

/// The two entities a joint couples. Either may lack a `RigidBody`, in which
/// case that side is attached to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointLink {
    pub entity_a: Entity,
    pub entity_b: Entity,
    pub kind: ConstraintKind,
}

impl JointLink {
    /// The side of the joint that is not `entity`.
    pub fn other(&self, entity: Entity) -> Entity {
        if self.entity_a == entity {
            self.entity_b
        } else {
            self.entity_a
        }
    }
}

/// Joints attached to a body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintEdges {
    edges: Vec<(Entity, ConstraintKind)>,
}

impl ConstraintEdges {
    pub fn push(&mut self, joint: Entity, kind: ConstraintKind) {
        self.edges.push((joint, kind));
    }

    /// Drop the edge to `joint`. Returns false if there was none.
    pub fn remove(&mut self, joint: Entity) -> bool {
        match self.edges.iter().position(|&(e, _)| e == joint) {
            Some(i) => {
                self.edges.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, ConstraintKind)> + '_ {
        self.edges.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
