//! hecs integration.
//!
//! Bodies are entities with a [`Transform`](components::Transform) and a
//! [`RigidBody`](components::RigidBody). Joints are entities of their own,
//! created through [`physics::joints`](crate::physics::joints).

pub mod components;

pub mod prelude {
    pub use super::components::{ConstraintEdges, JointLink, RigidBody, Transform};
    pub use hecs::{Entity, World};
}
