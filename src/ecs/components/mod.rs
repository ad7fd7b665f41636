//! ECS components understood by the physics step.

pub mod joint;
pub mod physics;

pub use crate::transform::Transform;
pub use joint::{ConstraintEdges, JointLink};
pub use physics::RigidBody;
