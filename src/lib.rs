//! Rein physics
//!
//! Constraint-based rigid body dynamics with a sequential impulse velocity
//! solver, in scalar and 4-wide SIMD flavours.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **math** - Scalar helpers shared by every constraint initializer
//! 2. **physics::wide** - 4-lane twins of the math helpers, over `wide`
//! 3. **physics::solver** - Per-family initializers and impulse solvers, plus the aggregator
//! 4. **physics::scheduler** - Packs constraints into non-aliasing SIMD batches
//! 5. **physics::joints** - Joint creation and deletion on a hecs world (feature = "ecs")
//! 6. **physics::PhysicsWorld** - Step orchestrator (feature = "ecs")
//! 7. **ecs** - hecs components (feature = "ecs")

pub mod error;
pub mod math;
pub mod physics;
pub mod transform;

#[cfg(feature = "ecs")]
pub mod ecs;

pub use error::PhysicsError;
pub use transform::Transform;

pub use physics::body::{BodyIndex, ConstraintBodyPair, RigidBodyState};
pub use physics::constraints::{
    BallConstraint, ConeTwistConstraint, ConstraintKind, DistanceConstraint, FixedConstraint,
    HingeConstraint, MotorType, SliderConstraint,
};
pub use physics::contact::CollisionContact;
pub use physics::solver::{
    ConstraintInput, ConstraintSet, ConstraintSolver, ScalarSolver, SimdSolver, SolverBackend,
    VelocitySolver,
};
pub use physics::PhysicsConfig;

#[cfg(feature = "ecs")]
pub use ecs::prelude::*;

#[cfg(feature = "ecs")]
pub use physics::{contact::ContactManifold, PhysicsWorld};

// Re-export glam for convenience
pub use glam;
