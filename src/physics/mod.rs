//! Constraint-based rigid body dynamics.
//!
//! # Architecture
//!
//! One call to [`PhysicsWorld::step`] runs:
//!
//! 1. Clamp and scale the timestep
//! 2. Gather every `(RigidBody, Transform)` entity into the dense body table
//! 3. Integrate gravity, forces and damping into the body velocities
//! 4. Append the immovable dummy body
//! 5. Gather joint records and contacts with their body pairs
//! 6. Initialize and iterate the velocity solver (scalar or SIMD)
//! 7. Integrate positions and orientations
//! 8. Write velocities and transforms back, clear force accumulators
//!
//! The solver core ([`body`], [`constraints`], [`contact`], [`solver`],
//! [`scheduler`], [`wide`], [`arena`]) has no ECS dependency and can be
//! driven directly with a hand-built body table.

pub mod arena;
pub mod body;
pub mod constraints;
pub mod contact;
#[cfg(feature = "ecs")]
pub mod joints;
#[cfg(feature = "ecs")]
pub mod rigid_body;
pub mod scheduler;
pub mod solver;
pub mod wide;

use glam::Vec3;

use crate::error::PhysicsError;

/// Configuration for the physics simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    /// Gravity vector. Default: (0, -9.81, 0).
    pub gravity: Vec3,
    /// Number of velocity solver sweeps per step. Default: 30.
    pub solver_iterations: u32,
    /// Solve joints and contacts in SIMD batches. Default: true.
    pub simd: bool,
    /// Multiplier on every timestep. Zero or less pauses the simulation. Default: 1.0.
    pub global_time_scale: f32,
    /// Upper bound on the timestep, applied before the time scale. Default: 1/30.
    pub max_timestep: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            solver_iterations: 30,
            simd: true,
            global_time_scale: 1.0,
            max_timestep: 1.0 / 30.0,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        let reason = if !self.gravity.is_finite() {
            Some("gravity must be finite")
        } else if self.solver_iterations == 0 {
            Some("solver_iterations must be at least 1")
        } else if !self.global_time_scale.is_finite() {
            Some("global_time_scale must be finite")
        } else if !(self.max_timestep.is_finite() && self.max_timestep > 0.0) {
            Some("max_timestep must be finite and positive")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                tracing::warn!(config = ?self, reason, "rejected physics config");
                Err(PhysicsError::InvalidConfig(reason))
            }
            None => Ok(()),
        }
    }

    pub(crate) fn backend(&self) -> solver::SolverBackend {
        if self.simd {
            solver::SolverBackend::Simd
        } else {
            solver::SolverBackend::Scalar
        }
    }
}

#[cfg(feature = "ecs")]
mod world;

#[cfg(feature = "ecs")]
pub use world::PhysicsWorld;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physics_config_default() {
        let config = PhysicsConfig::default();
        assert_eq!(config.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(config.solver_iterations, 30);
        assert!(config.simd);
        assert_eq!(config.global_time_scale, 1.0);
        assert!((config.max_timestep - 1.0 / 30.0).abs() < 1e-7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_physics_config_rejects_bad_values() {
        let bad = [
            PhysicsConfig {
                gravity: Vec3::new(0.0, f32::NAN, 0.0),
                ..Default::default()
            },
            PhysicsConfig {
                solver_iterations: 0,
                ..Default::default()
            },
            PhysicsConfig {
                global_time_scale: f32::INFINITY,
                ..Default::default()
            },
            PhysicsConfig {
                max_timestep: 0.0,
                ..Default::default()
            },
            PhysicsConfig {
                max_timestep: -1.0 / 60.0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(PhysicsError::InvalidConfig(_))), "{config:?}");
        }

        // A zero time scale pauses; it is not an error.
        let paused = PhysicsConfig {
            global_time_scale: 0.0,
            ..Default::default()
        };
        assert!(paused.validate().is_ok());
        assert_eq!(paused.backend(), solver::SolverBackend::Simd);
    }
}
