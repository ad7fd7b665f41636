//! Physics components for ECS entities.

use glam::{Mat3, Quat, Vec3};

use crate::math::inverse_or_zero;
use crate::physics::body::RigidBodyState;

/// Rigid body component.
///
/// Mass properties are stored inverted, in body space. A body with zero
/// inverse mass and inertia is kinematic: the solver treats it as immovable
/// but its velocities still move its transform.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub inv_mass: f32,
    /// Inverse inertia tensor in body space.
    pub inv_inertia: Mat3,
    /// Center of gravity, relative to the entity's transform origin.
    pub local_cog_position: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force_accumulator: Vec3,
    pub torque_accumulator: Vec3,
    /// Linear damping coefficient, per second (default: 0.01).
    pub linear_damping: f32,
    /// Angular damping coefficient, per second (default: 0.01).
    pub angular_damping: f32,
    /// Multiplier on the world gravity (default: 1.0).
    pub gravity_factor: f32,
}

impl RigidBody {
    /// Create a dynamic body with the given mass and diagonal body-space inertia.
    pub fn new_dynamic(mass: f32, inertia: Vec3) -> Self {
        Self {
            inv_mass: inverse_or_zero(mass),
            inv_inertia: Mat3::from_diagonal(Vec3::new(
                inverse_or_zero(inertia.x),
                inverse_or_zero(inertia.y),
                inverse_or_zero(inertia.z),
            )),
            local_cog_position: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force_accumulator: Vec3::ZERO,
            torque_accumulator: Vec3::ZERO,
            linear_damping: 0.01,
            angular_damping: 0.01,
            gravity_factor: 1.0,
        }
    }

    /// Solid sphere: `I = 2/5 m r²` about every axis.
    pub fn sphere(mass: f32, radius: f32) -> Self {
        Self::new_dynamic(mass, Vec3::splat(0.4 * mass * radius * radius))
    }

    /// Moved only by its velocities. Gravity, forces and constraint impulses leave it alone.
    pub fn new_kinematic() -> Self {
        Self {
            inv_mass: 0.0,
            inv_inertia: Mat3::ZERO,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_factor: 0.0,
            ..Self::new_dynamic(0.0, Vec3::ZERO)
        }
    }

    pub fn with_velocity(mut self, linear: Vec3, angular: Vec3) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn is_kinematic(&self) -> bool {
        self.inv_mass == 0.0 && self.inv_inertia == Mat3::ZERO
    }

    /// Accumulate a force through the center of gravity for the next step.
    pub fn add_force(&mut self, force: Vec3) {
        self.force_accumulator += force;
    }

    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque_accumulator += torque;
    }

    /// Body-table entry for a body with origin at `position`/`rotation`.
    /// World inverse inertia is `R·I⁻¹·Rᵀ`.
    pub(crate) fn to_state(&self, position: Vec3, rotation: Quat) -> RigidBodyState {
        let r = Mat3::from_quat(rotation);
        RigidBodyState {
            rotation,
            local_cog_position: self.local_cog_position,
            position: position + rotation * self.local_cog_position,
            inv_inertia: r * self.inv_inertia * r.transpose(),
            inv_mass: self.inv_mass,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::sphere(1.0, 0.5)
    }
}
