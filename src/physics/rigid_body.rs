//! Rigid body integration functions.
//!
//! Forces are integrated into the body table before the constraint solve,
//! positions after it. Both run per body and do not touch the ECS world.

use glam::{Quat, Vec3};

use super::body::RigidBodyState;
use crate::ecs::components::{RigidBody, Transform};

/// Build the body-table entry for one body and apply gravity, accumulated
/// forces and damping to its velocities (semi-implicit Euler).
pub fn integrate_forces(rb: &RigidBody, transform: &Transform, gravity: Vec3, dt: f32) -> RigidBodyState {
    let mut state = rb.to_state(transform.position, transform.rotation);
    if rb.is_kinematic() {
        return state;
    }

    state.linear_velocity += (gravity * rb.gravity_factor + rb.force_accumulator * rb.inv_mass) * dt;
    state.angular_velocity += state.inv_inertia * rb.torque_accumulator * dt;

    state.linear_velocity *= 1.0 / (1.0 + dt * rb.linear_damping);
    state.angular_velocity *= 1.0 / (1.0 + dt * rb.angular_damping);
    state
}

/// Advance the center of gravity and orientation: `p += v·dt`, `q += ½·dt·(ω, 0)·q`.
pub fn integrate_velocities(state: &mut RigidBodyState, dt: f32) {
    state.position += state.linear_velocity * dt;

    let omega = state.angular_velocity;
    if omega.length_squared() > 0.0 {
        let omega_quat = Quat::from_xyzw(omega.x, omega.y, omega.z, 0.0);
        let q_dot = omega_quat * state.rotation * (0.5 * dt);
        let q = state.rotation;
        state.rotation = Quat::from_xyzw(q.x + q_dot.x, q.y + q_dot.y, q.z + q_dot.z, q.w + q_dot.w).normalize();
    }
}

/// Copy velocities and pose back to the components and clear the force accumulators.
pub fn write_back(state: &RigidBodyState, rb: &mut RigidBody, transform: &mut Transform) {
    transform.rotation = state.rotation;
    transform.position = state.position - state.rotation * rb.local_cog_position;
    rb.linear_velocity = state.linear_velocity;
    rb.angular_velocity = state.angular_velocity;
    rb.force_accumulator = Vec3::ZERO;
    rb.torque_accumulator = Vec3::ZERO;
}
