//! Scene helpers shared by the solver tests.

use glam::{Quat, Vec3};
use proptest::prelude::*;

use super::{ConstraintInput, ScalarSolver, SimdSolver, VelocitySolver};
use crate::physics::body::{BodyIndex, RigidBodyState};

/// A solid sphere of radius 0.5.
pub(crate) fn sphere(position: Vec3, mass: f32) -> RigidBodyState {
    let inertia = 0.4 * mass * 0.25;
    RigidBodyState::new(position, Quat::IDENTITY, mass, Vec3::splat(inertia))
}

/// A box-like body with uneven inertia and a rotated pose.
pub(crate) fn tilted_body(position: Vec3, rotation: Quat, mass: f32) -> RigidBodyState {
    let mut body = RigidBodyState::new(position, rotation, mass, Vec3::new(0.3, 0.5, 0.8) * mass);
    body.local_cog_position = Vec3::new(0.05, -0.1, 0.02);
    body
}

pub(crate) fn with_velocity(mut body: RigidBodyState, linear: Vec3, angular: Vec3) -> RigidBodyState {
    body.linear_velocity = linear;
    body.angular_velocity = angular;
    body
}

/// Appends the dummy and returns its index.
pub(crate) fn push_dummy(bodies: &mut Vec<RigidBodyState>) -> BodyIndex {
    bodies.push(RigidBodyState::DUMMY);
    (bodies.len() - 1) as BodyIndex
}

fn vec3_within(extent: f32) -> impl Strategy<Value = Vec3> {
    prop::array::uniform3(-extent..extent).prop_map(Vec3::from_array)
}

/// Linear and angular velocities for the movable bodies of a scene, large
/// enough to push limits and motors into every solve branch.
pub(crate) fn body_velocities() -> impl Strategy<Value = Vec<(Vec3, Vec3)>> {
    prop::collection::vec((vec3_within(2.0), vec3_within(1.0)), 1..32)
}

/// Assigns `velocities` to the movable bodies in order, cycling when there are fewer.
pub(crate) fn set_velocities(bodies: &mut [RigidBodyState], velocities: &[(Vec3, Vec3)]) {
    let movable = bodies.iter_mut().filter(|b| !b.is_immovable());
    for (body, &(linear, angular)) in movable.zip(velocities.iter().cycle()) {
        body.linear_velocity = linear;
        body.angular_velocity = angular;
    }
}

pub(crate) fn run_solver(
    solver: &mut dyn VelocitySolver,
    bodies: &mut [RigidBodyState],
    input: &ConstraintInput<'_>,
    dt: f32,
    iterations: u32,
) {
    solver.initialize(bodies, input, dt);
    for _ in 0..iterations {
        solver.solve_one_iteration(bodies);
    }
}

/// Solve the same input with both backends and check the velocities agree.
pub(crate) fn assert_backends_agree(bodies: &[RigidBodyState], input: &ConstraintInput<'_>, dt: f32, iterations: u32) {
    let mut scalar_bodies = bodies.to_vec();
    let mut simd_bodies = bodies.to_vec();
    run_solver(&mut ScalarSolver::new(), &mut scalar_bodies, input, dt, iterations);
    run_solver(&mut SimdSolver::new(), &mut simd_bodies, input, dt, iterations);

    for (i, (s, w)) in scalar_bodies.iter().zip(&simd_bodies).enumerate() {
        let dv = (s.linear_velocity - w.linear_velocity).abs().max_element();
        let dw = (s.angular_velocity - w.angular_velocity).abs().max_element();
        assert!(
            dv < 1e-4 && dw < 1e-4,
            "body {i}: scalar v={} w={} vs simd v={} w={}",
            s.linear_velocity,
            s.angular_velocity,
            w.linear_velocity,
            w.angular_velocity
        );
    }
}
