use glam::{Mat3, Vec3};

use super::ball::point_inv_effective_mass;
use super::{bias_scale, ConstraintSet, SolverBody, BALL_CONSTRAINT_BETA, SLIDER_CONSTRAINT_BETA};
use crate::math::{rotation_error, solve_mat3};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::FixedConstraint;

#[derive(Debug, Clone, Copy)]
pub struct FixedConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    pub translation_bias: Vec3,
    pub rotation_bias: Vec3,
    pub inv_effective_translation_mass: Mat3,
    pub inv_effective_rotation_mass: Mat3,
}

pub fn initialize_fixed_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, FixedConstraint>,
    dt: f32,
    out: &mut Vec<FixedConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let translation_beta_dt = bias_scale(BALL_CONSTRAINT_BETA, dt);
    // The error is the vector part of a quaternion, i.e. sin(θ/2) along the axis.
    let rotation_beta_dt = bias_scale(SLIDER_CONSTRAINT_BETA, dt) * 2.0;

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let error = rotation_error(global_a.rotation, global_b.rotation, input.initial_inv_rotation_difference);

        out.push(FixedConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            translation_bias: (global_anchor_b - global_anchor_a) * translation_beta_dt,
            rotation_bias: error * rotation_beta_dt,
            inv_effective_translation_mass: point_inv_effective_mass(
                global_a,
                global_b,
                rel_global_anchor_a,
                rel_global_anchor_b,
            ),
            inv_effective_rotation_mass: global_a.inv_inertia + global_b.inv_inertia,
        });
    }
}

pub fn solve_fixed_constraints(constraints: &mut [FixedConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);

        // Rotation.
        {
            let cdot = b.angular_velocity - a.angular_velocity;
            let lambda = solve_mat3(&con.inv_effective_rotation_mass, -(cdot + con.rotation_bias));
            a.apply_angular_impulse(-lambda);
            b.apply_angular_impulse(lambda);
        }

        // Position.
        {
            let anchor_velocity_a = a.point_velocity(con.rel_global_anchor_a);
            let anchor_velocity_b = b.point_velocity(con.rel_global_anchor_b);
            let cdot = anchor_velocity_b - anchor_velocity_a + con.translation_bias;

            let p = solve_mat3(&con.inv_effective_translation_mass, -cdot);
            a.apply_impulse(-p, con.rel_global_anchor_a);
            b.apply_impulse(p, con.rel_global_anchor_b);
        }

        a.store(bodies, con.body_a);
        b.store(bodies, con.body_b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::ConstraintBodyPair;
    use crate::physics::solver::test_util::*;
    use approx::assert_relative_eq;
    use glam::Quat;

    #[test]
    fn test_rotation_drift_produces_restoring_bias() {
        // B has drifted +0.1 rad about Z relative to the snapshot.
        let bodies = vec![
            sphere(Vec3::ZERO, 1.0),
            tilted_body(Vec3::X, Quat::from_rotation_z(0.1), 1.0),
        ];
        let constraints = [FixedConstraint::from_local_points(Vec3::ZERO, Vec3::ZERO)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_fixed_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        let bias = out[0].rotation_bias;
        assert!(bias.z > 0.0, "bias should oppose the drift: {bias}");
        assert_relative_eq!(bias.z, (0.05f32).sin() * 0.1 * 60.0 * 2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_locks_relative_rotation() {
        let mut bodies = vec![
            with_velocity(sphere(Vec3::ZERO, 2.0), Vec3::ZERO, Vec3::new(0.0, 3.0, 0.0)),
            with_velocity(tilted_body(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 1.0), Vec3::Z, Vec3::new(1.0, 0.0, -1.0)),
        ];
        let global_anchor = Vec3::new(0.5, 0.0, 0.0);
        let ta = crate::transform::Transform::from_position(Vec3::ZERO);
        let tb = crate::transform::Transform::from_position(Vec3::X);
        let constraints = [FixedConstraint::from_global_points(&ta, &tb, global_anchor)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_fixed_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        for _ in 0..200 {
            solve_fixed_constraints(&mut out, &mut bodies);
        }
        let dw = bodies[1].angular_velocity - bodies[0].angular_velocity;
        assert!(dw.length() < 1e-3, "relative rotation not locked: {dw}");
    }
}
