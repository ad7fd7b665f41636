use glam::Vec3;

use super::{bias_scale, ConstraintSet, SolverBody, DISTANCE_CONSTRAINT_BETA};
use crate::math::inverse_or_zero;
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::DistanceConstraint;

/// Below this anchor separation the constraint direction is undefined and set to zero.
pub(crate) const DEGENERATE_DISTANCE: f32 = 0.001;

#[derive(Debug, Clone, Copy)]
pub struct DistanceConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    /// Unit direction from anchor A to anchor B.
    pub u: Vec3,
    pub bias: f32,
    pub effective_mass: f32,
}

pub fn initialize_distance_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, DistanceConstraint>,
    dt: f32,
    out: &mut Vec<DistanceConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let beta_dt = bias_scale(DISTANCE_CONSTRAINT_BETA, dt);

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);

        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let delta = global_anchor_b - global_anchor_a;
        let l = delta.length();
        let u = if l > DEGENERATE_DISTANCE { delta / l } else { Vec3::ZERO };

        let cr_a_u = rel_global_anchor_a.cross(u);
        let cr_b_u = rel_global_anchor_b.cross(u);
        let inv_mass = global_a.inv_mass
            + cr_a_u.dot(global_a.inv_inertia * cr_a_u)
            + global_b.inv_mass
            + cr_b_u.dot(global_b.inv_inertia * cr_b_u);

        out.push(DistanceConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            u,
            bias: (l - input.global_length) * beta_dt,
            effective_mass: inverse_or_zero(inv_mass),
        });
    }
}

pub fn solve_distance_constraints(constraints: &mut [DistanceConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);

        let anchor_velocity_a = a.point_velocity(con.rel_global_anchor_a);
        let anchor_velocity_b = b.point_velocity(con.rel_global_anchor_b);
        let cdot = con.u.dot(anchor_velocity_b - anchor_velocity_a) + con.bias;

        let lambda = -con.effective_mass * cdot;
        let p = con.u * lambda;
        a.apply_impulse(-p, con.rel_global_anchor_a);
        b.apply_impulse(p, con.rel_global_anchor_b);

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

    #[test]
    fn test_degenerate_anchors_give_zero_direction() {
        let bodies = vec![sphere(Vec3::ZERO, 1.0), sphere(Vec3::new(0.0005, 0.0, 0.0), 1.0)];
        let constraints = [DistanceConstraint::from_local_points(Vec3::ZERO, Vec3::ZERO, 1.0)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_distance_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        assert_eq!(out[0].u, Vec3::ZERO);
        assert!(out[0].effective_mass.is_finite());
    }

    #[test]
    fn test_zero_dt_has_no_bias() {
        let bodies = vec![sphere(Vec3::ZERO, 1.0), sphere(Vec3::X * 3.0, 1.0)];
        let constraints = [DistanceConstraint::from_local_points(Vec3::ZERO, Vec3::ZERO, 1.0)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_distance_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 0.0, &mut out);
        assert_eq!(out[0].bias, 0.0);
    }

    #[test]
    fn test_relative_velocity_along_axis_converges() {
        let mut bodies = vec![
            with_velocity(sphere(Vec3::ZERO, 1.0), Vec3::new(-1.0, 0.5, 0.0), Vec3::new(0.0, 0.0, 2.0)),
            with_velocity(sphere(Vec3::new(2.0, 0.0, 0.0), 3.0), Vec3::new(2.0, 0.0, 1.0), Vec3::ZERO),
        ];
        let constraints = [DistanceConstraint::from_local_points(Vec3::new(0.5, 0.0, 0.0), Vec3::new(-0.5, 0.0, 0.0), 1.0)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        // Anchors are exactly 1 apart, so there is no positional bias.
        initialize_distance_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        assert_relative_eq!(out[0].bias, 0.0, epsilon = 1e-6);

        for _ in 0..100 {
            solve_distance_constraints(&mut out, &mut bodies);
        }

        let con = &out[0];
        let va = bodies[0].point_velocity(con.rel_global_anchor_a);
        let vb = bodies[1].point_velocity(con.rel_global_anchor_b);
        let cdot = con.u.dot(vb - va);
        assert!(cdot.abs() < 1e-4, "Cdot did not converge: {cdot}");
    }

    #[test]
    fn test_static_endpoint_leaves_dummy_untouched() {
        let mut bodies = vec![
            with_velocity(sphere(Vec3::new(0.0, -2.0, 0.0), 1.0), Vec3::new(0.0, -5.0, 0.0), Vec3::ZERO),
            RigidBodyState::DUMMY,
        ];
        let constraints = [DistanceConstraint::from_local_points(Vec3::ZERO, Vec3::ZERO, 2.0)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_distance_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        for _ in 0..10 {
            solve_distance_constraints(&mut out, &mut bodies);
        }
        assert_eq!(bodies[1], RigidBodyState::DUMMY);
        assert!(bodies[0].linear_velocity.y.abs() < 1e-4, "velocity away from pivot not removed: {}", bodies[0].linear_velocity);
    }
}
