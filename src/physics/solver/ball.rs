use glam::{Mat3, Vec3};

use super::{bias_scale, ConstraintSet, SolverBody, BALL_CONSTRAINT_BETA};
use crate::math::{skew, solve_mat3};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::BallConstraint;

#[derive(Debug, Clone, Copy)]
pub struct BallConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    pub bias: Vec3,
    pub inv_effective_mass: Mat3,
}

/// `skew(r) * I⁻¹ * skew(r)ᵀ` summed over both bodies, plus the inverse masses on the diagonal.
pub(crate) fn point_inv_effective_mass(a: &RigidBodyState, b: &RigidBodyState, r_a: Vec3, r_b: Vec3) -> Mat3 {
    let skew_a = skew(r_a);
    let skew_b = skew(r_b);
    skew_a * a.inv_inertia * skew_a.transpose()
        + skew_b * b.inv_inertia * skew_b.transpose()
        + Mat3::from_diagonal(Vec3::splat(a.inv_mass + b.inv_mass))
}

pub fn initialize_ball_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, BallConstraint>,
    dt: f32,
    out: &mut Vec<BallConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let beta_dt = bias_scale(BALL_CONSTRAINT_BETA, dt);

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        out.push(BallConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            bias: (global_anchor_b - global_anchor_a) * beta_dt,
            inv_effective_mass: point_inv_effective_mass(global_a, global_b, rel_global_anchor_a, rel_global_anchor_b),
        });
    }
}

pub fn solve_ball_constraints(constraints: &mut [BallConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);

        let anchor_velocity_a = a.point_velocity(con.rel_global_anchor_a);
        let anchor_velocity_b = b.point_velocity(con.rel_global_anchor_b);
        let cdot = anchor_velocity_b - anchor_velocity_a + con.bias;

        let p = solve_mat3(&con.inv_effective_mass, -cdot);
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
    use glam::Quat;

    #[test]
    fn test_anchor_velocities_match_after_solve() {
        let mut bodies = vec![
            with_velocity(
                tilted_body(Vec3::ZERO, Quat::from_rotation_x(0.4), 2.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(0.3, 2.0, 0.0),
            ),
            with_velocity(sphere(Vec3::new(1.0, 0.0, 0.0), 1.0), Vec3::ZERO, Vec3::new(0.0, 0.0, -3.0)),
        ];
        let constraints = [BallConstraint::from_local_points(Vec3::new(0.5, 0.0, 0.0), Vec3::new(-0.5, 0.0, 0.0))];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_ball_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 0.0, &mut out);
        solve_ball_constraints(&mut out, &mut bodies);

        let con = &out[0];
        let va = bodies[0].point_velocity(con.rel_global_anchor_a);
        let vb = bodies[1].point_velocity(con.rel_global_anchor_b);
        assert!((vb - va).length() < 1e-4, "anchors still separate: {}", vb - va);
    }

    #[test]
    fn test_two_immovable_bodies_are_a_noop() {
        let mut bodies = vec![RigidBodyState::DUMMY, RigidBodyState::immovable(Vec3::X, Quat::IDENTITY)];
        let constraints = [BallConstraint::from_local_points(Vec3::ZERO, Vec3::ZERO)];
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_ball_constraints(&bodies, ConstraintSet::new(&constraints, &pairs), 1.0 / 60.0, &mut out);
        solve_ball_constraints(&mut out, &mut bodies);
        assert_eq!(bodies[0].linear_velocity, Vec3::ZERO);
        assert_eq!(bodies[1].linear_velocity, Vec3::ZERO);
        assert_eq!(bodies[1].angular_velocity, Vec3::ZERO);
    }
}
