use super::ball_wide::point_inv_effective_mass_wide;
use super::{bias_scale, slot_bodies, ConstraintSet, BALL_CONSTRAINT_BETA, SLIDER_CONSTRAINT_BETA};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::FixedConstraint;
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    rotation_error, solve_mat3, splat, BodyLanes, Mat3W, QuatW, SolverBodyW, Vec3W, SIMD_WIDTH,
};

#[derive(Debug, Clone, Copy)]
pub struct FixedConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub translation_bias: Vec3W,
    pub rotation_bias: Vec3W,
    pub inv_effective_translation_mass: Mat3W,
    pub inv_effective_rotation_mass: Mat3W,
}

pub fn initialize_fixed_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, FixedConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<FixedConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let translation_beta_dt = splat(bias_scale(BALL_CONSTRAINT_BETA, dt));
    let rotation_beta_dt = splat(bias_scale(SLIDER_CONSTRAINT_BETA, dt) * 2.0);

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let initial_inv_rotation_difference = QuatW::gather(|i| input(i).initial_inv_rotation_difference);
        let error = rotation_error(global_a.rotation, global_b.rotation, initial_inv_rotation_difference);

        out.push(FixedConstraintBatch {
            body_a,
            body_b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            translation_bias: (global_anchor_b - global_anchor_a) * translation_beta_dt,
            rotation_bias: error * rotation_beta_dt,
            inv_effective_translation_mass: point_inv_effective_mass_wide(
                &global_a,
                &global_b,
                rel_global_anchor_a,
                rel_global_anchor_b,
            ),
            inv_effective_rotation_mass: global_a.inv_inertia + global_b.inv_inertia,
        });
    }
}

pub fn solve_fixed_constraints_wide(batches: &mut [FixedConstraintBatch], bodies: &mut [RigidBodyState]) {
    for batch in batches.iter() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);

        let cdot = b.angular_velocity - a.angular_velocity;
        let lambda = solve_mat3(&batch.inv_effective_rotation_mass, -(cdot + batch.rotation_bias));
        a.apply_angular_impulse(-lambda);
        b.apply_angular_impulse(lambda);

        let anchor_velocity_a = a.point_velocity(batch.rel_global_anchor_a);
        let anchor_velocity_b = b.point_velocity(batch.rel_global_anchor_b);
        let cdot = anchor_velocity_b - anchor_velocity_a + batch.translation_bias;
        let p = solve_mat3(&batch.inv_effective_translation_mass, -cdot);
        a.apply_impulse(-p, batch.rel_global_anchor_a);
        b.apply_impulse(p, batch.rel_global_anchor_b);

        a.scatter(bodies, &batch.body_a);
        b.scatter(bodies, &batch.body_b);
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use proptest::prelude::*;

    use super::*;
    use crate::physics::body::ConstraintBodyPair;
    use crate::physics::solver::test_util::*;
    use crate::physics::solver::ConstraintInput;
    use crate::transform::Transform;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_matches_scalar(velocities in body_velocities()) {
            let poses: Vec<_> = (0..8)
                .map(|i| {
                    Transform::from_position_rotation(
                        Vec3::new(i as f32, 0.1 * i as f32, 0.0),
                        Quat::from_euler(glam::EulerRot::XYZ, 0.1 * i as f32, -0.2, 0.05 * i as f32),
                    )
                })
                .collect();
            let mut bodies: Vec<_> = poses.iter().map(|t| tilted_body(t.position, t.rotation, 2.0)).collect();
            let dummy = push_dummy(&mut bodies);
            set_velocities(&mut bodies, &velocities);

            let world = Transform::identity();
            let constraints = [
                FixedConstraint::from_global_points(&poses[0], &poses[1], Vec3::new(0.5, 0.0, 0.0)),
                FixedConstraint::from_global_points(&poses[2], &poses[3], Vec3::new(2.5, 0.3, 0.0)),
                FixedConstraint::from_global_points(&poses[4], &world, Vec3::new(4.0, 0.4, 0.0)),
                // Deliberately drifted: the snapshot disagrees with the current poses.
                FixedConstraint::from_local_points(Vec3::new(0.3, 0.0, 0.0), Vec3::new(-0.3, 0.1, 0.0)),
            ];
            let pairs = [
                ConstraintBodyPair::new(0, 1),
                ConstraintBodyPair::new(2, 3),
                ConstraintBodyPair::new(4, dummy),
                ConstraintBodyPair::new(5, 6),
            ];
            let input = ConstraintInput {
                fixed: ConstraintSet::new(&constraints, &pairs),
                dummy,
                ..Default::default()
            };
            assert_backends_agree(&bodies, &input, 1.0 / 60.0, 8);
        }
    }
}
