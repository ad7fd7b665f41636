use std::f32::consts::PI;

use wide::{CmpGe, CmpGt, CmpLe};

use super::ball_wide::point_inv_effective_mass_wide;
use super::{
    bias_scale, inv_dt_or_zero, slot_bodies, ConstraintSet, BALL_CONSTRAINT_BETA, HINGE_LIMIT_CONSTRAINT_BETA,
    HINGE_ROTATION_CONSTRAINT_BETA,
};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{HingeConstraint, MotorType};
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    atan2, gather_f32, inverse_or_zero, mask_from_bools, select, solve_mat2, solve_mat3, splat, tangents, BodyLanes, FloatW, Mat2W, Mat3W,
    SolverBodyW, Vec2W, Vec3W, SIMD_WIDTH,
};

#[derive(Debug, Clone, Copy)]
pub struct HingeConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub translation_bias: Vec3W,
    pub inv_effective_translation_mass: Mat3W,

    pub bxa: Vec3W,
    pub cxa: Vec3W,
    pub rotation_bias: Vec2W,
    pub inv_effective_rotation_mass: Mat2W,

    pub global_rotation_axis: Vec3W,
    /// Zero in lanes without an active limit.
    pub limit_effective_mass: FloatW,
    /// Zero in lanes without a motor.
    pub motor_effective_mass: FloatW,
    pub limit_sign: FloatW,
    pub limit_bias: FloatW,
    pub limit_impulse: FloatW,
    pub motor_velocity: FloatW,
    pub max_motor_impulse: FloatW,
    pub motor_impulse: FloatW,
}

/// Axial effective mass per lane.
pub(crate) fn axial_effective_mass_wide(a: &BodyLanes, b: &BodyLanes, axis: Vec3W) -> FloatW {
    inverse_or_zero(axis.dot(a.inv_inertia.mul_vec3(axis)) + axis.dot(b.inv_inertia.mul_vec3(axis)))
}

pub fn initialize_hinge_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, HingeConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<HingeConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let zero = FloatW::ZERO;
    let dt_w = splat(dt);
    let inv_dt = splat(inv_dt_or_zero(dt));
    let translation_beta_dt = splat(bias_scale(BALL_CONSTRAINT_BETA, dt));
    let rotation_beta_dt = splat(bias_scale(HINGE_ROTATION_CONSTRAINT_BETA, dt));
    let limit_beta_dt = splat(bias_scale(HINGE_LIMIT_CONSTRAINT_BETA, dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let global_hinge_axis_a = global_a.rotation.rotate(Vec3W::gather(|i| input(i).local_hinge_axis_a));
        let global_hinge_axis_b = global_b.rotation.rotate(Vec3W::gather(|i| input(i).local_hinge_axis_b));
        let (global_tangent_b, global_bitangent_b) = tangents(global_hinge_axis_b);

        let bxa = global_tangent_b.cross(global_hinge_axis_a);
        let cxa = global_bitangent_b.cross(global_hinge_axis_a);
        let inv_inertia_sum = global_a.inv_inertia + global_b.inv_inertia;
        let i_bxa = inv_inertia_sum.mul_vec3(bxa);
        let i_cxa = inv_inertia_sum.mul_vec3(cxa);
        let inv_effective_rotation_mass = Mat2W {
            m00: bxa.dot(i_bxa),
            m01: bxa.dot(i_cxa),
            m10: cxa.dot(i_bxa),
            m11: cxa.dot(i_cxa),
        };
        let rotation_bias = Vec2W::new(
            global_hinge_axis_a.dot(global_tangent_b),
            global_hinge_axis_a.dot(global_bitangent_b),
        ) * rotation_beta_dt;

        // Limits and motor, masked per lane.
        let local_tangent_b = Vec3W::gather(|i| input(i).local_hinge_tangent_b);
        let compare = global_a
            .rotation
            .conjugate()
            .rotate(global_b.rotation.rotate(local_tangent_b));
        let angle = atan2(
            compare.dot(Vec3W::gather(|i| input(i).local_hinge_bitangent_a)),
            compare.dot(Vec3W::gather(|i| input(i).local_hinge_tangent_a)),
        );

        let min_limit = gather_f32(|i| input(i).min_rotation_limit);
        let max_limit = gather_f32(|i| input(i).max_rotation_limit);
        let max_motor_torque = gather_f32(|i| input(i).max_motor_torque);

        let min_enabled = min_limit.cmp_le(zero);
        let max_enabled = max_limit.cmp_ge(zero);
        let min_violated = min_enabled & angle.cmp_le(min_limit);
        let max_violated = max_enabled & angle.cmp_ge(max_limit);
        debug_assert!(
            (min_violated & max_violated).move_mask() == 0,
            "hinge angle violates both limits"
        );
        let solve_limit = min_violated | max_violated;
        let solve_motor = max_motor_torque.cmp_gt(zero);

        let effective_axial_mass = axial_effective_mass_wide(&global_a, &global_b, global_hinge_axis_a);

        let is_position_motor = mask_from_bools(std::array::from_fn(|i| input(i).motor_type == MotorType::Position));
        let clamped_target = gather_f32(|i| input(i).motor_target_angle)
            .max(select(min_enabled, min_limit, splat(-PI)))
            .min(select(max_enabled, max_limit, splat(PI)));
        let motor_velocity = select(
            is_position_motor,
            (clamped_target - angle) * inv_dt,
            gather_f32(|i| input(i).motor_velocity),
        );

        let d = select(min_violated, angle - min_limit, max_limit - angle);

        out.push(HingeConstraintBatch {
            body_a,
            body_b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            translation_bias: (global_anchor_b - global_anchor_a) * translation_beta_dt,
            inv_effective_translation_mass: point_inv_effective_mass_wide(
                &global_a,
                &global_b,
                rel_global_anchor_a,
                rel_global_anchor_b,
            ),
            bxa,
            cxa,
            rotation_bias,
            inv_effective_rotation_mass,
            global_rotation_axis: global_hinge_axis_a,
            limit_effective_mass: select(solve_limit, effective_axial_mass, zero),
            motor_effective_mass: select(solve_motor, effective_axial_mass, zero),
            limit_sign: select(min_violated, FloatW::ONE, -FloatW::ONE),
            limit_bias: select(solve_limit, d * limit_beta_dt, zero),
            limit_impulse: zero,
            motor_velocity: select(solve_motor, motor_velocity, zero),
            max_motor_impulse: select(solve_motor, max_motor_torque * dt_w, zero),
            motor_impulse: zero,
        });
    }
}

pub fn solve_hinge_constraints_wide(batches: &mut [HingeConstraintBatch], bodies: &mut [RigidBodyState]) {
    let zero = FloatW::ZERO;
    for batch in batches.iter_mut() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);
        let axis = batch.global_rotation_axis;

        // Motor.
        {
            let cdot = axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity) - batch.motor_velocity;
            let old_impulse = batch.motor_impulse;
            batch.motor_impulse = (old_impulse - batch.motor_effective_mass * cdot)
                .max(-batch.max_motor_impulse)
                .min(batch.max_motor_impulse);
            let lambda = batch.motor_impulse - old_impulse;
            a.apply_angular_impulse(-(axis * lambda));
            b.apply_angular_impulse(axis * lambda);
        }

        // Limit.
        {
            let rel = batch.limit_sign * (axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity));
            let cdot = rel + batch.limit_bias;
            let old_impulse = batch.limit_impulse;
            batch.limit_impulse = (old_impulse - batch.limit_effective_mass * cdot).max(zero);
            let lambda = (batch.limit_impulse - old_impulse) * batch.limit_sign;
            a.apply_angular_impulse(-(axis * lambda));
            b.apply_angular_impulse(axis * lambda);
        }

        // Rotation.
        {
            let delta = b.angular_velocity - a.angular_velocity;
            let cdot = Vec2W::new(batch.bxa.dot(delta), batch.cxa.dot(delta));
            let lambda = solve_mat2(&batch.inv_effective_rotation_mass, -(cdot + batch.rotation_bias));
            let p = batch.bxa * lambda.x + batch.cxa * lambda.y;
            a.apply_angular_impulse(-p);
            b.apply_angular_impulse(p);
        }

        // Position.
        {
            let anchor_velocity_a = a.point_velocity(batch.rel_global_anchor_a);
            let anchor_velocity_b = b.point_velocity(batch.rel_global_anchor_b);
            let cdot = anchor_velocity_b - anchor_velocity_a + batch.translation_bias;
            let p = solve_mat3(&batch.inv_effective_translation_mass, -cdot);
            a.apply_impulse(-p, batch.rel_global_anchor_a);
            b.apply_impulse(p, batch.rel_global_anchor_b);
        }

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
            // Pairs (2k, 2k+1) start hinged about a shared axis, then B is twisted by a growing angle.
            let mut bodies = Vec::new();
            let mut constraints = Vec::new();
            let mut pairs = Vec::new();
            let configs = [
                (0.0, 1.0, -1.0, None),
                (0.5, -0.3, 0.3, None),
                (-0.7, -0.3, 0.3, Some(MotorType::Velocity)),
                (0.2, 1.0, -1.0, Some(MotorType::Position)),
                (1.2, -2.0, 1.0, Some(MotorType::Position)),
            ];
            for (k, &(twist, min, max, motor)) in configs.iter().enumerate() {
                let base = Vec3::new(3.0 * k as f32, 0.0, 0.0);
                let axis = Vec3::new(0.2, 1.0, 0.1 * k as f32).normalize();
                let ta = Transform::from_position_rotation(base, Quat::from_rotation_x(0.1 * k as f32));
                let tb = Transform::from_position(base + Vec3::X);
                let mut hinge = HingeConstraint::from_global_points(&ta, &tb, base + Vec3::X * 0.5, axis, min, max);
                hinge = match motor {
                    Some(MotorType::Velocity) => hinge.with_velocity_motor(1.5, 4.0),
                    Some(MotorType::Position) => hinge.with_position_motor(0.4, 2.0),
                    None => hinge,
                };

                let twisted = Quat::from_axis_angle(axis, twist) * tb.rotation;
                bodies.push(tilted_body(ta.position, ta.rotation, 1.5));
                bodies.push(tilted_body(tb.position, twisted, 1.0));
                constraints.push(hinge);
                pairs.push(ConstraintBodyPair::new(2 * k as u16, 2 * k as u16 + 1));
            }
            let dummy = push_dummy(&mut bodies);
            // One more hinge against the world.
            bodies.push(tilted_body(Vec3::new(0.0, 5.0, 0.0), Quat::IDENTITY, 1.0));
            constraints.push(
                HingeConstraint::from_global_points(
                    &Transform::from_position(Vec3::new(0.0, 5.0, 0.0)),
                    &Transform::identity(),
                    Vec3::new(0.0, 5.5, 0.0),
                    Vec3::Z,
                    -0.5,
                    0.5,
                )
                .with_velocity_motor(-2.0, 1.0),
            );
            pairs.push(ConstraintBodyPair::new((bodies.len() - 1) as u16, dummy));
            set_velocities(&mut bodies, &velocities);

            let input = ConstraintInput {
                hinge: ConstraintSet::new(&constraints, &pairs),
                dummy,
                ..Default::default()
            };
            assert_backends_agree(&bodies, &input, 1.0 / 60.0, 8);
        }
    }
}
