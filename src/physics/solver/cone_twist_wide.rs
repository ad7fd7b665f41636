use std::f32::consts::PI;

use wide::{CmpGe, CmpGt, CmpLe};

use super::ball_wide::point_inv_effective_mass_wide;
use super::cone_twist::SWING_MOTOR_GAIN;
use super::hinge_wide::axial_effective_mass_wide;
use super::{
    bias_scale, inv_dt_or_zero, slot_bodies, ConstraintSet, BALL_CONSTRAINT_BETA, HINGE_LIMIT_CONSTRAINT_BETA,
    TWIST_LIMIT_CONSTRAINT_BETA,
};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{ConeTwistConstraint, MotorType};
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    atan2, axis_angle, gather_f32, mask_from_bools, rotate_from_to, select, solve_mat3, splat, BodyLanes, FloatW,
    Mat3W, QuatW, SolverBodyW, Vec3W, SIMD_WIDTH,
};

/// Effective masses and motor bounds are zero in lanes where that part is inactive.
#[derive(Debug, Clone, Copy)]
pub struct ConeTwistConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],
    pub rel_global_anchor_a: Vec3W,
    pub rel_global_anchor_b: Vec3W,
    pub translation_bias: Vec3W,
    pub inv_effective_translation_mass: Mat3W,

    pub global_swing_axis: Vec3W,
    pub effective_swing_limit_mass: FloatW,
    pub swing_limit_bias: FloatW,
    pub swing_limit_impulse: FloatW,

    pub global_swing_motor_axis: Vec3W,
    pub effective_swing_motor_mass: FloatW,
    pub swing_motor_velocity: FloatW,
    pub max_swing_motor_impulse: FloatW,
    pub swing_motor_impulse: FloatW,

    pub global_twist_axis: Vec3W,
    pub effective_twist_limit_mass: FloatW,
    pub effective_twist_motor_mass: FloatW,
    pub twist_limit_sign: FloatW,
    pub twist_limit_bias: FloatW,
    pub twist_limit_impulse: FloatW,
    pub twist_motor_velocity: FloatW,
    pub max_twist_motor_impulse: FloatW,
    pub twist_motor_impulse: FloatW,
}

pub fn initialize_cone_twist_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, ConeTwistConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<ConeTwistConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let zero = FloatW::ZERO;
    let dt_w = splat(dt);
    let inv_dt = splat(inv_dt_or_zero(dt));
    let translation_beta_dt = splat(bias_scale(BALL_CONSTRAINT_BETA, dt));
    let swing_beta_dt = splat(bias_scale(HINGE_LIMIT_CONSTRAINT_BETA, dt));
    let twist_beta_dt = splat(bias_scale(TWIST_LIMIT_CONSTRAINT_BETA, dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        // Swing/twist decomposition in A's space.
        let local_limit_axis_a = Vec3W::gather(|i| input(i).local_limit_axis_a);
        let local_limit_tangent_a = Vec3W::gather(|i| input(i).local_limit_tangent_a);
        let local_limit_bitangent_a = Vec3W::gather(|i| input(i).local_limit_bitangent_a);
        let b_to_a = global_a.rotation.conjugate() * global_b.rotation;
        let compare_axis = b_to_a.rotate(Vec3W::gather(|i| input(i).local_limit_axis_b));
        let swing = rotate_from_to(local_limit_axis_a, compare_axis);

        let twist_tangent = swing.rotate(local_limit_tangent_a);
        let twist_bitangent = swing.rotate(local_limit_bitangent_a);
        let compare_tangent = b_to_a.rotate(Vec3W::gather(|i| input(i).local_limit_tangent_b));
        let twist_angle = atan2(compare_tangent.dot(twist_bitangent), compare_tangent.dot(twist_tangent));

        // Swing limit.
        let swing_limit = gather_f32(|i| input(i).swing_limit);
        let swing_enabled = swing_limit.cmp_ge(zero);
        let (swing_axis, swing_angle) = axis_angle(swing);
        let solve_swing_limit = swing_enabled & swing_angle.cmp_ge(swing_limit);
        let global_swing_axis = global_a.rotation.rotate(swing_axis);
        let swing_limit_mass = axial_effective_mass_wide(&global_a, &global_b, global_swing_axis);

        // Swing motor.
        let max_swing_motor_torque = gather_f32(|i| input(i).max_swing_motor_torque);
        let solve_swing_motor = max_swing_motor_torque.cmp_gt(zero);
        let (sin, cos) = gather_f32(|i| input(i).swing_motor_axis).sin_cos();
        let local_motor_axis = local_limit_tangent_a * cos + local_limit_bitangent_a * sin;

        let swing_target = gather_f32(|i| input(i).swing_motor_target_angle);
        let swing_target = select(swing_enabled, swing_target.max(-swing_limit).min(swing_limit), swing_target);
        let target_direction = QuatW::from_axis_angle(local_motor_axis, swing_target).rotate(local_limit_axis_a);
        let delta_angle = target_direction.dot(compare_axis).max(zero).min(FloatW::ONE).acos();

        let is_swing_position_motor =
            mask_from_bools(std::array::from_fn(|i| input(i).swing_motor_type == MotorType::Position));
        let local_swing_motor_axis = select(
            is_swing_position_motor,
            compare_axis.cross(target_direction).noz(),
            local_motor_axis,
        );
        let swing_motor_velocity = select(
            is_swing_position_motor,
            delta_angle * inv_dt * splat(SWING_MOTOR_GAIN),
            gather_f32(|i| input(i).swing_motor_velocity),
        );
        let global_swing_motor_axis = global_a.rotation.rotate(local_swing_motor_axis);
        let swing_motor_mass = axial_effective_mass_wide(&global_a, &global_b, global_swing_motor_axis);

        // Twist limit and motor.
        let twist_limit = gather_f32(|i| input(i).twist_limit);
        let twist_enabled = twist_limit.cmp_ge(zero);
        let min_violated = twist_enabled & twist_angle.cmp_le(-twist_limit);
        let max_violated = twist_enabled & twist_angle.cmp_ge(twist_limit);
        debug_assert!(
            (min_violated & max_violated).move_mask() == 0,
            "twist angle violates both limits"
        );
        let solve_twist_limit = min_violated | max_violated;
        let max_twist_motor_torque = gather_f32(|i| input(i).max_twist_motor_torque);
        let solve_twist_motor = max_twist_motor_torque.cmp_gt(zero);

        let global_twist_axis = global_a.rotation.rotate(local_limit_axis_a);
        let twist_mass = axial_effective_mass_wide(&global_a, &global_b, global_twist_axis);

        let is_twist_position_motor =
            mask_from_bools(std::array::from_fn(|i| input(i).twist_motor_type == MotorType::Position));
        let twist_range = select(twist_enabled, twist_limit, splat(PI));
        let twist_target = gather_f32(|i| input(i).twist_motor_target_angle)
            .max(-twist_range)
            .min(twist_range);
        let twist_motor_velocity = select(
            is_twist_position_motor,
            (twist_target - twist_angle) * inv_dt,
            gather_f32(|i| input(i).twist_motor_velocity),
        );
        let d = select(min_violated, twist_limit + twist_angle, twist_limit - twist_angle);

        out.push(ConeTwistConstraintBatch {
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
            global_swing_axis,
            effective_swing_limit_mass: select(solve_swing_limit, swing_limit_mass, zero),
            swing_limit_bias: select(solve_swing_limit, (swing_limit - swing_angle) * swing_beta_dt, zero),
            swing_limit_impulse: zero,
            global_swing_motor_axis,
            effective_swing_motor_mass: select(solve_swing_motor, swing_motor_mass, zero),
            swing_motor_velocity: select(solve_swing_motor, swing_motor_velocity, zero),
            max_swing_motor_impulse: select(solve_swing_motor, max_swing_motor_torque * dt_w, zero),
            swing_motor_impulse: zero,
            global_twist_axis,
            effective_twist_limit_mass: select(solve_twist_limit, twist_mass, zero),
            effective_twist_motor_mass: select(solve_twist_motor, twist_mass, zero),
            twist_limit_sign: select(min_violated, FloatW::ONE, -FloatW::ONE),
            twist_limit_bias: select(solve_twist_limit, d * twist_beta_dt, zero),
            twist_limit_impulse: zero,
            twist_motor_velocity: select(solve_twist_motor, twist_motor_velocity, zero),
            max_twist_motor_impulse: select(solve_twist_motor, max_twist_motor_torque * dt_w, zero),
            twist_motor_impulse: zero,
        });
    }
}

#[inline]
fn motor_lambda(
    a: &SolverBodyW,
    b: &SolverBodyW,
    axis: Vec3W,
    effective_mass: FloatW,
    velocity: FloatW,
    max_impulse: FloatW,
    accumulated: &mut FloatW,
) -> FloatW {
    let cdot = axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity) - velocity;
    let old_impulse = *accumulated;
    *accumulated = (old_impulse - effective_mass * cdot).max(-max_impulse).min(max_impulse);
    *accumulated - old_impulse
}

pub fn solve_cone_twist_constraints_wide(batches: &mut [ConeTwistConstraintBatch], bodies: &mut [RigidBodyState]) {
    let zero = FloatW::ZERO;
    for batch in batches.iter_mut() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);
        let twist_axis = batch.global_twist_axis;

        let lambda = motor_lambda(
            &a,
            &b,
            twist_axis,
            batch.effective_twist_motor_mass,
            batch.twist_motor_velocity,
            batch.max_twist_motor_impulse,
            &mut batch.twist_motor_impulse,
        );
        a.apply_angular_impulse(-(twist_axis * lambda));
        b.apply_angular_impulse(twist_axis * lambda);

        let swing_motor_axis = batch.global_swing_motor_axis;
        let lambda = motor_lambda(
            &a,
            &b,
            swing_motor_axis,
            batch.effective_swing_motor_mass,
            batch.swing_motor_velocity,
            batch.max_swing_motor_impulse,
            &mut batch.swing_motor_impulse,
        );
        a.apply_angular_impulse(-(swing_motor_axis * lambda));
        b.apply_angular_impulse(swing_motor_axis * lambda);

        // Twist limit.
        {
            let rel = batch.twist_limit_sign * (twist_axis.dot(b.angular_velocity) - twist_axis.dot(a.angular_velocity));
            let cdot = rel + batch.twist_limit_bias;
            let old_impulse = batch.twist_limit_impulse;
            batch.twist_limit_impulse = (old_impulse - batch.effective_twist_limit_mass * cdot).max(zero);
            let lambda = (batch.twist_limit_impulse - old_impulse) * batch.twist_limit_sign;
            a.apply_angular_impulse(-(twist_axis * lambda));
            b.apply_angular_impulse(twist_axis * lambda);
        }

        // Swing limit.
        {
            let axis = batch.global_swing_axis;
            let cdot = axis.dot(a.angular_velocity) - axis.dot(b.angular_velocity) + batch.swing_limit_bias;
            let old_impulse = batch.swing_limit_impulse;
            batch.swing_limit_impulse = (old_impulse - batch.effective_swing_limit_mass * cdot).max(zero);
            let lambda = batch.swing_limit_impulse - old_impulse;
            a.apply_angular_impulse(axis * lambda);
            b.apply_angular_impulse(-(axis * lambda));
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
