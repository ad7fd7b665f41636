use wide::{CmpGe, CmpGt, CmpLe, CmpLt};

use super::{bias_scale, inv_dt_or_zero, slot_bodies, ConstraintSet, SLIDER_CONSTRAINT_BETA, SLIDER_LIMIT_CONSTRAINT_BETA};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{MotorType, SliderConstraint};
use crate::physics::scheduler::ConstraintSlot;
use crate::physics::wide::{
    gather_f32, inverse_or_zero, mask_from_bools, rotation_error, select, solve_mat2, solve_mat3, splat, tangents,
    BodyLanes, FloatW, Mat2W, Mat3W, QuatW, SolverBodyW, Vec2W, Vec3W, SIMD_WIDTH,
};

#[derive(Debug, Clone, Copy)]
pub struct SliderConstraintBatch {
    pub body_a: [BodyIndex; SIMD_WIDTH],
    pub body_b: [BodyIndex; SIMD_WIDTH],

    pub tangent: Vec3W,
    pub bitangent: Vec3W,
    pub rbxt: Vec3W,
    pub rbxb: Vec3W,
    pub rauxt: Vec3W,
    pub rauxb: Vec3W,
    pub translation_bias: Vec2W,
    pub inv_effective_translation_mass: Mat2W,

    pub rotation_bias: Vec3W,
    pub inv_effective_rotation_mass: Mat3W,

    pub global_slider_axis: Vec3W,

    pub rauxs: Vec3W,
    pub rbxs: Vec3W,
    /// Zero in lanes without a violated limit.
    pub effective_axial_mass: FloatW,
    pub limit_sign: FloatW,
    pub limit_bias: FloatW,
    pub limit_impulse: FloatW,

    pub motor_velocity: FloatW,
    /// Zero in lanes without a motor.
    pub max_motor_impulse: FloatW,
    pub motor_impulse: FloatW,
}

pub fn initialize_slider_constraints_wide(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, SliderConstraint>,
    slots: &[ConstraintSlot],
    dt: f32,
    out: &mut Vec<SliderConstraintBatch>,
) {
    out.clear();
    out.reserve(slots.len());
    let zero = FloatW::ZERO;
    let dt_w = splat(dt);
    let inv_dt = splat(inv_dt_or_zero(dt));
    let translation_beta_dt = splat(bias_scale(SLIDER_CONSTRAINT_BETA, dt));
    let rotation_beta_dt = splat(bias_scale(SLIDER_CONSTRAINT_BETA, dt) * 2.0);
    let limit_beta_dt = splat(bias_scale(SLIDER_LIMIT_CONSTRAINT_BETA, dt));

    for slot in slots {
        let (body_a, body_b) = slot_bodies(set.pairs, slot);
        let input = |i: usize| &set.constraints[slot.indices[i] as usize];

        let global_a = BodyLanes::gather(bodies, &body_a);
        let global_b = BodyLanes::gather(bodies, &body_b);

        let rel_global_anchor_a = global_a.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_a));
        let rel_global_anchor_b = global_b.relative_anchor(Vec3W::gather(|i| input(i).local_anchor_b));
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let global_slider_axis = global_a.rotation.rotate(Vec3W::gather(|i| input(i).local_axis_a));
        let (tangent, bitangent) = tangents(global_slider_axis);
        let u = global_anchor_b - global_anchor_a;

        let rau = rel_global_anchor_a + u;
        let rbxt = rel_global_anchor_b.cross(tangent);
        let rbxb = rel_global_anchor_b.cross(bitangent);
        let rauxt = rau.cross(tangent);
        let rauxb = rau.cross(bitangent);

        let ia_rauxt = global_a.inv_inertia.mul_vec3(rauxt);
        let ia_rauxb = global_a.inv_inertia.mul_vec3(rauxb);
        let ib_rbxt = global_b.inv_inertia.mul_vec3(rbxt);
        let ib_rbxb = global_b.inv_inertia.mul_vec3(rbxb);
        let inv_mass_sum = global_a.inv_mass + global_b.inv_mass;

        let inv_effective_translation_mass = Mat2W {
            m00: rauxt.dot(ia_rauxt) + rbxt.dot(ib_rbxt) + inv_mass_sum,
            m01: rauxt.dot(ia_rauxb) + rbxt.dot(ib_rbxb),
            m10: rauxb.dot(ia_rauxt) + rbxb.dot(ib_rbxt),
            m11: rauxb.dot(ia_rauxb) + rbxb.dot(ib_rbxb) + inv_mass_sum,
        };

        let error = rotation_error(
            global_a.rotation,
            global_b.rotation,
            QuatW::gather(|i| input(i).initial_inv_rotation_difference),
        );

        // Limit.
        let distance = u.dot(global_slider_axis);
        let neg_limit = gather_f32(|i| input(i).neg_distance_limit);
        let pos_limit = gather_f32(|i| input(i).pos_distance_limit);
        let min_enabled = neg_limit.cmp_le(zero);
        let max_enabled = pos_limit.cmp_ge(zero);
        let min_violated = min_enabled & distance.cmp_lt(neg_limit);
        let max_violated = max_enabled & distance.cmp_gt(pos_limit);
        debug_assert!(
            (min_violated & max_violated).move_mask() == 0,
            "slider distance violates both limits"
        );
        let solve_limit = min_violated | max_violated;

        let rauxs = rau.cross(global_slider_axis);
        let rbxs = rel_global_anchor_b.cross(global_slider_axis);
        let effective_axial_mass = inverse_or_zero(
            inv_mass_sum
                + rauxs.dot(global_a.inv_inertia.mul_vec3(rauxs))
                + rbxs.dot(global_b.inv_inertia.mul_vec3(rbxs)),
        );
        let d = select(min_violated, distance - neg_limit, pos_limit - distance);

        // Motor.
        let max_motor_force = gather_f32(|i| input(i).max_motor_force);
        let solve_motor = max_motor_force.cmp_gt(zero);
        let is_position_motor = mask_from_bools(std::array::from_fn(|i| input(i).motor_type == MotorType::Position));
        let target_distance = gather_f32(|i| input(i).motor_target_distance)
            .max(select(min_enabled, neg_limit, splat(f32::NEG_INFINITY)))
            .min(select(max_enabled, pos_limit, splat(f32::INFINITY)));
        let motor_velocity = select(
            is_position_motor,
            (target_distance - distance) * inv_dt,
            gather_f32(|i| input(i).motor_velocity),
        );

        out.push(SliderConstraintBatch {
            body_a,
            body_b,
            tangent,
            bitangent,
            rbxt,
            rbxb,
            rauxt,
            rauxb,
            translation_bias: Vec2W::new(u.dot(tangent), u.dot(bitangent)) * translation_beta_dt,
            inv_effective_translation_mass,
            rotation_bias: error * rotation_beta_dt,
            inv_effective_rotation_mass: global_a.inv_inertia + global_b.inv_inertia,
            global_slider_axis,
            rauxs,
            rbxs,
            effective_axial_mass: select(solve_limit, effective_axial_mass, zero),
            limit_sign: select(min_violated, FloatW::ONE, -FloatW::ONE),
            limit_bias: select(solve_limit, d * limit_beta_dt, zero),
            limit_impulse: zero,
            motor_velocity: select(solve_motor, motor_velocity, zero),
            max_motor_impulse: select(solve_motor, max_motor_force * dt_w, zero),
            motor_impulse: zero,
        });
    }
}

pub fn solve_slider_constraints_wide(batches: &mut [SliderConstraintBatch], bodies: &mut [RigidBodyState]) {
    let zero = FloatW::ZERO;
    for batch in batches.iter_mut() {
        let mut a = SolverBodyW::gather(bodies, &batch.body_a);
        let mut b = SolverBodyW::gather(bodies, &batch.body_b);
        let axis = batch.global_slider_axis;

        // Motor.
        {
            let cdot = b.linear_velocity.dot(axis) - a.linear_velocity.dot(axis) - batch.motor_velocity;
            let mass = inverse_or_zero(a.inv_mass + b.inv_mass);
            let old_impulse = batch.motor_impulse;
            batch.motor_impulse = (old_impulse - mass * cdot)
                .max(-batch.max_motor_impulse)
                .min(batch.max_motor_impulse);
            let p = axis * (batch.motor_impulse - old_impulse);
            a.linear_velocity -= p * a.inv_mass;
            b.linear_velocity += p * b.inv_mass;
        }

        // Limit.
        {
            let cdot = b.linear_velocity.dot(axis) + b.angular_velocity.dot(batch.rbxs)
                - a.linear_velocity.dot(axis)
                - a.angular_velocity.dot(batch.rauxs);
            let old_impulse = batch.limit_impulse;
            batch.limit_impulse = (old_impulse
                - batch.effective_axial_mass * (batch.limit_sign * cdot + batch.limit_bias))
                .max(zero);
            let lambda = (batch.limit_impulse - old_impulse) * batch.limit_sign;
            let p = axis * lambda;
            a.linear_velocity -= p * a.inv_mass;
            a.apply_angular_impulse(-(batch.rauxs * lambda));
            b.linear_velocity += p * b.inv_mass;
            b.apply_angular_impulse(batch.rbxs * lambda);
        }

        // Rotation.
        {
            let cdot = b.angular_velocity - a.angular_velocity;
            let lambda = solve_mat3(&batch.inv_effective_rotation_mass, -(cdot + batch.rotation_bias));
            a.apply_angular_impulse(-lambda);
            b.apply_angular_impulse(lambda);
        }

        // Position.
        {
            let cdot = Vec2W::new(
                batch.tangent.dot(b.linear_velocity) + batch.rbxt.dot(b.angular_velocity)
                    - batch.tangent.dot(a.linear_velocity)
                    - batch.rauxt.dot(a.angular_velocity),
                batch.bitangent.dot(b.linear_velocity) + batch.rbxb.dot(b.angular_velocity)
                    - batch.bitangent.dot(a.linear_velocity)
                    - batch.rauxb.dot(a.angular_velocity),
            );
            let lambda = solve_mat2(&batch.inv_effective_translation_mass, -(cdot + batch.translation_bias));
            let p = batch.tangent * lambda.x + batch.bitangent * lambda.y;
            a.linear_velocity -= p * a.inv_mass;
            a.apply_angular_impulse(-(batch.rauxt * lambda.x + batch.rauxb * lambda.y));
            b.linear_velocity += p * b.inv_mass;
            b.apply_angular_impulse(batch.rbxt * lambda.x + batch.rbxb * lambda.y);
        }

        a.scatter(bodies, &batch.body_a);
        b.scatter(bodies, &batch.body_b);
    }
}
