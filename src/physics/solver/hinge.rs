use std::f32::consts::PI;

use glam::{Mat2, Mat3, Vec2, Vec3};

use super::ball::point_inv_effective_mass;
use super::{
    bias_scale, inv_dt_or_zero, ConstraintSet, SolverBody, BALL_CONSTRAINT_BETA, HINGE_LIMIT_CONSTRAINT_BETA,
    HINGE_ROTATION_CONSTRAINT_BETA,
};
use crate::math::{inverse_or_zero, solve_mat2, solve_mat3, tangents};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{HingeConstraint, MotorType};

#[derive(Debug, Clone, Copy)]
pub struct HingeConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    pub translation_bias: Vec3,
    pub inv_effective_translation_mass: Mat3,

    /// `tangent_b × axis_a` and `bitangent_b × axis_a`.
    pub bxa: Vec3,
    pub cxa: Vec3,
    pub rotation_bias: Vec2,
    pub inv_effective_rotation_mass: Mat2,

    pub solve_limit: bool,
    pub solve_motor: bool,
    pub global_rotation_axis: Vec3,
    pub effective_axial_mass: f32,
    /// `1` when the min limit is violated, `-1` for the max limit.
    pub limit_sign: f32,
    pub limit_bias: f32,
    pub limit_impulse: f32,
    pub motor_velocity: f32,
    pub max_motor_impulse: f32,
    pub motor_impulse: f32,
}

/// `1 / (axisᵀ I_A⁻¹ axis + axisᵀ I_B⁻¹ axis)`, or zero if both bodies are rotationally locked.
pub(crate) fn axial_effective_mass(a: &RigidBodyState, b: &RigidBodyState, axis: Vec3) -> f32 {
    inverse_or_zero(axis.dot(a.inv_inertia * axis) + axis.dot(b.inv_inertia * axis))
}

/// Signed rotation of B about the hinge axis, measured in A's tangent plane.
pub(crate) fn hinge_angle(input: &HingeConstraint, a: &RigidBodyState, b: &RigidBodyState) -> f32 {
    let compare = a.rotation.conjugate() * (b.rotation * input.local_hinge_tangent_b);
    compare
        .dot(input.local_hinge_bitangent_a)
        .atan2(compare.dot(input.local_hinge_tangent_a))
}

pub fn initialize_hinge_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, HingeConstraint>,
    dt: f32,
    out: &mut Vec<HingeConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let inv_dt = inv_dt_or_zero(dt);
    let translation_beta_dt = bias_scale(BALL_CONSTRAINT_BETA, dt);
    let rotation_beta_dt = bias_scale(HINGE_ROTATION_CONSTRAINT_BETA, dt);
    let limit_beta_dt = bias_scale(HINGE_LIMIT_CONSTRAINT_BETA, dt);

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        // Two rotational DOFs perpendicular to the hinge axis.
        let global_hinge_axis_a = global_a.rotation * input.local_hinge_axis_a;
        let global_hinge_axis_b = global_b.rotation * input.local_hinge_axis_b;
        let (global_tangent_b, global_bitangent_b) = tangents(global_hinge_axis_b);

        let bxa = global_tangent_b.cross(global_hinge_axis_a);
        let cxa = global_bitangent_b.cross(global_hinge_axis_a);
        let inv_inertia_sum = global_a.inv_inertia + global_b.inv_inertia;
        let i_bxa = inv_inertia_sum * bxa;
        let i_cxa = inv_inertia_sum * cxa;
        let inv_effective_rotation_mass = Mat2::from_cols(
            Vec2::new(bxa.dot(i_bxa), cxa.dot(i_bxa)),
            Vec2::new(bxa.dot(i_cxa), cxa.dot(i_cxa)),
        );
        let rotation_bias = Vec2::new(
            global_hinge_axis_a.dot(global_tangent_b),
            global_hinge_axis_a.dot(global_bitangent_b),
        ) * rotation_beta_dt;

        let mut con = HingeConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            rel_global_anchor_a,
            rel_global_anchor_b,
            translation_bias: (global_anchor_b - global_anchor_a) * translation_beta_dt,
            inv_effective_translation_mass: point_inv_effective_mass(
                global_a,
                global_b,
                rel_global_anchor_a,
                rel_global_anchor_b,
            ),
            bxa,
            cxa,
            rotation_bias,
            inv_effective_rotation_mass,
            solve_limit: false,
            solve_motor: false,
            global_rotation_axis: Vec3::ZERO,
            effective_axial_mass: 0.0,
            limit_sign: 0.0,
            limit_bias: 0.0,
            limit_impulse: 0.0,
            motor_velocity: 0.0,
            max_motor_impulse: 0.0,
            motor_impulse: 0.0,
        };

        let min_enabled = input.min_rotation_limit <= 0.0;
        let max_enabled = input.max_rotation_limit >= 0.0;
        let motor_enabled = input.max_motor_torque > 0.0;

        if min_enabled || max_enabled || motor_enabled {
            let angle = hinge_angle(input, global_a, global_b);

            let min_violated = min_enabled && angle <= input.min_rotation_limit;
            let max_violated = max_enabled && angle >= input.max_rotation_limit;
            debug_assert!(!(min_violated && max_violated), "hinge angle {angle} violates both limits");

            con.solve_limit = min_violated || max_violated;
            con.solve_motor = motor_enabled;

            if con.solve_limit || con.solve_motor {
                con.global_rotation_axis = global_hinge_axis_a;
                con.effective_axial_mass = axial_effective_mass(global_a, global_b, global_hinge_axis_a);
                con.limit_sign = if min_violated { 1.0 } else { -1.0 };
                con.max_motor_impulse = input.max_motor_torque * dt;

                con.motor_velocity = match input.motor_type {
                    MotorType::Velocity => input.motor_velocity,
                    MotorType::Position => {
                        // Reach the target within one step; the impulse bound caps the actual speed.
                        let min_limit = if min_enabled { input.min_rotation_limit } else { -PI };
                        let max_limit = if max_enabled { input.max_rotation_limit } else { PI };
                        let target_angle = input.motor_target_angle.clamp(min_limit, max_limit);
                        (target_angle - angle) * inv_dt
                    }
                };

                let d = if min_violated {
                    angle - input.min_rotation_limit
                } else {
                    input.max_rotation_limit - angle
                };
                con.limit_bias = d * limit_beta_dt;
            }
        }

        out.push(con);
    }
}

pub fn solve_hinge_constraints(constraints: &mut [HingeConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter_mut() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);

        // Least important first: motor, limit, rotation, position.
        let axis = con.global_rotation_axis;

        if con.solve_motor {
            let rel_angular_velocity = axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity);
            let cdot = rel_angular_velocity - con.motor_velocity;

            let old_impulse = con.motor_impulse;
            con.motor_impulse =
                (old_impulse - con.effective_axial_mass * cdot).clamp(-con.max_motor_impulse, con.max_motor_impulse);
            let lambda = con.motor_impulse - old_impulse;

            a.apply_angular_impulse(-axis * lambda);
            b.apply_angular_impulse(axis * lambda);
        }

        if con.solve_limit {
            let rel_angular_velocity = con.limit_sign * (axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity));
            let cdot = rel_angular_velocity + con.limit_bias;

            let old_impulse = con.limit_impulse;
            con.limit_impulse = (old_impulse - con.effective_axial_mass * cdot).max(0.0);
            let lambda = (con.limit_impulse - old_impulse) * con.limit_sign;

            a.apply_angular_impulse(-axis * lambda);
            b.apply_angular_impulse(axis * lambda);
        }

        {
            let delta_angular_velocity = b.angular_velocity - a.angular_velocity;
            let cdot = Vec2::new(con.bxa.dot(delta_angular_velocity), con.cxa.dot(delta_angular_velocity));
            let lambda = solve_mat2(&con.inv_effective_rotation_mass, -(cdot + con.rotation_bias));
            let p = con.bxa * lambda.x + con.cxa * lambda.y;

            a.apply_angular_impulse(-p);
            b.apply_angular_impulse(p);
        }

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
