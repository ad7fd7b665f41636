use std::f32::consts::PI;

use glam::{Mat3, Quat, Vec3};

use super::ball::point_inv_effective_mass;
use super::hinge::axial_effective_mass;
use super::{
    bias_scale, inv_dt_or_zero, ConstraintSet, SolverBody, BALL_CONSTRAINT_BETA, HINGE_LIMIT_CONSTRAINT_BETA,
    TWIST_LIMIT_CONSTRAINT_BETA,
};
use crate::math::{axis_angle, noz, rotate_from_to, solve_mat3};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{ConeTwistConstraint, MotorType};

/// Fraction of the remaining swing angle a position motor tries to close per step.
pub(crate) const SWING_MOTOR_GAIN: f32 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct ConeTwistConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,
    pub rel_global_anchor_a: Vec3,
    pub rel_global_anchor_b: Vec3,
    pub translation_bias: Vec3,
    pub inv_effective_translation_mass: Mat3,

    pub solve_swing_limit: bool,
    pub global_swing_axis: Vec3,
    pub effective_swing_limit_mass: f32,
    pub swing_limit_bias: f32,
    pub swing_limit_impulse: f32,

    pub solve_swing_motor: bool,
    pub global_swing_motor_axis: Vec3,
    pub effective_swing_motor_mass: f32,
    pub swing_motor_velocity: f32,
    pub max_swing_motor_impulse: f32,
    pub swing_motor_impulse: f32,

    pub solve_twist_limit: bool,
    pub solve_twist_motor: bool,
    pub global_twist_axis: Vec3,
    pub effective_twist_mass: f32,
    pub twist_limit_sign: f32,
    pub twist_limit_bias: f32,
    pub twist_limit_impulse: f32,
    pub twist_motor_velocity: f32,
    pub max_twist_motor_impulse: f32,
    pub twist_motor_impulse: f32,
}

/// Swing rotation and twist angle of B relative to A, both in A's local space.
///
/// The swing takes A's limit axis onto B's; the twist is what remains about the swung axis.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SwingTwist {
    /// B's limit axis expressed in A's space.
    pub compare_axis: Vec3,
    pub swing: Quat,
    pub twist_angle: f32,
}

pub(crate) fn swing_twist(input: &ConeTwistConstraint, a: &RigidBodyState, b: &RigidBodyState) -> SwingTwist {
    let b_to_a = a.rotation.conjugate() * b.rotation;
    let compare_axis = b_to_a * input.local_limit_axis_b;
    let swing = rotate_from_to(input.local_limit_axis_a, compare_axis);

    let twist_tangent = swing * input.local_limit_tangent_a;
    let twist_bitangent = swing * input.local_limit_bitangent_a;
    let compare_tangent = b_to_a * input.local_limit_tangent_b;
    let twist_angle = compare_tangent
        .dot(twist_bitangent)
        .atan2(compare_tangent.dot(twist_tangent));

    SwingTwist {
        compare_axis,
        swing,
        twist_angle,
    }
}

pub fn initialize_cone_twist_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, ConeTwistConstraint>,
    dt: f32,
    out: &mut Vec<ConeTwistConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let inv_dt = inv_dt_or_zero(dt);
    let translation_beta_dt = bias_scale(BALL_CONSTRAINT_BETA, dt);
    let swing_beta_dt = bias_scale(HINGE_LIMIT_CONSTRAINT_BETA, dt);
    let twist_beta_dt = bias_scale(TWIST_LIMIT_CONSTRAINT_BETA, dt);

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let mut con = ConeTwistConstraintUpdate {
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
            solve_swing_limit: false,
            global_swing_axis: Vec3::ZERO,
            effective_swing_limit_mass: 0.0,
            swing_limit_bias: 0.0,
            swing_limit_impulse: 0.0,
            solve_swing_motor: false,
            global_swing_motor_axis: Vec3::ZERO,
            effective_swing_motor_mass: 0.0,
            swing_motor_velocity: 0.0,
            max_swing_motor_impulse: 0.0,
            swing_motor_impulse: 0.0,
            solve_twist_limit: false,
            solve_twist_motor: false,
            global_twist_axis: Vec3::ZERO,
            effective_twist_mass: 0.0,
            twist_limit_sign: 0.0,
            twist_limit_bias: 0.0,
            twist_limit_impulse: 0.0,
            twist_motor_velocity: 0.0,
            max_twist_motor_impulse: 0.0,
            twist_motor_impulse: 0.0,
        };

        let SwingTwist {
            compare_axis,
            swing,
            twist_angle,
        } = swing_twist(input, global_a, global_b);

        // Swing limit.
        let (swing_axis, swing_angle) = axis_angle(swing);
        con.solve_swing_limit = input.swing_limit >= 0.0 && swing_angle >= input.swing_limit;
        if con.solve_swing_limit {
            con.global_swing_axis = global_a.rotation * swing_axis;
            con.effective_swing_limit_mass = axial_effective_mass(global_a, global_b, con.global_swing_axis);
            con.swing_limit_bias = (input.swing_limit - swing_angle) * swing_beta_dt;
        }

        // Swing motor.
        con.solve_swing_motor = input.max_swing_motor_torque > 0.0;
        if con.solve_swing_motor {
            con.max_swing_motor_impulse = input.max_swing_motor_torque * dt;

            let (sin, cos) = input.swing_motor_axis.sin_cos();
            let local_motor_axis = cos * input.local_limit_tangent_a + sin * input.local_limit_bitangent_a;

            let (local_axis, velocity) = match input.swing_motor_type {
                MotorType::Velocity => (local_motor_axis, input.swing_motor_velocity),
                MotorType::Position => {
                    let target_angle = if input.swing_limit >= 0.0 {
                        input
                            .swing_motor_target_angle
                            .clamp(-input.swing_limit, input.swing_limit)
                    } else {
                        input.swing_motor_target_angle
                    };
                    let target_direction =
                        Quat::from_axis_angle(local_motor_axis, target_angle) * input.local_limit_axis_a;
                    let delta_angle = target_direction.dot(compare_axis).clamp(0.0, 1.0).acos();
                    (
                        noz(compare_axis.cross(target_direction)),
                        delta_angle * inv_dt * SWING_MOTOR_GAIN,
                    )
                }
            };
            con.global_swing_motor_axis = global_a.rotation * local_axis;
            con.swing_motor_velocity = velocity;
            con.effective_swing_motor_mass = axial_effective_mass(global_a, global_b, con.global_swing_motor_axis);
        }

        // Twist limit and motor share one axis.
        let twist_enabled = input.twist_limit >= 0.0;
        let min_violated = twist_enabled && twist_angle <= -input.twist_limit;
        let max_violated = twist_enabled && twist_angle >= input.twist_limit;
        debug_assert!(!(min_violated && max_violated), "twist angle {twist_angle} violates both limits");

        con.solve_twist_limit = min_violated || max_violated;
        con.solve_twist_motor = input.max_twist_motor_torque > 0.0;
        if con.solve_twist_limit || con.solve_twist_motor {
            con.global_twist_axis = global_a.rotation * input.local_limit_axis_a;
            con.effective_twist_mass = axial_effective_mass(global_a, global_b, con.global_twist_axis);
            con.twist_limit_sign = if min_violated { 1.0 } else { -1.0 };
            con.max_twist_motor_impulse = input.max_twist_motor_torque * dt;

            con.twist_motor_velocity = match input.twist_motor_type {
                MotorType::Velocity => input.twist_motor_velocity,
                MotorType::Position => {
                    let limit = if twist_enabled { input.twist_limit } else { PI };
                    let target_angle = input.twist_motor_target_angle.clamp(-limit, limit);
                    (target_angle - twist_angle) * inv_dt
                }
            };

            let d = if min_violated {
                input.twist_limit + twist_angle
            } else {
                input.twist_limit - twist_angle
            };
            con.twist_limit_bias = d * twist_beta_dt;
        }

        out.push(con);
    }
}

/// Clamped motor step about `axis`; returns the applied delta impulse.
#[inline]
fn motor_lambda(
    a: &SolverBody,
    b: &SolverBody,
    axis: Vec3,
    effective_mass: f32,
    velocity: f32,
    max_impulse: f32,
    accumulated: &mut f32,
) -> f32 {
    let cdot = axis.dot(b.angular_velocity) - axis.dot(a.angular_velocity) - velocity;
    let old_impulse = *accumulated;
    *accumulated = (old_impulse - effective_mass * cdot).clamp(-max_impulse, max_impulse);
    *accumulated - old_impulse
}

pub fn solve_cone_twist_constraints(constraints: &mut [ConeTwistConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter_mut() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);

        let twist_axis = con.global_twist_axis;

        if con.solve_twist_motor {
            let lambda = motor_lambda(
                &a,
                &b,
                twist_axis,
                con.effective_twist_mass,
                con.twist_motor_velocity,
                con.max_twist_motor_impulse,
                &mut con.twist_motor_impulse,
            );
            a.apply_angular_impulse(-twist_axis * lambda);
            b.apply_angular_impulse(twist_axis * lambda);
        }

        if con.solve_swing_motor {
            let axis = con.global_swing_motor_axis;
            let lambda = motor_lambda(
                &a,
                &b,
                axis,
                con.effective_swing_motor_mass,
                con.swing_motor_velocity,
                con.max_swing_motor_impulse,
                &mut con.swing_motor_impulse,
            );
            a.apply_angular_impulse(-axis * lambda);
            b.apply_angular_impulse(axis * lambda);
        }

        if con.solve_twist_limit {
            let rel = con.twist_limit_sign * (twist_axis.dot(b.angular_velocity) - twist_axis.dot(a.angular_velocity));
            let cdot = rel + con.twist_limit_bias;

            let old_impulse = con.twist_limit_impulse;
            con.twist_limit_impulse = (old_impulse - con.effective_twist_mass * cdot).max(0.0);
            let lambda = (con.twist_limit_impulse - old_impulse) * con.twist_limit_sign;

            a.apply_angular_impulse(-twist_axis * lambda);
            b.apply_angular_impulse(twist_axis * lambda);
        }

        // Cone: the impulse only ever closes the swing.
        if con.solve_swing_limit {
            let axis = con.global_swing_axis;
            let cdot = axis.dot(a.angular_velocity) - axis.dot(b.angular_velocity) + con.swing_limit_bias;

            let old_impulse = con.swing_limit_impulse;
            con.swing_limit_impulse = (old_impulse - con.effective_swing_limit_mass * cdot).max(0.0);
            let lambda = con.swing_limit_impulse - old_impulse;

            a.apply_angular_impulse(axis * lambda);
            b.apply_angular_impulse(-axis * lambda);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::ConstraintBodyPair;
    use crate::physics::solver::test_util::*;
    use crate::transform::Transform;
    use approx::assert_relative_eq;

    /// Upper arm on A, lower arm on B, shoulder at the origin with the cone along -Y.
    fn shoulder(swing: Quat, swing_limit: f32, twist_limit: f32) -> (Vec<RigidBodyState>, ConeTwistConstraint) {
        let ta = Transform::from_position(Vec3::new(0.0, 0.5, 0.0));
        let tb = Transform::from_position(Vec3::new(0.0, -0.5, 0.0));
        let cone = ConeTwistConstraint::from_global_points(&ta, &tb, Vec3::ZERO, -Vec3::Y, swing_limit, twist_limit);
        let bodies = vec![
            sphere(ta.position, 2.0),
            RigidBodyState::new(swing * tb.position, swing, 1.0, Vec3::splat(0.1)),
        ];
        (bodies, cone)
    }

    fn initialize(bodies: &[RigidBodyState], cone: ConeTwistConstraint) -> ConeTwistConstraintUpdate {
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_cone_twist_constraints(bodies, ConstraintSet::new(&[cone], &pairs), 1.0 / 60.0, &mut out);
        out[0]
    }

    #[test]
    fn test_swing_and_twist_decomposition() {
        let (bodies, cone) = shoulder(Quat::from_rotation_z(0.4), -1.0, -1.0);
        let st = swing_twist(&cone, &bodies[0], &bodies[1]);
        let (_, swing_angle) = axis_angle(st.swing);
        assert_relative_eq!(swing_angle, 0.4, epsilon = 1e-5);
        assert!(st.twist_angle.abs() < 1e-5, "pure swing has no twist: {}", st.twist_angle);

        let (bodies, cone) = shoulder(Quat::from_rotation_y(0.3), -1.0, -1.0);
        let st = swing_twist(&cone, &bodies[0], &bodies[1]);
        let (_, swing_angle) = axis_angle(st.swing);
        assert!(swing_angle.abs() < 1e-5);
        assert_relative_eq!(st.twist_angle.abs(), 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_limits_inactive_inside_cone() {
        let (bodies, cone) = shoulder(Quat::from_rotation_z(0.2), 0.5, 0.5);
        let con = initialize(&bodies, cone);
        assert!(!con.solve_swing_limit);
        assert!(!con.solve_twist_limit);
        assert!(!con.solve_swing_motor);
        assert!(!con.solve_twist_motor);
    }

    #[test]
    fn test_swing_limit_stops_opening() {
        let (mut bodies, cone) = shoulder(Quat::from_rotation_z(0.6), 0.5, -1.0);
        // Keep swinging outwards about +Z.
        bodies[1].angular_velocity = Vec3::Z * 4.0;
        let con = initialize(&bodies, cone);
        assert!(con.solve_swing_limit);
        assert_relative_eq!(con.global_swing_axis, Vec3::Z, epsilon = 1e-5);
        assert!(con.swing_limit_bias < 0.0);

        let mut out = vec![con];
        for _ in 0..50 {
            solve_cone_twist_constraints(&mut out, &mut bodies);
            assert!(out[0].swing_limit_impulse >= 0.0);
        }
        let opening = (bodies[1].angular_velocity - bodies[0].angular_velocity).dot(Vec3::Z);
        assert!(opening <= 1e-3, "still opening at {opening}");
    }

    #[test]
    fn test_twist_limit_sign() {
        let (bodies, cone) = shoulder(Quat::from_rotation_y(0.5), -1.0, 0.2);
        let st = swing_twist(&cone, &bodies[0], &bodies[1]);
        let con = initialize(&bodies, cone);
        assert!(con.solve_twist_limit);
        let expected = if st.twist_angle < 0.0 { 1.0 } else { -1.0 };
        assert_eq!(con.twist_limit_sign, expected);
    }

    #[test]
    fn test_twist_velocity_motor() {
        let (mut bodies, cone) = shoulder(Quat::IDENTITY, -1.0, -1.0);
        let cone = cone.with_twist_velocity_motor(1.5, 100.0);
        let mut out = vec![initialize(&bodies, cone)];
        for _ in 0..100 {
            solve_cone_twist_constraints(&mut out, &mut bodies);
        }
        let axis = out[0].global_twist_axis;
        let rel = (bodies[1].angular_velocity - bodies[0].angular_velocity).dot(axis);
        assert_relative_eq!(rel, 1.5, epsilon = 1e-2);
    }

    #[test]
    fn test_swing_position_motor_heads_to_target() {
        let (bodies, cone) = shoulder(Quat::IDENTITY, 1.0, -1.0);
        let cone = cone.with_swing_position_motor(0.0, 0.5, 10.0);
        let con = initialize(&bodies, cone);
        assert!(con.solve_swing_motor);
        assert!(con.swing_motor_velocity > 0.0);
        assert_relative_eq!(con.global_swing_motor_axis.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(con.swing_motor_velocity, 0.5 * 60.0 * SWING_MOTOR_GAIN, epsilon = 1e-3);
    }
}
