use glam::{Mat2, Mat3, Vec2, Vec3};

use super::{bias_scale, inv_dt_or_zero, ConstraintSet, SolverBody, SLIDER_CONSTRAINT_BETA, SLIDER_LIMIT_CONSTRAINT_BETA};
use crate::math::{inverse_or_zero, rotation_error, solve_mat2, solve_mat3, tangents};
use crate::physics::body::{BodyIndex, RigidBodyState};
use crate::physics::constraints::{MotorType, SliderConstraint};

#[derive(Debug, Clone, Copy)]
pub struct SliderConstraintUpdate {
    pub body_a: BodyIndex,
    pub body_b: BodyIndex,

    /// Perpendicular directions in which the anchors must stay aligned.
    pub tangent: Vec3,
    pub bitangent: Vec3,
    /// `r_B × t` and `r_B × b`.
    pub rbxt: Vec3,
    pub rbxb: Vec3,
    /// `(r_A + u) × t` and `(r_A + u) × b`, with `u` the anchor separation.
    pub rauxt: Vec3,
    pub rauxb: Vec3,
    pub translation_bias: Vec2,
    pub inv_effective_translation_mass: Mat2,

    pub rotation_bias: Vec3,
    pub inv_effective_rotation_mass: Mat3,

    pub global_slider_axis: Vec3,

    pub solve_limit: bool,
    pub rauxs: Vec3,
    pub rbxs: Vec3,
    pub effective_axial_mass: f32,
    pub limit_sign: f32,
    pub limit_bias: f32,
    pub limit_impulse: f32,

    pub solve_motor: bool,
    pub motor_velocity: f32,
    pub max_motor_impulse: f32,
    pub motor_impulse: f32,
}

/// Signed anchor separation along the slider axis.
pub(crate) fn slider_distance(input: &SliderConstraint, a: &RigidBodyState, b: &RigidBodyState) -> f32 {
    let anchor_a = a.position + a.rotation * (input.local_anchor_a - a.local_cog_position);
    let anchor_b = b.position + b.rotation * (input.local_anchor_b - b.local_cog_position);
    (anchor_b - anchor_a).dot(a.rotation * input.local_axis_a)
}

pub fn initialize_slider_constraints(
    bodies: &[RigidBodyState],
    set: ConstraintSet<'_, SliderConstraint>,
    dt: f32,
    out: &mut Vec<SliderConstraintUpdate>,
) {
    out.clear();
    out.reserve(set.len());
    let inv_dt = inv_dt_or_zero(dt);
    let translation_beta_dt = bias_scale(SLIDER_CONSTRAINT_BETA, dt);
    let rotation_beta_dt = bias_scale(SLIDER_CONSTRAINT_BETA, dt) * 2.0;
    let limit_beta_dt = bias_scale(SLIDER_LIMIT_CONSTRAINT_BETA, dt);

    for i in 0..set.len() {
        let (input, pair) = set.get(i);
        let global_a = &bodies[pair.a as usize];
        let global_b = &bodies[pair.b as usize];

        let rel_global_anchor_a = global_a.rotation * (input.local_anchor_a - global_a.local_cog_position);
        let rel_global_anchor_b = global_b.rotation * (input.local_anchor_b - global_b.local_cog_position);
        let global_anchor_a = global_a.position + rel_global_anchor_a;
        let global_anchor_b = global_b.position + rel_global_anchor_b;

        let global_slider_axis = global_a.rotation * input.local_axis_a;
        let (tangent, bitangent) = tangents(global_slider_axis);
        let u = global_anchor_b - global_anchor_a;

        let rau = rel_global_anchor_a + u;
        let rbxt = rel_global_anchor_b.cross(tangent);
        let rbxb = rel_global_anchor_b.cross(bitangent);
        let rauxt = rau.cross(tangent);
        let rauxb = rau.cross(bitangent);

        let ia_rauxt = global_a.inv_inertia * rauxt;
        let ia_rauxb = global_a.inv_inertia * rauxb;
        let ib_rbxt = global_b.inv_inertia * rbxt;
        let ib_rbxb = global_b.inv_inertia * rbxb;
        let inv_mass_sum = global_a.inv_mass + global_b.inv_mass;

        let inv_effective_translation_mass = Mat2::from_cols(
            Vec2::new(
                rauxt.dot(ia_rauxt) + rbxt.dot(ib_rbxt) + inv_mass_sum,
                rauxb.dot(ia_rauxt) + rbxb.dot(ib_rbxt),
            ),
            Vec2::new(
                rauxt.dot(ia_rauxb) + rbxt.dot(ib_rbxb),
                rauxb.dot(ia_rauxb) + rbxb.dot(ib_rbxb) + inv_mass_sum,
            ),
        );

        let error = rotation_error(global_a.rotation, global_b.rotation, input.initial_inv_rotation_difference);

        let mut con = SliderConstraintUpdate {
            body_a: pair.a,
            body_b: pair.b,
            tangent,
            bitangent,
            rbxt,
            rbxb,
            rauxt,
            rauxb,
            translation_bias: Vec2::new(u.dot(tangent), u.dot(bitangent)) * translation_beta_dt,
            inv_effective_translation_mass,
            rotation_bias: error * rotation_beta_dt,
            inv_effective_rotation_mass: global_a.inv_inertia + global_b.inv_inertia,
            global_slider_axis,
            solve_limit: false,
            rauxs: Vec3::ZERO,
            rbxs: Vec3::ZERO,
            effective_axial_mass: 0.0,
            limit_sign: 0.0,
            limit_bias: 0.0,
            limit_impulse: 0.0,
            solve_motor: false,
            motor_velocity: 0.0,
            max_motor_impulse: 0.0,
            motor_impulse: 0.0,
        };

        let distance = u.dot(global_slider_axis);
        let min_enabled = input.neg_distance_limit <= 0.0;
        let max_enabled = input.pos_distance_limit >= 0.0;
        let min_violated = min_enabled && distance < input.neg_distance_limit;
        let max_violated = max_enabled && distance > input.pos_distance_limit;
        debug_assert!(!(min_violated && max_violated), "slider distance {distance} violates both limits");

        if min_violated || max_violated {
            con.solve_limit = true;
            con.rauxs = rau.cross(global_slider_axis);
            con.rbxs = rel_global_anchor_b.cross(global_slider_axis);
            con.effective_axial_mass = inverse_or_zero(
                inv_mass_sum
                    + con.rauxs.dot(global_a.inv_inertia * con.rauxs)
                    + con.rbxs.dot(global_b.inv_inertia * con.rbxs),
            );
            con.limit_sign = if min_violated { 1.0 } else { -1.0 };
            let d = if min_violated {
                distance - input.neg_distance_limit
            } else {
                input.pos_distance_limit - distance
            };
            con.limit_bias = d * limit_beta_dt;
        }

        if input.max_motor_force > 0.0 {
            con.solve_motor = true;
            con.max_motor_impulse = input.max_motor_force * dt;
            con.motor_velocity = match input.motor_type {
                MotorType::Velocity => input.motor_velocity,
                MotorType::Position => {
                    let min_limit = if min_enabled { input.neg_distance_limit } else { f32::NEG_INFINITY };
                    let max_limit = if max_enabled { input.pos_distance_limit } else { f32::INFINITY };
                    let target_distance = input.motor_target_distance.clamp(min_limit, max_limit);
                    (target_distance - distance) * inv_dt
                }
            };
        }

        out.push(con);
    }
}

pub fn solve_slider_constraints(constraints: &mut [SliderConstraintUpdate], bodies: &mut [RigidBodyState]) {
    for con in constraints.iter_mut() {
        let mut a = SolverBody::load(bodies, con.body_a);
        let mut b = SolverBody::load(bodies, con.body_b);
        let axis = con.global_slider_axis;

        // The motor pushes the bodies apart along the axis without torque.
        if con.solve_motor {
            let cdot = b.linear_velocity.dot(axis) - a.linear_velocity.dot(axis) - con.motor_velocity;
            let mass = inverse_or_zero(a.inv_mass + b.inv_mass);

            let old_impulse = con.motor_impulse;
            con.motor_impulse = (old_impulse - mass * cdot).clamp(-con.max_motor_impulse, con.max_motor_impulse);
            let p = axis * (con.motor_impulse - old_impulse);

            a.linear_velocity -= p * a.inv_mass;
            b.linear_velocity += p * b.inv_mass;
        }

        if con.solve_limit {
            let cdot = b.linear_velocity.dot(axis) + b.angular_velocity.dot(con.rbxs)
                - a.linear_velocity.dot(axis)
                - a.angular_velocity.dot(con.rauxs);

            let old_impulse = con.limit_impulse;
            con.limit_impulse =
                (old_impulse - con.effective_axial_mass * (con.limit_sign * cdot + con.limit_bias)).max(0.0);
            let lambda = (con.limit_impulse - old_impulse) * con.limit_sign;
            let p = axis * lambda;

            a.linear_velocity -= p * a.inv_mass;
            a.apply_angular_impulse(-con.rauxs * lambda);
            b.linear_velocity += p * b.inv_mass;
            b.apply_angular_impulse(con.rbxs * lambda);
        }

        {
            let cdot = b.angular_velocity - a.angular_velocity;
            let lambda = solve_mat3(&con.inv_effective_rotation_mass, -(cdot + con.rotation_bias));
            a.apply_angular_impulse(-lambda);
            b.apply_angular_impulse(lambda);
        }

        {
            let cdot = Vec2::new(
                con.tangent.dot(b.linear_velocity) + con.rbxt.dot(b.angular_velocity)
                    - con.tangent.dot(a.linear_velocity)
                    - con.rauxt.dot(a.angular_velocity),
                con.bitangent.dot(b.linear_velocity) + con.rbxb.dot(b.angular_velocity)
                    - con.bitangent.dot(a.linear_velocity)
                    - con.rauxb.dot(a.angular_velocity),
            );
            let lambda = solve_mat2(&con.inv_effective_translation_mass, -(cdot + con.translation_bias));
            let p = con.tangent * lambda.x + con.bitangent * lambda.y;

            a.linear_velocity -= p * a.inv_mass;
            a.apply_angular_impulse(-(con.rauxt * lambda.x + con.rauxb * lambda.y));
            b.linear_velocity += p * b.inv_mass;
            b.apply_angular_impulse(con.rbxt * lambda.x + con.rbxb * lambda.y);
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

    /// Rail on A along X, carriage on B displaced by `offset` along the rail.
    fn rail(offset: f32, min: f32, max: f32) -> (Vec<RigidBodyState>, SliderConstraint) {
        let ta = Transform::from_position(Vec3::ZERO);
        let tb = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        let slider = SliderConstraint::from_global_points(&ta, &tb, Vec3::new(0.5, 0.0, 0.0), Vec3::X, min, max);
        let bodies = vec![sphere(ta.position, 4.0), sphere(tb.position + Vec3::X * offset, 1.0)];
        (bodies, slider)
    }

    fn initialize(bodies: &[RigidBodyState], slider: SliderConstraint) -> Vec<SliderConstraintUpdate> {
        let pairs = [ConstraintBodyPair::new(0, 1)];
        let mut out = Vec::new();
        initialize_slider_constraints(bodies, ConstraintSet::new(&[slider], &pairs), 1.0 / 60.0, &mut out);
        out
    }

    #[test]
    fn test_distance_along_axis() {
        let (bodies, slider) = rail(0.35, 1.0, -1.0);
        assert_relative_eq!(slider_distance(&slider, &bodies[0], &bodies[1]), 0.35, epsilon = 1e-6);
    }

    #[test]
    fn test_free_along_axis_locked_across() {
        let (mut bodies, slider) = rail(0.0, 1.0, -1.0);
        bodies[1].linear_velocity = Vec3::new(2.0, 1.0, -0.5);
        let mut out = initialize(&bodies, slider);
        assert!(!out[0].solve_limit);
        for _ in 0..200 {
            solve_slider_constraints(&mut out, &mut bodies);
        }
        // Both anchors sit at x = 0.5.
        let anchor_velocity_a = bodies[0].linear_velocity + bodies[0].angular_velocity.cross(Vec3::X * 0.5);
        let anchor_velocity_b = bodies[1].linear_velocity + bodies[1].angular_velocity.cross(-Vec3::X * 0.5);
        let rel = anchor_velocity_b - anchor_velocity_a;
        assert!(rel.y.abs() < 1e-4 && rel.z.abs() < 1e-4, "off-axis drift {rel}");
        let spin = bodies[1].angular_velocity - bodies[0].angular_velocity;
        assert!(spin.length() < 1e-4, "relative rotation {spin}");
        // No impulse has an X component.
        assert_eq!(bodies[1].linear_velocity.x, 2.0);
    }

    #[test]
    fn test_limit_stops_at_max_distance() {
        let (mut bodies, slider) = rail(0.6, -0.5, 0.5);
        bodies[1].linear_velocity = Vec3::X * 3.0;
        let mut out = initialize(&bodies, slider);
        assert!(out[0].solve_limit);
        assert_eq!(out[0].limit_sign, -1.0);
        for _ in 0..30 {
            solve_slider_constraints(&mut out, &mut bodies);
            assert!(out[0].limit_impulse >= 0.0);
        }
        let rel = (bodies[1].linear_velocity - bodies[0].linear_velocity).x;
        assert!(rel < 0.0, "carriage should be pushed back inside: {rel}");
    }

    #[test]
    fn test_position_motor_targets_clamped_distance() {
        let (bodies, slider) = rail(0.0, -0.2, 0.2);
        let out = initialize(&bodies, slider.with_position_motor(0.8, 50.0));
        assert!(out[0].solve_motor);
        assert_relative_eq!(out[0].motor_velocity, 0.2 * 60.0, epsilon = 1e-3);
        assert_relative_eq!(out[0].max_motor_impulse, 50.0 / 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_between_immovable_bodies_is_noop() {
        let mut bodies = vec![RigidBodyState::DUMMY, RigidBodyState::DUMMY];
        let slider = SliderConstraint::from_global_points(
            &Transform::identity(),
            &Transform::identity(),
            Vec3::ZERO,
            Vec3::X,
            1.0,
            -1.0,
        )
        .with_velocity_motor(1.0, 10.0);
        let mut out = initialize(&bodies, slider);
        solve_slider_constraints(&mut out, &mut bodies);
        assert_eq!(bodies[1].linear_velocity, Vec3::ZERO);
        assert!(bodies[1].linear_velocity.is_finite());
    }
}
